//! Lazily built, shared BPE engines.
//!
//! A [`Registry`] parses each encoding's rank table at most once and hands out
//! `Arc<CoreBpe>` clones afterwards. Lookups take a read lock; the first
//! construction of an encoding takes the write lock and checks again before
//! building, so concurrent first callers never build twice and never see a
//! half-built engine.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use rustc_hash::FxHashMap;

use crate::config::Config;
use crate::core::{encoding_for_model, CoreBpe, EncodingName, Processor, TokenizerError};
use crate::counter::Tokenizer;

pub struct Registry {
    config: Config,
    encodings: RwLock<FxHashMap<EncodingName, Arc<CoreBpe>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Config::from_env())
    }
}

impl Registry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            encodings: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Engine for an encoding name such as `"o200k_base"`.
    pub fn get(&self, name: &str) -> Result<Arc<CoreBpe>, TokenizerError> {
        let encoding = EncodingName::from_name(name)
            .ok_or_else(|| TokenizerError::EncodingNotFound(name.to_string()))?;
        self.encoding(encoding)
    }

    /// Engine for `encoding`, built on first use.
    pub fn encoding(&self, encoding: EncodingName) -> Result<Arc<CoreBpe>, TokenizerError> {
        {
            let cache = self.encodings.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(bpe) = cache.get(&encoding) {
                tracing::trace!(encoding = %encoding, "encoding cache hit");
                return Ok(Arc::clone(bpe));
            }
        }

        let mut cache = self.encodings.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(bpe) = cache.get(&encoding) {
            return Ok(Arc::clone(bpe));
        }

        let path = self.config.vocab_path(encoding.vocab_file());
        let bpe = Arc::new(encoding.load_file(&path)?);
        tracing::debug!(
            encoding = %encoding,
            path = %path.display(),
            vocab_size = bpe.vocab_size(),
            special_tokens = bpe.special_tokens().len(),
            "built encoding"
        );
        cache.insert(encoding, Arc::clone(&bpe));
        Ok(bpe)
    }

    /// Engine for the encoding a model name maps to.
    ///
    /// Unrecognised models get `o200k_base`.
    pub fn for_model(&self, model: &str) -> Result<Arc<CoreBpe>, TokenizerError> {
        let (encoding, recognized) = encoding_for_model(model);
        if !recognized {
            tracing::debug!(model, fallback = %encoding, "unrecognized model");
        }
        self.encoding(encoding)
    }

    /// Counting tokenizer for a model name.
    ///
    /// `claude*` models have no public tokenizer and get the approximate
    /// counter; everything else goes through [`encoding_for_model`].
    pub fn tokenizer_for_model(&self, model: &str) -> Result<Tokenizer, TokenizerError> {
        if model.to_lowercase().starts_with("claude") {
            return Ok(Tokenizer::Approximate {
                chars_per_token: self.config.approx_chars_per_token,
            });
        }
        let (encoding, _) = encoding_for_model(model);
        Ok(Tokenizer::bpe(encoding, self.encoding(encoding)?))
    }

    /// SentencePiece tokenizer from a `.model` file. Not cached.
    pub fn sentencepiece(&self, path: impl AsRef<Path>) -> Result<Tokenizer, TokenizerError> {
        let path = path.as_ref();
        let processor = Processor::from_path(path)?;
        tracing::debug!(
            path = %path.display(),
            pieces = processor.vocab_size(),
            "built SentencePiece tokenizer"
        );
        Ok(Tokenizer::sentencepiece(Arc::new(processor)))
    }

    /// Encodings built so far.
    pub fn loaded(&self) -> Vec<EncodingName> {
        let cache = self.encodings.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<EncodingName> = cache.keys().copied().collect();
        names.sort();
        names
    }
}

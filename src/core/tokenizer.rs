use aho_corasick::{AhoCorasick, MatchKind};
use fancy_regex::Regex as FancyRegex;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::path::Path;
use thiserror::Error;

#[cfg(feature = "pcre2")]
use pcre2::bytes::Regex as Pcre2Regex;

use super::bpe::byte_pair_encode;
use super::sentencepiece::ModelError;
use super::vocab::{build_decoder, check_byte_coverage, load_tiktoken_bpe, load_tiktoken_bpe_file, VocabError};

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("unknown encoding: {0}")]
    EncodingNotFound(String),
    #[error("failed to compile pre-tokenization pattern: {0}")]
    PatternCompile(#[from] Box<fancy_regex::Error>),
    #[cfg(feature = "pcre2")]
    #[error("failed to compile pre-tokenization pattern (PCRE2): {0}")]
    Pcre2Error(#[from] pcre2::Error),
    #[error("PCRE2 feature not enabled. Compile with --features pcre2")]
    Pcre2NotEnabled,
    #[error("text contains disallowed special token {token:?} at byte {offset}")]
    DisallowedSpecialToken { token: String, offset: usize },
    #[error("vocabulary error: {0}")]
    Vocab(#[from] VocabError),
    #[error("SentencePiece model error: {0}")]
    Model(#[from] ModelError),
    #[error("Aho-Corasick build error: {0}")]
    AhoCorasickError(#[from] aho_corasick::BuildError),
    #[error("Decoding error: invalid UTF-8")]
    Utf8Error,
    #[error("{0} does not support {1}")]
    Unsupported(&'static str, &'static str),
    #[error("config error: {0}")]
    Config(String),
}

/// Pre-tokenization pattern for o200k_base (GPT-4o, GPT-4.1, GPT-5, o-series).
pub const O200K_BASE_PATTERN: &str = concat!(
    r"[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]*[\p{Ll}\p{Lm}\p{Lo}\p{M}]+(?i:'s|'t|'re|'ve|'m|'ll|'d)?",
    r"|[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]+[\p{Ll}\p{Lm}\p{Lo}\p{M}]*(?i:'s|'t|'re|'ve|'m|'ll|'d)?",
    r"|\p{N}{1,3}",
    r"| ?[^\s\p{L}\p{N}]+[\r\n/]*",
    r"|\s*[\r\n]+",
    r"|\s+(?!\S)",
    r"|\s+",
);

/// Pre-tokenization pattern for cl100k_base (GPT-4, GPT-3.5-turbo).
pub const CL100K_BASE_PATTERN: &str = r"(?i:'s|'t|'re|'ve|'m|'ll|'d)|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+";

/// Pre-tokenization pattern shared by p50k_base, p50k_edit and r50k_base (GPT-2/GPT-3).
pub const P50K_BASE_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

/// Which special-token literals a call recognises or rejects.
///
/// Used for both sides of [`CoreBpe::encode`]: `allowed` decides which
/// literals are split out as their fixed ID, `disallowed` decides which
/// literals make the call fail. [`SpecialTokens::All`] on the disallowed side
/// means every registered special token that is not allowed.
#[derive(Debug, Clone, Copy, Default)]
pub enum SpecialTokens<'a> {
    #[default]
    None,
    All,
    Only(&'a [&'a str]),
}

impl SpecialTokens<'_> {
    fn contains(&self, token: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Only(tokens) => tokens.contains(&token),
        }
    }
}

/// Regex backend for pre-tokenization: fancy-regex by default, PCRE2 on request.
enum RegexBackend {
    Fancy(Box<FancyRegex>),
    #[cfg(feature = "pcre2")]
    Pcre2(Pcre2Regex),
}

impl RegexBackend {
    /// Byte ranges of every chunk, left to right.
    ///
    /// A runtime matching error (backtrack limit) ends the scan; the rest of
    /// the text is then carried as one chunk so no input is lost.
    fn find_iter(&self, text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut last_end = 0;
        let failed = match self {
            RegexBackend::Fancy(regex) => {
                let mut failed = false;
                for m in regex.find_iter(text) {
                    match m {
                        Ok(m) => {
                            spans.push((m.start(), m.end()));
                            last_end = m.end();
                        }
                        Err(err) => {
                            tracing::warn!(%err, offset = last_end, "pre-tokenizer gave up");
                            failed = true;
                            break;
                        }
                    }
                }
                failed
            }
            #[cfg(feature = "pcre2")]
            RegexBackend::Pcre2(regex) => {
                let mut failed = false;
                for m in regex.find_iter(text.as_bytes()) {
                    match m {
                        Ok(m) => {
                            spans.push((m.start(), m.end()));
                            last_end = m.end();
                        }
                        Err(err) => {
                            tracing::warn!(%err, offset = last_end, "pre-tokenizer gave up");
                            failed = true;
                            break;
                        }
                    }
                }
                failed
            }
        };
        if failed && last_end < text.len() {
            spans.push((last_end, text.len()));
        }
        spans
    }
}

fn compile_fancy(pattern: &str) -> Result<RegexBackend, TokenizerError> {
    let regex = FancyRegex::new(pattern).map_err(Box::new)?;
    Ok(RegexBackend::Fancy(Box::new(regex)))
}

#[cfg(feature = "pcre2")]
fn compile_pcre2(pattern: &str) -> Result<RegexBackend, TokenizerError> {
    let regex = pcre2::bytes::RegexBuilder::new()
        .jit_if_available(true)
        .utf(true)
        .ucp(true)
        .build(pattern)?;
    Ok(RegexBackend::Pcre2(regex))
}

/// Rank-merge BPE engine for one encoding.
///
/// Holds the rank table, its inverse, the special-token tables and the
/// compiled pre-tokenization pattern. Everything is immutable after
/// construction, so one instance can serve concurrent `encode`/`decode` calls
/// from any number of threads; per-call merge state lives on the caller's
/// stack.
///
/// # Encoding pipeline
///
/// 1. Allowed special-token literals are split out of the text and emitted as
///    their fixed IDs. Literals that are not allowed stay ordinary text.
/// 2. Each ordinary span is cut into chunks by the pre-tokenization pattern.
/// 3. A chunk that is a whole rank-table entry becomes that rank. Any other
///    chunk is merged byte-pair-wise from single bytes (see
///    [`byte_pair_encode`]).
///
/// Aho-Corasick (leftmost-longest) finds special tokens. Rayon parallelises
/// only the batch helpers.
pub struct CoreBpe {
    encoder: FxHashMap<Vec<u8>, u32>,
    decoder: FxHashMap<u32, Vec<u8>>,
    special_tokens: FxHashMap<String, u32>,
    special_tokens_decoder: FxHashMap<u32, String>,
    special_token_strings: Vec<String>,
    special_matcher: Option<AhoCorasick>,
    regex: RegexBackend,
    pattern: String,
    explicit_vocab_size: Option<usize>,
}

impl CoreBpe {
    /// Create an engine from a rank table, special tokens and a pre-tokenization pattern.
    ///
    /// Fails if the pattern does not compile, if two byte sequences share a
    /// rank, or if some single byte has no rank.
    pub fn new(
        encoder: FxHashMap<Vec<u8>, u32>,
        special_tokens: FxHashMap<String, u32>,
        pattern: &str,
    ) -> Result<Self, TokenizerError> {
        let regex = compile_fancy(pattern)?;
        let decoder = build_decoder(&encoder)?;
        check_byte_coverage(&encoder)?;

        let special_tokens_decoder: FxHashMap<u32, String> = special_tokens
            .iter()
            .map(|(k, v)| (*v, k.clone()))
            .collect();

        // Sorted so match order does not depend on hash iteration order.
        let mut special_token_strings: Vec<String> = special_tokens.keys().cloned().collect();
        special_token_strings.sort();
        let special_matcher = if special_token_strings.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(&special_token_strings)?,
            )
        };

        Ok(Self {
            encoder,
            decoder,
            special_tokens,
            special_tokens_decoder,
            special_token_strings,
            special_matcher,
            regex,
            pattern: pattern.to_string(),
            explicit_vocab_size: None,
        })
    }

    /// Create an engine from raw tiktoken vocabulary bytes.
    pub fn from_bytes(
        vocab_data: &[u8],
        pattern: &str,
        special_tokens: FxHashMap<String, u32>,
    ) -> Result<Self, TokenizerError> {
        let encoder = load_tiktoken_bpe(vocab_data)?;
        Self::new(encoder, special_tokens, pattern)
    }

    /// Create an engine from a tiktoken vocabulary file.
    pub fn from_file(
        vocab_path: impl AsRef<Path>,
        pattern: &str,
        special_tokens: FxHashMap<String, u32>,
    ) -> Result<Self, TokenizerError> {
        let encoder = load_tiktoken_bpe_file(vocab_path)?;
        Self::new(encoder, special_tokens, pattern)
    }

    /// Report `n` as the vocabulary size instead of `max id + 1`.
    pub fn with_explicit_vocab_size(mut self, n: usize) -> Self {
        self.explicit_vocab_size = Some(n);
        self
    }

    /// Switch to the PCRE2 regex backend (or back to fancy-regex).
    ///
    /// # Errors
    /// Returns an error if the `pcre2` feature is not enabled or the pattern
    /// fails to compile.
    #[cfg(feature = "pcre2")]
    pub fn pcre2(mut self, use_pcre2: bool) -> Result<Self, TokenizerError> {
        self.regex = if use_pcre2 {
            compile_pcre2(&self.pattern)?
        } else {
            compile_fancy(&self.pattern)?
        };
        Ok(self)
    }

    /// Switch to PCRE2 regex backend (stub when feature not enabled).
    #[cfg(not(feature = "pcre2"))]
    pub fn pcre2(self, use_pcre2: bool) -> Result<Self, TokenizerError> {
        if use_pcre2 {
            Err(TokenizerError::Pcre2NotEnabled)
        } else {
            Ok(self)
        }
    }

    fn encode_ordinary_into(&self, text: &str, out: &mut Vec<u32>) {
        let bytes = text.as_bytes();
        for (start, end) in self.regex.find_iter(text) {
            let piece = &bytes[start..end];
            match self.encoder.get(piece) {
                Some(&rank) => out.push(rank),
                None => out.extend(byte_pair_encode(piece, &self.encoder)),
            }
        }
    }

    /// Encode text with no special-token recognition: every literal is plain text.
    pub fn encode_ordinary(&self, text: &str) -> Vec<u32> {
        let mut out = Vec::new();
        self.encode_ordinary_into(text, &mut out);
        out
    }

    /// Encode text under an allowed/disallowed special-token policy.
    ///
    /// Disallowed literals are looked for before any encoding work, and the
    /// earliest one found is returned as
    /// [`TokenizerError::DisallowedSpecialToken`]. Allowed literals are emitted
    /// as their registered ID.
    ///
    /// ```ignore
    /// use tokencount::SpecialTokens;
    ///
    /// // tiktoken's default: nothing allowed, everything else rejected
    /// let err = bpe.encode("<|endoftext|>", SpecialTokens::None, SpecialTokens::All);
    /// assert!(err.is_err());
    ///
    /// let ids = bpe.encode("<|endoftext|>", SpecialTokens::All, SpecialTokens::None)?;
    /// assert_eq!(ids, vec![100257]);
    /// ```
    pub fn encode(
        &self,
        text: &str,
        allowed: SpecialTokens<'_>,
        disallowed: SpecialTokens<'_>,
    ) -> Result<Vec<u32>, TokenizerError> {
        self.check_disallowed(text, allowed, disallowed)?;

        let Some(matcher) = self.special_matcher.as_ref().filter(|_| !matches!(allowed, SpecialTokens::None)) else {
            return Ok(self.encode_ordinary(text));
        };

        let mut out = Vec::new();
        let mut start = 0;
        for m in matcher.find_iter(text) {
            let token = &self.special_token_strings[m.pattern().as_usize()];
            if !allowed.contains(token) {
                continue;
            }
            self.encode_ordinary_into(&text[start..m.start()], &mut out);
            out.push(self.special_tokens[token]);
            start = m.end();
        }
        self.encode_ordinary_into(&text[start..], &mut out);
        Ok(out)
    }

    fn check_disallowed(
        &self,
        text: &str,
        allowed: SpecialTokens<'_>,
        disallowed: SpecialTokens<'_>,
    ) -> Result<(), TokenizerError> {
        let candidates: Vec<&str> = match disallowed {
            SpecialTokens::None => return Ok(()),
            SpecialTokens::All => self
                .special_token_strings
                .iter()
                .map(String::as_str)
                .filter(|t| !allowed.contains(t))
                .collect(),
            SpecialTokens::Only(tokens) => tokens.to_vec(),
        };

        let first = candidates
            .into_iter()
            .filter(|t| !t.is_empty())
            .filter_map(|t| text.find(t).map(|offset| (offset, t)))
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.len().cmp(&a.1.len())));
        match first {
            Some((offset, token)) => Err(TokenizerError::DisallowedSpecialToken {
                token: token.to_string(),
                offset,
            }),
            None => Ok(()),
        }
    }

    /// Encode text with every registered special token allowed.
    pub fn encode_with_special_tokens(&self, text: &str) -> Vec<u32> {
        // Nothing is disallowed, so this cannot fail.
        self.encode(text, SpecialTokens::All, SpecialTokens::None)
            .unwrap_or_default()
    }

    /// Number of tokens [`encode_ordinary`](Self::encode_ordinary) would produce.
    pub fn token_count(&self, text: &str) -> usize {
        self.encode_ordinary(text).len()
    }

    /// Batch-encode texts in parallel, with no special-token recognition.
    pub fn encode_batch(&self, texts: &[String]) -> Vec<Vec<u32>> {
        texts.par_iter().map(|text| self.encode_ordinary(text)).collect()
    }

    /// Token counts for many texts, in parallel.
    pub fn count_batch(&self, texts: &[String]) -> Vec<usize> {
        texts.par_iter().map(|text| self.token_count(text)).collect()
    }

    /// Decode token IDs back to bytes. Unknown IDs contribute nothing.
    pub fn decode_bytes(&self, tokens: &[u32]) -> Vec<u8> {
        let mut result = Vec::with_capacity(tokens.len() * 4);
        for token in tokens {
            if let Some(bytes) = self.decoder.get(token) {
                result.extend_from_slice(bytes);
            } else if let Some(special) = self.special_tokens_decoder.get(token) {
                result.extend_from_slice(special.as_bytes());
            }
        }
        result
    }

    /// Decode token IDs to a string.
    pub fn decode(&self, tokens: &[u32]) -> Result<String, TokenizerError> {
        String::from_utf8(self.decode_bytes(tokens)).map_err(|_| TokenizerError::Utf8Error)
    }

    /// Decode token IDs to a string, replacing invalid UTF-8 with U+FFFD.
    pub fn decode_lossy(&self, tokens: &[u32]) -> String {
        String::from_utf8_lossy(&self.decode_bytes(tokens)).into_owned()
    }

    /// Vocabulary size: the explicit size if one was set, otherwise the
    /// largest ordinary or special ID plus one.
    pub fn vocab_size(&self) -> usize {
        if let Some(n) = self.explicit_vocab_size {
            return n;
        }
        let max_decoder_id = self.decoder.keys().max().copied().unwrap_or(0);
        let max_special_id = self.special_tokens.values().max().copied().unwrap_or(0);
        max_decoder_id.max(max_special_id) as usize + 1
    }

    /// Get the special tokens map.
    pub fn special_tokens(&self) -> &FxHashMap<String, u32> {
        &self.special_tokens
    }

    /// Pre-tokenization pattern this engine was built with.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

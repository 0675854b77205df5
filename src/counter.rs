//! One counting surface over every tokenizer kind.

use std::sync::Arc;

use rayon::prelude::*;

use crate::config::DEFAULT_CHARS_PER_TOKEN;
use crate::core::{CoreBpe, EncodingName, Processor, TokenizerError};

/// A tokenizer that can count, and where possible encode and decode.
#[derive(Clone)]
pub enum Tokenizer {
    /// Exact GPT-style rank BPE.
    Bpe {
        encoding: EncodingName,
        engine: Arc<CoreBpe>,
    },
    /// Exact SentencePiece BPE from a `.model` file.
    SentencePiece { engine: Arc<Processor> },
    /// Character-ratio estimate for models without a public tokenizer.
    Approximate { chars_per_token: f64 },
}

impl Tokenizer {
    pub fn bpe(encoding: EncodingName, engine: Arc<CoreBpe>) -> Self {
        Self::Bpe { encoding, engine }
    }

    pub fn sentencepiece(engine: Arc<Processor>) -> Self {
        Self::SentencePiece { engine }
    }

    /// The Claude estimate at the default ratio.
    pub fn approximate() -> Self {
        Self::Approximate {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }

    /// Token IDs for `text`. Special-token literals are plain text.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        match self {
            Self::Bpe { engine, .. } => Ok(engine.encode_ordinary(text)),
            Self::SentencePiece { engine } => Ok(engine.encode_ids(text)),
            Self::Approximate { .. } => Err(TokenizerError::Unsupported(self.name(), "encode")),
        }
    }

    pub fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        match self {
            Self::Bpe { engine, .. } => engine.decode(ids),
            Self::SentencePiece { engine } => Ok(engine.decode(ids)),
            Self::Approximate { .. } => Err(TokenizerError::Unsupported(self.name(), "decode")),
        }
    }

    pub fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError> {
        match self {
            Self::Bpe { engine, .. } => Ok(engine.token_count(text)),
            Self::SentencePiece { engine } => Ok(engine.encode(text).len()),
            Self::Approximate { chars_per_token } => {
                Ok((text.len() as f64 / chars_per_token) as usize)
            }
        }
    }

    /// Count many texts in parallel.
    pub fn count_batch(&self, texts: &[String]) -> Result<Vec<usize>, TokenizerError> {
        texts.par_iter().map(|text| self.count_tokens(text)).collect()
    }

    /// False only for the approximate estimator.
    pub fn is_exact(&self) -> bool {
        !matches!(self, Self::Approximate { .. })
    }

    /// Machine-readable identifier, e.g. `bpe_cl100k_base`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bpe { encoding, .. } => match encoding {
                EncodingName::O200kBase => "bpe_o200k_base",
                EncodingName::Cl100kBase => "bpe_cl100k_base",
                EncodingName::P50kBase => "bpe_p50k_base",
                EncodingName::P50kEdit => "bpe_p50k_edit",
                EncodingName::R50kBase => "bpe_r50k_base",
            },
            Self::SentencePiece { .. } => "spm",
            Self::Approximate { .. } => "claude_3_approx",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Bpe { encoding, .. } => encoding.as_str(),
            Self::SentencePiece { .. } => "SentencePiece",
            Self::Approximate { .. } => "Claude (approx)",
        }
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("name", &self.name())
            .field("exact", &self.is_exact())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ModelProto, ModelType, NormalizerSpec, PieceType, SentencePiece, TrainerSpec};
    use rustc_hash::FxHashMap;

    fn tiny_bpe() -> Tokenizer {
        let mut encoder: FxHashMap<Vec<u8>, u32> =
            (0..=255u8).map(|b| (vec![b], b as u32)).collect();
        encoder.insert(b"hi".to_vec(), 256);
        encoder.insert(b" there".to_vec(), 257);
        let specials = EncodingName::R50kBase.special_tokens();
        let engine = CoreBpe::new(encoder, specials, EncodingName::R50kBase.pattern()).unwrap();
        Tokenizer::bpe(EncodingName::R50kBase, Arc::new(engine))
    }

    fn tiny_spm() -> Tokenizer {
        let model = ModelProto {
            pieces: vec![
                SentencePiece::new("<unk>", 0.0, PieceType::Unknown),
                SentencePiece::new("h", -2.0, PieceType::Normal),
                SentencePiece::new("i", -3.0, PieceType::Normal),
                SentencePiece::new("hi", -1.0, PieceType::Normal),
            ],
            trainer_spec: Some(TrainerSpec {
                model_type: Some(ModelType::Bpe as i32),
                ..Default::default()
            }),
            normalizer_spec: Some(NormalizerSpec {
                add_dummy_prefix: Some(false),
                remove_extra_whitespaces: Some(false),
                ..Default::default()
            }),
        };
        Tokenizer::sentencepiece(Arc::new(Processor::from_model(model).unwrap()))
    }

    #[test]
    fn test_bpe_variant() {
        let tok = tiny_bpe();
        assert!(tok.is_exact());
        assert_eq!(tok.name(), "bpe_r50k_base");
        assert_eq!(tok.display_name(), "r50k_base");
        assert_eq!(tok.encode("hi there").unwrap(), vec![256, 257]);
        assert_eq!(tok.decode(&[256, 257]).unwrap(), "hi there");
        // Counting never rejects special-token literals.
        assert_eq!(tok.count_tokens("<|endoftext|>").unwrap(), "<|endoftext|>".len());
    }

    #[test]
    fn test_sentencepiece_variant() {
        let tok = tiny_spm();
        assert!(tok.is_exact());
        assert_eq!(tok.name(), "spm");
        assert_eq!(tok.display_name(), "SentencePiece");
        assert_eq!(tok.encode("hi").unwrap(), vec![3]);
        assert_eq!(tok.count_tokens("hihi").unwrap(), 2);
        assert_eq!(tok.decode(&[3, 1]).unwrap(), "hih");
    }

    #[test]
    fn test_approximate_variant() {
        let tok = Tokenizer::approximate();
        assert!(!tok.is_exact());
        assert_eq!(tok.name(), "claude_3_approx");
        assert_eq!(tok.display_name(), "Claude (approx)");
        assert_eq!(tok.count_tokens("").unwrap(), 0);
        assert_eq!(tok.count_tokens("abc").unwrap(), 0);
        assert_eq!(tok.count_tokens("Hello, world!").unwrap(), 3); // 13 / 3.8
        assert_eq!(tok.count_tokens(&"a".repeat(38)).unwrap(), 10);
        assert!(matches!(
            tok.encode("hi"),
            Err(TokenizerError::Unsupported("claude_3_approx", "encode"))
        ));
        assert!(tok.decode(&[1]).is_err());
    }

    #[test]
    fn test_count_batch() {
        let texts = vec!["hi".to_string(), "hi there".to_string(), String::new()];
        assert_eq!(tiny_bpe().count_batch(&texts).unwrap(), vec![1, 2, 0]);
        assert_eq!(
            Tokenizer::approximate().count_batch(&texts).unwrap(),
            vec![0, 2, 0]
        );
    }
}

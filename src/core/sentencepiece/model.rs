//! Serialized SentencePiece model definition (`.model` files).
//!
//! A `.model` file is a protobuf `ModelProto`. Only the fields the engine
//! reads are declared here: the pieces, the trainer flags and the normalizer
//! flags. `prost` skips every other field while decoding. Tags and enum
//! values follow `sentencepiece_model.proto`, and absent proto2 fields take
//! that schema's defaults.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating a SentencePiece model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("unable to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to decode model protobuf: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("model type {0} not supported")]
    UnsupportedModelType(String),
    #[error(
        "normalizer options not supported (add_dummy_prefix={add_dummy_prefix}, \
         remove_extra_whitespaces={remove_extra_whitespaces})"
    )]
    UnsupportedNormalizer {
        add_dummy_prefix: bool,
        remove_extra_whitespaces: bool,
    },
    #[error("invalid model: {0}")]
    Invalid(String),
}

impl ModelError {
    /// True for the I/O and decoding failures that mean the file itself is
    /// unusable, as opposed to a well-formed model the engine rejects.
    pub fn is_load_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Decode(_))
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModelProto {
    #[prost(message, repeated, tag = "1")]
    pub pieces: Vec<SentencePiece>,
    #[prost(message, optional, tag = "2")]
    pub trainer_spec: Option<TrainerSpec>,
    #[prost(message, optional, tag = "3")]
    pub normalizer_spec: Option<NormalizerSpec>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SentencePiece {
    #[prost(string, optional, tag = "1")]
    pub piece: Option<String>,
    #[prost(float, optional, tag = "2")]
    pub score: Option<f32>,
    #[prost(enumeration = "PieceType", optional, tag = "3")]
    pub kind: Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PieceType {
    Normal = 1,
    Unknown = 2,
    Control = 3,
    UserDefined = 4,
    Unused = 5,
    Byte = 6,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TrainerSpec {
    #[prost(enumeration = "ModelType", optional, tag = "3")]
    pub model_type: Option<i32>,
    #[prost(int32, optional, tag = "4")]
    pub vocab_size: Option<i32>,
    #[prost(bool, optional, tag = "35")]
    pub byte_fallback: Option<bool>,
    #[prost(string, optional, tag = "44")]
    pub unk_surface: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ModelType {
    Unigram = 1,
    Bpe = 2,
    Word = 3,
    Char = 4,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NormalizerSpec {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(bool, optional, tag = "3")]
    pub add_dummy_prefix: Option<bool>,
    #[prost(bool, optional, tag = "4")]
    pub remove_extra_whitespaces: Option<bool>,
}

/// Surface emitted for the unknown piece when the trainer spec sets none.
pub const DEFAULT_UNK_SURFACE: &str = " \u{2047} ";

impl SentencePiece {
    /// Convenience constructor, mostly for building models in code.
    pub fn new(piece: impl Into<String>, score: f32, kind: PieceType) -> Self {
        Self {
            piece: Some(piece.into()),
            score: Some(score),
            kind: Some(kind as i32),
        }
    }

    pub fn text(&self) -> &str {
        self.piece.as_deref().unwrap_or("")
    }

    pub fn piece_type(&self) -> PieceType {
        self.kind
            .and_then(|k| PieceType::try_from(k).ok())
            .unwrap_or(PieceType::Normal)
    }
}

impl TrainerSpec {
    pub fn model_kind(&self) -> Result<ModelType, ModelError> {
        match self.model_type {
            None => Ok(ModelType::Unigram),
            Some(raw) => ModelType::try_from(raw)
                .map_err(|_| ModelError::UnsupportedModelType(format!("#{raw}"))),
        }
    }

    pub fn byte_fallback_enabled(&self) -> bool {
        self.byte_fallback.unwrap_or(false)
    }

    pub fn unk_surface_or_default(&self) -> &str {
        self.unk_surface.as_deref().unwrap_or(DEFAULT_UNK_SURFACE)
    }
}

impl NormalizerSpec {
    /// Flags as `(add_dummy_prefix, remove_extra_whitespaces)`; both default on.
    pub fn flags(&self) -> (bool, bool) {
        (
            self.add_dummy_prefix.unwrap_or(true),
            self.remove_extra_whitespaces.unwrap_or(true),
        )
    }
}

/// Parse `<0xHH>` into its byte value.
pub(crate) const fn as_byte_token(piece: &[u8]) -> Option<u8> {
    match piece {
        &[b'<', b'0', b'x', a, b, b'>'] if a.is_ascii_hexdigit() && b.is_ascii_hexdigit() => {
            #[inline(always)]
            const fn to_num(c: u8) -> u8 {
                match c {
                    b'0'..=b'9' => c - b'0',
                    b'a'..=b'f' => c - b'a' + 10,
                    b'A'..=b'F' => c - b'A' + 10,
                    _ => 0,
                }
            }

            Some(to_num(a) * 16 + to_num(b))
        }
        _ => None,
    }
}

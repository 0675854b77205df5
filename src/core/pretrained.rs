//! Definitions of the named GPT encodings.
//!
//! - `o200k_base` - GPT-4o, GPT-4.1, GPT-5, o3/o4 (~200k tokens)
//! - `cl100k_base` - GPT-4, GPT-3.5-turbo (~100k tokens)
//! - `p50k_base` - Codex, text-davinci-002/003 (~50k tokens)
//! - `p50k_edit` - the edit models; `p50k_base` plus FIM tokens
//! - `r50k_base` - GPT-3 (~50k tokens)
//!
//! Rank tables are not embedded. Each encoding names the `.tiktoken` asset it
//! is built from and the registry resolves that name against the configured
//! vocabulary directory.

use std::fmt;
use std::path::Path;

use rustc_hash::FxHashMap;

use super::tokenizer::{
    CoreBpe, TokenizerError, CL100K_BASE_PATTERN, O200K_BASE_PATTERN, P50K_BASE_PATTERN,
};

pub const ENDOFTEXT: &str = "<|endoftext|>";
pub const FIM_PREFIX: &str = "<|fim_prefix|>";
pub const FIM_MIDDLE: &str = "<|fim_middle|>";
pub const FIM_SUFFIX: &str = "<|fim_suffix|>";
pub const ENDOFPROMPT: &str = "<|endofprompt|>";

/// Supported BPE encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EncodingName {
    O200kBase,
    Cl100kBase,
    P50kBase,
    P50kEdit,
    R50kBase,
}

impl EncodingName {
    const ALL: [Self; 5] = [
        Self::O200kBase,
        Self::Cl100kBase,
        Self::P50kBase,
        Self::P50kEdit,
        Self::R50kBase,
    ];

    /// Parse an encoding name such as `"cl100k_base"`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }

    pub fn all() -> &'static [Self] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::O200kBase => "o200k_base",
            Self::Cl100kBase => "cl100k_base",
            Self::P50kBase => "p50k_base",
            Self::P50kEdit => "p50k_edit",
            Self::R50kBase => "r50k_base",
        }
    }

    /// File name of the rank-table asset.
    pub fn vocab_file(self) -> &'static str {
        match self {
            Self::O200kBase => "o200k_base.tiktoken",
            Self::Cl100kBase => "cl100k_base.tiktoken",
            // p50k_edit has no table of its own
            Self::P50kBase | Self::P50kEdit => "p50k_base.tiktoken",
            Self::R50kBase => "r50k_base.tiktoken",
        }
    }

    pub fn pattern(self) -> &'static str {
        match self {
            Self::O200kBase => O200K_BASE_PATTERN,
            Self::Cl100kBase => CL100K_BASE_PATTERN,
            Self::P50kBase | Self::P50kEdit | Self::R50kBase => P50K_BASE_PATTERN,
        }
    }

    pub fn special_tokens(self) -> FxHashMap<String, u32> {
        let table: &[(&str, u32)] = match self {
            Self::O200kBase => &[(ENDOFTEXT, 199999), (ENDOFPROMPT, 200018)],
            Self::Cl100kBase => &[
                (ENDOFTEXT, 100257),
                (FIM_PREFIX, 100258),
                (FIM_MIDDLE, 100259),
                (FIM_SUFFIX, 100260),
                (ENDOFPROMPT, 100276),
            ],
            Self::P50kBase | Self::R50kBase => &[(ENDOFTEXT, 50256)],
            Self::P50kEdit => &[
                (ENDOFTEXT, 50256),
                (FIM_PREFIX, 50281),
                (FIM_MIDDLE, 50282),
                (FIM_SUFFIX, 50283),
            ],
        };
        table.iter().map(|&(s, id)| (s.to_string(), id)).collect()
    }

    /// Vocabulary size to report instead of `max id + 1`, where the published
    /// encoding fixes one.
    pub fn explicit_vocab_size(self) -> Option<usize> {
        match self {
            Self::P50kBase => Some(50281),
            Self::R50kBase => Some(50257),
            _ => None,
        }
    }

    /// Build the engine for this encoding from its asset in `vocab_dir`.
    pub fn load(self, vocab_dir: &Path) -> Result<CoreBpe, TokenizerError> {
        self.load_file(&vocab_dir.join(self.vocab_file()))
    }

    /// Build the engine for this encoding from an explicit rank-table file.
    pub fn load_file(self, vocab_path: &Path) -> Result<CoreBpe, TokenizerError> {
        let bpe = CoreBpe::from_file(vocab_path, self.pattern(), self.special_tokens())?;
        Ok(match self.explicit_vocab_size() {
            Some(n) => bpe.with_explicit_vocab_size(n),
            None => bpe,
        })
    }
}

impl fmt::Display for EncodingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EncodingName {
    type Err = TokenizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| TokenizerError::EncodingNotFound(s.to_string()))
    }
}

/// Map a model name to its encoding.
///
/// The flag is false when the model was not recognised and the `o200k_base`
/// fallback was used. Matching is case-insensitive.
pub fn encoding_for_model(model: &str) -> (EncodingName, bool) {
    let model = model.to_lowercase();
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| model.starts_with(p));

    if starts(&["gpt-5", "gpt-4.1", "gpt-4o", "o3", "o4"]) {
        (EncodingName::O200kBase, true)
    } else if starts(&["gpt-4", "gpt-3.5"]) {
        (EncodingName::Cl100kBase, true)
    } else if starts(&["llama-", "deepseek-", "qwen-", "phi-"]) {
        (EncodingName::Cl100kBase, true)
    } else if model.contains("davinci") || model.contains("curie") {
        (EncodingName::P50kBase, true)
    } else {
        (EncodingName::O200kBase, false)
    }
}

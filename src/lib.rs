//! Token counting for LLM text.
//!
//! Two exact engines reproduce real tokenizers bit for bit:
//!
//! - rank BPE for the OpenAI encodings (`o200k_base`, `cl100k_base`,
//!   `p50k_base`, `p50k_edit`, `r50k_base`)
//! - SentencePiece BPE for `.model` files (Llama, Mistral, Gemma and friends)
//!
//! A character-ratio estimate covers models with no public tokenizer.
//!
//! ```no_run
//! use tokencount::{Config, Registry};
//!
//! let registry = Registry::new(Config::from_env());
//! let tokenizer = registry.tokenizer_for_model("gpt-4o")?;
//! assert_eq!(tokenizer.count_tokens("Hello, world!")?, 4);
//! # Ok::<(), tokencount::TokenizerError>(())
//! ```
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod config;
pub mod core;
pub mod counter;
pub mod registry;

pub use config::Config;
pub use core::{
    encoding_for_model, CoreBpe, EncodingName, ModelError, Processor, SpecialTokens, Token,
    TokenizerError, VocabError, CL100K_BASE_PATTERN, O200K_BASE_PATTERN, P50K_BASE_PATTERN,
};
pub use counter::Tokenizer;
pub use registry::Registry;

//! Tokenization engines.
//!
//! - [`CoreBpe`]: GPT-style rank BPE (`o200k_base`, `cl100k_base`, the 50k
//!   encodings) with regex pre-tokenization and special-token policy
//! - [`Processor`]: SentencePiece BPE loaded from a `.model` file, with
//!   user-defined pieces and byte fallback
//! - [`vocab`]: `.tiktoken` rank-table loading
//! - [`pretrained`]: the named encodings and the model → encoding mapping
//!
//! Both engines share the [`priority_queue`] that drives their merge loops.
//! Everything here is immutable after construction and safe to share between
//! threads.

mod bpe;
pub mod pretrained;
pub mod priority_queue;
pub mod sentencepiece;
mod tokenizer;
mod trie;
pub mod vocab;

pub use bpe::{byte_pair_encode, byte_pair_split};
pub use pretrained::{encoding_for_model, EncodingName};
pub use priority_queue::PriorityQueue;
pub use sentencepiece::{
    ModelError, ModelProto, ModelType, NormalizerSpec, PieceType, Processor, SentencePiece, Token,
    TrainerSpec,
};
pub use tokenizer::{
    CoreBpe, SpecialTokens, TokenizerError, CL100K_BASE_PATTERN, O200K_BASE_PATTERN,
    P50K_BASE_PATTERN,
};
pub use trie::PrefixMatcher;
pub use vocab::{build_decoder, load_tiktoken_bpe, load_tiktoken_bpe_file, VocabError};

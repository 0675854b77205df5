//! Rank-table loading for the tiktoken BPE format.
//!
//! OpenAI ships every GPT vocabulary (`r50k_base`, `p50k_base`, `cl100k_base`,
//! `o200k_base`) as a `.tiktoken` text file with one entry per line:
//!
//! ```text
//! SGVsbG8= 0
//! V29ybGQ= 1
//! IQ== 2
//! ```
//!
//! Each line holds a base64-encoded byte sequence, a single space, and the
//! sequence's rank. Ranks double as token IDs, and lower ranks merge first.
//!
//! The parser is lenient about layout but strict about content. Blank lines
//! and lines without exactly two space-separated fields are skipped. A field
//! that is present but fails to decode is a hard error.

use base64::{engine::general_purpose::STANDARD, Engine};
use rustc_hash::FxHashMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur when loading or validating a rank table.
#[derive(Error, Debug)]
pub enum VocabError {
    #[error("line {line}: invalid base64 token: {source}")]
    Base64 {
        line: usize,
        #[source]
        source: base64::DecodeError,
    },
    #[error("line {line}: invalid rank {value:?}")]
    Rank { line: usize, value: String },
    #[error("rank {rank} is assigned to more than one byte sequence")]
    DuplicateRank { rank: u32 },
    #[error("vocabulary has no entry for single byte 0x{byte:02X}")]
    MissingByte { byte: u8 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load a tiktoken BPE rank table from raw bytes.
pub fn load_tiktoken_bpe(data: &[u8]) -> Result<FxHashMap<Vec<u8>, u32>, VocabError> {
    let mut encoder = FxHashMap::default();

    for (idx, line) in data.split(|&b| b == b'\n').enumerate() {
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split(|&b| b == b' ');
        let (Some(token_b64), Some(rank_str), None) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };

        let token = STANDARD
            .decode(token_b64)
            .map_err(|source| VocabError::Base64 {
                line: idx + 1,
                source,
            })?;

        let rank = std::str::from_utf8(rank_str)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| VocabError::Rank {
                line: idx + 1,
                value: String::from_utf8_lossy(rank_str).into_owned(),
            })?;

        encoder.insert(token, rank);
    }

    Ok(encoder)
}

/// Load a tiktoken BPE rank table from a file path.
pub fn load_tiktoken_bpe_file(path: impl AsRef<Path>) -> Result<FxHashMap<Vec<u8>, u32>, VocabError> {
    let data = std::fs::read(path)?;
    load_tiktoken_bpe(&data)
}

/// Build the rank → bytes decoder for an encoder map.
///
/// Fails if two byte sequences share a rank, since decoding would then be
/// ambiguous.
pub fn build_decoder(encoder: &FxHashMap<Vec<u8>, u32>) -> Result<FxHashMap<u32, Vec<u8>>, VocabError> {
    let mut decoder = FxHashMap::with_capacity_and_hasher(encoder.len(), Default::default());
    for (bytes, &rank) in encoder {
        if decoder.insert(rank, bytes.clone()).is_some() {
            return Err(VocabError::DuplicateRank { rank });
        }
    }
    Ok(decoder)
}

/// Check that every single byte has a rank, so byte-level merging can always
/// cover arbitrary input.
pub fn check_byte_coverage(encoder: &FxHashMap<Vec<u8>, u32>) -> Result<(), VocabError> {
    for byte in 0..=255u8 {
        if !encoder.contains_key([byte].as_slice()) {
            return Err(VocabError::MissingByte { byte });
        }
    }
    Ok(())
}

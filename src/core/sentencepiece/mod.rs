//! SentencePiece BPE engine driven by a serialized `.model` file.
//!
//! Encoding works in three steps:
//!
//! 1. **Normalize**: every space becomes `▁` (U+2581). Nothing else changes;
//!    models that ask for a dummy prefix or whitespace collapsing are
//!    rejected at load time.
//! 2. **Segment**: user-defined pieces are carved out whole by longest-prefix
//!    match and marked unmergeable. Everything else splits into single
//!    codepoints.
//! 3. **Merge**: adjacent symbols whose concatenation is a piece are merged
//!    best-score-first (leftmost on ties) until no pair remains. Survivors
//!    that are not pieces fall back to `<0xHH>` byte tokens when the model
//!    enables byte fallback.
//!
//! Decoding reverses this. Runs of byte tokens are reassembled into UTF-8,
//! control tokens vanish, and `▁` turns back into a space.

pub mod model;

use prost::Message;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use super::priority_queue::PriorityQueue;
use super::trie::PrefixMatcher;
pub use model::{ModelError, ModelProto, ModelType, NormalizerSpec, PieceType, SentencePiece, TrainerSpec};
use model::as_byte_token;

/// Marker that replaces literal spaces during normalization.
pub const WHITESPACE_SEPARATOR: char = '\u{2581}';

/// A single token: its ID and the surface text it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: u32,
    pub text: String,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token{{ID: {}, Text: {:?}}}", self.id, self.text)
    }
}

pub fn normalize(text: &str) -> String {
    text.replace(' ', WHITESPACE_SEPARATOR.encode_utf8(&mut [0; 4]))
}

pub fn denormalize(text: &str) -> String {
    text.replace(WHITESPACE_SEPARATOR, " ")
}

/// Append `bytes` as UTF-8, emitting one U+FFFD for every byte that does not
/// start a valid sequence.
fn push_utf8_lossy(out: &mut String, mut bytes: &[u8]) {
    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                out.push_str(valid);
                return;
            }
            Err(err) => {
                let (valid, rest) = bytes.split_at(err.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                out.push(char::REPLACEMENT_CHARACTER);
                bytes = &rest[1..];
            }
        }
    }
}

struct PieceMeta {
    text: String,
    score: f32,
    kind: PieceType,
    byte: Option<u8>,
}

/// SentencePiece processor built from a BPE `.model` file.
///
/// Immutable once loaded; `encode`/`decode` can run concurrently on a shared
/// instance.
pub struct Processor {
    meta: Vec<PieceMeta>,
    /// NORMAL, USER_DEFINED and UNUSED pieces: the merge targets.
    pieces: FxHashMap<String, u32>,
    /// CONTROL, UNKNOWN and BYTE pieces: exact lookups only.
    reserved: FxHashMap<String, u32>,
    user_defined: PrefixMatcher,
    /// Byte value → `<0xHH>` piece ID; present iff byte fallback is on.
    byte_tokens: Option<Box<[u32; 256]>>,
    unknown_id: u32,
    unk_surface: String,
    max_piece_len: usize,
    model_type: ModelType,
}

/// One node of the encode-time symbol list.
#[derive(Clone, Copy)]
struct Symbol {
    prev: Option<usize>,
    next: Option<usize>,
    no_merge: bool,
    dead: bool,
    start: usize,
    end: usize,
}

impl Symbol {
    #[inline]
    fn len(&self) -> usize {
        self.end - self.start
    }
}

#[derive(Clone, Copy)]
struct MergeCandidate {
    left: usize,
    right: usize,
    len: usize,
    score: f32,
}

/// Higher score first, then leftmost. Scores compare numerically, so `0.0`
/// and `-0.0` tie.
fn by_score_then_position(a: &MergeCandidate, b: &MergeCandidate) -> Ordering {
    a.score
        .partial_cmp(&b.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.left.cmp(&a.left))
}

#[inline]
fn is_stale(symbols: &[Symbol], c: &MergeCandidate) -> bool {
    let (l, r) = (&symbols[c.left], &symbols[c.right]);
    l.dead || r.dead || l.len() + r.len() != c.len
}

impl Processor {
    /// Load a processor from a `.model` file path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&data)
    }

    /// Load a processor from serialized model bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ModelError> {
        Self::from_model(ModelProto::decode(data)?)
    }

    /// Validate a decoded model and build the lookup tables.
    pub fn from_model(model: ModelProto) -> Result<Self, ModelError> {
        let trainer = model.trainer_spec.unwrap_or_default();
        let model_type = trainer.model_kind()?;
        if model_type != ModelType::Bpe {
            return Err(ModelError::UnsupportedModelType(format!("{model_type:?}")));
        }

        let (add_dummy_prefix, remove_extra_whitespaces) =
            model.normalizer_spec.unwrap_or_default().flags();
        if add_dummy_prefix || remove_extra_whitespaces {
            return Err(ModelError::UnsupportedNormalizer {
                add_dummy_prefix,
                remove_extra_whitespaces,
            });
        }

        let byte_fallback = trainer.byte_fallback_enabled();
        let mut pieces = FxHashMap::default();
        let mut reserved = FxHashMap::default();
        let mut user_defined = Vec::new();
        let mut bytes: [Option<u32>; 256] = [None; 256];
        let mut unknown_id = None;
        let mut max_piece_len = 0;
        let mut meta = Vec::with_capacity(model.pieces.len());

        for (i, piece) in model.pieces.into_iter().enumerate() {
            let id = u32::try_from(i)
                .map_err(|_| ModelError::Invalid(format!("too many pieces ({i})")))?;
            let kind = piece.piece_type();
            let score = piece.score.unwrap_or(0.0);
            let text = piece.piece.unwrap_or_default();
            let mut byte = None;

            match kind {
                PieceType::Normal | PieceType::UserDefined | PieceType::Unused => {
                    max_piece_len = max_piece_len.max(text.len());
                    pieces.insert(text.clone(), id);
                }
                PieceType::Unknown | PieceType::Control | PieceType::Byte => {
                    reserved.insert(text.clone(), id);
                }
            }

            match kind {
                PieceType::UserDefined => user_defined.push((text.clone(), id)),
                PieceType::Unknown => {
                    if let Some(previous) = unknown_id.replace(id) {
                        return Err(ModelError::Invalid(format!(
                            "unknown piece redefined (ids {previous} and {id})"
                        )));
                    }
                }
                PieceType::Byte => {
                    if !byte_fallback {
                        return Err(ModelError::Invalid(format!(
                            "byte piece {text:?} found but byte_fallback is off"
                        )));
                    }
                    byte = as_byte_token(text.as_bytes());
                    if let Some(b) = byte {
                        bytes[b as usize] = Some(id);
                    }
                }
                _ => {}
            }

            meta.push(PieceMeta {
                text,
                score,
                kind,
                byte,
            });
        }

        let unknown_id =
            unknown_id.ok_or_else(|| ModelError::Invalid("unknown piece is not defined".into()))?;

        let byte_tokens = if byte_fallback {
            let mut table = Box::new([0u32; 256]);
            for (value, slot) in bytes.iter().enumerate() {
                table[value] = slot.ok_or_else(|| {
                    ModelError::Invalid(format!("byte value 0x{value:02X} not found"))
                })?;
            }
            Some(table)
        } else {
            None
        };

        let user_defined = PrefixMatcher::new(user_defined);
        tracing::debug!(
            pieces = meta.len(),
            user_defined = user_defined.len(),
            byte_fallback,
            "loaded SentencePiece model"
        );

        Ok(Self {
            meta,
            pieces,
            reserved,
            user_defined,
            byte_tokens,
            unknown_id,
            unk_surface: trainer.unk_surface_or_default().to_string(),
            max_piece_len,
            model_type,
        })
    }

    /// Segment the normalized text and merge it; returns surviving byte spans in order.
    fn merge_symbols(&self, text: &str) -> Vec<(usize, usize)> {
        let mut symbols: Vec<Symbol> = Vec::with_capacity(text.len());
        let mut pos = 0;
        while pos < text.len() {
            let rest = &text[pos..];
            let (len, no_merge) = match self.user_defined.find_prefix_len(rest) {
                0 => (rest.chars().next().map_or(1, char::len_utf8), false),
                n => (n, true),
            };
            let idx = symbols.len();
            symbols.push(Symbol {
                prev: idx.checked_sub(1),
                next: Some(idx + 1),
                no_merge,
                dead: false,
                start: pos,
                end: pos + len,
            });
            pos += len;
        }
        let Some(last) = symbols.last_mut() else {
            return Vec::new();
        };
        last.next = None;

        let mut queue = PriorityQueue::with_capacity(symbols.len(), by_score_then_position);
        let suggest = |symbols: &[Symbol],
                       queue: &mut PriorityQueue<MergeCandidate, _>,
                       left: Option<usize>,
                       right: Option<usize>| {
            let (Some(left), Some(right)) = (left, right) else {
                return;
            };
            let (l, r) = (&symbols[left], &symbols[right]);
            if l.no_merge || r.no_merge {
                return;
            }
            let len = l.len() + r.len();
            if len > self.max_piece_len {
                return;
            }
            if let Some(&id) = self.pieces.get(&text[l.start..r.end]) {
                queue.insert(MergeCandidate {
                    left,
                    right,
                    len,
                    score: self.meta[id as usize].score,
                });
            }
        };

        for i in 1..symbols.len() {
            suggest(&symbols, &mut queue, Some(i - 1), Some(i));
        }

        let mut dead_entries = 0usize;
        while let Some(c) = queue.pop_max() {
            if is_stale(&symbols, &c) {
                dead_entries += 1;
                if dead_entries * 3 > queue.len() {
                    queue.remove_matching(|c| is_stale(&symbols, c));
                    dead_entries = 0;
                }
                continue;
            }

            let right = symbols[c.right];
            symbols[c.left].end = right.end;
            symbols[c.left].next = right.next;
            if let Some(next) = right.next {
                symbols[next].prev = Some(c.left);
            }
            symbols[c.right].dead = true;
            debug_assert_eq!(symbols[c.left].len(), c.len);

            suggest(&symbols, &mut queue, symbols[c.left].prev, Some(c.left));
            suggest(&symbols, &mut queue, Some(c.left), symbols[c.left].next);
        }

        let mut spans = Vec::new();
        let mut cursor = Some(0);
        while let Some(i) = cursor {
            spans.push((symbols[i].start, symbols[i].end));
            cursor = symbols[i].next;
        }
        spans
    }

    fn symbol_to_id(&self, symbol: &str) -> u32 {
        self.reserved
            .get(symbol)
            .or_else(|| self.pieces.get(symbol))
            .copied()
            .unwrap_or(self.unknown_id)
    }

    /// Tokenize `text` into pieces.
    pub fn encode(&self, text: &str) -> Vec<Token> {
        let normalized = normalize(text);
        let spans = self.merge_symbols(&normalized);

        let mut tokens = Vec::with_capacity(spans.len());
        for (start, end) in spans {
            let symbol = &normalized[start..end];
            let id = self.symbol_to_id(symbol);
            match (&self.byte_tokens, id == self.unknown_id) {
                (Some(byte_tokens), true) => {
                    tokens.extend(symbol.bytes().map(|b| {
                        let id = byte_tokens[b as usize];
                        Token {
                            id,
                            text: self.meta[id as usize].text.clone(),
                        }
                    }));
                }
                _ => tokens.push(Token {
                    id,
                    text: symbol.to_string(),
                }),
            }
        }
        tokens
    }

    /// Tokenize `text`, returning only the IDs.
    pub fn encode_ids(&self, text: &str) -> Vec<u32> {
        self.encode(text).into_iter().map(|t| t.id).collect()
    }

    /// Batch-encode texts in parallel, returning IDs.
    pub fn encode_batch(&self, texts: &[String]) -> Vec<Vec<u32>> {
        texts.par_iter().map(|text| self.encode_ids(text)).collect()
    }

    /// Token counts for many texts, in parallel.
    pub fn count_batch(&self, texts: &[String]) -> Vec<usize> {
        texts.par_iter().map(|text| self.encode(text).len()).collect()
    }

    /// Turn token IDs back into text.
    ///
    /// IDs outside the model are skipped.
    pub fn decode(&self, ids: &[u32]) -> String {
        let mut out = String::new();
        let mut byte_run: Vec<u8> = Vec::new();

        for &id in ids {
            let Some(meta) = self.meta.get(id as usize) else {
                tracing::warn!(id, "skipping token id outside the model");
                continue;
            };
            if let (PieceType::Byte, Some(b)) = (meta.kind, meta.byte) {
                byte_run.push(b);
                continue;
            }
            if !byte_run.is_empty() {
                push_utf8_lossy(&mut out, &byte_run);
                byte_run.clear();
            }
            match meta.kind {
                PieceType::Control => {}
                _ if id == self.unknown_id => out.push_str(&self.unk_surface),
                _ => out.push_str(&denormalize(&meta.text)),
            }
        }
        push_utf8_lossy(&mut out, &byte_run);
        out
    }

    /// Decode a token sequence produced by [`encode`](Self::encode).
    pub fn decode_tokens(&self, tokens: &[Token]) -> String {
        let ids: Vec<u32> = tokens.iter().map(|t| t.id).collect();
        self.decode(&ids)
    }

    pub fn vocab_size(&self) -> usize {
        self.meta.len()
    }

    pub fn unknown_id(&self) -> u32 {
        self.unknown_id
    }

    pub fn byte_fallback(&self) -> bool {
        self.byte_tokens.is_some()
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }
}

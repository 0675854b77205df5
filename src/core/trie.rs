//! Longest-prefix matching against a fixed set of literal strings.
//!
//! Used by the SentencePiece segmenter to carve whole user-defined pieces out
//! of the input before the generic one-codepoint split.

use patricia_tree::PatriciaMap;

/// Prefix trie over a fixed vocabulary of literal strings.
///
/// Every member is valid UTF-8 and so is every query, which means a matched
/// byte prefix always ends on a character boundary.
#[derive(Default)]
pub struct PrefixMatcher {
    trie: PatriciaMap<u32>,
}

impl PrefixMatcher {
    /// Build from `(word, id)` pairs. Empty words can never match and are skipped.
    pub fn new<S: AsRef<str>>(words: impl IntoIterator<Item = (S, u32)>) -> Self {
        let mut trie = PatriciaMap::new();
        for (word, id) in words {
            let word = word.as_ref();
            if !word.is_empty() {
                trie.insert(word.as_bytes(), id);
            }
        }
        Self { trie }
    }

    /// Length in bytes of the longest member that is a prefix of `text`, or 0.
    #[inline]
    pub fn find_prefix_len(&self, text: &str) -> usize {
        self.find_prefix(text).map_or(0, |(len, _)| len)
    }

    /// Like [`find_prefix_len`](Self::find_prefix_len) but also returns the id
    /// the member was registered with.
    pub fn find_prefix(&self, text: &str) -> Option<(usize, u32)> {
        self.trie
            .get_longest_common_prefix(text.as_bytes())
            .map(|(prefix, &id)| (prefix.len(), id))
            .filter(|&(len, _)| len > 0)
    }

    pub fn len(&self) -> usize {
        self.trie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }
}

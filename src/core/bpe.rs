//! Rank-driven byte-pair merging for a single pre-tokenized chunk.
//!
//! The chunk starts as one part per byte. Each step merges the adjacent pair
//! whose concatenation has the lowest rank in the table, taking the leftmost
//! pair on ties, until no adjacent concatenation has a rank. This is the same
//! result as the quadratic rescan in the reference implementation. Parts live
//! in an index-linked list, and pending pairs sit in a heap, so each merge
//! costs O(log n) instead of a full rescan.

use rustc_hash::FxHashMap;

use super::priority_queue::PriorityQueue;

#[derive(Clone, Copy)]
struct Part {
    start: usize,
    end: usize,
    prev: Option<usize>,
    next: Option<usize>,
    dead: bool,
}

#[derive(Clone, Copy)]
struct Candidate {
    rank: u32,
    left: usize,
    right: usize,
    /// End of the merged span when the candidate was queued.
    end: usize,
}

/// Lower rank first, then leftmost.
fn by_rank_then_position(a: &Candidate, b: &Candidate) -> std::cmp::Ordering {
    b.rank.cmp(&a.rank).then_with(|| b.left.cmp(&a.left))
}

#[inline]
fn is_stale(parts: &[Part], c: &Candidate) -> bool {
    let (l, r) = (&parts[c.left], &parts[c.right]);
    l.dead || r.dead || r.end != c.end
}

/// Split `piece` into the byte ranges that survive merging, in order.
fn merge_spans(piece: &[u8], ranks: &FxHashMap<Vec<u8>, u32>) -> Vec<(usize, usize)> {
    let n = piece.len();
    let mut parts: Vec<Part> = (0..n)
        .map(|i| Part {
            start: i,
            end: i + 1,
            prev: i.checked_sub(1),
            next: (i + 1 < n).then_some(i + 1),
            dead: false,
        })
        .collect();

    let mut queue = PriorityQueue::with_capacity(n, by_rank_then_position);
    let suggest = |parts: &[Part], queue: &mut PriorityQueue<Candidate, _>, left: usize, right: usize| {
        let (start, end) = (parts[left].start, parts[right].end);
        if let Some(&rank) = ranks.get(&piece[start..end]) {
            queue.insert(Candidate {
                rank,
                left,
                right,
                end,
            });
        }
    };

    for i in 1..n {
        suggest(&parts, &mut queue, i - 1, i);
    }

    let mut dead_entries = 0usize;
    while let Some(c) = queue.pop_max() {
        if is_stale(&parts, &c) {
            dead_entries += 1;
            if dead_entries * 3 > queue.len() {
                queue.remove_matching(|c| is_stale(&parts, c));
                dead_entries = 0;
            }
            continue;
        }

        let right = parts[c.right];
        parts[c.left].end = right.end;
        parts[c.left].next = right.next;
        if let Some(next) = right.next {
            parts[next].prev = Some(c.left);
        }
        parts[c.right].dead = true;

        if let Some(prev) = parts[c.left].prev {
            suggest(&parts, &mut queue, prev, c.left);
        }
        if let Some(next) = parts[c.left].next {
            suggest(&parts, &mut queue, c.left, next);
        }
    }

    let mut spans = Vec::new();
    let mut cursor = (n > 0).then_some(0);
    while let Some(i) = cursor {
        spans.push((parts[i].start, parts[i].end));
        cursor = parts[i].next;
    }
    spans
}

/// Encode one chunk into ranks.
///
/// Every single byte is expected to have a rank (the engine checks this when
/// it is built); a byte without one is skipped.
pub fn byte_pair_encode(piece: &[u8], ranks: &FxHashMap<Vec<u8>, u32>) -> Vec<u32> {
    if piece.len() == 1 {
        return ranks.get(piece).copied().into_iter().collect();
    }
    merge_spans(piece, ranks)
        .into_iter()
        .filter_map(|(start, end)| ranks.get(&piece[start..end]).copied())
        .collect()
}

/// Split one chunk into the byte sequences its tokens cover.
pub fn byte_pair_split<'a>(piece: &'a [u8], ranks: &FxHashMap<Vec<u8>, u32>) -> Vec<&'a [u8]> {
    merge_spans(piece, ranks)
        .into_iter()
        .map(|(start, end)| &piece[start..end])
        .collect()
}

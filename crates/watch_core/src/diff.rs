//! Block-level diff with deterministic relevance scoring.

use std::collections::HashSet;

use crate::types::{ChangeKind, ChangeSegment, MAX_EXCERPT_CHARS, MAX_RELEVANCE};

/// Keywords that boost relevance when no list is configured.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "price", "pricing", "plan", "tier", "trial", "launch", "release", "deprecated", "feature",
    "$",
];

/// Removed/added blocks at least this similar are reported as one modification.
const MODIFIED_SIMILARITY: f64 = 0.5;

/// Beyond this many LCS cells the middle region is treated as one gap.
const MAX_LCS_CELLS: usize = 4_000_000;

const LENGTH_SATURATION: usize = 300;
const LENGTH_WEIGHT_MAX: usize = 30;
const POSITION_WEIGHT_MAX: usize = 20;
const KEYWORD_WEIGHT: usize = 25;
const KEYWORD_WEIGHT_MAX: usize = 50;

#[derive(Debug, Clone)]
pub struct DiffEngine {
    keywords: Vec<String>,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS.iter().copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Delete(usize),
    Insert(usize),
}

impl DiffEngine {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut engine = Self {
            keywords: Vec::new(),
        };
        engine.add_keywords(keywords);
        engine
    }

    /// Copy of this engine with `extra` keywords appended.
    pub fn with_extra_keywords<S: AsRef<str>>(&self, extra: &[S]) -> Self {
        let mut engine = self.clone();
        engine.add_keywords(extra);
        engine
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    fn add_keywords<I, S>(&mut self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if !keyword.is_empty() && !self.keywords.contains(&keyword) {
                self.keywords.push(keyword);
            }
        }
    }

    /// Ranked segments for every block that is not unchanged.
    ///
    /// `old = None` is the first observation of a target: the whole text
    /// becomes a single `added` segment with maximal relevance.
    pub fn diff(&self, old: Option<&str>, new: &str) -> Vec<ChangeSegment> {
        let Some(old) = old else {
            if new.trim().is_empty() {
                return Vec::new();
            }
            return vec![ChangeSegment {
                kind: ChangeKind::Added,
                excerpt: bounded_excerpt(new),
                relevance_score: MAX_RELEVANCE,
                position: 0,
                keywords: self.matched_keywords(new),
            }];
        };

        let old_blocks = split_blocks(old);
        let new_blocks = split_blocks(new);
        let ops = align(&old_blocks, &new_blocks);

        let mut segments = Vec::new();
        let mut gap = Vec::new();
        for op in ops {
            if op == Op::Equal {
                self.flush_gap(&mut gap, &old_blocks, &new_blocks, &mut segments);
            } else {
                gap.push(op);
            }
        }
        self.flush_gap(&mut gap, &old_blocks, &new_blocks, &mut segments);

        // Stable sort keeps document order among equal scores.
        segments.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
        segments
    }

    fn flush_gap(
        &self,
        gap: &mut Vec<Op>,
        old_blocks: &[&str],
        new_blocks: &[&str],
        segments: &mut Vec<ChangeSegment>,
    ) {
        if gap.is_empty() {
            return;
        }
        let removed: Vec<usize> = gap
            .iter()
            .filter_map(|op| match op {
                Op::Delete(i) => Some(*i),
                _ => None,
            })
            .collect();
        let added: Vec<usize> = gap
            .iter()
            .filter_map(|op| match op {
                Op::Insert(j) => Some(*j),
                _ => None,
            })
            .collect();
        gap.clear();

        // Pair removed with added blocks in order.
        let mut partner: Vec<Option<usize>> = vec![None; added.len()];
        let mut paired_removed = vec![false; removed.len()];
        let mut next_added = 0;
        for (ri, &i) in removed.iter().enumerate() {
            let found = (next_added..added.len())
                .find(|&ai| similarity(old_blocks[i], new_blocks[added[ai]]) >= MODIFIED_SIMILARITY);
            if let Some(ai) = found {
                partner[ai] = Some(i);
                paired_removed[ri] = true;
                next_added = ai + 1;
            }
        }

        for (ri, &i) in removed.iter().enumerate() {
            if !paired_removed[ri] {
                segments.push(self.segment(ChangeKind::Removed, old_blocks[i], i, old_blocks.len()));
            }
        }
        for (ai, &j) in added.iter().enumerate() {
            let kind = if partner[ai].is_some() {
                ChangeKind::Modified
            } else {
                ChangeKind::Added
            };
            segments.push(self.segment(kind, new_blocks[j], j, new_blocks.len()));
        }
    }

    fn segment(&self, kind: ChangeKind, text: &str, index: usize, total: usize) -> ChangeSegment {
        let keywords = self.matched_keywords(text);
        ChangeSegment {
            kind,
            excerpt: bounded_excerpt(text),
            relevance_score: relevance(text, index, total, keywords.len()),
            position: index,
            keywords,
        }
    }

    fn matched_keywords(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.keywords
            .iter()
            .filter(|k| lowered.contains(k.as_str()))
            .cloned()
            .collect()
    }
}

/// Length (0..=30) + position (0..=20) + keywords (25 each, at most 50).
fn relevance(text: &str, index: usize, total: usize, keyword_hits: usize) -> u8 {
    let length = text.chars().count().min(LENGTH_SATURATION) * LENGTH_WEIGHT_MAX / LENGTH_SATURATION;
    let position = if total == 0 {
        0
    } else {
        POSITION_WEIGHT_MAX * total.saturating_sub(index) / total
    };
    let keywords = (keyword_hits * KEYWORD_WEIGHT).min(KEYWORD_WEIGHT_MAX);
    (length + position + keywords).min(MAX_RELEVANCE as usize) as u8
}

/// Split normalized text into lines, then into sentences.
pub fn split_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    for line in text.lines() {
        let mut start = 0;
        let bytes = line.as_bytes();
        for (idx, &b) in bytes.iter().enumerate() {
            let ends_sentence = matches!(b, b'.' | b'!' | b'?')
                && bytes.get(idx + 1).is_some_and(|next| *next == b' ');
            if ends_sentence {
                push_block(&mut blocks, &line[start..=idx]);
                start = idx + 1;
            }
        }
        push_block(&mut blocks, &line[start..]);
    }
    blocks
}

fn push_block<'a>(blocks: &mut Vec<&'a str>, block: &'a str) {
    let block = block.trim();
    if !block.is_empty() {
        blocks.push(block);
    }
}

/// Edit script over blocks: common prefix/suffix, LCS for the middle.
fn align(old: &[&str], new: &[&str]) -> Vec<Op> {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops = vec![Op::Equal; prefix];
    if old_mid.len().saturating_mul(new_mid.len()) > MAX_LCS_CELLS {
        ops.extend((0..old_mid.len()).map(|i| Op::Delete(prefix + i)));
        ops.extend((0..new_mid.len()).map(|j| Op::Insert(prefix + j)));
    } else {
        ops.extend(lcs_ops(old_mid, new_mid, prefix));
    }
    ops.extend(std::iter::repeat(Op::Equal).take(suffix));
    ops
}

fn lcs_ops(old: &[&str], new: &[&str], offset: usize) -> Vec<Op> {
    let (n, m) = (old.len(), new.len());
    let width = m + 1;
    // table[i][j] = LCS length of old[i..] and new[j..]
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if old[i] == new[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push(Op::Equal);
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            ops.push(Op::Delete(offset + i));
            i += 1;
        } else {
            ops.push(Op::Insert(offset + j));
            j += 1;
        }
    }
    ops.extend((i..n).map(|i| Op::Delete(offset + i)));
    ops.extend((j..m).map(|j| Op::Insert(offset + j)));
    ops
}

/// Jaccard similarity of the lowercase word sets.
fn similarity(a: &str, b: &str) -> f64 {
    let words = |s: &str| -> HashSet<String> {
        s.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect()
    };
    let (a, b) = (words(a), words(b));
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Cut `text` to [`MAX_EXCERPT_CHARS`] on a char boundary.
pub fn bounded_excerpt(text: &str) -> String {
    if text.chars().count() <= MAX_EXCERPT_CHARS {
        return text.to_string();
    }
    let mut excerpt: String = text.chars().take(MAX_EXCERPT_CHARS - 1).collect();
    excerpt.push('…');
    excerpt
}

//! Maps phrases of a generated summary back to the messages they came from
//! and injects a bounded, spread-out set of permalinks.
//!
//! Offsets are character indices; spans are byte ranges into the summary.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use recap_core::{ConversationId, MessageId, MessageRecord};

/// Existing `<a ...>...</a>` anchors. Nothing inside one is ever linked again.
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<a\s[^>]*>.*?</a>").unwrap());

static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+").unwrap());

/// Longest stretch of message text compared when no derived phrase matches.
const FALLBACK_SCAN_CHARS: usize = 512;

/// A summary phrase provisionally mapped to a source message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LinkCandidate {
    pub message_id: MessageId,
    /// Case-preserving text taken from the summary.
    pub phrase: String,
    /// Character index of the phrase in the summary.
    pub summary_offset: usize,
    /// Byte range of the phrase in the summary.
    pub span: Range<usize>,
}

impl LinkCandidate {
    fn char_len(&self) -> usize {
        self.phrase.chars().count()
    }

    fn char_range(&self) -> Range<usize> {
        self.summary_offset..self.summary_offset + self.char_len()
    }
}

/// Case-folded, anchor-aware view of a summary.
struct SummaryIndex<'a> {
    text: &'a str,
    folded: Vec<char>,
    /// Byte offset of every char, plus `text.len()` at the end.
    byte_at: Vec<usize>,
    anchored: Vec<bool>,
    anchors: Vec<Range<usize>>,
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '\''
}

impl<'a> SummaryIndex<'a> {
    fn new(text: &'a str) -> Self {
        let anchors: Vec<Range<usize>> = ANCHOR.find_iter(text).map(|m| m.range()).collect();
        let mut folded = Vec::new();
        let mut byte_at = Vec::new();
        let mut anchored = Vec::new();
        for (i, c) in text.char_indices() {
            folded.push(fold(c));
            byte_at.push(i);
            anchored.push(anchors.iter().any(|a| a.contains(&i)));
        }
        byte_at.push(text.len());
        Self {
            text,
            folded,
            byte_at,
            anchored,
            anchors,
        }
    }

    fn len(&self) -> usize {
        self.folded.len()
    }

    fn is_free(&self, range: Range<usize>) -> bool {
        !self.anchored[range].iter().any(|a| *a)
    }

    /// First occurrence of `needle` (already folded) outside anchors.
    fn find(&self, needle: &[char]) -> Option<usize> {
        if needle.is_empty() || needle.len() > self.len() {
            return None;
        }
        (0..=self.len() - needle.len())
            .find(|&i| self.folded[i..i + needle.len()] == *needle && self.is_free(i..i + needle.len()))
    }

    fn candidate(&self, message_id: MessageId, chars: Range<usize>) -> LinkCandidate {
        let span = self.byte_at[chars.start]..self.byte_at[chars.end];
        LinkCandidate {
            message_id,
            phrase: self.text[span.clone()].to_string(),
            summary_offset: chars.start,
            span,
        }
    }

    fn word_char(&self, i: usize) -> bool {
        is_word_char(self.folded[i])
    }

    /// Shrink a char range so it starts and ends on whole words.
    fn snap_to_words(&self, range: Range<usize>) -> Range<usize> {
        let (mut start, mut end) = (range.start, range.end);
        if start > 0 && start < end && self.word_char(start - 1) && self.word_char(start) {
            while start < end && self.word_char(start) {
                start += 1;
            }
        }
        while start < end && !self.word_char(start) {
            start += 1;
        }
        if end < self.len() && start < end && self.word_char(end - 1) && self.word_char(end) {
            while end > start && self.word_char(end - 1) {
                end -= 1;
            }
        }
        while end > start && !self.word_char(end - 1) {
            end -= 1;
        }
        start..end
    }

    fn overlaps_anchor(&self, span: &Range<usize>) -> bool {
        self.anchors
            .iter()
            .any(|a| span.start < a.end && a.start < span.end)
    }
}

fn char_count(s: &str) -> usize {
    s.chars().count()
}

/// Phrases of a message worth looking for in the summary.
///
/// Short messages are used whole; longer ones are split into sentences.
pub fn derive_phrases(text: &str, min_len: usize, max_len: usize) -> Vec<String> {
    let text = text.trim();
    let total = char_count(text);
    if total < min_len {
        return Vec::new();
    }
    if total <= max_len {
        return vec![text.to_string()];
    }

    let mut phrases: Vec<String> = Vec::new();
    for sentence in SENTENCE_END.split(text) {
        let sentence = sentence.trim();
        let len = char_count(sentence);
        if len >= min_len && len <= max_len && !phrases.iter().any(|p| p == sentence) {
            phrases.push(sentence.to_string());
        }
    }
    if phrases.is_empty() {
        let head: String = text.chars().take(max_len).collect();
        let head = head.trim_end();
        if char_count(head) >= min_len {
            phrases.push(head.to_string());
        }
    }
    phrases
}

/// Longest stretch shared by the message and the summary, snapped to whole
/// words. Needs at least two words and `2 * min_len` characters.
fn common_phrase(
    index: &SummaryIndex<'_>,
    text: &str,
    min_len: usize,
    max_len: usize,
) -> Option<Range<usize>> {
    let source: Vec<char> = text.chars().take(FALLBACK_SCAN_CHARS).map(fold).collect();
    let target = &index.folded;
    if source.is_empty() || target.is_empty() {
        return None;
    }

    // Rolling row of common-suffix lengths.
    let mut prev = vec![0usize; target.len() + 1];
    let mut best_len = 0;
    let mut best_end = 0;
    for &sc in &source {
        let mut row = vec![0usize; target.len() + 1];
        for (j, &tc) in target.iter().enumerate() {
            if sc == tc && !index.anchored[j] {
                row[j + 1] = prev[j] + 1;
                if row[j + 1] > best_len {
                    best_len = row[j + 1];
                    best_end = j + 1;
                }
            }
        }
        prev = row;
    }
    if best_len == 0 {
        return None;
    }

    let mut range = index.snap_to_words(best_end - best_len..best_end);
    if range.len() > max_len {
        range = index.snap_to_words(range.start..range.start + max_len);
    }
    let words = index.folded[range.clone()]
        .split(|c| c.is_whitespace())
        .filter(|w| !w.is_empty())
        .count();
    (range.len() >= min_len * 2 && words >= 2).then_some(range)
}

/// Keep the longest non-overlapping candidates, returned in summary order.
///
/// Ties on length go to the earlier offset, then to the earlier input.
pub fn resolve_overlaps(mut candidates: Vec<LinkCandidate>) -> Vec<LinkCandidate> {
    candidates.sort_by(|a, b| {
        b.char_len()
            .cmp(&a.char_len())
            .then(a.summary_offset.cmp(&b.summary_offset))
    });

    let mut accepted: Vec<LinkCandidate> = Vec::new();
    for candidate in candidates {
        let range = candidate.char_range();
        let clashes = accepted.iter().any(|a| {
            let other = a.char_range();
            range.start < other.end && other.start < range.end
        });
        if !clashes {
            accepted.push(candidate);
        }
    }
    accepted.sort_by_key(|c| c.summary_offset);
    accepted
}

/// Candidates for every message whose text shows up in the summary.
pub fn find_candidates(
    records: &[MessageRecord],
    summary: &str,
    min_phrase_len: usize,
    max_phrase_len: usize,
) -> Vec<LinkCandidate> {
    let index = SummaryIndex::new(summary);
    let mut candidates = Vec::new();

    for record in records {
        let body = record.body();
        if char_count(body.trim()) < min_phrase_len {
            continue;
        }

        let before = candidates.len();
        for phrase in derive_phrases(body, min_phrase_len, max_phrase_len) {
            let needle: Vec<char> = phrase.chars().map(fold).collect();
            if let Some(start) = index.find(&needle) {
                candidates.push(index.candidate(record.id, start..start + needle.len()));
            }
        }
        if candidates.len() == before {
            if let Some(range) = common_phrase(&index, body, min_phrase_len, max_phrase_len) {
                candidates.push(index.candidate(record.id, range));
            }
        }
    }

    let resolved = resolve_overlaps(candidates);
    debug!(candidates = resolved.len(), "link candidates resolved");
    resolved
}

/// At most one candidate per equal-width segment of the summary, the longest
/// in each.
fn spread(candidates: Vec<LinkCandidate>, summary_chars: usize, budget: usize) -> Vec<LinkCandidate> {
    if candidates.len() <= budget {
        return candidates;
    }
    if budget == 0 {
        return Vec::new();
    }

    let segment_len = (summary_chars / budget).max(1);
    let mut picked: Vec<Option<LinkCandidate>> = vec![None; budget];
    for candidate in candidates {
        let segment = (candidate.summary_offset / segment_len).min(budget - 1);
        let replace = match &picked[segment] {
            None => true,
            Some(current) => candidate.char_len() > current.char_len(),
        };
        if replace {
            picked[segment] = Some(candidate);
        }
    }
    picked.into_iter().flatten().collect()
}

/// Telegram permalink for a message.
///
/// Numeric chat ids use the private `c/` form with the supergroup `-100`
/// prefix removed; anything else is treated as a public username.
pub fn permalink(conversation_id: &ConversationId, message_id: MessageId) -> String {
    fn digits(s: &str) -> bool {
        !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
    }

    let raw = conversation_id.as_str().trim();
    let internal = raw
        .strip_prefix("-100")
        .filter(|rest| digits(rest))
        .or_else(|| raw.strip_prefix('-').filter(|rest| digits(rest)))
        .or_else(|| Some(raw).filter(|r| digits(r)));

    match internal {
        Some(id) => format!("https://t.me/c/{id}/{message_id}"),
        None => format!("https://t.me/{}/{message_id}", raw.trim_start_matches('@')),
    }
}

/// Replace candidate spans with permalinks.
///
/// Candidates whose span no longer holds their phrase, or that touch an
/// existing anchor, are dropped. Anchors already present count against
/// `max_links`.
pub fn attach_links(
    summary: &str,
    candidates: &[LinkCandidate],
    conversation_id: &ConversationId,
    max_links: usize,
) -> String {
    let index = SummaryIndex::new(summary);
    let valid: Vec<LinkCandidate> = candidates
        .iter()
        .filter(|c| summary.get(c.span.clone()) == Some(c.phrase.as_str()))
        .filter(|c| !index.overlaps_anchor(&c.span))
        .map(|c| LinkCandidate {
            summary_offset: char_count(&summary[..c.span.start]),
            ..c.clone()
        })
        .collect();

    let budget = max_links.saturating_sub(index.anchors.len());
    let mut selected = spread(resolve_overlaps(valid), index.len(), budget);
    selected.sort_by(|a, b| b.span.start.cmp(&a.span.start));

    let mut linked = summary.to_string();
    for candidate in &selected {
        let anchor = format!(
            "<a href=\"{}\">{}</a>",
            permalink(conversation_id, candidate.message_id),
            candidate.phrase
        );
        linked.replace_range(candidate.span.clone(), &anchor);
    }
    debug!(links = selected.len(), "links attached");
    linked
}

/// Number of anchors in `text`.
pub fn count_links(text: &str) -> usize {
    ANCHOR.find_iter(text).count()
}

//! Token-level, case-insensitive phrase matching.

use super::dictionary::EntityDictionary;
use crate::rag::domain::EntityLabel;
use std::collections::HashMap;
use std::ops::Range;

/// A token with its byte span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Split text into word tokens (alphanumeric runs) and single punctuation tokens.
///
/// Whitespace separates tokens and is dropped. The same tokenizer is applied to dictionary
/// phrases and to queries, so "Sun Tzu's" yields the tokens `Sun`, `Tzu`, `'`, `s`.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        if ch.is_alphanumeric() {
            word_start.get_or_insert(idx);
            continue;
        }
        if let Some(start) = word_start.take() {
            tokens.push(Token {
                text: &text[start..idx],
                start,
                end: idx,
            });
        }
        if !ch.is_whitespace() {
            let end = idx + ch.len_utf8();
            tokens.push(Token {
                text: &text[idx..end],
                start: idx,
                end,
            });
        }
    }

    if let Some(start) = word_start {
        tokens.push(Token {
            text: &text[start..],
            start,
            end: text.len(),
        });
    }

    tokens
}

/// A dictionary phrase matched against a token sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanMatch {
    /// First token index (inclusive).
    pub start: usize,
    /// Last token index (exclusive).
    pub end: usize,
    pub label: EntityLabel,
    /// First dictionary spelling.
    pub text: String,
    /// Other dictionary spellings of the same phrase and label.
    pub variants: Vec<String>,
    /// Byte range of the match in the source text.
    pub bytes: Range<usize>,
}

impl SpanMatch {
    fn len(&self) -> usize {
        self.end - self.start
    }

    fn overlaps(&self, other: &SpanMatch) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Keep only maximal, non-overlapping spans.
///
/// Candidates are visited longest first; a span survives only if it shares no token with an
/// already kept span, so any span contained in a longer match is dropped. Ties keep their
/// input order. The result is returned in text order.
pub fn filter_subspans(mut spans: Vec<SpanMatch>) -> Vec<SpanMatch> {
    spans.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut kept: Vec<SpanMatch> = Vec::with_capacity(spans.len());
    for span in spans {
        if !kept.iter().any(|k| k.overlaps(&span)) {
            kept.push(span);
        }
    }

    kept.sort_by_key(|s| s.start);
    kept
}

/// Phrase index keyed by lower-cased token sequences.
#[derive(Debug, Clone, Default)]
pub struct PhraseIndex {
    phrases: HashMap<Vec<String>, Vec<(EntityLabel, Vec<String>)>>,
    max_tokens: usize,
}

impl PhraseIndex {
    pub fn build(dictionary: &EntityDictionary) -> Self {
        let mut index = Self::default();
        for entry in dictionary.entries() {
            let key: Vec<String> = tokenize(&entry.text)
                .iter()
                .map(|t| t.text.to_lowercase())
                .collect();
            if key.is_empty() {
                continue;
            }
            index.max_tokens = index.max_tokens.max(key.len());
            let labels = index.phrases.entry(key).or_default();
            match labels.iter_mut().find(|(label, _)| *label == entry.label) {
                Some((_, spellings)) => {
                    if !spellings.contains(&entry.text) {
                        spellings.push(entry.text.clone());
                    }
                }
                None => labels.push((entry.label, vec![entry.text.clone()])),
            }
        }
        index
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Every dictionary phrase occurring in `text`, overlapping matches included.
    pub fn find_all(&self, text: &str) -> Vec<SpanMatch> {
        let tokens = tokenize(text);
        let lowered: Vec<String> = tokens.iter().map(|t| t.text.to_lowercase()).collect();
        let mut matches = Vec::new();

        for start in 0..tokens.len() {
            let longest = self.max_tokens.min(tokens.len() - start);
            for len in 1..=longest {
                let end = start + len;
                let Some(labels) = self.phrases.get(&lowered[start..end]) else {
                    continue;
                };
                for (label, spellings) in labels {
                    let Some((first, rest)) = spellings.split_first() else {
                        continue;
                    };
                    matches.push(SpanMatch {
                        start,
                        end,
                        label: *label,
                        text: first.clone(),
                        variants: rest.to_vec(),
                        bytes: tokens[start].start..tokens[end - 1].end,
                    });
                }
            }
        }

        matches
    }
}

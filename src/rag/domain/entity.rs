//! Entity labels, mentions and generic category terms.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Entity Label
// =============================================================================

/// Closed set of entity labels known to the graph store.
///
/// Labels are never interpolated from free text: graph queries obtain their table names
/// from [`EntityLabel::table`], so a label outside this set cannot reach a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityLabel {
    Person,
    Org,
    Gpe,
    Noun,
    Date,
    WorkOfArt,
    Norp,
    Event,
    Loc,
    Law,
    Fac,
    Language,
}

impl EntityLabel {
    /// Every known label, in declaration order.
    pub const ALL: [EntityLabel; 12] = [
        Self::Person,
        Self::Org,
        Self::Gpe,
        Self::Noun,
        Self::Date,
        Self::WorkOfArt,
        Self::Norp,
        Self::Event,
        Self::Loc,
        Self::Law,
        Self::Fac,
        Self::Language,
    ];

    /// Canonical upper-case tag (e.g. `WORK_OF_ART`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Org => "ORG",
            Self::Gpe => "GPE",
            Self::Noun => "NOUN",
            Self::Date => "DATE",
            Self::WorkOfArt => "WORK_OF_ART",
            Self::Norp => "NORP",
            Self::Event => "EVENT",
            Self::Loc => "LOC",
            Self::Law => "LAW",
            Self::Fac => "FAC",
            Self::Language => "LANGUAGE",
        }
    }

    /// Graph table holding entity nodes of this label.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Org => "org",
            Self::Gpe => "gpe",
            Self::Noun => "noun",
            Self::Date => "date",
            Self::WorkOfArt => "work_of_art",
            Self::Norp => "norp",
            Self::Event => "event",
            Self::Loc => "loc",
            Self::Law => "law",
            Self::Fac => "fac",
            Self::Language => "language",
        }
    }
}

impl fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a label tag is not part of the closed label set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity label: {0}")]
pub struct UnknownLabel(pub String);

impl FromStr for EntityLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(tag))
            .ok_or_else(|| UnknownLabel(tag.to_string()))
    }
}

// =============================================================================
// Entity Mention
// =============================================================================

/// A known entity found in a query.
///
/// `text` is the first dictionary spelling of the entity and `variants` holds any other
/// spellings differing only in case; the graph has one node per spelling, so all of them are
/// queried. `start..end` is the byte span of the occurrence in the query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityMention {
    pub text: String,
    pub label: EntityLabel,
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,
}

impl EntityMention {
    pub fn new(text: impl Into<String>, label: EntityLabel) -> Self {
        Self {
            text: text.into(),
            label,
            start: 0,
            end: 0,
            variants: Vec::new(),
        }
    }

    /// Add alternative spellings. Duplicates of `text` or of each other are dropped.
    #[must_use]
    pub fn with_variants<I, S>(mut self, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for variant in variants {
            let variant = variant.into();
            if variant != self.text && !self.variants.contains(&variant) {
                self.variants.push(variant);
            }
        }
        self
    }

    /// Every spelling, `text` first.
    pub fn spellings(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.text.as_str()).chain(self.variants.iter().map(String::as_str))
    }

    #[must_use]
    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

// =============================================================================
// Generic Terms
// =============================================================================

/// Category words detected in queries by default.
pub const DEFAULT_GENERIC_VOCABULARY: &[&str] = &[
    "event",
    "people",
    "person",
    "who",
    "when",
    "period",
    "place",
    "location",
    "battle",
    "dynasty",
    "historical figure",
];

/// A category keyword matched in a query (e.g. "people", "battle").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenericTerm(String);

impl GenericTerm {
    pub fn new(term: impl AsRef<str>) -> Self {
        Self(term.as_ref().trim().to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Graph label this term selects, if the term is mapped.
    #[must_use]
    pub fn label(&self) -> Option<EntityLabel> {
        match self.0.as_str() {
            "people" | "person" | "who" | "historical figure" => Some(EntityLabel::Person),
            "event" | "events" | "battle" => Some(EntityLabel::Event),
            "dynasty" | "when" | "period" => Some(EntityLabel::Date),
            "place" | "location" => Some(EntityLabel::Loc),
            _ => None,
        }
    }
}

impl fmt::Display for GenericTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GenericTerm {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

//! Retrieved passages and the bounded context handed to generation.

use serde::{Deserialize, Serialize};

/// Default cap on the number of passages in a [`ContextBundle`].
pub const MAX_CHUNKS: usize = 25;

/// A unit of retrievable text.
///
/// Graph and vector retrieval produce the same shape, so composition never has to know
/// where a passage came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    /// Source chapter or section label, when the store records one.
    #[serde(default)]
    pub chapter: Option<String>,
    /// Cosine similarity to the query (vector results only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl Passage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            chapter: None,
            similarity: None,
        }
    }

    #[must_use]
    pub fn with_chapter(mut self, chapter: impl Into<String>) -> Self {
        self.chapter = Some(chapter.into());
        self
    }

    #[must_use]
    pub fn with_similarity(mut self, similarity: f32) -> Self {
        self.similarity = Some(similarity);
        self
    }
}

impl From<String> for Passage {
    fn from(content: String) -> Self {
        Self::new(content)
    }
}

/// Ordered, capped context: graph passages first, then vector passages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub passages: Vec<Passage>,
}

impl ContextBundle {
    #[must_use]
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Passage> {
        self.passages.iter()
    }

    /// Render the passages as prompt context, one block per passage.
    #[must_use]
    pub fn render(&self) -> String {
        self.passages
            .iter()
            .map(|p| match &p.chapter {
                Some(chapter) => format!("[{chapter}]\n{}", p.content),
                None => p.content.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }
}

impl IntoIterator for ContextBundle {
    type Item = Passage;
    type IntoIter = std::vec::IntoIter<Passage>;

    fn into_iter(self) -> Self::IntoIter {
        self.passages.into_iter()
    }
}

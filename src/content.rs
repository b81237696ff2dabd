//! Generated content items and batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One structured content item (an article, a release note, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// blake3 digest over the item's text, hex encoded
    #[serde(default)]
    pub id: String,
    pub headline: String,
    pub content: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub date: String,
}

impl ContentItem {
    pub fn new(
        headline: impl Into<String>,
        content: impl Into<String>,
        author: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        let mut item = Self {
            id: String::new(),
            headline: headline.into(),
            content: content.into(),
            author: author.into(),
            topic: None,
            date: date.into(),
        };
        item.id = item.digest();
        item
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self.id = self.digest();
        self
    }

    /// Content digest; fills in `id` for items parsed without one.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.headline.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.content.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.author.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.topic.as_deref().unwrap_or("").as_bytes());
        hasher.update(&[0]);
        hasher.update(self.date.as_bytes());
        hex::encode(&hasher.finalize().as_bytes()[..16])
    }

    pub(crate) fn ensure_id(mut self) -> Self {
        if self.id.is_empty() {
            self.id = self.digest();
        }
        self
    }
}

/// Output of one successful Generator call; immutable once committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBatch {
    pub generated_at: DateTime<Utc>,
    pub items: Vec<ContentItem>,
}

impl ContentBatch {
    pub fn new(items: Vec<ContentItem>) -> Self {
        Self {
            generated_at: Utc::now(),
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Flatten batches into the item sequence handed to the Publisher.
pub fn flatten_batches<'a, I>(batches: I) -> Vec<ContentItem>
where
    I: IntoIterator<Item = &'a ContentBatch>,
{
    batches
        .into_iter()
        .flat_map(|batch| batch.items.iter().cloned())
        .collect()
}

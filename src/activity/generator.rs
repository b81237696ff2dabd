//! Generator implementations.

use crate::activity::{GenerateRequest, Generator};
use crate::content::{ContentBatch, ContentItem};
use crate::error::ActivityError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const FIRST_NAMES: [&str; 10] = [
    "John", "Sarah", "Michael", "Emma", "David", "Olivia", "James", "Sophia", "Robert", "Emily",
];
const LAST_NAMES: [&str; 10] = [
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez",
];

struct Vocabulary {
    subjects: &'static [&'static str],
    actions: &'static [&'static str],
    objects: &'static [&'static str],
    commentary: &'static str,
}

const TECHNOLOGY: Vocabulary = Vocabulary {
    subjects: &[
        "Apple", "Google", "Microsoft", "Amazon", "Meta", "Tesla", "Netflix", "IBM", "Intel",
    ],
    actions: &["launches", "announces", "unveils", "releases", "patents", "invests in"],
    objects: &[
        "smartphone", "laptop", "AI assistant", "VR headset", "robot", "drone", "wearable device",
    ],
    commentary:
        "Industry analysts are watching closely; many suggest this could shift the tech landscape.",
};

const SPORTS: Vocabulary = Vocabulary {
    subjects: &[
        "Lakers", "Warriors", "Yankees", "Red Sox", "Chiefs", "Real Madrid", "Barcelona",
        "Liverpool",
    ],
    actions: &["wins against", "defeats", "dominates", "ties with", "prepares for a rematch with"],
    objects: &["Eagles", "Manchester United", "Celtics", "Dodgers", "Arsenal", "Juventus"],
    commentary:
        "Commentators highlighted exceptional performances from key players throughout the match.",
};

const ENTERTAINMENT: Vocabulary = Vocabulary {
    subjects: &[
        "Taylor Swift", "Tom Cruise", "Beyonce", "Meryl Streep", "Ryan Reynolds", "Rihanna",
    ],
    actions: &["stars in", "releases", "announces", "wins an award for", "signs a deal for"],
    objects: &["a new film", "a new album", "a world tour", "a streaming series", "a documentary"],
    commentary:
        "The industry has been buzzing with speculation about what this means for the year ahead.",
};

const BUSINESS: Vocabulary = Vocabulary {
    subjects: &["Amazon", "Walmart", "JPMorgan", "Goldman Sachs", "Berkshire Hathaway", "Tesla"],
    actions: &["reports", "announces", "faces", "completes", "plans"],
    objects: &[
        "record profits", "layoffs", "regulatory scrutiny", "an acquisition", "an IPO", "a new CEO",
    ],
    commentary:
        "Market watchers are weighing the impact on shareholders and the wider industry.",
};

const HEALTH: Vocabulary = Vocabulary {
    subjects: &["New study", "Doctors", "Researchers", "Experts", "Health officials"],
    actions: &[
        "reveal benefits of", "recommend a new approach to", "report a breakthrough in",
        "warn about",
    ],
    objects: &[
        "nutrition", "exercise", "mental health", "sleep", "vaccines", "healthcare technology",
    ],
    commentary:
        "Medical professionals are cautiously optimistic, while noting more research is needed.",
};

const GENERAL: Vocabulary = Vocabulary {
    subjects: &["Officials", "Residents", "Organisers", "Volunteers", "Analysts"],
    actions: &["announce", "discuss", "celebrate", "review", "prepare for"],
    objects: &["new plans", "a community event", "the annual report", "upcoming changes"],
    commentary: "More details are expected to follow as the story develops.",
};

fn vocabulary_for(section: &str) -> &'static Vocabulary {
    match section.to_ascii_lowercase().as_str() {
        "technology" => &TECHNOLOGY,
        "sports" => &SPORTS,
        "entertainment" => &ENTERTAINMENT,
        "business" => &BUSINESS,
        "health" => &HEALTH,
        _ => &GENERAL,
    }
}

/// Offline generator producing section-flavoured sample items.
///
/// Word choices come from a blake3 stream over section, cycle sequence and
/// generation time, so successive cycles differ without a random source.
#[derive(Debug, Clone, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }
}

fn pick<'a>(options: &[&'a str], byte: u8) -> &'a str {
    options[byte as usize % options.len()]
}

#[async_trait]
impl Generator for TemplateGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<ContentBatch, ActivityError> {
        let now = Utc::now();
        let date = now.format("%B %d, %Y at %I:%M %p").to_string();
        let vocabulary = vocabulary_for(request.section.as_str());

        let mut hasher = blake3::Hasher::new();
        hasher.update(request.section.as_str().as_bytes());
        hasher.update(&request.sequence.to_le_bytes());
        hasher.update(&now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        let mut stream = hasher.finalize_xof();

        let mut items = Vec::with_capacity(request.count as usize);
        for _ in 0..request.count {
            let mut bytes = [0u8; 5];
            stream.fill(&mut bytes);
            let subject = pick(vocabulary.subjects, bytes[0]);
            let action = pick(vocabulary.actions, bytes[1]);
            let object = pick(vocabulary.objects, bytes[2]);
            let author = format!(
                "{} {}",
                pick(&FIRST_NAMES, bytes[3]),
                pick(&LAST_NAMES, bytes[4])
            );
            let headline = format!("{} {} {}", subject, action, object);
            let content = format!(
                "{} {} {}, according to people familiar with the matter.\n\n{}",
                subject, action, object, vocabulary.commentary
            );
            items.push(ContentItem::new(headline, content, author, date.clone()));
        }

        debug!(
            section = %request.section,
            count = items.len(),
            sequence = request.sequence,
            "Generated template items"
        );
        Ok(ContentBatch {
            generated_at: now,
            items,
        })
    }

    fn name(&self) -> &str {
        "template"
    }
}

/// Generator backed by an HTTP content service.
///
/// Sends `{section, count, model}` and accepts either a JSON array of items or
/// an object with an `items` array.
pub struct HttpGenerator {
    client: Client,
    endpoint: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GenerateResponse {
    Items(Vec<ContentItem>),
    Wrapped { items: Vec<ContentItem> },
}

impl HttpGenerator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ActivityError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ActivityError::Configuration(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// 4xx other than 408/429 will not get better by retrying.
fn map_status(status: reqwest::StatusCode, body: &str) -> ActivityError {
    let message = format!("generator returned HTTP {}: {}", status.as_u16(), body);
    match status.as_u16() {
        408 | 429 => ActivityError::Transient(message),
        400..=499 => ActivityError::Configuration(message),
        _ => ActivityError::Transient(message),
    }
}

pub(crate) fn parse_items(body: &str, count: u32) -> Result<Vec<ContentItem>, ActivityError> {
    let parsed: GenerateResponse = serde_json::from_str(body).map_err(|e| {
        ActivityError::MalformedContent(format!("unparseable generator output: {}", e))
    })?;
    let items = match parsed {
        GenerateResponse::Items(items) | GenerateResponse::Wrapped { items } => items,
    };
    let items: Vec<ContentItem> = items
        .into_iter()
        .filter(|item| !item.headline.trim().is_empty())
        .take(count as usize)
        .map(ContentItem::ensure_id)
        .collect();
    if items.is_empty() {
        return Err(ActivityError::MalformedContent(
            "generator output contained no usable items".to_string(),
        ));
    }
    Ok(items)
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<ContentBatch, ActivityError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "section": request.section.as_str(),
                "count": request.count,
                "model": request.model_id,
            }))
            .send()
            .await
            .map_err(|e| ActivityError::Transient(format!("generator request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                ActivityError::Transient(format!("failed to read generator response: {}", e))
            })?;
        if !status.is_success() {
            return Err(map_status(status, &body));
        }

        let items = parse_items(&body, request.count)?;
        Ok(ContentBatch::new(items))
    }

    fn name(&self) -> &str {
        "http"
    }
}

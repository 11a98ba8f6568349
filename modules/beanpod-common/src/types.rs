use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Bean kinds ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BeanKind {
    Channel,
    #[default]
    Article,
    Post,
    Comment,
}

impl std::fmt::Display for BeanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BeanKind::Channel => write!(f, "channel"),
            BeanKind::Article => write!(f, "article"),
            BeanKind::Post => write!(f, "post"),
            BeanKind::Comment => write!(f, "comment"),
        }
    }
}

impl BeanKind {
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "channel" => BeanKind::Channel,
            "post" => BeanKind::Post,
            "comment" => BeanKind::Comment,
            _ => BeanKind::Article,
        }
    }
}

// --- Catalog records ---

/// A unit of ingested content: news article, social post, channel descriptor
/// or comment. `url` is the identity, stable across re-ingest. Derived fields
/// (`summary`, `topic`, both embedding vectors) stay absent until the
/// rectifier fills them; absence is what the backfill predicates key on, so
/// optional fields must never serialize as null.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Bean {
    pub url: String,
    /// Epoch seconds, stamped at ingest.
    #[serde(default)]
    pub updated: i64,
    /// Source-provided publication time, epoch seconds.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub published: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default)]
    pub kind: BeanKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    /// Source-provided and model-derived keywords, merged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    /// Retrieval-tuned dense vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_embeddings: Option<Vec<f32>>,
    /// Clustering-tuned dense vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_embeddings: Option<Vec<f32>>,
    /// Search score attached by the query layer. Never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_score: Option<f64>,
    /// Social-signal carrier on the ingest path; split into the noise store
    /// before the bean is persisted, re-attached on read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_noise: Option<MediaNoise>,
}

/// Social-signal metadata attached to a bean by url. The same bean can carry
/// noise rows from several channels; reads aggregate them per url.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MediaNoise {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mapped_url: String,
    #[serde(default)]
    pub updated: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container_url: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub likes: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub comments: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub subscribers: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
    /// `3 * comments + likes`, computed by the aggregation read model.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub score: i64,
}

/// A structured event statement extracted from one or more beans:
/// `(keyphrase, event, description)` plus the urls it maps to.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NewsNugget {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub keyphrase: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Clustering-space vector of `description`; filled by the rectifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<f32>>,
    /// Urls of the beans this nugget describes; rebuilt on every sweep.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mapped_urls: Vec<String>,
    /// `5 * |mapped_urls| + sum of noise scores`, written by the mapper.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub trend_score: i64,
    #[serde(default)]
    pub updated: i64,
}

/// Keyword-to-bean mapping behind the trending-keywords aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeywordMap {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub keyword: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default)]
    pub updated: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub count: i64,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

/// Empty vectors are the inference client's failure backstop; treat them as
/// missing everywhere a real coordinate is expected.
pub fn is_missing_vector(v: &[f32]) -> bool {
    v.is_empty() || v.iter().all(|x| *x == 0.0)
}

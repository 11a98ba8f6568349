use beanpod_common::epoch_days_ago;
use beanpod_store::Filter;

pub const MAX_TOP_N: i64 = 100;
pub const DEFAULT_TOP_N: i64 = 10;

const FOUR_WEEKS: i64 = 28;
const ONE_DAY: i64 = 1;

/// Uniform query configuration for the public search operations.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    top_n: Option<i64>,
    /// Lower bound on `updated`, derived from a clamped day window.
    since: Option<i64>,
    kinds: Vec<String>,
    pub category_texts: Vec<String>,
    pub category_embeddings: Vec<Vec<f32>>,
    pub context: Option<String>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_top_n(mut self, top_n: i64) -> Self {
        self.top_n = Some(top_n.clamp(1, MAX_TOP_N));
        self
    }

    pub fn with_time_window(mut self, days: i64) -> Self {
        self.since = Some(epoch_days_ago(clamp_time_window(days)));
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<String>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn with_categories(mut self, texts: Vec<String>) -> Self {
        self.category_texts = texts;
        self
    }

    pub fn with_category_embeddings(mut self, embeddings: Vec<Vec<f32>>) -> Self {
        self.category_embeddings = embeddings;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn top_n(&self) -> i64 {
        self.top_n.unwrap_or(DEFAULT_TOP_N)
    }

    pub fn since(&self) -> Option<i64> {
        self.since
    }

    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    /// Scalar filter for bean reads: time window plus kind membership.
    pub fn bean_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(since) = self.since {
            filter = filter.gte("updated", since);
        }
        if !self.kinds.is_empty() {
            filter = filter.any_of(
                "kind",
                self.kinds.iter().map(|k| k.as_str().into()).collect(),
            );
        }
        filter
    }

    /// Scalar filter for nugget reads: the time window only.
    pub fn nugget_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(since) = self.since {
            filter = filter.gte("updated", since);
        }
        filter
    }
}

fn clamp_time_window(days: i64) -> i64 {
    days.clamp(ONE_DAY, FOUR_WEEKS)
}

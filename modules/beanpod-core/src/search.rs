use serde::Deserialize;
use tracing::{info, warn};

use beanpod_common::{is_missing_vector, Bean, KeywordMap, NewsNugget};
use beanpod_store::{Filter, SearchOpts, Sort};
use inference_client::EmbeddingTask;

use crate::catalog::Catalog;
use crate::noise::attach_media_noise;
use crate::options::SearchOptions;

const CATEGORY_MATCH_SCORE: f64 = 0.67;
const CONTEXT_MATCH_SCORE: f64 = 0.62;
/// When the context vector search finds nothing, hand back the top text
/// matches as a sample rather than an empty page.
const CONTEXT_FALLBACK_TOP_N: i64 = 2;

/// Result projection for beans going back to clients: no raw text, no
/// stored vectors.
fn result_fields() -> Vec<String> {
    [
        "url", "updated", "published", "source", "title", "kind", "author", "summary", "topic",
        "keywords", "sentiment",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn nugget_result_fields() -> Vec<String> {
    ["id", "keyphrase", "event", "description", "trend_score", "updated"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Per-url best nugget score, folded store-side for the trending-beans rank.
#[derive(Deserialize)]
struct UrlScore {
    #[serde(default)]
    url: String,
    #[serde(default)]
    trend_score: i64,
}

const TRENDING_BEAN_SCORES: &str = "\
MATCH (c:Concept) WHERE any(x IN c.mapped_urls WHERE x IN $urls) \
UNWIND c.mapped_urls AS url \
WITH url, max(coalesce(c.trend_score, 0)) AS trend_score \
WHERE url IN $urls \
RETURN {url: url, trend_score: trend_score} AS doc";

const TRENDING_KEYWORDS: &str = "\
MATCH (k:Keyword) WHERE k.updated >= $since \
WITH k.keyword AS keyword, count(*) AS occurrences \
WHERE occurrences > 2 \
RETURN {keyword: keyword, count: occurrences} AS doc \
ORDER BY occurrences DESC";

impl Catalog {
    /// Full-text search over the bean catalog, scored and noise-attached.
    pub async fn text_search(&self, keywords: &[String], options: &SearchOptions) -> Vec<Bean> {
        let beans = self
            .beans()
            .text_search(
                keywords,
                &SearchOpts::new()
                    .with_filter(options.bean_filter())
                    .with_projection(result_fields())
                    .with_top_n(options.top_n()),
            )
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Text search failed");
                Vec::new()
            });
        attach_media_noise(self.noises(), beans).await
    }

    /// Mode-selecting bean search:
    /// 1. category embeddings, if provided;
    /// 2. else category texts, embedded for clustering;
    /// 3. else a conversational context, embedded as a search query, with a
    ///    text-search fallback when the vector pass finds nothing;
    /// 4. else a plain filtered read, newest first.
    pub async fn fuzzy_search_beans(&self, options: &SearchOptions) -> Vec<Bean> {
        if !options.category_embeddings.is_empty() {
            let beans = self
                .category_vector_search(options.category_embeddings.clone(), options)
                .await;
            return attach_media_noise(self.noises(), beans).await;
        }

        if !options.category_texts.is_empty() {
            info!(
                categories = options.category_texts.len(),
                "Generating category embeddings"
            );
            let embeddings = self
                .embedder
                .embed_batch(&options.category_texts, EmbeddingTask::Clustering)
                .await;
            let beans = self.category_vector_search(embeddings, options).await;
            return attach_media_noise(self.noises(), beans).await;
        }

        if let Some(context) = options.context.as_deref() {
            info!(context, "Generating context embeddings");
            let embedding = self.embedder.embed(context, EmbeddingTask::SearchQuery).await;
            let beans = if is_missing_vector(&embedding) {
                Vec::new()
            } else {
                self.beans()
                    .vector_search(
                        &[embedding],
                        "search_embeddings",
                        &SearchOpts::new()
                            .with_filter(options.bean_filter())
                            .with_projection(result_fields())
                            .with_min_score(CONTEXT_MATCH_SCORE)
                            .with_top_n(options.top_n()),
                    )
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "Context vector search failed");
                        Vec::new()
                    })
            };
            // The vector floor is restrictive for this embedding model;
            // degrade to a narrow text search instead of returning nothing.
            if beans.is_empty() {
                let fallback = options.clone().with_top_n(CONTEXT_FALLBACK_TOP_N);
                return self.text_search(&[context.to_string()], &fallback).await;
            }
            return attach_media_noise(self.noises(), beans).await;
        }

        let beans = self
            .beans()
            .get(
                &options.bean_filter(),
                Some(result_fields()),
                Some(Sort::desc("updated")),
                options.top_n(),
            )
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Bean read failed");
                Vec::new()
            });
        attach_media_noise(self.noises(), beans).await
    }

    async fn category_vector_search(
        &self,
        embeddings: Vec<Vec<f32>>,
        options: &SearchOptions,
    ) -> Vec<Bean> {
        self.beans()
            .vector_search(
                &embeddings,
                "category_embeddings",
                &SearchOpts::new()
                    .with_filter(options.bean_filter())
                    .with_projection(result_fields())
                    .with_min_score(CATEGORY_MATCH_SCORE)
                    .with_top_n(options.top_n()),
            )
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Category vector search failed");
                Vec::new()
            })
    }

    /// Beans reached through nuggets: match keyphrases, flatten the mapped
    /// urls, return those beans newest first.
    pub async fn nugget_search(&self, keyphrases: &[String], options: &SearchOptions) -> Vec<Bean> {
        let nugget_filter = options.nugget_filter().any_of(
            "keyphrase",
            keyphrases.iter().map(|k| k.as_str().into()).collect(),
        );
        let nuggets = self
            .nuggets()
            .get(
                &nugget_filter,
                Some(vec!["mapped_urls".to_string()]),
                Some(Sort::desc("trend_score")),
                options.top_n(),
            )
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Nugget lookup failed");
                Vec::new()
            });

        let mut urls: Vec<String> = nuggets.into_iter().flat_map(|n| n.mapped_urls).collect();
        urls.sort();
        urls.dedup();
        if urls.is_empty() {
            return Vec::new();
        }

        // Mapped beans may predate the nugget window; only the kind filter
        // carries over to the bean read.
        let mut bean_filter =
            Filter::new().any_of("url", urls.iter().map(|u| u.as_str().into()).collect());
        if !options.kinds().is_empty() {
            bean_filter = bean_filter.any_of(
                "kind",
                options.kinds().iter().map(|k| k.as_str().into()).collect(),
            );
        }
        let beans = self
            .beans()
            .get(
                &bean_filter,
                Some(result_fields()),
                Some(Sort::desc("updated")),
                options.top_n(),
            )
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Nugget bean read failed");
                Vec::new()
            });
        attach_media_noise(self.noises(), beans).await
    }

    /// Nuggets that gathered evidence inside the window, optionally narrowed
    /// by category, ranked by trend score.
    pub async fn trending_nuggets(&self, options: &SearchOptions) -> Vec<NewsNugget> {
        let filter = options.nugget_filter().gte("trend_score", 1);

        if !options.category_embeddings.is_empty() || !options.category_texts.is_empty() {
            let embeddings = if options.category_embeddings.is_empty() {
                self.embedder
                    .embed_batch(&options.category_texts, EmbeddingTask::Clustering)
                    .await
            } else {
                options.category_embeddings.clone()
            };
            return self
                .nuggets()
                .vector_search(
                    &embeddings,
                    "embeddings",
                    &SearchOpts::new()
                        .with_filter(filter)
                        .with_projection(nugget_result_fields())
                        .with_min_score(CATEGORY_MATCH_SCORE)
                        .with_top_n(options.top_n()),
                )
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Trending nugget vector search failed");
                    Vec::new()
                });
        }

        self.nuggets()
            .get(
                &filter,
                Some(nugget_result_fields()),
                Some(Sort::desc("trend_score")),
                options.top_n(),
            )
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Trending nugget read failed");
                Vec::new()
            })
    }

    /// Beans in the window ranked by the best trend score of the nuggets
    /// that map to them.
    pub async fn trending_beans(&self, options: &SearchOptions) -> Vec<Bean> {
        let mut beans = self.fuzzy_search_beans(options).await;
        if beans.is_empty() {
            return beans;
        }

        let urls: Vec<String> = beans.iter().map(|b| b.url.clone()).collect();
        let scores: Vec<UrlScore> = self
            .nuggets()
            .aggregate(TRENDING_BEAN_SCORES, vec![("urls", serde_json::json!(urls))])
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Trending bean fold failed");
                Vec::new()
            });

        // Without any nugget evidence the search-score order stands.
        if !scores.is_empty() {
            for bean in &mut beans {
                if let Some(row) = scores.iter().find(|s| s.url == bean.url) {
                    bean.search_score = Some(row.trend_score as f64);
                }
            }
            beans.sort_by(|a, b| {
                b.search_score
                    .unwrap_or(0.0)
                    .total_cmp(&a.search_score.unwrap_or(0.0))
            });
            beans.truncate(options.top_n() as usize);
        }
        beans
    }

    /// Keywords seen on more than two beans inside the window.
    pub async fn trending_keywords(&self, options: &SearchOptions) -> Vec<KeywordMap> {
        let since = options
            .since()
            .unwrap_or_else(|| beanpod_common::epoch_days_ago(1));
        let mut rows: Vec<KeywordMap> = self
            .keywords()
            .aggregate(TRENDING_KEYWORDS, vec![("since", serde_json::json!(since))])
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Trending keyword fold failed");
                Vec::new()
            });
        rows.truncate(options.top_n() as usize);
        rows
    }
}

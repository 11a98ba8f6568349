use serde_json::json;
use tracing::{info, warn};

use beanpod_common::{epoch_days_ago, is_missing_vector, Bean, NewsNugget};
use beanpod_store::{Filter, SearchOpts, Sort};
use inference_client::EmbeddingTask;

use crate::catalog::Catalog;
use crate::noise::total_noise_score;
use crate::options::MAX_TOP_N;

/// Rows older than this are pruned, channels excepted.
const DELETE_WINDOW_DAYS: i64 = 15;
/// Backfills only look at recent rows; anything older ages out soon anyway.
const BACKFILL_WINDOW_DAYS: i64 = 2;
const RECT_BATCH_SIZE: usize = 10;

const NUGGET_MATCH_SCORE: f64 = 0.73;
/// Lucene floor for the text fallback when the vector match comes up empty.
const NUGGET_TEXT_MATCH_SCORE: f64 = 0.5;
const NUGGET_TEXT_TOP_N: i64 = 2;

/// Derived bean fields in backfill order. The nugget mapping step assumes
/// category embeddings exist, so they come first.
const GENERATED_FIELDS: [&str; 3] = ["category_embeddings", "search_embeddings", "summary"];

impl Catalog {
    /// The rectification sweep: prune aged-out rows, fill missing derived
    /// fields, then rebuild the nugget→bean mapping. Safe to invoke at any
    /// time and concurrently with ingest — every step selects on "field
    /// missing" predicates and writes are last-writer-wins, so repeated or
    /// overlapping sweeps converge on the same state.
    pub async fn rectify(&self) {
        info!("Rectification sweep starting");
        self.age_out().await;
        self.backfill_beans().await;
        self.backfill_nugget_embeddings().await;
        self.rebuild_nugget_mapping().await;
        info!("Rectification sweep complete");
    }

    async fn age_out(&self) {
        let cutoff = epoch_days_ago(DELETE_WINDOW_DAYS);
        let aged = Filter::new().lte("updated", cutoff);

        let bean_filter = Filter::new().lte("updated", cutoff).ne("kind", "channel");
        if let Err(e) = self.beans().delete(&bean_filter).await {
            warn!(error = %e, "Bean age-out failed");
        }
        for (name, result) in [
            ("noise", self.noises().delete(&aged).await),
            ("nugget", self.nuggets().delete(&aged).await),
            ("keyword", self.keywords().delete(&aged).await),
        ] {
            if let Err(e) = result {
                warn!(store = name, error = %e, "Age-out failed");
            }
        }
    }

    /// Fill each missing derived field on recent non-channel beans, newest
    /// first, in small chunks so partial success sticks.
    async fn backfill_beans(&self) {
        for field in GENERATED_FIELDS {
            let filter = Filter::new()
                .missing(field)
                .gte("updated", epoch_days_ago(BACKFILL_WINDOW_DAYS))
                .ne("kind", "channel");
            let beans = match self
                .beans()
                .get(
                    &filter,
                    Some(vec!["url".to_string(), "text".to_string()]),
                    Some(Sort::desc("updated")),
                    -1,
                )
                .await
            {
                Ok(beans) => beans,
                Err(e) => {
                    warn!(field, error = %e, "Backfill select failed");
                    continue;
                }
            };
            if beans.is_empty() {
                continue;
            }
            info!(field, count = beans.len(), "Rectifying beans");

            for chunk in beans.chunks(RECT_BATCH_SIZE) {
                let (patches, filters) = self.bean_patches(chunk, field).await;
                if patches.is_empty() {
                    continue;
                }
                if let Err(e) = self.beans().update(&patches, &filters).await {
                    warn!(field, error = %e, "Backfill update failed");
                }
            }
        }
    }

    /// Build patches for one chunk. Failed generations (empty vectors,
    /// placeholder digests) are dropped so the field stays missing and the
    /// next sweep retries it.
    async fn bean_patches(
        &self,
        chunk: &[Bean],
        field: &str,
    ) -> (Vec<serde_json::Value>, Vec<Filter>) {
        let texts: Vec<String> = chunk.iter().map(|b| b.text.clone()).collect();
        let mut patches = Vec::new();
        let mut filters = Vec::new();

        match field {
            "category_embeddings" | "search_embeddings" => {
                let task = if field == "category_embeddings" {
                    EmbeddingTask::Clustering
                } else {
                    EmbeddingTask::SearchDocument
                };
                let vectors = self.embedder.embed_batch(&texts, task).await;
                for (bean, vector) in chunk.iter().zip(vectors) {
                    if is_missing_vector(&vector) {
                        continue;
                    }
                    patches.push(json!({ field: vector }));
                    filters.push(Filter::new().eq("url", bean.url.clone()));
                }
            }
            "summary" => {
                let digests = self.extractor.extract_digests(&texts).await;
                for (bean, digest) in chunk.iter().zip(digests) {
                    if digest.is_placeholder() {
                        continue;
                    }
                    patches.push(json!({ "summary": digest.summary, "topic": digest.topic }));
                    filters.push(Filter::new().eq("url", bean.url.clone()));
                }
            }
            _ => {}
        }
        (patches, filters)
    }

    /// Embed nugget descriptions that do not have a vector yet.
    async fn backfill_nugget_embeddings(&self) {
        let filter = Filter::new()
            .missing("embeddings")
            .gte("updated", epoch_days_ago(BACKFILL_WINDOW_DAYS));
        let nuggets = match self
            .nuggets()
            .get(
                &filter,
                Some(vec!["id".to_string(), "description".to_string()]),
                Some(Sort::desc("updated")),
                -1,
            )
            .await
        {
            Ok(nuggets) => nuggets,
            Err(e) => {
                warn!(error = %e, "Nugget backfill select failed");
                return;
            }
        };
        if nuggets.is_empty() {
            return;
        }
        info!(count = nuggets.len(), "Rectifying nugget embeddings");

        for chunk in nuggets.chunks(RECT_BATCH_SIZE) {
            let descriptions: Vec<String> =
                chunk.iter().map(|n| n.description.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&descriptions, EmbeddingTask::Clustering)
                .await;

            let mut patches = Vec::new();
            let mut filters = Vec::new();
            for (nugget, vector) in chunk.iter().zip(vectors) {
                if is_missing_vector(&vector) {
                    continue;
                }
                patches.push(json!({ "embeddings": vector }));
                filters.push(Filter::new().eq("id", nugget.id.to_string()));
            }
            if patches.is_empty() {
                continue;
            }
            if let Err(e) = self.nuggets().update(&patches, &filters).await {
                warn!(error = %e, "Nugget embedding update failed");
            }
        }
    }

    /// Rebuild `mapped_urls` and the trend score for every nugget that has
    /// an embedding. Vector match against bean category embeddings first;
    /// when that comes up empty, a narrow text search over the nugget's
    /// keyphrase and event stands in.
    async fn rebuild_nugget_mapping(&self) {
        let nuggets = match self
            .nuggets()
            .get(&Filter::new().exists("embeddings"), None, None, -1)
            .await
        {
            Ok(nuggets) => nuggets,
            Err(e) => {
                warn!(error = %e, "Nugget mapping select failed");
                return;
            }
        };
        if nuggets.is_empty() {
            return;
        }
        info!(count = nuggets.len(), "Rebuilding nugget mapping");

        let mut patches = Vec::new();
        let mut filters = Vec::new();
        for nugget in &nuggets {
            let urls = self.mapped_urls_for(nugget).await;
            let trend_score =
                5 * urls.len() as i64 + total_noise_score(self.noises(), &urls).await;
            patches.push(json!({ "mapped_urls": urls, "trend_score": trend_score }));
            filters.push(Filter::new().eq("id", nugget.id.to_string()));
        }
        if let Err(e) = self.nuggets().update(&patches, &filters).await {
            warn!(error = %e, "Nugget mapping update failed");
        }
    }

    async fn mapped_urls_for(&self, nugget: &NewsNugget) -> Vec<String> {
        let embedding = nugget.embeddings.clone().unwrap_or_default();
        if is_missing_vector(&embedding) {
            return Vec::new();
        }
        let non_channel = Filter::new().ne("kind", "channel");
        let url_projection = vec!["url".to_string()];

        let mut beans = self
            .beans()
            .vector_search(
                &[embedding],
                "category_embeddings",
                &SearchOpts::new()
                    .with_filter(non_channel.clone())
                    .with_projection(url_projection.clone())
                    .with_min_score(NUGGET_MATCH_SCORE)
                    .with_top_n(MAX_TOP_N),
            )
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Nugget vector match failed");
                Vec::new()
            });

        if beans.is_empty() {
            beans = self
                .beans()
                .text_search(
                    &[nugget.keyphrase.clone(), nugget.event.clone()],
                    &SearchOpts::new()
                        .with_filter(non_channel)
                        .with_projection(url_projection)
                        .with_min_score(NUGGET_TEXT_MATCH_SCORE)
                        .with_top_n(NUGGET_TEXT_TOP_N),
                )
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Nugget text match failed");
                    Vec::new()
                });
        }

        let mut urls: Vec<String> = beans.into_iter().map(|b| b.url).collect();
        urls.sort();
        urls.dedup();
        urls
    }
}

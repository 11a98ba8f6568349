//! Media-noise read model. Raw noise rows are per-channel; everything the
//! rest of the system sees is the per-url aggregate with
//! `score = 3 * comments + likes`.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use beanpod_common::{Bean, MediaNoise};
use beanpod_store::Store;

/// Newest row per (url, channel), then likes/comments summed per url.
const NOISE_AGGREGATE: &str = "\
MATCH (m:Noise) WHERE m.mapped_url IN $urls \
WITH m ORDER BY m.updated DESC \
WITH m.mapped_url AS mapped_url, m.channel AS channel, head(collect(m)) AS latest \
WITH mapped_url, collect(latest) AS rows \
RETURN { \
  mapped_url: mapped_url, \
  channel: head(rows).channel, \
  container_url: head(rows).container_url, \
  updated: head(rows).updated, \
  likes: reduce(total = 0, r IN rows | total + coalesce(r.likes, 0)), \
  comments: reduce(total = 0, r IN rows | total + coalesce(r.comments, 0)), \
  score: reduce(total = 0, r IN rows | total + 3 * coalesce(r.comments, 0) + coalesce(r.likes, 0)) \
} AS doc";

/// Same fold, collapsed to one number across all urls.
const NOISE_TOTAL: &str = "\
MATCH (m:Noise) WHERE m.mapped_url IN $urls \
WITH m ORDER BY m.updated DESC \
WITH m.mapped_url AS mapped_url, m.channel AS channel, head(collect(m)) AS latest \
WITH mapped_url, collect(latest) AS rows \
WITH reduce(total = 0, r IN rows | total + 3 * coalesce(r.comments, 0) + coalesce(r.likes, 0)) AS url_score \
RETURN {score: sum(url_score)} AS doc";

#[derive(Deserialize)]
struct ScoreRow {
    #[serde(default)]
    score: i64,
}

fn url_param(urls: &[String]) -> Value {
    serde_json::json!(urls)
}

/// Aggregated noise per url. Urls without noise rows are simply absent.
pub async fn noises_for(store: &Store<MediaNoise>, urls: &[String]) -> Vec<MediaNoise> {
    if urls.is_empty() {
        return Vec::new();
    }
    match store
        .aggregate::<MediaNoise>(NOISE_AGGREGATE, vec![("urls", url_param(urls))])
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "Media-noise aggregation failed");
            Vec::new()
        }
    }
}

/// Total noise score across the given urls; feeds the nugget trend score.
pub async fn total_noise_score(store: &Store<MediaNoise>, urls: &[String]) -> i64 {
    if urls.is_empty() {
        return 0;
    }
    match store
        .aggregate::<ScoreRow>(NOISE_TOTAL, vec![("urls", url_param(urls))])
        .await
    {
        Ok(rows) => rows.first().map(|r| r.score).unwrap_or(0),
        Err(e) => {
            warn!(error = %e, "Media-noise total failed");
            0
        }
    }
}

/// Attach aggregated noise rows to their beans by url.
pub async fn attach_media_noise(store: &Store<MediaNoise>, mut beans: Vec<Bean>) -> Vec<Bean> {
    let urls: Vec<String> = beans.iter().map(|b| b.url.clone()).collect();
    let noises = noises_for(store, &urls).await;
    if !noises.is_empty() {
        for bean in &mut beans {
            if let Some(noise) = noises.iter().find(|n| n.mapped_url == bean.url) {
                bean.media_noise = Some(noise.clone());
            }
        }
    }
    beans
}

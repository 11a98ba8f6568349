//! Integration tests for the rectification sweep.
//!
//! These verify that the sweep fills missing derived fields, skips channels,
//! rebuilds the nugget mapping and prunes aged-out rows.
//!
//! Requirements: Docker (for Neo4j via testcontainers)
//!
//! Run with: cargo test -p beanpod-core --features test-utils --test rectify_test

#![cfg(feature = "test-utils")]

use std::sync::Arc;

use beanpod_common::{epoch_days_ago, epoch_now, Bean, BeanKind, NewsNugget};
use beanpod_core::testing::{basis_vector, CannedExtractor, FixedEmbedder, OfflineEmbedder};
use beanpod_core::{Catalog, SearchOptions};
use beanpod_store::{Filter, StoreClient, EMBEDDING_DIMENSIONS};
use inference_client::{InsightExtractor, TextEmbedder};
use uuid::Uuid;

async fn setup() -> (impl std::any::Any, StoreClient) {
    beanpod_store::testutil::neo4j_container().await
}

fn catalog(
    client: StoreClient,
    embedder: impl TextEmbedder + 'static,
    extractor: impl InsightExtractor + 'static,
) -> Catalog {
    Catalog::new(client, Arc::new(embedder), Arc::new(extractor))
}

fn article(url: &str, text: &str) -> Bean {
    Bean {
        url: url.to_string(),
        kind: BeanKind::Article,
        text: text.to_string(),
        updated: epoch_now(),
        ..Bean::default()
    }
}

fn channel(url: &str, text: &str) -> Bean {
    Bean {
        kind: BeanKind::Channel,
        ..article(url, text)
    }
}

fn nugget(keyphrase: &str, event: &str, description: &str) -> NewsNugget {
    NewsNugget {
        id: Uuid::new_v4(),
        keyphrase: keyphrase.to_string(),
        event: event.to_string(),
        description: description.to_string(),
        updated: epoch_now(),
        ..NewsNugget::default()
    }
}

async fn bean_by_url(catalog: &Catalog, url: &str) -> Option<Bean> {
    catalog
        .beans()
        .get(&Filter::new().eq("url", url), None, None, -1)
        .await
        .expect("bean read failed")
        .into_iter()
        .next()
}

const ARTICLE_TEXT: &str =
    "Russian defence minister replaced by Putin amid war restructuring. \
     The reshuffle moves a long-serving loyalist out of the defence portfolio.";

#[tokio::test]
async fn rectify_fills_derived_fields_and_makes_beans_searchable() {
    let (_container, client) = setup().await;
    let embedder = FixedEmbedder::new(EMBEDDING_DIMENSIONS)
        .on_text(ARTICLE_TEXT, basis_vector(EMBEDDING_DIMENSIONS, 0))
        .on_text("russian defense shake-up", basis_vector(EMBEDDING_DIMENSIONS, 0));
    let catalog = catalog(client, embedder, CannedExtractor::new());

    catalog
        .beans()
        .add(vec![article("https://example.com/shoigu", ARTICLE_TEXT)])
        .await
        .unwrap();

    catalog.rectify().await;

    let bean = bean_by_url(&catalog, "https://example.com/shoigu")
        .await
        .expect("bean should still be present");
    assert!(bean.summary.is_some(), "summary should be backfilled");
    assert!(bean.topic.is_some(), "topic should be backfilled");
    assert!(bean.category_embeddings.is_some());
    assert!(bean.search_embeddings.is_some());

    let found = catalog
        .fuzzy_search_beans(
            &SearchOptions::new()
                .with_time_window(1)
                .with_context("russian defense shake-up"),
        )
        .await;
    assert!(
        found.iter().any(|b| b.url == "https://example.com/shoigu"),
        "context search should reach the rectified bean"
    );
    let hit = found
        .iter()
        .find(|b| b.url == "https://example.com/shoigu")
        .unwrap();
    assert!(hit.summary.as_deref().is_some_and(|s| !s.is_empty()));
}

#[tokio::test]
async fn channels_are_stored_but_never_enriched() {
    let (_container, client) = setup().await;
    let catalog = catalog(
        client,
        FixedEmbedder::new(EMBEDDING_DIMENSIONS),
        CannedExtractor::new(),
    );

    catalog
        .beans()
        .add(vec![channel(
            "https://reddit.com/r/technews",
            "tech-news channel covering infrastructure outages",
        )])
        .await
        .unwrap();

    catalog.rectify().await;
    catalog.rectify().await;

    let bean = bean_by_url(&catalog, "https://reddit.com/r/technews")
        .await
        .expect("channel should survive both sweeps");
    assert!(bean.category_embeddings.is_none());
    assert!(bean.search_embeddings.is_none());
    assert!(bean.summary.is_none());
}

#[tokio::test]
async fn nugget_mapping_links_nuggets_to_their_beans() {
    let (_container, client) = setup().await;
    let flaw_a = "Researchers disclosed a heap overflow in Cinterion cellular modems \
                  used across industrial telemetry deployments.";
    let flaw_b = "A second Cinterion modem flaw allows SMS-delivered code execution, \
                  according to the same research team.";
    let description = "Cinterion cellular modems carry severe remotely exploitable flaws.";

    let shared = basis_vector(EMBEDDING_DIMENSIONS, 3);
    let embedder = FixedEmbedder::new(EMBEDDING_DIMENSIONS)
        .on_text(flaw_a, shared.clone())
        .on_text(flaw_b, shared.clone())
        .on_text(description, shared);
    let catalog = catalog(client, embedder, CannedExtractor::new());

    catalog
        .beans()
        .add(vec![
            article("https://example.com/cinterion-1", flaw_a),
            article("https://example.com/cinterion-2", flaw_b),
        ])
        .await
        .unwrap();
    catalog
        .nuggets()
        .add(vec![nugget(
            "Cinterion cellular modems",
            "Severe security flaws disclosed",
            description,
        )])
        .await
        .unwrap();

    catalog.rectify().await;

    let nuggets = catalog
        .nuggets()
        .get(
            &Filter::new().eq("keyphrase", "Cinterion cellular modems"),
            None,
            None,
            -1,
        )
        .await
        .unwrap();
    assert_eq!(nuggets.len(), 1);
    assert_eq!(nuggets[0].mapped_urls.len(), 2, "both beans should map");
    assert_eq!(nuggets[0].trend_score, 10, "5 per unique mapped url");

    let beans = catalog
        .nugget_search(
            &["Cinterion cellular modems".to_string()],
            &SearchOptions::new().with_time_window(2),
        )
        .await;
    let urls: Vec<&str> = beans.iter().map(|b| b.url.as_str()).collect();
    assert!(urls.contains(&"https://example.com/cinterion-1"));
    assert!(urls.contains(&"https://example.com/cinterion-2"));
}

#[tokio::test]
async fn age_out_prunes_everything_but_channels() {
    let (_container, client) = setup().await;
    let catalog = catalog(
        client,
        FixedEmbedder::new(EMBEDDING_DIMENSIONS),
        CannedExtractor::new(),
    );

    let mut old_article = article("https://example.com/stale", "a stale article body long gone");
    old_article.updated = epoch_days_ago(20);
    let mut old_channel = channel("https://example.com/old-channel", "an old channel descriptor");
    old_channel.updated = epoch_days_ago(20);
    let mut old_nugget = nugget("Stale", "Fading from the catalog", "A stale nugget.");
    old_nugget.updated = epoch_days_ago(20);

    catalog
        .beans()
        .add(vec![old_article, old_channel])
        .await
        .unwrap();
    catalog.nuggets().add(vec![old_nugget]).await.unwrap();

    catalog.rectify().await;

    assert!(bean_by_url(&catalog, "https://example.com/stale").await.is_none());
    assert!(bean_by_url(&catalog, "https://example.com/old-channel")
        .await
        .is_some());
    let nuggets = catalog
        .nuggets()
        .get(&Filter::new(), None, None, -1)
        .await
        .unwrap();
    assert!(nuggets.is_empty(), "aged-out nuggets should be deleted");
}

#[tokio::test]
async fn sweep_converges_once_the_embedder_comes_back() {
    let (_container, client) = setup().await;

    // First sweep runs against a dead embeddings service: digests land,
    // vectors do not, and nothing is written as a zero vector.
    let degraded = catalog(client.clone(), OfflineEmbedder, CannedExtractor::new());
    degraded
        .beans()
        .add(vec![article("https://example.com/outage", ARTICLE_TEXT)])
        .await
        .unwrap();
    degraded.rectify().await;

    let bean = bean_by_url(&degraded, "https://example.com/outage")
        .await
        .unwrap();
    assert!(bean.summary.is_some(), "digest path is independent");
    assert!(bean.category_embeddings.is_none(), "no zero vectors persisted");
    assert!(bean.search_embeddings.is_none());

    // Same store, healthy embedder: the field-missing predicates pick the
    // bean up again and the sweep completes it.
    let healthy = catalog(
        client,
        FixedEmbedder::new(EMBEDDING_DIMENSIONS),
        CannedExtractor::new(),
    );
    healthy.rectify().await;

    let bean = bean_by_url(&healthy, "https://example.com/outage")
        .await
        .unwrap();
    assert!(bean.category_embeddings.is_some());
    assert!(bean.search_embeddings.is_some());
}

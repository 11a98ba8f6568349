//! Integration tests for ingest and the query layer.
//!
//! Requirements: Docker (for Neo4j via testcontainers)
//!
//! Run with: cargo test -p beanpod-core --features test-utils --test search_test

#![cfg(feature = "test-utils")]

use std::sync::Arc;

use beanpod_common::{epoch_now, Bean, BeanKind, KeywordMap, MediaNoise, NewsNugget};
use beanpod_core::testing::{CannedExtractor, FixedEmbedder, OfflineEmbedder};
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

fn wire_article(url: &str, text: &str) -> Bean {
    Bean {
        url: url.to_string(),
        kind: BeanKind::Article,
        text: text.to_string(),
        ..Bean::default()
    }
}

fn stored_article(url: &str, text: &str) -> Bean {
    Bean {
        updated: epoch_now(),
        ..wire_article(url, text)
    }
}

#[tokio::test]
async fn ingest_is_idempotent_by_url() {
    let (_container, client) = setup().await;
    let catalog = catalog(
        client,
        FixedEmbedder::new(EMBEDDING_DIMENSIONS),
        CannedExtractor::new(),
    );

    let bean = wire_article(
        "https://example.com/u1",
        "Russian defence minister replaced by Putin amid war restructuring.",
    );
    let first = catalog.add_beans(vec![bean.clone()]).await.unwrap();
    let second = catalog.add_beans(vec![bean]).await.unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 0, "re-ingest must not insert a second row");

    let rows = catalog
        .beans()
        .get(&Filter::new().eq("url", "https://example.com/u1"), None, None, -1)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn beans_without_a_text_body_are_dropped() {
    let (_container, client) = setup().await;
    let catalog = catalog(
        client,
        FixedEmbedder::new(EMBEDDING_DIMENSIONS),
        CannedExtractor::new(),
    );

    let inserted = catalog
        .add_beans(vec![wire_article("https://example.com/short", "too short")])
        .await
        .unwrap();
    assert_eq!(inserted, 0);

    let rows = catalog.beans().get(&Filter::new(), None, None, -1).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn context_search_degrades_to_text_search_when_vectors_are_offline() {
    let (_container, client) = setup().await;
    let catalog = catalog(client, OfflineEmbedder, CannedExtractor::new());

    catalog
        .beans()
        .add(vec![stored_article(
            "https://example.com/bytedance",
            "ByteDance announced it will mount a court challenge in the United States \
             against a law that could force a sale or ban of its platform.",
        )])
        .await
        .unwrap();

    let found = catalog
        .fuzzy_search_beans(
            &SearchOptions::new()
                .with_context("ByteDance court challenge")
                .with_top_n(2),
        )
        .await;
    assert!(
        found.iter().any(|b| b.url == "https://example.com/bytedance"),
        "text fallback should still surface the bean"
    );
}

#[tokio::test]
async fn media_noise_is_aggregated_and_attached() {
    let (_container, client) = setup().await;
    let catalog = catalog(
        client,
        FixedEmbedder::new(EMBEDDING_DIMENSIONS),
        CannedExtractor::new(),
    );

    catalog
        .beans()
        .add(vec![stored_article(
            "https://example.com/noisy",
            "A post that several channels have been amplifying all morning.",
        )])
        .await
        .unwrap();
    catalog
        .noises()
        .add(vec![
            MediaNoise {
                mapped_url: "https://example.com/noisy".to_string(),
                channel: "r/technews".to_string(),
                likes: 10,
                comments: 4,
                updated: epoch_now(),
                ..MediaNoise::default()
            },
            MediaNoise {
                mapped_url: "https://example.com/noisy".to_string(),
                channel: "hackerpulse".to_string(),
                likes: 5,
                comments: 1,
                updated: epoch_now(),
                ..MediaNoise::default()
            },
        ])
        .await
        .unwrap();

    let found = catalog
        .fuzzy_search_beans(&SearchOptions::new().with_time_window(1))
        .await;
    let bean = found
        .iter()
        .find(|b| b.url == "https://example.com/noisy")
        .expect("bean should be returned");
    let noise = bean.media_noise.as_ref().expect("noise should be attached");
    assert_eq!(noise.likes, 15);
    assert_eq!(noise.comments, 5);
    assert_eq!(noise.score, 3 * 5 + 15);
}

#[tokio::test]
async fn trending_beans_rank_by_best_nugget_score() {
    let (_container, client) = setup().await;
    let catalog = catalog(
        client,
        FixedEmbedder::new(EMBEDDING_DIMENSIONS),
        CannedExtractor::new(),
    );

    catalog
        .beans()
        .add(vec![
            stored_article("https://example.com/quiet", "A quiet article nobody mapped yet."),
            stored_article("https://example.com/hot", "The article every nugget points at."),
        ])
        .await
        .unwrap();
    catalog
        .nuggets()
        .add(vec![
            NewsNugget {
                id: Uuid::new_v4(),
                keyphrase: "Hot story".to_string(),
                event: "Gathering coverage".to_string(),
                description: "The hot story keeps growing.".to_string(),
                mapped_urls: vec!["https://example.com/hot".to_string()],
                trend_score: 50,
                updated: epoch_now(),
                ..NewsNugget::default()
            },
            NewsNugget {
                id: Uuid::new_v4(),
                keyphrase: "Side note".to_string(),
                event: "Barely registering".to_string(),
                description: "A side note.".to_string(),
                mapped_urls: vec!["https://example.com/quiet".to_string()],
                trend_score: 5,
                updated: epoch_now(),
                ..NewsNugget::default()
            },
        ])
        .await
        .unwrap();

    let trending = catalog
        .trending_beans(&SearchOptions::new().with_time_window(1).with_top_n(10))
        .await;
    assert_eq!(trending.first().map(|b| b.url.as_str()), Some("https://example.com/hot"));
    assert_eq!(trending.first().and_then(|b| b.search_score), Some(50.0));
}

#[tokio::test]
async fn trending_nuggets_respect_the_score_floor_and_order() {
    let (_container, client) = setup().await;
    let catalog = catalog(
        client,
        FixedEmbedder::new(EMBEDDING_DIMENSIONS),
        CannedExtractor::new(),
    );

    let unmapped = NewsNugget {
        id: Uuid::new_v4(),
        keyphrase: "Unmapped".to_string(),
        description: "Never matched a bean.".to_string(),
        updated: epoch_now(),
        ..NewsNugget::default()
    };
    let scored = |phrase: &str, score: i64| NewsNugget {
        id: Uuid::new_v4(),
        keyphrase: phrase.to_string(),
        description: format!("{phrase} description"),
        trend_score: score,
        updated: epoch_now(),
        ..NewsNugget::default()
    };
    catalog
        .nuggets()
        .add(vec![unmapped, scored("Mid", 3), scored("Top", 7)])
        .await
        .unwrap();

    let trending = catalog
        .trending_nuggets(&SearchOptions::new().with_time_window(1))
        .await;
    let phrases: Vec<&str> = trending.iter().map(|n| n.keyphrase.as_str()).collect();
    assert_eq!(phrases, vec!["Top", "Mid"]);
}

#[tokio::test]
async fn trending_keywords_count_across_beans() {
    let (_container, client) = setup().await;
    let catalog = catalog(
        client,
        FixedEmbedder::new(EMBEDDING_DIMENSIONS),
        CannedExtractor::new(),
    );

    let mut rows = Vec::new();
    for i in 0..4 {
        rows.push(KeywordMap {
            keyword: "modem".to_string(),
            url: format!("https://example.com/{i}"),
            updated: epoch_now(),
            count: 0,
        });
    }
    rows.push(KeywordMap {
        keyword: "niche".to_string(),
        url: "https://example.com/9".to_string(),
        updated: epoch_now(),
        count: 0,
    });
    catalog.keywords().add(rows).await.unwrap();

    let trending = catalog
        .trending_keywords(&SearchOptions::new().with_time_window(1))
        .await;
    assert_eq!(trending.len(), 1);
    assert_eq!(trending[0].keyword, "modem");
    assert_eq!(trending[0].count, 4);
}

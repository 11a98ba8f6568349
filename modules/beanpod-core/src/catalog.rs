use std::sync::Arc;

use anyhow::Result;

use beanpod_common::{Bean, Config, KeywordMap, MediaNoise, NewsNugget};
use beanpod_store::{migrate, Filter, Store, StoreClient};
use inference_client::{
    EmbeddingsClient, InsightExtractor, ParrotboxClient, TextEmbedder, DEFAULT_EMBEDDINGS_URL,
};

/// The catalog context: the four stores and the two inference clients,
/// built once at startup and passed through call sites. Cloning is cheap —
/// stores share one driver connection pool and the clients sit behind Arcs.
#[derive(Clone)]
pub struct Catalog {
    beans: Store<Bean>,
    nuggets: Store<NewsNugget>,
    noises: Store<MediaNoise>,
    keywords: Store<KeywordMap>,
    pub(crate) embedder: Arc<dyn TextEmbedder>,
    pub(crate) extractor: Arc<dyn InsightExtractor>,
}

impl Catalog {
    /// Connect to the document store, run migrations and wire up the
    /// inference clients from configuration.
    pub async fn connect(config: &Config) -> Result<Self> {
        let client = StoreClient::connect(
            &config.db_connection_string,
            &config.db_user,
            &config.db_password,
        )
        .await?;
        client.ping().await?;
        migrate(&client).await?;

        let embedder = EmbeddingsClient::new(
            config
                .embeddings_url
                .clone()
                .unwrap_or_else(|| DEFAULT_EMBEDDINGS_URL.to_string()),
        );
        let extractor =
            ParrotboxClient::new(&config.parrotbox_url, &config.llmservice_api_key);

        Ok(Self::new(client, Arc::new(embedder), Arc::new(extractor)))
    }

    /// Assemble a catalog over an already-connected store client. Tests use
    /// this to swap in deterministic inference doubles.
    pub fn new(
        client: StoreClient,
        embedder: Arc<dyn TextEmbedder>,
        extractor: Arc<dyn InsightExtractor>,
    ) -> Self {
        Self {
            beans: Store::new(client.clone(), "Bean").with_identity(bean_identity, bean_same),
            nuggets: Store::new(client.clone(), "Concept"),
            noises: Store::new(client.clone(), "Noise"),
            keywords: Store::new(client, "Keyword"),
            embedder,
            extractor,
        }
    }

    pub fn beans(&self) -> &Store<Bean> {
        &self.beans
    }

    pub fn nuggets(&self) -> &Store<NewsNugget> {
        &self.nuggets
    }

    pub fn noises(&self) -> &Store<MediaNoise> {
        &self.noises
    }

    pub fn keywords(&self) -> &Store<KeywordMap> {
        &self.keywords
    }
}

fn bean_identity(bean: &Bean) -> Filter {
    Filter::new().eq("url", bean.url.clone())
}

fn bean_same(a: &Bean, b: &Bean) -> bool {
    a.url == b.url
}

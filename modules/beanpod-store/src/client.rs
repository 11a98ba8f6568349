use neo4rs::{query, ConfigBuilder, Graph};

/// Thin wrapper around the bolt driver providing connection setup.
#[derive(Clone)]
pub struct StoreClient {
    pub(crate) graph: Graph,
}

impl StoreClient {
    /// Connect to the document store with the given credentials.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, neo4rs::Error> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .fetch_size(500)
            .max_connections(10)
            .build()
            .unwrap();
        let graph = Graph::connect(config).await?;
        Ok(Self { graph })
    }

    /// One round-trip to prove the connection works; initialization fails
    /// fast instead of surfacing as the first query error.
    pub async fn ping(&self) -> Result<(), neo4rs::Error> {
        self.graph.run(query("RETURN 1")).await
    }

    /// Get a reference to the underlying driver handle.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }
}

use neo4rs::query;
use tracing::info;

use crate::StoreClient;

/// Vector dimensionality of the embeddings service model.
pub const EMBEDDING_DIMENSIONS: usize = 768;

/// Run idempotent schema migrations: constraints, scalar indexes, the bean
/// full-text index and the three vector indexes.
pub async fn migrate(client: &StoreClient) -> Result<(), neo4rs::Error> {
    let g = client.inner();

    info!("Running schema migrations...");

    let constraints = [
        "CREATE CONSTRAINT bean_url IF NOT EXISTS FOR (n:Bean) REQUIRE n.url IS UNIQUE",
        "CREATE CONSTRAINT concept_id IF NOT EXISTS FOR (n:Concept) REQUIRE n.id IS UNIQUE",
    ];
    for c in &constraints {
        g.run(query(c)).await?;
    }
    info!("Uniqueness constraints created");

    let scalar = [
        "CREATE INDEX bean_updated IF NOT EXISTS FOR (n:Bean) ON (n.updated)",
        "CREATE INDEX bean_kind IF NOT EXISTS FOR (n:Bean) ON (n.kind)",
        "CREATE INDEX noise_mapped_url IF NOT EXISTS FOR (n:Noise) ON (n.mapped_url)",
        "CREATE INDEX noise_updated IF NOT EXISTS FOR (n:Noise) ON (n.updated)",
        "CREATE INDEX concept_updated IF NOT EXISTS FOR (n:Concept) ON (n.updated)",
        "CREATE INDEX concept_keyphrase IF NOT EXISTS FOR (n:Concept) ON (n.keyphrase)",
        "CREATE INDEX keyword_updated IF NOT EXISTS FOR (n:Keyword) ON (n.updated)",
    ];
    for s in &scalar {
        g.run(query(s)).await?;
    }
    info!("Scalar indexes created");

    let fulltext = [
        "CREATE FULLTEXT INDEX bean_text IF NOT EXISTS FOR (n:Bean) ON EACH [n.title, n.text, n.summary, n.keywords]",
    ];
    for f in &fulltext {
        g.run(query(f)).await?;
    }
    info!("Full-text index created");

    let vector = [
        format!(
            "CREATE VECTOR INDEX bean_category_embeddings IF NOT EXISTS FOR (n:Bean) ON (n.category_embeddings) \
             OPTIONS {{indexConfig: {{`vector.dimensions`: {EMBEDDING_DIMENSIONS}, `vector.similarity_function`: 'cosine'}}}}"
        ),
        format!(
            "CREATE VECTOR INDEX bean_search_embeddings IF NOT EXISTS FOR (n:Bean) ON (n.search_embeddings) \
             OPTIONS {{indexConfig: {{`vector.dimensions`: {EMBEDDING_DIMENSIONS}, `vector.similarity_function`: 'cosine'}}}}"
        ),
        format!(
            "CREATE VECTOR INDEX concept_embeddings IF NOT EXISTS FOR (n:Concept) ON (n.embeddings) \
             OPTIONS {{indexConfig: {{`vector.dimensions`: {EMBEDDING_DIMENSIONS}, `vector.similarity_function`: 'cosine'}}}}"
        ),
    ];
    for v in &vector {
        g.run(query(v.as_str())).await?;
    }
    info!("Vector indexes created");

    info!("Schema migration complete");
    Ok(())
}

use neo4rs::{query, BoltType};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use beanpod_common::{is_missing_vector, BeanpodError};

use crate::bolt::doc_to_bolt;
use crate::client::StoreClient;
use crate::query::{render_projection, Filter, Params, Projection, Sort};

// Score floors are in Lucene BM25 units: zero keeps every index match,
// ranked; callers needing a stricter floor pass their own.
const DEFAULT_TEXT_MIN_SCORE: f64 = 0.0;
const DEFAULT_VECTOR_MIN_SCORE: f64 = 0.5;
const DEFAULT_SEARCH_TOP_N: i64 = 5;

/// The vector index returns nearest neighbours before scalar filters apply,
/// so fetch a multiple of the requested page and trim after filtering.
const VECTOR_OVERFETCH: i64 = 4;

/// Search tuning shared by text and vector search.
#[derive(Debug, Clone, Default)]
pub struct SearchOpts {
    pub filter: Filter,
    pub projection: Projection,
    pub min_score: Option<f64>,
    pub top_n: Option<i64>,
}

impl SearchOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_projection(mut self, fields: Vec<String>) -> Self {
        self.projection = Some(fields);
        self
    }

    pub fn with_min_score(mut self, score: f64) -> Self {
        self.min_score = Some(score);
        self
    }

    pub fn with_top_n(mut self, top_n: i64) -> Self {
        self.top_n = Some(top_n);
        self
    }
}

/// Typed collection facade over one node label.
///
/// Documents are flat property maps; optional fields that were never written
/// stay absent, which is what the `Filter::missing` predicates test. Every
/// mutating operation is safe to repeat — callers rely on that for crash
/// recovery.
pub struct Store<T> {
    client: StoreClient,
    label: &'static str,
    identity: Option<fn(&T) -> Filter>,
    same: Option<fn(&T, &T) -> bool>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            label: self.label,
            identity: self.identity,
            same: self.same,
        }
    }
}

impl<T> Store<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(client: StoreClient, label: &'static str) -> Self {
        Self {
            client,
            label,
            identity: None,
            same: None,
        }
    }

    /// Register an identity filter and equality predicate; `add` uses them
    /// to drop documents that are already present.
    pub fn with_identity(mut self, identity: fn(&T) -> Filter, same: fn(&T, &T) -> bool) -> Self {
        self.identity = Some(identity);
        self.same = Some(same);
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Insert documents that are not already present, returning what was
    /// actually inserted. Empty input is a no-op.
    pub async fn add(&self, mut docs: Vec<T>) -> Result<Vec<T>, BeanpodError> {
        if docs.is_empty() {
            return Ok(docs);
        }

        if let (Some(identity), Some(same)) = (self.identity, self.same) {
            let disjunction = Filter::any(docs.iter().map(identity).collect());
            let existing = self.get(&disjunction, None, None, -1).await?;
            docs.retain(|doc| !existing.iter().any(|have| same(doc, have)));

            // Collapse in-batch duplicates as well; the uniqueness
            // constraint would otherwise reject the whole insert.
            let mut kept: Vec<T> = Vec::with_capacity(docs.len());
            for doc in docs {
                if !kept.iter().any(|have| same(&doc, have)) {
                    kept.push(doc);
                }
            }
            docs = kept;

            if docs.is_empty() {
                info!(label = self.label, "All documents already present");
                return Ok(docs);
            }
        }

        let mut bolt_docs: Vec<BoltType> = Vec::with_capacity(docs.len());
        for doc in &docs {
            bolt_docs.push(doc_to_bolt(doc).map_err(|e| BeanpodError::Database(e.to_string()))?);
        }

        let cypher = format!("UNWIND $docs AS doc CREATE (n:{}) SET n = doc", self.label);
        let q = query(&cypher).param("docs", bolt_docs);
        self.client
            .graph
            .run(q)
            .await
            .map_err(|e| BeanpodError::Database(e.to_string()))?;

        info!(label = self.label, inserted = docs.len(), "Documents inserted");
        Ok(docs)
    }

    /// Positional zip: patch `i` merges into documents matching filter `i`
    /// with last-writer-wins field semantics. Zero matches is not an error.
    pub async fn update(
        &self,
        patches: &[serde_json::Value],
        filters: &[Filter],
    ) -> Result<u64, BeanpodError> {
        let mut matched_total = 0u64;
        for (patch, filter) in patches.iter().zip(filters.iter()) {
            let mut params = Params::default();
            let clause = filter
                .render("n", &mut params)
                .map(|c| format!(" WHERE {c}"))
                .unwrap_or_default();
            let patch_param = params.bind(patch.clone());
            let cypher = format!(
                "MATCH (n:{}){clause} SET n += ${patch_param} RETURN count(n) AS matched",
                self.label
            );
            let q = params.apply(query(&cypher));

            let mut stream = self
                .client
                .graph
                .execute(q)
                .await
                .map_err(|e| BeanpodError::Database(e.to_string()))?;
            if let Some(row) = stream
                .next()
                .await
                .map_err(|e| BeanpodError::Database(e.to_string()))?
            {
                matched_total += row.get::<i64>("matched").unwrap_or(0) as u64;
            }
        }
        info!(label = self.label, matched = matched_total, "Documents updated");
        Ok(matched_total)
    }

    /// Filtered read. `limit <= 0` means no limit.
    pub async fn get(
        &self,
        filter: &Filter,
        projection: Projection,
        sort: Option<Sort>,
        limit: i64,
    ) -> Result<Vec<T>, BeanpodError> {
        let mut params = Params::default();
        let clause = filter
            .render("n", &mut params)
            .map(|c| format!(" WHERE {c}"))
            .unwrap_or_default();
        let order = sort.map(|s| format!(" {}", s.render("n"))).unwrap_or_default();
        let limit_clause = if limit > 0 {
            format!(" LIMIT {limit}")
        } else {
            String::new()
        };
        let cypher = format!(
            "MATCH (n:{}){clause} RETURN {} AS doc{order}{limit_clause}",
            self.label,
            render_projection(&projection, "n", &[]),
        );
        self.collect(params.apply(query(&cypher))).await
    }

    /// Full-text search over the label's text index. Terms are joined into a
    /// space-separated phrase; results are score-filtered, sorted descending
    /// and carry `search_score`.
    pub async fn text_search(
        &self,
        terms: &[String],
        opts: &SearchOpts,
    ) -> Result<Vec<T>, BeanpodError> {
        let mut params = Params::default();
        let phrase = params.bind(serde_json::Value::String(terms.join(" ")));
        let min_score = params.bind(serde_json::json!(
            opts.min_score.unwrap_or(DEFAULT_TEXT_MIN_SCORE)
        ));
        let filter_clause = opts
            .filter
            .render("node", &mut params)
            .map(|c| format!(" AND {c}"))
            .unwrap_or_default();
        let top_n = opts.top_n.unwrap_or(DEFAULT_SEARCH_TOP_N).max(1);

        let cypher = format!(
            "CALL db.index.fulltext.queryNodes('{}_text', ${phrase}) YIELD node, score \
             WHERE score > ${min_score}{filter_clause} \
             RETURN {} AS doc ORDER BY score DESC LIMIT {top_n}",
            self.label.to_lowercase(),
            render_projection(&opts.projection, "node", &[("search_score", "score")]),
        );
        self.collect(params.apply(query(&cypher))).await
    }

    /// Approximate-nearest-neighbour search against one vector field. Each
    /// query vector fans out to its own index lookup; per-query results are
    /// concatenated and duplicates are tolerated. Empty query vectors (the
    /// embedding client's failure backstop) are skipped.
    pub async fn vector_search(
        &self,
        query_vectors: &[Vec<f32>],
        field: &str,
        opts: &SearchOpts,
    ) -> Result<Vec<T>, BeanpodError> {
        let top_n = opts.top_n.unwrap_or(DEFAULT_SEARCH_TOP_N).max(1);
        let min_score = opts.min_score.unwrap_or(DEFAULT_VECTOR_MIN_SCORE);
        let index = format!("{}_{field}", self.label.to_lowercase());

        let mut found = Vec::new();
        for vector in query_vectors {
            if is_missing_vector(vector) {
                warn!(label = self.label, "Skipping empty query vector");
                continue;
            }
            let mut params = Params::default();
            let embedding = params.bind(
                serde_json::to_value(vector).map_err(|e| BeanpodError::Database(e.to_string()))?,
            );
            let min = params.bind(serde_json::json!(min_score));
            let filter_clause = opts
                .filter
                .render("node", &mut params)
                .map(|c| format!(" AND {c}"))
                .unwrap_or_default();

            let cypher = format!(
                "CALL db.index.vector.queryNodes('{index}', {k}, ${embedding}) YIELD node, score \
                 WHERE score >= ${min}{filter_clause} \
                 RETURN {} AS doc ORDER BY score DESC LIMIT {top_n}",
                render_projection(&opts.projection, "node", &[("search_score", "score")]),
                k = top_n * VECTOR_OVERFETCH,
            );
            found.extend(self.collect(params.apply(query(&cypher))).await?);
        }
        Ok(found)
    }

    /// Raw aggregation escape hatch for folds the filter DSL cannot express.
    /// The statement must return one map column named `doc`.
    pub async fn aggregate<R: DeserializeOwned>(
        &self,
        cypher: &str,
        params: Vec<(&str, serde_json::Value)>,
    ) -> Result<Vec<R>, BeanpodError> {
        let mut q = query(cypher);
        for (name, value) in params {
            q = q.param(name, crate::bolt::to_bolt(value));
        }
        let mut stream = self
            .client
            .graph
            .execute(q)
            .await
            .map_err(|e| BeanpodError::Database(e.to_string()))?;
        let mut rows = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| BeanpodError::Database(e.to_string()))?
        {
            match decode_doc::<R>(&row) {
                Ok(doc) => rows.push(doc),
                Err(e) => warn!(label = self.label, error = %e, "Skipping undecodable row"),
            }
        }
        Ok(rows)
    }

    pub async fn delete(&self, filter: &Filter) -> Result<u64, BeanpodError> {
        let mut params = Params::default();
        let clause = filter
            .render("n", &mut params)
            .map(|c| format!(" WHERE {c}"))
            .unwrap_or_default();
        let cypher = format!(
            "MATCH (n:{}){clause} DETACH DELETE n RETURN count(n) AS deleted",
            self.label
        );
        let q = params.apply(query(&cypher));
        let mut stream = self
            .client
            .graph
            .execute(q)
            .await
            .map_err(|e| BeanpodError::Database(e.to_string()))?;
        let deleted = match stream
            .next()
            .await
            .map_err(|e| BeanpodError::Database(e.to_string()))?
        {
            Some(row) => row.get::<i64>("deleted").unwrap_or(0) as u64,
            None => 0,
        };
        info!(label = self.label, deleted, "Documents deleted");
        Ok(deleted)
    }

    async fn collect(&self, q: neo4rs::Query) -> Result<Vec<T>, BeanpodError> {
        let mut stream = self
            .client
            .graph
            .execute(q)
            .await
            .map_err(|e| BeanpodError::Database(e.to_string()))?;
        let mut docs = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| BeanpodError::Database(e.to_string()))?
        {
            match decode_doc::<T>(&row) {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!(label = self.label, error = %e, "Skipping undecodable row"),
            }
        }
        Ok(docs)
    }
}

/// Map projections surface absent properties as explicit nulls; strip them
/// so documents keep "field missing" semantics on the way out too.
fn decode_doc<R: DeserializeOwned>(row: &neo4rs::Row) -> anyhow::Result<R> {
    let mut value: serde_json::Value = row.get("doc")?;
    if let serde_json::Value::Object(map) = &mut value {
        map.retain(|_, v| !v.is_null());
    }
    Ok(serde_json::from_value(value)?)
}

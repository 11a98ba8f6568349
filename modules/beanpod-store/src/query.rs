//! Small typed query DSL rendered to parameterized Cypher.
//!
//! Call sites build `Filter`/`Sort`/`Projection` values; only the store
//! itself turns them into query text. Filter operands are always bound as
//! parameters, never spliced into the statement.

use neo4rs::BoltType;
use serde_json::Value;

use crate::bolt::to_bolt;

/// One comparison against a document field.
#[derive(Debug, Clone)]
enum Cond {
    Eq(String, Value),
    /// Matches when the field differs from the operand or is absent.
    Ne(String, Value),
    Gte(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    Exists(String),
    Missing(String),
    Or(Vec<Filter>),
}

/// Conjunction of conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conds: Vec<Cond>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conds.is_empty()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conds.push(Cond::Eq(checked(field), value.into()));
        self
    }

    pub fn ne(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conds.push(Cond::Ne(checked(field), value.into()));
        self
    }

    pub fn gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conds.push(Cond::Gte(checked(field), value.into()));
        self
    }

    pub fn lte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conds.push(Cond::Lte(checked(field), value.into()));
        self
    }

    pub fn any_of(mut self, field: &str, values: Vec<Value>) -> Self {
        self.conds.push(Cond::In(checked(field), values));
        self
    }

    pub fn exists(mut self, field: &str) -> Self {
        self.conds.push(Cond::Exists(checked(field)));
        self
    }

    pub fn missing(mut self, field: &str) -> Self {
        self.conds.push(Cond::Missing(checked(field)));
        self
    }

    /// Disjunction of whole filters, used for identity dedup on add.
    pub fn any(filters: Vec<Filter>) -> Self {
        Self {
            conds: vec![Cond::Or(filters)],
        }
    }

    /// Render to a Cypher boolean expression over `var`, binding operands
    /// into `params`. Returns None for the match-everything filter.
    pub(crate) fn render(&self, var: &str, params: &mut Params) -> Option<String> {
        if self.conds.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .conds
            .iter()
            .map(|cond| render_cond(cond, var, params))
            .collect();
        Some(parts.join(" AND "))
    }
}

fn render_cond(cond: &Cond, var: &str, params: &mut Params) -> String {
    match cond {
        Cond::Eq(f, v) => {
            let p = params.bind(v.clone());
            format!("{var}.{f} = ${p}")
        }
        Cond::Ne(f, v) => {
            let p = params.bind(v.clone());
            format!("({var}.{f} IS NULL OR {var}.{f} <> ${p})")
        }
        Cond::Gte(f, v) => {
            let p = params.bind(v.clone());
            format!("{var}.{f} >= ${p}")
        }
        Cond::Lte(f, v) => {
            let p = params.bind(v.clone());
            format!("{var}.{f} <= ${p}")
        }
        Cond::In(f, vs) => {
            let p = params.bind(Value::Array(vs.clone()));
            format!("{var}.{f} IN ${p}")
        }
        Cond::Exists(f) => format!("{var}.{f} IS NOT NULL"),
        Cond::Missing(f) => format!("{var}.{f} IS NULL"),
        Cond::Or(filters) => {
            let parts: Vec<String> = filters
                .iter()
                .filter_map(|flt| flt.render(var, params).map(|s| format!("({s})")))
                .collect();
            if parts.is_empty() {
                "true".to_string()
            } else {
                format!("({})", parts.join(" OR "))
            }
        }
    }
}

/// Property names come from code, not users, but guard against anything that
/// could escape the `var.field` position.
fn checked(field: &str) -> String {
    debug_assert!(
        !field.is_empty()
            && field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_'),
        "invalid field name: {field}"
    );
    field.to_string()
}

/// Sort direction on one field.
#[derive(Debug, Clone)]
pub struct Sort {
    field: String,
    descending: bool,
}

impl Sort {
    pub fn desc(field: &str) -> Self {
        Self {
            field: checked(field),
            descending: true,
        }
    }

    pub fn asc(field: &str) -> Self {
        Self {
            field: checked(field),
            descending: false,
        }
    }

    pub(crate) fn render(&self, var: &str) -> String {
        let dir = if self.descending { "DESC" } else { "ASC" };
        format!("ORDER BY {var}.{} {dir}", self.field)
    }
}

/// Field projection. `None` projects the whole document.
pub type Projection = Option<Vec<String>>;

/// Render a Cypher map projection over `var`, optionally tacking on extra
/// computed entries such as the search score.
pub(crate) fn render_projection(projection: &Projection, var: &str, extra: &[(&str, &str)]) -> String {
    let mut entries: Vec<String> = match projection {
        Some(fields) => fields.iter().map(|f| format!(".{}", checked(f))).collect(),
        None => vec![".*".to_string()],
    };
    for (name, expr) in extra {
        entries.push(format!("{name}: {expr}"));
    }
    format!("{var} {{{}}}", entries.join(", "))
}

/// Accumulates bound parameters for one statement.
#[derive(Default)]
pub(crate) struct Params {
    entries: Vec<(String, BoltType)>,
}

impl Params {
    pub fn bind(&mut self, value: Value) -> String {
        let name = format!("p{}", self.entries.len());
        self.entries.push((name.clone(), to_bolt(value)));
        name
    }

    pub fn apply(self, mut query: neo4rs::Query) -> neo4rs::Query {
        for (name, value) in self.entries {
            query = query.param(&name, value);
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_filter_renders_nothing() {
        let mut params = Params::default();
        assert!(Filter::new().render("n", &mut params).is_none());
    }

    #[test]
    fn conjunction_renders_in_order() {
        let mut params = Params::default();
        let filter = Filter::new()
            .missing("category_embeddings")
            .gte("updated", 100)
            .ne("kind", "channel");
        let clause = filter.render("n", &mut params).unwrap();
        assert_eq!(
            clause,
            "n.category_embeddings IS NULL AND n.updated >= $p0 AND (n.kind IS NULL OR n.kind <> $p1)"
        );
    }

    #[test]
    fn membership_renders_with_list_param() {
        let mut params = Params::default();
        let filter = Filter::new().any_of("kind", vec![json!("article"), json!("post")]);
        assert_eq!(filter.render("n", &mut params).unwrap(), "n.kind IN $p0");
    }

    #[test]
    fn identity_disjunction_renders_or() {
        let mut params = Params::default();
        let filter = Filter::any(vec![
            Filter::new().eq("url", "a"),
            Filter::new().eq("url", "b"),
        ]);
        assert_eq!(
            filter.render("n", &mut params).unwrap(),
            "((n.url = $p0) OR (n.url = $p1))"
        );
    }

    #[test]
    fn projection_renders_map_entries() {
        let projection: Projection = Some(vec!["url".to_string(), "text".to_string()]);
        assert_eq!(
            render_projection(&projection, "node", &[("search_score", "score")]),
            "node {.url, .text, search_score: score}"
        );
        assert_eq!(render_projection(&None, "n", &[]), "n {.*}");
    }

    #[test]
    fn sort_renders_direction() {
        assert_eq!(Sort::desc("updated").render("n"), "ORDER BY n.updated DESC");
        assert_eq!(Sort::asc("count").render("k"), "ORDER BY k.count ASC");
    }
}

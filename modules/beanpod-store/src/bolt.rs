use neo4rs::{
    BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType,
};
use serde_json::Value;

/// Convert a JSON value into a bolt parameter so whole documents and filter
/// operands can travel through the driver without per-type plumbing.
pub fn to_bolt(value: Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BoltType::Integer(BoltInteger::new(i))
            } else {
                BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or(0.0)))
            }
        }
        Value::String(s) => BoltType::String(BoltString::from(s.as_str())),
        Value::Array(items) => {
            let list: Vec<BoltType> = items.into_iter().map(to_bolt).collect();
            BoltType::List(BoltList::from(list))
        }
        Value::Object(map) => BoltType::Map(BoltMap::from_iter(
            map.into_iter()
                .map(|(k, v)| (BoltString::from(k.as_str()), to_bolt(v))),
        )),
    }
}

/// Serialize a document into a bolt map. Fails on documents that do not
/// serialize to a JSON object.
pub fn doc_to_bolt<T: serde::Serialize>(doc: &T) -> anyhow::Result<BoltType> {
    let value = serde_json::to_value(doc)?;
    match value {
        Value::Object(_) => Ok(to_bolt(value)),
        other => anyhow::bail!("document did not serialize to an object: {other}"),
    }
}

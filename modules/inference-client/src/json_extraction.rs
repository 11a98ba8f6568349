use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;

/// Pull the ```json fenced region out of a model response and unmarshal it.
/// Anything without a fence, or with undecodable contents, is a failed call
/// and gets retried by the caller.
pub fn extract_json_block<T: DeserializeOwned>(text: &str) -> Result<T> {
    let after_fence = text
        .split("```json")
        .nth(1)
        .ok_or_else(|| anyhow!("no ```json fence in response"))?;
    let inner = after_fence
        .split("```")
        .next()
        .ok_or_else(|| anyhow!("unterminated ```json fence in response"))?;
    serde_json::from_str(inner.trim()).map_err(|e| anyhow!("failed to decode json block: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Sample {
        summary: String,
        topic: String,
    }

    #[test]
    fn extracts_fenced_json() {
        let text = "Here you go:\n```json\n{\"summary\": \"s\", \"topic\": \"t\"}\n```\nDone.";
        let sample: Sample = extract_json_block(text).unwrap();
        assert_eq!(sample.summary, "s");
        assert_eq!(sample.topic, "t");
    }

    #[test]
    fn extracts_arrays() {
        let text = "```json\n[1, 2, 3]\n```";
        let values: Vec<i64> = extract_json_block(text).unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn missing_fence_is_an_error() {
        let result: Result<Sample> = extract_json_block("{\"summary\": \"s\", \"topic\": \"t\"}");
        assert!(result.is_err());
    }

    #[test]
    fn undecodable_contents_are_an_error() {
        let result: Result<Sample> = extract_json_block("```json\nnot json\n```");
        assert!(result.is_err());
    }
}

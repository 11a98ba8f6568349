use tracing::{info, warn};
use uuid::Uuid;

use beanpod_common::{epoch_now, Bean, BeanKind, BeanpodError, KeywordMap, NewsNugget};
use inference_client::util::truncate_to_tokens;

use crate::catalog::Catalog;

const MIN_TEXT_LENGTH: usize = 20;
/// Bean text and noise digests are cut to this budget before storage; it is
/// what the extraction clients can actually consume.
const TEXT_MAX_TOKENS: usize = 2048;
const MIN_KEYWORD_LENGTH: usize = 3;

impl Catalog {
    /// Ingest a batch of beans: validate, split out media noise, stamp,
    /// truncate, dedup-insert, then hand the survivors to the background
    /// enrichment path. Returns the number of beans actually inserted.
    pub async fn add_beans(&self, beans: Vec<Bean>) -> Result<usize, BeanpodError> {
        let mut beans: Vec<Bean> = beans.into_iter().filter(has_text_body).collect();

        let update_time = epoch_now();
        let mut noises = Vec::new();
        for bean in &mut beans {
            if let Some(mut noise) = bean.media_noise.take() {
                noise.mapped_url = bean.url.clone();
                noise.updated = update_time;
                noise.digest = truncate_to_tokens(&noise.digest, TEXT_MAX_TOKENS).to_string();
                noises.push(noise);
            }
            bean.updated = update_time;
            bean.text = truncate_to_tokens(&bean.text, TEXT_MAX_TOKENS).to_string();
        }

        let inserted = self.beans().add(beans).await?;

        // Noise and keyword rows are auxiliary to search correctness; their
        // failures are logged and swallowed.
        if let Err(e) = self.noises().add(noises).await {
            warn!(error = %e, "Media-noise insert failed");
        }
        if let Err(e) = self.keywords().add(keyword_rows(&inserted)).await {
            warn!(error = %e, "Keyword-map insert failed");
        }

        let survivors: Vec<Bean> = inserted
            .iter()
            .filter(|b| b.kind != BeanKind::Channel)
            .cloned()
            .collect();
        let count = inserted.len();

        if !survivors.is_empty() {
            let catalog = self.clone();
            tokio::spawn(async move {
                catalog.enrich(survivors).await;
            });
        }
        Ok(count)
    }

    /// Background enrichment: extract key concepts into the nugget store,
    /// then run a rectification sweep to fill everything else in. A crash
    /// anywhere in here leaves well-formed beans behind; the next sweep
    /// picks them up through the field-missing predicates.
    pub(crate) async fn enrich(&self, beans: Vec<Bean>) {
        let texts: Vec<String> = beans.iter().map(|b| b.text.clone()).collect();
        let update_time = beans.first().map(|b| b.updated).unwrap_or_else(epoch_now);

        info!(beans = beans.len(), "Extracting key concepts");
        let concepts = self.extractor.extract_key_concepts(&texts).await;
        let nuggets: Vec<NewsNugget> = concepts
            .into_iter()
            .map(|concept| NewsNugget {
                id: Uuid::new_v4(),
                keyphrase: concept.keyphrase,
                event: concept.event,
                description: concept.description,
                updated: update_time,
                ..NewsNugget::default()
            })
            .collect();
        if let Err(e) = self.nuggets().add(nuggets).await {
            warn!(error = %e, "Nugget insert failed");
        }

        self.rectify().await;
    }
}

fn has_text_body(bean: &Bean) -> bool {
    bean.text.len() >= MIN_TEXT_LENGTH
}

/// Keyword rows from source-provided keywords: lowercased, short ones
/// dropped.
fn keyword_rows(beans: &[Bean]) -> Vec<KeywordMap> {
    beans
        .iter()
        .flat_map(|bean| {
            bean.keywords
                .iter()
                .filter(|k| k.len() >= MIN_KEYWORD_LENGTH)
                .map(|k| KeywordMap {
                    keyword: k.to_lowercase(),
                    url: bean.url.clone(),
                    updated: bean.updated,
                    count: 0,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bean(url: &str, text: &str) -> Bean {
        Bean {
            url: url.to_string(),
            text: text.to_string(),
            ..Bean::default()
        }
    }

    #[test]
    fn short_texts_are_dropped() {
        assert!(!has_text_body(&bean("u", "too short")));
        assert!(has_text_body(&bean(
            "u",
            "long enough to be worth keeping around"
        )));
    }

    #[test]
    fn keyword_rows_lowercase_and_filter() {
        let mut source = bean("https://example.com/a", "text");
        source.updated = 99;
        source.keywords = vec!["AI".to_string(), "Telecom".to_string(), "LLM".to_string()];
        let rows = keyword_rows(&[source]);
        let keywords: Vec<&str> = rows.iter().map(|r| r.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["telecom", "llm"]);
        assert!(rows.iter().all(|r| r.url == "https://example.com/a"));
        assert!(rows.iter().all(|r| r.updated == 99));
    }
}

//! Literature search
//!
//! Ranked article search over the neuroscience literature service.
//! Read-only, so it runs without human validation.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Error, Result};

use super::{ExecutionContext, Tool};

const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
struct Input {
    query: String,
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize, serde::Serialize)]
struct Article {
    title: String,
    authors: Vec<String>,
    doi: Option<String>,
    year: Option<i32>,
    abstract_snippet: Option<String>,
}

pub struct LiteratureSearchTool;

#[async_trait]
impl Tool for LiteratureSearchTool {
    fn name(&self) -> &'static str {
        "literature_search"
    }

    fn name_frontend(&self) -> &'static str {
        "Literature Search"
    }

    fn description(&self) -> &'static str {
        "Search the neuroscience literature for articles matching a query"
    }

    fn utterances(&self) -> &'static [&'static str] {
        &[
            "find papers about synaptic plasticity",
            "search the literature on place cells",
            "what has been published on cortical columns",
        ]
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Free-text search query"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of articles",
                    "default": DEFAULT_LIMIT,
                    "maximum": MAX_LIMIT
                }
            },
            "required": ["query"]
        })
    }

    fn requires_validation(&self) -> bool {
        false
    }

    fn validate_input(&self, input: &serde_json::Value) -> Result<()> {
        let parsed: Input = serde_json::from_value(input.clone())
            .map_err(|e| Error::Validation(format!("invalid literature_search input: {}", e)))?;
        if parsed.query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".to_string()));
        }
        if let Some(limit) = parsed.limit {
            if limit == 0 || limit > MAX_LIMIT {
                return Err(Error::Validation(format!(
                    "limit must be between 1 and {}",
                    MAX_LIMIT
                )));
            }
        }
        Ok(())
    }

    async fn is_online(&self, ctx: &ExecutionContext) -> bool {
        ctx.client()
            .get(ctx.url("literature/health"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.validate_input(&input)?;
        let input: Input = serde_json::from_value(input)?;
        let limit = input.limit.unwrap_or(DEFAULT_LIMIT).to_string();

        let response = ctx
            .client()
            .get(ctx.url("literature/search"))
            .query(&[("q", input.query.as_str()), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("literature request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "literature service returned {}",
                response.status()
            )));
        }

        let articles: Vec<Article> = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("malformed literature response: {}", e)))?;

        tracing::debug!(query = %input.query, hits = articles.len(), "Literature search complete");

        Ok(serde_json::json!({ "articles": articles }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_limit_bounds() {
        let tool = LiteratureSearchTool;
        assert!(tool
            .validate_input(&serde_json::json!({"query": "plasticity", "limit": 5}))
            .is_ok());

        let err = tool
            .validate_input(&serde_json::json!({"query": "plasticity", "limit": 0}))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = tool
            .validate_input(&serde_json::json!({"query": "plasticity", "limit": 500}))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_empty_query() {
        let tool = LiteratureSearchTool;
        let err = tool
            .validate_input(&serde_json::json!({"query": ""}))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}

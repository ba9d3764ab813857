//! Brain region resolution against the knowledge graph
//!
//! Resolves a free-text region name to its canonical identifier within
//! a brain atlas hierarchy. Read-only, so it runs without human
//! validation.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Error, Result};

use super::{ExecutionContext, Tool};

/// Default atlas hierarchy when the caller does not name one
const DEFAULT_HIERARCHY: &str = "allen_mouse_ccf_v3";

#[derive(Debug, Deserialize)]
struct Input {
    /// Free-text region name, e.g. "thalamus"
    region: String,
    /// Atlas hierarchy to resolve against
    #[serde(default)]
    hierarchy_id: Option<String>,
}

#[derive(Debug, Deserialize, serde::Serialize)]
struct ResolvedRegion {
    id: String,
    name: String,
    acronym: Option<String>,
    hierarchy_id: String,
}

pub struct ResolveBrainRegionTool;

#[async_trait]
impl Tool for ResolveBrainRegionTool {
    fn name(&self) -> &'static str {
        "resolve_brain_region"
    }

    fn name_frontend(&self) -> &'static str {
        "Resolve Brain Region"
    }

    fn description(&self) -> &'static str {
        "Resolve a brain region name to its canonical identifier in an atlas hierarchy"
    }

    fn utterances(&self) -> &'static [&'static str] {
        &[
            "what is the id of the thalamus",
            "resolve the somatosensory cortex",
            "find the region called CA1",
        ]
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "region": {
                    "type": "string",
                    "description": "Free-text brain region name"
                },
                "hierarchy_id": {
                    "type": "string",
                    "description": "Atlas hierarchy identifier",
                    "default": DEFAULT_HIERARCHY
                }
            },
            "required": ["region"]
        })
    }

    fn requires_validation(&self) -> bool {
        false
    }

    fn validate_input(&self, input: &serde_json::Value) -> Result<()> {
        let parsed: Input = serde_json::from_value(input.clone())
            .map_err(|e| Error::Validation(format!("invalid resolve_brain_region input: {}", e)))?;
        if parsed.region.trim().is_empty() {
            return Err(Error::Validation("region must not be empty".to_string()));
        }
        Ok(())
    }

    async fn is_online(&self, ctx: &ExecutionContext) -> bool {
        ctx.client()
            .get(ctx.url("kg/health"))
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
        let hierarchy = input
            .hierarchy_id
            .unwrap_or_else(|| DEFAULT_HIERARCHY.to_string());

        let url = ctx.url(&format!(
            "kg/hierarchies/{}/regions",
            urlencoding::encode(&hierarchy)
        ));

        let response = ctx
            .client()
            .get(&url)
            .query(&[("name", input.region.as_str())])
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("knowledge graph request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "knowledge graph returned {}",
                response.status()
            )));
        }

        let regions: Vec<ResolvedRegion> = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("malformed knowledge graph response: {}", e)))?;

        tracing::debug!(
            region = %input.region,
            hierarchy = %hierarchy,
            matches = regions.len(),
            "Resolved brain region"
        );

        Ok(serde_json::json!({ "regions": regions }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_region() {
        let tool = ResolveBrainRegionTool;
        let err = tool
            .validate_input(&serde_json::json!({"region": "  "}))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_missing_region() {
        let tool = ResolveBrainRegionTool;
        let err = tool.validate_input(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_validate_accepts_optional_hierarchy() {
        let tool = ResolveBrainRegionTool;
        assert!(tool
            .validate_input(&serde_json::json!({"region": "thalamus"}))
            .is_ok());
        assert!(tool
            .validate_input(&serde_json::json!({
                "region": "thalamus",
                "hierarchy_id": "allen_human"
            }))
            .is_ok());
    }
}

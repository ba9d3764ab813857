//! Tool execution adapters
//!
//! Each tool is a trait object carrying static metadata (discovery name,
//! description, input schema, whether it needs human validation) plus an
//! async `execute` bound to a request-scoped [`ExecutionContext`]. Input
//! is validated by deserializing into the tool's typed input struct
//! before any dispatch; a failed validation never reaches the network.

pub mod brain_region;
pub mod literature;
pub mod simulation;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::config::ToolBackendConfig;
use crate::error::{Error, Result};
use crate::types::{ScopeFilter, ToolDescriptor, ToolHealth};

pub use brain_region::ResolveBrainRegionTool;
pub use literature::LiteratureSearchTool;
pub use simulation::RunSimulationTool;

/// Request-scoped context handed to every tool invocation.
///
/// Carries the shared HTTP client (bearer token and content type baked
/// into default headers), the backend base URL, and the caller's tenant
/// scope. Never global; built once per request.
#[derive(Clone)]
pub struct ExecutionContext {
    http: reqwest::Client,
    base_url: String,
    pub scope: ScopeFilter,
}

impl ExecutionContext {
    /// Build a context from the backend configuration
    pub fn new(config: &ToolBackendConfig, scope: ScopeFilter) -> Result<Self> {
        config.validate()?;

        let base_url = config.base_url.trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &config.api_key {
            let auth_value = format!("Bearer {}", api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
            );
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            scope,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.http
    }

    /// Absolute URL for a backend path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// A single executable capability
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable registry name
    fn name(&self) -> &'static str;

    /// Human-facing display name
    fn name_frontend(&self) -> &'static str;

    /// What the tool does, for routing and discovery
    fn description(&self) -> &'static str;

    /// Example phrasings that should route to this tool
    fn utterances(&self) -> &'static [&'static str];

    /// JSON schema of the expected input
    fn input_schema(&self) -> serde_json::Value;

    /// Whether a human must accept each call before it runs
    fn requires_validation(&self) -> bool;

    /// Check the input without dispatching.
    ///
    /// Violations are [`Error::Validation`]; implementations typically
    /// deserialize into their typed input struct plus field checks.
    fn validate_input(&self, input: &serde_json::Value) -> Result<()>;

    /// Probe whether the backing service is reachable. Never errors.
    async fn is_online(&self, ctx: &ExecutionContext) -> bool;

    /// Run the tool against validated input
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value>;
}

/// Name-indexed set of registered tools
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// The stock tool set
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ResolveBrainRegionTool));
        registry.register(Arc::new(LiteratureSearchTool));
        registry.register(Arc::new(RunSimulationTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))
    }

    /// Discovery listing, sorted by name for stable output
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut list: Vec<ToolDescriptor> = self
            .tools
            .values()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                name_frontend: t.name_frontend().to_string(),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Probe every registered tool's backing service
    pub async fn probe(&self, ctx: &ExecutionContext) -> Vec<ToolHealth> {
        let mut list = Vec::with_capacity(self.tools.len());
        for tool in self.tools.values() {
            list.push(ToolHealth {
                name: tool.name().to_string(),
                name_frontend: tool.name_frontend().to_string(),
                online: tool.is_online(ctx).await,
            });
        }
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_default_tools()
    }
}

//! Chat service facade
//!
//! `ChatService` exposes the protocol surface as plain methods; the HTTP
//! framework binding lives elsewhere. Every method takes a
//! [`RequestContext`] identifying the caller and enforces thread
//! ownership before touching anything.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::config::{Config, TitleConfig, ToolBackendConfig};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::orchestrator::{DecisionOutcome, Orchestrator, ProposedCall};
use crate::paging::ThreadPager;
use crate::tools::{ExecutionContext, ToolRegistry};
use crate::types::{
    Decision, Entity, Message, MessagePage, RequestContext, ScopeFilter, SearchHit, Thread,
    ThreadPage, ToolCall, ToolDescriptor, ToolHealth,
};

const DEFAULT_TITLE: &str = "New chat";
const MAX_TITLE_CHARS: usize = 60;

/// Derives a thread title from the opening user message
#[async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn generate(&self, first_user_message: &str) -> Result<String>;
}

/// Deterministic fallback: first line of the message, truncated on a
/// character boundary.
pub struct TruncationTitles;

#[async_trait]
impl TitleGenerator for TruncationTitles {
    async fn generate(&self, first_user_message: &str) -> Result<String> {
        let line = first_user_message
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or(DEFAULT_TITLE);

        if line.chars().count() <= MAX_TITLE_CHARS {
            return Ok(line.to_string());
        }
        let truncated: String = line.chars().take(MAX_TITLE_CHARS).collect();
        Ok(format!("{}…", truncated.trim_end()))
    }
}

/// Title generation via an external completion endpoint
pub struct HttpTitles {
    config: TitleConfig,
    http: reqwest::Client,
}

impl HttpTitles {
    pub fn new(config: TitleConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl TitleGenerator for HttpTitles {
    async fn generate(&self, first_user_message: &str) -> Result<String> {
        #[derive(serde::Deserialize)]
        struct Completion {
            title: String,
        }

        let body = serde_json::json!({
            "model": self.config.model,
            "message": first_user_message,
        });

        let mut request = self.http.post(&self.config.endpoint).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("title request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "title endpoint returned {}",
                response.status()
            )));
        }

        let completion: Completion = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("malformed title response: {}", e)))?;

        Ok(completion.title.trim().to_string())
    }
}

pub struct ChatService {
    db: Arc<Database>,
    registry: Arc<ToolRegistry>,
    orchestrator: Orchestrator,
    tool_config: ToolBackendConfig,
    titles: Arc<dyn TitleGenerator>,
    thread_page_size: u32,
    /// Version stamp for thread listings; bumped on any change that
    /// invalidates a cached listing (create, title edit, delete).
    listing_version: AtomicU64,
}

impl ChatService {
    pub fn new(db: Arc<Database>, registry: Arc<ToolRegistry>, config: &Config) -> Result<Self> {
        let titles: Arc<dyn TitleGenerator> = match &config.titles {
            Some(title_config) => Arc::new(HttpTitles::new(title_config.clone())?),
            None => Arc::new(TruncationTitles),
        };
        Ok(Self {
            orchestrator: Orchestrator::new(db.clone(), registry.clone()),
            tool_config: config.tools.clone(),
            titles,
            thread_page_size: config.paging.thread_page_size as u32,
            listing_version: AtomicU64::new(0),
            db,
            registry,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_titles(mut self, titles: Arc<dyn TitleGenerator>) -> Self {
        self.titles = titles;
        self
    }

    /// Current listing version; changes whenever a cached thread
    /// listing would be stale.
    pub fn listing_version(&self) -> u64 {
        self.listing_version.load(Ordering::Acquire)
    }

    fn bump_listing_version(&self) {
        self.listing_version.fetch_add(1, Ordering::AcqRel);
    }

    fn owned_thread(&self, ctx: &RequestContext, thread_id: &str) -> Result<Thread> {
        self.orchestrator.owned_thread(&ctx.user_id, thread_id)
    }

    // ============================================
    // Threads
    // ============================================

    /// Create a thread for the caller within a tenant scope
    pub fn create_thread(&self, ctx: &RequestContext, scope: ScopeFilter) -> Result<Thread> {
        let now = Utc::now();
        let thread = Thread {
            id: Uuid::new_v4().to_string(),
            user_id: ctx.user_id.clone(),
            virtual_lab_id: scope.virtual_lab_id,
            project_id: scope.project_id,
            title: DEFAULT_TITLE.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_thread(&thread)?;
        self.bump_listing_version();
        tracing::info!(thread_id = %thread.id, user_id = %ctx.user_id, "Created thread");
        Ok(thread)
    }

    /// Rename a thread; owner only. Empty titles are rejected.
    pub fn update_thread_title(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
        title: &str,
    ) -> Result<Thread> {
        self.owned_thread(ctx, thread_id)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::Validation("title must not be empty".to_string()));
        }
        self.db.update_thread_title(thread_id, title)?;
        self.bump_listing_version();
        self.owned_thread(ctx, thread_id)
    }

    /// Derive and store a title from the opening user message.
    ///
    /// Falls back to deterministic truncation when the generator's
    /// backing service is unavailable.
    pub async fn generate_thread_title(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
        first_user_message: &str,
    ) -> Result<Thread> {
        self.owned_thread(ctx, thread_id)?;

        let title = match self.titles.generate(first_user_message).await {
            Ok(title) if !title.trim().is_empty() => title,
            Ok(_) => TruncationTitles.generate(first_user_message).await?,
            Err(e) => {
                tracing::warn!(thread_id, error = %e, "Title generation failed, truncating");
                TruncationTitles.generate(first_user_message).await?
            }
        };

        self.db.update_thread_title(thread_id, &title)?;
        self.bump_listing_version();
        self.owned_thread(ctx, thread_id)
    }

    /// Delete a thread and everything in it; owner only.
    pub fn delete_thread(&self, ctx: &RequestContext, thread_id: &str) -> Result<()> {
        self.owned_thread(ctx, thread_id)?;
        self.db.delete_thread(thread_id)?;
        self.bump_listing_version();
        tracing::info!(thread_id, "Deleted thread");
        Ok(())
    }

    /// Page-numbered listing of the caller's threads in a tenant scope
    pub fn list_threads(
        &self,
        ctx: &RequestContext,
        scope: ScopeFilter,
        page: u32,
        page_size: Option<u32>,
    ) -> Result<ThreadPage> {
        let page_size = page_size.unwrap_or(self.thread_page_size);
        if page_size == 0 {
            return Err(Error::Validation("page_size must be positive".to_string()));
        }
        ThreadPager::new(self.db.clone(), ctx.user_id.clone(), scope, page_size).page(page)
    }

    // ============================================
    // Messages
    // ============================================

    /// Append a user message to an owned thread
    pub fn append_user_message(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
        content: &str,
    ) -> Result<Message> {
        self.owned_thread(ctx, thread_id)?;
        if content.trim().is_empty() {
            return Err(Error::Validation("message must not be empty".to_string()));
        }
        self.db.append_message(
            thread_id,
            &Uuid::new_v4().to_string(),
            Entity::User,
            content,
            Utc::now(),
        )
    }

    /// Append an assistant reply to an owned thread
    pub fn append_ai_message(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
        content: &str,
    ) -> Result<Message> {
        self.owned_thread(ctx, thread_id)?;
        self.db.append_message(
            thread_id,
            &Uuid::new_v4().to_string(),
            Entity::AiMessage,
            content,
            Utc::now(),
        )
    }

    /// One backward page of an owned thread's messages
    pub fn list_messages(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<MessagePage> {
        self.owned_thread(ctx, thread_id)?;
        if page_size == 0 {
            return Err(Error::Validation("page_size must be positive".to_string()));
        }
        self.db.page_messages_before(thread_id, cursor, page_size)
    }

    // ============================================
    // Search
    // ============================================

    /// Ranked search over the caller's threads
    pub fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
        scope: ScopeFilter,
        limit: u32,
    ) -> Result<Vec<SearchHit>> {
        self.db.search_threads(&ctx.user_id, query, &scope, limit)
    }

    // ============================================
    // Tool calls
    // ============================================

    /// Record an assistant's proposed calls against an owned thread.
    ///
    /// Appends the `ai_tool` message holding the serialized batch, then
    /// routes each call through the gate.
    pub fn propose_tool_calls(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
        proposals: Vec<ProposedCall>,
    ) -> Result<(Message, Vec<ToolCall>)> {
        self.owned_thread(ctx, thread_id)?;
        if proposals.is_empty() {
            return Err(Error::Validation(
                "at least one tool call is required".to_string(),
            ));
        }

        let batch: Vec<serde_json::Value> = proposals
            .iter()
            .map(|p| {
                serde_json::json!({
                    "tool_name": p.tool_name,
                    "arguments": p.arguments,
                })
            })
            .collect();
        let message = self.db.append_message(
            thread_id,
            &Uuid::new_v4().to_string(),
            Entity::AiTool,
            &serde_json::Value::Array(batch).to_string(),
            Utc::now(),
        )?;

        let calls = self
            .orchestrator
            .propose(thread_id, &message.msg_id, proposals)?;
        Ok((message, calls))
    }

    /// Apply the owner's accept/reject decision to a pending call
    pub fn decide_tool_call(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
        call_id: &str,
        decision: Decision,
    ) -> Result<DecisionOutcome> {
        self.orchestrator
            .decide(&ctx.user_id, thread_id, call_id, decision)
    }

    /// Execute an approved call, recording its result message.
    ///
    /// The execution context inherits the thread's tenant scope.
    pub async fn run_tool_call(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
        call_id: &str,
    ) -> Result<Option<Message>> {
        let thread = self.owned_thread(ctx, thread_id)?;
        let exec_ctx = ExecutionContext::new(
            &self.tool_config,
            ScopeFilter {
                virtual_lab_id: thread.virtual_lab_id,
                project_id: thread.project_id,
            },
        )?;
        self.orchestrator.run_call(&exec_ctx, thread_id, call_id).await
    }

    /// Cancel the thread's in-flight turn
    pub fn cancel_turn(&self, ctx: &RequestContext, thread_id: &str) -> Result<usize> {
        self.orchestrator.cancel_turn(&ctx.user_id, thread_id)
    }

    /// Tool calls of an owned thread, in proposal order
    pub fn list_tool_calls(&self, ctx: &RequestContext, thread_id: &str) -> Result<Vec<ToolCall>> {
        self.owned_thread(ctx, thread_id)?;
        self.db.list_tool_calls(thread_id)
    }

    // ============================================
    // Discovery
    // ============================================

    /// Discovery listing of registered tools
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.registry.descriptors()
    }

    /// Probe every tool's backing service
    pub async fn probe_tools(&self) -> Result<Vec<ToolHealth>> {
        let ctx = ExecutionContext::new(&self.tool_config, ScopeFilter::default())?;
        Ok(self.registry.probe(&ctx).await)
    }
}

//! Core domain types for dendrite
//!
//! These types model the conversation store and the tool-call validation
//! protocol that sits between an assistant and a human reviewer.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Thread** | A conversation owned by one user, holding an ordered message history |
//! | **Message** | One immutable entry in a thread (user text, assistant text, tool call batch, tool result) |
//! | **ToolCall** | A single requested tool invocation, tracked through its lifecycle |
//! | **Validation** | The human-in-the-loop gate: some tools run only after explicit acceptance |
//! | **Scope** | Optional tenant coordinates (`virtual_lab_id`, `project_id`) attached to a thread |
//!
//! ### Gated vs non-gated tools
//!
//! Tools declare `requires_validation`. A non-gated call goes straight to
//! `approved` with validation `not_required`. A gated call parks in
//! `pending_approval` until the thread owner accepts or rejects it; only
//! acceptance lets it execute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Entities
// ============================================

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    /// The human owner of the thread
    User,
    /// Assistant free-text reply
    AiMessage,
    /// Assistant tool-call proposal (carries the serialized call batch)
    AiTool,
    /// A tool result (or rejection record) tied to a call id
    Tool,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::User => "user",
            Entity::AiMessage => "ai_message",
            Entity::AiTool => "ai_tool",
            Entity::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Entity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Entity::User),
            "ai_message" => Ok(Entity::AiMessage),
            "ai_tool" => Ok(Entity::AiTool),
            "tool" => Ok(Entity::Tool),
            _ => Err(format!("unknown entity: {}", s)),
        }
    }
}

// ============================================
// Tool-call lifecycle
// ============================================

/// Lifecycle state of a tool call.
///
/// Stored as-is in the `tool_calls.status` column; the wire-level
/// `(state, validation)` pair is derived, never stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Emitted by the assistant, not yet routed
    Proposed,
    /// Gated; waiting for the owner's decision
    PendingApproval,
    /// Cleared to run (auto for non-gated, accepted for gated)
    Approved,
    /// Owner declined; terminal
    Rejected,
    /// Dispatched to the adapter
    Executing,
    /// Result recorded; terminal
    Completed,
    /// Turn was cancelled before completion; terminal
    Stopped,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Proposed => "proposed",
            CallStatus::PendingApproval => "pending_approval",
            CallStatus::Approved => "approved",
            CallStatus::Rejected => "rejected",
            CallStatus::Executing => "executing",
            CallStatus::Completed => "completed",
            CallStatus::Stopped => "stopped",
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Rejected | CallStatus::Completed | CallStatus::Stopped
        )
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(CallStatus::Proposed),
            "pending_approval" => Ok(CallStatus::PendingApproval),
            "approved" => Ok(CallStatus::Approved),
            "rejected" => Ok(CallStatus::Rejected),
            "executing" => Ok(CallStatus::Executing),
            "completed" => Ok(CallStatus::Completed),
            "stopped" => Ok(CallStatus::Stopped),
            _ => Err(format!("unknown call status: {}", s)),
        }
    }
}

/// Wire-level call state shown to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireState {
    /// Still streaming in from the assistant
    PartialCall,
    /// Complete call, not yet resolved into a result
    Call,
    /// Resolved (completed with output, or rejected)
    Result,
}

impl WireState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireState::PartialCall => "partial_call",
            WireState::Call => "call",
            WireState::Result => "result",
        }
    }
}

/// Wire-level validation state shown to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validation {
    /// Tool is non-gated; no human decision involved
    NotRequired,
    /// Gated and awaiting a decision
    Pending,
    /// Owner accepted
    Accepted,
    /// Owner rejected; never leaves this state
    Rejected,
}

impl Validation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Validation::NotRequired => "not_required",
            Validation::Pending => "pending",
            Validation::Accepted => "accepted",
            Validation::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for Validation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_required" => Ok(Validation::NotRequired),
            "pending" => Ok(Validation::Pending),
            "accepted" => Ok(Validation::Accepted),
            "rejected" => Ok(Validation::Rejected),
            _ => Err(format!("unknown validation: {}", s)),
        }
    }
}

// ============================================
// Tool calls
// ============================================

/// A tracked tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Public call identifier (uuid)
    pub call_id: String,
    /// Thread this call belongs to
    pub thread_id: String,
    /// The `ai_tool` message that proposed it
    pub message_id: String,
    /// Registered tool name
    pub tool_name: String,
    /// JSON arguments (possibly edited at accept time)
    pub arguments: serde_json::Value,
    /// Lifecycle state
    pub status: CallStatus,
    /// Human-gate state; `not_required` for non-gated tools
    pub validation: Validation,
    /// Whether the proposal is still streaming in
    pub partial: bool,
    /// Owner feedback recorded on rejection
    pub feedback: Option<String>,
    /// When the call was proposed
    pub created_at: DateTime<Utc>,
    /// Last transition time
    pub updated_at: DateTime<Utc>,
}

impl ToolCall {
    /// Wire-level `(state, validation, stopped)` projection.
    ///
    /// The lifecycle status is internal; clients only ever see this pair
    /// plus the stopped flag.
    pub fn wire_state(&self) -> (WireState, Validation, bool) {
        let state = match self.status {
            CallStatus::Proposed if self.partial => WireState::PartialCall,
            CallStatus::Rejected | CallStatus::Completed => WireState::Result,
            _ => WireState::Call,
        };
        (state, self.validation, self.status == CallStatus::Stopped)
    }
}

/// Owner decision on a pending gated call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "validation", rename_all = "snake_case")]
pub enum Decision {
    /// Accept, optionally replacing the proposed arguments
    Accepted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<serde_json::Value>,
    },
    /// Reject, optionally explaining why
    Rejected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feedback: Option<String>,
    },
}

// ============================================
// Threads & messages
// ============================================

/// A conversation thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    /// Unique identifier (uuid)
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Tenant scope (exact-match filter semantics)
    pub virtual_lab_id: Option<String>,
    /// Tenant scope (exact-match filter semantics)
    pub project_id: Option<String>,
    /// Display title (auto-generated or owner-edited)
    pub title: String,
    /// When the thread was created
    pub created_at: DateTime<Utc>,
    /// Last title edit or message append
    pub updated_at: DateTime<Utc>,
}

/// One immutable entry in a thread's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Insertion id (rowid); the deterministic tie-break for ordering
    pub id: i64,
    /// Public identifier (uuid), used as the pagination cursor
    pub msg_id: String,
    /// Thread this message belongs to
    pub thread_id: String,
    /// Who produced it
    pub entity: Entity,
    /// Text for user/ai_message, serialized payload for ai_tool/tool
    pub content: String,
    /// Timestamp; ordered by `(created_at, id)` within a thread
    pub created_at: DateTime<Utc>,
}

// ============================================
// Request scope
// ============================================

/// Identity of the caller for one request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: String,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Tenant scope filter for listings and search.
///
/// A field left as `None` matches only threads with no value in that
/// field; it is not a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFilter {
    pub virtual_lab_id: Option<String>,
    pub project_id: Option<String>,
}

impl ScopeFilter {
    pub fn scoped(virtual_lab_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            virtual_lab_id: Some(virtual_lab_id.into()),
            project_id: Some(project_id.into()),
        }
    }
}

// ============================================
// Pages & search hits
// ============================================

/// One backward page of messages.
///
/// Rows arrive in descending `(created_at, id)` order; callers reverse
/// the page before prepending it to the visible history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Cursor for the next (older) page; the oldest `msg_id` seen
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// One page of a thread listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadPage {
    pub threads: Vec<Thread>,
    /// 1-based page number
    pub page: u32,
    pub total_pages: u32,
}

/// Best-ranked search match for one thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub thread_id: String,
    /// Public id of the best-ranked matching message
    pub message_id: String,
    pub title: String,
    /// Content of the matching message
    pub content: String,
}

/// Discovery entry for a registered tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub name_frontend: String,
}

/// Health probe result for a registered tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolHealth {
    pub name: String,
    pub name_frontend: String,
    pub online: bool,
}

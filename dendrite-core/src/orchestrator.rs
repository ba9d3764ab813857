//! Tool-call lifecycle orchestration
//!
//! Routes proposed calls through the human-in-the-loop gate, drives
//! accepted calls through the execution adapter, and records results.
//! Every transition is a guarded update in the repository; a guard that
//! matches zero rows surfaces here as [`Error::Conflict`].

use std::sync::Arc;

use uuid::Uuid;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::tools::{ExecutionContext, ToolRegistry};
use crate::types::{CallStatus, Decision, Message, Thread, ToolCall, Validation};

/// A call as proposed by the assistant, before routing
#[derive(Debug, Clone)]
pub struct ProposedCall {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    /// Still streaming in; stays unrouted until completed by a later
    /// proposal with the full arguments
    pub partial: bool,
}

/// Outcome of an owner decision
#[derive(Debug)]
pub enum DecisionOutcome {
    /// The call is approved and ready to execute
    Accepted(ToolCall),
    /// The call is terminally rejected; the rejection record was
    /// appended to the thread
    Rejected { call: ToolCall, record: Message },
}

pub struct Orchestrator {
    db: Arc<Database>,
    registry: Arc<ToolRegistry>,
}

impl Orchestrator {
    pub fn new(db: Arc<Database>, registry: Arc<ToolRegistry>) -> Self {
        Self { db, registry }
    }

    /// Fetch a thread, enforcing ownership.
    pub(crate) fn owned_thread(&self, user_id: &str, thread_id: &str) -> Result<Thread> {
        let thread = self
            .db
            .get_thread(thread_id)?
            .ok_or_else(|| Error::ThreadNotFound(thread_id.to_string()))?;
        if thread.user_id != user_id {
            return Err(Error::Authorization(format!(
                "thread {} does not belong to the requesting user",
                thread_id
            )));
        }
        Ok(thread)
    }

    /// Record an assistant's proposed calls and route each one.
    ///
    /// Gated tools park in `pending_approval`; non-gated tools go
    /// straight to `approved`. Partial proposals stay `proposed` until
    /// the stream finishes. Unknown tool names fail the whole batch
    /// before anything is written.
    pub fn propose(
        &self,
        thread_id: &str,
        message_id: &str,
        proposals: Vec<ProposedCall>,
    ) -> Result<Vec<ToolCall>> {
        for proposal in &proposals {
            self.registry.get(&proposal.tool_name)?;
        }

        let mut calls = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            let now = chrono::Utc::now();
            let call = ToolCall {
                call_id: Uuid::new_v4().to_string(),
                thread_id: thread_id.to_string(),
                message_id: message_id.to_string(),
                tool_name: proposal.tool_name.clone(),
                arguments: proposal.arguments,
                status: CallStatus::Proposed,
                validation: Validation::NotRequired,
                partial: proposal.partial,
                feedback: None,
                created_at: now,
                updated_at: now,
            };
            self.db.insert_tool_call(&call)?;

            if call.partial {
                calls.push(call);
                continue;
            }

            calls.push(self.route(&call.call_id)?);
        }
        Ok(calls)
    }

    /// Route a fully proposed call through the gate.
    pub fn route(&self, call_id: &str) -> Result<ToolCall> {
        let call = self.require_call(call_id)?;
        let tool = self.registry.get(&call.tool_name)?;

        let routed = if tool.requires_validation() {
            self.db.park_for_approval(call_id)?
        } else {
            self.db.auto_approve(call_id)?
        };
        if !routed {
            return Err(Error::Conflict(format!(
                "tool call {} is not awaiting routing",
                call_id
            )));
        }

        tracing::debug!(
            call_id,
            tool = %call.tool_name,
            gated = tool.requires_validation(),
            "Routed tool call"
        );
        self.require_call(call_id)
    }

    /// Apply the owner's accept/reject decision to a pending call.
    ///
    /// Only the thread owner may decide. A decision against a call that
    /// is not `pending_approval` is a conflict, never an overwrite; in
    /// particular a stopped or already-decided call stays as it is.
    pub fn decide(
        &self,
        user_id: &str,
        thread_id: &str,
        call_id: &str,
        decision: Decision,
    ) -> Result<DecisionOutcome> {
        self.owned_thread(user_id, thread_id)?;
        let call = self.require_call(call_id)?;
        if call.thread_id != thread_id {
            return Err(Error::ToolCallNotFound(call_id.to_string()));
        }

        match decision {
            Decision::Accepted { args } => {
                // Edited arguments must satisfy the tool's input contract
                // before they replace anything.
                if let Some(edited) = &args {
                    let tool = self.registry.get(&call.tool_name)?;
                    tool.validate_input(edited)?;
                }
                if !self.db.accept_call(call_id, args.as_ref())? {
                    return Err(Error::Conflict(format!(
                        "tool call {} is not pending approval (status: {})",
                        call_id, call.status
                    )));
                }
                tracing::info!(call_id, thread_id, "Tool call accepted");
                Ok(DecisionOutcome::Accepted(self.require_call(call_id)?))
            }
            Decision::Rejected { feedback } => {
                let msg_id = Uuid::new_v4().to_string();
                let record = self
                    .db
                    .reject_call(call_id, thread_id, &msg_id, feedback.as_deref())?
                    .ok_or_else(|| {
                        Error::Conflict(format!(
                            "tool call {} is not pending approval (status: {})",
                            call_id, call.status
                        ))
                    })?;
                tracing::info!(call_id, thread_id, "Tool call rejected");
                Ok(DecisionOutcome::Rejected {
                    call: self.require_call(call_id)?,
                    record,
                })
            }
        }
    }

    /// Execute an approved call and record its result.
    ///
    /// The call must belong to the given thread; a call id from another
    /// thread is not found, exactly as in [`Orchestrator::decide`].
    /// Input is validated against the tool's contract before any state
    /// change or network traffic. Upstream failures still complete the
    /// call, with a failed result payload; only the result of a call
    /// stopped mid-flight is discarded, in which case `None` is
    /// returned.
    pub async fn run_call(
        &self,
        ctx: &ExecutionContext,
        thread_id: &str,
        call_id: &str,
    ) -> Result<Option<Message>> {
        let call = self.require_call(call_id)?;
        if call.thread_id != thread_id {
            return Err(Error::ToolCallNotFound(call_id.to_string()));
        }
        let tool = self.registry.get(&call.tool_name)?;

        tool.validate_input(&call.arguments)?;

        if !self.db.begin_execution(call_id)? {
            return Err(Error::Conflict(format!(
                "tool call {} is not approved (status: {})",
                call_id, call.status
            )));
        }

        let payload = match tool.execute(ctx, call.arguments.clone()).await {
            Ok(output) => serde_json::json!({
                "call_id": call_id,
                "status": "success",
                "output": output,
            }),
            Err(Error::Upstream(text)) => {
                tracing::warn!(call_id, error = %text, "Tool execution failed upstream");
                serde_json::json!({
                    "call_id": call_id,
                    "status": "failed",
                    "error": text,
                })
            }
            Err(other) => return Err(other),
        };

        let msg_id = Uuid::new_v4().to_string();
        let recorded =
            self.db
                .complete_call(call_id, &call.thread_id, &msg_id, &payload.to_string())?;
        if recorded.is_none() {
            tracing::info!(call_id, "Discarding result for stopped tool call");
        }
        Ok(recorded)
    }

    /// Cancel the thread's in-flight turn: every non-terminal call moves
    /// to `stopped`. Returns how many calls were stopped.
    pub fn cancel_turn(&self, user_id: &str, thread_id: &str) -> Result<usize> {
        self.owned_thread(user_id, thread_id)?;
        let stopped = self.db.stop_thread_calls(thread_id)?;
        tracing::info!(thread_id, stopped, "Cancelled turn");
        Ok(stopped)
    }

    fn require_call(&self, call_id: &str) -> Result<ToolCall> {
        self.db
            .get_tool_call(call_id)?
            .ok_or_else(|| Error::ToolCallNotFound(call_id.to_string()))
    }
}

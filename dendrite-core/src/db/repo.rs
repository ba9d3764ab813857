//! Database repository layer
//!
//! Provides query and insert operations for threads, messages, and tool
//! calls. All state transitions on tool calls are guarded UPDATE
//! statements; zero affected rows means the call was not in the expected
//! state, which callers surface as a conflict.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;

/// Timestamps are stored as fixed-width RFC 3339 UTC strings so that
/// lexicographic comparison in SQL matches chronological order.
pub(crate) fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // Thread operations
    // ============================================

    /// Insert a new thread
    pub fn insert_thread(&self, thread: &Thread) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO threads (id, user_id, virtual_lab_id, project_id, title, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                thread.id,
                thread.user_id,
                thread.virtual_lab_id,
                thread.project_id,
                thread.title,
                ts(&thread.created_at),
                ts(&thread.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Get a single thread by ID
    pub fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM threads WHERE id = ?", [thread_id], |row| {
            Self::row_to_thread(row)
        })
        .optional()
        .map_err(Error::from)
    }

    /// Update a thread's title, bumping `updated_at`.
    ///
    /// Returns false when the thread does not exist.
    pub fn update_thread_title(&self, thread_id: &str, title: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE threads SET title = ?2, updated_at = ?3 WHERE id = ?1",
            params![thread_id, title, ts(&Utc::now())],
        )?;
        Ok(rows > 0)
    }

    /// Delete a thread; messages and tool calls cascade.
    ///
    /// Returns false when the thread does not exist.
    pub fn delete_thread(&self, thread_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM threads WHERE id = ?", [thread_id])?;
        Ok(rows > 0)
    }

    /// Count threads owned by a user within a tenant scope.
    ///
    /// A scope field left unset matches only threads with no value in
    /// that field.
    pub fn count_threads(&self, user_id: &str, scope: &ScopeFilter) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM threads
            WHERE user_id = ?1
              AND ((?2 IS NULL AND virtual_lab_id IS NULL) OR virtual_lab_id = ?2)
              AND ((?3 IS NULL AND project_id IS NULL) OR project_id = ?3)
            "#,
            params![user_id, scope.virtual_lab_id, scope.project_id],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    /// List one page of a user's threads, most recently active first.
    ///
    /// Pages are 1-based; an out-of-range page returns an empty list.
    pub fn list_threads(
        &self,
        user_id: &str,
        scope: &ScopeFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Thread>> {
        let conn = self.conn.lock().unwrap();
        let offset = (page.saturating_sub(1) as i64) * page_size as i64;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM threads
            WHERE user_id = ?1
              AND ((?2 IS NULL AND virtual_lab_id IS NULL) OR virtual_lab_id = ?2)
              AND ((?3 IS NULL AND project_id IS NULL) OR project_id = ?3)
            ORDER BY updated_at DESC, id DESC
            LIMIT ?4 OFFSET ?5
            "#,
        )?;

        let threads = stmt
            .query_map(
                params![
                    user_id,
                    scope.virtual_lab_id,
                    scope.project_id,
                    page_size as i64,
                    offset
                ],
                Self::row_to_thread,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(threads)
    }

    fn row_to_thread(row: &Row) -> rusqlite::Result<Thread> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        Ok(Thread {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            virtual_lab_id: row.get("virtual_lab_id")?,
            project_id: row.get("project_id")?,
            title: row.get("title")?,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        })
    }

    // ============================================
    // Message operations
    // ============================================

    /// Append a message to a thread, bumping the thread's `updated_at`
    /// in the same transaction. Returns the stored message with its
    /// insertion id filled in.
    pub fn append_message(
        &self,
        thread_id: &str,
        msg_id: &str,
        entity: Entity,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Message> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO messages (msg_id, thread_id, entity, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![msg_id, thread_id, entity.as_str(), content, ts(&created_at)],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE threads SET updated_at = ?2 WHERE id = ?1",
            params![thread_id, ts(&created_at)],
        )?;

        tx.commit()?;

        Ok(Message {
            id,
            msg_id: msg_id.to_string(),
            thread_id: thread_id.to_string(),
            entity,
            content: content.to_string(),
            created_at,
        })
    }

    /// Get a message by its public id
    pub fn get_message(&self, msg_id: &str) -> Result<Option<Message>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM messages WHERE msg_id = ?", [msg_id], |row| {
            Self::row_to_message(row)
        })
        .optional()
        .map_err(Error::from)
    }

    /// One backward page of a thread's messages.
    ///
    /// The cursor is the public id of the oldest message already seen;
    /// `None` starts from the newest. Rows come back in descending
    /// `(created_at, id)` order, strictly older than the cursor row.
    pub fn page_messages_before(
        &self,
        thread_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<MessagePage> {
        let conn = self.conn.lock().unwrap();

        // Resolve the cursor to its stored ordering key
        let anchor: Option<(String, i64)> = match cursor {
            Some(msg_id) => {
                let row = conn
                    .query_row(
                        "SELECT created_at, id FROM messages WHERE msg_id = ?1 AND thread_id = ?2",
                        params![msg_id, thread_id],
                        |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)),
                    )
                    .optional()?;
                match row {
                    Some(a) => Some(a),
                    None => {
                        return Err(Error::Validation(format!(
                            "unknown cursor for thread {}: {}",
                            thread_id, msg_id
                        )))
                    }
                }
            }
            None => None,
        };

        // Fetch one extra row to learn whether older messages remain
        let mut messages = match &anchor {
            Some((created_at, id)) => {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT * FROM messages
                    WHERE thread_id = ?1
                      AND (created_at < ?2 OR (created_at = ?2 AND id < ?3))
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?4
                    "#,
                )?;
                let rows = stmt
                    .query_map(
                        params![thread_id, created_at, id, page_size as i64 + 1],
                        Self::row_to_message,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT * FROM messages
                    WHERE thread_id = ?1
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?2
                    "#,
                )?;
                let rows = stmt
                    .query_map(params![thread_id, page_size as i64 + 1], Self::row_to_message)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };

        let has_more = messages.len() > page_size as usize;
        messages.truncate(page_size as usize);
        let next_cursor = messages.last().map(|m| m.msg_id.clone());

        Ok(MessagePage {
            messages,
            next_cursor,
            has_more,
        })
    }

    fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
        let entity_str: String = row.get("entity")?;
        let created_at: String = row.get("created_at")?;
        Ok(Message {
            id: row.get("id")?,
            msg_id: row.get("msg_id")?,
            thread_id: row.get("thread_id")?,
            entity: entity_str.parse().unwrap_or(Entity::User),
            content: row.get("content")?,
            created_at: parse_ts(&created_at),
        })
    }

    // ============================================
    // Tool-call operations
    // ============================================

    /// Insert a newly proposed tool call
    pub fn insert_tool_call(&self, call: &ToolCall) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO tool_calls
                (call_id, thread_id, message_id, tool_name, arguments,
                 status, validation, partial, feedback, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                call.call_id,
                call.thread_id,
                call.message_id,
                call.tool_name,
                call.arguments.to_string(),
                call.status.as_str(),
                call.validation.as_str(),
                call.partial,
                call.feedback,
                ts(&call.created_at),
                ts(&call.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Get a tool call by its public id
    pub fn get_tool_call(&self, call_id: &str) -> Result<Option<ToolCall>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM tool_calls WHERE call_id = ?",
            [call_id],
            |row| Self::row_to_tool_call(row),
        )
        .optional()
        .map_err(Error::from)
    }

    /// List a thread's tool calls in proposal order
    pub fn list_tool_calls(&self, thread_id: &str) -> Result<Vec<ToolCall>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM tool_calls WHERE thread_id = ? ORDER BY created_at ASC, call_id ASC",
        )?;
        let calls = stmt
            .query_map([thread_id], Self::row_to_tool_call)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(calls)
    }

    /// Guarded transition: `proposed` -> `pending_approval`.
    pub fn park_for_approval(&self, call_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            r#"
            UPDATE tool_calls
            SET status = 'pending_approval', validation = 'pending', partial = 0, updated_at = ?2
            WHERE call_id = ?1 AND status = 'proposed'
            "#,
            params![call_id, ts(&Utc::now())],
        )?;
        Ok(rows > 0)
    }

    /// Guarded transition: `proposed` -> `approved` for non-gated tools.
    pub fn auto_approve(&self, call_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            r#"
            UPDATE tool_calls
            SET status = 'approved', validation = 'not_required', partial = 0, updated_at = ?2
            WHERE call_id = ?1 AND status = 'proposed'
            "#,
            params![call_id, ts(&Utc::now())],
        )?;
        Ok(rows > 0)
    }

    /// Guarded transition: `pending_approval` -> `approved`.
    ///
    /// Edited arguments, when supplied, replace the proposed arguments
    /// in the same statement.
    pub fn accept_call(&self, call_id: &str, args: Option<&serde_json::Value>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            r#"
            UPDATE tool_calls
            SET status = 'approved',
                validation = 'accepted',
                arguments = COALESCE(?2, arguments),
                updated_at = ?3
            WHERE call_id = ?1 AND status = 'pending_approval'
            "#,
            params![call_id, args.map(|v| v.to_string()), ts(&Utc::now())],
        )?;
        Ok(rows > 0)
    }

    /// Guarded transition: `pending_approval` -> `rejected`, appending
    /// the rejection record as a `tool` message in the same transaction.
    ///
    /// The rejection payload carries the call id, a rejected marker, and
    /// the owner's feedback; it never contains adapter output. Returns
    /// the appended message, or `None` when the guard did not match.
    pub fn reject_call(
        &self,
        call_id: &str,
        thread_id: &str,
        msg_id: &str,
        feedback: Option<&str>,
    ) -> Result<Option<Message>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();

        let rows = tx.execute(
            r#"
            UPDATE tool_calls
            SET status = 'rejected', validation = 'rejected', feedback = ?2, updated_at = ?3
            WHERE call_id = ?1 AND status = 'pending_approval'
            "#,
            params![call_id, feedback, ts(&now)],
        )?;
        if rows == 0 {
            return Ok(None);
        }

        let payload = serde_json::json!({
            "call_id": call_id,
            "rejected": true,
            "feedback": feedback,
        })
        .to_string();

        tx.execute(
            r#"
            INSERT INTO messages (msg_id, thread_id, entity, content, created_at)
            VALUES (?1, ?2, 'tool', ?3, ?4)
            "#,
            params![msg_id, thread_id, payload, ts(&now)],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE threads SET updated_at = ?2 WHERE id = ?1",
            params![thread_id, ts(&now)],
        )?;

        tx.commit()?;

        Ok(Some(Message {
            id,
            msg_id: msg_id.to_string(),
            thread_id: thread_id.to_string(),
            entity: Entity::Tool,
            content: payload,
            created_at: now,
        }))
    }

    /// Guarded transition: `approved` -> `executing`.
    pub fn begin_execution(&self, call_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            r#"
            UPDATE tool_calls
            SET status = 'executing', updated_at = ?2
            WHERE call_id = ?1 AND status = 'approved'
            "#,
            params![call_id, ts(&Utc::now())],
        )?;
        Ok(rows > 0)
    }

    /// Guarded transition: `executing` -> `completed`, appending the
    /// result as a `tool` message in the same transaction.
    ///
    /// When the call was stopped while executing, the guard fails and
    /// the result is discarded; `None` is returned and nothing is
    /// written.
    pub fn complete_call(
        &self,
        call_id: &str,
        thread_id: &str,
        msg_id: &str,
        result_payload: &str,
    ) -> Result<Option<Message>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();

        let rows = tx.execute(
            r#"
            UPDATE tool_calls
            SET status = 'completed', updated_at = ?2
            WHERE call_id = ?1 AND status = 'executing'
            "#,
            params![call_id, ts(&now)],
        )?;
        if rows == 0 {
            return Ok(None);
        }

        tx.execute(
            r#"
            INSERT INTO messages (msg_id, thread_id, entity, content, created_at)
            VALUES (?1, ?2, 'tool', ?3, ?4)
            "#,
            params![msg_id, thread_id, result_payload, ts(&now)],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE threads SET updated_at = ?2 WHERE id = ?1",
            params![thread_id, ts(&now)],
        )?;

        tx.commit()?;

        Ok(Some(Message {
            id,
            msg_id: msg_id.to_string(),
            thread_id: thread_id.to_string(),
            entity: Entity::Tool,
            content: result_payload.to_string(),
            created_at: now,
        }))
    }

    /// Move every non-terminal call of a thread to `stopped`.
    ///
    /// Returns the number of calls affected.
    pub fn stop_thread_calls(&self, thread_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            r#"
            UPDATE tool_calls
            SET status = 'stopped', updated_at = ?2
            WHERE thread_id = ?1
              AND status IN ('proposed', 'pending_approval', 'approved', 'executing')
            "#,
            params![thread_id, ts(&Utc::now())],
        )?;
        Ok(rows)
    }

    fn row_to_tool_call(row: &Row) -> rusqlite::Result<ToolCall> {
        let arguments_str: String = row.get("arguments")?;
        let status_str: String = row.get("status")?;
        let validation_str: String = row.get("validation")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        Ok(ToolCall {
            call_id: row.get("call_id")?,
            thread_id: row.get("thread_id")?,
            message_id: row.get("message_id")?,
            tool_name: row.get("tool_name")?,
            arguments: serde_json::from_str(&arguments_str).unwrap_or(serde_json::json!({})),
            status: status_str.parse().unwrap_or(CallStatus::Proposed),
            validation: validation_str.parse().unwrap_or(Validation::NotRequired),
            partial: row.get("partial")?,
            feedback: row.get("feedback")?,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn test_thread(db: &Database, id: &str, user_id: &str) -> Thread {
        let now = Utc::now();
        let thread = Thread {
            id: id.to_string(),
            user_id: user_id.to_string(),
            virtual_lab_id: None,
            project_id: None,
            title: "untitled".to_string(),
            created_at: now,
            updated_at: now,
        };
        db.insert_thread(&thread).unwrap();
        thread
    }

    fn test_call(thread_id: &str, message_id: &str, call_id: &str, status: CallStatus) -> ToolCall {
        let now = Utc::now();
        ToolCall {
            call_id: call_id.to_string(),
            thread_id: thread_id.to_string(),
            message_id: message_id.to_string(),
            tool_name: "run_simulation".to_string(),
            arguments: serde_json::json!({"circuit_id": "c"}),
            status,
            validation: match status {
                CallStatus::PendingApproval => Validation::Pending,
                _ => Validation::NotRequired,
            },
            partial: false,
            feedback: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_thread_round_trip() {
        let db = test_db();
        test_thread(&db, "t1", "u1");

        let fetched = db.get_thread("t1").unwrap().unwrap();
        assert_eq!(fetched.user_id, "u1");
        assert_eq!(fetched.title, "untitled");

        assert!(db.update_thread_title("t1", "renamed").unwrap());
        assert_eq!(db.get_thread("t1").unwrap().unwrap().title, "renamed");

        assert!(db.delete_thread("t1").unwrap());
        assert!(db.get_thread("t1").unwrap().is_none());
        assert!(!db.delete_thread("t1").unwrap());
    }

    #[test]
    fn test_scope_filter_absent_matches_unscoped_only() {
        let db = test_db();
        let now = Utc::now();
        for (id, lab) in [("t1", None), ("t2", Some("lab-1"))] {
            db.insert_thread(&Thread {
                id: id.to_string(),
                user_id: "u1".to_string(),
                virtual_lab_id: lab.map(String::from),
                project_id: None,
                title: "x".to_string(),
                created_at: now,
                updated_at: now,
            })
            .unwrap();
        }

        let unscoped = db.list_threads("u1", &ScopeFilter::default(), 1, 10).unwrap();
        assert_eq!(unscoped.len(), 1);
        assert_eq!(unscoped[0].id, "t1");

        let scoped = ScopeFilter {
            virtual_lab_id: Some("lab-1".to_string()),
            project_id: None,
        };
        let hits = db.list_threads("u1", &scoped, 1, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "t2");
    }

    #[test]
    fn test_pagination_tie_break_on_equal_timestamps() {
        let db = test_db();
        test_thread(&db, "t1", "u1");
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

        for i in 0..5 {
            db.append_message("t1", &format!("m{}", i), Entity::User, "hi", at)
                .unwrap();
        }

        // Newest first means highest insertion id first
        let page = db.page_messages_before("t1", None, 3).unwrap();
        let ids: Vec<&str> = page.messages.iter().map(|m| m.msg_id.as_str()).collect();
        assert_eq!(ids, vec!["m4", "m3", "m2"]);
        assert!(page.has_more);

        let page2 = db
            .page_messages_before("t1", page.next_cursor.as_deref(), 3)
            .unwrap();
        let ids2: Vec<&str> = page2.messages.iter().map(|m| m.msg_id.as_str()).collect();
        assert_eq!(ids2, vec!["m1", "m0"]);
        assert!(!page2.has_more);
        assert_eq!(page2.next_cursor.as_deref(), Some("m0"));
    }

    #[test]
    fn test_unknown_cursor_is_validation_error() {
        let db = test_db();
        test_thread(&db, "t1", "u1");
        let err = db.page_messages_before("t1", Some("nope"), 3).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_guarded_accept_requires_pending() {
        let db = test_db();
        test_thread(&db, "t1", "u1");
        db.append_message("t1", "m1", Entity::AiTool, "[]", Utc::now())
            .unwrap();
        db.insert_tool_call(&test_call("t1", "m1", "c1", CallStatus::PendingApproval))
            .unwrap();

        assert!(db.accept_call("c1", None).unwrap());
        // Second accept finds the call already approved
        assert!(!db.accept_call("c1", None).unwrap());

        let call = db.get_tool_call("c1").unwrap().unwrap();
        assert_eq!(call.status, CallStatus::Approved);
        assert_eq!(call.validation, Validation::Accepted);
    }

    #[test]
    fn test_accept_replaces_arguments() {
        let db = test_db();
        test_thread(&db, "t1", "u1");
        db.append_message("t1", "m1", Entity::AiTool, "[]", Utc::now())
            .unwrap();
        db.insert_tool_call(&test_call("t1", "m1", "c1", CallStatus::PendingApproval))
            .unwrap();

        let edited = serde_json::json!({"circuit_id": "edited"});
        assert!(db.accept_call("c1", Some(&edited)).unwrap());
        let call = db.get_tool_call("c1").unwrap().unwrap();
        assert_eq!(call.arguments, edited);
    }

    #[test]
    fn test_reject_appends_rejection_record() {
        let db = test_db();
        test_thread(&db, "t1", "u1");
        db.append_message("t1", "m1", Entity::AiTool, "[]", Utc::now())
            .unwrap();
        db.insert_tool_call(&test_call("t1", "m1", "c1", CallStatus::PendingApproval))
            .unwrap();

        let msg = db
            .reject_call("c1", "t1", "m2", Some("not on my data"))
            .unwrap()
            .unwrap();
        assert_eq!(msg.entity, Entity::Tool);
        let payload: serde_json::Value = serde_json::from_str(&msg.content).unwrap();
        assert_eq!(payload["rejected"], true);
        assert_eq!(payload["feedback"], "not on my data");

        // Rejection is terminal
        assert!(db.reject_call("c1", "t1", "m3", None).unwrap().is_none());
        assert!(!db.accept_call("c1", None).unwrap());
    }

    #[test]
    fn test_completion_discarded_after_stop() {
        let db = test_db();
        test_thread(&db, "t1", "u1");
        db.append_message("t1", "m1", Entity::AiTool, "[]", Utc::now())
            .unwrap();
        let mut call = test_call("t1", "m1", "c1", CallStatus::Approved);
        call.validation = Validation::Accepted;
        db.insert_tool_call(&call).unwrap();

        assert!(db.begin_execution("c1").unwrap());
        assert_eq!(db.stop_thread_calls("t1").unwrap(), 1);

        let discarded = db.complete_call("c1", "t1", "m2", "{}").unwrap();
        assert!(discarded.is_none());
        assert!(db.get_message("m2").unwrap().is_none());
        assert_eq!(
            db.get_tool_call("c1").unwrap().unwrap().status,
            CallStatus::Stopped
        );
    }

    #[test]
    fn test_cascade_delete() {
        let db = test_db();
        test_thread(&db, "t1", "u1");
        db.append_message("t1", "m1", Entity::AiTool, "[]", Utc::now())
            .unwrap();
        db.insert_tool_call(&test_call("t1", "m1", "c1", CallStatus::Proposed))
            .unwrap();

        db.delete_thread("t1").unwrap();
        assert!(db.get_message("m1").unwrap().is_none());
        assert!(db.get_tool_call("c1").unwrap().is_none());
    }
}

//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.
//! Full-text search runs on an external-content FTS5 table kept in sync
//! by triggers; only conversational entities (user, ai_message) are
//! indexed.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Threads, messages, tool calls, search index
    r#"
    -- ============================================
    -- Conversation store
    -- ============================================

    CREATE TABLE IF NOT EXISTS threads (
        id               TEXT PRIMARY KEY,
        user_id          TEXT NOT NULL,
        virtual_lab_id   TEXT,
        project_id       TEXT,
        title            TEXT NOT NULL,
        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_threads_user ON threads(user_id, updated_at DESC);
    CREATE INDEX IF NOT EXISTS idx_threads_scope ON threads(virtual_lab_id, project_id);

    -- The rowid doubles as the deterministic tie-break when two messages
    -- share a created_at timestamp.
    CREATE TABLE IF NOT EXISTS messages (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        msg_id           TEXT NOT NULL UNIQUE,
        thread_id        TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
        entity           TEXT NOT NULL,      -- 'user', 'ai_message', 'ai_tool', 'tool'
        content          TEXT NOT NULL,
        created_at       DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_messages_thread_order
        ON messages(thread_id, created_at DESC, id DESC);

    -- ============================================
    -- Tool-call lifecycle
    -- ============================================

    CREATE TABLE IF NOT EXISTS tool_calls (
        call_id          TEXT PRIMARY KEY,
        thread_id        TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
        message_id       TEXT NOT NULL REFERENCES messages(msg_id) ON DELETE CASCADE,
        tool_name        TEXT NOT NULL,
        arguments        JSON NOT NULL,
        status           TEXT NOT NULL,      -- lifecycle states
        validation       TEXT NOT NULL,      -- 'not_required', 'pending', 'accepted', 'rejected'
        partial          INTEGER NOT NULL DEFAULT 0,
        feedback         TEXT,
        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_tool_calls_thread ON tool_calls(thread_id, status);
    CREATE INDEX IF NOT EXISTS idx_tool_calls_message ON tool_calls(message_id);

    -- ============================================
    -- Full-text search
    -- ============================================

    CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
        content,
        content='messages',
        content_rowid='id'
    );

    CREATE TRIGGER IF NOT EXISTS messages_fts_insert AFTER INSERT ON messages
    WHEN new.entity IN ('user', 'ai_message')
    BEGIN
        INSERT INTO messages_fts(rowid, content) VALUES (new.id, new.content);
    END;

    CREATE TRIGGER IF NOT EXISTS messages_fts_delete AFTER DELETE ON messages
    WHEN old.entity IN ('user', 'ai_message')
    BEGIN
        INSERT INTO messages_fts(messages_fts, rowid, content)
        VALUES ('delete', old.id, old.content);
    END;
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice - should be idempotent
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = ["threads", "messages", "tool_calls", "messages_fts"];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_fts_indexes_conversational_entities_only() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO threads (id, user_id, title, created_at, updated_at)
             VALUES ('t1', 'u1', 'test', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO messages (msg_id, thread_id, entity, content, created_at)
             VALUES ('m1', 't1', 'user', 'thalamus question', '2026-01-01T00:00:01Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO messages (msg_id, thread_id, entity, content, created_at)
             VALUES ('m2', 't1', 'tool', 'thalamus payload', '2026-01-01T00:00:02Z')",
            [],
        )
        .unwrap();

        let hits: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM messages_fts WHERE messages_fts MATCH 'thalamus'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);
    }
}

//! Ranked full-text search over conversation content
//!
//! Backed by an FTS5 index with bm25 ranking. Results collapse to one
//! hit per thread (the best-ranked matching message, ties broken by the
//! most recent message), scoped to the requesting user and the exact
//! tenant scope.

use crate::error::{Error, Result};
use crate::types::{ScopeFilter, SearchHit};
use rusqlite::params;

use super::repo::Database;

/// Turn free-form user input into an FTS5 phrase query.
///
/// Each whitespace-separated token becomes a quoted phrase so that FTS5
/// operator characters in user input cannot change the query structure.
fn fts_query(input: &str) -> String {
    input
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Database {
    /// Search a user's threads, returning at most one hit per thread.
    ///
    /// Only `user` and `ai_message` content is searchable. bm25 scores
    /// rank both the per-thread best message and the final hit order;
    /// lower scores are better in SQLite's convention.
    pub fn search_threads(
        &self,
        user_id: &str,
        query: &str,
        scope: &ScopeFilter,
        limit: u32,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(Error::Validation("search query must not be empty".to_string()));
        }

        let match_expr = fts_query(query);
        let conn = self.connection();
        // bm25() is only callable in the query that runs the MATCH, so
        // the score comes from an FTS-only subquery and the window runs
        // over the joined rows.
        let mut stmt = conn.prepare(
            r#"
            SELECT thread_id, msg_id, title, content FROM (
                SELECT
                    m.thread_id AS thread_id,
                    m.msg_id AS msg_id,
                    t.title AS title,
                    m.content AS content,
                    f.score AS score,
                    m.created_at AS created_at,
                    m.id AS id,
                    ROW_NUMBER() OVER (
                        PARTITION BY m.thread_id
                        ORDER BY f.score, m.created_at DESC, m.id DESC
                    ) AS rn
                FROM (
                    SELECT rowid, bm25(messages_fts) AS score
                    FROM messages_fts
                    WHERE messages_fts MATCH ?1
                ) f
                JOIN messages m ON m.id = f.rowid
                JOIN threads t ON t.id = m.thread_id
                WHERE m.entity IN ('user', 'ai_message')
                  AND t.user_id = ?2
                  AND ((?3 IS NULL AND t.virtual_lab_id IS NULL) OR t.virtual_lab_id = ?3)
                  AND ((?4 IS NULL AND t.project_id IS NULL) OR t.project_id = ?4)
            )
            WHERE rn = 1
            ORDER BY score, created_at DESC, id DESC
            LIMIT ?5
            "#,
        )?;

        let hits = stmt
            .query_map(
                params![
                    match_expr,
                    user_id,
                    scope.virtual_lab_id,
                    scope.project_id,
                    limit as i64
                ],
                |row| {
                    Ok(SearchHit {
                        thread_id: row.get("thread_id")?,
                        message_id: row.get("msg_id")?,
                        title: row.get("title")?,
                        content: row.get("content")?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(hits)
    }
}

//! Client-side pagination controllers
//!
//! [`MessagePaginator`] models an infinite-scroll history view: each
//! fetch pulls the next older page, reverses it into chronological
//! order, and prepends it to the visible history. [`ThreadPager`] walks
//! a page-numbered thread listing.

use std::sync::Arc;

use crate::db::Database;
use crate::error::Result;
use crate::types::{Message, ScopeFilter, Thread, ThreadPage};

/// Backward paginator over a thread's messages.
///
/// The visible history is always in chronological order; new pages are
/// prepended. The cursor is the oldest message's public id.
pub struct MessagePaginator {
    db: Arc<Database>,
    thread_id: String,
    page_size: u32,
    cursor: Option<String>,
    exhausted: bool,
    history: Vec<Message>,
}

impl MessagePaginator {
    pub fn new(db: Arc<Database>, thread_id: impl Into<String>, page_size: u32) -> Self {
        Self {
            db,
            thread_id: thread_id.into(),
            page_size,
            cursor: None,
            exhausted: false,
            history: Vec::new(),
        }
    }

    /// Fetch the next older page and prepend it.
    ///
    /// Returns how many messages were added; zero once the history is
    /// exhausted.
    pub fn load_older(&mut self) -> Result<usize> {
        if self.exhausted {
            return Ok(0);
        }

        let page =
            self.db
                .page_messages_before(&self.thread_id, self.cursor.as_deref(), self.page_size)?;

        let added = page.messages.len();
        // Rows arrive newest-first; reverse before prepending
        let mut chunk = page.messages;
        chunk.reverse();
        chunk.extend(self.history.drain(..));
        self.history = chunk;

        if let Some(cursor) = page.next_cursor {
            self.cursor = Some(cursor);
        }
        self.exhausted = !page.has_more;
        Ok(added)
    }

    /// The loaded history, oldest first
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    /// Drop everything and start over from the newest message.
    ///
    /// There is no forward pagination; a refresh is a from-scratch
    /// fetch.
    pub fn reset(&mut self) {
        self.cursor = None;
        self.exhausted = false;
        self.history.clear();
    }
}

/// Page-number walker over a user's thread listing
pub struct ThreadPager {
    db: Arc<Database>,
    user_id: String,
    scope: ScopeFilter,
    page_size: u32,
}

impl ThreadPager {
    pub fn new(
        db: Arc<Database>,
        user_id: impl Into<String>,
        scope: ScopeFilter,
        page_size: u32,
    ) -> Self {
        Self {
            db,
            user_id: user_id.into(),
            scope,
            page_size,
        }
    }

    /// Fetch one page (1-based) with the total page count
    pub fn page(&self, page: u32) -> Result<ThreadPage> {
        let total = self.db.count_threads(&self.user_id, &self.scope)?;
        let total_pages = if total == 0 {
            0
        } else {
            ((total + self.page_size as u64 - 1) / self.page_size as u64) as u32
        };

        let threads: Vec<Thread> = if page == 0 || (total_pages > 0 && page > total_pages) {
            Vec::new()
        } else {
            self.db
                .list_threads(&self.user_id, &self.scope, page, self.page_size)?
        };

        Ok(ThreadPage {
            threads,
            page,
            total_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Entity;
    use chrono::{Duration, Utc};

    fn seed(db: &Database, thread_id: &str, message_count: usize) {
        let base = Utc::now();
        db.insert_thread(&Thread {
            id: thread_id.to_string(),
            user_id: "u1".to_string(),
            virtual_lab_id: None,
            project_id: None,
            title: thread_id.to_string(),
            created_at: base,
            updated_at: base,
        })
        .unwrap();
        for i in 0..message_count {
            db.append_message(
                thread_id,
                &format!("{}-m{}", thread_id, i),
                Entity::User,
                &format!("message {}", i),
                base + Duration::seconds(i as i64),
            )
            .unwrap();
        }
    }

    #[test]
    fn test_history_stays_chronological() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        seed(&db, "t1", 7);

        let mut paginator = MessagePaginator::new(db, "t1", 3);
        while paginator.load_older().unwrap() > 0 {}

        let contents: Vec<&str> = paginator
            .history()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            contents,
            vec![
                "message 0",
                "message 1",
                "message 2",
                "message 3",
                "message 4",
                "message 5",
                "message 6"
            ]
        );
        assert!(paginator.exhausted());
    }

    #[test]
    fn test_reset_starts_over() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        seed(&db, "t1", 4);

        let mut paginator = MessagePaginator::new(db, "t1", 10);
        paginator.load_older().unwrap();
        assert_eq!(paginator.history().len(), 4);

        paginator.reset();
        assert!(paginator.history().is_empty());
        paginator.load_older().unwrap();
        assert_eq!(paginator.history().len(), 4);
    }

    #[test]
    fn test_thread_pager_last_page() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        for i in 0..5 {
            seed(&db, &format!("t{}", i), 1);
        }

        let pager = ThreadPager::new(db, "u1", ScopeFilter::default(), 2);

        let first = pager.page(1).unwrap();
        assert_eq!(first.threads.len(), 2);
        assert_eq!(first.total_pages, 3);

        let last = pager.page(3).unwrap();
        assert_eq!(last.threads.len(), 1);
        assert_eq!(last.total_pages, 3);

        let beyond = pager.page(4).unwrap();
        assert!(beyond.threads.is_empty());
        assert_eq!(beyond.total_pages, 3);
    }
}

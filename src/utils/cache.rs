//! Durable, resumable page cache backed by SQLite.
//!
//! Every fetched page of a source's paginated results is recorded against
//! its query identity before the worker moves on, so a crashed or
//! interrupted run can resume from the last page it successfully stored
//! instead of re-querying from the start. The schema is three tables:
//!
//! - `queries`: one row per [`QueryIdentity`](crate::models::QueryIdentity), tracking the
//!   resume cursor and terminal status.
//! - `pages`: one row per fetched page, keyed by `(query_key, page_index)`.
//!   Page indices for a query are required to be contiguous from zero;
//!   [`CacheService::store_page`] enforces this with a transaction.
//! - `papers`: one row per paper parsed out of a page, so a resumed or
//!   completed query's accumulated results can be reloaded without
//!   re-parsing `raw_blob`.
//! - `meta`: a single schema-version row for future migrations.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{PageCursor, Paper};

const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("page {page_index} for query {query_key} is out of order; expected {expected}")]
    NonContiguousPage {
        query_key: String,
        page_index: i64,
        expected: i64,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type CacheResultT<T> = Result<T, CacheError>;

/// Result of a cache lookup, mirroring the teacher's hit/miss/expired shape
/// even though this cache has no expiry: a page is either present or not.
pub enum CacheResult<T> {
    Hit(T),
    Miss,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub queries: u64,
    pub pages: u64,
    pub completed_queries: u64,
}

/// A previously-fetched page, as stored in the `pages` table.
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub query_key: String,
    pub page_index: i64,
    pub raw_blob: String,
    pub next_cursor: PageCursor,
}

fn cursor_to_column(cursor: &PageCursor) -> (&'static str, Option<String>) {
    match cursor {
        PageCursor::Start => ("start", None),
        PageCursor::Token(token) => ("token", Some(token.clone())),
        PageCursor::End => ("end", None),
    }
}

fn column_to_cursor(kind: &str, token: Option<String>) -> PageCursor {
    match kind {
        "token" => PageCursor::Token(token.unwrap_or_default()),
        "end" => PageCursor::End,
        _ => PageCursor::Start,
    }
}

/// SQLite-backed cache of query progress and fetched pages.
pub struct CacheService {
    conn: Connection,
}

impl CacheService {
    /// Open (creating if needed) a cache database at `path`, in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> CacheResultT<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory cache, useful for tests and dry runs.
    pub fn open_in_memory() -> CacheResultT<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> CacheResultT<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS queries (
                query_key TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                normalized_text TEXT NOT NULL,
                cursor_kind TEXT NOT NULL,
                cursor_token TEXT,
                page_count INTEGER NOT NULL DEFAULT 0,
                completed INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pages (
                query_key TEXT NOT NULL,
                page_index INTEGER NOT NULL,
                raw_blob TEXT NOT NULL,
                next_cursor_kind TEXT NOT NULL,
                next_cursor_token TEXT,
                fetched_at TEXT NOT NULL,
                PRIMARY KEY (query_key, page_index),
                FOREIGN KEY (query_key) REFERENCES queries(query_key)
            );

            CREATE TABLE IF NOT EXISTS papers (
                query_key TEXT NOT NULL,
                page_index INTEGER NOT NULL,
                paper_index INTEGER NOT NULL,
                paper_record_blob TEXT NOT NULL,
                PRIMARY KEY (query_key, page_index, paper_index),
                FOREIGN KEY (query_key) REFERENCES queries(query_key)
            );",
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;

        Ok(Self { conn })
    }

    /// Register a query if it isn't already tracked, returning its resume
    /// cursor (`Start` for a brand-new query).
    pub fn resume_cursor(&self, query_key: &str, source: &str, normalized_text: &str) -> CacheResultT<PageCursor> {
        let existing: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT cursor_kind, cursor_token FROM queries WHERE query_key = ?1",
                params![query_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((kind, token)) = existing {
            return Ok(column_to_cursor(&kind, token));
        }

        self.conn.execute(
            "INSERT INTO queries (query_key, source, normalized_text, cursor_kind, cursor_token, updated_at)
             VALUES (?1, ?2, ?3, 'start', NULL, datetime('now'))",
            params![query_key, source, normalized_text],
        )?;
        Ok(PageCursor::Start)
    }

    /// Store a fetched page (and the papers parsed out of it) transactionally,
    /// advancing the query's resume cursor. Enforces that `page_index` is
    /// exactly the next contiguous index for this query.
    pub fn store_page(
        &mut self,
        query_key: &str,
        page_index: i64,
        raw_blob: &str,
        papers: &[Paper],
        next_cursor: &PageCursor,
    ) -> CacheResultT<()> {
        let tx = self.conn.transaction()?;

        let current_count: i64 = tx.query_row(
            "SELECT page_count FROM queries WHERE query_key = ?1",
            params![query_key],
            |row| row.get(0),
        )?;

        if page_index != current_count {
            return Err(CacheError::NonContiguousPage {
                query_key: query_key.to_string(),
                page_index,
                expected: current_count,
            });
        }

        let (kind, token) = cursor_to_column(next_cursor);
        let completed = matches!(next_cursor, PageCursor::End);

        tx.execute(
            "INSERT INTO pages (query_key, page_index, raw_blob, next_cursor_kind, next_cursor_token, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))",
            params![query_key, page_index, raw_blob, kind, token],
        )?;

        for (paper_index, paper) in papers.iter().enumerate() {
            let blob = serde_json::to_string(paper)?;
            tx.execute(
                "INSERT INTO papers (query_key, page_index, paper_index, paper_record_blob)
                 VALUES (?1, ?2, ?3, ?4)",
                params![query_key, page_index, paper_index as i64, blob],
            )?;
        }

        tx.execute(
            "UPDATE queries SET cursor_kind = ?2, cursor_token = ?3, page_count = page_count + 1,
             completed = ?4, updated_at = datetime('now') WHERE query_key = ?1",
            params![query_key, kind, token, completed as i64],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// All papers accumulated so far for a query, ordered by the page and
    /// position within the page they were fetched in.
    pub fn papers_for(&self, query_key: &str) -> CacheResultT<Vec<Paper>> {
        let mut stmt = self.conn.prepare(
            "SELECT paper_record_blob FROM papers WHERE query_key = ?1
             ORDER BY page_index ASC, paper_index ASC",
        )?;
        let rows = stmt.query_map(params![query_key], |row| row.get::<_, String>(0))?;

        let mut papers = Vec::new();
        for blob in rows {
            papers.push(serde_json::from_str(&blob?)?);
        }
        Ok(papers)
    }

    /// Fetch a previously-stored page, if present.
    pub fn get_page(&self, query_key: &str, page_index: i64) -> CacheResultT<CacheResult<CachedPage>> {
        let row = self
            .conn
            .query_row(
                "SELECT raw_blob, next_cursor_kind, next_cursor_token FROM pages
                 WHERE query_key = ?1 AND page_index = ?2",
                params![query_key, page_index],
                |row| {
                    let raw_blob: String = row.get(0)?;
                    let kind: String = row.get(1)?;
                    let token: Option<String> = row.get(2)?;
                    Ok((raw_blob, kind, token))
                },
            )
            .optional()?;

        Ok(match row {
            Some((raw_blob, kind, token)) => CacheResult::Hit(CachedPage {
                query_key: query_key.to_string(),
                page_index,
                raw_blob,
                next_cursor: column_to_cursor(&kind, token),
            }),
            None => CacheResult::Miss,
        })
    }

    /// Number of pages already stored for a query — the index a worker
    /// should fetch next.
    pub fn page_count(&self, query_key: &str) -> CacheResultT<i64> {
        let count: Option<i64> = self
            .conn
            .query_row("SELECT page_count FROM queries WHERE query_key = ?1", params![query_key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    /// Whether a query has reached its end cursor.
    pub fn is_completed(&self, query_key: &str) -> CacheResultT<bool> {
        let completed: Option<i64> = self
            .conn
            .query_row(
                "SELECT completed FROM queries WHERE query_key = ?1",
                params![query_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(completed.unwrap_or(0) != 0)
    }

    pub fn stats(&self) -> CacheResultT<CacheStats> {
        let queries: u64 = self.conn.query_row("SELECT COUNT(*) FROM queries", [], |row| row.get(0))?;
        let pages: u64 = self.conn.query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        let completed_queries: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM queries WHERE completed = 1", [], |row| row.get(0))?;
        Ok(CacheStats {
            queries,
            pages,
            completed_queries,
        })
    }

    /// Wipe all cached queries, pages, and papers, keeping the schema.
    pub fn clear_all(&self) -> CacheResultT<()> {
        self.conn.execute_batch("DELETE FROM papers; DELETE FROM pages; DELETE FROM queries;")?;
        Ok(())
    }
}

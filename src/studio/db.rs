use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;

use super::models::*;
use crate::errors::{ResourceKind, StudioError};
use crate::util::{has_control_chars, is_valid_email, is_valid_hex_color, is_valid_slug, safe_url, slugify};

/// Async-safe handle to the studio database.
///
/// Wraps `StudioDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<StudioDb>>,
}

impl DbHandle {
    pub fn new(db: StudioDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&StudioDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct StudioDb {
    conn: Connection,
}

// Column lists shared by the ownership joins. Aliases: w/p/s/e.
const WEBSITE_COLS: &str =
    "w.id, w.user_id, w.name, w.slug, w.description, w.published, w.settings, w.created_at, w.updated_at";
const PAGE_COLS: &str = "p.id, p.website_id, p.title, p.slug, p.position, p.is_home, p.meta_description, p.html, p.css, p.project_data, p.created_at, p.updated_at";
const SECTION_COLS: &str =
    "s.id, s.page_id, s.kind, s.position, s.content, s.style, s.created_at, s.updated_at";
const ELEMENT_COLS: &str =
    "e.id, e.section_id, e.kind, e.position, e.content, e.style, e.created_at, e.updated_at";
const MEDIA_COLS: &str =
    "id, user_id, filename, storage_key, content_type, size_bytes, created_at";
const VCARD_COLS: &str = "id, user_id, slug, full_name, job_title, company, email, phone, website_url, address, bio, avatar_url, theme_color, social_links, published, view_count, created_at, updated_at";

/// Sibling table descriptor for position bookkeeping.
#[derive(Clone, Copy)]
struct Siblings {
    table: &'static str,
    parent_col: &'static str,
}

const PAGE_SIBLINGS: Siblings = Siblings {
    table: "pages",
    parent_col: "website_id",
};
const SECTION_SIBLINGS: Siblings = Siblings {
    table: "sections",
    parent_col: "page_id",
};
const ELEMENT_SIBLINGS: Siblings = Siblings {
    table: "elements",
    parent_col: "section_id",
};

impl StudioDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL UNIQUE,
                    name TEXT,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token_hash TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    expires_at TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS websites (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    description TEXT NOT NULL DEFAULT '',
                    published INTEGER NOT NULL DEFAULT 0,
                    settings TEXT NOT NULL DEFAULT '{}',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS pages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    website_id INTEGER NOT NULL REFERENCES websites(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    slug TEXT NOT NULL,
                    position INTEGER NOT NULL DEFAULT 0,
                    is_home INTEGER NOT NULL DEFAULT 0,
                    meta_description TEXT NOT NULL DEFAULT '',
                    html TEXT NOT NULL DEFAULT '',
                    css TEXT NOT NULL DEFAULT '',
                    project_data TEXT NOT NULL DEFAULT 'null',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(website_id, slug)
                );

                CREATE TABLE IF NOT EXISTS sections (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    page_id INTEGER NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
                    kind TEXT NOT NULL,
                    position INTEGER NOT NULL DEFAULT 0,
                    content TEXT NOT NULL DEFAULT '{}',
                    style TEXT NOT NULL DEFAULT '{}',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS elements (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    section_id INTEGER NOT NULL REFERENCES sections(id) ON DELETE CASCADE,
                    kind TEXT NOT NULL,
                    position INTEGER NOT NULL DEFAULT 0,
                    content TEXT NOT NULL DEFAULT '{}',
                    style TEXT NOT NULL DEFAULT '{}',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS media (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    filename TEXT NOT NULL,
                    storage_key TEXT NOT NULL UNIQUE,
                    content_type TEXT NOT NULL,
                    size_bytes INTEGER NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS vcards (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    slug TEXT NOT NULL UNIQUE,
                    full_name TEXT NOT NULL,
                    job_title TEXT NOT NULL DEFAULT '',
                    company TEXT NOT NULL DEFAULT '',
                    email TEXT NOT NULL DEFAULT '',
                    phone TEXT NOT NULL DEFAULT '',
                    website_url TEXT NOT NULL DEFAULT '',
                    address TEXT NOT NULL DEFAULT '',
                    bio TEXT NOT NULL DEFAULT '',
                    avatar_url TEXT NOT NULL DEFAULT '',
                    theme_color TEXT NOT NULL DEFAULT '#1f2937',
                    social_links TEXT NOT NULL DEFAULT '{}',
                    published INTEGER NOT NULL DEFAULT 0,
                    view_count INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
                CREATE INDEX IF NOT EXISTS idx_websites_user ON websites(user_id);
                CREATE INDEX IF NOT EXISTS idx_pages_website ON pages(website_id, position);
                CREATE INDEX IF NOT EXISTS idx_sections_page ON sections(page_id, position);
                CREATE INDEX IF NOT EXISTS idx_elements_section ON elements(section_id, position);
                CREATE INDEX IF NOT EXISTS idx_media_user ON media(user_id);
                CREATE INDEX IF NOT EXISTS idx_vcards_user ON vcards(user_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Users & sessions ──────────────────────────────────────────────

    pub fn create_user(&self, email: &str, name: Option<&str>, password_hash: &str) -> Result<User> {
        let exists: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                params![email],
                |row| row.get(0),
            )
            .context("Failed to check email")?;
        if exists {
            return Err(StudioError::EmailTaken {
                email: email.to_string(),
            }
            .into());
        }
        self.conn
            .execute(
                "INSERT INTO users (email, name, password_hash) VALUES (?1, ?2, ?3)",
                params![email, name, password_hash],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, email, name, created_at FROM users WHERE id = ?1",
                params![id],
                user_from_row,
            )
            .optional()
            .context("Failed to query user")
    }

    /// Returns the user and stored password hash for a login attempt.
    pub fn find_credentials(&self, email: &str) -> Result<Option<(User, String)>> {
        self.conn
            .query_row(
                "SELECT id, email, name, created_at, password_hash FROM users WHERE email = ?1",
                params![email],
                |row| Ok((user_from_row(row)?, row.get(4)?)),
            )
            .optional()
            .context("Failed to query credentials")
    }

    pub fn create_session(&self, user_id: i64, token_hash: &str, ttl_hours: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sessions (token_hash, user_id, expires_at)
                 VALUES (?1, ?2, datetime('now', ?3))",
                params![token_hash, user_id, format!("+{} hours", ttl_hours)],
            )
            .context("Failed to insert session")?;
        Ok(())
    }

    /// Resolve a live session to its user. Expired sessions resolve to `None`.
    pub fn user_for_session(&self, token_hash: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT u.id, u.email, u.name, u.created_at
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token_hash = ?1 AND s.expires_at > datetime('now')",
                params![token_hash],
                user_from_row,
            )
            .optional()
            .context("Failed to query session")
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let n = self
            .conn
            .execute(
                "DELETE FROM sessions WHERE token_hash = ?1",
                params![token_hash],
            )
            .context("Failed to delete session")?;
        Ok(n > 0)
    }

    pub fn purge_expired_sessions(&self) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM sessions WHERE expires_at <= datetime('now')",
                [],
            )
            .context("Failed to purge sessions")
    }

    // ── Ownership chain ───────────────────────────────────────────────
    //
    // Every lookup joins up to websites.user_id. A foreign row is reported
    // exactly like a missing one.

    pub fn owned_website(&self, user_id: i64, id: i64) -> Result<Website> {
        self.conn
            .query_row(
                &format!("SELECT {WEBSITE_COLS} FROM websites w WHERE w.id = ?1 AND w.user_id = ?2"),
                params![id, user_id],
                website_from_row,
            )
            .optional()
            .context("Failed to query website")?
            .ok_or_else(|| StudioError::not_found(ResourceKind::Website, id).into())
    }

    pub fn owned_page(&self, user_id: i64, id: i64) -> Result<Page> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {PAGE_COLS} FROM pages p
                     JOIN websites w ON w.id = p.website_id
                     WHERE p.id = ?1 AND w.user_id = ?2"
                ),
                params![id, user_id],
                page_from_row,
            )
            .optional()
            .context("Failed to query page")?
            .ok_or_else(|| StudioError::not_found(ResourceKind::Page, id).into())
    }

    pub fn owned_section(&self, user_id: i64, id: i64) -> Result<Section> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {SECTION_COLS} FROM sections s
                     JOIN pages p ON p.id = s.page_id
                     JOIN websites w ON w.id = p.website_id
                     WHERE s.id = ?1 AND w.user_id = ?2"
                ),
                params![id, user_id],
                section_from_row,
            )
            .optional()
            .context("Failed to query section")?
            .ok_or_else(|| StudioError::not_found(ResourceKind::Section, id).into())
    }

    pub fn owned_element(&self, user_id: i64, id: i64) -> Result<Element> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ELEMENT_COLS} FROM elements e
                     JOIN sections s ON s.id = e.section_id
                     JOIN pages p ON p.id = s.page_id
                     JOIN websites w ON w.id = p.website_id
                     WHERE e.id = ?1 AND w.user_id = ?2"
                ),
                params![id, user_id],
                element_from_row,
            )
            .optional()
            .context("Failed to query element")?
            .ok_or_else(|| StudioError::not_found(ResourceKind::Element, id).into())
    }

    // ── Websites ──────────────────────────────────────────────────────

    pub fn list_websites(&self, user_id: i64) -> Result<Vec<Website>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {WEBSITE_COLS} FROM websites w WHERE w.user_id = ?1 ORDER BY w.id"
            ))
            .context("Failed to prepare list_websites")?;
        let rows = stmt
            .query_map(params![user_id], website_from_row)
            .context("Failed to query websites")?;
        collect_rows(rows, "website")
    }

    /// Create a website together with its home page.
    pub fn create_website(&self, user_id: i64, input: &NewWebsite) -> Result<Website> {
        let name = required_text(&input.name, "name")?;
        let settings = object_or_default(input.settings.clone(), "settings")?;
        let slug = self.resolve_website_slug(input.slug.as_deref(), name, None)?;
        let description = input.description.clone().unwrap_or_default();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO websites (user_id, name, slug, description, settings) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, name, slug, description, settings.to_string()],
        )
        .context("Failed to insert website")?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO pages (website_id, title, slug, position, is_home) VALUES (?1, 'Home', 'index', 0, 1)",
            params![id],
        )
        .context("Failed to insert home page")?;
        tx.commit().context("Failed to commit website")?;
        self.owned_website(user_id, id)
    }

    pub fn get_website_detail(&self, user_id: i64, id: i64) -> Result<WebsiteDetail> {
        let website = self.owned_website(user_id, id)?;
        let pages = self.page_summaries(id)?;
        Ok(WebsiteDetail { website, pages })
    }

    pub fn update_website(&self, user_id: i64, id: i64, patch: &WebsitePatch) -> Result<Website> {
        let mut website = self.owned_website(user_id, id)?;
        if let Some(name) = &patch.name {
            website.name = required_text(name, "name")?.to_string();
        }
        if let Some(slug) = &patch.slug
            && slug != &website.slug
        {
            website.slug = self.resolve_website_slug(Some(slug), &website.name, Some(id))?;
        }
        if let Some(description) = &patch.description {
            website.description = description.clone();
        }
        if let Some(published) = patch.published {
            website.published = published;
        }
        if let Some(settings) = &patch.settings {
            website.settings = object_or_default(Some(settings.clone()), "settings")?;
        }
        self.conn
            .execute(
                "UPDATE websites SET name = ?1, slug = ?2, description = ?3, published = ?4, settings = ?5,
                 updated_at = datetime('now') WHERE id = ?6",
                params![
                    website.name,
                    website.slug,
                    website.description,
                    website.published,
                    website.settings.to_string(),
                    id
                ],
            )
            .context("Failed to update website")?;
        self.owned_website(user_id, id)
    }

    /// Delete a website bottom-up: elements → sections → pages → website.
    pub fn delete_website(&self, user_id: i64, id: i64) -> Result<()> {
        self.owned_website(user_id, id)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM elements WHERE section_id IN (
                SELECT s.id FROM sections s JOIN pages p ON p.id = s.page_id WHERE p.website_id = ?1)",
            params![id],
        )
        .context("Failed to delete website elements")?;
        tx.execute(
            "DELETE FROM sections WHERE page_id IN (SELECT id FROM pages WHERE website_id = ?1)",
            params![id],
        )
        .context("Failed to delete website sections")?;
        tx.execute("DELETE FROM pages WHERE website_id = ?1", params![id])
            .context("Failed to delete website pages")?;
        tx.execute("DELETE FROM websites WHERE id = ?1", params![id])
            .context("Failed to delete website")?;
        tx.commit().context("Failed to commit website delete")?;
        Ok(())
    }

    fn resolve_website_slug(
        &self,
        requested: Option<&str>,
        name: &str,
        exclude_id: Option<i64>,
    ) -> Result<String> {
        let taken = |slug: &str| -> Result<bool> {
            self.conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM websites WHERE slug = ?1 AND id != ?2)",
                    params![slug, exclude_id.unwrap_or(-1)],
                    |row| row.get(0),
                )
                .context("Failed to check website slug")
        };
        resolve_slug(requested, name, "site", taken)
    }

    // ── Pages ─────────────────────────────────────────────────────────

    fn page_summaries(&self, website_id: i64) -> Result<Vec<PageSummary>> {
        Ok(self
            .pages_for_website(website_id)?
            .iter()
            .map(PageSummary::from)
            .collect())
    }

    fn pages_for_website(&self, website_id: i64) -> Result<Vec<Page>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {PAGE_COLS} FROM pages p WHERE p.website_id = ?1 ORDER BY p.position, p.id"
            ))
            .context("Failed to prepare pages_for_website")?;
        let rows = stmt
            .query_map(params![website_id], page_from_row)
            .context("Failed to query pages")?;
        collect_rows(rows, "page")
    }

    pub fn list_pages(&self, user_id: i64, website_id: i64) -> Result<Vec<PageSummary>> {
        self.owned_website(user_id, website_id)?;
        self.page_summaries(website_id)
    }

    pub fn create_page(&self, user_id: i64, website_id: i64, input: &NewPage) -> Result<Page> {
        self.owned_website(user_id, website_id)?;
        let title = required_text(&input.title, "title")?;
        let slug = self.resolve_page_slug(website_id, input.slug.as_deref(), title, None)?;
        let position = count_siblings(&self.conn, PAGE_SIBLINGS, website_id)?;
        let is_home = input.is_home.unwrap_or(false) || position == 0;

        let tx = self.conn.unchecked_transaction()?;
        if is_home {
            tx.execute(
                "UPDATE pages SET is_home = 0 WHERE website_id = ?1",
                params![website_id],
            )
            .context("Failed to clear home page")?;
        }
        tx.execute(
            "INSERT INTO pages (website_id, title, slug, position, is_home, meta_description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                website_id,
                title,
                slug,
                position,
                is_home,
                input.meta_description.clone().unwrap_or_default()
            ],
        )
        .context("Failed to insert page")?;
        let id = tx.last_insert_rowid();
        tx.commit().context("Failed to commit page")?;
        self.owned_page(user_id, id)
    }

    pub fn update_page(&self, user_id: i64, id: i64, patch: &PagePatch) -> Result<Page> {
        let mut page = self.owned_page(user_id, id)?;
        if let Some(title) = &patch.title {
            page.title = required_text(title, "title")?.to_string();
        }
        if let Some(slug) = &patch.slug
            && slug != &page.slug
        {
            page.slug = self.resolve_page_slug(page.website_id, Some(slug), &page.title, Some(id))?;
        }
        if let Some(meta) = &patch.meta_description {
            page.meta_description = meta.clone();
        }
        let make_home = match patch.is_home {
            Some(true) => !page.is_home,
            Some(false) if page.is_home => {
                return Err(StudioError::Validation(
                    "A website needs a home page; mark another page as home instead".into(),
                )
                .into());
            }
            _ => false,
        };

        let tx = self.conn.unchecked_transaction()?;
        if make_home {
            tx.execute(
                "UPDATE pages SET is_home = 0 WHERE website_id = ?1",
                params![page.website_id],
            )
            .context("Failed to clear home page")?;
            page.is_home = true;
        }
        tx.execute(
            "UPDATE pages SET title = ?1, slug = ?2, meta_description = ?3, is_home = ?4,
             updated_at = datetime('now') WHERE id = ?5",
            params![page.title, page.slug, page.meta_description, page.is_home, id],
        )
        .context("Failed to update page")?;
        tx.commit().context("Failed to commit page update")?;
        self.owned_page(user_id, id)
    }

    pub fn save_editor_document(&self, user_id: i64, id: i64, doc: &EditorDocument) -> Result<Page> {
        self.owned_page(user_id, id)?;
        self.conn
            .execute(
                "UPDATE pages SET html = ?1, css = ?2, project_data = ?3, updated_at = datetime('now')
                 WHERE id = ?4",
                params![doc.html, doc.css, doc.project_data.to_string(), id],
            )
            .context("Failed to save editor document")?;
        self.owned_page(user_id, id)
    }

    /// Delete a page and everything below it, then close the position gap.
    pub fn delete_page(&self, user_id: i64, id: i64) -> Result<Page> {
        let page = self.owned_page(user_id, id)?;
        let siblings = count_siblings(&self.conn, PAGE_SIBLINGS, page.website_id)?;
        if page.is_home && siblings > 1 {
            return Err(StudioError::Validation(
                "Cannot delete the home page while other pages exist".into(),
            )
            .into());
        }
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM elements WHERE section_id IN (SELECT id FROM sections WHERE page_id = ?1)",
            params![id],
        )
        .context("Failed to delete page elements")?;
        tx.execute("DELETE FROM sections WHERE page_id = ?1", params![id])
            .context("Failed to delete page sections")?;
        tx.execute("DELETE FROM pages WHERE id = ?1", params![id])
            .context("Failed to delete page")?;
        renumber(&tx, PAGE_SIBLINGS, page.website_id)?;
        tx.commit().context("Failed to commit page delete")?;
        Ok(page)
    }

    /// Deep-copy a page with its sections and elements, appended last.
    pub fn duplicate_page(&self, user_id: i64, id: i64) -> Result<Page> {
        let page = self.owned_page(user_id, id)?;
        let base = format!("{}-copy", truncate_slug_base(&page.slug));
        let slug = self.resolve_page_slug(page.website_id, None, &base, None)?;
        let position = count_siblings(&self.conn, PAGE_SIBLINGS, page.website_id)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO pages (website_id, title, slug, position, is_home, meta_description, html, css, project_data)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?8)",
            params![
                page.website_id,
                format!("{} (copy)", page.title),
                slug,
                position,
                page.meta_description,
                page.html,
                page.css,
                page.project_data.to_string()
            ],
        )
        .context("Failed to insert page copy")?;
        let new_page_id = tx.last_insert_rowid();
        for section in self.sections_for_page(id)? {
            tx.execute(
                "INSERT INTO sections (page_id, kind, position, content, style) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    new_page_id,
                    section.kind,
                    section.position,
                    section.content.to_string(),
                    section.style.to_string()
                ],
            )
            .context("Failed to copy section")?;
            let new_section_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO elements (section_id, kind, position, content, style)
                 SELECT ?1, kind, position, content, style FROM elements WHERE section_id = ?2",
                params![new_section_id, section.id],
            )
            .context("Failed to copy elements")?;
        }
        tx.commit().context("Failed to commit page copy")?;
        self.owned_page(user_id, new_page_id)
    }

    pub fn reorder_pages(&self, user_id: i64, website_id: i64, ids: &[i64]) -> Result<Vec<PageSummary>> {
        self.owned_website(user_id, website_id)?;
        apply_order(&self.conn, PAGE_SIBLINGS, website_id, ids)?;
        self.page_summaries(website_id)
    }

    fn resolve_page_slug(
        &self,
        website_id: i64,
        requested: Option<&str>,
        title: &str,
        exclude_id: Option<i64>,
    ) -> Result<String> {
        let taken = |slug: &str| -> Result<bool> {
            self.conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM pages WHERE website_id = ?1 AND slug = ?2 AND id != ?3)",
                    params![website_id, slug, exclude_id.unwrap_or(-1)],
                    |row| row.get(0),
                )
                .context("Failed to check page slug")
        };
        resolve_slug(requested, title, "page", taken)
    }

    // ── Sections ──────────────────────────────────────────────────────

    fn sections_for_page(&self, page_id: i64) -> Result<Vec<Section>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {SECTION_COLS} FROM sections s WHERE s.page_id = ?1 ORDER BY s.position, s.id"
            ))
            .context("Failed to prepare sections_for_page")?;
        let rows = stmt
            .query_map(params![page_id], section_from_row)
            .context("Failed to query sections")?;
        collect_rows(rows, "section")
    }

    pub fn list_sections(&self, user_id: i64, page_id: i64) -> Result<Vec<Section>> {
        self.owned_page(user_id, page_id)?;
        self.sections_for_page(page_id)
    }

    pub fn create_section(&self, user_id: i64, page_id: i64, input: &NewSection) -> Result<Section> {
        self.owned_page(user_id, page_id)?;
        let kind = required_text(&input.kind, "kind")?;
        let content = input.content.clone().unwrap_or_else(|| Value::Object(Default::default()));
        let style = object_or_default(input.style.clone(), "style")?;

        let tx = self.conn.unchecked_transaction()?;
        let position = make_room(&tx, SECTION_SIBLINGS, page_id, input.position)?;
        tx.execute(
            "INSERT INTO sections (page_id, kind, position, content, style) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![page_id, kind, position, content.to_string(), style.to_string()],
        )
        .context("Failed to insert section")?;
        let id = tx.last_insert_rowid();
        tx.commit().context("Failed to commit section")?;
        self.owned_section(user_id, id)
    }

    /// Insert a section with its elements in one transaction. Every input is
    /// validated before anything is written, so a bad element leaves no
    /// section behind.
    pub fn create_section_with_elements(
        &self,
        user_id: i64,
        page_id: i64,
        input: &NewSection,
        elements: &[NewElement],
    ) -> Result<SectionDetail> {
        self.owned_page(user_id, page_id)?;
        let kind = required_text(&input.kind, "kind")?;
        let content = input.content.clone().unwrap_or_else(|| Value::Object(Default::default()));
        let style = object_or_default(input.style.clone(), "style")?;
        let mut rows = Vec::with_capacity(elements.len());
        for element in elements {
            rows.push((
                required_text(&element.kind, "kind")?,
                element.content.clone().unwrap_or_else(|| Value::Object(Default::default())),
                object_or_default(element.style.clone(), "style")?,
            ));
        }

        let tx = self.conn.unchecked_transaction()?;
        let position = make_room(&tx, SECTION_SIBLINGS, page_id, input.position)?;
        tx.execute(
            "INSERT INTO sections (page_id, kind, position, content, style) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![page_id, kind, position, content.to_string(), style.to_string()],
        )
        .context("Failed to insert section")?;
        let section_id = tx.last_insert_rowid();
        for (position, (kind, content, style)) in rows.iter().enumerate() {
            tx.execute(
                "INSERT INTO elements (section_id, kind, position, content, style) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![section_id, kind, position as i64, content.to_string(), style.to_string()],
            )
            .context("Failed to insert element")?;
        }
        tx.commit().context("Failed to commit section")?;
        self.get_section_detail(user_id, section_id)
    }

    pub fn get_section_detail(&self, user_id: i64, id: i64) -> Result<SectionDetail> {
        let section = self.owned_section(user_id, id)?;
        let elements = self.elements_for_section(id)?;
        Ok(SectionDetail { section, elements })
    }

    pub fn update_section(&self, user_id: i64, id: i64, patch: &SectionPatch) -> Result<Section> {
        let mut section = self.owned_section(user_id, id)?;
        if let Some(kind) = &patch.kind {
            section.kind = required_text(kind, "kind")?.to_string();
        }
        if let Some(content) = &patch.content {
            section.content = content.clone();
        }
        if let Some(style) = &patch.style {
            section.style = object_or_default(Some(style.clone()), "style")?;
        }
        self.conn
            .execute(
                "UPDATE sections SET kind = ?1, content = ?2, style = ?3, updated_at = datetime('now')
                 WHERE id = ?4",
                params![section.kind, section.content.to_string(), section.style.to_string(), id],
            )
            .context("Failed to update section")?;
        self.owned_section(user_id, id)
    }

    pub fn delete_section(&self, user_id: i64, id: i64) -> Result<Section> {
        let section = self.owned_section(user_id, id)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM elements WHERE section_id = ?1", params![id])
            .context("Failed to delete section elements")?;
        tx.execute("DELETE FROM sections WHERE id = ?1", params![id])
            .context("Failed to delete section")?;
        renumber(&tx, SECTION_SIBLINGS, section.page_id)?;
        tx.commit().context("Failed to commit section delete")?;
        Ok(section)
    }

    pub fn reorder_sections(&self, user_id: i64, page_id: i64, ids: &[i64]) -> Result<Vec<Section>> {
        self.owned_page(user_id, page_id)?;
        apply_order(&self.conn, SECTION_SIBLINGS, page_id, ids)?;
        self.sections_for_page(page_id)
    }

    // ── Elements ──────────────────────────────────────────────────────

    fn elements_for_section(&self, section_id: i64) -> Result<Vec<Element>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {ELEMENT_COLS} FROM elements e WHERE e.section_id = ?1 ORDER BY e.position, e.id"
            ))
            .context("Failed to prepare elements_for_section")?;
        let rows = stmt
            .query_map(params![section_id], element_from_row)
            .context("Failed to query elements")?;
        collect_rows(rows, "element")
    }

    pub fn list_elements(&self, user_id: i64, section_id: i64) -> Result<Vec<Element>> {
        self.owned_section(user_id, section_id)?;
        self.elements_for_section(section_id)
    }

    pub fn create_element(&self, user_id: i64, section_id: i64, input: &NewElement) -> Result<Element> {
        self.owned_section(user_id, section_id)?;
        let kind = required_text(&input.kind, "kind")?;
        let content = input.content.clone().unwrap_or_else(|| Value::Object(Default::default()));
        let style = object_or_default(input.style.clone(), "style")?;

        let tx = self.conn.unchecked_transaction()?;
        let position = make_room(&tx, ELEMENT_SIBLINGS, section_id, input.position)?;
        tx.execute(
            "INSERT INTO elements (section_id, kind, position, content, style) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![section_id, kind, position, content.to_string(), style.to_string()],
        )
        .context("Failed to insert element")?;
        let id = tx.last_insert_rowid();
        tx.commit().context("Failed to commit element")?;
        self.owned_element(user_id, id)
    }

    pub fn update_element(&self, user_id: i64, id: i64, patch: &ElementPatch) -> Result<Element> {
        let mut element = self.owned_element(user_id, id)?;
        if let Some(kind) = &patch.kind {
            element.kind = required_text(kind, "kind")?.to_string();
        }
        if let Some(content) = &patch.content {
            element.content = content.clone();
        }
        if let Some(style) = &patch.style {
            element.style = object_or_default(Some(style.clone()), "style")?;
        }

        let tx = self.conn.unchecked_transaction()?;
        let old_section = element.section_id;
        if let Some(target) = patch.section_id
            && target != old_section
        {
            // Target must sit on the caller's own chain too.
            self.owned_section(user_id, target)?;
            element.position = count_siblings(&tx, ELEMENT_SIBLINGS, target)?;
            element.section_id = target;
        }
        tx.execute(
            "UPDATE elements SET section_id = ?1, position = ?2, kind = ?3, content = ?4, style = ?5,
             updated_at = datetime('now') WHERE id = ?6",
            params![
                element.section_id,
                element.position,
                element.kind,
                element.content.to_string(),
                element.style.to_string(),
                id
            ],
        )
        .context("Failed to update element")?;
        if element.section_id != old_section {
            renumber(&tx, ELEMENT_SIBLINGS, old_section)?;
        }
        tx.commit().context("Failed to commit element update")?;
        self.owned_element(user_id, id)
    }

    pub fn delete_element(&self, user_id: i64, id: i64) -> Result<Element> {
        let element = self.owned_element(user_id, id)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM elements WHERE id = ?1", params![id])
            .context("Failed to delete element")?;
        renumber(&tx, ELEMENT_SIBLINGS, element.section_id)?;
        tx.commit().context("Failed to commit element delete")?;
        Ok(element)
    }

    pub fn reorder_elements(&self, user_id: i64, section_id: i64, ids: &[i64]) -> Result<Vec<Element>> {
        self.owned_section(user_id, section_id)?;
        apply_order(&self.conn, ELEMENT_SIBLINGS, section_id, ids)?;
        self.elements_for_section(section_id)
    }

    // ── Public rendering ──────────────────────────────────────────────

    /// Load a page of a published website. `None` for unpublished sites,
    /// unknown slugs, or a site with no pages.
    pub fn published_page_tree(&self, site_slug: &str, page_slug: Option<&str>) -> Result<Option<PageTree>> {
        let website = self
            .conn
            .query_row(
                &format!("SELECT {WEBSITE_COLS} FROM websites w WHERE w.slug = ?1 AND w.published = 1"),
                params![site_slug],
                website_from_row,
            )
            .optional()
            .context("Failed to query published website")?;
        let Some(website) = website else {
            return Ok(None);
        };

        let pages = self.pages_for_website(website.id)?;
        let page = match page_slug {
            Some(slug) => pages.into_iter().find(|p| p.slug == slug),
            None => {
                let home = pages.iter().position(|p| p.is_home).unwrap_or(0);
                pages.into_iter().nth(home)
            }
        };
        let Some(page) = page else {
            return Ok(None);
        };

        let mut sections = Vec::new();
        for section in self.sections_for_page(page.id)? {
            let elements = self.elements_for_section(section.id)?;
            sections.push(SectionDetail { section, elements });
        }
        Ok(Some(PageTree {
            website,
            page,
            sections,
        }))
    }

    // ── Media ─────────────────────────────────────────────────────────

    pub fn create_media(
        &self,
        user_id: i64,
        filename: &str,
        storage_key: &str,
        content_type: &str,
        size_bytes: i64,
    ) -> Result<MediaAsset> {
        self.conn
            .execute(
                "INSERT INTO media (user_id, filename, storage_key, content_type, size_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, filename, storage_key, content_type, size_bytes],
            )
            .context("Failed to insert media")?;
        let id = self.conn.last_insert_rowid();
        self.get_media(user_id, id)
    }

    pub fn list_media(&self, user_id: i64) -> Result<Vec<MediaAsset>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {MEDIA_COLS} FROM media WHERE user_id = ?1 ORDER BY id DESC"
            ))
            .context("Failed to prepare list_media")?;
        let rows = stmt
            .query_map(params![user_id], media_from_row)
            .context("Failed to query media")?;
        collect_rows(rows, "media")
    }

    pub fn get_media(&self, user_id: i64, id: i64) -> Result<MediaAsset> {
        self.conn
            .query_row(
                &format!("SELECT {MEDIA_COLS} FROM media WHERE id = ?1 AND user_id = ?2"),
                params![id, user_id],
                media_from_row,
            )
            .optional()
            .context("Failed to query media")?
            .ok_or_else(|| StudioError::not_found(ResourceKind::Media, id).into())
    }

    /// Unauthenticated lookup for the public `/media/{id}` route.
    pub fn find_media(&self, id: i64) -> Result<Option<MediaAsset>> {
        self.conn
            .query_row(
                &format!("SELECT {MEDIA_COLS} FROM media WHERE id = ?1"),
                params![id],
                media_from_row,
            )
            .optional()
            .context("Failed to query media")
    }

    pub fn delete_media(&self, user_id: i64, id: i64) -> Result<MediaAsset> {
        let asset = self.get_media(user_id, id)?;
        self.conn
            .execute("DELETE FROM media WHERE id = ?1", params![id])
            .context("Failed to delete media")?;
        Ok(asset)
    }

    // ── VCards ────────────────────────────────────────────────────────

    pub fn list_vcards(&self, user_id: i64) -> Result<Vec<VCard>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {VCARD_COLS} FROM vcards WHERE user_id = ?1 ORDER BY id"
            ))
            .context("Failed to prepare list_vcards")?;
        let rows = stmt
            .query_map(params![user_id], vcard_from_row)
            .context("Failed to query vcards")?;
        collect_rows(rows, "vcard")
    }

    pub fn get_vcard(&self, user_id: i64, id: i64) -> Result<VCard> {
        self.conn
            .query_row(
                &format!("SELECT {VCARD_COLS} FROM vcards WHERE id = ?1 AND user_id = ?2"),
                params![id, user_id],
                vcard_from_row,
            )
            .optional()
            .context("Failed to query vcard")?
            .ok_or_else(|| StudioError::not_found(ResourceKind::VCard, id).into())
    }

    pub fn create_vcard(&self, user_id: i64, input: &NewVCard) -> Result<VCard> {
        let full_name = required_text(&input.full_name, "full_name")?;
        let slug = self.resolve_vcard_slug(input.slug.as_deref(), full_name, None)?;
        let mut card = VCard {
            id: 0,
            user_id,
            slug,
            full_name: full_name.to_string(),
            job_title: input.job_title.clone().unwrap_or_default(),
            company: input.company.clone().unwrap_or_default(),
            email: input.email.clone().unwrap_or_default(),
            phone: input.phone.clone().unwrap_or_default(),
            website_url: input.website_url.clone().unwrap_or_default(),
            address: input.address.clone().unwrap_or_default(),
            bio: input.bio.clone().unwrap_or_default(),
            avatar_url: input.avatar_url.clone().unwrap_or_default(),
            theme_color: input
                .theme_color
                .clone()
                .unwrap_or_else(|| DEFAULT_THEME_COLOR.to_string()),
            social_links: input
                .social_links
                .clone()
                .unwrap_or_else(|| Value::Object(Default::default())),
            published: input.published.unwrap_or(false),
            view_count: 0,
            created_at: String::new(),
            updated_at: String::new(),
        };
        validate_vcard(&mut card)?;
        self.conn
            .execute(
                "INSERT INTO vcards (user_id, slug, full_name, job_title, company, email, phone, website_url,
                 address, bio, avatar_url, theme_color, social_links, published)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    user_id,
                    card.slug,
                    card.full_name,
                    card.job_title,
                    card.company,
                    card.email,
                    card.phone,
                    card.website_url,
                    card.address,
                    card.bio,
                    card.avatar_url,
                    card.theme_color,
                    card.social_links.to_string(),
                    card.published
                ],
            )
            .context("Failed to insert vcard")?;
        let id = self.conn.last_insert_rowid();
        self.get_vcard(user_id, id)
    }

    pub fn update_vcard(&self, user_id: i64, id: i64, patch: &VCardPatch) -> Result<VCard> {
        let mut card = self.get_vcard(user_id, id)?;
        if let Some(full_name) = &patch.full_name {
            card.full_name = required_text(full_name, "full_name")?.to_string();
        }
        if let Some(slug) = &patch.slug
            && slug != &card.slug
        {
            card.slug = self.resolve_vcard_slug(Some(slug), &card.full_name, Some(id))?;
        }
        let text_fields: [(&Option<String>, &mut String); 9] = [
            (&patch.job_title, &mut card.job_title),
            (&patch.company, &mut card.company),
            (&patch.email, &mut card.email),
            (&patch.phone, &mut card.phone),
            (&patch.website_url, &mut card.website_url),
            (&patch.address, &mut card.address),
            (&patch.bio, &mut card.bio),
            (&patch.avatar_url, &mut card.avatar_url),
            (&patch.theme_color, &mut card.theme_color),
        ];
        for (value, slot) in text_fields {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }
        if let Some(links) = &patch.social_links {
            card.social_links = links.clone();
        }
        if let Some(published) = patch.published {
            card.published = published;
        }
        validate_vcard(&mut card)?;
        self.conn
            .execute(
                "UPDATE vcards SET slug = ?1, full_name = ?2, job_title = ?3, company = ?4, email = ?5,
                 phone = ?6, website_url = ?7, address = ?8, bio = ?9, avatar_url = ?10, theme_color = ?11,
                 social_links = ?12, published = ?13, updated_at = datetime('now') WHERE id = ?14",
                params![
                    card.slug,
                    card.full_name,
                    card.job_title,
                    card.company,
                    card.email,
                    card.phone,
                    card.website_url,
                    card.address,
                    card.bio,
                    card.avatar_url,
                    card.theme_color,
                    card.social_links.to_string(),
                    card.published,
                    id
                ],
            )
            .context("Failed to update vcard")?;
        self.get_vcard(user_id, id)
    }

    pub fn delete_vcard(&self, user_id: i64, id: i64) -> Result<VCard> {
        let card = self.get_vcard(user_id, id)?;
        self.conn
            .execute("DELETE FROM vcards WHERE id = ?1", params![id])
            .context("Failed to delete vcard")?;
        Ok(card)
    }

    pub fn find_published_vcard(&self, slug: &str) -> Result<Option<VCard>> {
        self.conn
            .query_row(
                &format!("SELECT {VCARD_COLS} FROM vcards WHERE slug = ?1 AND published = 1"),
                params![slug],
                vcard_from_row,
            )
            .optional()
            .context("Failed to query published vcard")
    }

    pub fn record_vcard_view(&self, id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE vcards SET view_count = view_count + 1 WHERE id = ?1",
                params![id],
            )
            .context("Failed to record vcard view")?;
        Ok(())
    }

    fn resolve_vcard_slug(
        &self,
        requested: Option<&str>,
        full_name: &str,
        exclude_id: Option<i64>,
    ) -> Result<String> {
        let taken = |slug: &str| -> Result<bool> {
            self.conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM vcards WHERE slug = ?1 AND id != ?2)",
                    params![slug, exclude_id.unwrap_or(-1)],
                    |row| row.get(0),
                )
                .context("Failed to check vcard slug")
        };
        resolve_slug(requested, full_name, "card", taken)
    }
}

// ── Position bookkeeping ──────────────────────────────────────────────

fn count_siblings(conn: &Connection, sib: Siblings, parent_id: i64) -> Result<i64> {
    conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            sib.table, sib.parent_col
        ),
        params![parent_id],
        |row| row.get(0),
    )
    .with_context(|| format!("Failed to count {}", sib.table))
}

fn sibling_ids(conn: &Connection, sib: Siblings, parent_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT id FROM {} WHERE {} = ?1 ORDER BY position, id",
            sib.table, sib.parent_col
        ))
        .with_context(|| format!("Failed to prepare {} ids", sib.table))?;
    let rows = stmt
        .query_map(params![parent_id], |row| row.get(0))
        .with_context(|| format!("Failed to query {} ids", sib.table))?;
    collect_rows(rows, sib.table)
}

/// Clamp the requested insert position to `0..=n` and shift later siblings down.
fn make_room(conn: &Connection, sib: Siblings, parent_id: i64, requested: Option<i64>) -> Result<i64> {
    let count = count_siblings(conn, sib, parent_id)?;
    let position = requested.map(|p| p.clamp(0, count)).unwrap_or(count);
    if position < count {
        conn.execute(
            &format!(
                "UPDATE {} SET position = position + 1 WHERE {} = ?1 AND position >= ?2",
                sib.table, sib.parent_col
            ),
            params![parent_id, position],
        )
        .with_context(|| format!("Failed to shift {}", sib.table))?;
    }
    Ok(position)
}

/// Rewrite positions as `0..n-1` keeping the current order.
fn renumber(conn: &Connection, sib: Siblings, parent_id: i64) -> Result<()> {
    let ids = sibling_ids(conn, sib, parent_id)?;
    write_positions(conn, sib, &ids)
}

fn write_positions(conn: &Connection, sib: Siblings, ids: &[i64]) -> Result<()> {
    let mut stmt = conn
        .prepare(&format!("UPDATE {} SET position = ?1 WHERE id = ?2", sib.table))
        .with_context(|| format!("Failed to prepare {} position update", sib.table))?;
    for (position, id) in ids.iter().enumerate() {
        stmt.execute(params![position as i64, id])
            .with_context(|| format!("Failed to update {} position", sib.table))?;
    }
    Ok(())
}

/// Apply a client-supplied order. `ids` must be a permutation of the current children.
fn apply_order(conn: &Connection, sib: Siblings, parent_id: i64, ids: &[i64]) -> Result<()> {
    let current = sibling_ids(conn, sib, parent_id)?;
    validate_permutation(&current, ids)?;
    let tx = conn.unchecked_transaction()?;
    write_positions(&tx, sib, ids)?;
    tx.commit()
        .with_context(|| format!("Failed to commit {} reorder", sib.table))?;
    Ok(())
}

fn validate_permutation(current: &[i64], requested: &[i64]) -> Result<()> {
    if current.len() != requested.len() {
        return Err(StudioError::InvalidOrder(format!(
            "expected {} ids, got {}",
            current.len(),
            requested.len()
        ))
        .into());
    }
    let mut seen = HashSet::with_capacity(requested.len());
    for id in requested {
        if !seen.insert(*id) {
            return Err(StudioError::InvalidOrder(format!("id {} listed twice", id)).into());
        }
    }
    if let Some(stray) = current.iter().find(|id| !seen.contains(id)) {
        return Err(StudioError::InvalidOrder(format!("id {} is missing", stray)).into());
    }
    Ok(())
}

// ── Validation helpers ────────────────────────────────────────────────

fn required_text<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StudioError::Validation(format!("{} must not be empty", field)).into());
    }
    Ok(trimmed)
}

fn object_or_default(value: Option<Value>, field: &str) -> Result<Value> {
    match value {
        None | Some(Value::Null) => Ok(Value::Object(Default::default())),
        Some(v @ Value::Object(_)) => Ok(v),
        Some(_) => Err(StudioError::Validation(format!("{} must be a JSON object", field)).into()),
    }
}

fn truncate_slug_base(slug: &str) -> &str {
    // Leave room for "-copy-NN" within MAX_SLUG_LEN.
    let cut = slug.len().min(48);
    slug[..cut].trim_end_matches('-')
}

/// Pick a slug. An explicit slug must be valid and free (409 otherwise);
/// a derived one gets a numeric suffix until it is free.
fn resolve_slug<F>(requested: Option<&str>, source: &str, fallback: &str, taken: F) -> Result<String>
where
    F: Fn(&str) -> Result<bool>,
{
    if let Some(slug) = requested {
        if !is_valid_slug(slug) {
            return Err(StudioError::Validation(format!(
                "slug '{}' must be lowercase letters, digits, and inner dashes (max 60)",
                slug
            ))
            .into());
        }
        if taken(slug)? {
            return Err(StudioError::SlugTaken {
                slug: slug.to_string(),
            }
            .into());
        }
        return Ok(slug.to_string());
    }

    let mut base = slugify(source);
    if base.is_empty() {
        base = fallback.to_string();
    }
    if !taken(&base)? {
        return Ok(base);
    }
    let base = truncate_slug_base(&base).to_string();
    for n in 2.. {
        let candidate = format!("{}-{}", base, n);
        if !taken(&candidate)? {
            return Ok(candidate);
        }
    }
    unreachable!("unbounded suffix search always returns")
}

fn validate_vcard(card: &mut VCard) -> Result<()> {
    card.email = card.email.trim().to_string();
    if !card.email.is_empty() && (!is_valid_email(&card.email) || has_control_chars(&card.email)) {
        return Err(StudioError::Validation(format!("'{}' is not a valid email", card.email)).into());
    }
    if !is_valid_hex_color(&card.theme_color) {
        return Err(StudioError::Validation(format!(
            "theme_color '{}' must look like #rrggbb",
            card.theme_color
        ))
        .into());
    }
    if has_control_chars(&card.phone) {
        return Err(StudioError::Validation("phone must not contain control characters".into()).into());
    }
    check_card_url(&card.website_url, "website_url")?;
    check_card_url(&card.avatar_url, "avatar_url")?;
    match &card.social_links {
        Value::Null => card.social_links = Value::Object(Default::default()),
        Value::Object(map) => {
            for (label, url) in map {
                let Some(url) = url.as_str() else {
                    return Err(StudioError::Validation(
                        "social_links values must be URL strings".into(),
                    )
                    .into());
                };
                if has_control_chars(label) {
                    return Err(StudioError::Validation(
                        "social_links labels must not contain control characters".into(),
                    )
                    .into());
                }
                check_card_url(url, "social_links")?;
            }
        }
        _ => {
            return Err(StudioError::Validation(
                "social_links must be an object of label → url".into(),
            )
            .into());
        }
    }
    Ok(())
}

fn check_card_url(url: &str, field: &str) -> Result<()> {
    if safe_url(url).is_none() {
        return Err(StudioError::Validation(format!(
            "{} must be an http(s), mailto, tel, or relative URL",
            field
        ))
        .into());
    }
    Ok(())
}

// ── Row mapping ───────────────────────────────────────────────────────

fn collect_rows<T, I>(rows: I, what: &str) -> Result<Vec<T>>
where
    I: Iterator<Item = rusqlite::Result<T>>,
{
    let mut out = Vec::new();
    for row in rows {
        out.push(row.with_context(|| format!("Failed to read {} row", what))?);
    }
    Ok(out)
}

fn json_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn website_from_row(row: &Row<'_>) -> rusqlite::Result<Website> {
    Ok(Website {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        description: row.get(4)?,
        published: row.get(5)?,
        settings: json_col(row, 6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<Page> {
    Ok(Page {
        id: row.get(0)?,
        website_id: row.get(1)?,
        title: row.get(2)?,
        slug: row.get(3)?,
        position: row.get(4)?,
        is_home: row.get(5)?,
        meta_description: row.get(6)?,
        html: row.get(7)?,
        css: row.get(8)?,
        project_data: json_col(row, 9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn section_from_row(row: &Row<'_>) -> rusqlite::Result<Section> {
    Ok(Section {
        id: row.get(0)?,
        page_id: row.get(1)?,
        kind: row.get(2)?,
        position: row.get(3)?,
        content: json_col(row, 4)?,
        style: json_col(row, 5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn element_from_row(row: &Row<'_>) -> rusqlite::Result<Element> {
    Ok(Element {
        id: row.get(0)?,
        section_id: row.get(1)?,
        kind: row.get(2)?,
        position: row.get(3)?,
        content: json_col(row, 4)?,
        style: json_col(row, 5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn media_from_row(row: &Row<'_>) -> rusqlite::Result<MediaAsset> {
    Ok(MediaAsset {
        id: row.get(0)?,
        user_id: row.get(1)?,
        filename: row.get(2)?,
        storage_key: row.get(3)?,
        content_type: row.get(4)?,
        size_bytes: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn vcard_from_row(row: &Row<'_>) -> rusqlite::Result<VCard> {
    Ok(VCard {
        id: row.get(0)?,
        user_id: row.get(1)?,
        slug: row.get(2)?,
        full_name: row.get(3)?,
        job_title: row.get(4)?,
        company: row.get(5)?,
        email: row.get(6)?,
        phone: row.get(7)?,
        website_url: row.get(8)?,
        address: row.get(9)?,
        bio: row.get(10)?,
        avatar_url: row.get(11)?,
        theme_color: row.get(12)?,
        social_links: json_col(row, 13)?,
        published: row.get(14)?,
        view_count: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup() -> (StudioDb, i64, i64) {
        let db = StudioDb::new_in_memory().unwrap();
        let alice = db.create_user("alice@example.com", Some("Alice"), "hash").unwrap();
        let bob = db.create_user("bob@example.com", None, "hash").unwrap();
        (db, alice.id, bob.id)
    }

    fn new_site(db: &StudioDb, user_id: i64, name: &str) -> Website {
        db.create_website(
            user_id,
            &NewWebsite {
                name: name.to_string(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn new_section(db: &StudioDb, user_id: i64, page_id: i64, kind: &str) -> Section {
        db.create_section(
            user_id,
            page_id,
            &NewSection {
                kind: kind.to_string(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn new_element(db: &StudioDb, user_id: i64, section_id: i64, text: &str) -> Element {
        db.create_element(
            user_id,
            section_id,
            &NewElement {
                kind: "text".to_string(),
                content: Some(json!({"text": text})),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn home_page(db: &StudioDb, user_id: i64, website_id: i64) -> i64 {
        db.list_pages(user_id, website_id).unwrap()[0].id
    }

    fn studio_err(err: &anyhow::Error) -> &StudioError {
        err.downcast_ref::<StudioError>().expect("StudioError")
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studio.db");
        {
            let db = StudioDb::new(&path).unwrap();
            db.create_user("a@example.com", None, "h").unwrap();
        }
        let db = StudioDb::new(&path).unwrap();
        assert!(db.find_credentials("a@example.com").unwrap().is_some());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (db, _, _) = setup();
        let err = db.create_user("alice@example.com", None, "h").unwrap_err();
        assert!(matches!(studio_err(&err), StudioError::EmailTaken { .. }));
    }

    #[test]
    fn test_sessions_resolve_and_expire() {
        let (db, alice, _) = setup();
        db.create_session(alice, "live", 1).unwrap();
        assert_eq!(db.user_for_session("live").unwrap().unwrap().id, alice);

        db.create_session(alice, "stale", -1).unwrap();
        assert!(db.user_for_session("stale").unwrap().is_none());
        assert_eq!(db.purge_expired_sessions().unwrap(), 1);

        assert!(db.delete_session("live").unwrap());
        assert!(db.user_for_session("live").unwrap().is_none());
        assert!(!db.delete_session("live").unwrap());
    }

    #[test]
    fn test_create_website_creates_home_page() {
        let (db, alice, _) = setup();
        let site = new_site(&db, alice, "Acme Corp");
        assert_eq!(site.slug, "acme-corp");
        assert!(!site.published);
        assert_eq!(site.settings, json!({}));

        let detail = db.get_website_detail(alice, site.id).unwrap();
        assert_eq!(detail.pages.len(), 1);
        assert_eq!(detail.pages[0].slug, "index");
        assert!(detail.pages[0].is_home);
    }

    #[test]
    fn test_derived_slug_gets_suffix_explicit_slug_conflicts() {
        let (db, alice, bob) = setup();
        new_site(&db, alice, "Acme");
        let second = new_site(&db, bob, "Acme");
        assert_eq!(second.slug, "acme-2");

        let err = db
            .create_website(
                bob,
                &NewWebsite {
                    name: "Other".into(),
                    slug: Some("acme".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(studio_err(&err), StudioError::SlugTaken { .. }));

        let err = db
            .create_website(
                bob,
                &NewWebsite {
                    name: "Other".into(),
                    slug: Some("Bad Slug".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(studio_err(&err), StudioError::Validation(_)));
    }

    #[test]
    fn test_website_validation() {
        let (db, alice, _) = setup();
        let err = db
            .create_website(
                alice,
                &NewWebsite {
                    name: "   ".into(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(studio_err(&err), StudioError::Validation(_)));

        let err = db
            .create_website(
                alice,
                &NewWebsite {
                    name: "Site".into(),
                    settings: Some(json!([1, 2])),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(studio_err(&err), StudioError::Validation(_)));
    }

    #[test]
    fn test_update_website_partial() {
        let (db, alice, _) = setup();
        let site = new_site(&db, alice, "Acme");
        let updated = db
            .update_website(
                alice,
                site.id,
                &WebsitePatch {
                    published: Some(true),
                    settings: Some(json!({"theme": "dark"})),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.published);
        assert_eq!(updated.name, "Acme");
        assert_eq!(updated.slug, "acme");
        assert_eq!(updated.settings["theme"], "dark");

        // Re-submitting the current slug is not a conflict with itself.
        db.update_website(
            alice,
            site.id,
            &WebsitePatch {
                slug: Some("acme".into()),
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn test_ownership_chain_hides_foreign_resources() {
        let (db, alice, bob) = setup();
        let site = new_site(&db, alice, "Acme");
        let page = home_page(&db, alice, site.id);
        let section = new_section(&db, alice, page, "hero");
        let element = new_element(&db, alice, section.id, "hi");

        for err in [
            db.owned_website(bob, site.id).unwrap_err(),
            db.owned_page(bob, page).unwrap_err(),
            db.owned_section(bob, section.id).unwrap_err(),
            db.owned_element(bob, element.id).unwrap_err(),
            db.delete_website(bob, site.id).unwrap_err(),
            db.update_element(bob, element.id, &ElementPatch::default())
                .unwrap_err(),
        ] {
            assert!(matches!(studio_err(&err), StudioError::NotFound { .. }));
        }
        // A missing id looks the same as a foreign one.
        let err = db.owned_page(alice, 9999).unwrap_err();
        assert!(matches!(studio_err(&err), StudioError::NotFound { .. }));
        // Nothing was deleted by the rejected call.
        assert!(db.owned_element(alice, element.id).is_ok());
    }

    #[test]
    fn test_delete_website_cascades() {
        let (db, alice, _) = setup();
        let site = new_site(&db, alice, "Acme");
        let page = home_page(&db, alice, site.id);
        let section = new_section(&db, alice, page, "hero");
        let element = new_element(&db, alice, section.id, "hi");

        db.delete_website(alice, site.id).unwrap();
        assert!(db.owned_website(alice, site.id).is_err());
        assert!(db.owned_page(alice, page).is_err());
        let orphan_sections: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM sections", [], |r| r.get(0))
            .unwrap();
        let orphan_elements: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM elements WHERE id = ?1", [element.id], |r| r.get(0))
            .unwrap();
        assert_eq!(orphan_sections, 0);
        assert_eq!(orphan_elements, 0);
    }

    #[test]
    fn test_create_page_appends_and_derives_slug() {
        let (db, alice, _) = setup();
        let site = new_site(&db, alice, "Acme");
        let about = db
            .create_page(
                alice,
                site.id,
                &NewPage {
                    title: "About Us".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(about.slug, "about-us");
        assert_eq!(about.position, 1);
        assert!(!about.is_home);

        let again = db
            .create_page(
                alice,
                site.id,
                &NewPage {
                    title: "About Us".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(again.slug, "about-us-2");
    }

    #[test]
    fn test_page_slugs_unique_per_website_only() {
        let (db, alice, _) = setup();
        let a = new_site(&db, alice, "A");
        let b = new_site(&db, alice, "B");
        for site in [&a, &b] {
            db.create_page(
                alice,
                site.id,
                &NewPage {
                    title: "Pricing".into(),
                    slug: Some("pricing".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        }
        let err = db
            .create_page(
                alice,
                a.id,
                &NewPage {
                    title: "Pricing 2".into(),
                    slug: Some("pricing".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(studio_err(&err), StudioError::SlugTaken { .. }));
    }

    #[test]
    fn test_home_page_switch_and_delete_rules() {
        let (db, alice, _) = setup();
        let site = new_site(&db, alice, "Acme");
        let home = home_page(&db, alice, site.id);
        let about = db
            .create_page(
                alice,
                site.id,
                &NewPage {
                    title: "About".into(),
                    ..Default::default()
                },
            )
            .unwrap();

        let err = db.delete_page(alice, home).unwrap_err();
        assert!(matches!(studio_err(&err), StudioError::Validation(_)));

        let err = db
            .update_page(
                alice,
                home,
                &PagePatch {
                    is_home: Some(false),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(studio_err(&err), StudioError::Validation(_)));

        db.update_page(
            alice,
            about.id,
            &PagePatch {
                is_home: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!db.owned_page(alice, home).unwrap().is_home);

        // Old home is now deletable; remaining page is renumbered to 0.
        db.delete_page(alice, home).unwrap();
        let pages = db.list_pages(alice, site.id).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].position, 0);

        // The last page may go.
        db.delete_page(alice, about.id).unwrap();
        assert!(db.list_pages(alice, site.id).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_page_deep_copies() {
        let (db, alice, _) = setup();
        let site = new_site(&db, alice, "Acme");
        let home = home_page(&db, alice, site.id);
        let hero = new_section(&db, alice, home, "hero");
        new_element(&db, alice, hero.id, "one");
        new_element(&db, alice, hero.id, "two");
        new_section(&db, alice, home, "footer");

        let copy = db.duplicate_page(alice, home).unwrap();
        assert_eq!(copy.slug, "index-copy");
        assert_eq!(copy.title, "Home (copy)");
        assert!(!copy.is_home);
        assert_eq!(copy.position, 1);

        let sections = db.list_sections(alice, copy.id).unwrap();
        assert_eq!(
            sections.iter().map(|s| s.kind.as_str()).collect::<Vec<_>>(),
            vec!["hero", "footer"]
        );
        let elements = db.list_elements(alice, sections[0].id).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1].content["text"], "two");
        assert_ne!(sections[0].id, hero.id);

        let second = db.duplicate_page(alice, home).unwrap();
        assert_eq!(second.slug, "index-copy-2");
    }

    #[test]
    fn test_section_insert_at_position_shifts_siblings() {
        let (db, alice, _) = setup();
        let site = new_site(&db, alice, "Acme");
        let page = home_page(&db, alice, site.id);
        let a = new_section(&db, alice, page, "a");
        let b = new_section(&db, alice, page, "b");
        let c = db
            .create_section(
                alice,
                page,
                &NewSection {
                    kind: "c".into(),
                    position: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        let far = db
            .create_section(
                alice,
                page,
                &NewSection {
                    kind: "far".into(),
                    position: Some(99),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(far.position, 3);

        let order: Vec<(i64, i64)> = db
            .list_sections(alice, page)
            .unwrap()
            .iter()
            .map(|s| (s.id, s.position))
            .collect();
        assert_eq!(order, vec![(a.id, 0), (c.id, 1), (b.id, 2), (far.id, 3)]);
    }

    #[test]
    fn test_create_section_with_elements_is_atomic() {
        let (db, alice, bob) = setup();
        let site = new_site(&db, alice, "Acme");
        let page = home_page(&db, alice, site.id);
        let text = |t: &str| NewElement {
            kind: "text".into(),
            content: Some(json!({"text": t})),
            ..Default::default()
        };
        let section = NewSection {
            kind: "hero".into(),
            ..Default::default()
        };

        let detail = db
            .create_section_with_elements(alice, page, &section, &[text("a"), text("b")])
            .unwrap();
        assert_eq!(detail.section.position, 0);
        let positions: Vec<i64> = detail.elements.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![0, 1]);

        let bad = NewElement {
            kind: "text".into(),
            style: Some(json!("bold")),
            ..Default::default()
        };
        let err = db
            .create_section_with_elements(alice, page, &section, &[text("ok"), bad])
            .unwrap_err();
        assert!(matches!(studio_err(&err), StudioError::Validation(_)));
        assert_eq!(db.list_sections(alice, page).unwrap().len(), 1);

        assert!(db.create_section_with_elements(bob, page, &section, &[]).is_err());
        assert_eq!(db.list_sections(alice, page).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_section_closes_gap_and_removes_elements() {
        let (db, alice, _) = setup();
        let site = new_site(&db, alice, "Acme");
        let page = home_page(&db, alice, site.id);
        let a = new_section(&db, alice, page, "a");
        let b = new_section(&db, alice, page, "b");
        let c = new_section(&db, alice, page, "c");
        let el = new_element(&db, alice, b.id, "x");

        let deleted = db.delete_section(alice, b.id).unwrap();
        assert_eq!(deleted.page_id, page);
        assert!(db.owned_element(alice, el.id).is_err());
        let positions: Vec<(i64, i64)> = db
            .list_sections(alice, page)
            .unwrap()
            .iter()
            .map(|s| (s.id, s.position))
            .collect();
        assert_eq!(positions, vec![(a.id, 0), (c.id, 1)]);
    }

    #[test]
    fn test_reorder_sections() {
        let (db, alice, _) = setup();
        let site = new_site(&db, alice, "Acme");
        let page = home_page(&db, alice, site.id);
        let a = new_section(&db, alice, page, "a");
        let b = new_section(&db, alice, page, "b");
        let c = new_section(&db, alice, page, "c");

        let sections = db.reorder_sections(alice, page, &[c.id, a.id, b.id]).unwrap();
        let ids: Vec<i64> = sections.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![c.id, a.id, b.id]);
        assert_eq!(
            sections.iter().map(|s| s.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_reorder_rejects_non_permutations() {
        let (db, alice, bob) = setup();
        let site = new_site(&db, alice, "Acme");
        let page = home_page(&db, alice, site.id);
        let a = new_section(&db, alice, page, "a");
        let b = new_section(&db, alice, page, "b");
        let other_site = new_site(&db, bob, "Other");
        let other_page = home_page(&db, bob, other_site.id);
        let foreign = new_section(&db, bob, other_page, "x");

        for ids in [
            vec![a.id],
            vec![a.id, a.id],
            vec![a.id, foreign.id],
            vec![a.id, b.id, foreign.id],
        ] {
            let err = db.reorder_sections(alice, page, &ids).unwrap_err();
            assert!(
                matches!(studio_err(&err), StudioError::InvalidOrder(_)),
                "{:?}",
                ids
            );
        }
        // Original order untouched.
        let ids: Vec<i64> = db.list_sections(alice, page).unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn test_reorder_pages() {
        let (db, alice, _) = setup();
        let site = new_site(&db, alice, "Acme");
        let home = home_page(&db, alice, site.id);
        let about = db
            .create_page(
                alice,
                site.id,
                &NewPage {
                    title: "About".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let pages = db.reorder_pages(alice, site.id, &[about.id, home]).unwrap();
        assert_eq!(pages[0].id, about.id);
        assert_eq!(pages[0].position, 0);
        assert_eq!(pages[1].id, home);
    }

    #[test]
    fn test_move_element_between_sections() {
        let (db, alice, _) = setup();
        let site = new_site(&db, alice, "Acme");
        let page = home_page(&db, alice, site.id);
        let left = new_section(&db, alice, page, "left");
        let right = new_section(&db, alice, page, "right");
        let a = new_element(&db, alice, left.id, "a");
        let b = new_element(&db, alice, left.id, "b");
        new_element(&db, alice, right.id, "c");

        let moved = db
            .update_element(
                alice,
                a.id,
                &ElementPatch {
                    section_id: Some(right.id),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(moved.section_id, right.id);
        assert_eq!(moved.position, 1);
        let left_elements = db.list_elements(alice, left.id).unwrap();
        assert_eq!(left_elements.len(), 1);
        assert_eq!(left_elements[0].id, b.id);
        assert_eq!(left_elements[0].position, 0);
    }

    #[test]
    fn test_move_element_into_foreign_section_is_not_found() {
        let (db, alice, bob) = setup();
        let site = new_site(&db, alice, "Acme");
        let page = home_page(&db, alice, site.id);
        let section = new_section(&db, alice, page, "s");
        let el = new_element(&db, alice, section.id, "a");
        let other = new_site(&db, bob, "Other");
        let other_page = home_page(&db, bob, other.id);
        let foreign = new_section(&db, bob, other_page, "x");

        let err = db
            .update_element(
                alice,
                el.id,
                &ElementPatch {
                    section_id: Some(foreign.id),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(studio_err(&err), StudioError::NotFound { .. }));
        assert_eq!(db.owned_element(alice, el.id).unwrap().section_id, section.id);
    }

    #[test]
    fn test_delete_element_closes_gap() {
        let (db, alice, _) = setup();
        let site = new_site(&db, alice, "Acme");
        let page = home_page(&db, alice, site.id);
        let section = new_section(&db, alice, page, "s");
        let a = new_element(&db, alice, section.id, "a");
        let b = new_element(&db, alice, section.id, "b");
        let c = new_element(&db, alice, section.id, "c");
        db.delete_element(alice, a.id).unwrap();
        let els = db.list_elements(alice, section.id).unwrap();
        assert_eq!(
            els.iter().map(|e| (e.id, e.position)).collect::<Vec<_>>(),
            vec![(b.id, 0), (c.id, 1)]
        );
        let reordered = db.reorder_elements(alice, section.id, &[c.id, b.id]).unwrap();
        assert_eq!(reordered[0].id, c.id);
    }

    #[test]
    fn test_editor_document_round_trip() {
        let (db, alice, _) = setup();
        let site = new_site(&db, alice, "Acme");
        let page = home_page(&db, alice, site.id);
        let saved = db
            .save_editor_document(
                alice,
                page,
                &EditorDocument {
                    html: "<h1>Hi</h1>".into(),
                    css: "h1{color:red}".into(),
                    project_data: json!({"pages": [{"id": "x"}]}),
                },
            )
            .unwrap();
        assert_eq!(saved.html, "<h1>Hi</h1>");
        assert_eq!(saved.project_data["pages"][0]["id"], "x");
    }

    #[test]
    fn test_published_page_tree() {
        let (db, alice, _) = setup();
        let site = new_site(&db, alice, "Acme");
        let home = home_page(&db, alice, site.id);
        let hero = new_section(&db, alice, home, "hero");
        new_element(&db, alice, hero.id, "Welcome");

        assert!(db.published_page_tree("acme", None).unwrap().is_none());
        db.update_website(
            alice,
            site.id,
            &WebsitePatch {
                published: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

        let tree = db.published_page_tree("acme", None).unwrap().unwrap();
        assert_eq!(tree.page.id, home);
        assert_eq!(tree.sections.len(), 1);
        assert_eq!(tree.sections[0].elements[0].content["text"], "Welcome");
        assert!(db.published_page_tree("acme", Some("index")).unwrap().is_some());
        assert!(db.published_page_tree("acme", Some("nope")).unwrap().is_none());
        assert!(db.published_page_tree("nope", None).unwrap().is_none());
    }

    #[test]
    fn test_media_ownership() {
        let (db, alice, bob) = setup();
        let asset = db
            .create_media(alice, "logo.png", "users/1/a.png", "image/png", 12)
            .unwrap();
        assert_eq!(db.list_media(alice).unwrap().len(), 1);
        assert!(db.list_media(bob).unwrap().is_empty());
        assert!(db.get_media(bob, asset.id).is_err());
        assert!(db.find_media(asset.id).unwrap().is_some());
        assert!(db.delete_media(bob, asset.id).is_err());
        let deleted = db.delete_media(alice, asset.id).unwrap();
        assert_eq!(deleted.storage_key, "users/1/a.png");
        assert!(db.find_media(asset.id).unwrap().is_none());
    }

    #[test]
    fn test_vcard_crud_and_validation() {
        let (db, alice, bob) = setup();
        let card = db
            .create_vcard(
                alice,
                &NewVCard {
                    full_name: "Ada Lovelace".into(),
                    email: Some(" ada@example.com ".into()),
                    social_links: Some(json!({"github": "https://github.com/ada"})),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(card.slug, "ada-lovelace");
        assert_eq!(card.email, "ada@example.com");
        assert_eq!(card.theme_color, DEFAULT_THEME_COLOR);
        assert!(!card.published);

        for bad in [
            NewVCard {
                full_name: "X".into(),
                email: Some("nope".into()),
                ..Default::default()
            },
            NewVCard {
                full_name: "X".into(),
                theme_color: Some("red".into()),
                ..Default::default()
            },
            NewVCard {
                full_name: "X".into(),
                social_links: Some(json!(["a"])),
                ..Default::default()
            },
            NewVCard {
                full_name: "".into(),
                ..Default::default()
            },
            NewVCard {
                full_name: "X".into(),
                email: Some("x@example.com\r\nX-EVIL:1".into()),
                ..Default::default()
            },
            NewVCard {
                full_name: "X".into(),
                phone: Some("555\nEND:VCARD".into()),
                ..Default::default()
            },
            NewVCard {
                full_name: "X".into(),
                website_url: Some("javascript:alert(1)".into()),
                ..Default::default()
            },
            NewVCard {
                full_name: "X".into(),
                avatar_url: Some("/media/1\r\nNOTE:x".into()),
                ..Default::default()
            },
            NewVCard {
                full_name: "X".into(),
                social_links: Some(json!({"x": "data:text/html,hi"})),
                ..Default::default()
            },
        ] {
            let err = db.create_vcard(alice, &bad).unwrap_err();
            assert!(matches!(studio_err(&err), StudioError::Validation(_)));
        }

        let updated = db
            .update_vcard(
                alice,
                card.id,
                &VCardPatch {
                    job_title: Some("Engineer".into()),
                    published: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.job_title, "Engineer");
        assert_eq!(updated.full_name, "Ada Lovelace");

        assert!(db.get_vcard(bob, card.id).is_err());
        let published = db.find_published_vcard("ada-lovelace").unwrap().unwrap();
        db.record_vcard_view(published.id).unwrap();
        assert_eq!(db.get_vcard(alice, card.id).unwrap().view_count, 1);

        db.delete_vcard(alice, card.id).unwrap();
        assert!(db.find_published_vcard("ada-lovelace").unwrap().is_none());
    }
}

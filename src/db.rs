use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::models::{
    Actor, Author, AuthorRef, Biography, PhaseStatus, Quote, ScheduledTask, ScrapedAuthor,
    TaskPhases,
};

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of an explicit upsert: which branch ran, and the row id either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created(i64),
    Updated(i64),
}

impl Upsert {
    pub fn id(self) -> i64 {
        match self {
            Upsert::Created(id) | Upsert::Updated(id) => id,
        }
    }

    pub fn was_created(self) -> bool {
        matches!(self, Upsert::Created(_))
    }
}

pub struct NewQuote<'a> {
    pub text: &'a str,
    pub tags: &'a [String],
    pub author: AuthorRef,
    pub actor: Actor,
}

#[derive(Default)]
pub struct QuotePatch {
    pub text: Option<String>,
    pub tags: Option<Vec<String>>,
}

pub struct NewAuthor<'a> {
    pub name: &'a str,
    pub dob: Option<NaiveDate>,
    pub country: Option<&'a str>,
    pub description: Option<&'a str>,
    pub password: Option<&'a str>,
    pub scrape_id: Option<i64>,
    pub actor: Actor,
}

#[derive(Default)]
pub struct AuthorPatch {
    pub name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub country: Option<String>,
    pub description: Option<String>,
}

/// Catalog store over one SQLite connection. Every method is a short, self-contained
/// statement, so concurrent pipeline runs interleave per record.
pub struct Store {
    conn: Mutex<Connection>,
}

const QUOTE_COLUMNS: &str =
    "id, text, tags, author_id, scraped_author_id, created_by, updated_by, created_on, updated_on";
const AUTHOR_COLUMNS: &str = "id, name, dob, country, description, password, scrape_id, \
     created_by, updated_by, created_on, updated_on";
const SCRAPED_AUTHOR_COLUMNS: &str =
    "id, name, dob, country, description, link, created_on, updated_on";
const TASK_COLUMNS: &str =
    "id, job_id, external_task_id, description, quote_phase, author_phase, created_on";

impl Store {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.conn().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS scraped_authors (
                id          INTEGER PRIMARY KEY,
                name        TEXT NOT NULL,
                dob         TEXT,
                country     TEXT,
                description TEXT,
                link        TEXT UNIQUE NOT NULL,
                created_on  TEXT NOT NULL,
                updated_on  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_scraped_authors_created ON scraped_authors(created_on);

            CREATE TABLE IF NOT EXISTS authors (
                id          INTEGER PRIMARY KEY,
                name        TEXT UNIQUE NOT NULL,
                dob         TEXT,
                country     TEXT,
                description TEXT,
                password    TEXT,
                scrape_id   INTEGER REFERENCES scraped_authors(id) ON DELETE SET NULL,
                created_by  TEXT NOT NULL CHECK(created_by IN ('author','scraper')),
                updated_by  TEXT NOT NULL CHECK(updated_by IN ('author','scraper')),
                created_on  TEXT NOT NULL,
                updated_on  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS quotes (
                id                INTEGER PRIMARY KEY,
                text              TEXT UNIQUE NOT NULL,
                tags              TEXT NOT NULL DEFAULT '[]',
                author_id         INTEGER REFERENCES authors(id) ON DELETE CASCADE,
                scraped_author_id INTEGER REFERENCES scraped_authors(id),
                created_by        TEXT NOT NULL CHECK(created_by IN ('author','scraper')),
                updated_by        TEXT NOT NULL CHECK(updated_by IN ('author','scraper')),
                created_on        TEXT NOT NULL,
                updated_on        TEXT NOT NULL,
                CHECK ((author_id IS NULL) <> (scraped_author_id IS NULL))
            );
            CREATE INDEX IF NOT EXISTS idx_quotes_author ON quotes(author_id);
            CREATE INDEX IF NOT EXISTS idx_quotes_scraped_author ON quotes(scraped_author_id);

            CREATE TABLE IF NOT EXISTS scheduled_tasks (
                id               INTEGER PRIMARY KEY,
                job_id           TEXT,
                external_task_id TEXT,
                description      TEXT NOT NULL,
                quote_phase      TEXT NOT NULL DEFAULT 'NOT_STARTED',
                author_phase     TEXT NOT NULL DEFAULT 'NOT_STARTED',
                created_on       TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_external ON scheduled_tasks(external_task_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_description ON scheduled_tasks(description);
            ",
        )?;
        Ok(())
    }

    // ── Staging authors ──

    pub fn find_scraped_author_by_link(&self, link: &str) -> StoreResult<Option<ScrapedAuthor>> {
        let sql = format!("SELECT {SCRAPED_AUTHOR_COLUMNS} FROM scraped_authors WHERE link = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![link], scraped_author_from_row)
            .optional()?)
    }

    pub fn get_scraped_author(&self, id: i64) -> StoreResult<ScrapedAuthor> {
        let sql = format!("SELECT {SCRAPED_AUTHOR_COLUMNS} FROM scraped_authors WHERE id = ?1");
        self.conn()
            .query_row(&sql, params![id], scraped_author_from_row)
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "scraped author",
                id,
            })
    }

    /// Inserts a staging author with only name and link known.
    pub fn insert_scraped_author(&self, name: &str, link: &str) -> StoreResult<i64> {
        let now = Utc::now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO scraped_authors (name, link, created_on, updated_on)
             VALUES (?1, ?2, ?3, ?3)",
            params![name, link, now],
        )
        .map_err(|e| StoreError::unique(e, "scraped author", "link"))?;
        Ok(conn.last_insert_rowid())
    }

    /// Looks a staging author up by link, creating it when absent.
    pub fn get_or_create_scraped_author(&self, name: &str, link: &str) -> StoreResult<Upsert> {
        if let Some(existing) = self.find_scraped_author_by_link(link)? {
            return Ok(Upsert::Updated(existing.id));
        }
        match self.insert_scraped_author(name, link) {
            Ok(id) => Ok(Upsert::Created(id)),
            // Another run inserted the same link between our lookup and insert.
            Err(err) if err.is_conflict() => self
                .find_scraped_author_by_link(link)?
                .map(|a| Upsert::Updated(a.id))
                .ok_or(err),
            Err(err) => Err(err),
        }
    }

    pub fn scraped_authors(&self) -> StoreResult<Vec<ScrapedAuthor>> {
        let sql = format!("SELECT {SCRAPED_AUTHOR_COLUMNS} FROM scraped_authors ORDER BY id");
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], scraped_author_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn scraped_authors_missing_biography(&self) -> StoreResult<Vec<ScrapedAuthor>> {
        let sql = format!(
            "SELECT {SCRAPED_AUTHOR_COLUMNS} FROM scraped_authors
             WHERE dob IS NULL OR country IS NULL OR description IS NULL
             ORDER BY id"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], scraped_author_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_scraped_biography(&self, id: i64, bio: &Biography) -> StoreResult<()> {
        let changed = self.conn().execute(
            "UPDATE scraped_authors SET dob = ?2, country = ?3, description = ?4, updated_on = ?5
             WHERE id = ?1",
            params![id, bio.dob, bio.country, bio.description, Utc::now()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "scraped author",
                id,
            });
        }
        Ok(())
    }

    /// Drops staging authors created before `older_than` that no quote still points at.
    pub fn purge_scraped_authors(&self, older_than: DateTime<Utc>) -> StoreResult<usize> {
        Ok(self.conn().execute(
            "DELETE FROM scraped_authors
             WHERE created_on < ?1
               AND NOT EXISTS (SELECT 1 FROM quotes q WHERE q.scraped_author_id = scraped_authors.id)",
            params![older_than],
        )?)
    }

    // ── Quotes ──

    pub fn insert_quote(&self, quote: &NewQuote<'_>) -> StoreResult<i64> {
        let now = Utc::now();
        let tags = serde_json::to_string(quote.tags)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO quotes
             (text, tags, author_id, scraped_author_id, created_by, updated_by, created_on, updated_on)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?6)",
            params![
                quote.text,
                tags,
                quote.author.author_id(),
                quote.author.scraped_author_id(),
                quote.actor.as_str(),
                now,
            ],
        )
        .map_err(|e| StoreError::unique(e, "quote", "text"))?;
        Ok(conn.last_insert_rowid())
    }

    /// Creates a scraped quote, or when its text already exists overwrites tags and the
    /// author reference of the existing row.
    ///
    /// A quote already promoted to the canonical author of this same staging record keeps
    /// its canonical reference, so re-ingesting a page does not undo a promotion.
    pub fn upsert_scraped_quote(
        &self,
        text: &str,
        tags: &[String],
        scraped_author_id: i64,
    ) -> StoreResult<Upsert> {
        let quote = NewQuote {
            text,
            tags,
            author: AuthorRef::ScrapedAuthor(scraped_author_id),
            actor: Actor::Scraper,
        };
        match self.insert_quote(&quote) {
            Ok(id) => Ok(Upsert::Created(id)),
            Err(err) if err.is_conflict() => {
                let tags = serde_json::to_string(tags)?;
                let id = self
                    .conn()
                    .query_row(
                        "UPDATE quotes SET
                            tags = ?2,
                            scraped_author_id = CASE
                                WHEN author_id IN (SELECT id FROM authors WHERE scrape_id = ?3)
                                THEN NULL ELSE ?3 END,
                            author_id = CASE
                                WHEN author_id IN (SELECT id FROM authors WHERE scrape_id = ?3)
                                THEN author_id ELSE NULL END,
                            updated_on = ?4,
                            updated_by = 'scraper'
                         WHERE text = ?1
                         RETURNING id",
                        params![text, tags, scraped_author_id, Utc::now()],
                        |row| row.get(0),
                    )
                    .optional()?
                    .ok_or(err)?;
                Ok(Upsert::Updated(id))
            }
            Err(err) => Err(err),
        }
    }

    pub fn get_quote(&self, id: i64) -> StoreResult<Quote> {
        let sql = format!("SELECT {QUOTE_COLUMNS} FROM quotes WHERE id = ?1");
        self.conn()
            .query_row(&sql, params![id], quote_from_row)
            .optional()?
            .ok_or(StoreError::NotFound { entity: "quote", id })
    }

    /// Quotes that already point at a canonical author.
    pub fn list_quotes(&self) -> StoreResult<Vec<Quote>> {
        let sql =
            format!("SELECT {QUOTE_COLUMNS} FROM quotes WHERE author_id IS NOT NULL ORDER BY id");
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], quote_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Quotes carrying any of `tags`, most matched tags first.
    pub fn list_quotes_by_tags(&self, tags: &[String]) -> StoreResult<Vec<Quote>> {
        let wanted = serde_json::to_string(tags)?;
        let sql = format!(
            "SELECT {QUOTE_COLUMNS} FROM (
                SELECT q.*, (
                    SELECT COUNT(*) FROM json_each(q.tags) t
                    WHERE t.value IN (SELECT value FROM json_each(?1))
                ) AS matched
                FROM quotes q
             )
             WHERE matched > 0
             ORDER BY matched DESC, id"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![wanted], quote_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn quotes_by_scraped_author(&self, scraped_author_id: i64) -> StoreResult<Vec<Quote>> {
        let sql = format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes WHERE scraped_author_id = ?1 ORDER BY id"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![scraped_author_id], quote_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Repoints every quote of a staging author at a canonical author.
    pub fn relink_quotes(&self, scraped_author_id: i64, author_id: i64) -> StoreResult<usize> {
        Ok(self.conn().execute(
            "UPDATE quotes SET author_id = ?2, scraped_author_id = NULL, updated_on = ?3
             WHERE scraped_author_id = ?1",
            params![scraped_author_id, author_id, Utc::now()],
        )?)
    }

    pub fn update_quote(&self, id: i64, patch: &QuotePatch) -> StoreResult<()> {
        let tags = patch.tags.as_ref().map(serde_json::to_string).transpose()?;
        let changed = self
            .conn()
            .execute(
                "UPDATE quotes SET
                    text = COALESCE(?2, text),
                    tags = COALESCE(?3, tags),
                    updated_on = ?4,
                    updated_by = 'author'
                 WHERE id = ?1",
                params![id, patch.text, tags, Utc::now()],
            )
            .map_err(|e| StoreError::unique(e, "quote", "text"))?;
        if changed == 0 {
            return Err(StoreError::NotFound { entity: "quote", id });
        }
        Ok(())
    }

    pub fn delete_quote(&self, id: i64) -> StoreResult<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM quotes WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound { entity: "quote", id });
        }
        Ok(())
    }

    // ── Canonical authors ──

    pub fn insert_author(&self, author: &NewAuthor<'_>) -> StoreResult<i64> {
        let now = Utc::now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO authors
             (name, dob, country, description, password, scrape_id,
              created_by, updated_by, created_on, updated_on)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8, ?8)",
            params![
                author.name,
                author.dob,
                author.country,
                author.description,
                author.password,
                author.scrape_id,
                author.actor.as_str(),
                now,
            ],
        )
        .map_err(|e| StoreError::unique(e, "author", "name"))?;
        Ok(conn.last_insert_rowid())
    }

    /// Creates the canonical author for a staging record, or merges into the author that
    /// already owns the name.
    ///
    /// Merge precedence: an API-entered author keeps every field it already has and only
    /// gains the ones it lacks; a scraper-entered author takes any non-null staging field.
    pub fn upsert_promoted_author(&self, staged: &ScrapedAuthor) -> StoreResult<Upsert> {
        let new = NewAuthor {
            name: &staged.name,
            dob: staged.dob,
            country: staged.country.as_deref(),
            description: staged.description.as_deref(),
            password: None,
            scrape_id: Some(staged.id),
            actor: Actor::Scraper,
        };
        match self.insert_author(&new) {
            Ok(id) => Ok(Upsert::Created(id)),
            Err(err) if err.is_conflict() => {
                let id = self
                    .conn()
                    .query_row(
                        "UPDATE authors SET
                            dob = CASE WHEN created_by = 'author'
                                THEN COALESCE(dob, ?2) ELSE COALESCE(?2, dob) END,
                            country = CASE WHEN created_by = 'author'
                                THEN COALESCE(country, ?3) ELSE COALESCE(?3, country) END,
                            description = CASE WHEN created_by = 'author'
                                THEN COALESCE(description, ?4) ELSE COALESCE(?4, description) END,
                            scrape_id = COALESCE(scrape_id, ?5),
                            updated_on = ?6,
                            updated_by = 'scraper'
                         WHERE name = ?1
                         RETURNING id",
                        params![
                            staged.name,
                            staged.dob,
                            staged.country,
                            staged.description,
                            staged.id,
                            Utc::now(),
                        ],
                        |row| row.get(0),
                    )
                    .optional()?
                    .ok_or(err)?;
                Ok(Upsert::Updated(id))
            }
            Err(err) => Err(err),
        }
    }

    pub fn get_author(&self, id: i64) -> StoreResult<Author> {
        let sql = format!("SELECT {AUTHOR_COLUMNS} FROM authors WHERE id = ?1");
        self.conn()
            .query_row(&sql, params![id], author_from_row)
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "author",
                id,
            })
    }

    pub fn find_author_by_name(&self, name: &str) -> StoreResult<Option<Author>> {
        let sql = format!("SELECT {AUTHOR_COLUMNS} FROM authors WHERE name = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![name], author_from_row)
            .optional()?)
    }

    pub fn list_authors(&self) -> StoreResult<Vec<Author>> {
        let sql = format!("SELECT {AUTHOR_COLUMNS} FROM authors ORDER BY id");
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], author_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_author(&self, id: i64, patch: &AuthorPatch) -> StoreResult<()> {
        let changed = self
            .conn()
            .execute(
                "UPDATE authors SET
                    name = COALESCE(?2, name),
                    dob = COALESCE(?3, dob),
                    country = COALESCE(?4, country),
                    description = COALESCE(?5, description),
                    updated_on = ?6,
                    updated_by = 'author'
                 WHERE id = ?1",
                params![
                    id,
                    patch.name,
                    patch.dob,
                    patch.country,
                    patch.description,
                    Utc::now()
                ],
            )
            .map_err(|e| StoreError::unique(e, "author", "name"))?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "author",
                id,
            });
        }
        Ok(())
    }

    /// Deletes an author together with its quotes.
    pub fn delete_author(&self, id: i64) -> StoreResult<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM authors WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "author",
                id,
            });
        }
        Ok(())
    }

    // ── Task records ──

    pub fn create_task(
        &self,
        description: &str,
        job_id: Option<&str>,
        external_task_id: Option<&str>,
    ) -> StoreResult<ScheduledTask> {
        let now = Utc::now();
        let id = {
            let conn = self.conn();
            conn.execute(
                "INSERT INTO scheduled_tasks (job_id, external_task_id, description, created_on)
                 VALUES (?1, ?2, ?3, ?4)",
                params![job_id, external_task_id, description, now],
            )?;
            conn.last_insert_rowid()
        };
        self.get_task(id)
    }

    pub fn set_task_external_id(&self, id: i64, external_task_id: &str) -> StoreResult<()> {
        let changed = self.conn().execute(
            "UPDATE scheduled_tasks SET external_task_id = ?2 WHERE id = ?1",
            params![id, external_task_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { entity: "task", id });
        }
        Ok(())
    }

    pub fn update_task_status(&self, id: i64, phases: TaskPhases) -> StoreResult<()> {
        let changed = self.conn().execute(
            "UPDATE scheduled_tasks SET quote_phase = ?2, author_phase = ?3 WHERE id = ?1",
            params![id, phases.quote_phase.as_str(), phases.author_phase.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { entity: "task", id });
        }
        Ok(())
    }

    pub fn get_task(&self, id: i64) -> StoreResult<ScheduledTask> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE id = ?1");
        self.conn()
            .query_row(&sql, params![id], task_from_row)
            .optional()?
            .ok_or(StoreError::NotFound { entity: "task", id })
    }

    pub fn find_task_by_external_id(
        &self,
        external_task_id: &str,
    ) -> StoreResult<Option<ScheduledTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE external_task_id = ?1
             ORDER BY id DESC LIMIT 1"
        );
        Ok(self
            .conn()
            .query_row(&sql, params![external_task_id], task_from_row)
            .optional()?)
    }

    pub fn list_tasks(&self, description: Option<&str>) -> StoreResult<Vec<ScheduledTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks
             WHERE ?1 IS NULL OR description = ?1
             ORDER BY id DESC"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![description], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Stats ──

    pub fn count_quotes(&self) -> StoreResult<usize> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM quotes WHERE author_id IS NOT NULL",
            [],
            |r| r.get(0),
        )?)
    }

    pub fn count_all_quotes(&self) -> StoreResult<usize> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM quotes", [], |r| r.get(0))?)
    }

    pub fn count_authors(&self) -> StoreResult<usize> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM authors", [], |r| r.get(0))?)
    }

    pub fn count_scraped_authors(&self) -> StoreResult<usize> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM scraped_authors", [], |r| r.get(0))?)
    }

    /// Most used tags over quotes with a canonical author, optionally for one author.
    pub fn top_tags(&self, author_id: Option<i64>, limit: usize) -> StoreResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT t.value, COUNT(*) AS n
             FROM quotes q, json_each(q.tags) t
             WHERE q.author_id IS NOT NULL AND (?1 IS NULL OR q.author_id = ?1)
             GROUP BY t.value
             ORDER BY n DESC, t.value
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![author_id, limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The author with the most quotes, with that count.
    pub fn top_author(&self) -> StoreResult<Option<(Author, usize)>> {
        let top: Option<(i64, usize)> = self
            .conn()
            .query_row(
                "SELECT author_id, COUNT(*) AS n FROM quotes
                 WHERE author_id IS NOT NULL
                 GROUP BY author_id
                 ORDER BY n DESC, author_id
                 LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match top {
            Some((id, count)) => Ok(Some((self.get_author(id)?, count))),
            None => Ok(None),
        }
    }
}

// ── Row mapping ──

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn quote_from_row(row: &Row<'_>) -> rusqlite::Result<Quote> {
    let tags_raw: String = row.get(2)?;
    let tags: Vec<String> = serde_json::from_str(&tags_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let author = AuthorRef::from_columns(row.get(3)?, row.get(4)?).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Integer,
            "quote must reference exactly one author".into(),
        )
    })?;
    Ok(Quote {
        id: row.get(0)?,
        text: row.get(1)?,
        tags,
        author,
        created_by: parse_column(row, 5)?,
        updated_by: parse_column(row, 6)?,
        created_on: row.get(7)?,
        updated_on: row.get(8)?,
    })
}

fn author_from_row(row: &Row<'_>) -> rusqlite::Result<Author> {
    Ok(Author {
        id: row.get(0)?,
        name: row.get(1)?,
        dob: row.get(2)?,
        country: row.get(3)?,
        description: row.get(4)?,
        password: row.get(5)?,
        scrape_id: row.get(6)?,
        created_by: parse_column(row, 7)?,
        updated_by: parse_column(row, 8)?,
        created_on: row.get(9)?,
        updated_on: row.get(10)?,
    })
}

fn scraped_author_from_row(row: &Row<'_>) -> rusqlite::Result<ScrapedAuthor> {
    Ok(ScrapedAuthor {
        id: row.get(0)?,
        name: row.get(1)?,
        dob: row.get(2)?,
        country: row.get(3)?,
        description: row.get(4)?,
        link: row.get(5)?,
        created_on: row.get(6)?,
        updated_on: row.get(7)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledTask> {
    Ok(ScheduledTask {
        id: row.get(0)?,
        job_id: row.get(1)?,
        external_task_id: row.get(2)?,
        description: row.get(3)?,
        status: TaskPhases {
            quote_phase: parse_column::<PhaseStatus>(row, 4)?,
            author_phase: parse_column::<PhaseStatus>(row, 5)?,
        },
        created_on: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn bio(country: &str) -> Biography {
        Biography {
            dob: NaiveDate::from_ymd_opt(1879, 3, 14).unwrap(),
            country: country.to_string(),
            description: "Physicist.".to_string(),
        }
    }

    #[test]
    fn scraped_author_is_unique_per_link() {
        let store = Store::open_in_memory().unwrap();
        let first = store
            .get_or_create_scraped_author("Albert Einstein", "https://q/author/Albert-Einstein")
            .unwrap();
        let second = store
            .get_or_create_scraped_author("Albert Einstein", "https://q/author/Albert-Einstein")
            .unwrap();
        assert!(first.was_created());
        assert_eq!(second, Upsert::Updated(first.id()));
        assert_eq!(store.count_scraped_authors().unwrap(), 1);

        let err = store
            .insert_scraped_author("Someone", "https://q/author/Albert-Einstein")
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn duplicate_quote_text_becomes_update() {
        let store = Store::open_in_memory().unwrap();
        let a = store.insert_scraped_author("A", "https://q/a").unwrap();
        let b = store.insert_scraped_author("B", "https://q/b").unwrap();

        let created = store.upsert_scraped_quote("Same words", &tags(&["x"]), a).unwrap();
        let updated = store
            .upsert_scraped_quote("Same words", &tags(&["y", "z"]), b)
            .unwrap();

        assert!(created.was_created());
        assert_eq!(updated, Upsert::Updated(created.id()));
        let quote = store.get_quote(created.id()).unwrap();
        assert_eq!(quote.tags, tags(&["y", "z"]));
        assert_eq!(quote.author, AuthorRef::ScrapedAuthor(b));
        assert_eq!(quote.updated_by, Actor::Scraper);
        assert_eq!(store.count_all_quotes().unwrap(), 1);
    }

    #[test]
    fn reingest_keeps_promoted_reference() {
        let store = Store::open_in_memory().unwrap();
        let sid = store.insert_scraped_author("A", "https://q/a").unwrap();
        let qid = store.upsert_scraped_quote("Words", &tags(&["x"]), sid).unwrap().id();
        let staged = store.get_scraped_author(sid).unwrap();
        let aid = store.upsert_promoted_author(&staged).unwrap().id();
        assert_eq!(store.relink_quotes(sid, aid).unwrap(), 1);

        store.upsert_scraped_quote("Words", &tags(&["x", "y"]), sid).unwrap();
        let quote = store.get_quote(qid).unwrap();
        assert_eq!(quote.author, AuthorRef::Author(aid));
        assert_eq!(quote.tags, tags(&["x", "y"]));
    }

    #[test]
    fn quote_must_reference_exactly_one_author() {
        let store = Store::open_in_memory().unwrap();
        let sid = store.insert_scraped_author("A", "https://q/a").unwrap();
        let err = store
            .conn()
            .execute(
                "INSERT INTO quotes (text, author_id, scraped_author_id, created_by, updated_by,
                 created_on, updated_on) VALUES ('t', NULL, NULL, 'author', 'author', 'x', 'x')",
                [],
            )
            .unwrap_err();
        assert!(matches!(err, rusqlite::Error::SqliteFailure(..)));
        assert_eq!(store.quotes_by_scraped_author(sid).unwrap().len(), 0);
    }

    #[test]
    fn promoted_author_merges_by_precedence() {
        let store = Store::open_in_memory().unwrap();
        let api_id = store
            .insert_author(&NewAuthor {
                name: "Jane Austen",
                dob: None,
                country: Some("England"),
                description: None,
                password: None,
                scrape_id: None,
                actor: Actor::Author,
            })
            .unwrap();
        let sid = store.insert_scraped_author("Jane Austen", "https://q/jane").unwrap();
        store.update_scraped_biography(sid, &bio("United Kingdom")).unwrap();
        let staged = store.get_scraped_author(sid).unwrap();

        let merged = store.upsert_promoted_author(&staged).unwrap();
        assert_eq!(merged, Upsert::Updated(api_id));
        let author = store.get_author(api_id).unwrap();
        assert_eq!(author.country.as_deref(), Some("England"));
        assert_eq!(author.description.as_deref(), Some("Physicist."));
        assert_eq!(author.scrape_id, Some(sid));
        assert_eq!(author.created_by, Actor::Author);
    }

    #[test]
    fn scraper_author_takes_fresh_fields() {
        let store = Store::open_in_memory().unwrap();
        let sid = store.insert_scraped_author("A", "https://q/a").unwrap();
        store.update_scraped_biography(sid, &bio("Germany")).unwrap();
        let first = store
            .upsert_promoted_author(&store.get_scraped_author(sid).unwrap())
            .unwrap();
        store.update_scraped_biography(sid, &bio("Switzerland")).unwrap();
        let second = store
            .upsert_promoted_author(&store.get_scraped_author(sid).unwrap())
            .unwrap();
        assert_eq!(second, Upsert::Updated(first.id()));
        let author = store.get_author(first.id()).unwrap();
        assert_eq!(author.country.as_deref(), Some("Switzerland"));
        assert_eq!(store.count_authors().unwrap(), 1);
    }

    #[test]
    fn tag_filter_orders_by_matches() {
        let store = Store::open_in_memory().unwrap();
        let sid = store.insert_scraped_author("A", "https://q/a").unwrap();
        let one = store.upsert_scraped_quote("one", &tags(&["love"]), sid).unwrap().id();
        let two = store
            .upsert_scraped_quote("two", &tags(&["love", "life"]), sid)
            .unwrap()
            .id();
        store.upsert_scraped_quote("three", &tags(&["humor"]), sid).unwrap();

        let found = store
            .list_quotes_by_tags(&tags(&["life", "love"]))
            .unwrap()
            .into_iter()
            .map(|q| q.id)
            .collect::<Vec<_>>();
        assert_eq!(found, vec![two, one]);
    }

    #[test]
    fn stats_count_only_canonical_quotes() {
        let store = Store::open_in_memory().unwrap();
        let sid = store.insert_scraped_author("A", "https://q/a").unwrap();
        store.upsert_scraped_quote("one", &tags(&["love", "life"]), sid).unwrap();
        store.upsert_scraped_quote("two", &tags(&["love"]), sid).unwrap();
        assert_eq!(store.count_quotes().unwrap(), 0);
        assert!(store.top_author().unwrap().is_none());

        let aid = store
            .upsert_promoted_author(&store.get_scraped_author(sid).unwrap())
            .unwrap()
            .id();
        store.relink_quotes(sid, aid).unwrap();

        assert_eq!(store.count_quotes().unwrap(), 2);
        assert_eq!(store.top_tags(None, 10).unwrap(), tags(&["love", "life"]));
        let (author, count) = store.top_author().unwrap().unwrap();
        assert_eq!((author.id, count), (aid, 2));
        assert_eq!(store.top_tags(Some(aid), 1).unwrap(), tags(&["love"]));
    }

    #[test]
    fn purge_spares_referenced_staging_authors() {
        let store = Store::open_in_memory().unwrap();
        let kept = store.insert_scraped_author("A", "https://q/a").unwrap();
        store.upsert_scraped_quote("one", &tags(&[]), kept).unwrap();
        store.insert_scraped_author("B", "https://q/b").unwrap();

        let purged = store
            .purge_scraped_authors(Utc::now() + Duration::seconds(5))
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.scraped_authors().unwrap()[0].id, kept);
    }

    #[test]
    fn task_status_is_persisted() {
        let store = Store::open_in_memory().unwrap();
        let task = store.create_task("scrape_data", Some("job-1"), None).unwrap();
        assert_eq!(task.status, TaskPhases::default());

        store.set_task_external_id(task.id, "ext-1").unwrap();
        let phases = TaskPhases::default()
            .with_quote(PhaseStatus::Success)
            .with_author(PhaseStatus::Failed);
        store.update_task_status(task.id, phases).unwrap();

        let found = store.find_task_by_external_id("ext-1").unwrap().unwrap();
        assert_eq!(found.status, phases);
        assert_eq!(found.job_id.as_deref(), Some("job-1"));
        assert_eq!(store.list_tasks(Some("scrape_data")).unwrap().len(), 1);
        assert!(store.list_tasks(Some("other")).unwrap().is_empty());
        assert_eq!(store.list_tasks(None).unwrap().len(), 1);
    }
}

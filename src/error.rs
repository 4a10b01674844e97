use thiserror::Error;

/// SQLite extended result code for a violated UNIQUE constraint.
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;
/// SQLite extended result code for a violated FOREIGN KEY constraint.
const SQLITE_CONSTRAINT_FOREIGNKEY: i32 = 787;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),
    #[error("{entity} with this {field} already exists")]
    Conflict {
        entity: &'static str,
        field: &'static str,
    },
    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: i64 },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Sqlite(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl StoreError {
    /// Maps a UNIQUE violation onto `Conflict`, leaving every other error untouched.
    pub fn unique(err: rusqlite::Error, entity: &'static str, field: &'static str) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.extended_code == SQLITE_CONSTRAINT_UNIQUE =>
            {
                StoreError::Conflict { entity, field }
            }
            _ => StoreError::Sqlite(err),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// The write pointed at a row that no longer exists, e.g. a purged staging author.
    pub fn is_dangling_reference(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, _))
                if code.extended_code == SQLITE_CONSTRAINT_FOREIGNKEY
        )
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("invalid url {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing element: {0}")]
    MissingElement(&'static str),
    #[error("invalid date {0:?}, expected \"Month DD, YYYY\"")]
    InvalidDate(String),
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("worker is not running")]
    WorkerUnavailable,
    #[error("unknown task handler: {0}")]
    UnknownHandler(String),
    #[error("task {0} does not exist")]
    NotFound(String),
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RareDropError {
    #[error("Connection error: {0}")]
    Connection(#[from] r2d2::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No backup found: {0}")]
    NoBackup(String),

    #[error("Backup tables are empty: {groups} group rows, {assignments} assignment rows")]
    EmptyBackup { groups: i64, assignments: i64 },

    #[error("Another run is already in progress")]
    Busy,

    #[error("Write failed on {table} batch {batch} after {rows_written} rows: {source}")]
    Write {
        table: &'static str,
        batch: usize,
        rows_written: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, RareDropError>;

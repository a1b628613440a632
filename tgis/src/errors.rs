use std::io;
use std::result;

use thiserror::Error as ThisError;

use crate::time::{TemporalType, TimeUnit};

#[derive(Debug, ThisError)]
pub enum Error {
    /// Conflicting or missing request parameters. Always raised before anything is written.
    #[error("invalid registration request: {0}")]
    Validation(String),

    #[error("{kind} <{name}> not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} <{name}> is ambiguous, it exists in mapsets {}", mapsets.join(", "))]
    Ambiguous {
        kind: &'static str,
        name: String,
        mapsets: Vec<String>,
    },

    #[error("map <{map}> has {found} time but space time dataset <{dataset}> uses {expected} time")]
    InconsistentTemporalKind {
        map: String,
        dataset: String,
        expected: TemporalType,
        found: TemporalType,
    },

    #[error("map <{map}> uses unit {found} but space time dataset <{dataset}> uses {expected}")]
    InconsistentUnit {
        map: String,
        dataset: String,
        expected: TimeUnit,
        found: TimeUnit,
    },

    #[error("map <{map}> has no valid time stamp and no start time was given")]
    MissingTimestamp { map: String },

    #[error("corrupt registry record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    IO(#[from] io::Error),
}

impl Error {
    pub(crate) fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn not_found<S: Into<String>>(kind: &'static str, name: S) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

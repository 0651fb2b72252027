use std::{
    error::Error,
    fmt::{Display, Formatter},
};

use crate::{pipeline::PipelineState, resource::ResourceKind};

/// Result type used throughout the library.
pub type ReliefResult<T> = Result<T, ReliefError>;

/// Everything that can go wrong while planning relief deliveries.
#[derive(Debug)]
pub enum ReliefError {
    /// Malformed input caught at the boundary, before anything was processed.
    InvalidInput(String),
    /// The ledger could not commit an update for a key within its retry budget.
    ConcurrencyExhausted {
        facility_id: String,
        resource: ResourceKind,
        attempts: u32,
    },
    /// A state machine was asked to make a move it does not allow.
    InvalidTransition {
        what: &'static str,
        from: &'static str,
        to: &'static str,
    },
    /// Error from the SQLite backed ledger store.
    Storage(rusqlite::Error),
    /// Error reading or writing a file.
    Io(std::io::Error),
    /// Error parsing or producing a JSON document.
    Parse(serde_json::Error),
    /// A pipeline stage hit an unrecoverable error.
    StageFailed {
        stage: PipelineState,
        cause: Box<ReliefError>,
    },
}

impl ReliefError {
    pub(crate) fn invalid<S: Into<String>>(msg: S) -> Self {
        ReliefError::InvalidInput(msg.into())
    }

    /// Is this an error the matcher treats as a failed step rather than a failed run?
    pub fn is_contention(&self) -> bool {
        matches!(self, ReliefError::ConcurrencyExhausted { .. })
    }
}

impl Display for ReliefError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        use ReliefError::*;

        match self {
            InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            ConcurrencyExhausted {
                facility_id,
                resource,
                attempts,
            } => write!(
                f,
                "gave up updating {} at {} after {} conflicting attempts",
                resource, facility_id, attempts
            ),
            InvalidTransition { what, from, to } => {
                write!(f, "{} cannot move from {} to {}", what, from, to)
            }
            Storage(err) => write!(f, "ledger storage error: {}", err),
            Io(err) => write!(f, "i/o error: {}", err),
            Parse(err) => write!(f, "parse error: {}", err),
            StageFailed { stage, cause } => {
                write!(f, "pipeline failed during {}: {}", stage.name(), cause)
            }
        }
    }
}

impl Error for ReliefError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use ReliefError::*;

        match self {
            Storage(err) => Some(err),
            Io(err) => Some(err),
            Parse(err) => Some(err),
            StageFailed { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for ReliefError {
    fn from(err: rusqlite::Error) -> Self {
        ReliefError::Storage(err)
    }
}

impl From<std::io::Error> for ReliefError {
    fn from(err: std::io::Error) -> Self {
        ReliefError::Io(err)
    }
}

impl From<serde_json::Error> for ReliefError {
    fn from(err: serde_json::Error) -> Self {
        ReliefError::Parse(err)
    }
}

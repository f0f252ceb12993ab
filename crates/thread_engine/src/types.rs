use std::fmt;

use thread_core::{Cursor, ItemId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Parse, message)
    }

    /// Whether another attempt at the same page might succeed.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            FailureKind::Timeout | FailureKind::Network => true,
            FailureKind::HttpStatus(code) => code == 429 || (500..600).contains(&code),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    Network,
    Decode,
    /// Page content did not have the expected shape.
    Parse,
    RetriesExhausted {
        attempts: u32,
        last: Box<FailureKind>,
    },
    /// The fetcher panicked while handling the page.
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Decode => write!(f, "decode error"),
            FailureKind::Parse => write!(f, "parse error"),
            FailureKind::RetriesExhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts ({last})")
            }
            FailureKind::Panicked => write!(f, "fetcher panicked"),
        }
    }
}

/// Progress notifications emitted while a harvest runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestEvent {
    TopLevelPage {
        page: usize,
        items: usize,
    },
    ChildPage {
        parent_id: ItemId,
        items: usize,
    },
    StreamAbandoned {
        parent_id: ItemId,
    },
    /// Every queued child job has been handled.
    Idle,
}

/// A child stream that was abandoned after a fetch failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamWarning {
    pub parent_id: ItemId,
    pub cursor: Cursor,
    pub error: FetchError,
}

impl fmt::Display for StreamWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "replies of {} abandoned at cursor {}: {}",
            self.parent_id, self.cursor, self.error
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    pub top_level_pages: usize,
    pub child_jobs_executed: u64,
    pub peak_concurrency: usize,
    pub warnings: Vec<StreamWarning>,
}

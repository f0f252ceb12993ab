use std::fmt;

use serde::{Deserialize, Serialize};

pub const THREAD_ID_LEN: usize = 11;

/// Identifier of the thread being harvested (a video id on the source site).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a thread id or thread URL: {0:?}")]
pub struct ThreadIdError(pub String);

impl ThreadId {
    /// Accepts a bare id or a URL carrying it after `v=` or a `/`.
    pub fn parse(input: &str) -> Result<Self, ThreadIdError> {
        let input = input.trim();
        if input.len() == THREAD_ID_LEN && input.bytes().all(is_id_byte) {
            return Ok(Self(input.to_string()));
        }

        let bytes = input.as_bytes();
        for i in 0..bytes.len() {
            let start = if bytes[i..].starts_with(b"v=") {
                i + 2
            } else if bytes[i] == b'/' {
                i + 1
            } else {
                continue;
            };
            if let Some(candidate) = bytes.get(start..start + THREAD_ID_LEN) {
                if candidate.iter().copied().all(is_id_byte) {
                    return Ok(Self(input[start..start + THREAD_ID_LEN].to_string()));
                }
            }
        }
        Err(ThreadIdError(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_id_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

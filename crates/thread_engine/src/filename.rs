use std::fmt::Write;

use sha2::{Digest, Sha256};
use thread_core::ThreadId;

/// Deterministic output name: `comments-{thread}.{extension}`.
///
/// Characters that are unsafe in file names are replaced; when that changes
/// the id, a short hash of the original is appended so distinct ids never
/// collide.
pub fn snapshot_filename(thread: &ThreadId, extension: &str) -> String {
    let raw = thread.as_str();
    let sanitized = sanitize(raw);
    if sanitized == raw {
        format!("comments-{sanitized}.{extension}")
    } else {
        format!("comments-{sanitized}--{}.{extension}", short_hash(raw))
    }
}

fn sanitize(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

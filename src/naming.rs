//! Deterministic names derived from filesystem paths.
//!
//! A root path maps to exactly one fingerprint actor and one vector-store
//! collection; each file under it maps to one fingerprint key. The embed and
//! query paths derive these independently, so every function here must be a
//! pure function of its input.
//!
//! Stripping and truncation can map two distinct roots to the same name
//! (e.g. `/a/b-c` and `/ab/c`). That collision risk is accepted.

use crate::error::{IndexError, Result};

/// Maximum length of a collection name.
pub const COLLECTION_NAME_MAX_LEN: usize = 36;

/// Chroma rejects collection names shorter than this.
pub const COLLECTION_NAME_MIN_LEN: usize = 3;

/// Fingerprint-store identity for a root: `.` and `/` removed, lowercased.
pub fn actor_id(path: &str) -> String {
    path.chars()
        .filter(|c| !matches!(c, '.' | '/'))
        .collect::<String>()
        .to_lowercase()
}

/// Vector-store collection identity for a root: `.`, `/` and `-` removed,
/// truncated to [`COLLECTION_NAME_MAX_LEN`] characters, lowercased.
pub fn collection_name(path: &str) -> String {
    path.chars()
        .filter(|c| !matches!(c, '.' | '/' | '-'))
        .take(COLLECTION_NAME_MAX_LEN)
        .collect::<String>()
        .to_lowercase()
}

/// [`collection_name`] for a root that is about to be embedded or queried.
///
/// Roots such as `.`, `./` or `/a` strip down to fewer than
/// [`COLLECTION_NAME_MIN_LEN`] characters and are rejected with
/// [`IndexError::InvalidRoot`]; pass an absolute path instead.
pub fn checked_collection_name(root: &str) -> Result<String> {
    let name = collection_name(root);
    if name.chars().count() < COLLECTION_NAME_MIN_LEN {
        return Err(IndexError::InvalidRoot {
            root: root.to_string(),
            reason: format!(
                "collection name '{}' must be at least {} characters; use an absolute path",
                name, COLLECTION_NAME_MIN_LEN
            ),
        });
    }
    Ok(name)
}

/// Per-file fingerprint key: every `.` becomes `__`, lowercased.
pub fn file_key(path: &str) -> String {
    path.replace('.', "__").to_lowercase()
}

//! Imported draw history.
//!
//! Plain-text files of previously recorded numbers, oldest first. Tokens
//! may be separated by whitespace, commas, or semicolons; `00` is accepted;
//! blank lines and `#` comments are ignored.

use std::path::Path;
use tracing::info;

use crate::types::{Pocket, SimError};

/// Parse history text into pockets.
pub fn parse_history(text: &str) -> Result<Vec<Pocket>, SimError> {
    let mut pockets = Vec::new();
    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.split('#').next().unwrap_or_default();
        for token in line.split(|c: char| c.is_whitespace() || c == ',' || c == ';') {
            if token.is_empty() {
                continue;
            }
            let pocket = token.parse::<Pocket>().map_err(|_| SimError::Import {
                line: idx + 1,
                message: format!("not a roulette number: {token:?}"),
            })?;
            pockets.push(pocket);
        }
    }
    Ok(pockets)
}

/// Load and parse a history file.
pub fn load_history(path: &Path) -> Result<Vec<Pocket>, SimError> {
    let text = std::fs::read_to_string(path)?;
    let pockets = parse_history(&text)?;
    info!(path = %path.display(), draws = pockets.len(), "History imported");
    Ok(pockets)
}

// Pattern matching on file names.

use crate::enumerate::FileRecord;
use crate::error::PurgeError;
use regex::Regex;

/// Compile the user's deletion pattern.
pub fn compile_pattern(pattern: &str) -> Result<Regex, PurgeError> {
    Regex::new(pattern).map_err(|source| PurgeError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Files whose name contains a match for `pattern`, in input order.
pub fn filter(files: &[FileRecord], pattern: &Regex) -> Vec<FileRecord> {
    files
        .iter()
        .filter(|f| pattern.is_match(&f.name))
        .cloned()
        .collect()
}

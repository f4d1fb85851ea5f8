//! Source locations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a syntax node in its source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLoc {
    pub line: u32,
    pub col: u32,
    pub file: String,
}

impl SourceLoc {
    pub fn new(line: u32, col: u32, file: impl Into<String>) -> Self {
        Self {
            line,
            col,
            file: file.into(),
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

//! Source location tracking for error reporting
//!
//! Debug locations travel inside function bodies so that address-space
//! errors can point back at the originating source line.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A location in a source file (line and column are 1-based)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub filename: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(filename: &str, line: u32, column: u32) -> Self {
        Self {
            filename: filename.to_string(),
            line,
            column,
        }
    }

    /// Location used when a body carries no debug info
    pub fn dummy() -> Self {
        Self::new("<unknown>", 0, 0)
    }

    pub fn is_dummy(&self) -> bool {
        self.line == 0 && self.column == 0
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line, self.column)
    }
}

/// A span in a source file (from start to end location)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl SourceSpan {
    pub fn new(start: SourceLocation, end: SourceLocation) -> Self {
        Self { start, end }
    }

    pub fn from_location(location: SourceLocation) -> Self {
        Self {
            end: location.clone(),
            start: location,
        }
    }

    pub fn dummy() -> Self {
        Self::from_location(SourceLocation::dummy())
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.filename != self.end.filename {
            write!(f, "{} to {}", self.start, self.end)
        } else if self.start == self.end {
            write!(f, "{}", self.start)
        } else if self.start.line == self.end.line {
            write!(
                f,
                "{}:{}:{}-{}",
                self.start.filename, self.start.line, self.start.column, self.end.column
            )
        } else {
            write!(
                f,
                "{}:{}:{}-{}:{}",
                self.start.filename, self.start.line, self.start.column, self.end.line, self.end.column
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        let loc = SourceLocation::new("kernel.rs", 12, 5);
        assert_eq!(format!("{}", loc), "kernel.rs:12:5");
        assert!(!loc.is_dummy());
        assert!(SourceLocation::dummy().is_dummy());
    }

    #[test]
    fn test_span_display() {
        let point = SourceSpan::from_location(SourceLocation::new("a.rs", 3, 4));
        assert_eq!(format!("{}", point), "a.rs:3:4");

        let line = SourceSpan::new(SourceLocation::new("a.rs", 3, 4), SourceLocation::new("a.rs", 3, 9));
        assert_eq!(format!("{}", line), "a.rs:3:4-9");

        let multi = SourceSpan::new(SourceLocation::new("a.rs", 3, 4), SourceLocation::new("a.rs", 5, 1));
        assert_eq!(format!("{}", multi), "a.rs:3:4-5:1");
    }
}

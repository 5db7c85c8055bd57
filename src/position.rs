use std::fmt::{self, Display};

/// A source position as reported by the front end.
///
/// The core never reads source text; positions only flow into generated
/// runtime error messages and statement comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    /// Used by synthesized AST nodes that have no source location.
    pub const UNKNOWN: Pos = Pos { line: 0, col: 0 };

    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }

    pub fn line(line: u32) -> Self {
        Self { line, col: 0 }
    }
}

impl Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

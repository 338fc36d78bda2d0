use smartstring::alias::String;
use thiserror::Error;

/// A 1-based line/column position in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number (character position in the line).
    pub column: usize,
}

impl Position {
    /// Creates a new `Position`.
    #[inline]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A half-open source range: `[start, end)`.
///
/// `Span` marks the region of source text a token covers, or attaches a
/// precise location to a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    /// Creates a new `Span`.
    #[inline]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Merge with another span by covering both.
    pub fn merge(&self, other: &Span) -> Span {
        let start = if self.start <= other.start {
            self.start
        } else {
            other.start
        };
        let end = if self.end >= other.end { self.end } else { other.end };
        Span { start, end }
    }

    /// Is this span empty (start == end)?
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns the inclusive line range spanned by this `Span`.
    #[inline]
    pub fn line_range(&self) -> (usize, usize) {
        (self.start.line, self.end.line)
    }
}

/// Errors produced while reading and tokenizing source text.
///
/// Every variant carries the source name and the 1-based line/column where
/// the problem was detected, so messages can be surfaced to the user
/// without further context. All variants are fatal to the parse attempt
/// that raised them; recovery (if any) is the caller's decision.
#[derive(Debug, Error)]
pub enum ScanError {
    /// An unexpected token against an expected-follower set.
    #[error("{source_name}:{line}:{column}: syntax error: found {found:?}, expected one of: {}", .expected.join(", "))]
    Syntax {
        source_name: String,
        line: usize,
        column: usize,
        /// Literal text of the offending token.
        found: String,
        /// Human-readable images of the acceptable alternatives.
        expected: Vec<String>,
    },

    /// A string, quoted atom, comment, or verbatim string ran off the end
    /// of its line or of the input before its closing delimiter.
    #[error("{source_name}:{line}:{column}: unterminated {what}")]
    UnterminatedLiteral {
        source_name: String,
        line: usize,
        column: usize,
        what: &'static str,
    },

    /// Unbalanced or illegally sequenced conditional-compilation blocks.
    #[error("{source_name}:{line}:{column}: {message}")]
    DirectiveNesting {
        source_name: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// The source could not be read. Distinct from syntax errors.
    #[error("{source_name}: read failure")]
    Io {
        source_name: String,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// The position the error was raised at, when it has one.
    pub fn position(&self) -> Option<Position> {
        match self {
            ScanError::Syntax { line, column, .. }
            | ScanError::UnterminatedLiteral { line, column, .. }
            | ScanError::DirectiveNesting { line, column, .. } => {
                Some(Position::new(*line, *column))
            }
            ScanError::Io { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_merge_covers_both() {
        let a = Span::new(Position::new(1, 1), Position::new(1, 5));
        let b = Span::new(Position::new(1, 3), Position::new(2, 2));
        let m = a.merge(&b);
        assert_eq!(m.start, Position::new(1, 1));
        assert_eq!(m.end, Position::new(2, 2));
        assert_eq!(m.line_range(), (1, 2));
        assert!(!m.is_empty());
    }

    #[test]
    fn syntax_error_lists_alternatives() {
        let e = ScanError::Syntax {
            source_name: "input".into(),
            line: 3,
            column: 7,
            found: "]".into(),
            expected: vec![",".into(), ")".into()],
        };
        let text = e.to_string();
        assert!(text.contains("input:3:7"));
        assert!(text.contains("\"]\""));
        assert!(text.contains(", \")\""));
        assert_eq!(e.position(), Some(Position::new(3, 7)));
    }
}

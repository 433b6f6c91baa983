use std::fmt;

/// Source location for error reporting.
///
/// `row` and `col` are 0-based; `Display` prints them 1-based.
/// `file` is the origin file name, set once and never overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub file: Option<String>,
    pub row: usize,
    pub col: usize,
}

impl Span {
    #[must_use]
    pub const fn new(row: usize, col: usize) -> Self {
        Self {
            file: None,
            row,
            col,
        }
    }

    /// Set the origin file unless one is already recorded.
    pub fn stamp(&mut self, file: &str) {
        if self.file.is_none() {
            self.file = Some(file.to_string());
        }
    }

    /// Return a copy carrying `file` as a fallback origin.
    #[must_use]
    pub fn in_file(&self, file: &str) -> Self {
        let mut span = self.clone();
        span.stamp(file);
        span
    }

    /// Shift a span produced by a nested tokenization to the absolute
    /// position of the nested slice.
    pub(crate) const fn shift(&mut self, base_row: usize, base_col: usize) {
        if self.row == 0 {
            self.col += base_col;
        }
        self.row += base_row;
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.row + 1, self.col + 1)?;
        if let Some(file) = &self.file {
            write!(f, " in {file}")?;
        }
        Ok(())
    }
}

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Literal text between commands.
    Raw,
    /// Command prefix (`\`).
    Prefix,
    /// Command name following the prefix.
    CommandName,
    /// Opening argument delimiter `{`.
    ArgStart,
    /// Closing argument delimiter `}`.
    ArgEnd,
    /// Opening parameter delimiter `[`.
    ParamStart,
    /// Closing parameter delimiter `]`.
    ParamEnd,
    /// Parameter separator `,`.
    ParamSep,
    /// Parameter assignment `=`.
    ParamAssign,
    /// Parameter key.
    ParamKey,
    /// Inline expression span, delimiters included (`` `...` ``).
    Expression,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Raw => "raw text",
            Self::Prefix => "command prefix",
            Self::CommandName => "command name",
            Self::ArgStart => "argument start",
            Self::ArgEnd => "argument end",
            Self::ParamStart => "parameter start",
            Self::ParamEnd => "parameter end",
            Self::ParamSep => "parameter separator",
            Self::ParamAssign => "parameter assignment",
            Self::ParamKey => "parameter key",
            Self::Expression => "inline expression",
        };
        f.write_str(name)
    }
}

/// A single token with its kind, exact source text, and location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_keeps_first_file() {
        let mut span = Span::new(0, 0);
        span.stamp("a.utpp");
        span.stamp("b.utpp");
        assert_eq!(span.file.as_deref(), Some("a.utpp"));
    }

    #[test]
    fn shift_only_moves_column_on_first_row() {
        let mut first = Span::new(0, 2);
        first.shift(3, 5);
        assert_eq!((first.row, first.col), (3, 7));

        let mut later = Span::new(1, 2);
        later.shift(3, 5);
        assert_eq!((later.row, later.col), (4, 2));
    }

    #[test]
    fn display_is_one_based() {
        let span = Span::new(0, 4).in_file("main.utpp");
        assert_eq!(span.to_string(), "line 1, column 5 in main.utpp");
    }
}

use std::fmt::Display;
use std::fmt::Formatter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    // Markers
    Eof,

    // Identifiers
    /// foo
    BareIdentifier,
    /// @foo
    AtIdentifier,

    // Literals
    /// 42
    Integer,
    /// "foo"
    String,

    // Punctuation
    /// ->
    Arrow,
    /// :
    Colon,
    /// ,
    Comma,
    /// .
    Dot,
    /// =
    Equal,
    /// ==
    EqualEqual,
    /// #
    Hash,
    /// (
    LParen,
    /// )
    RParen,
    /// {
    LBrace,
    /// }
    RBrace,
    /// -
    Minus,
    /// +
    Plus,
    /// *
    Star,
    /// ?
    Question,
    /// >
    Greater,
    /// <
    Less,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    /// The line number of the token.
    line: usize,
    /// The column number of the token.
    column: usize,
    /// The character location in the raw source string.
    start: usize,
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "loc(:{}:{})", self.line, self.column)
    }
}

impl Location {
    pub fn new(line: usize, column: usize, start: usize) -> Self {
        Self {
            line,
            column,
            start,
        }
    }
    pub fn line(&self) -> usize {
        self.line
    }
    pub fn column(&self) -> usize {
        self.column
    }
    pub fn start(&self) -> usize {
        self.start
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// The kind of token, such as `@foo` (AtIdentifier) or `42` (Integer).
    pub kind: TokenKind,
    /// The lexeme of the token, such as `@foo` or `42`.
    pub lexeme: String,
    pub location: Location,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: String, location: Location) -> Self {
        Self {
            kind,
            lexeme,
            location,
        }
    }
    pub fn line(&self) -> usize {
        self.location.line()
    }
    pub fn column(&self) -> usize {
        self.location.column()
    }
    /// Whether the token is the bare identifier `word`.
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::BareIdentifier && self.lexeme == word
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} \"{}\" {}", self.kind, self.lexeme, self.location)
    }
}

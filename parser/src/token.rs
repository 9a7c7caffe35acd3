/// Token types produced by the pipeline lexer.
use crate::span::Slice;

/// The kind of a lexical token.
///
/// Tokens carry no payload: literal values and names are recovered from
/// the token's [`Slice`] by whoever needs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Whitespace run. Never reaches the parser.
    Whitespace,
    /// A line comment `// ...`. Never reaches the parser.
    Comment,

    /// String literal including its quotes, e.g. `"hello"`.
    String,
    /// Integer literal, e.g. `42`, `-7`.
    Integer,
    /// Real literal, e.g. `3.5`, `-0.25`.
    Real,

    Import,
    External,
    Command,
    If,
    Else,
    ForEach,
    In,
    Return,
    True,
    False,

    /// `{`
    OpenCurly,
    /// `}`
    CloseCurly,
    /// `;`
    Semicolon,
    /// `,`
    Comma,
    /// `|`
    Pipe,
    /// `$$`: the tuple piped into the running command.
    Input,

    /// A command name, e.g. `print`.
    Identifier,
    /// A variable reference, e.g. `$count`.
    Variable,

    /// A character no scanner accepts.
    Error,
    /// End of input. Returned forever once reached.
    End,
}

impl TokenKind {
    /// Human-readable name for error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Whitespace => "whitespace",
            Self::Comment => "comment",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Real => "real number",
            Self::Import => "`import`",
            Self::External => "`external`",
            Self::Command => "`command`",
            Self::If => "`if`",
            Self::Else => "`else`",
            Self::ForEach => "`foreach`",
            Self::In => "`in`",
            Self::Return => "`return`",
            Self::True => "`true`",
            Self::False => "`false`",
            Self::OpenCurly => "`{`",
            Self::CloseCurly => "`}`",
            Self::Semicolon => "`;`",
            Self::Comma => "`,`",
            Self::Pipe => "`|`",
            Self::Input => "`$$`",
            Self::Identifier => "identifier",
            Self::Variable => "variable",
            Self::Error => "invalid character",
            Self::End => "end of input",
        }
    }

    /// Returns `true` for kinds the parser never sees.
    pub fn is_ignored(self) -> bool {
        matches!(self, Self::Whitespace | Self::Comment)
    }

    /// Tokens that can follow a command name as an explicit argument.
    pub fn is_argument(self) -> bool {
        matches!(
            self,
            Self::String | Self::Integer | Self::Real | Self::True | Self::False | Self::Variable
        )
    }

    /// Returns `true` for kinds that can start a statement. Used to
    /// resynchronize after a hard error.
    pub fn starts_statement(self) -> bool {
        matches!(
            self,
            Self::Import
                | Self::External
                | Self::Command
                | Self::If
                | Self::ForEach
                | Self::Return
                | Self::OpenCurly
        )
    }
}

/// A token with its source slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub slice: Slice,
}

impl Token {
    pub const fn new(kind: TokenKind, slice: Slice) -> Self {
        Self { kind, slice }
    }

    pub fn is_end(&self) -> bool {
        matches!(self.kind, TokenKind::End)
    }

    /// The source text of this token.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        self.slice.text(source)
    }
}

use std::fmt;

use bytecode::{Assembly, SourceLocation};

/// How a compile error affects the rest of the compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Recorded; compilation carries on normally.
    Soft,
    /// Recorded; every further error is suppressed until the next
    /// statement boundary.
    Hard,
}

/// What went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileErrorReason {
    // ── lexical ───────────────────────────────────────────────
    InvalidCharacter,
    SourceTooLong,

    // ── syntactic ─────────────────────────────────────────────
    ExpectedExpression,
    ExpectedSemicolon,
    ExpectedOpenCurly,
    ExpectedCloseCurly,
    ExpectedCommandKeyword,
    ExpectedCommandName,
    ExpectedParameterCount,
    ExpectedVariable,
    ExpectedIn,
    ExpectedImportPath,
    ExpectedPipeTarget,

    // ── semantic ──────────────────────────────────────────────
    UndefinedVariable { name: String },
    VariableOutsideCommandScope { name: String },
    UnreadVariable { name: String },
    UnwrittenVariable { name: String },
    UnresolvedCommand { name: String },
    WrongArgumentCount { name: String, expected: u8, got: usize },
    DuplicateCommand { name: String },
    DuplicateParameter { name: String },
    DuplicateTarget { name: String },
    MixedDestructuring,
    TooManyTargets,
    TooManyLocals,
    TooManyParameters,
    TooManyLiterals,
    TooManyCommands,
    TooManyCommandInstances,
    InvalidParameterCount,
    IntegerOutOfRange,
    InvalidEscape,
    JumpTooFar,
    NestedCommand,
    StatementInImport,
    UnresolvedImport { uri: String },
}

impl fmt::Display for CompileErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCharacter => write!(f, "invalid character"),
            Self::SourceTooLong => write!(f, "source is longer than {} bytes", u16::MAX),
            Self::ExpectedExpression => write!(f, "expected an expression"),
            Self::ExpectedSemicolon => write!(f, "expected `;` after statement"),
            Self::ExpectedOpenCurly => write!(f, "expected `{{`"),
            Self::ExpectedCloseCurly => write!(f, "expected `}}`"),
            Self::ExpectedCommandKeyword => write!(f, "expected `command` after `external`"),
            Self::ExpectedCommandName => write!(f, "expected a command name"),
            Self::ExpectedParameterCount => write!(f, "expected a parameter count"),
            Self::ExpectedVariable => write!(f, "expected a variable"),
            Self::ExpectedIn => write!(f, "expected `in`"),
            Self::ExpectedImportPath => write!(f, "expected an import path string"),
            Self::ExpectedPipeTarget => write!(f, "expected a command or variables after `|`"),
            Self::UndefinedVariable { name } => write!(f, "undefined variable `{name}`"),
            Self::VariableOutsideCommandScope { name } => {
                write!(f, "cannot access variable `{name}` outside of command scope")
            }
            Self::UnreadVariable { name } => write!(f, "variable `{name}` is never read"),
            Self::UnwrittenVariable { name } => write!(f, "variable `{name}` is never written"),
            Self::UnresolvedCommand { name } => write!(f, "unresolved command `{name}`"),
            Self::WrongArgumentCount {
                name,
                expected,
                got,
            } => write!(
                f,
                "command `{name}` expects {expected} argument(s), got {got}"
            ),
            Self::DuplicateCommand { name } => write!(f, "command `{name}` is already defined"),
            Self::DuplicateParameter { name } => write!(f, "duplicate parameter `{name}`"),
            Self::DuplicateTarget { name } => write!(f, "`{name}` is assigned twice"),
            Self::MixedDestructuring => write!(
                f,
                "cannot mix new and existing variables in one destructuring"
            ),
            Self::TooManyTargets => write!(f, "too many assignment targets (max 255)"),
            Self::TooManyLocals => write!(f, "too many local variables in one command (max 256)"),
            Self::TooManyParameters => write!(f, "too many parameters (max 255)"),
            Self::TooManyLiterals => write!(f, "too many literals in one assembly"),
            Self::TooManyCommands => write!(f, "too many commands in one assembly"),
            Self::TooManyCommandInstances => write!(f, "too many external command call sites"),
            Self::InvalidParameterCount => write!(f, "parameter count must be 0..=255"),
            Self::IntegerOutOfRange => write!(f, "integer literal does not fit in 32 bits"),
            Self::InvalidEscape => write!(f, "unknown escape sequence"),
            Self::JumpTooFar => write!(f, "jump distance exceeds 65535 bytes"),
            Self::NestedCommand => write!(f, "commands may only be declared at the top level"),
            Self::StatementInImport => {
                write!(f, "imported sources may only contain declarations")
            }
            Self::UnresolvedImport { uri } => write!(f, "cannot resolve import `{uri}`"),
        }
    }
}

/// A diagnostic produced while compiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub reason: CompileErrorReason,
    pub severity: Severity,
    pub location: SourceLocation,
}

impl CompileError {
    pub fn is_hard(&self) -> bool {
        self.severity == Severity::Hard
    }

    /// `error: message` followed by the highlighted location.
    pub fn render(&self, assembly: &Assembly) -> String {
        format!("error: {}\n{}", self.reason, assembly.highlight(self.location))
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location.slice, self.reason)
    }
}

impl std::error::Error for CompileError {}

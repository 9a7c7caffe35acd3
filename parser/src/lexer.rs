/// Table-driven longest-match lexer for pipeline source text.
///
/// Every registered scanner is run against the current position and the
/// longest match wins; on a tie the scanner registered first wins, which is
/// how keywords beat identifiers of the same length. Whitespace and comment
/// scanners take part in the length contest like any other, but their
/// tokens are dropped instead of returned.
///
/// # Comment syntax
///
/// | Syntax  | Kind         | Notes               |
/// |---------|--------------|---------------------|
/// | `// …`  | Line comment | Runs to end of line |
///
/// When no scanner matches, exactly one character is consumed as an
/// [`TokenKind::Error`] token so the parser can report it and keep going.
use crate::span::Slice;
use crate::token::{Token, TokenKind};

// ═══════════════════════════════════════════════════════════════════
// Scanner table
// ═══════════════════════════════════════════════════════════════════

/// How a scanner decides the length of its match.
#[derive(Clone, Copy)]
enum Rule {
    /// Matches exactly this text.
    Exact(&'static str),
    /// Returns the length of the match at the start of the input, 0 for none.
    Scan(fn(&[u8]) -> usize),
}

impl Rule {
    fn match_len(self, rest: &[u8]) -> usize {
        match self {
            Rule::Exact(text) if rest.starts_with(text.as_bytes()) => text.len(),
            Rule::Exact(_) => 0,
            Rule::Scan(scan) => scan(rest),
        }
    }
}

#[derive(Clone, Copy)]
struct Scanner {
    kind: TokenKind,
    rule: Rule,
}

const fn exact(kind: TokenKind, text: &'static str) -> Scanner {
    Scanner {
        kind,
        rule: Rule::Exact(text),
    }
}

const fn scan(kind: TokenKind, f: fn(&[u8]) -> usize) -> Scanner {
    Scanner {
        kind,
        rule: Rule::Scan(f),
    }
}

/// Registration order matters: earlier entries win ties.
const SCANNERS: &[Scanner] = &[
    scan(TokenKind::Whitespace, scan_whitespace),
    scan(TokenKind::Comment, scan_comment),
    scan(TokenKind::String, scan_string),
    scan(TokenKind::Integer, scan_integer),
    scan(TokenKind::Real, scan_real),
    exact(TokenKind::Import, "import"),
    exact(TokenKind::External, "external"),
    exact(TokenKind::Command, "command"),
    exact(TokenKind::If, "if"),
    exact(TokenKind::Else, "else"),
    exact(TokenKind::ForEach, "foreach"),
    exact(TokenKind::In, "in"),
    exact(TokenKind::Return, "return"),
    exact(TokenKind::True, "true"),
    exact(TokenKind::False, "false"),
    exact(TokenKind::OpenCurly, "{"),
    exact(TokenKind::CloseCurly, "}"),
    exact(TokenKind::Semicolon, ";"),
    exact(TokenKind::Comma, ","),
    exact(TokenKind::Pipe, "|"),
    exact(TokenKind::Input, "$$"),
    scan(TokenKind::Identifier, scan_identifier),
    scan(TokenKind::Variable, scan_variable),
];

// ───────────────────────────────────────────────────────────
//  Scanners
// ───────────────────────────────────────────────────────────

fn scan_whitespace(rest: &[u8]) -> usize {
    rest.iter()
        .take_while(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .count()
}

fn scan_comment(rest: &[u8]) -> usize {
    if !rest.starts_with(b"//") {
        return 0;
    }
    rest.iter().take_while(|&&b| b != b'\n').count()
}

/// `"…"` with backslash escapes. An unterminated string does not match.
fn scan_string(rest: &[u8]) -> usize {
    if rest.first() != Some(&b'"') {
        return 0;
    }
    let mut i = 1;
    while i < rest.len() {
        match rest[i] {
            b'"' => return i + 1,
            b'\\' => i += 2,
            _ => i += 1,
        }
    }
    0
}

fn count_digits(rest: &[u8]) -> usize {
    rest.iter().take_while(|b| b.is_ascii_digit()).count()
}

fn scan_integer(rest: &[u8]) -> usize {
    let sign = usize::from(rest.first() == Some(&b'-'));
    let digits = count_digits(&rest[sign..]);
    if digits == 0 { 0 } else { sign + digits }
}

fn scan_real(rest: &[u8]) -> usize {
    let whole = scan_integer(rest);
    if whole == 0 || rest.get(whole) != Some(&b'.') {
        return 0;
    }
    let fraction = count_digits(&rest[whole + 1..]);
    if fraction == 0 { 0 } else { whole + 1 + fraction }
}

fn is_identifier_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_identifier_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn scan_identifier(rest: &[u8]) -> usize {
    match rest.first() {
        Some(&b) if is_identifier_start(b) => {
            1 + rest[1..]
                .iter()
                .take_while(|&&b| is_identifier_continue(b))
                .count()
        }
        _ => 0,
    }
}

fn scan_variable(rest: &[u8]) -> usize {
    if rest.first() != Some(&b'$') {
        return 0;
    }
    match scan_identifier(&rest[1..]) {
        0 => 0,
        name => 1 + name,
    }
}

// ═══════════════════════════════════════════════════════════════════
// Lexer
// ═══════════════════════════════════════════════════════════════════

/// A lexer over an in-memory source string.
///
/// ```rust
/// use parser::{Lexer, TokenKind};
///
/// let kinds: Vec<_> = Lexer::new("1, 2 | print;").map(|t| t.kind).collect();
/// assert_eq!(kinds.last(), Some(&TokenKind::End));
/// ```
#[derive(Debug, Clone)]
pub struct Lexer<'src> {
    source: &'src str,
    position: usize,
    emitted_end: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            position: 0,
            emitted_end: false,
        }
    }

    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Produce the next non-ignored token. Returns [`TokenKind::End`]
    /// forever once the input is exhausted.
    pub fn next_token(&mut self) -> Token {
        loop {
            let rest = &self.source.as_bytes()[self.position..];
            if rest.is_empty() {
                return Token::new(TokenKind::End, Slice::from_range(self.position, self.position));
            }

            let (length, kind) = longest_match(rest);
            let (length, kind) = if length == 0 {
                (self.current_char_len(), TokenKind::Error)
            } else {
                (length, kind)
            };

            let start = self.position;
            self.position += length;
            if kind.is_ignored() {
                continue;
            }
            return Token::new(kind, Slice::from_range(start, self.position));
        }
    }

    /// Byte length of the character at the cursor, so error tokens never
    /// split a UTF-8 sequence.
    fn current_char_len(&self) -> usize {
        self.source[self.position..]
            .chars()
            .next()
            .map_or(1, char::len_utf8)
    }
}

fn longest_match(rest: &[u8]) -> (usize, TokenKind) {
    let mut best = (0, TokenKind::Error);
    for scanner in SCANNERS {
        let length = scanner.rule.match_len(rest);
        if length > best.0 {
            best = (length, scanner.kind);
        }
    }
    best
}

/// Yields every token up to and including the first `End`.
impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.emitted_end {
            return None;
        }
        let token = self.next_token();
        if token.is_end() {
            self.emitted_end = true;
        }
        Some(token)
    }
}

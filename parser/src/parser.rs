use crate::lexer::Lexer;
use crate::span::Slice;
use crate::token::{Token, TokenKind};

/// Receives the errors the parser detects.
///
/// The parser never raises: lexical errors and expected-token mismatches
/// are funneled through the sink so they land in the same diagnostic list
/// as everything the grammar driver reports.
pub trait ErrorSink {
    /// A tagged reason for an expected-token mismatch.
    type Reason;

    /// An [`TokenKind::Error`] token was skipped.
    fn lexical_error(&mut self, token: Token);

    /// A required token was missing. `found` is the offending token.
    fn hard_error(&mut self, reason: Self::Reason, found: Token);
}

/// Stateful cursor over the token stream with one token of lookahead.
#[derive(Debug, Clone)]
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    previous: Token,
    current: Token,
}

impl<'src> Parser<'src> {
    /// Create a parser positioned *before* the first token. Call
    /// [`next`](Self::next) once to load it.
    pub fn new(source: &'src str) -> Self {
        let start = Token::new(TokenKind::End, Slice::point(0));
        Self {
            lexer: Lexer::new(source),
            previous: start,
            current: start,
        }
    }

    pub fn source(&self) -> &'src str {
        self.lexer.source()
    }

    pub fn previous(&self) -> Token {
        self.previous
    }

    pub fn current(&self) -> Token {
        self.current
    }

    /// Source text of the previous token.
    pub fn previous_text(&self) -> &'src str {
        self.previous.slice.text(self.lexer.source())
    }

    /// Advance by one token, reporting and skipping error tokens.
    pub fn next<S: ErrorSink>(&mut self, sink: &mut S) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            sink.lexical_error(self.current);
        }
    }

    pub fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    /// Advance if the current token is `kind`.
    pub fn match_kind<S: ErrorSink>(&mut self, kind: TokenKind, sink: &mut S) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.next(sink);
        true
    }

    /// Require `kind`. On a mismatch `reason` goes to the sink as a hard
    /// error, but the parser still advances so parsing can continue.
    pub fn consume<S: ErrorSink>(&mut self, kind: TokenKind, reason: S::Reason, sink: &mut S) {
        if !self.check(kind) {
            sink.hard_error(reason, self.current);
        }
        self.next(sink);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Precedence climbing
// ═══════════════════════════════════════════════════════════════════

/// Binding strength of infix rules, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    /// `a, b`: tuple concatenation.
    Comma,
    Primary,
}

impl Precedence {
    /// The next-stronger level, used for left-associative infix operands.
    pub fn next(self) -> Self {
        match self {
            Self::None => Self::Comma,
            Self::Comma | Self::Primary => Self::Primary,
        }
    }
}

/// One row of the precedence table.
pub struct ParseRule<G> {
    pub prefix: Option<fn(&mut G)>,
    pub infix: Option<fn(&mut G)>,
    pub precedence: Precedence,
}

impl<G> ParseRule<G> {
    pub const fn new(
        prefix: Option<fn(&mut G)>,
        infix: Option<fn(&mut G)>,
        precedence: Precedence,
    ) -> Self {
        Self {
            prefix,
            infix,
            precedence,
        }
    }

    pub const fn empty() -> Self {
        Self::new(None, None, Precedence::None)
    }
}

/// A grammar driver that plugs rule functions into
/// [`parse_with_precedence`].
pub trait Grammar<'src>: Sized {
    fn parser(&self) -> &Parser<'src>;

    /// Advance the underlying parser, reporting lexical errors.
    fn advance(&mut self);

    /// The table row for a token kind.
    fn rule(kind: TokenKind) -> ParseRule<Self>;

    /// Called when the token that should start an expression has no
    /// prefix rule.
    fn missing_prefix(&mut self, found: Token);
}

/// Parse one expression whose infix operators bind at least as strongly
/// as `precedence`.
pub fn parse_with_precedence<'src, G: Grammar<'src>>(grammar: &mut G, precedence: Precedence) {
    let found = grammar.parser().current();
    let Some(prefix) = G::rule(found.kind).prefix else {
        grammar.missing_prefix(found);
        return;
    };
    grammar.advance();
    prefix(grammar);

    while precedence <= G::rule(grammar.parser().current().kind).precedence {
        grammar.advance();
        if let Some(infix) = G::rule(grammar.parser().previous().kind).infix {
            infix(grammar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect {
        lexical: Vec<Slice>,
        hard: Vec<(&'static str, TokenKind)>,
    }

    impl ErrorSink for Collect {
        type Reason = &'static str;

        fn lexical_error(&mut self, token: Token) {
            self.lexical.push(token.slice);
        }

        fn hard_error(&mut self, reason: &'static str, found: Token) {
            self.hard.push((reason, found.kind));
        }
    }

    #[test]
    fn next_skips_and_reports_error_tokens() {
        let mut sink = Collect::default();
        let mut parser = Parser::new("a @ # b");
        parser.next(&mut sink);
        assert_eq!(parser.current().kind, TokenKind::Identifier);
        parser.next(&mut sink);
        assert_eq!(parser.current().kind, TokenKind::Identifier);
        assert_eq!(parser.current().slice, Slice::new(6, 1));
        assert_eq!(sink.lexical, vec![Slice::new(2, 1), Slice::new(4, 1)]);
    }

    #[test]
    fn consume_reports_but_still_advances() {
        let mut sink = Collect::default();
        let mut parser = Parser::new("a b;");
        parser.next(&mut sink);
        parser.next(&mut sink);
        parser.next(&mut sink);
        assert_eq!(parser.current().kind, TokenKind::Semicolon);
        parser.consume(TokenKind::Semicolon, "expected `;`", &mut sink);
        assert!(sink.hard.is_empty());

        let mut parser = Parser::new("a b");
        parser.next(&mut sink);
        parser.consume(TokenKind::Semicolon, "expected `;`", &mut sink);
        assert_eq!(sink.hard, vec![("expected `;`", TokenKind::Identifier)]);
        assert_eq!(parser.current().kind, TokenKind::Identifier);
        assert_eq!(parser.previous_text(), "a");
    }

    #[test]
    fn match_kind_only_advances_on_match() {
        let mut sink = Collect::default();
        let mut parser = Parser::new("| x");
        parser.next(&mut sink);
        assert!(!parser.match_kind(TokenKind::Comma, &mut sink));
        assert!(parser.match_kind(TokenKind::Pipe, &mut sink));
        assert!(parser.check(TokenKind::Identifier));
    }

    // ── Precedence climbing over a toy grammar ────────────────

    /// Renders `1, 2, 3` as `((1 2 ,) 3 ,)`-style postfix text.
    struct Postfix<'src> {
        parser: Parser<'src>,
        sink: Collect,
        out: Vec<String>,
    }

    impl<'src> Postfix<'src> {
        fn number(&mut self) {
            let text = self.parser.previous_text().to_string();
            self.out.push(text);
        }

        fn comma(&mut self) {
            parse_with_precedence(self, Precedence::Comma.next());
            self.out.push(",".to_string());
        }
    }

    impl<'src> Grammar<'src> for Postfix<'src> {
        fn parser(&self) -> &Parser<'src> {
            &self.parser
        }

        fn advance(&mut self) {
            self.parser.next(&mut self.sink);
        }

        fn rule(kind: TokenKind) -> ParseRule<Self> {
            match kind {
                TokenKind::Integer => ParseRule::new(Some(Self::number), None, Precedence::None),
                TokenKind::Comma => ParseRule::new(None, Some(Self::comma), Precedence::Comma),
                _ => ParseRule::empty(),
            }
        }

        fn missing_prefix(&mut self, found: Token) {
            self.sink.hard.push(("expected expression", found.kind));
        }
    }

    fn postfix(src: &str) -> (Vec<String>, Vec<(&'static str, TokenKind)>) {
        let mut grammar = Postfix {
            parser: Parser::new(src),
            sink: Collect::default(),
            out: Vec::new(),
        };
        grammar.advance();
        parse_with_precedence(&mut grammar, Precedence::Comma);
        (grammar.out, grammar.sink.hard)
    }

    #[test]
    fn comma_is_left_associative() {
        let (out, errors) = postfix("1, 2, 3");
        assert_eq!(out, vec!["1", "2", ",", "3", ","]);
        assert!(errors.is_empty());
    }

    #[test]
    fn missing_prefix_is_reported() {
        let (out, errors) = postfix("1, ;");
        assert_eq!(out, vec!["1", ","]);
        assert_eq!(errors, vec![("expected expression", TokenKind::Semicolon)]);
    }
}

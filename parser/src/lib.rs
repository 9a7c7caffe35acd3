//! # Parser
//!
//! Lexical and syntactic front end for the pipeline language.
//!
//! ## Architecture
//!
//! ```text
//!  &str source
//!      │
//!      ▼
//!  ┌────────┐   Token stream   ┌────────┐   rule callbacks   ┌──────────────┐
//!  │ Lexer  │ ───────────────▶ │ Parser │ ─────────────────▶ │ Grammar impl │
//!  └────────┘ (longest match)  └────────┘ (precedence table) └──────────────┘
//! ```
//!
//! There is no syntax tree: the grammar driver (the compiler) emits code
//! directly from the rule callbacks, reading literal text back out of each
//! token's [`Slice`].
//!
//! ```rust
//! use parser::{Lexer, TokenKind};
//!
//! let source = "1, 2 | print;";
//! let kinds: Vec<TokenKind> = Lexer::new(source).map(|t| t.kind).collect();
//! assert_eq!(kinds[0], TokenKind::Integer);
//! assert_eq!(kinds[3], TokenKind::Pipe);
//! ```

pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;

pub use lexer::Lexer;
pub use parser::{ErrorSink, Grammar, ParseRule, Parser, Precedence, parse_with_precedence};
pub use span::Slice;
pub use token::{Token, TokenKind};

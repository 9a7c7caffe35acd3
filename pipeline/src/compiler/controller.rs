use bytecode::{
    CommandDefinition, ExternalCommandDefinition, ExternalCommandInstance, SourceLocation, Value,
};
use parser::{
    ErrorSink, Grammar, ParseRule, Parser, Precedence, Slice, Token, TokenKind,
    parse_with_precedence,
};

use super::error::CompileErrorReason as Reason;
use super::scope::ScopeKind;
use super::{CompilerCore, Resolution};

/// Routes parser diagnostics into the compiler's error list.
struct Sink<'c, 'o> {
    core: &'c mut CompilerCore<'o>,
    source: u16,
}

impl ErrorSink for Sink<'_, '_> {
    type Reason = Reason;

    fn lexical_error(&mut self, token: Token) {
        let location = SourceLocation::new(self.source, token.slice);
        self.core.soft(Reason::InvalidCharacter, location);
    }

    fn hard_error(&mut self, reason: Reason, found: Token) {
        let location = SourceLocation::new(self.source, found.slice);
        self.core.hard(reason, location);
    }
}

/// Recursive-descent driver for one source text.
pub(super) struct Controller<'c, 'o, 'src> {
    core: &'c mut CompilerCore<'o>,
    parser: Parser<'src>,
    /// Index of this source in the assembly's source list.
    source: u16,
    /// Imported sources may only declare things.
    is_import: bool,
    /// Scope depth of this source's top level.
    top_depth: usize,
}

impl<'c, 'o, 'src> Controller<'c, 'o, 'src> {
    pub(super) fn new(
        core: &'c mut CompilerCore<'o>,
        text: &'src str,
        source: u16,
        is_import: bool,
    ) -> Self {
        let top_depth = core.scope_depth();
        Self {
            core,
            parser: Parser::new(text),
            source,
            is_import,
            top_depth,
        }
    }

    /// Compile every declaration up to the end of the source.
    pub(super) fn compile_declarations(&mut self) {
        if self.parser.source().len() > u16::MAX as usize {
            let location = SourceLocation::new(self.source, Slice::point(0));
            self.core.hard(Reason::SourceTooLong, location);
            return;
        }

        self.advance();
        while !self.check(TokenKind::End) {
            self.declaration();
        }
    }

    // ── token plumbing ─────────────────────────────────────────────

    fn location(&self, token: Token) -> SourceLocation {
        SourceLocation::new(self.source, token.slice)
    }

    fn text(&self, token: Token) -> &'src str {
        token.slice.text(self.parser.source())
    }

    /// Attribute subsequently emitted bytes to `token`.
    fn mark(&mut self, token: Token) {
        let location = self.location(token);
        self.core.builder.set_location(location);
    }

    fn previous(&self) -> Token {
        self.parser.previous()
    }

    fn current(&self) -> Token {
        self.parser.current()
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.parser.check(kind)
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, reason: Reason) {
        let mut sink = Sink {
            core: &mut *self.core,
            source: self.source,
        };
        self.parser.consume(kind, reason, &mut sink);
        self.mark(self.parser.previous());
    }

    fn soft(&mut self, reason: Reason, token: Token) {
        let location = self.location(token);
        self.core.soft(reason, location);
    }

    /// Skip to a likely statement start after a hard error, then leave
    /// panic mode.
    fn synchronize(&mut self) {
        while !self.check(TokenKind::End) {
            if self.previous().kind == TokenKind::Semicolon {
                break;
            }
            let current = self.current().kind;
            if current.starts_statement() || current == TokenKind::CloseCurly {
                break;
            }
            self.advance();
        }
        self.core.panic_mode = false;
    }

    // ═══════════════════════════════════════════════════════════════
    // Declarations
    // ═══════════════════════════════════════════════════════════════

    fn declaration(&mut self) {
        if self.matches(TokenKind::Import) {
            self.import_declaration();
        } else if self.matches(TokenKind::External) {
            self.external_declaration();
        } else if self.matches(TokenKind::Command) {
            self.command_declaration();
        } else {
            if self.is_import && self.core.scope_depth() == self.top_depth {
                self.soft(Reason::StatementInImport, self.current());
            }
            self.statement();
        }

        if self.core.panic_mode {
            self.synchronize();
        }
    }

    fn import_declaration(&mut self) {
        self.consume(TokenKind::String, Reason::ExpectedImportPath);
        let path = self.previous();
        self.consume(TokenKind::Semicolon, Reason::ExpectedSemicolon);
        if path.kind != TokenKind::String {
            return;
        }

        let uri = self.unescape(path);
        let location = self.location(path);
        if !self.core.imported.insert(uri.clone()) {
            log::debug!("import {uri}: already imported");
            return;
        }

        if self.core.library.is_some_and(|library| library.contains(&uri)) {
            log::debug!("import {uri}: linked as dependency");
            if !self.core.assembly.dependencies.contains(&uri) {
                self.core.assembly.dependencies.push(uri);
            }
            return;
        }

        let Some(text) = self.core.loader.and_then(|loader| loader.load(&uri)) else {
            self.core.soft(Reason::UnresolvedImport { uri }, location);
            return;
        };
        log::debug!("import {uri}: inlining {} bytes", text.len());
        let index = self.core.add_source(&uri, &text);
        Controller::new(&mut *self.core, &text, index, true).compile_declarations();
    }

    /// `external command NAME N;`
    fn external_declaration(&mut self) {
        self.consume(TokenKind::Command, Reason::ExpectedCommandKeyword);
        self.consume(TokenKind::Identifier, Reason::ExpectedCommandName);
        let name = self.previous();
        self.consume(TokenKind::Integer, Reason::ExpectedParameterCount);
        let count = self.previous();
        self.consume(TokenKind::Semicolon, Reason::ExpectedSemicolon);
        if name.kind != TokenKind::Identifier || count.kind != TokenKind::Integer {
            return;
        }

        let Ok(parameter_count) = self.text(count).parse::<u8>() else {
            self.soft(Reason::InvalidParameterCount, count);
            return;
        };
        let text = self.text(name);
        if self.core.name_taken(text) {
            self.soft(
                Reason::DuplicateCommand {
                    name: text.to_string(),
                },
                name,
            );
            return;
        }
        let location = self.location(name);
        self.core
            .assembly
            .external_commands
            .push(ExternalCommandDefinition {
                name: text.to_string(),
                parameter_count,
                location,
            });
    }

    /// `command NAME $p0 $p1 { ... }`
    fn command_declaration(&mut self) {
        let keyword = self.previous();
        self.consume(TokenKind::Identifier, Reason::ExpectedCommandName);
        let name = self.previous();
        if self.core.scope_depth() > 1 {
            self.soft(Reason::NestedCommand, keyword);
        }

        let mut parameters = Vec::new();
        while self.matches(TokenKind::Variable) {
            parameters.push(self.previous());
        }
        let parameter_count = u8::try_from(parameters.len()).unwrap_or_else(|_| {
            self.soft(Reason::TooManyParameters, name);
            u8::MAX
        });

        self.mark(keyword);
        let skip = self.core.builder.jump_forward();
        let entry = self.core.builder.current_offset();

        if name.kind == TokenKind::Identifier {
            let text = self.text(name);
            if self.core.name_taken(text) {
                self.soft(
                    Reason::DuplicateCommand {
                        name: text.to_string(),
                    },
                    name,
                );
            } else if self.core.assembly.commands.len() > u16::MAX as usize {
                self.soft(Reason::TooManyCommands, name);
            } else {
                let location = self.location(name);
                self.core.assembly.commands.push(CommandDefinition {
                    name: text.to_string(),
                    entry,
                    parameter_count,
                    location,
                });
            }
        }

        let saved = self.core.begin_command();
        self.core.begin_scope(ScopeKind::CommandBody);
        for (i, &parameter) in parameters.iter().enumerate() {
            let text = self.text(parameter);
            if parameters[..i].iter().any(|&p| self.text(p) == text) {
                self.soft(
                    Reason::DuplicateParameter {
                        name: text.to_string(),
                    },
                    parameter,
                );
            }
            let location = self.location(parameter);
            self.core.add_variable(text, location);
        }
        self.core.mark_last_written(parameters.len());

        self.consume(TokenKind::OpenCurly, Reason::ExpectedOpenCurly);
        self.block_body();
        self.core.builder.push_empty_tuple();
        self.core.builder.return_();
        self.core.end_scope();
        self.core.end_command(saved);
        self.core.bind(skip);
    }

    // ═══════════════════════════════════════════════════════════════
    // Statements
    // ═══════════════════════════════════════════════════════════════

    fn statement(&mut self) {
        self.mark(self.current());
        self.core.debug_hook();

        if self.matches(TokenKind::If) {
            self.if_statement();
        } else if self.matches(TokenKind::ForEach) {
            self.foreach_statement();
        } else if self.matches(TokenKind::Return) {
            self.return_statement();
        } else if self.check(TokenKind::OpenCurly) {
            self.block();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        self.consume(TokenKind::OpenCurly, Reason::ExpectedOpenCurly);
        self.core.begin_scope(ScopeKind::Normal);
        self.block_body();
        self.core.end_scope();
    }

    /// Declarations up to and including the closing `}`.
    fn block_body(&mut self) {
        while !self.check(TokenKind::CloseCurly) && !self.check(TokenKind::End) {
            self.declaration();
        }
        self.consume(TokenKind::CloseCurly, Reason::ExpectedCloseCurly);
    }

    fn if_statement(&mut self) {
        let keyword = self.previous();
        self.pipeline(false);
        self.mark(keyword);
        let then_jump = self.core.builder.if_condition_jump();
        self.block();

        if self.matches(TokenKind::Else) {
            self.mark(self.previous());
            let end = self.core.builder.jump_forward();
            self.core.bind(then_jump);
            if self.matches(TokenKind::If) {
                self.if_statement();
            } else {
                self.block();
            }
            self.core.bind(end);
        } else {
            self.core.bind(then_jump);
        }
    }

    /// `foreach $v in pipeline { ... }`
    ///
    /// ```text
    ///         [PushEmptyTuple; PopTupleKeeping K]   outermost loop only
    ///         <iterable>
    /// top:    ForEachConditionJump $v exit
    ///         <body>
    ///         JumpBackward top
    /// exit:   [Pop × K]                             outermost loop only
    /// ```
    fn foreach_statement(&mut self) {
        let keyword = self.previous();
        self.consume(TokenKind::Variable, Reason::ExpectedVariable);
        let variable = self.previous();
        self.consume(TokenKind::In, Reason::ExpectedIn);

        self.mark(keyword);
        let owns_reservation = self.core.begin_reservation();
        self.pipeline(false);

        self.mark(keyword);
        self.core.begin_scope(ScopeKind::IterationBody);
        let (name, location) = (self.text(variable), self.location(variable));
        let slot = self.core.add_variable(name, location);
        self.core.mark_last_written(1);

        self.mark(keyword);
        let top = self.core.builder.current_offset();
        let exit = self.core.builder.for_each_condition_jump(slot);

        self.consume(TokenKind::OpenCurly, Reason::ExpectedOpenCurly);
        self.block_body();
        self.core.jump_backward(top);
        self.core.bind(exit);
        self.core.end_scope();
        if owns_reservation {
            self.core.end_reservation();
        }
    }

    fn return_statement(&mut self) {
        let keyword = self.previous();
        if self.check(TokenKind::Semicolon) {
            self.mark(keyword);
            self.core.builder.push_empty_tuple();
        } else {
            self.pipeline(false);
        }
        self.consume(TokenKind::Semicolon, Reason::ExpectedSemicolon);
        self.mark(keyword);
        self.core.builder.return_();
    }

    fn expression_statement(&mut self) {
        let destructured = self.pipeline(true);
        self.consume(TokenKind::Semicolon, Reason::ExpectedSemicolon);
        if !destructured {
            self.core.builder.pop_tuple_keeping(0);
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Pipelines
    // ═══════════════════════════════════════════════════════════════

    /// `expression ("|" command)* ("|" targets)?`. Returns whether the
    /// tuple was consumed by a destructuring.
    fn pipeline(&mut self, allow_targets: bool) -> bool {
        self.expression();
        while self.matches(TokenKind::Pipe) {
            if self.matches(TokenKind::Identifier) {
                let name = self.previous();
                self.command_call(name, true);
            } else if allow_targets && self.check(TokenKind::Variable) {
                self.destructure();
                return true;
            } else {
                let location = self.location(self.current());
                self.core.hard(Reason::ExpectedPipeTarget, location);
                return false;
            }
        }
        false
    }

    fn expression(&mut self) {
        parse_with_precedence(self, Precedence::Comma);
    }

    /// `| $a, $b`: declare all targets fresh or reassign all of them.
    fn destructure(&mut self) {
        let mut targets = Vec::new();
        loop {
            self.consume(TokenKind::Variable, Reason::ExpectedVariable);
            targets.push(self.previous());
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.mark(targets[0]);

        let Ok(count) = u8::try_from(targets.len()) else {
            self.soft(Reason::TooManyTargets, targets[0]);
            self.core.builder.pop_tuple_keeping(0);
            return;
        };
        for (i, &target) in targets.iter().enumerate() {
            let text = self.text(target);
            if targets[..i].iter().any(|&t| self.text(t) == text) {
                self.soft(
                    Reason::DuplicateTarget {
                        name: text.to_string(),
                    },
                    target,
                );
                self.core.builder.pop_tuple_keeping(0);
                return;
            }
        }

        let resolutions: Vec<Resolution> = targets
            .iter()
            .map(|&t| {
                let (name, location) = (self.text(t), self.location(t));
                self.core.resolve_variable(name, location)
            })
            .collect();
        if resolutions.contains(&Resolution::OutsideCommand) {
            self.core.builder.pop_tuple_keeping(0);
            return;
        }
        let existing: Vec<usize> = resolutions
            .iter()
            .filter_map(|r| match r {
                Resolution::Local(index) => Some(*index),
                _ => None,
            })
            .collect();

        if existing.is_empty() {
            self.core.builder.pop_tuple_keeping(count);
            let slots: Vec<u8> = targets
                .iter()
                .map(|&t| {
                    let (name, location) = (self.text(t), self.location(t));
                    self.core.add_variable(name, location)
                })
                .collect();
            if self.core.is_reserving() {
                for &slot in slots.iter().rev() {
                    self.core.builder.set_local(slot);
                }
            }
            self.core.mark_last_written(targets.len());
        } else if existing.len() == targets.len() {
            self.core.builder.pop_tuple_keeping(count);
            for &index in existing.iter().rev() {
                let slot = self.core.slot_of(index).unwrap_or(u8::MAX);
                self.core.builder.set_local(slot);
                self.core.mark_written(index);
            }
        } else {
            self.soft(Reason::MixedDestructuring, targets[0]);
            self.core.builder.pop_tuple_keeping(0);
        }
    }

    /// A command name followed by its arguments. With `has_input` the
    /// current tuple is the command's input; otherwise it gets an empty one.
    fn command_call(&mut self, name: Token, has_input: bool) {
        if !has_input {
            self.mark(name);
            self.core.builder.push_empty_tuple();
        }

        let mut arguments = 0;
        while self.current().kind.is_argument() {
            self.advance();
            match self.previous().kind {
                TokenKind::Variable => self.variable(),
                _ => self.literal(),
            }
            self.mark(name);
            self.core.builder.merge_tuple();
            arguments += 1;
        }

        self.mark(name);
        self.emit_call(name, arguments);
    }

    fn emit_call(&mut self, name: Token, arguments: usize) {
        let text = self.text(name);
        let location = self.location(name);

        let check_arguments = |this: &mut Self, expected: u8| {
            if usize::from(expected) != arguments {
                this.soft(
                    Reason::WrongArgumentCount {
                        name: text.to_string(),
                        expected,
                        got: arguments,
                    },
                    name,
                );
            }
        };

        if let Some((source_index, definition_index, expected)) = self.core.resolve_external(text) {
            check_arguments(self, expected);
            let instances = &mut self.core.assembly.external_instances;
            let Ok(instance) = u16::try_from(instances.len()) else {
                self.soft(Reason::TooManyCommandInstances, name);
                return;
            };
            instances.push(ExternalCommandInstance {
                source_index,
                definition_index,
                location,
            });
            self.core.builder.execute_native_command(instance);
        } else if let Some(index) = self.core.assembly.find_command(text) {
            let expected = self.core.assembly.commands[index].parameter_count;
            check_arguments(self, expected);
            self.core
                .builder
                .execute_command(u16::try_from(index).unwrap_or(u16::MAX));
        } else {
            self.soft(
                Reason::UnresolvedCommand {
                    name: text.to_string(),
                },
                name,
            );
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Primaries
    // ═══════════════════════════════════════════════════════════════

    fn literal(&mut self) {
        let token = self.previous();
        match token.kind {
            TokenKind::True => self.core.builder.push_bool(true),
            TokenKind::False => self.core.builder.push_bool(false),
            TokenKind::Integer => {
                let value = self.text(token).parse::<i32>().unwrap_or_else(|_| {
                    self.soft(Reason::IntegerOutOfRange, token);
                    0
                });
                self.core.push_literal(Value::Int(value));
            }
            TokenKind::Real => {
                let value = self.text(token).parse::<f32>().unwrap_or_default();
                self.core.push_literal(Value::Float(value));
            }
            TokenKind::String => {
                let text = self.unescape(token);
                self.core.push_literal(Value::from(text));
            }
            _ => self.core.builder.push_empty_tuple(),
        }
    }

    fn variable(&mut self) {
        let token = self.previous();
        let name = self.text(token);
        let location = self.location(token);
        match self.core.resolve_variable(name, location) {
            Resolution::Local(index) => {
                self.core.variables[index].mark_read();
                let slot = self.core.slot_of(index).unwrap_or(u8::MAX);
                self.core.builder.push_local(slot);
            }
            Resolution::OutsideCommand => self.core.builder.push_empty_tuple(),
            Resolution::Missing => {
                self.soft(
                    Reason::UndefinedVariable {
                        name: name.to_string(),
                    },
                    token,
                );
                self.core.builder.push_empty_tuple();
            }
        }
    }

    fn input(&mut self) {
        self.core.builder.push_input();
    }

    fn call(&mut self) {
        let name = self.previous();
        self.command_call(name, false);
    }

    /// Infix `,`: concatenate the right operand onto the left tuple.
    fn comma(&mut self) {
        let comma = self.previous();
        parse_with_precedence(self, Precedence::Comma.next());
        self.mark(comma);
        self.core.builder.merge_tuple();
    }

    /// String token text without quotes, escapes resolved.
    fn unescape(&mut self, token: Token) -> String {
        let raw = self.text(token);
        let inner = raw
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(raw);

        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        let mut invalid = false;
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => {
                    invalid = true;
                    out.push(other);
                }
                None => invalid = true,
            }
        }
        if invalid {
            self.soft(Reason::InvalidEscape, token);
        }
        out
    }
}

impl<'src> Grammar<'src> for Controller<'_, '_, 'src> {
    fn parser(&self) -> &Parser<'src> {
        &self.parser
    }

    fn advance(&mut self) {
        let mut sink = Sink {
            core: &mut *self.core,
            source: self.source,
        };
        self.parser.next(&mut sink);
        self.mark(self.parser.previous());
    }

    fn rule(kind: TokenKind) -> ParseRule<Self> {
        use TokenKind as K;
        match kind {
            K::String | K::Integer | K::Real | K::True | K::False => {
                ParseRule::new(Some(Self::literal), None, Precedence::None)
            }
            K::Variable => ParseRule::new(Some(Self::variable), None, Precedence::None),
            K::Input => ParseRule::new(Some(Self::input), None, Precedence::None),
            K::Identifier => ParseRule::new(Some(Self::call), None, Precedence::None),
            K::Comma => ParseRule::new(None, Some(Self::comma), Precedence::Comma),
            _ => ParseRule::empty(),
        }
    }

    fn missing_prefix(&mut self, found: Token) {
        let location = self.location(found);
        self.core.hard(Reason::ExpectedExpression, location);
    }
}

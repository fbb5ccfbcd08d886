use std::rc::Rc;

use crate::{
    ast::{
        self, ClassDecl, CompilationUnit, Expr, ExprKind, FieldDecl, FunctionDecl, Ident, Member,
        Param, SeparatedList, Stmt, StmtKind, TypeClause,
    },
    diagnostics::{Diagnostic, DiagnosticBag, DiagnosticKind, Location},
    lexer,
    text::SourceText,
    token::{Span, Token, TokenKind, TriviaKind},
    types::Value,
    util::intern::Interner,
};

/// A parsed source file: the source, the root node, and the diagnostics of
/// both the lexer and the parser.
pub struct SyntaxTree {
    pub source: Rc<SourceText>,
    pub root: CompilationUnit,
    pub diagnostics: Vec<Diagnostic>,
}

impl SyntaxTree {
    pub fn parse(source: SourceText, interner: &mut Interner) -> SyntaxTree {
        SyntaxTree::parse_rc(Rc::new(source), interner)
    }

    pub fn parse_rc(source: Rc<SourceText>, interner: &mut Interner) -> SyntaxTree {
        let (tokens, mut diagnostics) = lexer::lex(&source);
        let mut parser = Parser::new(&source, tokens, interner);
        let root = parser.parse_compilation_unit();
        diagnostics.extend(parser.diagnostics.into_vec());
        SyntaxTree {
            source,
            root,
            diagnostics,
        }
    }

    /// The statements that appear at the top level of this file.
    pub fn global_statements(&self) -> impl Iterator<Item = &Stmt> {
        self.root.members.iter().filter_map(|member| match member {
            Member::Global(stmt) => Some(stmt),
            _ => None,
        })
    }
}

/// Recursive-descent parser with Pratt-style binary precedence.
///
/// The parser never fails: where a required token is absent it fabricates a
/// zero-length *missing* token at the current position (without advancing)
/// and reports [`DiagnosticKind::UnexpectedToken`], keeping the tree shape
/// stable for the downstream stages.
pub struct Parser<'src, 'i> {
    source: &'src Rc<SourceText>,
    tokens: Vec<Token>,
    cursor: usize,
    diagnostics: DiagnosticBag,
    interner: &'i mut Interner,
}

impl<'src, 'i> Parser<'src, 'i> {
    pub fn new(
        source: &'src Rc<SourceText>,
        tokens: Vec<Token>,
        interner: &'i mut Interner,
    ) -> Parser<'src, 'i> {
        debug_assert!(tokens.last().is_some_and(Token::is_eof));
        Parser {
            source,
            tokens,
            cursor: 0,
            diagnostics: DiagnosticBag::new(),
            interner,
        }
    }

    pub fn parse_compilation_unit(&mut self) -> CompilationUnit {
        let mut members = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            let start = self.cursor;
            members.push(self.parse_member());
            // A member that consumed nothing would loop forever; skip one
            // token and carry on.
            if self.cursor == start {
                self.advance();
            }
        }
        let eof = self.match_token(TokenKind::Eof).span;
        CompilationUnit { members, eof }
    }

    fn parse_member(&mut self) -> Member {
        match self.peek().kind {
            TokenKind::Function => Member::Function(self.parse_function_decl()),
            TokenKind::Class => Member::Class(self.parse_class_decl()),
            _ => Member::Global(self.parse_statement()),
        }
    }

    fn parse_function_decl(&mut self) -> FunctionDecl {
        let keyword = self.match_token(TokenKind::Function).span;
        let first = self.match_token(TokenKind::Identifier);
        // `function Class.name(...)` declares an instance method on Class.
        let (receiver, name) = if self.peek().kind == TokenKind::Dot {
            self.advance();
            let name = self.match_token(TokenKind::Identifier);
            (Some(self.make_ident(&first)), self.make_ident(&name))
        } else {
            (None, self.make_ident(&first))
        };

        self.match_token(TokenKind::LParen);
        let params = self.parse_separated(|p| {
            let name_token = p.match_token(TokenKind::Identifier);
            let name = p.make_ident(&name_token);
            let ty = p.parse_type_clause();
            Param { name, ty }
        });
        self.match_token(TokenKind::RParen);

        let return_ty = if self.peek().kind == TokenKind::Colon {
            Some(self.parse_type_clause())
        } else {
            None
        };

        let body = self.parse_block_statement();
        let span = keyword.to(body.span);
        FunctionDecl {
            keyword,
            receiver,
            name,
            params,
            return_ty,
            body,
            span,
        }
    }

    fn parse_class_decl(&mut self) -> ClassDecl {
        let keyword = self.match_token(TokenKind::Class).span;
        let name_token = self.match_token(TokenKind::Identifier);
        let name = self.make_ident(&name_token);

        self.match_token(TokenKind::LBrace);
        let mut fields = Vec::new();
        while !matches!(self.peek().kind, TokenKind::RBrace | TokenKind::Eof) {
            let start = self.cursor;
            fields.push(self.parse_field_decl());
            if self.cursor == start {
                self.advance();
            }
        }
        let rbrace = self.match_token(TokenKind::RBrace).span;

        ClassDecl {
            keyword,
            name,
            fields,
            span: keyword.to(rbrace),
        }
    }

    fn parse_field_decl(&mut self) -> FieldDecl {
        let const_kw = self.consume_optional(TokenKind::Const);
        let name_token = self.match_token(TokenKind::Identifier);
        let name = self.make_ident(&name_token);
        let ty = self.parse_type_clause();
        let initializer = if self.consume_optional(TokenKind::Eq).is_some() {
            Some(self.parse_expression())
        } else {
            None
        };
        self.consume_optional(TokenKind::Semicolon);

        let start = const_kw.unwrap_or(name.span);
        let end = initializer
            .as_ref()
            .map(|init| init.span)
            .unwrap_or(ty.name.span);
        FieldDecl {
            const_kw,
            name,
            ty,
            initializer,
            span: start.to(end),
        }
    }

    fn parse_type_clause(&mut self) -> TypeClause {
        let colon = self.match_token(TokenKind::Colon).span;
        let name_token = self.match_token(TokenKind::Identifier);
        TypeClause {
            colon,
            name: self.make_ident(&name_token),
        }
    }

    fn parse_statement(&mut self) -> Stmt {
        match self.peek().kind {
            TokenKind::LBrace => self.parse_block_statement(),
            TokenKind::Var | TokenKind::Const => self.parse_variable_declaration(),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::Do => self.parse_do_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Break => self.parse_jump_statement(StmtKind::Break),
            TokenKind::Continue => self.parse_jump_statement(StmtKind::Continue),
            TokenKind::Return => self.parse_return_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_block_statement(&mut self) -> Stmt {
        let lbrace = self.match_token(TokenKind::LBrace).span;
        let mut statements = Vec::new();
        while !matches!(self.peek().kind, TokenKind::RBrace | TokenKind::Eof) {
            let start = self.cursor;
            statements.push(self.parse_statement());
            if self.cursor == start {
                self.advance();
            }
        }
        let rbrace = self.match_token(TokenKind::RBrace).span;
        Stmt {
            kind: StmtKind::Block(statements),
            span: lbrace.to(rbrace),
        }
    }

    fn parse_variable_declaration(&mut self) -> Stmt {
        let keyword_token = self.advance();
        let keyword = keyword_token.kind;
        let name_token = self.match_token(TokenKind::Identifier);
        let name = self.make_ident(&name_token);

        let ty = if self.peek().kind == TokenKind::Colon {
            Some(self.parse_type_clause())
        } else {
            None
        };

        // Without a type clause the initializer is required.
        let initializer = if ty.is_none() {
            self.match_token(TokenKind::Eq);
            Some(self.parse_expression())
        } else if self.consume_optional(TokenKind::Eq).is_some() {
            Some(self.parse_expression())
        } else {
            None
        };
        self.consume_optional(TokenKind::Semicolon);

        let end = initializer
            .as_ref()
            .map(|init| init.span)
            .or(ty.as_ref().map(|ty| ty.name.span))
            .unwrap_or(name.span);
        Stmt {
            span: keyword_token.span.to(end),
            kind: StmtKind::VariableDeclaration {
                keyword,
                name,
                ty,
                initializer,
            },
        }
    }

    fn parse_if_statement(&mut self) -> Stmt {
        let keyword = self.match_token(TokenKind::If).span;
        let condition = self.parse_expression();
        let then_branch = Box::new(self.parse_statement());
        let else_branch = if self.consume_optional(TokenKind::Else).is_some() {
            Some(Box::new(self.parse_statement()))
        } else {
            None
        };
        let end = else_branch
            .as_deref()
            .map(|stmt| stmt.span)
            .unwrap_or(then_branch.span);
        Stmt {
            span: keyword.to(end),
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
        }
    }

    fn parse_while_statement(&mut self) -> Stmt {
        let keyword = self.match_token(TokenKind::While).span;
        let condition = self.parse_expression();
        let body = Box::new(self.parse_statement());
        Stmt {
            span: keyword.to(body.span),
            kind: StmtKind::While { condition, body },
        }
    }

    fn parse_do_while_statement(&mut self) -> Stmt {
        let keyword = self.match_token(TokenKind::Do).span;
        let body = Box::new(self.parse_statement());
        self.match_token(TokenKind::While);
        let condition = self.parse_expression();
        self.consume_optional(TokenKind::Semicolon);
        Stmt {
            span: keyword.to(condition.span),
            kind: StmtKind::DoWhile { body, condition },
        }
    }

    fn parse_for_statement(&mut self) -> Stmt {
        let keyword = self.match_token(TokenKind::For).span;
        let variable_token = self.match_token(TokenKind::Identifier);
        let variable = self.make_ident(&variable_token);
        self.match_token(TokenKind::In);
        let lower = self.parse_expression();
        self.match_token(TokenKind::DotDot);
        let upper = self.parse_expression();
        let body = Box::new(self.parse_statement());
        Stmt {
            span: keyword.to(body.span),
            kind: StmtKind::For {
                variable,
                lower,
                upper,
                body,
            },
        }
    }

    fn parse_jump_statement(&mut self, kind: StmtKind) -> Stmt {
        let keyword = self.advance().span;
        self.consume_optional(TokenKind::Semicolon);
        Stmt {
            kind,
            span: keyword,
        }
    }

    fn parse_return_statement(&mut self) -> Stmt {
        let keyword_token = self.advance();
        // A line break right after `return` means a bare return; otherwise
        // an expression up to the statement boundary is the return value.
        let on_same_line = !keyword_token
            .trailing
            .iter()
            .any(|trivia| trivia.kind == TriviaKind::LineBreak);
        let value = if on_same_line
            && !matches!(
                self.peek().kind,
                TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
            ) {
            Some(self.parse_expression())
        } else {
            None
        };
        self.consume_optional(TokenKind::Semicolon);
        let end = value
            .as_ref()
            .map(|value| value.span)
            .unwrap_or(keyword_token.span);
        Stmt {
            span: keyword_token.span.to(end),
            kind: StmtKind::Return { value },
        }
    }

    fn parse_expression_statement(&mut self) -> Stmt {
        let expr = self.parse_expression();
        self.consume_optional(TokenKind::Semicolon);
        Stmt {
            span: expr.span,
            kind: StmtKind::Expression(expr),
        }
    }

    fn parse_expression(&mut self) -> Expr {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Expr {
        let target = self.parse_binary(0);
        let kind = self.peek().kind;
        if !kind.is_assignment() {
            return target;
        }
        let op_token = self.advance();
        let value = self.parse_assignment();
        Expr {
            span: target.span.to(value.span),
            kind: ExprKind::Assignment {
                op: ast::compound_operator(kind),
                op_span: op_token.span,
                target: target.boxed(),
                value: value.boxed(),
            },
        }
    }

    fn parse_binary(&mut self, parent_precedence: u8) -> Expr {
        let unary_precedence = self.peek().kind.unary_precedence();
        let mut left = if unary_precedence != 0 && unary_precedence >= parent_precedence {
            let op_token = self.advance();
            let op = ast::unary_operator(op_token.kind)
                .expect("unary_precedence admits only prefix operators");
            let operand = self.parse_binary(unary_precedence);
            Expr {
                span: op_token.span.to(operand.span),
                kind: ExprKind::Unary {
                    op,
                    op_span: op_token.span,
                    operand: operand.boxed(),
                },
            }
        } else {
            self.parse_postfix()
        };

        loop {
            let precedence = self.peek().kind.binary_precedence();
            if precedence == 0 || precedence <= parent_precedence {
                break;
            }
            let op_token = self.advance();
            let op = ast::binary_operator(op_token.kind)
                .expect("binary_precedence admits only binary operators");
            let right = self.parse_binary(precedence);
            left = Expr {
                span: left.span.to(right.span),
                kind: ExprKind::Binary {
                    op,
                    op_span: op_token.span,
                    lhs: left.boxed(),
                    rhs: right.boxed(),
                },
            };
        }
        left
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        loop {
            match self.peek().kind {
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_separated(Parser::parse_expression);
                    let rparen = self.match_token(TokenKind::RParen).span;
                    expr = Expr {
                        span: expr.span.to(rparen),
                        kind: ExprKind::Call {
                            callee: expr.boxed(),
                            args,
                        },
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let name_token = self.match_token(TokenKind::Identifier);
                    let name = self.make_ident(&name_token);
                    expr = Expr {
                        span: expr.span.to(name.span),
                        kind: ExprKind::Member {
                            object: expr.boxed(),
                            name,
                        },
                    };
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> Expr {
        match self.peek().kind {
            TokenKind::LParen => {
                let lparen = self.advance().span;
                let inner = self.parse_expression();
                let rparen = self.match_token(TokenKind::RParen).span;
                Expr {
                    span: lparen.to(rparen),
                    kind: ExprKind::Paren(inner.boxed()),
                }
            }
            TokenKind::True | TokenKind::False => {
                let token = self.advance();
                Expr {
                    span: token.span,
                    kind: ExprKind::Literal(Value::Bool(token.kind == TokenKind::True)),
                }
            }
            TokenKind::Int | TokenKind::Float | TokenKind::String | TokenKind::Char => {
                let token = self.advance();
                let value = token.value.unwrap_or(Value::I32(0));
                Expr {
                    span: token.span,
                    kind: ExprKind::Literal(value),
                }
            }
            TokenKind::This => {
                let token = self.advance();
                Expr {
                    span: token.span,
                    kind: ExprKind::This,
                }
            }
            _ => {
                // Error recovery: fabricate a name expression over a missing
                // identifier.
                let token = self.match_token(TokenKind::Identifier);
                let name = self.make_ident(&token);
                Expr {
                    span: token.span,
                    kind: ExprKind::Name(name),
                }
            }
        }
    }

    /// Parses a `,`-separated list, stopping before `)` or the end of input.
    fn parse_separated<T>(&mut self, mut parse_item: impl FnMut(&mut Self) -> T) -> SeparatedList<T> {
        let mut list = SeparatedList::new();
        while !matches!(self.peek().kind, TokenKind::RParen | TokenKind::Eof) {
            let start = self.cursor;
            list.items.push(parse_item(self));
            if self.peek().kind == TokenKind::Comma {
                list.separators.push(self.advance().span);
            } else if self.cursor == start {
                // The item consumed nothing and no separator follows; bail
                // to avoid looping.
                break;
            } else if self.peek().kind != TokenKind::RParen {
                break;
            }
        }
        list
    }
}

impl Parser<'_, '_> {
    /// Returns the current token without advancing.
    #[inline]
    fn peek(&self) -> &Token {
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    /// Returns the current token and advances. Past the end, keeps
    /// returning the EOF token.
    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
        token
    }

    /// Consumes the current token if it matches; otherwise reports
    /// [`DiagnosticKind::UnexpectedToken`] and fabricates a missing token of
    /// the expected kind at the current position, without advancing.
    fn match_token(&mut self, expect: TokenKind) -> Token {
        let current = self.peek();
        if current.kind == expect {
            return self.advance();
        }
        let got = current.kind;
        let span = current.span;
        self.diagnostics.report(
            Location::new(Rc::clone(self.source), span),
            DiagnosticKind::UnexpectedToken { got, want: expect },
        );
        Token::missing(expect, span.lo)
    }

    /// Consumes the current token if it matches, returning its span.
    fn consume_optional(&mut self, kind: TokenKind) -> Option<Span> {
        if self.peek().kind == kind {
            return Some(self.advance().span);
        }
        None
    }

    fn make_ident(&mut self, token: &Token) -> Ident {
        let source = Rc::clone(self.source);
        let text = source.slice(token.span);
        Ident {
            name: self.interner.intern(text),
            span: token.span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, UnaryOp};
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> (SyntaxTree, Interner) {
        let mut interner = Interner::with_capacity(64);
        let tree = SyntaxTree::parse(SourceText::new(input), &mut interner);
        (tree, interner)
    }

    fn parse_expr(input: &str) -> (Expr, Vec<Diagnostic>, Interner) {
        let (mut tree, interner) = parse(input);
        assert_eq!(tree.root.members.len(), 1);
        let Member::Global(stmt) = tree.root.members.remove(0) else {
            panic!("expected a global statement");
        };
        let StmtKind::Expression(expr) = stmt.kind else {
            panic!("expected an expression statement");
        };
        (expr, tree.diagnostics, interner)
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let (expr, diagnostics, _) = parse_expr("1 + 2 * 3");
        assert!(diagnostics.is_empty());
        let ExprKind::Binary { op: BinaryOp::Add, rhs, .. } = expr.kind else {
            panic!("expected addition at the root, got {expr:?}");
        };
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary { op: BinaryOp::Mul, .. }
        ));
    }

    #[test]
    fn equal_precedence_is_left_associative() {
        let (expr, _, _) = parse_expr("1 - 2 - 3");
        let ExprKind::Binary { op: BinaryOp::Sub, lhs, rhs, .. } = expr.kind else {
            panic!("expected subtraction at the root");
        };
        assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Sub, .. }));
        assert!(matches!(rhs.kind, ExprKind::Literal(Value::I32(3))));
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        let (expr, _, _) = parse_expr("-1 + 2");
        let ExprKind::Binary { op: BinaryOp::Add, lhs, .. } = expr.kind else {
            panic!("expected addition at the root");
        };
        assert!(matches!(
            lhs.kind,
            ExprKind::Unary { op: UnaryOp::Negation, .. }
        ));
    }

    #[test]
    fn assignment_is_right_associative() {
        let (expr, _, _) = parse_expr("a = b = 1");
        let ExprKind::Assignment { op: None, value, .. } = expr.kind else {
            panic!("expected assignment at the root");
        };
        assert!(matches!(value.kind, ExprKind::Assignment { op: None, .. }));
    }

    #[test]
    fn compound_assignment_recovers_operator() {
        let (expr, _, _) = parse_expr("a += 1");
        assert!(matches!(
            expr.kind,
            ExprKind::Assignment { op: Some(BinaryOp::Add), .. }
        ));
    }

    #[test]
    fn postfix_chains() {
        let (expr, diagnostics, _) = parse_expr("a.b.c(1, 2)");
        assert!(diagnostics.is_empty());
        let ExprKind::Call { callee, args } = expr.kind else {
            panic!("expected call at the root");
        };
        assert_eq!(args.len(), 2);
        assert_eq!(args.separators.len(), 1);
        let ExprKind::Member { object, .. } = callee.kind else {
            panic!("expected member access callee");
        };
        assert!(matches!(object.kind, ExprKind::Member { .. }));
    }

    #[test]
    fn logical_operators_bind_loosest() {
        let (expr, _, _) = parse_expr("a == b && c < d || e & f");
        let ExprKind::Binary { op: BinaryOp::LogicalOr, lhs, .. } = expr.kind else {
            panic!("expected || at the root");
        };
        assert!(matches!(
            lhs.kind,
            ExprKind::Binary { op: BinaryOp::LogicalAnd, .. }
        ));
    }

    #[test]
    fn function_declaration_with_receiver() {
        let (tree, interner) = parse(
            "function Point.offset(dx: int32): Point {\n    return this\n}",
        );
        assert!(tree.diagnostics.is_empty(), "{:?}", tree.diagnostics);
        let [Member::Function(decl)] = &tree.root.members[..] else {
            panic!("expected a single function");
        };
        assert_eq!(interner.resolve(decl.receiver.unwrap().name), "Point");
        assert_eq!(interner.resolve(decl.name.name), "offset");
        assert_eq!(decl.params.len(), 1);
        assert_eq!(
            interner.resolve(decl.return_ty.as_ref().unwrap().name.name),
            "Point"
        );
    }

    #[test]
    fn class_declaration_with_const_field() {
        let (tree, interner) = parse("class P { x: int32; const tag: string = \"p\"; }");
        assert!(tree.diagnostics.is_empty(), "{:?}", tree.diagnostics);
        let [Member::Class(decl)] = &tree.root.members[..] else {
            panic!("expected a single class");
        };
        assert_eq!(interner.resolve(decl.name.name), "P");
        assert_eq!(decl.fields.len(), 2);
        assert!(decl.fields[0].const_kw.is_none());
        assert!(decl.fields[1].const_kw.is_some());
        assert!(decl.fields[1].initializer.is_some());
    }

    #[test]
    fn bare_return_before_line_break() {
        let (tree, _) = parse("function f() {\n    return\n    writeLine(1)\n}");
        assert!(tree.diagnostics.is_empty(), "{:?}", tree.diagnostics);
        let [Member::Function(decl)] = &tree.root.members[..] else {
            panic!("expected a single function");
        };
        let StmtKind::Block(statements) = &decl.body.kind else {
            panic!("expected a block body");
        };
        assert_eq!(statements.len(), 2);
        assert!(matches!(
            statements[0].kind,
            StmtKind::Return { value: None }
        ));
    }

    #[test]
    fn missing_tokens_are_zero_length_and_stationary() {
        let (tree, _) = parse("var x = (1 + ");
        assert!(!tree.diagnostics.is_empty());
        for diagnostic in &tree.diagnostics {
            assert!(matches!(
                diagnostic.kind,
                DiagnosticKind::UnexpectedToken { .. }
            ));
        }
        // The tree still has the declaration's shape.
        let [Member::Global(stmt)] = &tree.root.members[..] else {
            panic!("expected a single statement");
        };
        assert!(matches!(
            stmt.kind,
            StmtKind::VariableDeclaration { initializer: Some(_), .. }
        ));
    }

    #[test]
    fn stray_tokens_do_not_hang_the_parser() {
        for input in [")", "} } }", "var = = =", "f(,)", "class C { ) }"] {
            let (tree, _) = parse(input);
            assert!(!tree.diagnostics.is_empty(), "input: {input}");
        }
    }

    #[test]
    fn statements_parse_with_and_without_semicolons() {
        let (tree, _) = parse("var x = 1; var y = 2\nx = y");
        assert!(tree.diagnostics.is_empty(), "{:?}", tree.diagnostics);
        assert_eq!(tree.root.members.len(), 3);
    }
}

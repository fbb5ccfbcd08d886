use std::{iter::Peekable, rc::Rc};

use crate::{
    diagnostics::{Diagnostic, DiagnosticBag, DiagnosticKind, Location},
    text::SourceText,
    token::{Span, Token, TokenKind, Trivia, TriviaKind, KEYWORDS},
    types::Value,
};

/// The Quill lexer.
///
/// ## Implementation Remarks
///
/// Each produced token carries its *leading* trivia (whitespace, comments,
/// line breaks preceding it) and its *trailing* trivia (trivia up to and
/// including the first line break after it). Concatenating every token's
/// leading trivia, text, and trailing trivia reproduces the source exactly.
///
/// The lexer never fails: unrecognized input becomes a [`TokenKind::Bad`]
/// token plus a diagnostic, and the [`Iterator`] implementation is infinite,
/// continuously returning [`TokenKind::Eof`] tokens once the source is
/// exhausted. Consumers must follow this convention, or use
/// [`Lexer::until_eof`] to get a stream which fuses after the EOF token.
pub struct Lexer<'src> {
    source: &'src Rc<SourceText>,
    src: &'src str,
    iter: Peekable<std::str::Chars<'src>>,
    cursor: usize,
    current_lo: usize,
    diagnostics: DiagnosticBag,
}

/// Lexes the whole source, returning the token stream (terminated by a
/// single EOF token) together with the diagnostics encountered.
pub fn lex(source: &Rc<SourceText>) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::with_capacity(source.len() / 4 + 1);
    loop {
        let token = lexer.next_token();
        let eof = token.is_eof();
        tokens.push(token);
        if eof {
            break;
        }
    }
    (tokens, lexer.diagnostics.into_vec())
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_token())
    }
}

/// A raw scan result: either a proper token or one piece of trivia.
enum Scanned {
    Token(TokenKind, Option<Value>),
    Trivia(TriviaKind),
}

/// A token stream that ends after the EOF token instead of repeating it.
pub struct UntilEof<'src> {
    lexer: Lexer<'src>,
    finished: bool,
}

impl Iterator for UntilEof<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let token = self.lexer.next_token();
        self.finished = token.is_eof();
        Some(token)
    }
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src Rc<SourceText>) -> Lexer<'src> {
        let src = source.as_str();
        Lexer {
            source,
            src,
            iter: src.chars().peekable(),
            cursor: 0,
            current_lo: 0,
            diagnostics: DiagnosticBag::new(),
        }
    }

    /// Converts the infinite token stream into one which yields each token
    /// once, up to and including the EOF token.
    pub fn until_eof(self) -> UntilEof<'src> {
        UntilEof {
            lexer: self,
            finished: false,
        }
    }

    pub fn next_token(&mut self) -> Token {
        let mut leading = Vec::new();
        let (kind, value, span) = loop {
            match self.scan_raw() {
                Scanned::Trivia(kind) => leading.push(Trivia {
                    kind,
                    span: self.span(),
                }),
                Scanned::Token(kind, value) => break (kind, value, self.span()),
            }
        };

        let mut trailing = Vec::new();
        while self.at_trivia() {
            let Scanned::Trivia(trivia) = self.scan_raw() else {
                unreachable!("at_trivia only admits trivia starts");
            };
            trailing.push(Trivia {
                kind: trivia,
                span: self.span(),
            });
            // The line break itself ends the trailing trivia; whatever
            // follows leads the next token.
            if trivia == TriviaKind::LineBreak {
                break;
            }
        }

        Token {
            kind,
            span,
            value,
            leading,
            trailing,
            missing: false,
        }
    }

    /// Scans one raw token or one piece of trivia.
    fn scan_raw(&mut self) -> Scanned {
        use TokenKind::*;
        let token = |kind| Scanned::Token(kind, None);
        match self.mark_advance() {
            '\0' => token(Eof),
            '+' => match self.peek() {
                '=' => self.advance_with(token(PlusEq)),
                _ => token(Plus),
            },
            '-' => match self.peek() {
                '=' => self.advance_with(token(MinusEq)),
                _ => token(Minus),
            },
            '*' => match self.peek() {
                '=' => self.advance_with(token(StarEq)),
                _ => token(Star),
            },
            '/' => match self.peek() {
                '/' => self.line_comment(),
                '*' => self.block_comment(),
                '=' => self.advance_with(token(SlashEq)),
                _ => token(Slash),
            },
            '%' => match self.peek() {
                '=' => self.advance_with(token(PercentEq)),
                _ => token(Percent),
            },
            '!' => match self.peek() {
                '=' => self.advance_with(token(BangEq)),
                _ => token(Bang),
            },
            '~' => token(Tilde),
            '&' => match self.peek() {
                '&' => self.advance_with(token(AmpAmp)),
                '=' => self.advance_with(token(AmpEq)),
                _ => token(Amp),
            },
            '|' => match self.peek() {
                '|' => self.advance_with(token(PipePipe)),
                '=' => self.advance_with(token(PipeEq)),
                _ => token(Pipe),
            },
            '^' => match self.peek() {
                '=' => self.advance_with(token(CaretEq)),
                _ => token(Caret),
            },
            '=' => match self.peek() {
                '=' => self.advance_with(token(EqEq)),
                '>' => self.advance_with(token(FatArrow)),
                _ => token(Eq),
            },
            '<' => match self.peek() {
                '=' => self.advance_with(token(LessEq)),
                _ => token(Less),
            },
            '>' => match self.peek() {
                '=' => self.advance_with(token(GreaterEq)),
                _ => token(Greater),
            },
            '.' => match self.peek() {
                '.' => self.advance_with(token(DotDot)),
                _ => token(Dot),
            },
            ',' => token(Comma),
            ':' => token(Colon),
            ';' => token(Semicolon),
            '(' => token(LParen),
            ')' => token(RParen),
            '{' => token(LBrace),
            '}' => token(RBrace),
            '"' => self.quoted(TokenKind::String),
            '\'' => self.quoted(TokenKind::Char),
            '\n' => Scanned::Trivia(TriviaKind::LineBreak),
            '\r' => {
                if self.peek() == '\n' {
                    self.advance();
                }
                Scanned::Trivia(TriviaKind::LineBreak)
            }
            c if c.is_ascii_digit() => self.number(),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier_or_keyword(),
            c if c.is_whitespace() => self.whitespace(),
            c => {
                self.report(self.span(), DiagnosticKind::BadCharacter(c));
                token(Bad)
            }
        }
    }

    /// Whether the upcoming input begins a piece of trivia.
    fn at_trivia(&mut self) -> bool {
        match self.peek() {
            '/' => matches!(self.peek2(), '/' | '*'),
            '\0' => false,
            c => c.is_whitespace(),
        }
    }

    fn whitespace(&mut self) -> Scanned {
        while {
            let c = self.peek();
            c != '\n' && c != '\r' && c != '\0' && c.is_whitespace()
        } {
            self.advance();
        }
        Scanned::Trivia(TriviaKind::Whitespace)
    }

    fn line_comment(&mut self) -> Scanned {
        debug_assert_eq!(self.advance(), '/');
        while !matches!(self.peek(), '\n' | '\r' | '\0') {
            self.advance();
        }
        Scanned::Trivia(TriviaKind::LineComment)
    }

    fn block_comment(&mut self) -> Scanned {
        debug_assert_eq!(self.advance(), '*');
        loop {
            match self.advance() {
                '\0' => {
                    self.report(self.span(), DiagnosticKind::UnterminatedComment);
                    break;
                }
                '*' if self.peek() == '/' => {
                    self.advance();
                    break;
                }
                _ => {}
            }
        }
        Scanned::Trivia(TriviaKind::BlockComment)
    }

    /// Scans a string or character literal. The quote character doubled
    /// escapes itself; a line break or the end of input terminates the
    /// literal with a diagnostic.
    fn quoted(&mut self, kind: TokenKind) -> Scanned {
        let quote = if kind == TokenKind::String { '"' } else { '\'' };
        let mut content = String::new();
        loop {
            match self.peek() {
                '\0' | '\n' | '\r' => {
                    self.report(self.span(), DiagnosticKind::UnterminatedString);
                    break;
                }
                c if c == quote => {
                    self.advance();
                    if self.peek() == quote {
                        self.advance();
                        content.push(quote);
                    } else {
                        break;
                    }
                }
                c => {
                    self.advance();
                    content.push(c);
                }
            }
        }
        let value = if kind == TokenKind::Char {
            let mut chars = content.chars();
            let (first, rest) = (chars.next(), chars.next());
            if first.is_none() || rest.is_some() {
                self.report(self.span(), DiagnosticKind::InvalidCharacterLiteral);
            }
            Value::Char(first.unwrap_or('\0'))
        } else {
            Value::Str(Rc::from(content.as_str()))
        };
        Scanned::Token(kind, Some(value))
    }

    fn number(&mut self) -> Scanned {
        let mut invalid = false;
        self.digits(&mut invalid);

        let mut is_float = false;
        // A single '.' between digits makes a fractional literal; `1..2`
        // leaves the dots for the range operator.
        while self.peek() == '.' && self.peek2().is_ascii_digit() {
            if is_float {
                invalid = true;
            }
            is_float = true;
            self.advance();
            self.digits(&mut invalid);
        }

        if invalid {
            self.report(self.span(), DiagnosticKind::InvalidNumber);
            let placeholder = if is_float { Value::F64(0.0) } else { Value::I32(0) };
            let kind = if is_float { TokenKind::Float } else { TokenKind::Int };
            return Scanned::Token(kind, Some(placeholder));
        }

        let text: String = self.substr().chars().filter(|&c| c != '_').collect();
        if is_float {
            let value = match text.parse::<f64>() {
                Ok(value) => value,
                Err(_) => {
                    self.report(self.span(), DiagnosticKind::InvalidNumber);
                    0.0
                }
            };
            // Demote to float32 when the value is exactly representable.
            let value = if f64::from(value as f32) == value {
                Value::F32(value as f32)
            } else {
                Value::F64(value)
            };
            return Scanned::Token(TokenKind::Float, Some(value));
        }

        // Integer literals promote through int32 -> uint32 -> int64 ->
        // uint64 by range.
        let value = match text.parse::<u64>() {
            Ok(n) if n <= i32::MAX as u64 => Value::I32(n as i32),
            Ok(n) if n <= u32::MAX as u64 => Value::U32(n as u32),
            Ok(n) if n <= i64::MAX as u64 => Value::I64(n as i64),
            Ok(n) => Value::U64(n),
            Err(_) => {
                self.report(self.span(), DiagnosticKind::InvalidNumber);
                Value::I32(0)
            }
        };
        Scanned::Token(TokenKind::Int, Some(value))
    }

    /// Consumes a run of digits and separators. Digits must flank each
    /// underscore.
    fn digits(&mut self, invalid: &mut bool) {
        while matches!(self.peek(), c if c.is_ascii_digit() || c == '_') {
            let c = self.advance();
            if c == '_' {
                let flanked = self.prev_is_digit() && self.peek().is_ascii_digit();
                if !flanked {
                    *invalid = true;
                }
            }
        }
    }

    /// Whether the character before the one most recently consumed is a
    /// digit. Only called right after consuming an underscore.
    fn prev_is_digit(&self) -> bool {
        self.src[..self.cursor - 1]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit())
    }

    fn identifier_or_keyword(&mut self) -> Scanned {
        while matches!(self.peek(), c if c.is_ascii_alphanumeric() || c == '_') {
            self.advance();
        }
        match KEYWORDS.get(self.substr()).copied() {
            Some(keyword) => Scanned::Token(keyword, None),
            None => Scanned::Token(TokenKind::Identifier, None),
        }
    }
}

impl Lexer<'_> {
    /// Starts a new token "mark" and advances the iterator.
    fn mark_advance(&mut self) -> char {
        self.current_lo = self.cursor;
        self.advance()
    }

    /// Returns the next character and advances the iterator.
    fn advance(&mut self) -> char {
        self.iter
            .next()
            .inspect(|c| self.cursor += c.len_utf8())
            .unwrap_or('\0')
    }

    /// Advances and returns the provided value.
    fn advance_with<T>(&mut self, value: T) -> T {
        self.advance();
        value
    }

    /// Returns the next character without advancing.
    fn peek(&mut self) -> char {
        self.iter.peek().copied().unwrap_or('\0')
    }

    /// Returns the character after the next one without advancing.
    fn peek2(&self) -> char {
        self.src[self.cursor..].chars().nth(1).unwrap_or('\0')
    }

    /// Returns the current marked span.
    fn span(&self) -> Span {
        Span::new_of_bounds(self.current_lo..self.cursor)
    }

    /// Returns the substring of the current marked bounds.
    fn substr(&self) -> &str {
        &self.src[self.current_lo..self.cursor]
    }

    fn report(&mut self, span: Span, kind: DiagnosticKind) {
        let location = Location::new(Rc::clone(self.source), span);
        self.diagnostics.report(location, kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex_str(input: &str) -> (Vec<Token>, Vec<Diagnostic>) {
        let source = Rc::new(SourceText::new(input));
        lex(&source)
    }

    fn kinds_and_spans(input: &str) -> Vec<(TokenKind, std::ops::Range<usize>)> {
        let (tokens, _) = lex_str(input);
        tokens
            .into_iter()
            .map(|t| (t.kind, t.span.lo..t.span.hi()))
            .collect()
    }

    macro_rules! cases {
        (match .. {
            $($str:expr => [$(($kind:expr, $range:expr)),* $(,)?]),* $(,)?
        }) => {{
            &[$(($str, vec![$(($kind, $range)),*])),*]
        }};
    }

    #[test]
    fn tests_with_span() {
        use TokenKind::*;
        let cases: &[(&str, Vec<(TokenKind, std::ops::Range<usize>)>)] = cases!(match .. {
            "+-*/%" => [
                (Plus, 0..1),
                (Minus, 1..2),
                (Star, 2..3),
                (Slash, 3..4),
                (Percent, 4..5),
                (Eof, 5..5),
            ],
            "== != <= >= && || => .." => [
                (EqEq, 0..2),
                (BangEq, 3..5),
                (LessEq, 6..8),
                (GreaterEq, 9..11),
                (AmpAmp, 12..14),
                (PipePipe, 15..17),
                (FatArrow, 18..20),
                (DotDot, 21..23),
                (Eof, 23..23),
            ],
            "+= -= *= /= %= &= |= ^=" => [
                (PlusEq, 0..2),
                (MinusEq, 3..5),
                (StarEq, 6..8),
                (SlashEq, 9..11),
                (PercentEq, 12..14),
                (AmpEq, 15..17),
                (PipeEq, 18..20),
                (CaretEq, 21..23),
                (Eof, 23..23),
            ],
            "a<b<=c<-d" => [
                (Identifier, 0..1),
                (Less, 1..2),
                (Identifier, 2..3),
                (LessEq, 3..5),
                (Identifier, 5..6),
                (Less, 6..7),
                (Minus, 7..8),
                (Identifier, 8..9),
                (Eof, 9..9),
            ],
            "var x = if while className _under" => [
                (Var, 0..3),
                (Identifier, 4..5),
                (Eq, 6..7),
                (If, 8..10),
                (While, 11..16),
                (Identifier, 17..26),
                (Identifier, 27..33),
                (Eof, 33..33),
            ],
            "for i in 1..10" => [
                (For, 0..3),
                (Identifier, 4..5),
                (In, 6..8),
                (Int, 9..10),
                (DotDot, 10..12),
                (Int, 12..14),
                (Eof, 14..14),
            ],
            "p.x=q.y" => [
                (Identifier, 0..1),
                (Dot, 1..2),
                (Identifier, 2..3),
                (Eq, 3..4),
                (Identifier, 4..5),
                (Dot, 5..6),
                (Identifier, 6..7),
                (Eof, 7..7),
            ],
        });

        for (input, expected) in cases {
            assert_eq!(&kinds_and_spans(input), expected, "input: {input}");
        }
    }

    #[test]
    fn integer_promotion_by_range() {
        let values = [
            ("1", Value::I32(1)),
            ("2147483647", Value::I32(i32::MAX)),
            ("2147483648", Value::U32(2_147_483_648)),
            ("4294967295", Value::U32(u32::MAX)),
            ("4294967296", Value::I64(4_294_967_296)),
            ("9223372036854775807", Value::I64(i64::MAX)),
            ("9223372036854775808", Value::U64(9_223_372_036_854_775_808)),
            ("18446744073709551615", Value::U64(u64::MAX)),
            ("1_000_000", Value::I32(1_000_000)),
        ];
        for (input, expected) in values {
            let (tokens, diagnostics) = lex_str(input);
            assert_eq!(tokens[0].value.as_ref(), Some(&expected), "input: {input}");
            assert!(diagnostics.is_empty(), "input: {input}");
        }
    }

    #[test]
    fn float_literals() {
        let (tokens, diagnostics) = lex_str("1.5");
        assert_eq!(tokens[0].kind, TokenKind::Float);
        assert_eq!(tokens[0].value, Some(Value::F32(1.5)));
        assert!(diagnostics.is_empty());

        // 1.1 is not exactly representable as f32.
        let (tokens, _) = lex_str("1.1");
        assert_eq!(tokens[0].value, Some(Value::F64(1.1)));
    }

    #[test]
    fn invalid_numbers() {
        for input in ["1_", "1__2", "1.2.3", "18446744073709551616"] {
            let (_, diagnostics) = lex_str(input);
            assert_eq!(
                diagnostics.len(),
                1,
                "input: {input}, got: {diagnostics:?}"
            );
            assert_eq!(diagnostics[0].kind, DiagnosticKind::InvalidNumber);
        }
    }

    #[test]
    fn string_literals() {
        let (tokens, diagnostics) = lex_str(r#""hello" "say ""hi""" "" 'a' '''' "#);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        let values: Vec<_> = tokens.iter().filter_map(|t| t.value.clone()).collect();
        assert_eq!(
            values,
            [
                Value::Str(Rc::from("hello")),
                Value::Str(Rc::from("say \"hi\"")),
                Value::Str(Rc::from("")),
                Value::Char('a'),
                Value::Char('\''),
            ]
        );
    }

    #[test]
    fn unterminated_literals() {
        let (_, diagnostics) = lex_str("\"abc");
        assert_eq!(diagnostics[0].kind, DiagnosticKind::UnterminatedString);

        let (_, diagnostics) = lex_str("\"abc\ndef\"");
        assert_eq!(diagnostics[0].kind, DiagnosticKind::UnterminatedString);

        let (_, diagnostics) = lex_str("/* never closed");
        assert_eq!(diagnostics[0].kind, DiagnosticKind::UnterminatedComment);

        let (_, diagnostics) = lex_str("'ab'");
        assert_eq!(diagnostics[0].kind, DiagnosticKind::InvalidCharacterLiteral);
    }

    #[test]
    fn bad_character() {
        let (tokens, diagnostics) = lex_str("a # b");
        assert_eq!(tokens[1].kind, TokenKind::Bad);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::BadCharacter('#'));
    }

    #[test]
    fn trivia_attachment() {
        // Leading trivia belongs to the following token; trailing trivia
        // runs up to and including the line break.
        let (tokens, _) = lex_str("a // note\n  b");
        let a = &tokens[0];
        let b = &tokens[1];
        assert!(a.leading.is_empty());
        assert_eq!(
            a.trailing.iter().map(|t| t.kind).collect::<Vec<_>>(),
            [
                TriviaKind::Whitespace,
                TriviaKind::LineComment,
                TriviaKind::LineBreak
            ]
        );
        assert_eq!(
            b.leading.iter().map(|t| t.kind).collect::<Vec<_>>(),
            [TriviaKind::Whitespace]
        );
        assert!(b.trailing.is_empty());
    }

    #[test]
    fn round_trip_reassembles_source() {
        let inputs = [
            "",
            "   ",
            "function f(a: int32): int32 {\r\n    return a * 2; // double\n}\n",
            "/* block\n comment */ var x = 1_000 + 2.5;\nwriteLine(\"ok\")",
            "a # ! @ \"unterminated",
        ];
        for input in inputs {
            let source = Rc::new(SourceText::new(input));
            let (tokens, _) = lex(&source);
            let mut rebuilt = String::new();
            for token in &tokens {
                for trivia in &token.leading {
                    rebuilt.push_str(source.slice(trivia.span));
                }
                rebuilt.push_str(source.slice(token.span));
                for trivia in &token.trailing {
                    rebuilt.push_str(source.slice(trivia.span));
                }
            }
            assert_eq!(rebuilt, input);
        }
    }

    #[test]
    fn eof_is_sticky() {
        let source = Rc::new(SourceText::new("x"));
        let mut lexer = Lexer::new(&source);
        assert_eq!(lexer.next_token().kind, TokenKind::Identifier);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn until_eof_fuses_after_the_eof_token() {
        let source = Rc::new(SourceText::new("a b"));
        let kinds: Vec<_> = Lexer::new(&source).until_eof().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            [TokenKind::Identifier, TokenKind::Identifier, TokenKind::Eof]
        );
        assert!(Lexer::new(&source).until_eof().nth(3).is_none());
    }
}

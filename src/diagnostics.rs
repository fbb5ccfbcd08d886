use std::{fmt, rc::Rc};

use crate::{
    text::SourceText,
    token::{Span, TokenKind},
};

/// A span paired with the text it points into. Carried on every diagnostic
/// and every bound node.
#[derive(Clone)]
pub struct Location {
    pub source: Rc<SourceText>,
    pub span: Span,
}

impl Location {
    pub fn new(source: Rc<SourceText>, span: Span) -> Location {
        Location { source, span }
    }

    /// One-based `(line, column)` of the location's start.
    pub fn line_col(&self) -> (usize, usize) {
        self.source.line_col(self.span.lo)
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (line, col) = self.line_col();
        match self.source.filename() {
            Some(name) => write!(f, "{name}:{line}:{col}"),
            None => write!(f, "{line}:{col}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub location: Location,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn is_warning(&self) -> bool {
        self.kind.is_warning()
    }

    pub fn is_error(&self) -> bool {
        !self.kind.is_warning()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{}: ", self.location.span)?;
        }
        write!(f, "{}", self.kind)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    BadCharacter(char),
    UnterminatedString,
    UnterminatedComment,
    InvalidNumber,
    InvalidCharacterLiteral,
    UnexpectedToken { got: TokenKind, want: TokenKind },
    UndefinedType(Box<str>),
    UndefinedVariable(Box<str>),
    UndefinedFunction(Box<str>),
    NotAFunction(Box<str>),
    NotAVariable(Box<str>),
    NotAClass(Box<str>),
    SymbolAlreadyDeclared(Box<str>),
    ParameterAlreadyDeclared(Box<str>),
    CannotAssign(Box<str>),
    CannotConvert { from: Box<str>, to: Box<str> },
    CannotConvertImplicitly { from: Box<str>, to: Box<str> },
    UndefinedUnaryOperator { op: Box<str>, operand: Box<str> },
    UndefinedBinaryOperator { op: Box<str>, lhs: Box<str>, rhs: Box<str> },
    ExpressionMustHaveValue,
    InvalidBreakOrContinue(Box<str>),
    InvalidReturnExpression,
    MissingReturnExpression,
    AllPathsMustReturn(Box<str>),
    InvalidExpressionStatement,
    DivideByZero,
    UnreachableCode,
    CannotMixMainAndGlobalStatements,
    MainMustHaveCorrectSignature,
    OnlyOneFileCanHaveGlobalStatements,
    CannotUseThisOutsideOfReceiver,
    UndefinedClassField { class: Box<str>, field: Box<str> },
    ArgumentCountMismatch { expected: usize, got: usize },
}

impl DiagnosticKind {
    pub fn is_warning(&self) -> bool {
        matches!(self, DiagnosticKind::UnreachableCode)
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DiagnosticKind::*;
        match self {
            BadCharacter(c) => write!(f, "bad character {c:?} in input"),
            UnterminatedString => write!(f, "unterminated string literal"),
            UnterminatedComment => write!(f, "unterminated multi-line comment"),
            InvalidNumber => write!(f, "invalid number literal"),
            InvalidCharacterLiteral => {
                write!(f, "character literal must contain exactly one character")
            }
            UnexpectedToken { got, want } => {
                write!(f, "unexpected token {got:?}, expected {want:?}")
            }
            UndefinedType(name) => write!(f, "type {name} is not defined"),
            UndefinedVariable(name) => write!(f, "variable {name} is not defined"),
            UndefinedFunction(name) => {
                write!(f, "function {name} with matching arguments is not defined")
            }
            NotAFunction(name) => write!(f, "{name} is not a function"),
            NotAVariable(name) => write!(f, "{name} is not a variable"),
            NotAClass(name) => write!(f, "{name} is not a class"),
            SymbolAlreadyDeclared(name) => write!(f, "{name} is already declared"),
            ParameterAlreadyDeclared(name) => {
                write!(f, "a parameter named {name} is already declared")
            }
            CannotAssign(name) => write!(f, "cannot assign to read-only {name}"),
            CannotConvert { from, to } => write!(f, "cannot convert type {from} to {to}"),
            CannotConvertImplicitly { from, to } => write!(
                f,
                "cannot implicitly convert type {from} to {to}; an explicit conversion exists \
                 (are you missing a cast?)"
            ),
            UndefinedUnaryOperator { op, operand } => {
                write!(f, "unary operator {op} is not defined for type {operand}")
            }
            UndefinedBinaryOperator { op, lhs, rhs } => write!(
                f,
                "binary operator {op} is not defined for types {lhs} and {rhs}"
            ),
            ExpressionMustHaveValue => write!(f, "expression must have a value"),
            InvalidBreakOrContinue(keyword) => {
                write!(f, "{keyword} can only be used inside of a loop")
            }
            InvalidReturnExpression => {
                write!(f, "a void function cannot return a value")
            }
            MissingReturnExpression => write!(f, "an expression of the return type is expected"),
            AllPathsMustReturn(name) => {
                write!(f, "not all code paths of {name} return a value")
            }
            InvalidExpressionStatement => {
                write!(f, "only assignment and call expressions can be used as a statement")
            }
            DivideByZero => write!(f, "division by constant zero"),
            UnreachableCode => write!(f, "unreachable code detected"),
            CannotMixMainAndGlobalStatements => write!(
                f,
                "cannot declare main function when global statements are used"
            ),
            MainMustHaveCorrectSignature => {
                write!(f, "main must not take arguments and not return anything")
            }
            OnlyOneFileCanHaveGlobalStatements => {
                write!(f, "at most one file can have global statements")
            }
            CannotUseThisOutsideOfReceiver => {
                write!(f, "this can only be used inside an instance method")
            }
            UndefinedClassField { class, field } => {
                write!(f, "class {class} has no field {field}")
            }
            ArgumentCountMismatch { expected, got } => {
                write!(f, "expected {expected} arguments, but got {got}")
            }
        }
    }
}

/// Accumulates diagnostics in emission order. Stages never throw for user
/// errors and never stop at the first one.
#[derive(Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> DiagnosticBag {
        DiagnosticBag::default()
    }

    pub fn report(&mut self, location: Location, kind: DiagnosticKind) {
        self.diagnostics.push(Diagnostic { location, kind });
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(other);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_with_span_prefix() {
        let source = Rc::new(SourceText::new("10 / 0"));
        let diagnostic = Diagnostic {
            location: Location::new(source, Span::new_of_bounds(0..6)),
            kind: DiagnosticKind::DivideByZero,
        };
        assert_eq!(diagnostic.to_string(), "division by constant zero");
        assert_eq!(format!("{diagnostic:#}"), "0..6: division by constant zero");
    }

    #[test]
    fn severity() {
        assert!(DiagnosticKind::UnreachableCode.is_warning());
        assert!(!DiagnosticKind::DivideByZero.is_warning());
    }
}

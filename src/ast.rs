// compilation-unit ::= member* EOF
// member ::= function-decl | class-decl | statement
// function-decl ::= 'function' [ID '.'] ID '(' [param (',' param)*] ')' [':' ID] block
// param ::= ID ':' ID
// class-decl ::= 'class' ID '{' field-decl* '}'
// field-decl ::= ['const'] ID ':' ID ['=' expr] [';']
// statement ::= block
//             | ('var' | 'const') ID [':' ID] ['=' expr] [';']
//             | 'if' expr statement ['else' statement]
//             | 'while' expr statement
//             | 'do' statement 'while' expr [';']
//             | 'for' ID 'in' expr '..' expr statement
//             | 'break' [';'] | 'continue' [';']
//             | 'return' [expr] [';']
//             | expr [';']
// block ::= '{' statement* '}'
// expr ::= assignment
// assignment ::= binary [assign-op assignment]
// binary ::= unary (bin-op unary)*                 // Pratt, see token precedence
// unary ::= ('+' | '-' | '!' | '~') unary | postfix
// postfix ::= primary ('(' [expr (',' expr)*] ')' | '.' ID)*
// primary ::= '(' expr ')' | literal | 'true' | 'false' | 'this' | ID

use std::fmt;

use crate::{
    token::{Span, TokenKind},
    types::Value,
    util::intern::Name,
};

#[derive(Debug)]
pub struct CompilationUnit {
    pub members: Vec<Member>,
    pub eof: Span,
}

#[derive(Debug)]
pub enum Member {
    Function(FunctionDecl),
    Class(ClassDecl),
    /// A statement at the top level of a file.
    Global(Stmt),
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub keyword: Span,
    /// Class name before the dot; declares an instance method.
    pub receiver: Option<Ident>,
    pub name: Ident,
    pub params: SeparatedList<Param>,
    pub return_ty: Option<TypeClause>,
    pub body: Stmt,
    pub span: Span,
}

#[derive(Debug)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeClause,
}

#[derive(Debug)]
pub struct TypeClause {
    pub colon: Span,
    pub name: Ident,
}

#[derive(Debug)]
pub struct ClassDecl {
    pub keyword: Span,
    pub name: Ident,
    pub fields: Vec<FieldDecl>,
    pub span: Span,
}

#[derive(Debug)]
pub struct FieldDecl {
    pub const_kw: Option<Span>,
    pub name: Ident,
    pub ty: TypeClause,
    pub initializer: Option<Expr>,
    pub span: Span,
}

#[derive(Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum StmtKind {
    Block(Vec<Stmt>),
    VariableDeclaration {
        /// `TokenKind::Var` or `TokenKind::Const`.
        keyword: TokenKind,
        name: Ident,
        ty: Option<TypeClause>,
        initializer: Option<Expr>,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
    },
    For {
        variable: Ident,
        lower: Expr,
        upper: Expr,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Return {
        value: Option<Expr>,
    },
    Expression(Expr),
}

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn boxed(self) -> Box<Expr> {
        Box::new(self)
    }
}

#[derive(Debug)]
pub enum ExprKind {
    Literal(Value),
    Name(Ident),
    This,
    Unary {
        op: UnaryOp,
        op_span: Span,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        op_span: Span,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Paren(Box<Expr>),
    /// `target op= value`; `op` is `None` for plain assignment. The target
    /// shape (name, member access) is classified during binding.
    Assignment {
        op: Option<BinaryOp>,
        op_span: Span,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: SeparatedList<Expr>,
    },
    Member {
        object: Box<Expr>,
        name: Ident,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Identity,
    Negation,
    LogicalNot,
    BitwiseNot,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Identity => "+",
            UnaryOp::Negation => "-",
            UnaryOp::LogicalNot => "!",
            UnaryOp::BitwiseNot => "~",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        })
    }
}

/// Maps a prefix operator token to its operator.
pub fn unary_operator(kind: TokenKind) -> Option<UnaryOp> {
    Some(match kind {
        TokenKind::Plus => UnaryOp::Identity,
        TokenKind::Minus => UnaryOp::Negation,
        TokenKind::Bang => UnaryOp::LogicalNot,
        TokenKind::Tilde => UnaryOp::BitwiseNot,
        _ => return None,
    })
}

/// Maps a binary operator token to its operator.
pub fn binary_operator(kind: TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Rem,
        TokenKind::Amp => BinaryOp::BitAnd,
        TokenKind::Pipe => BinaryOp::BitOr,
        TokenKind::Caret => BinaryOp::BitXor,
        TokenKind::AmpAmp => BinaryOp::LogicalAnd,
        TokenKind::PipePipe => BinaryOp::LogicalOr,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::BangEq => BinaryOp::Ne,
        TokenKind::Less => BinaryOp::Lt,
        TokenKind::LessEq => BinaryOp::Le,
        TokenKind::Greater => BinaryOp::Gt,
        TokenKind::GreaterEq => BinaryOp::Ge,
        _ => return None,
    })
}

/// Recovers the underlying binary operator of a compound assignment token.
pub fn compound_operator(kind: TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::PlusEq => BinaryOp::Add,
        TokenKind::MinusEq => BinaryOp::Sub,
        TokenKind::StarEq => BinaryOp::Mul,
        TokenKind::SlashEq => BinaryOp::Div,
        TokenKind::PercentEq => BinaryOp::Rem,
        TokenKind::AmpEq => BinaryOp::BitAnd,
        TokenKind::PipeEq => BinaryOp::BitOr,
        TokenKind::CaretEq => BinaryOp::BitXor,
        _ => return None,
    })
}

/// A `,`-separated syntax list which preserves its separators.
#[derive(Debug)]
pub struct SeparatedList<T> {
    pub items: Vec<T>,
    pub separators: Vec<Span>,
}

impl<T> SeparatedList<T> {
    pub fn new() -> SeparatedList<T> {
        SeparatedList {
            items: Vec::new(),
            separators: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> Default for SeparatedList<T> {
    fn default() -> Self {
        SeparatedList::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ident {
    pub name: Name,
    pub span: Span,
}

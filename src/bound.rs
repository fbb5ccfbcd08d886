use std::{
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
};

use crate::{
    ast::{BinaryOp, UnaryOp},
    diagnostics::Location,
    symbols::{ClassId, FnId, VariableSymbol},
    types::{Ty, Value},
};

/// A jump target. Labels carry a textual name for diagnostics and dumps but
/// compare (and hash) by identity.
#[derive(Clone)]
pub struct Label(Rc<str>);

impl Label {
    pub fn new(name: impl Into<Rc<str>>) -> Label {
        Label(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Label {}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as *const u8 as usize).hash(state);
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label({})", self.0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A flat sequence of lowered statements, the unit consumed by the
/// control-flow-graph analyzer and the emitter.
#[derive(Clone, Debug, Default)]
pub struct BoundBlock {
    pub statements: Vec<BoundStmt>,
}

#[derive(Clone, Debug)]
pub struct BoundStmt {
    pub kind: BoundStmtKind,
    pub loc: Location,
}

#[derive(Clone, Debug)]
pub enum BoundStmtKind {
    Block(Vec<BoundStmt>),
    Expression(BoundExpr),
    VariableDeclaration {
        variable: Rc<VariableSymbol>,
        initializer: BoundExpr,
    },
    If {
        condition: BoundExpr,
        then_branch: Box<BoundStmt>,
        else_branch: Option<Box<BoundStmt>>,
    },
    While {
        condition: BoundExpr,
        body: Box<BoundStmt>,
        break_label: Label,
        continue_label: Label,
    },
    DoWhile {
        body: Box<BoundStmt>,
        condition: BoundExpr,
        break_label: Label,
        continue_label: Label,
    },
    For {
        variable: Rc<VariableSymbol>,
        lower: BoundExpr,
        upper: BoundExpr,
        body: Box<BoundStmt>,
        break_label: Label,
        continue_label: Label,
    },
    Label(Label),
    Goto(Label),
    ConditionalGoto {
        label: Label,
        condition: BoundExpr,
        /// Jump when the condition evaluates to this value.
        jump_if: bool,
    },
    Return(Option<BoundExpr>),
    Nop,
}

#[derive(Clone, Debug)]
pub struct BoundExpr {
    pub kind: BoundExprKind,
    pub ty: Ty,
    /// Folded compile-time value, when one was computed during binding.
    /// Immutable once set.
    pub constant: Option<Value>,
    pub loc: Location,
}

impl BoundExpr {
    /// The sentinel expression; its `error` type suppresses cascading
    /// diagnostics in every consumer.
    pub fn error(loc: Location) -> BoundExpr {
        BoundExpr {
            kind: BoundExprKind::Error,
            ty: Ty::Error,
            constant: None,
            loc,
        }
    }

    pub fn literal(value: Value, loc: Location) -> BoundExpr {
        BoundExpr {
            ty: value.ty(),
            constant: Some(value.clone()),
            kind: BoundExprKind::Literal,
            loc,
        }
    }

    /// A literal carried at a type other than the value's natural one
    /// (e.g. the float128 zero stored as an f64).
    pub fn typed_literal(value: Value, ty: Ty, loc: Location) -> BoundExpr {
        BoundExpr {
            ty,
            constant: Some(value),
            kind: BoundExprKind::Literal,
            loc,
        }
    }

    pub fn variable(variable: Rc<VariableSymbol>, loc: Location) -> BoundExpr {
        BoundExpr {
            ty: variable.ty,
            constant: None,
            kind: BoundExprKind::Variable(variable),
            loc,
        }
    }
}

#[derive(Clone, Debug)]
pub enum BoundExprKind {
    Error,
    /// The value lives in [`BoundExpr::constant`].
    Literal,
    Variable(Rc<VariableSymbol>),
    Assignment {
        variable: Rc<VariableSymbol>,
        value: Box<BoundExpr>,
    },
    CompoundAssignment {
        variable: Rc<VariableSymbol>,
        op: BoundBinaryOp,
        value: Box<BoundExpr>,
    },
    FieldAccess {
        instance: Box<BoundExpr>,
        class: ClassId,
        field: usize,
    },
    FieldAssignment {
        instance: Box<BoundExpr>,
        class: ClassId,
        field: usize,
        value: Box<BoundExpr>,
    },
    CompoundFieldAssignment {
        instance: Box<BoundExpr>,
        class: ClassId,
        field: usize,
        op: BoundBinaryOp,
        value: Box<BoundExpr>,
    },
    Unary {
        op: BoundUnaryOp,
        operand: Box<BoundExpr>,
    },
    Binary {
        op: BoundBinaryOp,
        lhs: Box<BoundExpr>,
        rhs: Box<BoundExpr>,
    },
    Call {
        function: FnId,
        /// Receiver expression for instance-method calls.
        instance: Option<Box<BoundExpr>>,
        args: Vec<BoundExpr>,
    },
    /// The target type is the expression's `ty`.
    Conversion {
        expr: Box<BoundExpr>,
    },
    /// Flattened n-ary string concatenation, produced by lowering.
    StringConcat(Vec<BoundExpr>),
}

/// A resolved unary operator: the syntactic operator plus its operand and
/// result types.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BoundUnaryOp {
    pub kind: UnaryOp,
    pub operand_ty: Ty,
    pub ty: Ty,
}

impl BoundUnaryOp {
    pub fn bind(op: UnaryOp, operand: Ty) -> Option<BoundUnaryOp> {
        use UnaryOp::*;
        let ty = match op {
            Identity | Negation if operand.is_numeric() => operand,
            LogicalNot if operand == Ty::Bool => Ty::Bool,
            BitwiseNot if operand.is_integer() || operand == Ty::Bool => operand,
            _ => return None,
        };
        Some(BoundUnaryOp {
            kind: op,
            operand_ty: operand,
            ty,
        })
    }
}

/// A resolved binary operator. Operand types are expected to already agree
/// (the binder widens the narrower side beforehand).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BoundBinaryOp {
    pub kind: BinaryOp,
    pub lhs_ty: Ty,
    pub rhs_ty: Ty,
    pub ty: Ty,
}

impl BoundBinaryOp {
    pub fn bind(op: BinaryOp, lhs: Ty, rhs: Ty) -> Option<BoundBinaryOp> {
        use BinaryOp::*;
        let bound = |ty| {
            Some(BoundBinaryOp {
                kind: op,
                lhs_ty: lhs,
                rhs_ty: rhs,
                ty,
            })
        };
        match op {
            Add if lhs == Ty::String && rhs == Ty::String => bound(Ty::String),
            Add | Sub | Mul | Div | Rem if lhs == rhs && lhs.is_numeric() => bound(lhs),
            BitAnd | BitOr | BitXor if lhs == rhs && (lhs.is_integer() || lhs == Ty::Bool) => {
                bound(lhs)
            }
            LogicalAnd | LogicalOr if lhs == Ty::Bool && rhs == Ty::Bool => bound(Ty::Bool),
            Eq | Ne if lhs == rhs && lhs != Ty::Void => bound(Ty::Bool),
            Lt | Le | Gt | Ge if lhs == rhs && (lhs.is_numeric() || lhs == Ty::Char) => {
                bound(Ty::Bool)
            }
            _ => None,
        }
    }
}

/// Coerces a wide integer into the value shape of `ty`. The coercion is
/// silently truncating, matching the literal retyping behavior of variable
/// declarations.
fn make_int(ty: Ty, v: i128) -> Option<Value> {
    Some(match ty {
        Ty::I8 => Value::I8(v as i8),
        Ty::I16 => Value::I16(v as i16),
        Ty::I32 => Value::I32(v as i32),
        Ty::I64 => Value::I64(v as i64),
        Ty::U8 => Value::U8(v as u8),
        Ty::U16 => Value::U16(v as u16),
        Ty::U32 => Value::U32(v as u32),
        Ty::U64 => Value::U64(v as u64),
        _ => return None,
    })
}

fn make_float(ty: Ty, v: f64) -> Option<Value> {
    Some(match ty {
        Ty::F32 => Value::F32(v as f32),
        Ty::F64 => Value::F64(v),
        // float128 has no constant representation; never fold into it.
        _ => return None,
    })
}

/// Folds a unary operation over a constant operand. Arithmetic happens wide
/// and coerces at the literal boundary.
pub fn fold_unary(op: &BoundUnaryOp, operand: &BoundExpr) -> Option<Value> {
    let value = operand.constant.as_ref()?;
    use UnaryOp::*;
    match op.kind {
        Identity => Some(value.clone()),
        Negation => {
            if op.ty.is_integer() {
                make_int(op.ty, -value.to_i128()?)
            } else {
                make_float(op.ty, -value.to_f64()?)
            }
        }
        LogicalNot => match value {
            Value::Bool(b) => Some(Value::Bool(!b)),
            _ => None,
        },
        BitwiseNot => match value {
            Value::Bool(b) => Some(Value::Bool(!b)),
            _ => make_int(op.ty, !value.to_i128()?),
        },
    }
}

/// Folds a binary operation over constant operands.
pub fn fold_binary(op: &BoundBinaryOp, lhs: &BoundExpr, rhs: &BoundExpr) -> Option<Value> {
    let (l, r) = (lhs.constant.as_ref()?, rhs.constant.as_ref()?);
    use BinaryOp::*;
    match op.kind {
        Add if op.ty == Ty::String => match (l, r) {
            (Value::Str(a), Value::Str(b)) => {
                Some(Value::Str(Rc::from(format!("{a}{b}").as_str())))
            }
            _ => None,
        },
        Add | Sub | Mul | Div | Rem if op.ty.is_integer() => {
            let (a, b) = (l.to_i128()?, r.to_i128()?);
            let v = match op.kind {
                Add => a + b,
                Sub => a - b,
                Mul => a.checked_mul(b)?,
                Div => a.checked_div(b)?,
                Rem => a.checked_rem(b)?,
                _ => unreachable!(),
            };
            make_int(op.ty, v)
        }
        Add | Sub | Mul | Div | Rem => {
            let (a, b) = (l.to_f64()?, r.to_f64()?);
            let v = match op.kind {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                Rem => a % b,
                _ => unreachable!(),
            };
            make_float(op.ty, v)
        }
        BitAnd | BitOr | BitXor => match (l, r) {
            (Value::Bool(a), Value::Bool(b)) => Some(Value::Bool(match op.kind {
                BitAnd => a & b,
                BitOr => a | b,
                BitXor => a ^ b,
                _ => unreachable!(),
            })),
            _ => {
                let (a, b) = (l.to_i128()?, r.to_i128()?);
                let v = match op.kind {
                    BitAnd => a & b,
                    BitOr => a | b,
                    BitXor => a ^ b,
                    _ => unreachable!(),
                };
                make_int(op.ty, v)
            }
        },
        LogicalAnd | LogicalOr => match (l, r) {
            (Value::Bool(a), Value::Bool(b)) => Some(Value::Bool(match op.kind {
                LogicalAnd => *a && *b,
                LogicalOr => *a || *b,
                _ => unreachable!(),
            })),
            _ => None,
        },
        Eq => Some(Value::Bool(l == r)),
        Ne => Some(Value::Bool(l != r)),
        Lt | Le | Gt | Ge => {
            let ordering = if op.lhs_ty.is_integer() {
                l.to_i128()?.partial_cmp(&r.to_i128()?)
            } else if op.lhs_ty == Ty::Char {
                match (l, r) {
                    (Value::Char(a), Value::Char(b)) => a.partial_cmp(b),
                    _ => None,
                }
            } else {
                l.to_f64()?.partial_cmp(&r.to_f64()?)
            };
            let ordering = ordering?;
            Some(Value::Bool(match op.kind {
                Lt => ordering.is_lt(),
                Le => ordering.is_le(),
                Gt => ordering.is_gt(),
                Ge => ordering.is_ge(),
                _ => unreachable!(),
            }))
        }
    }
}

/// Folds a conversion of a constant to `to`. Numeric narrowing is silently
/// coercive; conversions that cannot be represented at compile time (e.g.
/// into float128, or a failing string parse) yield `None` and stay runtime
/// conversions.
pub fn fold_conversion(to: Ty, value: &Value) -> Option<Value> {
    if value.ty() == to {
        return Some(value.clone());
    }
    match to {
        _ if to.is_integer() => {
            if let Value::Str(s) = value {
                return make_int(to, s.trim().parse::<i128>().ok()?);
            }
            if let Value::Char(c) = value {
                return make_int(to, *c as u32 as i128);
            }
            if let Some(i) = value.to_i128() {
                return make_int(to, i);
            }
            make_int(to, value.to_f64()? as i128)
        }
        Ty::F32 | Ty::F64 => {
            if let Value::Str(s) = value {
                return make_float(to, s.trim().parse::<f64>().ok()?);
            }
            if let Value::Char(c) = value {
                return make_float(to, f64::from(*c as u32));
            }
            make_float(to, value.to_f64()?)
        }
        Ty::String => Some(Value::Str(Rc::from(value.to_string().as_str()))),
        Ty::Char => {
            let code = u32::try_from(value.to_i128()?).ok()?;
            char::from_u32(code).map(Value::Char)
        }
        // Boxing to object keeps the constant; the node's type carries the
        // object-ness.
        Ty::Object => Some(value.clone()),
        _ => None,
    }
}

/// Structural bound-tree rewriter: a match over every node kind where the
/// default arm rebuilds children and otherwise returns the node unchanged.
/// Passes override only the arms they care about.
pub trait BoundTreeRewriter {
    fn rewrite_block(&mut self, block: BoundBlock) -> BoundBlock {
        BoundBlock {
            statements: block
                .statements
                .into_iter()
                .map(|stmt| self.rewrite_stmt(stmt))
                .collect(),
        }
    }

    fn rewrite_stmt(&mut self, stmt: BoundStmt) -> BoundStmt {
        let BoundStmt { kind, loc } = stmt;
        use BoundStmtKind::*;
        match kind {
            Block(statements) => BoundStmt {
                kind: Block(
                    statements
                        .into_iter()
                        .map(|stmt| self.rewrite_stmt(stmt))
                        .collect(),
                ),
                loc,
            },
            Expression(expr) => BoundStmt {
                kind: Expression(self.rewrite_expr(expr)),
                loc,
            },
            VariableDeclaration {
                variable,
                initializer,
            } => BoundStmt {
                kind: VariableDeclaration {
                    variable,
                    initializer: self.rewrite_expr(initializer),
                },
                loc,
            },
            If {
                condition,
                then_branch,
                else_branch,
            } => self.rewrite_if(condition, *then_branch, else_branch.map(|b| *b), loc),
            While {
                condition,
                body,
                break_label,
                continue_label,
            } => self.rewrite_while(condition, *body, break_label, continue_label, loc),
            DoWhile {
                body,
                condition,
                break_label,
                continue_label,
            } => self.rewrite_do_while(*body, condition, break_label, continue_label, loc),
            For {
                variable,
                lower,
                upper,
                body,
                break_label,
                continue_label,
            } => self.rewrite_for(
                variable,
                lower,
                upper,
                *body,
                break_label,
                continue_label,
                loc,
            ),
            ConditionalGoto {
                label,
                condition,
                jump_if,
            } => BoundStmt {
                kind: ConditionalGoto {
                    label,
                    condition: self.rewrite_expr(condition),
                    jump_if,
                },
                loc,
            },
            Return(value) => BoundStmt {
                kind: Return(value.map(|value| self.rewrite_expr(value))),
                loc,
            },
            kind @ (Label(_) | Goto(_) | Nop) => BoundStmt { kind, loc },
        }
    }

    fn rewrite_if(
        &mut self,
        condition: BoundExpr,
        then_branch: BoundStmt,
        else_branch: Option<BoundStmt>,
        loc: Location,
    ) -> BoundStmt {
        BoundStmt {
            kind: BoundStmtKind::If {
                condition: self.rewrite_expr(condition),
                then_branch: Box::new(self.rewrite_stmt(then_branch)),
                else_branch: else_branch.map(|stmt| Box::new(self.rewrite_stmt(stmt))),
            },
            loc,
        }
    }

    fn rewrite_while(
        &mut self,
        condition: BoundExpr,
        body: BoundStmt,
        break_label: Label,
        continue_label: Label,
        loc: Location,
    ) -> BoundStmt {
        BoundStmt {
            kind: BoundStmtKind::While {
                condition: self.rewrite_expr(condition),
                body: Box::new(self.rewrite_stmt(body)),
                break_label,
                continue_label,
            },
            loc,
        }
    }

    fn rewrite_do_while(
        &mut self,
        body: BoundStmt,
        condition: BoundExpr,
        break_label: Label,
        continue_label: Label,
        loc: Location,
    ) -> BoundStmt {
        BoundStmt {
            kind: BoundStmtKind::DoWhile {
                body: Box::new(self.rewrite_stmt(body)),
                condition: self.rewrite_expr(condition),
                break_label,
                continue_label,
            },
            loc,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rewrite_for(
        &mut self,
        variable: Rc<VariableSymbol>,
        lower: BoundExpr,
        upper: BoundExpr,
        body: BoundStmt,
        break_label: Label,
        continue_label: Label,
        loc: Location,
    ) -> BoundStmt {
        BoundStmt {
            kind: BoundStmtKind::For {
                variable,
                lower: self.rewrite_expr(lower),
                upper: self.rewrite_expr(upper),
                body: Box::new(self.rewrite_stmt(body)),
                break_label,
                continue_label,
            },
            loc,
        }
    }

    fn rewrite_expr(&mut self, expr: BoundExpr) -> BoundExpr {
        let BoundExpr {
            kind,
            ty,
            constant,
            loc,
        } = expr;
        use BoundExprKind::*;
        let rebuilt = {
            let constant = constant.clone();
            let loc = loc.clone();
            move |kind| BoundExpr {
                kind,
                ty,
                constant,
                loc,
            }
        };
        match kind {
            Assignment { variable, value } => {
                let value = Box::new(self.rewrite_expr(*value));
                rebuilt(Assignment { variable, value })
            }
            CompoundAssignment { variable, op, value } => {
                self.rewrite_compound_assignment(variable, op, *value, ty, loc)
            }
            FieldAccess {
                instance,
                class,
                field,
            } => {
                let instance = Box::new(self.rewrite_expr(*instance));
                rebuilt(FieldAccess {
                    instance,
                    class,
                    field,
                })
            }
            FieldAssignment {
                instance,
                class,
                field,
                value,
            } => {
                let instance = Box::new(self.rewrite_expr(*instance));
                let value = Box::new(self.rewrite_expr(*value));
                rebuilt(FieldAssignment {
                    instance,
                    class,
                    field,
                    value,
                })
            }
            CompoundFieldAssignment {
                instance,
                class,
                field,
                op,
                value,
            } => self.rewrite_compound_field_assignment(*instance, class, field, op, *value, ty, loc),
            Unary { op, operand } => {
                let operand = Box::new(self.rewrite_expr(*operand));
                rebuilt(Unary { op, operand })
            }
            Binary { op, lhs, rhs } => self.rewrite_binary(op, *lhs, *rhs, ty, constant, loc),
            Call {
                function,
                instance,
                args,
            } => {
                let instance = instance.map(|instance| Box::new(self.rewrite_expr(*instance)));
                let args = args.into_iter().map(|arg| self.rewrite_expr(arg)).collect();
                rebuilt(Call {
                    function,
                    instance,
                    args,
                })
            }
            Conversion { expr } => {
                let expr = Box::new(self.rewrite_expr(*expr));
                rebuilt(Conversion { expr })
            }
            StringConcat(parts) => {
                let parts = parts
                    .into_iter()
                    .map(|part| self.rewrite_expr(part))
                    .collect();
                rebuilt(StringConcat(parts))
            }
            kind @ (Error | Literal | Variable(_)) => rebuilt(kind),
        }
    }

    fn rewrite_compound_assignment(
        &mut self,
        variable: Rc<VariableSymbol>,
        op: BoundBinaryOp,
        value: BoundExpr,
        ty: Ty,
        loc: Location,
    ) -> BoundExpr {
        BoundExpr {
            kind: BoundExprKind::CompoundAssignment {
                variable,
                op,
                value: Box::new(self.rewrite_expr(value)),
            },
            ty,
            constant: None,
            loc,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rewrite_compound_field_assignment(
        &mut self,
        instance: BoundExpr,
        class: ClassId,
        field: usize,
        op: BoundBinaryOp,
        value: BoundExpr,
        ty: Ty,
        loc: Location,
    ) -> BoundExpr {
        BoundExpr {
            kind: BoundExprKind::CompoundFieldAssignment {
                instance: Box::new(self.rewrite_expr(instance)),
                class,
                field,
                op,
                value: Box::new(self.rewrite_expr(value)),
            },
            ty,
            constant: None,
            loc,
        }
    }

    fn rewrite_binary(
        &mut self,
        op: BoundBinaryOp,
        lhs: BoundExpr,
        rhs: BoundExpr,
        ty: Ty,
        constant: Option<Value>,
        loc: Location,
    ) -> BoundExpr {
        BoundExpr {
            kind: BoundExprKind::Binary {
                op,
                lhs: Box::new(self.rewrite_expr(lhs)),
                rhs: Box::new(self.rewrite_expr(rhs)),
            },
            ty,
            constant,
            loc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::SourceText;
    use crate::token::Span;
    use pretty_assertions::assert_eq;

    fn loc() -> Location {
        Location::new(Rc::new(SourceText::new("")), Span::empty(0))
    }

    fn lit(value: Value) -> BoundExpr {
        BoundExpr::literal(value, loc())
    }

    #[test]
    fn operator_table() {
        use BinaryOp::*;
        assert_eq!(BoundBinaryOp::bind(Add, Ty::I32, Ty::I32).unwrap().ty, Ty::I32);
        assert_eq!(
            BoundBinaryOp::bind(Add, Ty::String, Ty::String).unwrap().ty,
            Ty::String
        );
        assert_eq!(BoundBinaryOp::bind(Lt, Ty::F64, Ty::F64).unwrap().ty, Ty::Bool);
        assert_eq!(
            BoundBinaryOp::bind(Eq, Ty::Bool, Ty::Bool).unwrap().ty,
            Ty::Bool
        );
        assert_eq!(
            BoundBinaryOp::bind(BitXor, Ty::Bool, Ty::Bool).unwrap().ty,
            Ty::Bool
        );
        assert!(BoundBinaryOp::bind(Add, Ty::I32, Ty::I64).is_none());
        assert!(BoundBinaryOp::bind(Add, Ty::Bool, Ty::Bool).is_none());
        assert!(BoundBinaryOp::bind(BitAnd, Ty::F32, Ty::F32).is_none());

        use UnaryOp::*;
        assert_eq!(BoundUnaryOp::bind(Negation, Ty::I32).unwrap().ty, Ty::I32);
        assert_eq!(BoundUnaryOp::bind(LogicalNot, Ty::Bool).unwrap().ty, Ty::Bool);
        assert!(BoundUnaryOp::bind(LogicalNot, Ty::I32).is_none());
        assert!(BoundUnaryOp::bind(BitwiseNot, Ty::F64).is_none());
    }

    #[test]
    fn folding_arithmetic() {
        let op = BoundBinaryOp::bind(BinaryOp::Add, Ty::I32, Ty::I32).unwrap();
        let folded = fold_binary(&op, &lit(Value::I32(1)), &lit(Value::I32(2)));
        assert_eq!(folded, Some(Value::I32(3)));

        let op = BoundBinaryOp::bind(BinaryOp::Mul, Ty::F64, Ty::F64).unwrap();
        let folded = fold_binary(&op, &lit(Value::F64(1.5)), &lit(Value::F64(2.0)));
        assert_eq!(folded, Some(Value::F64(3.0)));

        let op = BoundBinaryOp::bind(BinaryOp::Add, Ty::String, Ty::String).unwrap();
        let folded = fold_binary(
            &op,
            &lit(Value::Str(Rc::from("a"))),
            &lit(Value::Str(Rc::from("b"))),
        );
        assert_eq!(folded, Some(Value::Str(Rc::from("ab"))));
    }

    #[test]
    fn folding_is_idempotent() {
        let op = BoundBinaryOp::bind(BinaryOp::Sub, Ty::I64, Ty::I64).unwrap();
        let (l, r) = (lit(Value::I64(10)), lit(Value::I64(4)));
        let first = fold_binary(&op, &l, &r);
        let second = fold_binary(&op, &l, &r);
        assert_eq!(first, second);
        assert_eq!(first, Some(Value::I64(6)));
    }

    #[test]
    fn folding_does_not_divide_by_zero() {
        let op = BoundBinaryOp::bind(BinaryOp::Div, Ty::I32, Ty::I32).unwrap();
        assert_eq!(fold_binary(&op, &lit(Value::I32(1)), &lit(Value::I32(0))), None);
    }

    #[test]
    fn conversion_folding() {
        assert_eq!(fold_conversion(Ty::I64, &Value::I32(3)), Some(Value::I64(3)));
        // Narrowing coerces silently.
        assert_eq!(fold_conversion(Ty::I8, &Value::I32(300)), Some(Value::I8(44)));
        assert_eq!(
            fold_conversion(Ty::String, &Value::I32(42)),
            Some(Value::Str(Rc::from("42")))
        );
        assert_eq!(
            fold_conversion(Ty::I32, &Value::Str(Rc::from("17"))),
            Some(Value::I32(17))
        );
        assert_eq!(fold_conversion(Ty::I32, &Value::Str(Rc::from("nope"))), None);
        assert_eq!(fold_conversion(Ty::Char, &Value::I32(65)), Some(Value::Char('A')));
        assert_eq!(fold_conversion(Ty::F128, &Value::F64(1.0)), None);
        assert_eq!(
            fold_conversion(Ty::F64, &Value::I32(2)),
            Some(Value::F64(2.0))
        );
    }

    #[test]
    fn labels_compare_by_identity() {
        let a = Label::new("Label1");
        let b = Label::new("Label1");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}

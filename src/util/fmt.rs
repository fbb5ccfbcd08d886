use std::io::{self, Write};

use crate::{
    ast::{self, CompilationUnit, Member},
    bound::{BoundBlock, BoundExpr, BoundExprKind, BoundStmt, BoundStmtKind},
    symbols::Symbols,
    types::Value,
    util::intern::Interner,
};

const INDENT_WIDTH: usize = 4;

/// Everything needed to turn interned names and symbol handles back into
/// text.
pub struct Context<'a> {
    pub interner: &'a Interner,
    pub symbols: &'a Symbols,
}

pub fn print_block_string(ctx: &Context<'_>, block: &BoundBlock) -> String {
    let mut buf = Vec::with_capacity(512);
    print_block(&mut buf, ctx, block).expect("writing to a Vec cannot fail");
    String::from_utf8(buf).expect("printer emits UTF-8")
}

/// Prints a lowered block in a textual assembly-like form: labels dedented,
/// one statement per line.
pub fn print_block(w: &mut impl Write, ctx: &Context<'_>, block: &BoundBlock) -> io::Result<()> {
    for stmt in &block.statements {
        print_stmt(w, ctx, 1, stmt)?;
    }
    Ok(())
}

fn sp(w: &mut impl Write, i: usize) -> io::Result<()> {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}

fn print_stmt(w: &mut impl Write, ctx: &Context<'_>, i: usize, stmt: &BoundStmt) -> io::Result<()> {
    use BoundStmtKind::*;
    match &stmt.kind {
        Label(label) => return writeln!(w, "{label}:"),
        Block(statements) => {
            for stmt in statements {
                print_stmt(w, ctx, i, stmt)?;
            }
            return Ok(());
        }
        _ => {}
    }
    sp(w, i)?;
    match &stmt.kind {
        Expression(expr) => {
            print_expr(w, ctx, expr)?;
            writeln!(w)
        }
        VariableDeclaration {
            variable,
            initializer,
        } => {
            let keyword = if variable.read_only { "const" } else { "var" };
            let name = ctx.interner.resolve(variable.name);
            let ty = ctx.symbols.type_name(ctx.interner, variable.ty);
            write!(w, "{keyword} {name}: {ty} = ")?;
            print_expr(w, ctx, initializer)?;
            writeln!(w)
        }
        Goto(label) => writeln!(w, "goto {label}"),
        ConditionalGoto {
            label,
            condition,
            jump_if,
        } => {
            let mode = if *jump_if { "if" } else { "unless" };
            write!(w, "goto {label} {mode} ")?;
            print_expr(w, ctx, condition)?;
            writeln!(w)
        }
        Return(None) => writeln!(w, "return"),
        Return(Some(expr)) => {
            write!(w, "return ")?;
            print_expr(w, ctx, expr)?;
            writeln!(w)
        }
        Nop => writeln!(w, "nop"),
        If { .. } | While { .. } | DoWhile { .. } | For { .. } => {
            // Structured statements never survive lowering; show a marker
            // rather than panicking in a printer.
            writeln!(w, "<structured>")
        }
        Label(_) | Block(_) => unreachable!("handled above"),
    }
}

fn print_expr(w: &mut impl Write, ctx: &Context<'_>, expr: &BoundExpr) -> io::Result<()> {
    use BoundExprKind::*;
    match &expr.kind {
        Error => write!(w, "?"),
        Literal => match &expr.constant {
            Some(Value::Str(s)) => write!(w, "{s:?}"),
            Some(Value::Char(c)) => write!(w, "{c:?}"),
            Some(value) => write!(w, "{value}"),
            None => write!(w, "<literal>"),
        },
        Variable(variable) => write!(w, "{}", ctx.interner.resolve(variable.name)),
        Assignment { variable, value } => {
            write!(w, "{} = ", ctx.interner.resolve(variable.name))?;
            print_expr(w, ctx, value)
        }
        CompoundAssignment { variable, op, value } => {
            write!(w, "{} {}= ", ctx.interner.resolve(variable.name), op.kind)?;
            print_expr(w, ctx, value)
        }
        FieldAccess {
            instance,
            class,
            field,
        } => {
            print_expr(w, ctx, instance)?;
            write!(w, ".{}", field_name(ctx, *class, *field))
        }
        FieldAssignment {
            instance,
            class,
            field,
            value,
        } => {
            print_expr(w, ctx, instance)?;
            write!(w, ".{} = ", field_name(ctx, *class, *field))?;
            print_expr(w, ctx, value)
        }
        CompoundFieldAssignment {
            instance,
            class,
            field,
            op,
            value,
        } => {
            print_expr(w, ctx, instance)?;
            write!(w, ".{} {}= ", field_name(ctx, *class, *field), op.kind)?;
            print_expr(w, ctx, value)
        }
        Unary { op, operand } => {
            write!(w, "{}", op.kind)?;
            print_expr(w, ctx, operand)
        }
        Binary { op, lhs, rhs } => {
            write!(w, "(")?;
            print_expr(w, ctx, lhs)?;
            write!(w, " {} ", op.kind)?;
            print_expr(w, ctx, rhs)?;
            write!(w, ")")
        }
        Call {
            function,
            instance,
            args,
        } => {
            if let Some(instance) = instance {
                print_expr(w, ctx, instance)?;
                write!(w, ".")?;
            }
            let symbol = ctx.symbols.function(*function);
            let name = ctx.interner.resolve(symbol.name);
            if symbol.is_constructor {
                if let Some(class) = symbol.receiver {
                    write!(w, "{}", ctx.interner.resolve(ctx.symbols.class(class).name))?;
                }
            } else {
                write!(w, "{name}")?;
            }
            write!(w, "(")?;
            for (index, arg) in args.iter().enumerate() {
                if index > 0 {
                    write!(w, ", ")?;
                }
                print_expr(w, ctx, arg)?;
            }
            write!(w, ")")
        }
        Conversion { expr: inner } => {
            let ty = ctx.symbols.type_name(ctx.interner, expr.ty);
            write!(w, "{ty}(")?;
            print_expr(w, ctx, inner)?;
            write!(w, ")")
        }
        StringConcat(parts) => {
            write!(w, "concat(")?;
            for (index, part) in parts.iter().enumerate() {
                if index > 0 {
                    write!(w, ", ")?;
                }
                print_expr(w, ctx, part)?;
            }
            write!(w, ")")
        }
    }
}

fn field_name<'c>(ctx: &'c Context<'_>, class: crate::symbols::ClassId, field: usize) -> &'c str {
    ctx.interner
        .resolve(ctx.symbols.class(class).fields[field].name)
}

pub fn print_syntax_string(interner: &Interner, unit: &CompilationUnit) -> String {
    let mut buf = Vec::with_capacity(512);
    print_syntax(&mut buf, interner, unit).expect("writing to a Vec cannot fail");
    String::from_utf8(buf).expect("printer emits UTF-8")
}

/// Prints a syntax tree as an indented outline, one declaration or
/// statement per line with expressions rendered inline.
pub fn print_syntax(
    w: &mut impl Write,
    interner: &Interner,
    unit: &CompilationUnit,
) -> io::Result<()> {
    for member in &unit.members {
        match member {
            Member::Class(decl) => {
                writeln!(w, "class {}", interner.resolve(decl.name.name))?;
                for field in &decl.fields {
                    sp(w, 1)?;
                    if field.const_kw.is_some() {
                        write!(w, "const ")?;
                    }
                    write!(
                        w,
                        "{}: {}",
                        interner.resolve(field.name.name),
                        interner.resolve(field.ty.name.name)
                    )?;
                    if let Some(initializer) = &field.initializer {
                        write!(w, " = ")?;
                        print_syntax_expr(w, interner, initializer)?;
                    }
                    writeln!(w)?;
                }
            }
            Member::Function(decl) => {
                write!(w, "function ")?;
                if let Some(receiver) = &decl.receiver {
                    write!(w, "{}.", interner.resolve(receiver.name))?;
                }
                write!(w, "{}(", interner.resolve(decl.name.name))?;
                for (index, param) in decl.params.iter().enumerate() {
                    if index > 0 {
                        write!(w, ", ")?;
                    }
                    write!(
                        w,
                        "{}: {}",
                        interner.resolve(param.name.name),
                        interner.resolve(param.ty.name.name)
                    )?;
                }
                write!(w, ")")?;
                if let Some(clause) = &decl.return_ty {
                    write!(w, ": {}", interner.resolve(clause.name.name))?;
                }
                writeln!(w)?;
                print_syntax_stmt(w, interner, 1, &decl.body)?;
            }
            Member::Global(stmt) => print_syntax_stmt(w, interner, 0, stmt)?,
        }
    }
    Ok(())
}

fn print_syntax_stmt(
    w: &mut impl Write,
    interner: &Interner,
    i: usize,
    stmt: &ast::Stmt,
) -> io::Result<()> {
    use ast::StmtKind::*;
    match &stmt.kind {
        Block(statements) => {
            for stmt in statements {
                print_syntax_stmt(w, interner, i, stmt)?;
            }
            Ok(())
        }
        VariableDeclaration {
            keyword,
            name,
            ty,
            initializer,
        } => {
            sp(w, i)?;
            let keyword = if *keyword == crate::token::TokenKind::Const {
                "const"
            } else {
                "var"
            };
            write!(w, "{keyword} {}", interner.resolve(name.name))?;
            if let Some(clause) = ty {
                write!(w, ": {}", interner.resolve(clause.name.name))?;
            }
            if let Some(initializer) = initializer {
                write!(w, " = ")?;
                print_syntax_expr(w, interner, initializer)?;
            }
            writeln!(w)
        }
        If {
            condition,
            then_branch,
            else_branch,
        } => {
            sp(w, i)?;
            write!(w, "if ")?;
            print_syntax_expr(w, interner, condition)?;
            writeln!(w)?;
            print_syntax_stmt(w, interner, i + 1, then_branch)?;
            if let Some(else_branch) = else_branch {
                sp(w, i)?;
                writeln!(w, "else")?;
                print_syntax_stmt(w, interner, i + 1, else_branch)?;
            }
            Ok(())
        }
        While { condition, body } => {
            sp(w, i)?;
            write!(w, "while ")?;
            print_syntax_expr(w, interner, condition)?;
            writeln!(w)?;
            print_syntax_stmt(w, interner, i + 1, body)
        }
        DoWhile { body, condition } => {
            sp(w, i)?;
            writeln!(w, "do")?;
            print_syntax_stmt(w, interner, i + 1, body)?;
            sp(w, i)?;
            write!(w, "while ")?;
            print_syntax_expr(w, interner, condition)?;
            writeln!(w)
        }
        For {
            variable,
            lower,
            upper,
            body,
        } => {
            sp(w, i)?;
            write!(w, "for {} in ", interner.resolve(variable.name))?;
            print_syntax_expr(w, interner, lower)?;
            write!(w, " .. ")?;
            print_syntax_expr(w, interner, upper)?;
            writeln!(w)?;
            print_syntax_stmt(w, interner, i + 1, body)
        }
        Break => {
            sp(w, i)?;
            writeln!(w, "break")
        }
        Continue => {
            sp(w, i)?;
            writeln!(w, "continue")
        }
        Return { value } => {
            sp(w, i)?;
            write!(w, "return")?;
            if let Some(value) = value {
                write!(w, " ")?;
                print_syntax_expr(w, interner, value)?;
            }
            writeln!(w)
        }
        Expression(expr) => {
            sp(w, i)?;
            print_syntax_expr(w, interner, expr)?;
            writeln!(w)
        }
    }
}

fn print_syntax_expr(
    w: &mut impl Write,
    interner: &Interner,
    expr: &ast::Expr,
) -> io::Result<()> {
    use ast::ExprKind::*;
    match &expr.kind {
        Literal(Value::Str(s)) => write!(w, "{s:?}"),
        Literal(Value::Char(c)) => write!(w, "{c:?}"),
        Literal(value) => write!(w, "{value}"),
        Name(ident) => write!(w, "{}", interner.resolve(ident.name)),
        This => write!(w, "this"),
        Unary { op, operand, .. } => {
            write!(w, "{op}")?;
            print_syntax_expr(w, interner, operand)
        }
        Binary { op, lhs, rhs, .. } => {
            write!(w, "(")?;
            print_syntax_expr(w, interner, lhs)?;
            write!(w, " {op} ")?;
            print_syntax_expr(w, interner, rhs)?;
            write!(w, ")")
        }
        Paren(inner) => {
            write!(w, "(")?;
            print_syntax_expr(w, interner, inner)?;
            write!(w, ")")
        }
        Assignment {
            op, target, value, ..
        } => {
            print_syntax_expr(w, interner, target)?;
            match op {
                Some(op) => write!(w, " {op}= ")?,
                None => write!(w, " = ")?,
            }
            print_syntax_expr(w, interner, value)
        }
        Call { callee, args } => {
            print_syntax_expr(w, interner, callee)?;
            write!(w, "(")?;
            for (index, arg) in args.iter().enumerate() {
                if index > 0 {
                    write!(w, ", ")?;
                }
                print_syntax_expr(w, interner, arg)?;
            }
            write!(w, ")")
        }
        Member { object, name } => {
            print_syntax_expr(w, interner, object)?;
            write!(w, ".{}", interner.resolve(name.name))
        }
    }
}

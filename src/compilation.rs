use std::rc::Rc;

use tracing::debug;

use crate::{
    binder::{self, BoundGlobalScope, BoundProgram},
    diagnostics::Diagnostic,
    parser::SyntaxTree,
    util::intern::Interner,
};

/// One compilation: an ordered list of syntax trees, optionally chained
/// onto a previous compilation's global scope (the incremental REPL path).
pub struct Compilation {
    trees: Vec<SyntaxTree>,
    previous: Option<Rc<BoundGlobalScope>>,
    previous_program: Option<Rc<BoundProgram>>,
}

impl Compilation {
    pub fn new(trees: Vec<SyntaxTree>) -> Compilation {
        Compilation {
            trees,
            previous: None,
            previous_program: None,
        }
    }

    /// Chains this compilation under a previously bound program: its
    /// declared classes, functions, and variables stay visible.
    pub fn with_previous(previous: &Rc<BoundProgram>, trees: Vec<SyntaxTree>) -> Compilation {
        Compilation {
            trees,
            previous: Some(Rc::clone(&previous.global_scope)),
            previous_program: Some(Rc::clone(previous)),
        }
    }

    pub fn trees(&self) -> &[SyntaxTree] {
        &self.trees
    }

    /// Runs the binder and lowerer over the trees. The returned program's
    /// diagnostics cover the whole pipeline (lexer, parser, binder, and
    /// control-flow analysis); any error empties the body maps, gating
    /// emission.
    pub fn bind(&self, interner: &mut Interner) -> BoundProgram {
        let global_scope = Rc::new(binder::bind_global_scope(
            self.previous.clone(),
            &self.trees,
            interner,
        ));
        debug!(
            classes = global_scope.classes.len(),
            functions = global_scope.functions.len(),
            statements = global_scope.statements.len(),
            "bound global scope"
        );

        let mut program = binder::bind_program(
            self.previous_program.clone(),
            &global_scope,
            &self.trees,
            interner,
        );
        debug!(bodies = program.functions.len(), "bound program");

        let mut diagnostics: Vec<Diagnostic> = self
            .trees
            .iter()
            .flat_map(|tree| tree.diagnostics.iter().cloned())
            .collect();
        diagnostics.extend(std::mem::take(&mut program.diagnostics));
        if diagnostics.iter().any(Diagnostic::is_error) {
            program.functions.clear();
            program.class_initializers.clear();
        }
        program.diagnostics = diagnostics;
        program
    }
}

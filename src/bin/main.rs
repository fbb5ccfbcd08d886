use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
    rc::Rc,
};

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::debug;

use quill::{
    binder::BoundProgram,
    compilation::Compilation,
    diagnostics::Diagnostic,
    lexer,
    parser::SyntaxTree,
    text::SourceText,
    util::{fmt as ir_fmt, intern::Interner},
};

#[derive(Parser)]
#[command(name = "quillc", about = "Compiler front-end for the Quill language")]
struct Args {
    /// Source files to compile; with none given, an interactive session
    /// starts.
    files: Vec<PathBuf>,

    /// Print the token stream of each file before compiling.
    #[arg(long)]
    dump_tokens: bool,

    /// Print the syntax tree of each file before compiling.
    #[arg(long)]
    dump_tree: bool,

    /// Print the lowered IR of every bound body.
    #[arg(long)]
    dump_ir: bool,

    /// Enable debug logging on stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "debug".into()),
            )
            .with_writer(io::stderr)
            .init();
    }

    if args.files.is_empty() {
        return repl(&args);
    }
    compile_files(&args)
}

fn compile_files(args: &Args) -> Result<()> {
    let mut interner = Interner::with_capacity(1024);
    let mut trees = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let source = SourceText::with_filename(content, path.display().to_string());
        let tree = SyntaxTree::parse(source, &mut interner);
        if args.dump_tokens {
            dump_tokens(&tree);
        }
        if args.dump_tree {
            print!("{}", ir_fmt::print_syntax_string(&interner, &tree.root));
        }
        trees.push(tree);
    }

    let program = Compilation::new(trees).bind(&mut interner);
    report_diagnostics(&program.diagnostics);
    let errors = program.diagnostics.iter().filter(|d| d.is_error()).count();
    if errors > 0 {
        anyhow::bail!("aborting due to {errors} error(s)");
    }

    if args.dump_ir {
        dump_ir(&interner, &program);
    } else {
        println!("ok: {} bound bod{}", program.functions.len(), plural_y(program.functions.len()));
    }
    Ok(())
}

fn repl(args: &Args) -> Result<()> {
    println!("Welcome to interactive quillc.");
    println!("Enter code, finish with an empty line, or send Ctrl+D to exit.");

    let mut interner = Interner::with_capacity(1024);
    let mut previous: Option<Rc<BoundProgram>> = None;
    let mut accumulated = String::new();

    loop {
        if accumulated.is_empty() {
            print!("> ");
        } else {
            print!("| ");
        }
        io::stdout().flush()?;

        let mut line = String::new();
        let n = io::stdin().read_line(&mut line)?;

        if n == 0 {
            println!();
            if !accumulated.trim().is_empty() {
                submit(args, &accumulated, &mut interner, &mut previous);
            }
            return Ok(());
        }

        if line.trim().is_empty() {
            if !accumulated.trim().is_empty() {
                submit(args, &accumulated, &mut interner, &mut previous);
                accumulated.clear();
            }
        } else {
            accumulated.push_str(&line);
        }
    }
}

/// Compiles one REPL submission against the previous submission's global
/// scope; successful submissions become the next `previous`.
fn submit(
    args: &Args,
    input: &str,
    interner: &mut Interner,
    previous: &mut Option<Rc<BoundProgram>>,
) {
    let tree = SyntaxTree::parse(SourceText::new(input), interner);
    if args.dump_tokens {
        dump_tokens(&tree);
    }
    if args.dump_tree {
        print!("{}", ir_fmt::print_syntax_string(interner, &tree.root));
    }
    let compilation = match previous {
        Some(program) => Compilation::with_previous(program, vec![tree]),
        None => Compilation::new(vec![tree]),
    };
    let program = compilation.bind(interner);
    report_diagnostics(&program.diagnostics);
    if program.diagnostics.iter().any(Diagnostic::is_error) {
        return;
    }

    if args.dump_ir {
        dump_ir(interner, &program);
    }
    debug!(bodies = program.functions.len(), "submission bound");
    *previous = Some(Rc::new(program));
}

fn dump_tokens(tree: &SyntaxTree) {
    let (tokens, _) = lexer::lex(&tree.source);
    for token in &tokens {
        println!("{:?} {:?}", token.kind, tree.source.slice(token.span));
    }
}

fn dump_ir(interner: &Interner, program: &BoundProgram) {
    let ctx = ir_fmt::Context {
        interner,
        symbols: &program.symbols,
    };
    let mut entries: Vec<_> = program.functions.iter().collect();
    entries.sort_by_key(|(id, _)| {
        let function = program.symbols.function(**id);
        let receiver = function
            .receiver
            .map(|class| interner.resolve(program.symbols.class(class).name))
            .unwrap_or("");
        (receiver.to_string(), interner.resolve(function.name).to_string())
    });
    for (id, block) in entries {
        let function = program.symbols.function(*id);
        let name = interner.resolve(function.name);
        match function.receiver {
            Some(class) => {
                let class = interner.resolve(program.symbols.class(class).name);
                println!("{class}.{name}:");
            }
            None => println!("{name}:"),
        }
        print!("{}", ir_fmt::print_block_string(&ctx, block));
        println!();
    }
}

fn report_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        report_diagnostic(diagnostic);
    }
}

/// Prints a diagnostic with its source line and a caret run underneath.
fn report_diagnostic(diagnostic: &Diagnostic) {
    let location = &diagnostic.location;
    let (line, col) = location.line_col();
    let severity = if diagnostic.is_warning() { "warning" } else { "error" };
    match location.source.filename() {
        Some(name) => eprintln!("{name}:{line}:{col}: {severity}: {diagnostic}"),
        None => eprintln!("({line}, {col}): {severity}: {diagnostic}"),
    }

    let line_content = location.source.line(line - 1);
    eprintln!("{line:>4} | {line_content}");
    let indicator_padding = col.saturating_sub(1);
    let indicator_len = (location.span.len as usize).clamp(1, line_content.len().max(1));
    eprintln!(
        "{:>4} | {}{}",
        "",
        " ".repeat(indicator_padding),
        "^".repeat(indicator_len)
    );
}

fn plural_y(n: usize) -> &'static str {
    if n == 1 {
        "y"
    } else {
        "ies"
    }
}

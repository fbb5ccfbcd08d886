use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, Criterion};
use quill::{lexer::Lexer, text::SourceText, token::TokenKind};

fn input() -> String {
    let unit = r#"
class Point {
    x: int32;
    y: int32;
    const tag: string = "point";
}

function distanceSq(a: Point, b: Point): int32 {
    var dx = a.x - b.x;
    var dy = a.y - b.y;
    return dx * dx + dy * dy; // squared, no sqrt in sight
}

function main() {
    var total = 0
    for i in 1..100 {
        var p = Point(i, i * 2)
        var q = Point(i + 1, i)
        total += distanceSq(p, q)
    }
    writeLine("total: " + string(total))
}
"#;
    unit.repeat(64)
}

fn lexer_eager(source: &Rc<SourceText>) {
    let (tokens, _) = quill::lexer::lex(source);
    let mut i = 0;
    for token in tokens {
        if matches!(token.kind, TokenKind::Bad) {
            continue;
        }
        i += 1;
    }
    black_box(i);
}

fn lexer_incremental(source: &Rc<SourceText>) {
    let mut i = 0;
    for token in Lexer::new(source).until_eof() {
        if matches!(token.kind, TokenKind::Bad) {
            continue;
        }
        i += 1;
    }
    black_box(i);
}

fn criterion_benchmark(c: &mut Criterion) {
    let source = Rc::new(SourceText::new(input()));
    c.bench_function("eager", |b| b.iter(|| lexer_eager(black_box(&source))));
    c.bench_function("incremental", |b| {
        b.iter(|| lexer_incremental(black_box(&source)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lonewolf::component::{ScriptContext, interpolate};
use lonewolf::dom::{Document, HtmlParser};
use lonewolf::router::{CompiledPattern, Route, RouteTable};
use serde_json::json;

/// Route matching, the work done on every navigation
fn benchmark_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");

    group.bench_function("compile_typed_key", |b| {
        b.iter(|| CompiledPattern::compile(black_box("/shop/:category type:string/:id type:number")))
    });

    let pattern = CompiledPattern::compile("/shop/:category type:string/:id type:number");
    group.bench_function("extract_params", |b| {
        b.iter(|| pattern.extract_params(black_box("/shop/books/42")))
    });

    let mut table = RouteTable::new();
    for i in 0..100 {
        table.add(Route::new(format!("/section{i}/:id type:number"), format!("/s{i}.html")));
    }
    group.bench_function("find_last_of_100", |b| {
        b.iter(|| table.find_by_location(black_box("/section99/7")))
    });

    group.finish();
}

/// Placeholder interpolation and fragment parsing, the work done per component
fn benchmark_components(c: &mut Criterion) {
    let mut group = c.benchmark_group("components");

    let items: Vec<_> = (0..50).map(|i| json!({ "name": format!("item {i}"), "price": i })).collect();
    let Ok(mut scope) = ScriptContext::detached(
        json!({ "title": "Shop", "items": items, "open": true })
            .as_object()
            .cloned()
            .unwrap_or_default(),
    ) else {
        return;
    };
    let template = "<h1>{{ title }}</h1><p>{{ open ? 'open' : 'closed' }}</p>\
                    <ul>{{ forDataIn(items, '<li>value.name: value.price</li>') }}</ul>";
    group.bench_function("interpolate_list", |b| {
        b.iter(|| interpolate(black_box(template), &mut scope))
    });

    let markup = interpolate(template, &mut scope);
    let parser = HtmlParser::new();
    group.bench_function("parse_fragment", |b| {
        b.iter(|| {
            let mut doc = Document::new();
            parser.parse_fragment(&mut doc, black_box(&markup)).map(|nodes| nodes.len())
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_routing, benchmark_components);
criterion_main!(benches);

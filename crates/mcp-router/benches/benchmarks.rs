//! Performance benchmarks for the router.
//!
//! Measures the hot paths of a composed server:
//!
//! - Registration into the local registry
//! - Listing across mounted providers with visibility filtering
//! - Tool lookup and call through a mount
//! - Schema compression and transformation
//!
//! Run benchmarks with: cargo bench

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use mcp_router::component::{Arguments, Component, Tool};
use mcp_router::router::Router;
use mcp_router::transform::{compress_schema, ArgTransform, CompressOptions, ToolTransform};
use mcp_router::visibility::RuleMatch;
use serde_json::{json, Value};
use std::hint::black_box;
use tokio::runtime::Runtime;

// ================================================================================================
// Fixtures
// ================================================================================================

fn simple_tool(name: &str) -> Tool {
    Tool::from_fn(
        name,
        json!({
            "type": "object",
            "properties": {"value": {"type": "string"}}
        }),
        |_args| async { Ok(json!("ok")) },
    )
}

fn nested_schema() -> Value {
    json!({
        "type": "object",
        "title": "Order",
        "properties": {
            "customer": {"$ref": "#/$defs/Customer"},
            "items": {"type": "array", "items": {"$ref": "#/$defs/Item"}},
            "note": {"type": "string", "title": "Note"}
        },
        "required": ["customer", "items"],
        "additionalProperties": false,
        "$defs": {
            "Customer": {
                "type": "object",
                "title": "Customer",
                "properties": {"name": {"type": "string"}, "address": {"$ref": "#/$defs/Address"}},
                "additionalProperties": false
            },
            "Address": {
                "type": "object",
                "properties": {"street": {"type": "string"}, "city": {"type": "string"}}
            },
            "Item": {
                "type": "object",
                "properties": {"sku": {"type": "string"}, "quantity": {"type": "integer", "default": 1}}
            },
            "Unused": {"type": "null"}
        }
    })
}

/// A router with `children` mounted routers of `per_child` tools each.
fn composed_router(rt: &Runtime, children: usize, per_child: usize) -> Router {
    let main = Router::new("main");
    for c in 0..children {
        let child = Router::new(format!("child{}", c));
        for t in 0..per_child {
            let tool = simple_tool(&format!("tool{}", t)).with_tag(if t % 2 == 0 { "even" } else { "odd" });
            child.add_tool(tool).expect("unique tool name");
        }
        let prefix = format!("c{}", c);
        rt.block_on(main.mount(child, Some(prefix.as_str())));
    }
    main
}

// ================================================================================================
// Benchmarks
// ================================================================================================

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");

    group.bench_function("single_tool", |b| {
        b.iter(|| {
            let router = Router::new("bench");
            router.add_tool(simple_tool("tool")).expect("register");
            black_box(router)
        });
    });

    group.bench_function("100_tools", |b| {
        b.iter(|| {
            let router = Router::new("bench");
            for i in 0..100 {
                router.add_tool(simple_tool(&format!("tool{}", i))).expect("register");
            }
            black_box(router)
        });
    });

    group.finish();
}

fn bench_listing(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("listing");

    for children in [1usize, 4, 16].iter() {
        let router = composed_router(&rt, *children, 25);

        group.bench_with_input(BenchmarkId::new("list_tools", children), children, |b, _| {
            b.iter(|| rt.block_on(async { black_box(router.list_tools().await) }));
        });

        let filtered = composed_router(&rt, *children, 25);
        rt.block_on(filtered.disable(RuleMatch::tags(["odd"])));
        group.bench_with_input(BenchmarkId::new("list_tools_filtered", children), children, |b, _| {
            b.iter(|| rt.block_on(async { black_box(filtered.list_tools().await) }));
        });
    }

    group.finish();
}

fn bench_call(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("call");

    let local = Router::new("local");
    local.add_tool(simple_tool("direct")).expect("register");
    group.bench_function("local_tool", |b| {
        b.iter(|| rt.block_on(async { black_box(local.call_tool("direct", Arguments::new()).await) }));
    });

    let composed = composed_router(&rt, 8, 25);
    group.bench_function("mounted_tool", |b| {
        b.iter(|| rt.block_on(async { black_box(composed.call_tool("c7_tool24", Arguments::new()).await) }));
    });

    group.finish();
}

fn bench_schema(c: &mut Criterion) {
    let mut group = c.benchmark_group("schema");
    let schema = nested_schema();

    group.bench_function("compress_default", |b| {
        let options = CompressOptions::default();
        b.iter(|| black_box(compress_schema(black_box(&schema), &options)));
    });

    group.bench_function("compress_prune_all", |b| {
        let options = CompressOptions {
            prune_params: vec!["note".to_string()],
            prune_titles: true,
            ..CompressOptions::default()
        };
        b.iter(|| black_box(compress_schema(black_box(&schema), &options)));
    });

    let parent = Tool::from_fn("order", schema.clone(), |_args| async { Ok(Value::Null) });
    group.bench_function("transform_tool", |b| {
        let transform = ToolTransform::new()
            .with_name("place_order")
            .with_argument("note", ArgTransform::new().hidden().with_default(json!("")));
        b.iter(|| black_box(transform.apply(&parent)));
    });

    group.finish();
}

criterion_group!(benches, bench_registration, bench_listing, bench_call, bench_schema);
criterion_main!(benches);

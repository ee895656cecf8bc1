extern crate criterion;

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};

use feedscrub_lib::config::{keys, MemoryStore, Value};
use feedscrub_lib::dom::dom_tree::{create_element, Document};
use feedscrub_lib::parser::parse_snapshot;
use feedscrub_lib::style::selector::Selector;
use feedscrub_lib::{Engine, PageEvent, PreferenceStore};

fn feed_page(items: usize) -> String {
    let mut html = String::with_capacity(items * 64 + 512);
    html.push_str(
        "<html><head></head><body><ytd-app><div id=\"page-manager\"><div id=\"contents\">",
    );
    for i in 0..items {
        if i % 10 == 0 {
            html.push_str("<ytd-rich-shelf-renderer is-shorts=\"\"></ytd-rich-shelf-renderer>");
        } else {
            html.push_str("<ytd-rich-item-renderer></ytd-rich-item-renderer>");
        }
    }
    html.push_str("</div></div></ytd-app></body></html>");
    html
}

fn engine_with_shorts_hiding() -> Engine {
    let mut store = MemoryStore::new();
    store.set(keys::HIDE_SHORTS, Value::Bool(true));
    Engine::new(Box::new(store))
}

fn bench_initial_sweep(c: &mut Criterion) {
    let html = feed_page(10_000);
    c.bench_function("initial_sweep_10k_items", |b| {
        b.iter(|| {
            let doc = parse_snapshot(&html);
            let mut engine = engine_with_shorts_hiding();
            engine.handle_event(&doc, PageEvent::Ready, Duration::ZERO);
            engine.run_until_idle(&doc);
            doc
        })
    });
}

fn churn(doc: &Document, engine: &mut Engine, bursts: usize) {
    let contents = Selector::parse("#contents").query_first(&doc.root).unwrap();
    for i in 0..bursts {
        let item = create_element("ytd-rich-shelf-renderer");
        doc.set_attribute(&item, "is-shorts", "");
        doc.append_child(&contents, item);
        engine.pump(doc, engine.now() + Duration::from_millis(10 * i as u64));
    }
    engine.run_until_idle(doc);
}

fn bench_feed_churn(c: &mut Criterion) {
    let html = feed_page(1_000);
    c.bench_function("feed_churn_100_bursts", |b| {
        b.iter(|| {
            let doc = parse_snapshot(&html);
            let mut engine = engine_with_shorts_hiding();
            engine.handle_event(&doc, PageEvent::Ready, Duration::ZERO);
            engine.run_until_idle(&doc);
            churn(&doc, &mut engine, 100);
            doc
        })
    });
}

criterion_group!(benches, bench_initial_sweep, bench_feed_churn);
criterion_main!(benches);

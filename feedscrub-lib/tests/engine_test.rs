use std::time::Duration;

use feedscrub_lib::config::{keys, MemoryStore, Value};
use feedscrub_lib::dom::dom_tree::{self, attr, has_class};
use feedscrub_lib::parser::{parse_snapshot, serialize_document};
use feedscrub_lib::style::appearance::MARKER_CLASS;
use feedscrub_lib::style::selector::Selector;
use feedscrub_lib::{Engine, PageEvent, PreferenceStore};
use pretty_assertions::assert_eq;

/// A trimmed page snapshot with the containers the watchers care about.
fn watch_page() -> dom_tree::Document {
    let _ = env_logger::builder().is_test(true).try_init();
    parse_snapshot(
        r#"
        <!DOCTYPE html>
        <html>
            <head>
                <title>Feed</title>
            </head>
            <body>
                <ytd-app>
                    <ytd-masthead>
                        <div id="buttons" class="ytd-masthead"></div>
                    </ytd-masthead>
                    <div id="page-manager">
                        <div id="contents">
                            <ytd-rich-item-renderer></ytd-rich-item-renderer>
                        </div>
                    </div>
                </ytd-app>
            </body>
        </html>
        "#,
    )
}

fn store_with(pairs: &[(&str, Value)]) -> MemoryStore {
    let mut store = MemoryStore::new();
    for (key, value) in pairs {
        store.set(key, value.clone());
    }
    store
}

fn settle(engine: &mut Engine, doc: &dom_tree::Document, event: PageEvent) {
    let now = engine.now() + Duration::from_millis(1);
    engine.handle_event(doc, event, now);
    engine.run_until_idle(doc);
}

#[test]
fn settled_page_is_a_fixed_point() {
    let doc = watch_page();
    let mut engine = Engine::new(Box::new(store_with(&[(
        keys::BACKGROUND_ENABLED,
        Value::Bool(true),
    )])));

    settle(&mut engine, &doc, PageEvent::Ready);
    let first = serialize_document(&doc);

    // Running the whole pass again must not change a single byte.
    settle(&mut engine, &doc, PageEvent::NavigateFinish);
    let second = serialize_document(&doc);
    assert_eq!(first, second);
}

#[test]
fn a_hundred_navigations_leak_no_observers() {
    let doc = watch_page();
    let mut engine = Engine::new(Box::new(MemoryStore::new()));
    settle(&mut engine, &doc, PageEvent::Ready);
    let baseline = doc.observer_count();
    for _ in 0..100 {
        settle(&mut engine, &doc, PageEvent::NavigateFinish);
    }
    assert_eq!(doc.observer_count(), baseline);
}

#[test]
fn shorts_shelf_injected_mid_churn_is_detached_after_the_quiet_window() {
    let doc = watch_page();
    let mut engine = Engine::new(Box::new(store_with(&[(
        keys::HIDE_SHORTS,
        Value::Bool(true),
    )])));
    settle(&mut engine, &doc, PageEvent::Ready);

    let contents = Selector::parse("#contents").query_first(&doc.root).unwrap();
    let shelf = dom_tree::create_element("ytd-rich-shelf-renderer");
    doc.set_attribute(&shelf, "is-shorts", "");
    doc.append_child(&contents, shelf.clone());

    // Inside the debounce window the shelf is still attached.
    engine.pump(&doc, engine.now() + Duration::from_millis(10));
    let probe = Selector::parse("ytd-rich-shelf-renderer[is-shorts]");
    assert!(probe.query_first(&doc.root).is_some());

    engine.run_until_idle(&doc);
    assert!(probe.query_first(&doc.root).is_none());
    // Unrelated feed items survive the sweep.
    assert!(Selector::parse("ytd-rich-item-renderer")
        .query_first(&doc.root)
        .is_some());
}

#[test]
fn background_image_survives_an_inline_style_rewrite() {
    let doc = watch_page();
    let mut engine = Engine::new(Box::new(store_with(&[
        (keys::BACKGROUND_ENABLED, Value::Bool(true)),
        (keys::BACKGROUND_MODE, Value::Str("image".into())),
        (
            keys::BACKGROUND_IMAGE_URL,
            Value::Str("https://example.test/bg.png".into()),
        ),
    ])));
    settle(&mut engine, &doc, PageEvent::Ready);

    let html = Selector::parse("html").query_first(&doc.root).unwrap();
    assert!(has_class(&html, MARKER_CLASS));
    assert_eq!(
        doc.style_property(&html, "--feedscrub-bg-image").as_deref(),
        Some("url(\"https://example.test/bg.png\")")
    );

    // The host clobbers the inline style wholesale.
    doc.set_attribute(&html, "style", "background: white");
    engine.run_until_idle(&doc);
    assert_eq!(
        doc.style_property(&html, "--feedscrub-bg-image").as_deref(),
        Some("url(\"https://example.test/bg.png\")")
    );
    // The foreign declaration is kept, not erased.
    assert_eq!(
        doc.style_property(&html, "background").as_deref(),
        Some("white")
    );
}

#[test]
fn empty_image_reference_falls_back_to_the_default_color() {
    let doc = watch_page();
    let mut engine = Engine::new(Box::new(store_with(&[
        (keys::BACKGROUND_ENABLED, Value::Bool(true)),
        (keys::BACKGROUND_MODE, Value::Str("image".into())),
    ])));
    settle(&mut engine, &doc, PageEvent::Ready);

    let html = Selector::parse("html").query_first(&doc.root).unwrap();
    assert_eq!(
        doc.style_property(&html, "--feedscrub-bg-color").as_deref(),
        Some("#181818")
    );
    assert_eq!(
        doc.style_property(&html, "--feedscrub-bg-image").as_deref(),
        Some("none")
    );
}

#[test]
fn navigation_rebinds_watchers_to_replaced_containers() {
    let doc = watch_page();
    let mut engine = Engine::new(Box::new(store_with(&[(
        keys::HIDE_SHORTS,
        Value::Bool(true),
    )])));
    settle(&mut engine, &doc, PageEvent::Ready);

    // The app rebuilds the page manager subtree from scratch.
    let old = Selector::parse("#page-manager")
        .query_first(&doc.root)
        .unwrap();
    let body = Selector::parse("body").query_first(&doc.root).unwrap();
    assert!(doc.detach(&old));
    let fresh = dom_tree::create_element("div");
    doc.append_child(&body, fresh.clone());
    doc.set_attribute(&fresh, "id", "page-manager");
    let shelf = dom_tree::create_element("ytd-rich-shelf-renderer");
    doc.set_attribute(&shelf, "is-shorts", "");
    doc.append_child(&fresh, shelf);

    settle(&mut engine, &doc, PageEvent::NavigateFinish);
    assert!(Selector::parse("ytd-rich-shelf-renderer[is-shorts]")
        .query_first(&doc.root)
        .is_none());

    // And watchers track the fresh container, not the detached one.
    let late = dom_tree::create_element("ytd-rich-shelf-renderer");
    doc.set_attribute(&late, "is-shorts", "");
    doc.append_child(&fresh, late);
    engine.run_until_idle(&doc);
    assert!(Selector::parse("ytd-rich-shelf-renderer[is-shorts]")
        .query_first(&doc.root)
        .is_none());
}

#[test]
fn toggle_button_is_mounted_once_and_reinserted_after_removal() {
    let doc = watch_page();
    let mut engine = Engine::new(Box::new(MemoryStore::new()));
    settle(&mut engine, &doc, PageEvent::Ready);

    let probe = Selector::parse("#feedscrub-toggle-btn");
    assert_eq!(probe.query_all(&doc.root).len(), 1);

    let button = probe.query_first(&doc.root).unwrap();
    assert!(doc.detach(&button));
    engine.run_until_idle(&doc);
    assert_eq!(probe.query_all(&doc.root).len(), 1);
}

#[test]
fn setters_write_through_to_the_shared_store() {
    let doc = watch_page();
    let store = MemoryStore::new();
    let mut engine = Engine::new(Box::new(store.clone()));
    settle(&mut engine, &doc, PageEvent::Ready);

    engine.set_background_enabled(&doc, true);
    engine.set_background_color(&doc, "#222222");
    engine.run_until_idle(&doc);

    assert_eq!(
        store.get(keys::BACKGROUND_ENABLED, Value::Bool(false)),
        Value::Bool(true)
    );
    assert_eq!(
        store.get(keys::BACKGROUND_COLOR, Value::Str(String::new())),
        Value::Str("#222222".into())
    );

    let html = Selector::parse("html").query_first(&doc.root).unwrap();
    assert_eq!(
        doc.style_property(&html, "--feedscrub-bg-color").as_deref(),
        Some("#222222")
    );
    let stale = attr(&html, "style").unwrap();
    assert!(!stale.contains("#181818"));
}

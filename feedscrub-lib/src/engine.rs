//! The engine owns the configuration, the preference store and every
//! watcher, and drives them against a document with an explicit clock.
//!
//! Nothing here runs spontaneously. The host reports page lifecycle events
//! through [`Engine::handle_event`] and advances time through
//! [`Engine::pump`]; each pump drains mutation records and fires whatever
//! debounce deadlines have passed, repeating until the document stops
//! producing new records at that instant.

use std::time::Duration;

use log::{debug, info};

use crate::config::{keys, BackgroundMode, Config, PreferenceStore, Value};
use crate::dom::dom_tree::Document;
use crate::style::{appearance, stylesheet};
use crate::watchers::{
    self, ClassSyncWatcher, ContentWatcher, GlobalWatcher, PreloadWatcher, PresenceWatcher,
    StylePersistWatcher,
};

/// Page lifecycle notifications from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// Initial document is ready.
    Ready,
    /// An in-page navigation finished; containers may have been replaced.
    NavigateFinish,
}

pub struct Engine {
    config: Config,
    store: Box<dyn PreferenceStore>,
    content: ContentWatcher,
    style_persist: StylePersistWatcher,
    preload: PreloadWatcher,
    presence: PresenceWatcher,
    class_sync: ClassSyncWatcher,
    global: GlobalWatcher,
    reload_requested: bool,
    now: Duration,
}

impl Engine {
    /// Loads the configuration from the store and builds an idle engine.
    /// No observers exist until the first [`PageEvent`].
    pub fn new(store: Box<dyn PreferenceStore>) -> Self {
        let config = Config::load(store.as_ref());
        Engine {
            config,
            store,
            content: ContentWatcher::new(),
            style_persist: StylePersistWatcher::new(),
            preload: PreloadWatcher::new(),
            presence: PresenceWatcher::new(),
            class_sync: ClassSyncWatcher::new(),
            global: GlobalWatcher::new(),
            reload_requested: false,
            now: Duration::ZERO,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Full (re)initialization pass. Both `Ready` and `NavigateFinish` tear
    /// down every registration and re-resolve roots against the tree as it
    /// stands now, so no watcher keeps a handle into a replaced subtree.
    pub fn handle_event(&mut self, doc: &Document, event: PageEvent, now: Duration) {
        self.advance(now);
        info!("page event: {:?}", event);

        stylesheet::apply(doc, &self.config);
        appearance::apply(doc, &self.config);
        self.content.restart(doc, self.config.hide_shorts);
        self.style_persist
            .restart(doc, self.config.background_enabled);
        self.preload.restart(doc, self.config.performance_mode);
        self.presence.start(doc, self.now);
        self.class_sync.start(doc, &self.config, self.now);
        self.global.restart(doc);
    }

    /// Drains records and fires due deadlines, looping until one pass makes
    /// no progress. Actions taken by a watcher (a sweep, a re-apply) can
    /// queue new records; those are drained within the same call so the
    /// document is quiescent when `pump` returns.
    pub fn pump(&mut self, doc: &Document, now: Duration) {
        self.advance(now);
        loop {
            let mut acted = false;
            acted |= self.content.pump(doc, self.now);
            acted |= self.style_persist.pump(doc, &self.config, self.now);
            acted |= self.preload.pump(doc) > 0;
            acted |= self.presence.pump(doc, self.now);
            acted |= self.class_sync.pump(doc, &self.config, self.now);
            if self.global.pump(self.now) {
                self.run_global_pass(doc);
                acted = true;
            }
            if !acted {
                break;
            }
        }
    }

    /// True when no debounce deadline or deferred retry is outstanding.
    pub fn is_idle(&self) -> bool {
        !self.content.is_pending()
            && !self.style_persist.is_pending()
            && !self.presence.is_pending()
            && !self.class_sync.is_pending()
            && !self.global.is_pending()
    }

    /// Pumps in 100ms steps until every watcher is idle. The round cap
    /// bounds runaway feedback; a healthy document settles in a handful of
    /// rounds.
    pub fn run_until_idle(&mut self, doc: &Document) {
        const MAX_ROUNDS: u32 = 100;
        const STEP: Duration = Duration::from_millis(100);
        for _ in 0..MAX_ROUNDS {
            self.pump(doc, self.now + STEP);
            if self.is_idle() {
                return;
            }
        }
        debug!("run_until_idle hit the round cap with work still pending");
    }

    /// Composite re-apply run when the broad safety-net watcher fires:
    /// everything that page churn can undo is re-asserted at once, and the
    /// narrow watchers are re-bound in case their roots were replaced.
    fn run_global_pass(&mut self, doc: &Document) {
        debug!("global churn settled, running composite pass");
        if self.config.hide_shorts {
            watchers::sweep(doc);
        }
        stylesheet::apply(doc, &self.config);
        self.preload.restart(doc, self.config.performance_mode);
        appearance::apply(doc, &self.config);
        self.style_persist
            .restart(doc, self.config.background_enabled);
    }

    fn advance(&mut self, now: Duration) {
        if now > self.now {
            self.now = now;
        }
    }

    // -- configuration setters --------------------------------------------
    //
    // Each setter persists the new value and then re-applies only the
    // surfaces that depend on it. Setting a value equal to the current one
    // still re-applies; the writes are no-ops on an already-correct tree.

    pub fn set_ad_block_enabled(&mut self, doc: &Document, enabled: bool) {
        self.config.ad_block_enabled = enabled;
        self.store.set(keys::AD_BLOCK_ENABLED, Value::Bool(enabled));
        stylesheet::apply(doc, &self.config);
    }

    pub fn set_hide_shorts(&mut self, doc: &Document, enabled: bool) {
        self.config.hide_shorts = enabled;
        self.store.set(keys::HIDE_SHORTS, Value::Bool(enabled));
        self.content.restart(doc, enabled);
    }

    pub fn set_performance_mode(&mut self, doc: &Document, enabled: bool) {
        self.config.performance_mode = enabled;
        self.store.set(keys::PERFORMANCE_MODE, Value::Bool(enabled));
        stylesheet::apply(doc, &self.config);
        self.preload.restart(doc, enabled);
    }

    pub fn set_background_enabled(&mut self, doc: &Document, enabled: bool) {
        self.config.background_enabled = enabled;
        self.store.set(keys::BACKGROUND_ENABLED, Value::Bool(enabled));
        appearance::apply(doc, &self.config);
        appearance::sync_search_box(doc, &self.config);
        self.style_persist.restart(doc, enabled);
    }

    pub fn set_background_mode(&mut self, doc: &Document, mode: BackgroundMode) {
        self.config.background_mode = mode;
        self.store
            .set(keys::BACKGROUND_MODE, Value::Str(mode.as_str().to_string()));
        appearance::apply(doc, &self.config);
    }

    pub fn set_background_color(&mut self, doc: &Document, color: &str) {
        self.config.background_color = color.to_string();
        self.store
            .set(keys::BACKGROUND_COLOR, Value::Str(color.to_string()));
        appearance::apply(doc, &self.config);
    }

    pub fn set_background_image_url(&mut self, doc: &Document, url: &str) {
        self.config.background_image_url = url.to_string();
        self.store
            .set(keys::BACKGROUND_IMAGE_URL, Value::Str(url.to_string()));
        appearance::apply(doc, &self.config);
    }

    /// Escape hatch for hosts that prefer a clean slate over incremental
    /// re-application. The engine only records the request; acting on it is
    /// the host's call.
    pub fn request_reload(&mut self) {
        self.reload_requested = true;
    }

    pub fn reload_requested(&self) -> bool {
        self.reload_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use crate::dom::dom_tree::{
        append_child_raw, attr, children_of, create_element, new_document, NodeHandle,
    };
    use crate::style::selector::Selector;
    use crate::style::stylesheet::STYLE_ELEMENT_ID;
    use pretty_assertions::assert_eq;

    fn page() -> (Document, NodeHandle) {
        let doc = new_document();
        let html = create_element("html");
        append_child_raw(&doc.root, &html);
        let head = create_element("head");
        append_child_raw(&html, &head);
        let body = create_element("body");
        append_child_raw(&html, &body);
        let page_manager = create_element("div");
        append_child_raw(&body, &page_manager);
        doc.set_attribute(&page_manager, "id", "page-manager");
        (doc, page_manager)
    }

    fn engine() -> Engine {
        Engine::new(Box::new(MemoryStore::new()))
    }

    #[test]
    fn ready_installs_the_stylesheet_and_settles() {
        let (doc, _) = page();
        let mut engine = engine();
        engine.handle_event(&doc, PageEvent::Ready, Duration::ZERO);
        engine.run_until_idle(&doc);

        let probe = format!("style#{}", STYLE_ELEMENT_ID);
        assert!(Selector::parse(&probe).query_first(&doc.root).is_some());
        assert!(engine.is_idle());
    }

    #[test]
    fn repeated_navigations_do_not_leak_observers() {
        let (doc, _) = page();
        let mut engine = engine();
        engine.handle_event(&doc, PageEvent::Ready, Duration::ZERO);
        let baseline = doc.observer_count();
        for i in 1..=100 {
            let now = Duration::from_millis(i * 1000);
            engine.handle_event(&doc, PageEvent::NavigateFinish, now);
        }
        assert_eq!(doc.observer_count(), baseline);
    }

    #[test]
    fn shorts_setter_attaches_and_sweeps() {
        let (doc, page_manager) = page();
        let mut engine = engine();
        engine.handle_event(&doc, PageEvent::Ready, Duration::ZERO);
        engine.run_until_idle(&doc);

        let shelf = create_element("ytd-rich-shelf-renderer");
        doc.set_attribute(&shelf, "is-shorts", "");
        doc.append_child(&page_manager, shelf);

        assert!(!engine.config().hide_shorts);
        engine.set_hide_shorts(&doc, true);
        // The restart sweep removes it without waiting for the debounce.
        assert!(children_of(&page_manager).is_empty());

        engine.set_hide_shorts(&doc, false);
        let orphan = create_element("ytd-rich-shelf-renderer");
        doc.set_attribute(&orphan, "is-shorts", "");
        doc.append_child(&page_manager, orphan.clone());
        engine.run_until_idle(&doc);
        // Disabled: the shelf stays.
        assert_eq!(children_of(&page_manager).len(), 1);
    }

    #[test]
    fn setters_persist_and_survive_a_reload() {
        let (doc, _) = page();
        let store = MemoryStore::new();
        let mut engine = Engine::new(Box::new(store.clone()));
        engine.handle_event(&doc, PageEvent::Ready, Duration::ZERO);
        engine.set_background_enabled(&doc, true);
        engine.set_background_color(&doc, "#101010");
        engine.set_hide_shorts(&doc, true);

        let reloaded = Engine::new(Box::new(store));
        assert!(reloaded.config().background_enabled);
        assert_eq!(reloaded.config().background_color, "#101010");
        assert!(reloaded.config().hide_shorts);
    }

    #[test]
    fn performance_setter_toggles_preload_stripping() {
        let (doc, _) = page();
        let mut engine = engine();
        engine.handle_event(&doc, PageEvent::Ready, Duration::ZERO);
        engine.run_until_idle(&doc);

        let head = Selector::parse("head").query_first(&doc.root).unwrap();
        engine.set_performance_mode(&doc, true);
        let hint = create_element("link");
        doc.append_child(&head, hint.clone());
        doc.set_attribute(&hint, "rel", "prefetch");
        engine.run_until_idle(&doc);
        assert!(attr(&hint, "rel").is_some());
        assert!(!children_of(&head)
            .iter()
            .any(|child| std::rc::Rc::ptr_eq(child, &hint)));
    }

    #[test]
    fn reload_request_is_sticky() {
        let mut engine = engine();
        assert!(!engine.reload_requested());
        engine.request_reload();
        assert!(engine.reload_requested());
    }
}

//! Watcher roles: each one pairs an observer registration with a debounced
//! reaction. A watcher owns at most one live registration at a time; calling
//! `restart` always disconnects the previous one first, so repeated page
//! loads cannot accumulate observers.
//!
//! Watchers never act inside `Document` callbacks. The owning engine calls
//! `pump` with the current virtual time; the watcher drains its record queue,
//! arms its debounce, and performs its action when the deadline passes.

use std::rc::Rc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::Config;
use crate::debounce::Debounce;
use crate::dom::dom_tree::{
    attr, create_element, create_text, tag_of, Document, NodeHandle, ObserveOptions,
    ObserverHandle,
};
use crate::rules::SHORTS_PATTERNS;
use crate::style::appearance;
use crate::style::selector::Selector;

/// Id of the injected masthead toggle button.
pub const TOGGLE_BUTTON_ID: &str = "feedscrub-toggle-btn";

/// Resolves the preferred observation roots for a watcher. Selectors that
/// match nothing are skipped; duplicates collapse to one handle. When none
/// match, falls back to `body`, then to the document root, so a watcher is
/// never left blind on a half-built page.
fn resolve_roots(doc: &Document, selectors: &[&str]) -> Vec<NodeHandle> {
    let mut roots: Vec<NodeHandle> = Vec::new();
    for source in selectors {
        if let Some(node) = Selector::parse(source).query_first(&doc.root) {
            if !roots.iter().any(|r| Rc::ptr_eq(r, &node)) {
                roots.push(node);
            }
        }
    }
    if roots.is_empty() {
        if let Some(body) = Selector::parse("body").query_first(&doc.root) {
            debug!("no preferred roots matched, observing body");
            roots.push(body);
        } else {
            debug!("no preferred roots and no body, observing the document root");
            roots.push(doc.root.clone());
        }
    }
    roots
}

// -------------------------------------------------------------------------
// Content watcher
// -------------------------------------------------------------------------

/// Watches the feed containers and physically detaches nodes matching the
/// detach-intensity patterns. A burst of feed churn collapses into a single
/// sweep 50ms after the last mutation.
pub struct ContentWatcher {
    handle: Option<ObserverHandle>,
    debounce: Debounce<()>,
}

impl ContentWatcher {
    pub const ROOT_SELECTORS: &'static [&'static str] =
        &["#page-manager", "#contents", "#primary"];
    pub const DELAY: Duration = Duration::from_millis(50);

    pub fn new() -> Self {
        ContentWatcher {
            handle: None,
            debounce: Debounce::new(Self::DELAY),
        }
    }

    /// Tears down any previous registration, then attaches over the current
    /// page's containers and runs an immediate sweep. With `enabled` false
    /// this is teardown only.
    pub fn restart(&mut self, doc: &Document, enabled: bool) {
        self.stop(doc);
        if !enabled {
            return;
        }
        let roots = resolve_roots(doc, Self::ROOT_SELECTORS);
        self.handle = Some(doc.observe(
            roots,
            ObserveOptions {
                child_list: true,
                subtree: true,
                ..Default::default()
            },
        ));
        let removed = sweep(doc);
        if removed > 0 {
            info!("initial content sweep detached {} node(s)", removed);
        }
    }

    pub fn stop(&mut self, doc: &Document) {
        if let Some(handle) = self.handle.take() {
            doc.disconnect(&handle);
        }
        self.debounce.cancel_pending();
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    /// Drains queued records and performs the sweep once the debounce
    /// deadline has passed. Returns true when a sweep ran.
    pub fn pump(&mut self, doc: &Document, now: Duration) -> bool {
        if let Some(handle) = &self.handle {
            if !handle.take_records().is_empty() {
                self.debounce.trigger(now, ());
            }
        }
        if self.debounce.fire(now).is_some() {
            let removed = sweep(doc);
            if removed > 0 {
                debug!("content sweep detached {} node(s)", removed);
            }
            true
        } else {
            false
        }
    }
}

impl Default for ContentWatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Detaches every node matching a detach-intensity pattern anywhere in the
/// document. Idempotent: a second call over an already-swept tree removes
/// nothing and records nothing.
pub fn sweep(doc: &Document) -> usize {
    let mut removed = 0;
    for pattern in SHORTS_PATTERNS {
        for node in Selector::parse(pattern.selector).query_all(&doc.root) {
            if doc.detach(&node) {
                removed += 1;
            }
        }
    }
    removed
}

// -------------------------------------------------------------------------
// Style persistence watcher
// -------------------------------------------------------------------------

/// Watches the `style` attribute of the appearance anchor elements and
/// re-applies the configured background when the host rewrites them.
pub struct StylePersistWatcher {
    handle: Option<ObserverHandle>,
    debounce: Debounce<()>,
}

impl StylePersistWatcher {
    pub const ROOT_SELECTORS: &'static [&'static str] = &["html", "body", "ytd-app"];
    pub const DELAY: Duration = Duration::from_millis(500);

    pub fn new() -> Self {
        StylePersistWatcher {
            handle: None,
            debounce: Debounce::new(Self::DELAY),
        }
    }

    pub fn restart(&mut self, doc: &Document, enabled: bool) {
        self.stop(doc);
        if !enabled {
            return;
        }
        let roots = resolve_roots(doc, Self::ROOT_SELECTORS);
        self.handle = Some(doc.observe(
            roots,
            ObserveOptions {
                attributes: true,
                attribute_filter: vec!["style".to_string()],
                ..Default::default()
            },
        ));
    }

    pub fn stop(&mut self, doc: &Document) {
        if let Some(handle) = self.handle.take() {
            doc.disconnect(&handle);
        }
        self.debounce.cancel_pending();
    }

    pub fn is_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    /// Re-applies the appearance after the debounce window. Because applying
    /// an unchanged appearance writes nothing, the re-apply itself does not
    /// re-arm the watcher.
    pub fn pump(&mut self, doc: &Document, config: &Config, now: Duration) -> bool {
        if let Some(handle) = &self.handle {
            if !handle.take_records().is_empty() {
                self.debounce.trigger(now, ());
            }
        }
        if self.debounce.fire(now).is_some() {
            debug!("anchor style rewritten externally, re-applying appearance");
            appearance::apply(doc, config);
            true
        } else {
            false
        }
    }
}

impl Default for StylePersistWatcher {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------
// Preload watcher
// -------------------------------------------------------------------------

/// Strips `prefetch`/`prerender` link hints from `head`. Runs undebounced;
/// a hint acted on late has already cost the bandwidth it was meant to save.
pub struct PreloadWatcher {
    handle: Option<ObserverHandle>,
}

impl PreloadWatcher {
    pub fn new() -> Self {
        PreloadWatcher { handle: None }
    }

    pub fn restart(&mut self, doc: &Document, enabled: bool) {
        self.stop(doc);
        if !enabled {
            return;
        }
        let head = match Selector::parse("head").query_first(&doc.root) {
            Some(head) => head,
            None => {
                warn!("no head element, preload stripping disabled");
                return;
            }
        };
        self.handle = Some(doc.observe(
            vec![head],
            ObserveOptions {
                child_list: true,
                ..Default::default()
            },
        ));
        let removed = strip_preload_hints(doc, &doc.root);
        if removed > 0 {
            info!("stripped {} existing preload hint(s)", removed);
        }
    }

    pub fn stop(&mut self, doc: &Document) {
        if let Some(handle) = self.handle.take() {
            doc.disconnect(&handle);
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Detaches preload hints among newly added children. Returns the number
    /// of nodes removed.
    pub fn pump(&mut self, doc: &Document) -> usize {
        let handle = match &self.handle {
            Some(handle) => handle,
            None => return 0,
        };
        let records = handle.take_records();
        let mut removed = 0;
        for record in records {
            if let crate::dom::dom_tree::MutationRecord::ChildList { added, .. } = record {
                for node in &added {
                    if is_preload_hint(node) && doc.detach(node) {
                        removed += 1;
                    }
                }
            }
        }
        if removed > 0 {
            debug!("detached {} preload hint(s)", removed);
        }
        removed
    }
}

impl Default for PreloadWatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn is_preload_hint(node: &NodeHandle) -> bool {
    if tag_of(node).as_deref() != Some("link") {
        return false;
    }
    matches!(attr(node, "rel").as_deref(), Some("prefetch") | Some("prerender"))
}

/// One-shot removal of every preload hint already in the tree.
pub fn strip_preload_hints(doc: &Document, scope: &NodeHandle) -> usize {
    let mut removed = 0;
    for source in ["link[rel=prefetch]", "link[rel=prerender]"] {
        for node in Selector::parse(source).query_all(scope) {
            if doc.detach(&node) {
                removed += 1;
            }
        }
    }
    removed
}

// -------------------------------------------------------------------------
// Presence watcher
// -------------------------------------------------------------------------

/// Keeps the toggle button mounted in the masthead. The masthead is rebuilt
/// wholesale on some navigations, so the watcher re-checks after every
/// childList burst. When the masthead itself is missing, attachment is
/// retried after a fixed delay instead of falling back to a broader root.
pub struct PresenceWatcher {
    handle: Option<ObserverHandle>,
    debounce: Debounce<()>,
    retry_at: Option<Duration>,
}

impl PresenceWatcher {
    pub const DELAY: Duration = Duration::from_millis(100);
    pub const RETRY_DELAY: Duration = Duration::from_millis(500);

    pub fn new() -> Self {
        PresenceWatcher {
            handle: None,
            debounce: Debounce::new(Self::DELAY),
            retry_at: None,
        }
    }

    /// Attaches over `ytd-masthead` and runs an immediate presence check.
    /// When the masthead is not in the tree yet, schedules one retry; if the
    /// retry also fails, the watcher stays down until the next page event.
    pub fn start(&mut self, doc: &Document, now: Duration) {
        self.stop(doc);
        if !self.try_attach(doc) {
            debug!("masthead not present yet, retrying attachment later");
            self.retry_at = Some(now + Self::RETRY_DELAY);
        }
    }

    fn try_attach(&mut self, doc: &Document) -> bool {
        let masthead = match Selector::parse("ytd-masthead").query_first(&doc.root) {
            Some(masthead) => masthead,
            None => return false,
        };
        self.handle = Some(doc.observe(
            vec![masthead],
            ObserveOptions {
                child_list: true,
                subtree: true,
                ..Default::default()
            },
        ));
        ensure_button(doc);
        true
    }

    pub fn stop(&mut self, doc: &Document) {
        if let Some(handle) = self.handle.take() {
            doc.disconnect(&handle);
        }
        self.debounce.cancel_pending();
        self.retry_at = None;
    }

    pub fn is_pending(&self) -> bool {
        self.debounce.is_pending() || self.retry_at.is_some()
    }

    pub fn pump(&mut self, doc: &Document, now: Duration) -> bool {
        if let Some(retry_at) = self.retry_at {
            if now >= retry_at {
                self.retry_at = None;
                if !self.try_attach(doc) {
                    debug!("masthead still missing, presence watcher stays down");
                }
            }
        }
        if let Some(handle) = &self.handle {
            if !handle.take_records().is_empty() {
                self.debounce.trigger(now, ());
            }
        }
        if self.debounce.fire(now).is_some() {
            ensure_button(doc);
            true
        } else {
            false
        }
    }
}

impl Default for PresenceWatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Inserts the toggle button when it is missing. Mount point preference:
/// `#buttons.ytd-masthead`, then `#end #buttons`, then the parent of
/// `#account-button`. Returns true when the button ends up present.
pub fn ensure_button(doc: &Document) -> bool {
    let probe = format!("#{}", TOGGLE_BUTTON_ID);
    if Selector::parse(&probe).query_first(&doc.root).is_some() {
        return true;
    }
    let mount = Selector::parse("#buttons.ytd-masthead")
        .query_first(&doc.root)
        .or_else(|| Selector::parse("#end #buttons").query_first(&doc.root))
        .or_else(|| {
            Selector::parse("ytd-masthead #end #account-button")
                .query_first(&doc.root)
                .and_then(|account| crate::dom::dom_tree::parent_of(&account))
        });
    let mount = match mount {
        Some(mount) => mount,
        None => {
            debug!("no mount point for the toggle button yet");
            return false;
        }
    };
    let button = create_element("button");
    doc.prepend_child(&mount, button.clone());
    doc.set_attribute(&button, "id", TOGGLE_BUTTON_ID);
    doc.append_child(&button, create_text("FeedScrub"));
    info!("toggle button inserted");
    true
}

// -------------------------------------------------------------------------
// Class sync watcher
// -------------------------------------------------------------------------

/// Keeps the search box's appearance marker class in sync as the masthead
/// is rebuilt. Same attachment and retry behavior as the presence watcher.
pub struct ClassSyncWatcher {
    handle: Option<ObserverHandle>,
    debounce: Debounce<()>,
    retry_at: Option<Duration>,
}

impl ClassSyncWatcher {
    pub const DELAY: Duration = Duration::from_millis(100);
    pub const RETRY_DELAY: Duration = Duration::from_millis(500);

    pub fn new() -> Self {
        ClassSyncWatcher {
            handle: None,
            debounce: Debounce::new(Self::DELAY),
            retry_at: None,
        }
    }

    pub fn start(&mut self, doc: &Document, config: &Config, now: Duration) {
        self.stop(doc);
        if !self.try_attach(doc, config) {
            self.retry_at = Some(now + Self::RETRY_DELAY);
        }
    }

    fn try_attach(&mut self, doc: &Document, config: &Config) -> bool {
        let masthead = match Selector::parse("ytd-masthead").query_first(&doc.root) {
            Some(masthead) => masthead,
            None => return false,
        };
        self.handle = Some(doc.observe(
            vec![masthead],
            ObserveOptions {
                child_list: true,
                subtree: true,
                ..Default::default()
            },
        ));
        appearance::sync_search_box(doc, config);
        true
    }

    pub fn stop(&mut self, doc: &Document) {
        if let Some(handle) = self.handle.take() {
            doc.disconnect(&handle);
        }
        self.debounce.cancel_pending();
        self.retry_at = None;
    }

    pub fn is_pending(&self) -> bool {
        self.debounce.is_pending() || self.retry_at.is_some()
    }

    pub fn pump(&mut self, doc: &Document, config: &Config, now: Duration) -> bool {
        if let Some(retry_at) = self.retry_at {
            if now >= retry_at {
                self.retry_at = None;
                self.try_attach(doc, config);
            }
        }
        if let Some(handle) = &self.handle {
            if !handle.take_records().is_empty() {
                self.debounce.trigger(now, ());
            }
        }
        if self.debounce.fire(now).is_some() {
            appearance::sync_search_box(doc, config);
            true
        } else {
            false
        }
    }
}

impl Default for ClassSyncWatcher {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------
// Global watcher
// -------------------------------------------------------------------------

/// Broad safety net over the page's main containers. It only reports that
/// churn settled; the owning engine decides what the composite re-apply
/// pass does.
pub struct GlobalWatcher {
    handle: Option<ObserverHandle>,
    debounce: Debounce<()>,
}

impl GlobalWatcher {
    pub const ROOT_SELECTORS: &'static [&'static str] =
        &["ytd-page-manager", "#contents", "#primary", "#secondary"];
    pub const DELAY: Duration = Duration::from_millis(500);

    pub fn new() -> Self {
        GlobalWatcher {
            handle: None,
            debounce: Debounce::new(Self::DELAY),
        }
    }

    pub fn restart(&mut self, doc: &Document) {
        self.stop(doc);
        let roots = resolve_roots(doc, Self::ROOT_SELECTORS);
        // Child list churn only. Attribute writes are the persist and sync
        // watchers' business and must not wake the composite pass.
        self.handle = Some(doc.observe(
            roots,
            ObserveOptions {
                child_list: true,
                subtree: true,
                ..Default::default()
            },
        ));
    }

    pub fn stop(&mut self, doc: &Document) {
        if let Some(handle) = self.handle.take() {
            doc.disconnect(&handle);
        }
        self.debounce.cancel_pending();
    }

    pub fn is_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    /// Returns true when the churn window closed and the composite pass
    /// should run.
    pub fn pump(&mut self, now: Duration) -> bool {
        if let Some(handle) = &self.handle {
            if !handle.take_records().is_empty() {
                self.debounce.trigger(now, ());
            }
        }
        self.debounce.fire(now).is_some()
    }
}

impl Default for GlobalWatcher {
    fn default() -> Self {
        Self::new()
    }
}

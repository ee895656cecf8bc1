//! FeedScrub: a reactive DOM filter and restyle engine.
//!
//! The library parses an HTML page snapshot, then keeps a set of filtering
//! and styling guarantees standing while the page mutates underneath it:
//! promoted content is hidden through an injected stylesheet, short-form
//! shelves are detached outright, a custom background survives the host
//! rewriting inline styles, and the whole arrangement is re-established on
//! in-page navigation. Everything is driven by an explicit virtual clock;
//! nothing runs spontaneously.

pub mod config;
pub mod debounce;
pub mod dom;
pub mod engine;
pub mod parser;
pub mod rules;
pub mod style;
pub mod watchers;

pub use config::{Config, MemoryStore, PreferenceStore};
pub use engine::{Engine, PageEvent};

//! Settings persistence boundary and the in-memory configuration mirror.
//!
//! The preference store is an opaque key/value service; the engine reads it
//! once at startup and writes through on every change, so the two never
//! drift. Missing or partial stores produce the same behavior as defaults.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Preference value: settings are booleans or strings only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn bool_or(&self, default: bool) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Str(_) => default,
        }
    }

    pub fn str_or(&self, default: &str) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Bool(_) => default.to_string(),
        }
    }
}

/// Opaque named-preference storage. Last write wins; no transactionality.
pub trait PreferenceStore {
    /// Returns the stored value for `key`, or `default` if absent.
    fn get(&self, key: &str, default: Value) -> Value;
    fn set(&mut self, key: &str, value: Value);
}

/// In-memory store, the default for tests and embedding without persistence.
/// Clones share one backing map, so a test can keep a handle to the store it
/// handed off and inspect what was written.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Rc<RefCell<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str, default: Value) -> Value {
        self.values.borrow().get(key).cloned().unwrap_or(default)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.borrow_mut().insert(key.to_string(), value);
    }
}

/// Preference keys, one per configuration field.
pub mod keys {
    pub const AD_BLOCK_ENABLED: &str = "ad_block_enabled";
    pub const HIDE_SHORTS: &str = "hide_shorts";
    pub const BACKGROUND_ENABLED: &str = "background_enabled";
    pub const BACKGROUND_MODE: &str = "background_mode";
    pub const BACKGROUND_COLOR: &str = "background_color";
    pub const BACKGROUND_IMAGE_URL: &str = "background_image_url";
    pub const PERFORMANCE_MODE: &str = "performance_mode";
}

/// Fallback background color when image mode has no usable image reference.
pub const FALLBACK_BACKGROUND_COLOR: &str = "#181818";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundMode {
    Color,
    Image,
}

impl BackgroundMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BackgroundMode::Color => "color",
            BackgroundMode::Image => "image",
        }
    }

    /// Unknown strings fall back to color mode.
    pub fn from_str(s: &str) -> BackgroundMode {
        match s {
            "image" => BackgroundMode::Image,
            _ => BackgroundMode::Color,
        }
    }
}

/// In-memory mirror of the preference store. Lives for the page's lifetime;
/// an in-place navigation does not reset it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub ad_block_enabled: bool,
    pub hide_shorts: bool,
    pub background_enabled: bool,
    pub background_mode: BackgroundMode,
    pub background_color: String,
    pub background_image_url: String,
    pub performance_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ad_block_enabled: true,
            hide_shorts: false,
            background_enabled: false,
            background_mode: BackgroundMode::Color,
            background_color: FALLBACK_BACKGROUND_COLOR.to_string(),
            background_image_url: String::new(),
            performance_mode: false,
        }
    }
}

impl Config {
    /// Reads every field from the store once, falling back to defaults.
    pub fn load(store: &dyn PreferenceStore) -> Config {
        let defaults = Config::default();
        Config {
            ad_block_enabled: store
                .get(keys::AD_BLOCK_ENABLED, Value::Bool(defaults.ad_block_enabled))
                .bool_or(defaults.ad_block_enabled),
            hide_shorts: store
                .get(keys::HIDE_SHORTS, Value::Bool(defaults.hide_shorts))
                .bool_or(defaults.hide_shorts),
            background_enabled: store
                .get(
                    keys::BACKGROUND_ENABLED,
                    Value::Bool(defaults.background_enabled),
                )
                .bool_or(defaults.background_enabled),
            background_mode: BackgroundMode::from_str(
                &store
                    .get(
                        keys::BACKGROUND_MODE,
                        Value::Str(defaults.background_mode.as_str().to_string()),
                    )
                    .str_or(defaults.background_mode.as_str()),
            ),
            background_color: store
                .get(
                    keys::BACKGROUND_COLOR,
                    Value::Str(defaults.background_color.clone()),
                )
                .str_or(&defaults.background_color),
            background_image_url: store
                .get(
                    keys::BACKGROUND_IMAGE_URL,
                    Value::Str(defaults.background_image_url.clone()),
                )
                .str_or(&defaults.background_image_url),
            performance_mode: store
                .get(
                    keys::PERFORMANCE_MODE,
                    Value::Bool(defaults.performance_mode),
                )
                .bool_or(defaults.performance_mode),
        }
    }
}

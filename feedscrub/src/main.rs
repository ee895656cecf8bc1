//! Command-line front end: runs the filter engine over an HTML page
//! snapshot and writes the settled document back out.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use feedscrub_lib::config::{keys, BackgroundMode, PreferenceStore, Value};
use feedscrub_lib::dom::dom_tree;
use feedscrub_lib::parser::{parse_snapshot, serialize_document};
use feedscrub_lib::{Engine, PageEvent};

#[derive(Parser)]
#[command(name = "feedscrub")]
#[command(about = "Filter and restyle an HTML page snapshot")]
struct Args {
    /// Input HTML snapshot.
    input: String,

    /// Preferences file. Created on the first settings write.
    #[arg(long, default_value = "feedscrub.toml")]
    prefs: PathBuf,

    /// Output file. Writes to stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the ad filtering toggle and persist it.
    #[arg(long)]
    ad_block: Option<bool>,

    /// Override the short-form shelf removal toggle and persist it.
    #[arg(long)]
    hide_shorts: Option<bool>,

    /// Override performance mode and persist it.
    #[arg(long)]
    performance_mode: Option<bool>,

    /// Override the custom background toggle and persist it.
    #[arg(long)]
    background: Option<bool>,

    /// Background mode, "color" or "image".
    #[arg(long)]
    background_mode: Option<String>,

    /// Background color, e.g. "#181818".
    #[arg(long)]
    background_color: Option<String>,

    /// Background image reference for image mode.
    #[arg(long)]
    background_image_url: Option<String>,
}

/// Preferences as they appear on disk. Every field is optional; a missing
/// or partial file behaves exactly like the built-in defaults.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Prefs {
    ad_block_enabled: Option<bool>,
    hide_shorts: Option<bool>,
    background_enabled: Option<bool>,
    background_mode: Option<String>,
    background_color: Option<String>,
    background_image_url: Option<String>,
    performance_mode: Option<bool>,
}

/// TOML-backed preference store. Reads once at startup, writes through on
/// every change. Write failures are logged and swallowed; losing a setting
/// must never take the filter pass down with it.
struct TomlStore {
    path: PathBuf,
    prefs: Prefs,
}

impl TomlStore {
    fn open(path: PathBuf) -> Self {
        let prefs = match fs::read_to_string(&path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(prefs) => prefs,
                Err(e) => {
                    warn!("ignoring malformed preferences file {:?}: {}", path, e);
                    Prefs::default()
                }
            },
            Err(_) => Prefs::default(),
        };
        TomlStore { path, prefs }
    }

    fn save(&self) {
        let text = match toml::to_string_pretty(&self.prefs) {
            Ok(text) => text,
            Err(e) => {
                warn!("could not serialize preferences: {}", e);
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, text) {
            warn!("could not write preferences to {:?}: {}", self.path, e);
        }
    }
}

impl PreferenceStore for TomlStore {
    fn get(&self, key: &str, default: Value) -> Value {
        match key {
            keys::AD_BLOCK_ENABLED => self.prefs.ad_block_enabled.map(Value::Bool),
            keys::HIDE_SHORTS => self.prefs.hide_shorts.map(Value::Bool),
            keys::BACKGROUND_ENABLED => self.prefs.background_enabled.map(Value::Bool),
            keys::BACKGROUND_MODE => self.prefs.background_mode.clone().map(Value::Str),
            keys::BACKGROUND_COLOR => self.prefs.background_color.clone().map(Value::Str),
            keys::BACKGROUND_IMAGE_URL => self.prefs.background_image_url.clone().map(Value::Str),
            keys::PERFORMANCE_MODE => self.prefs.performance_mode.map(Value::Bool),
            _ => None,
        }
        .unwrap_or(default)
    }

    fn set(&mut self, key: &str, value: Value) {
        match (key, value) {
            (keys::AD_BLOCK_ENABLED, Value::Bool(v)) => self.prefs.ad_block_enabled = Some(v),
            (keys::HIDE_SHORTS, Value::Bool(v)) => self.prefs.hide_shorts = Some(v),
            (keys::BACKGROUND_ENABLED, Value::Bool(v)) => self.prefs.background_enabled = Some(v),
            (keys::BACKGROUND_MODE, Value::Str(v)) => self.prefs.background_mode = Some(v),
            (keys::BACKGROUND_COLOR, Value::Str(v)) => self.prefs.background_color = Some(v),
            (keys::BACKGROUND_IMAGE_URL, Value::Str(v)) => {
                self.prefs.background_image_url = Some(v)
            }
            (keys::PERFORMANCE_MODE, Value::Bool(v)) => self.prefs.performance_mode = Some(v),
            (key, value) => {
                warn!("ignoring unknown preference {} = {:?}", key, value);
                return;
            }
        }
        self.save();
    }
}

/// Plays the command-line overrides through the engine setters, so each one
/// writes through to the preferences file and re-applies its surface.
fn apply_overrides(engine: &mut Engine, doc: &dom_tree::Document, args: &Args) {
    if let Some(v) = args.ad_block {
        engine.set_ad_block_enabled(doc, v);
    }
    if let Some(v) = args.hide_shorts {
        engine.set_hide_shorts(doc, v);
    }
    if let Some(v) = args.performance_mode {
        engine.set_performance_mode(doc, v);
    }
    if let Some(v) = args.background {
        engine.set_background_enabled(doc, v);
    }
    if let Some(mode) = &args.background_mode {
        engine.set_background_mode(doc, BackgroundMode::from_str(mode));
    }
    if let Some(color) = &args.background_color {
        engine.set_background_color(doc, color);
    }
    if let Some(url) = &args.background_image_url {
        engine.set_background_image_url(doc, url);
    }
}

fn main() {
    env_logger::init();

    let args: Args = Args::parse();

    match fs::read_to_string(&args.input) {
        Ok(html) => {
            let doc = parse_snapshot(&html);
            let store = TomlStore::open(args.prefs.clone());
            let mut engine = Engine::new(Box::new(store));
            info!(
                "running filter pass (ad_block={}, hide_shorts={}, background={})",
                engine.config().ad_block_enabled,
                engine.config().hide_shorts,
                engine.config().background_enabled
            );
            engine.handle_event(&doc, PageEvent::Ready, std::time::Duration::ZERO);
            apply_overrides(&mut engine, &doc, &args);
            engine.run_until_idle(&doc);

            let out = serialize_document(&doc);
            match &args.output {
                Some(path) => {
                    if let Err(e) = fs::write(path, out) {
                        eprintln!("Error writing output file: {}", e);
                        std::process::exit(1);
                    }
                }
                None => print!("{}", out),
            }
        }
        Err(e) => {
            eprintln!("Error reading HTML file: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // Mirrors the startup sequence in main: the store takes the prefs path
    // first, and the remaining override flags are read from args afterwards.
    #[test]
    fn overrides_are_applied_after_the_store_takes_the_prefs_path() {
        let prefs_path =
            std::env::temp_dir().join(format!("feedscrub-test-{}.toml", std::process::id()));
        let _ = fs::remove_file(&prefs_path);

        let args = Args::parse_from([
            "feedscrub",
            "page.html",
            "--prefs",
            prefs_path.to_str().unwrap(),
            "--hide-shorts",
            "true",
            "--background-color",
            "#101010",
        ]);

        let doc =
            parse_snapshot("<html><head></head><body><div id=\"contents\"></div></body></html>");
        let store = TomlStore::open(args.prefs.clone());
        let mut engine = Engine::new(Box::new(store));
        engine.handle_event(&doc, PageEvent::Ready, std::time::Duration::ZERO);
        apply_overrides(&mut engine, &doc, &args);
        engine.run_until_idle(&doc);

        assert!(engine.config().hide_shorts);
        assert_eq!(engine.config().background_color, "#101010");

        // The setters wrote through to the preferences file.
        let reread = TomlStore::open(args.prefs.clone());
        assert_eq!(reread.prefs.hide_shorts, Some(true));
        assert_eq!(reread.prefs.background_color.as_deref(), Some("#101010"));

        let _ = fs::remove_file(&prefs_path);
    }
}

//! Appearance application: marker classes plus custom properties on the
//! document chrome. Every apply reconciles the tree to the state the
//! configuration asks for, so the routine is idempotent and safe to run
//! from any trigger.

use crate::config::{BackgroundMode, Config, FALLBACK_BACKGROUND_COLOR};
use crate::dom::dom_tree::{parse_inline_style, write_inline_style, Document, NodeHandle};
use crate::style::selector::Selector;
use log::debug;

/// Marker class carried by the root, body, app shell and search box while the
/// custom background is enabled.
pub const MARKER_CLASS: &str = "feedscrub-custom-bg";

pub const PROP_COLOR: &str = "--feedscrub-bg-color";
pub const PROP_IMAGE: &str = "--feedscrub-bg-image";
pub const PROP_SIZE: &str = "--feedscrub-bg-size";
pub const PROP_REPEAT: &str = "--feedscrub-bg-repeat";
pub const PROP_POSITION: &str = "--feedscrub-bg-position";
pub const PROP_ATTACHMENT: &str = "--feedscrub-bg-attachment";

const ALL_PROPS: &[&str] = &[
    PROP_COLOR,
    PROP_IMAGE,
    PROP_SIZE,
    PROP_REPEAT,
    PROP_POSITION,
    PROP_ATTACHMENT,
];

/// Selector for the search input, which loads late and is reconciled again
/// by its own watcher.
pub const SEARCH_BOX_SELECTOR: &str = ".ytSearchboxComponentInputBox";

fn marker_targets(doc: &Document) -> Vec<NodeHandle> {
    let mut targets = Vec::new();
    for selector in ["html", "body", "ytd-app", SEARCH_BOX_SELECTOR] {
        if let Some(node) = Selector::parse(selector).query_first(&doc.root) {
            targets.push(node);
        }
    }
    targets
}

/// The custom properties the current configuration asks for, in a fixed
/// order so the serialized style attribute is stable across applies.
fn desired_properties(config: &Config) -> Vec<(String, String)> {
    let mut props: Vec<(&str, String)> = Vec::new();
    match config.background_mode {
        BackgroundMode::Color => {
            props.push((PROP_COLOR, config.background_color.clone()));
            props.push((PROP_IMAGE, "none".to_string()));
        }
        BackgroundMode::Image if !config.background_image_url.is_empty() => {
            props.push((PROP_COLOR, "transparent".to_string()));
            props.push((
                PROP_IMAGE,
                format!("url(\"{}\")", config.background_image_url),
            ));
            props.push((PROP_SIZE, "cover".to_string()));
            props.push((PROP_REPEAT, "no-repeat".to_string()));
            props.push((PROP_POSITION, "center center".to_string()));
            // Fixed attachment keeps the image stationary under scroll.
            props.push((PROP_ATTACHMENT, "fixed".to_string()));
        }
        BackgroundMode::Image => {
            // Image mode with no reference degrades to the flat fallback
            // color instead of leaving a broken background.
            props.push((PROP_COLOR, FALLBACK_BACKGROUND_COLOR.to_string()));
            props.push((PROP_IMAGE, "none".to_string()));
            props.push((PROP_SIZE, "auto".to_string()));
            props.push((PROP_REPEAT, "repeat".to_string()));
            props.push((PROP_POSITION, "0% 0%".to_string()));
            props.push((PROP_ATTACHMENT, "scroll".to_string()));
        }
    }
    props.into_iter().map(|(n, v)| (n.to_string(), v)).collect()
}

/// Applies the appearance described by `config`: reconciles the marker class
/// on every target and rewrites the root's custom properties in one pass.
/// Re-applying an unchanged configuration writes nothing, so the watchers
/// observing these nodes see no self-inflicted mutations.
pub fn apply(doc: &Document, config: &Config) {
    let root = match Selector::parse("html").query_first(&doc.root) {
        Some(root) => root,
        None => return,
    };

    for target in marker_targets(doc) {
        if config.background_enabled {
            doc.add_class(&target, MARKER_CLASS);
        } else {
            doc.remove_class(&target, MARKER_CLASS);
        }
    }

    // One write: keep foreign declarations, drop all owned properties, then
    // append the desired set.
    let current = attr_style(&root);
    let mut props: Vec<(String, String)> = parse_inline_style(&current)
        .into_iter()
        .filter(|(name, _)| !ALL_PROPS.contains(&name.as_str()))
        .collect();
    if config.background_enabled {
        props.extend(desired_properties(config));
    }
    if props.is_empty() {
        doc.remove_attribute(&root, "style");
    } else {
        doc.set_attribute(&root, "style", &write_inline_style(&props));
    }

    if config.background_enabled {
        debug!(
            "custom background applied (mode={}, color={}, image={})",
            config.background_mode.as_str(),
            config.background_color,
            config.background_image_url
        );
    } else {
        debug!("custom background removed");
    }
}

fn attr_style(node: &NodeHandle) -> String {
    crate::dom::dom_tree::attr(node, "style").unwrap_or_default()
}

/// Reconciles the late-loading search input's marker class with the current
/// flag. No-op when the element is not in the document yet.
pub fn sync_search_box(doc: &Document, config: &Config) {
    let search_box = match Selector::parse(SEARCH_BOX_SELECTOR).query_first(&doc.root) {
        Some(node) => node,
        None => return,
    };
    if config.background_enabled {
        doc.add_class(&search_box, MARKER_CLASS);
    } else {
        doc.remove_class(&search_box, MARKER_CLASS);
    }
}

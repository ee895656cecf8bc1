//! Style injector: owns a single stylesheet fragment and fully regenerates
//! its text from the current configuration on every apply.

use crate::config::Config;
use crate::dom::dom_tree::{Document, NodeHandle};
use crate::rules::{AD_HIGH_RISK, AD_PATTERNS};
use crate::style::selector::Selector;
use log::{debug, warn};

/// Id of the one stylesheet element the engine owns.
pub const STYLE_ELEMENT_ID: &str = "feedscrub-hide-style";

/// Builds the full fragment text for the given configuration. Pure; same
/// configuration always yields byte-identical text.
pub fn build_css(config: &Config) -> String {
    let mut css = String::new();

    if config.ad_block_enabled {
        let selectors: Vec<&str> = AD_PATTERNS.iter().map(|p| p.selector).collect();
        css.push_str(&selectors.join(", "));
        css.push_str(
            " { display: none !important; width: 0 !important; height: 0 !important; \
             overflow: hidden !important; margin: 0 !important; padding: 0 !important; }\n",
        );
        // Conservative hidden-but-layout-preserving rule for the containers
        // most likely to leave visible gaps when zero-sized.
        css.push_str(&AD_HIGH_RISK.join(",\n"));
        css.push_str(
            " { visibility: hidden !important; height: 0 !important; \
             margin: 0 !important; padding: 0 !important; }\n",
        );
    }

    if config.performance_mode {
        css.push_str(
            "ytd-preview-thumbnail, ytd-video-preview { display: none !important; }\n\
             .ytp-upnext-autoplay-icon, .ytp-upnext-next-unmute { display: none !important; }\n\
             tp-yt-paper-dialog, ytd-menu-popup-renderer, ytd-popup-container, .ytp-popup \
             { box-shadow: none !important; transition: none !important; \
             animation: none !important; }\n\
             ytd-button-renderer, yt-formatted-string, ytd-toggle-button-renderer, \
             ytd-compact-link-renderer, ytd-account-item-renderer \
             { transition: none !important; }\n",
        );
    }

    css
}

/// Finds the owned stylesheet element, creating it inside `<head>` if absent.
/// Returns None when the document has no `<head>` yet; the bootstrap must
/// sequence apply after the document structure exists.
fn ensure_style_element(doc: &Document) -> Option<NodeHandle> {
    let existing = Selector::parse(&format!("style#{}", STYLE_ELEMENT_ID)).query_first(&doc.root);
    if existing.is_some() {
        return existing;
    }
    let head = match Selector::parse("head").query_first(&doc.root) {
        Some(head) => head,
        None => {
            warn!("no <head> in document, stylesheet not injected");
            return None;
        }
    };
    let style = crate::dom::dom_tree::create_element("style");
    doc.set_attribute(&style, "id", STYLE_ELEMENT_ID);
    doc.append_child(&head, style.clone());
    debug!("stylesheet element created");
    Some(style)
}

/// Regenerates the injected fragment. Safe to call repeatedly with differing
/// configuration; each call fully supersedes the previous text.
pub fn apply(doc: &Document, config: &Config) {
    let style = match ensure_style_element(doc) {
        Some(style) => style,
        None => return,
    };
    doc.set_text(&style, &build_css(config));
    debug!(
        "stylesheet applied (ad_block={}, performance={})",
        config.ad_block_enabled, config.performance_mode
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::dom_tree::{append_child_raw, create_element, new_document, text_content, Document};
    use pretty_assertions::assert_eq;

    fn doc_with_head() -> Document {
        let doc = new_document();
        let html = create_element("html");
        let head = create_element("head");
        append_child_raw(&doc.root, &html);
        append_child_raw(&html, &head);
        doc
    }

    #[test]
    fn apply_is_idempotent_byte_for_byte() {
        let doc = doc_with_head();
        let config = Config {
            performance_mode: true,
            ..Config::default()
        };
        apply(&doc, &config);
        let style = Selector::parse(&format!("#{}", STYLE_ELEMENT_ID))
            .query_first(&doc.root)
            .unwrap();
        let first = text_content(&style);
        apply(&doc, &config);
        assert_eq!(text_content(&style), first);
        // Still exactly one owned element.
        assert_eq!(
            Selector::parse("style").query_all(&doc.root).len(),
            1
        );
    }

    #[test]
    fn reapply_supersedes_rather_than_appends() {
        let doc = doc_with_head();
        apply(&doc, &Config::default());
        let style = Selector::parse(&format!("#{}", STYLE_ELEMENT_ID))
            .query_first(&doc.root)
            .unwrap();
        let with_ads_blocked = text_content(&style);
        assert!(with_ads_blocked.contains("display: none"));

        let config = Config {
            ad_block_enabled: false,
            ..Config::default()
        };
        apply(&doc, &config);
        assert_eq!(text_content(&style), "");
    }

    #[test]
    fn fragment_sections_follow_flags() {
        let all_off = Config {
            ad_block_enabled: false,
            performance_mode: false,
            ..Config::default()
        };
        assert_eq!(build_css(&all_off), "");

        let perf_only = Config {
            ad_block_enabled: false,
            performance_mode: true,
            ..Config::default()
        };
        let css = build_css(&perf_only);
        assert!(css.contains("ytd-video-preview"));
        assert!(!css.contains("ytd-ad-slot-renderer"));
    }
}

//! Static rule table: structural match patterns grouped by concern.
//!
//! Patterns are immutable constants; nothing is added or removed at runtime.
//! Ordering within a group does not affect correctness; entries are matched
//! independently and the results unioned.

/// How a matched node is suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intensity {
    /// Hidden through a blanket stylesheet rule (zero-size, display none).
    Blanket,
    /// Physically detached from the document.
    Detach,
}

#[derive(Debug, Clone, Copy)]
pub struct Pattern {
    pub selector: &'static str,
    pub intensity: Intensity,
}

const fn blanket(selector: &'static str) -> Pattern {
    Pattern {
        selector,
        intensity: Intensity::Blanket,
    }
}

const fn detach(selector: &'static str) -> Pattern {
    Pattern {
        selector,
        intensity: Intensity::Detach,
    }
}

/// Promotional/sponsored containers, suppressed via the injected stylesheet.
pub const AD_PATTERNS: &[Pattern] = &[
    blanket("ytd-promoted-sparkles-web-renderer"),
    blanket("ytd-display-ad-renderer"),
    blanket("ytd-ad-slot-renderer"),
    blanket("top-banner-image-text-icon-buttoned-layout-view-model"),
    blanket(".ytd-promoted-sparkles-text-banner-renderer"),
    blanket("ytd-action-companion-ad-renderer"),
    blanket("ytd-engagement-panel-section-list-renderer[target-id=\"engagement-panel-ads\"]"),
    blanket("#masthead-ad"),
    blanket("#watch-eow-content > .pyv-afc-paywall"),
    blanket("div.ytd-mealbar-promo-renderer"),
    blanket("ytd-in-feed-ad-layout-renderer"),
    blanket("ytd-rich-item-renderer:has(.badge-style-type-ad)"),
    blanket("ytd-rich-item-renderer:has(ytd-ad-badge-renderer)"),
    blanket("ytd-video-renderer:has(.badge-style-type-ad)"),
    blanket("ytd-video-renderer:has(ytd-ad-badge-renderer)"),
    blanket("ytd-playlist-video-renderer:has(.badge-style-type-ad)"),
    blanket("[class*=\"ad-container\"]"),
    blanket("[id*=\"ad-wrapper\"]"),
    blanket("[data-simplepd-mod=\"Ad\"]"),
    blanket(".ad-div"),
    blanket(".GoogleActiveViewElement"),
    blanket("#panels:has(ytd-ads-engagement-panel-content-renderer)"),
    blanket(".yt-mealbar-promo-renderer"),
];

/// High-risk containers that additionally get a conservative
/// hidden-but-layout-preserving rule.
pub const AD_HIGH_RISK: &[&str] = &[
    "ytd-rich-item-renderer:has(ytd-ad-slot-renderer)",
    "#masthead-ad",
    "#panels:has(ytd-ads-engagement-panel-content-renderer)",
    ".yt-mealbar-promo-renderer",
];

/// Short-form-content containers, removed from the document outright;
/// stylesheet hiding alone was not enough for these.
pub const SHORTS_PATTERNS: &[Pattern] = &[
    detach("ytd-rich-shelf-renderer[is-shorts]"),
    detach(
        "ytd-rich-grid-row #contents ytd-grid-video-renderer:has(ytd-thumbnail-overlay-time-status-renderer[overlay-style=\"SHORTS\"])",
    ),
    detach("ytd-guide-entry-renderer:has(a[href=\"/shorts\"])"),
    detach("ytd-player[player-type=\"SHORTS_PLAYER\"]"),
    detach(
        "ytd-compact-video-renderer:has(ytd-thumbnail-overlay-time-status-renderer[overlay-style=\"SHORTS\"])",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::selector::parse_complex_selector;

    #[test]
    fn every_pattern_parses() {
        for pattern in AD_PATTERNS.iter().chain(SHORTS_PATTERNS) {
            assert!(
                parse_complex_selector(pattern.selector).is_some(),
                "failed to parse: {}",
                pattern.selector
            );
        }
        for selector in AD_HIGH_RISK {
            assert!(parse_complex_selector(selector).is_some());
        }
    }

    #[test]
    fn groups_have_consistent_intensity() {
        assert!(AD_PATTERNS.iter().all(|p| p.intensity == Intensity::Blanket));
        assert!(SHORTS_PATTERNS.iter().all(|p| p.intensity == Intensity::Detach));
    }
}

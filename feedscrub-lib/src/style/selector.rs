//! Structural match patterns: a small CSS selector engine covering the
//! grammar the rule table uses: tag/id/class/attribute conditions,
//! `:has(...)`, and the four combinators.

use crate::dom::dom_tree::{children_of, parent_of, ElementNode, Node, NodeHandle};
use log::warn;
use std::collections::HashSet;
use std::rc::Rc;

/// Supported attribute selector operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeOperator {
    /// [attr="value"]
    Exact,
    /// [attr~="value"]
    Includes,
    /// [attr^="value"]
    Prefix,
    /// [attr$="value"]
    Suffix,
    /// [attr*="value"]
    Substring,
}

/// Represents one attribute condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSelector {
    pub name: String,
    pub operator: Option<AttributeOperator>, // None means only existence check
    pub value: Option<String>,
}

/// One simple-selector sequence: optional tag, id, classes, attribute
/// conditions, and `:has(...)` subtree conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundSelector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: HashSet<String>,
    pub attributes: Vec<AttributeSelector>,
    pub has: Vec<ComplexSelector>,
}

/// A complex selector composed of a key compound selector and its ancestor
/// parts, stored right-to-left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSelector {
    pub key: CompoundSelector,
    pub ancestors: Vec<(Combinator, CompoundSelector)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Combinator {
    /// Descendant combinator (a space).
    Descendant,
    /// Child combinator (`>`).
    Child,
    /// Adjacent sibling combinator (`+`).
    AdjacentSibling,
    /// General sibling combinator (`~`).
    GeneralSibling,
}

/// A parsed pattern. Text that fails to parse degrades to a pattern that
/// never matches rather than an error; the rule table is static, so a bad
/// entry shows up once in the log instead of breaking the sweep.
#[derive(Debug, Clone)]
pub struct Selector {
    source: String,
    complex: Option<ComplexSelector>,
}

impl Selector {
    pub fn parse(selector: &str) -> Selector {
        let complex = parse_complex_selector(selector);
        if complex.is_none() {
            warn!("unsupported selector, will never match: {}", selector);
        }
        Selector {
            source: selector.to_string(),
            complex,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the candidate element matches this selector.
    pub fn matches(&self, candidate: &NodeHandle) -> bool {
        match &self.complex {
            Some(complex) => matches_complex(candidate, complex),
            None => false,
        }
    }

    /// All element descendants of `scope` (exclusive) matching this selector,
    /// in document order.
    pub fn query_all(&self, scope: &NodeHandle) -> Vec<NodeHandle> {
        let complex = match &self.complex {
            Some(complex) => complex,
            None => return Vec::new(),
        };
        let mut out = Vec::new();
        for_each_element(scope, &mut |node| {
            if matches_complex(node, complex) {
                out.push(node.clone());
            }
        });
        out
    }

    pub fn query_first(&self, scope: &NodeHandle) -> Option<NodeHandle> {
        self.query_all(scope).into_iter().next()
    }
}

/// Depth-first walk over the element descendants of `scope`.
fn for_each_element(scope: &NodeHandle, f: &mut dyn FnMut(&NodeHandle)) {
    for child in children_of(scope) {
        if matches!(*child.borrow(), Node::Element(_)) {
            f(&child);
            for_each_element(&child, f);
        }
    }
}

// ------------------------------
// Parsing
// ------------------------------

/// Splits a selector into compound/combinator tokens at top-level whitespace
/// only; whitespace inside `[...]` or `(...)` does not split.
fn split_top_level(selector: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut buffer = String::new();
    let mut depth = 0usize;
    for ch in selector.chars() {
        match ch {
            '[' | '(' => {
                depth += 1;
                buffer.push(ch);
            }
            ']' | ')' => {
                depth = depth.saturating_sub(1);
                buffer.push(ch);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !buffer.is_empty() {
                    tokens.push(std::mem::take(&mut buffer));
                }
            }
            c => buffer.push(c),
        }
    }
    if !buffer.is_empty() {
        tokens.push(buffer);
    }
    tokens
}

pub fn parse_complex_selector(selector: &str) -> Option<ComplexSelector> {
    let tokens = split_top_level(selector);
    if tokens.is_empty() {
        return None;
    }
    let mut iter = tokens.into_iter();
    let mut key = parse_compound_selector(&iter.next()?)?;
    let mut ancestors = Vec::new();

    while let Some(token) = iter.next() {
        let (combinator, compound_token) = match token.as_str() {
            ">" => (Combinator::Child, iter.next()?),
            "+" => (Combinator::AdjacentSibling, iter.next()?),
            "~" => (Combinator::GeneralSibling, iter.next()?),
            _ => (Combinator::Descendant, token),
        };
        ancestors.push((combinator, key));
        key = parse_compound_selector(&compound_token)?;
    }
    ancestors.reverse();
    Some(ComplexSelector { key, ancestors })
}

/// Parse a compound selector string, e.g.
/// `div.red#header[disabled][data-type~="main"]:has(a[href="/x"])`.
pub fn parse_compound_selector(selector: &str) -> Option<CompoundSelector> {
    let mut tag = None;
    let mut id = None;
    let mut classes = HashSet::new();
    let mut attributes = Vec::new();
    let mut has = Vec::new();
    let mut chars = selector.chars().peekable();
    let mut buffer = String::new();

    // If first char is alphanumeric, '-' or '*' assume tag.
    if let Some(&ch) = chars.peek() {
        if ch.is_alphanumeric() || ch == '*' || ch == '-' {
            while let Some(&ch) = chars.peek() {
                if ch == '#' || ch == '.' || ch == '[' || ch == ':' {
                    break;
                }
                buffer.push(ch);
                chars.next();
            }
            if !buffer.is_empty() && buffer != "*" {
                tag = Some(buffer.clone());
            }
            buffer.clear();
        }
    }

    while let Some(ch) = chars.next() {
        match ch {
            '#' => {
                while let Some(&ch) = chars.peek() {
                    if ch == '.' || ch == '#' || ch == '[' || ch == ':' {
                        break;
                    }
                    buffer.push(ch);
                    chars.next();
                }
                if !buffer.is_empty() {
                    id = Some(buffer.clone());
                }
                buffer.clear();
            }
            '.' => {
                while let Some(&ch) = chars.peek() {
                    if ch == '.' || ch == '#' || ch == '[' || ch == ':' {
                        break;
                    }
                    buffer.push(ch);
                    chars.next();
                }
                if !buffer.is_empty() {
                    classes.insert(buffer.clone());
                }
                buffer.clear();
            }
            '[' => {
                attributes.push(parse_attribute_selector(&mut chars)?);
            }
            ':' => {
                // Pseudo-class. Only :has(...) is supported.
                let mut name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch == '(' || ch == '.' || ch == '#' || ch == '[' || ch == ':' {
                        break;
                    }
                    name.push(ch);
                    chars.next();
                }
                if name != "has" || chars.peek() != Some(&'(') {
                    return None;
                }
                chars.next(); // consume '('
                let mut inner = String::new();
                let mut depth = 1usize;
                for ch in chars.by_ref() {
                    match ch {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    inner.push(ch);
                }
                if depth != 0 {
                    return None;
                }
                has.push(parse_complex_selector(inner.trim())?);
            }
            _ => {}
        }
    }

    Some(CompoundSelector {
        tag,
        id,
        classes,
        attributes,
        has,
    })
}

/// Parses one `[...]` attribute condition; the opening '[' has already been
/// consumed.
fn parse_attribute_selector(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Option<AttributeSelector> {
    let mut attr_name = String::new();
    let mut operator: Option<AttributeOperator> = None;
    let mut attr_value: Option<String> = None;

    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
        } else {
            break;
        }
    }
    while let Some(&ch) = chars.peek() {
        if ch == '=' || ch == ']' || ch == '~' || ch == '^' || ch == '$' || ch == '*'
            || ch.is_whitespace()
        {
            break;
        }
        attr_name.push(ch);
        chars.next();
    }
    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
        } else {
            break;
        }
    }
    if let Some(&ch) = chars.peek() {
        if ch == '=' || ch == '~' || ch == '^' || ch == '$' || ch == '*' {
            let mut op_str = String::new();
            op_str.push(ch);
            chars.next();
            if let Some(&next_ch) = chars.peek() {
                if next_ch == '=' {
                    op_str.push(next_ch);
                    chars.next();
                }
            }
            operator = match op_str.as_str() {
                "=" => Some(AttributeOperator::Exact),
                "~=" => Some(AttributeOperator::Includes),
                "^=" => Some(AttributeOperator::Prefix),
                "$=" => Some(AttributeOperator::Suffix),
                "*=" => Some(AttributeOperator::Substring),
                _ => return None,
            };
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    chars.next();
                } else {
                    break;
                }
            }
            let quote = match chars.peek() {
                Some(&ch) if ch == '"' || ch == '\'' => Some(ch),
                _ => None,
            };
            if let Some(q) = quote {
                chars.next(); // consume opening quote
                let mut value_buf = String::new();
                for ch in chars.by_ref() {
                    if ch == q {
                        break;
                    }
                    value_buf.push(ch);
                }
                attr_value = Some(value_buf);
            } else {
                let mut value_buf = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || ch == ']' {
                        break;
                    }
                    value_buf.push(ch);
                    chars.next();
                }
                attr_value = Some(value_buf);
            }
        }
    }
    // Skip until ']'
    for ch in chars.by_ref() {
        if ch == ']' {
            break;
        }
    }
    if attr_name.is_empty() {
        return None;
    }
    Some(AttributeSelector {
        name: attr_name,
        operator,
        value: attr_value,
    })
}

// ------------------------------
// Matching
// ------------------------------

fn compound_matches_element(elem: &ElementNode, compound: &CompoundSelector) -> bool {
    if let Some(ref tag) = compound.tag {
        if !elem.tag.eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(ref id_val) = compound.id {
        match elem.attributes.get("id") {
            Some(elem_id) if elem_id == id_val => {}
            _ => return false,
        }
    }
    if !compound.classes.is_empty() {
        match elem.attributes.get("class") {
            Some(class_attr) => {
                let elem_classes: HashSet<&str> = class_attr.split_whitespace().collect();
                if !compound
                    .classes
                    .iter()
                    .all(|c| elem_classes.contains(c.as_str()))
                {
                    return false;
                }
            }
            None => return false,
        }
    }
    for attr_sel in &compound.attributes {
        let actual_val = match elem.attributes.get(&attr_sel.name) {
            Some(v) => v,
            None => return false,
        };
        if let Some(expected) = &attr_sel.value {
            let ok = match attr_sel.operator {
                Some(AttributeOperator::Exact) => actual_val == expected,
                Some(AttributeOperator::Includes) => {
                    actual_val.split_whitespace().any(|w| w == expected)
                }
                Some(AttributeOperator::Prefix) => actual_val.starts_with(expected.as_str()),
                Some(AttributeOperator::Suffix) => actual_val.ends_with(expected.as_str()),
                Some(AttributeOperator::Substring) => actual_val.contains(expected.as_str()),
                None => true, // existence already confirmed
            };
            if !ok {
                return false;
            }
        }
    }
    true
}

/// Returns true if the given node is an element matching the compound
/// selector, including its `:has(...)` conditions.
pub fn matches_compound(candidate: &NodeHandle, compound: &CompoundSelector) -> bool {
    {
        let node = candidate.borrow();
        let elem = match &*node {
            Node::Element(elem) => elem,
            _ => return false,
        };
        if !compound_matches_element(elem, compound) {
            return false;
        }
    }
    // :has(...): some descendant must match each inner selector.
    for inner in &compound.has {
        let mut found = false;
        for_each_element(candidate, &mut |node| {
            if !found && matches_complex(node, inner) {
                found = true;
            }
        });
        if !found {
            return false;
        }
    }
    true
}

/// Matches a ComplexSelector against a candidate element. Matching proceeds
/// right-to-left; sibling relations are derived from the parent's child list.
pub fn matches_complex(candidate: &NodeHandle, complex: &ComplexSelector) -> bool {
    if !matches_compound(candidate, &complex.key) {
        return false;
    }
    let mut current = candidate.clone();
    for (combinator, compound) in &complex.ancestors {
        let found = match combinator {
            Combinator::Child => match parent_of(&current) {
                Some(parent) if matches_compound(&parent, compound) => {
                    current = parent;
                    true
                }
                _ => false,
            },
            Combinator::Descendant => {
                let mut ancestor = parent_of(&current);
                let mut matched = false;
                while let Some(node) = ancestor {
                    if matches_compound(&node, compound) {
                        current = node;
                        matched = true;
                        break;
                    }
                    ancestor = parent_of(&node);
                }
                matched
            }
            Combinator::AdjacentSibling => match prev_element_sibling(&current) {
                Some(sibling) if matches_compound(&sibling, compound) => {
                    current = sibling;
                    true
                }
                _ => false,
            },
            Combinator::GeneralSibling => {
                let mut matched = false;
                let mut sibling = prev_element_sibling(&current);
                while let Some(node) = sibling {
                    if matches_compound(&node, compound) {
                        current = node;
                        matched = true;
                        break;
                    }
                    sibling = prev_element_sibling(&node);
                }
                matched
            }
        };
        if !found {
            return false;
        }
    }
    true
}

fn prev_element_sibling(node: &NodeHandle) -> Option<NodeHandle> {
    let parent = parent_of(node)?;
    let siblings = children_of(&parent);
    let index = siblings.iter().position(|s| Rc::ptr_eq(s, node))?;
    siblings[..index]
        .iter()
        .rev()
        .find(|s| matches!(*s.borrow(), Node::Element(_)))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::dom_tree::{append_child_raw, create_element, new_document, Document};

    fn build(tag: &str, attrs: &[(&str, &str)]) -> NodeHandle {
        let node = create_element(tag);
        if let Node::Element(elem) = &mut *node.borrow_mut() {
            for (k, v) in attrs {
                elem.attributes.insert(k.to_string(), v.to_string());
            }
        }
        node
    }

    fn sample_document() -> (Document, NodeHandle) {
        // <body>
        //   <div id="feed" class="grid dark">
        //     <ytd-video-renderer/>
        //     <ytd-video-renderer><span class="badge-style-type-ad"/></ytd-video-renderer>
        //   </div>
        //   <a href="/shorts"/>
        let doc = new_document();
        let html = create_element("html");
        let body = create_element("body");
        append_child_raw(&doc.root, &html);
        append_child_raw(&html, &body);

        let feed = build("div", &[("id", "feed"), ("class", "grid dark")]);
        append_child_raw(&body, &feed);
        let plain = build("ytd-video-renderer", &[]);
        append_child_raw(&feed, &plain);
        let promoted = build("ytd-video-renderer", &[]);
        let badge = build("span", &[("class", "badge-style-type-ad")]);
        append_child_raw(&promoted, &badge);
        append_child_raw(&feed, &promoted);
        let link = build("a", &[("href", "/shorts")]);
        append_child_raw(&body, &link);
        (doc, body)
    }

    #[test]
    fn tag_id_class_matching() {
        let (doc, _) = sample_document();
        assert_eq!(Selector::parse("div").query_all(&doc.root).len(), 1);
        assert_eq!(Selector::parse("#feed").query_all(&doc.root).len(), 1);
        assert_eq!(Selector::parse("div.grid.dark").query_all(&doc.root).len(), 1);
        assert!(Selector::parse("div.missing").query_all(&doc.root).is_empty());
    }

    #[test]
    fn attribute_operators() {
        let (doc, _) = sample_document();
        assert_eq!(
            Selector::parse("a[href=\"/shorts\"]").query_all(&doc.root).len(),
            1
        );
        assert_eq!(Selector::parse("a[href^=\"/sh\"]").query_all(&doc.root).len(), 1);
        assert_eq!(Selector::parse("a[href$=\"orts\"]").query_all(&doc.root).len(), 1);
        assert_eq!(Selector::parse("a[href*=\"hor\"]").query_all(&doc.root).len(), 1);
        assert_eq!(Selector::parse("[class~=\"dark\"]").query_all(&doc.root).len(), 1);
        assert!(Selector::parse("a[href=\"/feed\"]").query_all(&doc.root).is_empty());
    }

    #[test]
    fn has_pseudo_selects_only_containers_with_matching_descendant() {
        let (doc, _) = sample_document();
        let hits =
            Selector::parse("ytd-video-renderer:has(.badge-style-type-ad)").query_all(&doc.root);
        assert_eq!(hits.len(), 1);
        assert!(
            Selector::parse("ytd-video-renderer:has(.badge-style-type-ad)")
                .matches(&hits[0])
        );
    }

    #[test]
    fn descendant_and_child_combinators() {
        let (doc, body) = sample_document();
        assert_eq!(
            Selector::parse("#feed ytd-video-renderer").query_all(&doc.root).len(),
            2
        );
        assert_eq!(
            Selector::parse("body > div").query_all(&doc.root).len(),
            1
        );
        // The key element itself is not part of the query scope.
        assert!(Selector::parse("body").query_all(&body).is_empty());
    }

    #[test]
    fn sibling_combinators() {
        let (doc, _) = sample_document();
        assert_eq!(
            Selector::parse("ytd-video-renderer + ytd-video-renderer")
                .query_all(&doc.root)
                .len(),
            1
        );
        assert_eq!(
            Selector::parse("div ~ a").query_all(&doc.root).len(),
            1
        );
    }

    #[test]
    fn has_with_spaces_does_not_split() {
        let (doc, _) = sample_document();
        let hits = Selector::parse("body div:has(ytd-video-renderer .badge-style-type-ad)")
            .query_all(&doc.root);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn unknown_pseudo_never_matches() {
        let (doc, _) = sample_document();
        let selector = Selector::parse("div:hover");
        assert!(selector.query_all(&doc.root).is_empty());
        assert!(!selector.matches(&doc.root));
    }
}

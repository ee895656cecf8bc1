//! HTML snapshot parsing and serialization.
//!
//! Uses html5ever to parse a page snapshot into the DOM tree defined in
//! `crate::dom::dom_tree`, and writes a tree back out as HTML. Construction
//! goes through the raw append path, so parsing never produces mutation
//! records.

use crate::dom::dom_tree;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{
    interface::{ElemName, NodeOrText, QuirksMode, TreeSink},
    LocalName, Namespace, QualName,
};
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

/// Void (self-closing) elements in HTML.
const VOID_ELEMENTS: &[&str] = &[
    "meta", "img", "br", "hr", "input", "link", "area", "base", "col", "embed", "param", "source",
    "track", "wbr",
];

/// Parses an HTML page snapshot into a document.
pub fn parse_snapshot(html: &str) -> dom_tree::Document {
    let sink = SnapshotSink::new();
    html5ever::parse_document(sink, Default::default()).one(html.to_string())
}

/// Serializes the document back to HTML. Attributes are written in sorted
/// order so the output is stable across runs.
pub fn serialize_document(document: &dom_tree::Document) -> String {
    let mut out = String::new();
    if let Some(doctype) = &*document.doctype.borrow() {
        out.push_str("<!DOCTYPE ");
        out.push_str(&doctype.name);
        out.push_str(">\n");
    }
    write_node(&mut out, &document.root);
    out
}

fn write_node(out: &mut String, node: &dom_tree::NodeHandle) {
    match &*node.borrow() {
        dom_tree::Node::DocumentRoot(root) => {
            for child in &root.children {
                write_node(out, child);
            }
        }
        dom_tree::Node::Element(elem) => {
            out.push('<');
            out.push_str(&elem.tag);
            let mut attrs: Vec<_> = elem.attributes.iter().collect();
            attrs.sort_by(|a, b| a.0.cmp(b.0));
            for (name, value) in attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_attr(value));
                out.push('"');
            }
            out.push('>');
            if !VOID_ELEMENTS.contains(&elem.tag.as_str()) {
                for child in &elem.children {
                    write_node(out, child);
                }
                out.push_str("</");
                out.push_str(&elem.tag);
                out.push('>');
            }
        }
        dom_tree::Node::Text(text) => {
            out.push_str(&escape_text(text));
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// TreeSink that builds the snapshot document. Holds the document under
/// construction, a stack of open nodes and the quirks mode reported by the
/// tokenizer.
pub struct SnapshotSink {
    document: dom_tree::Document,
    stack: RefCell<Vec<dom_tree::NodeHandle>>,
    quirks_mode: RefCell<QuirksMode>,
}

impl SnapshotSink {
    pub fn new() -> Self {
        let document = dom_tree::new_document();
        let root = document.root.clone();
        Self {
            document,
            stack: RefCell::new(vec![root]),
            quirks_mode: RefCell::new(QuirksMode::NoQuirks),
        }
    }
}

impl Default for SnapshotSink {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct SnapshotElemName {
    ns: Namespace,
    local: LocalName,
}

impl ElemName for SnapshotElemName {
    fn local_name(&self) -> &LocalName {
        &self.local
    }

    fn ns(&self) -> &Namespace {
        &self.ns
    }
}

impl TreeSink for SnapshotSink {
    type Handle = dom_tree::NodeHandle;
    type Output = dom_tree::Document;
    type ElemName<'a>
        = SnapshotElemName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self.document
    }

    /// Snapshots come from real pages; recoverable parse errors are routine.
    fn parse_error(&self, msg: std::borrow::Cow<'static, str>) {
        debug!("parse error: {}", msg);
    }

    fn get_document(&self) -> Self::Handle {
        self.document.root.clone()
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        if let dom_tree::Node::Element(ref elem) = *target.borrow() {
            SnapshotElemName {
                ns: elem.qual_name.ns.clone(),
                local: elem.qual_name.local.clone(),
            }
        } else {
            panic!("elem_name called on non-element node")
        }
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<html5ever::Attribute>,
        _flags: html5ever::interface::ElementFlags,
    ) -> Self::Handle {
        let tag = name.local.to_string();
        let attributes = attrs
            .into_iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect::<std::collections::HashMap<String, String>>();
        let mut element = dom_tree::ElementNode::new(tag, name);
        element.attributes = attributes;
        Rc::new(RefCell::new(dom_tree::Node::Element(element)))
    }

    /// Comments carry nothing the filter engine acts on.
    fn create_comment(&self, _text: StrTendril) -> Self::Handle {
        Rc::new(RefCell::new(dom_tree::Node::Text(String::new())))
    }

    fn create_pi(&self, target: StrTendril, data: StrTendril) -> Self::Handle {
        let combined = format!("{} {}", target, data);
        Rc::new(RefCell::new(dom_tree::Node::Text(combined)))
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        let node = match child {
            NodeOrText::AppendNode(node) => node,
            NodeOrText::AppendText(text) => {
                Rc::new(RefCell::new(dom_tree::Node::Text(text.to_string())))
            }
        };
        dom_tree::append_child_raw(parent, &node);
        if dom_tree::is_element(&node) {
            self.stack.borrow_mut().push(node);
        }
    }

    fn append_based_on_parent_node(
        &self,
        _element: &Self::Handle,
        _prev_element: &Self::Handle,
        _child: NodeOrText<Self::Handle>,
    ) {
    }

    fn append_doctype_to_document(
        &self,
        name: StrTendril,
        public_id: StrTendril,
        system_id: StrTendril,
    ) {
        *self.document.doctype.borrow_mut() = Some(dom_tree::Doctype {
            name: name.to_string(),
            public_id: public_id.to_string(),
            system_id: system_id.to_string(),
        });
    }

    fn mark_script_already_started(&self, _node: &Self::Handle) {}

    fn pop(&self, _node: &Self::Handle) {
        self.stack.borrow_mut().pop();
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        target.clone()
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        Rc::ptr_eq(x, y)
    }

    fn set_quirks_mode(&self, mode: QuirksMode) {
        *self.quirks_mode.borrow_mut() = mode;
    }

    fn append_before_sibling(&self, _sibling: &Self::Handle, _child: NodeOrText<Self::Handle>) {}

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<html5ever::Attribute>) {
        let mut node = target.borrow_mut();
        if let dom_tree::Node::Element(elem) = &mut *node {
            for attr in attrs {
                let key = attr.name.local.to_string();
                elem.attributes
                    .entry(key)
                    .or_insert_with(|| attr.value.to_string());
            }
        }
    }

    fn remove_from_parent(&self, _target: &Self::Handle) {}

    fn reparent_children(&self, _node: &Self::Handle, _new_parent: &Self::Handle) {}
}

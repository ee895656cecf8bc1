use html5ever::{namespace_url, ns, LocalName, QualName};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

pub mod dom_tree {
    use super::*;
    use log::debug;

    pub type NodeHandle = Rc<RefCell<Node>>;

    #[derive(Debug, Clone)]
    pub enum Node {
        DocumentRoot(DocumentRootNode),
        Element(ElementNode),
        Text(String),
    }

    #[derive(Debug, Clone)]
    pub struct DocumentRootNode {
        pub children: Vec<NodeHandle>,
    }

    #[derive(Debug, Clone)]
    pub struct ElementNode {
        pub tag: String,
        pub qual_name: QualName,
        pub attributes: HashMap<String, String>,
        pub children: Vec<NodeHandle>,
        pub parent: Option<Weak<RefCell<Node>>>,
    }

    #[derive(Debug)]
    pub struct Doctype {
        pub name: String,
        pub public_id: String,
        pub system_id: String,
    }

    impl DocumentRootNode {
        pub fn new() -> Self {
            DocumentRootNode {
                children: Vec::new(),
            }
        }
    }

    impl Default for DocumentRootNode {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ElementNode {
        pub fn new(tag: String, qual_name: QualName) -> Self {
            ElementNode {
                tag,
                qual_name,
                attributes: HashMap::new(),
                children: Vec::new(),
                parent: None,
            }
        }
    }

    /// Builds a detached element node for the given HTML tag.
    pub fn create_element(tag: &str) -> NodeHandle {
        let qual_name = QualName::new(None, ns!(html), LocalName::from(tag));
        Rc::new(RefCell::new(Node::Element(ElementNode::new(
            tag.to_string(),
            qual_name,
        ))))
    }

    pub fn create_text(text: &str) -> NodeHandle {
        Rc::new(RefCell::new(Node::Text(text.to_string())))
    }

    pub fn is_element(node: &NodeHandle) -> bool {
        matches!(*node.borrow(), Node::Element(_))
    }

    pub fn tag_of(node: &NodeHandle) -> Option<String> {
        match &*node.borrow() {
            Node::Element(elem) => Some(elem.tag.clone()),
            _ => None,
        }
    }

    pub fn attr(node: &NodeHandle, name: &str) -> Option<String> {
        match &*node.borrow() {
            Node::Element(elem) => elem.attributes.get(name).cloned(),
            _ => None,
        }
    }

    pub fn parent_of(node: &NodeHandle) -> Option<NodeHandle> {
        match &*node.borrow() {
            Node::Element(elem) => elem.parent.as_ref().and_then(Weak::upgrade),
            _ => None,
        }
    }

    pub fn children_of(node: &NodeHandle) -> Vec<NodeHandle> {
        match &*node.borrow() {
            Node::DocumentRoot(root) => root.children.clone(),
            Node::Element(elem) => elem.children.clone(),
            Node::Text(_) => Vec::new(),
        }
    }

    /// Concatenated text of the node's direct text children.
    pub fn text_content(node: &NodeHandle) -> String {
        let mut out = String::new();
        for child in children_of(node) {
            if let Node::Text(text) = &*child.borrow() {
                out.push_str(text);
            }
        }
        out
    }

    pub fn has_class(node: &NodeHandle, class: &str) -> bool {
        attr(node, "class")
            .map(|c| c.split_whitespace().any(|w| w == class))
            .unwrap_or(false)
    }

    /// Appends `child` to `parent` without notifying observers. Used while a
    /// document is still being constructed by the parser.
    pub fn append_child_raw(parent: &NodeHandle, child: &NodeHandle) {
        if let Node::Element(child_elem) = &mut *child.borrow_mut() {
            child_elem.parent = Some(Rc::downgrade(parent));
        }
        match &mut *parent.borrow_mut() {
            Node::DocumentRoot(root) => root.children.push(child.clone()),
            Node::Element(elem) => elem.children.push(child.clone()),
            Node::Text(_) => {}
        }
    }

    // ------------------------------
    // Mutation observation
    // ------------------------------

    /// Which mutation kinds an observer receives.
    #[derive(Debug, Clone, Default)]
    pub struct ObserveOptions {
        pub child_list: bool,
        pub attributes: bool,
        pub subtree: bool,
        /// Empty means "all attributes".
        pub attribute_filter: Vec<String>,
    }

    #[derive(Debug, Clone)]
    pub enum MutationRecord {
        ChildList {
            target: NodeHandle,
            added: Vec<NodeHandle>,
            removed: Vec<NodeHandle>,
        },
        Attribute {
            target: NodeHandle,
            name: String,
        },
    }

    impl MutationRecord {
        pub fn target(&self) -> &NodeHandle {
            match self {
                MutationRecord::ChildList { target, .. } => target,
                MutationRecord::Attribute { target, .. } => target,
            }
        }
    }

    /// Live subscription to a document's mutations. Dropping the handle does
    /// not unregister it; call [`Document::disconnect`].
    #[derive(Debug)]
    pub struct ObserverHandle {
        id: u64,
        queue: Rc<RefCell<Vec<MutationRecord>>>,
    }

    impl ObserverHandle {
        /// Drains and returns all records delivered since the last call.
        pub fn take_records(&self) -> Vec<MutationRecord> {
            std::mem::take(&mut *self.queue.borrow_mut())
        }
    }

    #[derive(Debug)]
    struct ObserverSlot {
        id: u64,
        roots: Vec<Weak<RefCell<Node>>>,
        options: ObserveOptions,
        queue: Rc<RefCell<Vec<MutationRecord>>>,
    }

    #[derive(Debug)]
    pub struct Document {
        pub root: NodeHandle,
        pub doctype: RefCell<Option<Doctype>>,
        observers: RefCell<Vec<ObserverSlot>>,
        next_observer_id: Cell<u64>,
    }

    pub fn new_document() -> Document {
        Document {
            root: Rc::new(RefCell::new(Node::DocumentRoot(DocumentRootNode::new()))),
            doctype: RefCell::new(None),
            observers: RefCell::new(Vec::new()),
            next_observer_id: Cell::new(1),
        }
    }

    impl Document {
        // -- observation ----------------------------------------------------

        /// Registers an observer over the given root nodes.
        pub fn observe(&self, roots: Vec<NodeHandle>, options: ObserveOptions) -> ObserverHandle {
            let id = self.next_observer_id.get();
            self.next_observer_id.set(id + 1);
            let queue = Rc::new(RefCell::new(Vec::new()));
            self.observers.borrow_mut().push(ObserverSlot {
                id,
                roots: roots.iter().map(Rc::downgrade).collect(),
                options,
                queue: queue.clone(),
            });
            debug!("observer {} registered over {} root(s)", id, roots.len());
            ObserverHandle { id, queue }
        }

        pub fn disconnect(&self, handle: &ObserverHandle) {
            self.observers
                .borrow_mut()
                .retain(|slot| slot.id != handle.id);
            handle.queue.borrow_mut().clear();
            debug!("observer {} disconnected", handle.id);
        }

        /// Number of live observer registrations (diagnostics/tests).
        pub fn observer_count(&self) -> usize {
            self.observers.borrow().len()
        }

        fn deliver(&self, record: MutationRecord) {
            let observers = self.observers.borrow();
            for slot in observers.iter() {
                let wanted = match &record {
                    MutationRecord::ChildList { .. } => slot.options.child_list,
                    MutationRecord::Attribute { name, .. } => {
                        slot.options.attributes
                            && (slot.options.attribute_filter.is_empty()
                                || slot.options.attribute_filter.iter().any(|f| f == name))
                    }
                };
                if !wanted {
                    continue;
                }
                if self.covered(record.target(), slot) {
                    slot.queue.borrow_mut().push(record.clone());
                }
            }
        }

        fn covered(&self, target: &NodeHandle, slot: &ObserverSlot) -> bool {
            for weak in &slot.roots {
                let root = match weak.upgrade() {
                    Some(root) => root,
                    None => continue,
                };
                if Rc::ptr_eq(target, &root) {
                    return true;
                }
                if slot.options.subtree {
                    let mut current = parent_of(target);
                    while let Some(node) = current {
                        if Rc::ptr_eq(&node, &root) {
                            return true;
                        }
                        current = parent_of(&node);
                    }
                }
            }
            false
        }

        // -- mutation -------------------------------------------------------

        pub fn append_child(&self, parent: &NodeHandle, child: NodeHandle) {
            append_child_raw(parent, &child);
            self.deliver(MutationRecord::ChildList {
                target: parent.clone(),
                added: vec![child],
                removed: Vec::new(),
            });
        }

        /// Inserts `child` as the first child of `parent`.
        pub fn prepend_child(&self, parent: &NodeHandle, child: NodeHandle) {
            if let Node::Element(child_elem) = &mut *child.borrow_mut() {
                child_elem.parent = Some(Rc::downgrade(parent));
            }
            match &mut *parent.borrow_mut() {
                Node::DocumentRoot(root) => root.children.insert(0, child.clone()),
                Node::Element(elem) => elem.children.insert(0, child.clone()),
                Node::Text(_) => {}
            }
            self.deliver(MutationRecord::ChildList {
                target: parent.clone(),
                added: vec![child],
                removed: Vec::new(),
            });
        }

        /// Removes a node from its parent. Returns false if the node has no
        /// parent (already detached, or not an element).
        pub fn detach(&self, node: &NodeHandle) -> bool {
            let parent = match parent_of(node) {
                Some(parent) => parent,
                None => return false,
            };
            let removed = match &mut *parent.borrow_mut() {
                Node::DocumentRoot(root) => {
                    let before = root.children.len();
                    root.children.retain(|c| !Rc::ptr_eq(c, node));
                    before != root.children.len()
                }
                Node::Element(elem) => {
                    let before = elem.children.len();
                    elem.children.retain(|c| !Rc::ptr_eq(c, node));
                    before != elem.children.len()
                }
                Node::Text(_) => false,
            };
            if !removed {
                return false;
            }
            if let Node::Element(elem) = &mut *node.borrow_mut() {
                elem.parent = None;
            }
            self.deliver(MutationRecord::ChildList {
                target: parent,
                added: Vec::new(),
                removed: vec![node.clone()],
            });
            true
        }

        /// Sets an attribute. Writing the current value again is a no-op and
        /// emits no record, which keeps repeated idempotent re-applies from
        /// re-triggering the observers that watch for them.
        pub fn set_attribute(&self, node: &NodeHandle, name: &str, value: &str) {
            {
                let mut node_mut = node.borrow_mut();
                let elem = match &mut *node_mut {
                    Node::Element(elem) => elem,
                    _ => return,
                };
                if elem.attributes.get(name).map(String::as_str) == Some(value) {
                    return;
                }
                elem.attributes.insert(name.to_string(), value.to_string());
            }
            self.deliver(MutationRecord::Attribute {
                target: node.clone(),
                name: name.to_string(),
            });
        }

        pub fn remove_attribute(&self, node: &NodeHandle, name: &str) {
            {
                let mut node_mut = node.borrow_mut();
                let elem = match &mut *node_mut {
                    Node::Element(elem) => elem,
                    _ => return,
                };
                if elem.attributes.remove(name).is_none() {
                    return;
                }
            }
            self.deliver(MutationRecord::Attribute {
                target: node.clone(),
                name: name.to_string(),
            });
        }

        pub fn add_class(&self, node: &NodeHandle, class: &str) {
            let current = attr(node, "class").unwrap_or_default();
            if current.split_whitespace().any(|w| w == class) {
                return;
            }
            let updated = if current.is_empty() {
                class.to_string()
            } else {
                format!("{} {}", current, class)
            };
            self.set_attribute(node, "class", &updated);
        }

        pub fn remove_class(&self, node: &NodeHandle, class: &str) {
            let current = match attr(node, "class") {
                Some(current) => current,
                None => return,
            };
            if !current.split_whitespace().any(|w| w == class) {
                return;
            }
            let updated: Vec<&str> = current.split_whitespace().filter(|w| *w != class).collect();
            if updated.is_empty() {
                self.remove_attribute(node, "class");
            } else {
                self.set_attribute(node, "class", &updated.join(" "));
            }
        }

        /// Sets one declaration inside the inline `style` attribute, keeping
        /// the order of the other declarations. Surfaces as an attribute
        /// mutation on `style`.
        pub fn set_style_property(&self, node: &NodeHandle, name: &str, value: &str) {
            let mut props = parse_inline_style(&attr(node, "style").unwrap_or_default());
            match props.iter_mut().find(|(n, _)| n == name) {
                Some((_, v)) => *v = value.to_string(),
                None => props.push((name.to_string(), value.to_string())),
            }
            self.set_attribute(node, "style", &write_inline_style(&props));
        }

        pub fn remove_style_property(&self, node: &NodeHandle, name: &str) {
            let current = match attr(node, "style") {
                Some(current) => current,
                None => return,
            };
            let mut props = parse_inline_style(&current);
            let before = props.len();
            props.retain(|(n, _)| n != name);
            if props.len() == before {
                return;
            }
            if props.is_empty() {
                self.remove_attribute(node, "style");
            } else {
                self.set_attribute(node, "style", &write_inline_style(&props));
            }
        }

        pub fn style_property(&self, node: &NodeHandle, name: &str) -> Option<String> {
            let style = attr(node, "style")?;
            parse_inline_style(&style)
                .into_iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v)
        }

        /// Replaces the node's children with a single text node. A write of
        /// the text already present is a no-op.
        pub fn set_text(&self, node: &NodeHandle, text: &str) {
            if children_of(node).len() == 1 && text_content(node) == text {
                return;
            }
            let old_children;
            let new_child = create_text(text);
            {
                let mut node_mut = node.borrow_mut();
                let elem = match &mut *node_mut {
                    Node::Element(elem) => elem,
                    _ => return,
                };
                old_children = std::mem::take(&mut elem.children);
                elem.children.push(new_child.clone());
            }
            for old in &old_children {
                if let Node::Element(elem) = &mut *old.borrow_mut() {
                    elem.parent = None;
                }
            }
            self.deliver(MutationRecord::ChildList {
                target: node.clone(),
                added: vec![new_child],
                removed: old_children,
            });
        }
    }

    /// Parses an inline `style` attribute into ordered declarations.
    pub fn parse_inline_style(style: &str) -> Vec<(String, String)> {
        style
            .split(';')
            .filter_map(|decl| {
                let (name, value) = decl.split_once(':')?;
                let name = name.trim();
                let value = value.trim();
                if name.is_empty() {
                    None
                } else {
                    Some((name.to_string(), value.to_string()))
                }
            })
            .collect()
    }

    pub fn write_inline_style(props: &[(String, String)]) -> String {
        props
            .iter()
            .map(|(n, v)| format!("{}: {}", n, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

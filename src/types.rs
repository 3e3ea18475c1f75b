use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// DICOM attribute tag, `(group,element)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Tag {
    pub group: u16,
    pub element: u16,
}

impl Tag {
    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }

    /// Parses the 8-hex-digit form used as keys in the DICOM JSON model (`"00100010"`).
    pub fn from_hex(raw: &str) -> Option<Self> {
        if raw.len() != 8 || !raw.is_ascii() {
            return None;
        }
        let group = u16::from_str_radix(&raw[..4], 16).ok()?;
        let element = u16::from_str_radix(&raw[4..], 16).ok()?;
        Some(Self { group, element })
    }

    /// Parses the dictionary form `(0010,0010)`. Repeating-group masks such as `(50xx,0005)` are rejected.
    pub fn from_paren(raw: &str) -> Option<Self> {
        let inner = raw.trim().strip_prefix('(')?.strip_suffix(')')?;
        let (group, element) = inner.split_once(',')?;
        let group = u16::from_str_radix(group.trim(), 16).ok()?;
        let element = u16::from_str_radix(element.trim(), 16).ok()?;
        Some(Self { group, element })
    }

    pub fn is_private(&self) -> bool {
        self.group % 2 == 1
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Padding flags from the caller (`{:<13}`) apply to the whole tag.
        f.pad(&format!("({:04X},{:04X})", self.group, self.element))
    }
}

pub type Item = Vec<Element>;

/// One data element of a loaded record.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: Tag,
    pub name: String,
    pub vr: String,
    /// Display string produced by the value formatter.
    pub value: String,
    /// Sequence items; `None` on a composite element means the items were unusable.
    pub items: Option<Vec<Item>>,
}

impl Element {
    pub fn scalar(tag: Tag, name: impl Into<String>, vr: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tag,
            name: name.into(),
            vr: vr.into(),
            value: value.into(),
            items: None,
        }
    }

    pub fn sequence(tag: Tag, name: impl Into<String>, items: Vec<Item>) -> Self {
        let value = format!("{} Item(s)", items.len());
        Self {
            tag,
            name: name.into(),
            vr: "SQ".into(),
            value,
            items: Some(items),
        }
    }

    pub fn is_composite(&self) -> bool {
        self.vr == "SQ"
    }
}

/// A loaded record: where it came from plus its top-level elements.
#[derive(Debug, Clone)]
pub struct Record {
    pub source: String,
    pub elements: Vec<Element>,
}

impl Record {
    pub fn root_label(&self) -> String {
        root_label(&self.source)
    }
}

pub fn root_label(source: &str) -> String {
    format!("FILE: {source}")
}

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocates an id never handed out before in this process.
    pub fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    Leaf,
    Branch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Field {
    Name,
    Value,
}

/// A highlighted slice of a node's name or value, in bytes relative to that field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlight {
    pub field: Field,
    pub range: Range<usize>,
}

/// Byte offsets of the name, VR and value columns inside a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelLayout {
    pub name_at: usize,
    pub vr_at: usize,
    pub value_at: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisplayNode {
    pub id: NodeId,
    pub label: String,
    pub kind: NodeKind,
    pub children: Vec<DisplayNode>,
    pub expanded: bool,
    pub layout: Option<LabelLayout>,
    pub highlights: Vec<Highlight>,
}

impl DisplayNode {
    pub fn leaf(label: String) -> Self {
        Self {
            id: NodeId::next(),
            label,
            kind: NodeKind::Leaf,
            children: Vec::new(),
            expanded: false,
            layout: None,
            highlights: Vec::new(),
        }
    }

    pub fn branch(label: String, children: Vec<DisplayNode>) -> Self {
        Self {
            kind: NodeKind::Branch,
            children,
            ..Self::leaf(label)
        }
    }

    pub fn is_branch(&self) -> bool {
        self.kind == NodeKind::Branch
    }

    /// Highlight ranges translated into byte ranges of `label`.
    pub fn label_highlights(&self) -> Vec<Range<usize>> {
        let Some(layout) = self.layout else { return Vec::new() };
        let mut spans: Vec<Range<usize>> = self
            .highlights
            .iter()
            .map(|h| {
                let base = match h.field {
                    Field::Name => layout.name_at,
                    Field::Value => layout.value_at,
                };
                base + h.range.start..base + h.range.end
            })
            .collect();
        spans.sort_by_key(|r| r.start);
        spans
    }

    pub fn find(&self, id: NodeId) -> Option<&DisplayNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: NodeId) -> Option<&mut DisplayNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    pub fn set_expanded_recursive(&mut self, expanded: bool) {
        if self.is_branch() {
            self.expanded = expanded;
        }
        for child in &mut self.children {
            child.set_expanded_recursive(expanded);
        }
    }

    /// Pre-order walk over this node and all descendants, with depth.
    pub fn walk(&self) -> Vec<(usize, &DisplayNode)> {
        let mut out = Vec::new();
        let mut stack = vec![(0usize, self)];
        while let Some((depth, node)) = stack.pop() {
            out.push((depth, node));
            for child in node.children.iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }

    /// Structure-only view (labels and shape, no ids) for comparing rebuilt trees.
    pub fn shape(&self) -> Shape {
        Shape {
            label: self.label.clone(),
            kind: self.kind,
            children: self.children.iter().map(DisplayNode::shape).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    pub label: String,
    pub kind: NodeKind,
    pub children: Vec<Shape>,
}

/// Searchable text of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub tag: Option<Tag>,
    pub name: String,
    pub value: String,
}

impl IndexEntry {
    pub fn neutral(tag: Option<Tag>) -> Self {
        Self {
            tag,
            name: String::new(),
            value: String::new(),
        }
    }
}

/// Node id to searchable text, for every node of one tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchIndex {
    entries: BTreeMap<NodeId, IndexEntry>,
}

impl SearchIndex {
    pub fn insert(&mut self, id: NodeId, entry: IndexEntry) {
        self.entries.insert(id, entry);
    }

    pub fn remove(&mut self, id: NodeId) -> Option<IndexEntry> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&IndexEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &IndexEntry)> + '_ {
        self.entries.iter().map(|(id, e)| (*id, e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Truncation {
    TooDeep { limit: usize },
    TooLarge { limit: usize },
}

impl fmt::Display for Truncation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Truncation::TooDeep { limit } => {
                write!(f, "tree too deep to fully display (nesting limit {limit})")
            }
            Truncation::TooLarge { limit } => {
                write!(f, "tree too large to fully display (node limit {limit})")
            }
        }
    }
}

/// The unit that is swapped in on every rebuild.
#[derive(Debug, Clone)]
pub struct DisplayTree {
    pub root: DisplayNode,
    pub index: SearchIndex,
    pub truncation: Option<Truncation>,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub tree: DisplayTree,
    /// `None` for the empty query.
    pub match_count: Option<usize>,
}

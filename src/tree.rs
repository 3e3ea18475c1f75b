use tracing::warn;

use crate::types::{
    DisplayNode, DisplayTree, Element, IndexEntry, LabelLayout, SearchIndex, Truncation,
};

pub const TAG_WIDTH: usize = 13;
pub const NAME_WIDTH: usize = 40;
pub const VR_WIDTH: usize = 4;

/// Ceilings on what a single tree may materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_nodes: 250_000,
        }
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let keep = max.saturating_sub(3);
        format!("{}...", s.chars().take(keep).collect::<String>())
    }
}

/// Fixed-width `tag name vr value` label plus where the name and value start.
pub fn element_label(element: &Element) -> (String, LabelLayout) {
    let tag_col = format!("{:<TAG_WIDTH$}", element.tag);
    let name_col = format!("{:<NAME_WIDTH$}", element.name);
    let vr_col = format!("{:<VR_WIDTH$}", element.vr);

    let name_at = tag_col.len() + 1;
    let vr_at = name_at + name_col.len() + 1;
    let value_at = vr_at + vr_col.len() + 1;
    let label = format!("{tag_col} {name_col} {vr_col} {}", element.value);
    (label, LabelLayout { name_at, vr_at, value_at })
}

pub fn item_label(position: usize) -> String {
    format!("Item {position}")
}

/// Shared bookkeeping for one tree construction: the index being filled and the ceilings.
pub(crate) struct Materializer {
    pub index: SearchIndex,
    pub limits: Limits,
    pub nodes: usize,
    pub truncation: Option<Truncation>,
}

impl Materializer {
    pub fn new(limits: Limits) -> Self {
        Self {
            index: SearchIndex::default(),
            limits,
            nodes: 0,
            truncation: None,
        }
    }

    /// Whether descending to `depth` is allowed; records the condition otherwise.
    pub fn enter(&mut self, depth: usize) -> bool {
        if depth > self.limits.max_depth {
            self.flag(Truncation::TooDeep {
                limit: self.limits.max_depth,
            });
            return false;
        }
        true
    }

    /// Reserves room for one more node; records the condition when full.
    pub fn reserve(&mut self) -> bool {
        if self.nodes >= self.limits.max_nodes {
            self.flag(Truncation::TooLarge {
                limit: self.limits.max_nodes,
            });
            return false;
        }
        self.nodes += 1;
        true
    }

    fn flag(&mut self, t: Truncation) {
        if self.truncation.is_none() {
            warn!(%t, "display tree truncated");
            self.truncation = Some(t);
        }
    }

    pub fn register(&mut self, node: &DisplayNode, entry: IndexEntry) {
        self.index.insert(node.id, entry);
    }

    /// Takes back the index entry and node slot of a node that was not attached after all.
    pub fn unregister(&mut self, node: &DisplayNode) {
        if self.index.remove(node.id).is_some() {
            self.nodes -= 1;
        }
    }

    pub fn finish(mut self, root_label: &str, children: Vec<DisplayNode>) -> DisplayTree {
        let mut root = DisplayNode::branch(root_label.to_string(), children);
        root.expanded = true;
        self.index.insert(root.id, IndexEntry::neutral(None));
        DisplayTree {
            root,
            index: self.index,
            truncation: self.truncation,
        }
    }
}

/// Builds the full, unfiltered display tree for a record.
pub fn build(root_label: &str, elements: &[Element], limits: Limits) -> DisplayTree {
    let mut m = Materializer::new(limits);
    let children = build_elements(elements, 1, &mut m);
    m.finish(root_label, children)
}

fn build_elements(elements: &[Element], depth: usize, m: &mut Materializer) -> Vec<DisplayNode> {
    if elements.is_empty() || !m.enter(depth) {
        return Vec::new();
    }
    let mut nodes = Vec::with_capacity(elements.len());
    for element in elements {
        if !m.reserve() {
            break;
        }
        nodes.push(build_element(element, depth, m));
    }
    nodes
}

fn build_element(element: &Element, depth: usize, m: &mut Materializer) -> DisplayNode {
    let (label, layout) = element_label(element);

    let mut node = if element.is_composite() {
        let items = match &element.items {
            Some(items) => items.as_slice(),
            None => {
                warn!(tag = %element.tag, "sequence without usable items, shown empty");
                &[]
            }
        };
        let mut children = Vec::with_capacity(items.len());
        if !items.is_empty() && m.enter(depth + 1) {
            for (i, item) in items.iter().enumerate() {
                if !m.reserve() {
                    break;
                }
                let item_children = build_elements(item, depth + 2, m);
                let item_node = DisplayNode::branch(item_label(i + 1), item_children);
                m.register(&item_node, IndexEntry::neutral(Some(element.tag)));
                children.push(item_node);
            }
        }
        DisplayNode::branch(label, children)
    } else {
        DisplayNode::leaf(label)
    };

    node.layout = Some(layout);
    m.register(
        &node,
        IndexEntry {
            tag: Some(element.tag),
            name: element.name.clone(),
            value: element.value.clone(),
        },
    );
    node
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{NodeKind, Tag};

    pub(crate) fn scenario_a() -> Vec<Element> {
        let item = |uid: &str| {
            vec![
                Element::scalar(Tag::new(0x0008, 0x1150), "ReferencedSOPClassUID", "UI", "1.2.840.10008.5.1.4.1.1.2"),
                Element::scalar(Tag::new(0x0008, 0x1155), "ReferencedSOPInstanceUID", "UI", uid),
            ]
        };
        vec![
            Element::scalar(Tag::new(0x0010, 0x0010), "PatientName", "PN", "DOE^JOHN"),
            Element::sequence(
                Tag::new(0x0008, 0x1140),
                "ReferencedImageSequence",
                vec![item("1.2.3.4"), item("1.2.3.5")],
            ),
        ]
    }

    #[test]
    fn scenario_a_shape() {
        let tree = build("FILE: a.json", &scenario_a(), Limits::default());

        assert_eq!(tree.root.children.len(), 2);
        assert!(tree.root.expanded);
        let seq = &tree.root.children[1];
        assert_eq!(seq.kind, NodeKind::Branch);
        assert_eq!(seq.children.len(), 2);
        assert_eq!(seq.children[0].label, "Item 1");
        assert_eq!(seq.children[1].label, "Item 2");
        assert_eq!(seq.children[1].children.len(), 2);
        assert_eq!(tree.root.children[0].kind, NodeKind::Leaf);
    }

    #[test]
    fn siblings_keep_source_order() {
        let elements: Vec<Element> = (0..20u16)
            .map(|e| Element::scalar(Tag::new(0x0009, e), format!("N{e}"), "LO", format!("v{e}")))
            .collect();
        let tree = build("root", &elements, Limits::default());

        let labels: Vec<_> = tree.root.children.iter().map(|n| n.label.clone()).collect();
        let expected: Vec<_> = elements.iter().map(|e| element_label(e).0).collect();
        assert_eq!(labels, expected);
    }

    #[test]
    fn every_node_is_indexed() {
        let tree = build("root", &scenario_a(), Limits::default());

        let walked = tree.root.walk();
        assert_eq!(walked.len(), tree.index.len());
        for (_, node) in walked {
            assert!(tree.index.contains(node.id));
        }
        let item_id = tree.root.children[1].children[0].id;
        let entry = tree.index.get(item_id).unwrap();
        assert_eq!(entry.tag, Some(Tag::new(0x0008, 0x1140)));
        assert!(entry.name.is_empty() && entry.value.is_empty());
    }

    #[test]
    fn label_columns_align() {
        let e = Element::scalar(Tag::new(0x0008, 0x0060), "Modality", "CS", "CT");
        let (label, layout) = element_label(&e);

        assert_eq!(&label[..TAG_WIDTH], "(0008,0060)  ");
        assert_eq!(&label[layout.name_at..layout.name_at + 8], "Modality");
        assert_eq!(&label[layout.vr_at..layout.vr_at + 2], "CS");
        assert_eq!(&label[layout.value_at..], "CT");
        assert_eq!(layout.value_at, TAG_WIDTH + 1 + NAME_WIDTH + 1 + VR_WIDTH + 1);
    }

    #[test]
    fn sequence_without_items_is_an_empty_branch() {
        let mut broken = Element::sequence(Tag::new(0x0040, 0x0275), "RequestAttributesSequence", vec![]);
        broken.items = None;
        let tree = build("root", &[broken], Limits::default());

        let node = &tree.root.children[0];
        assert_eq!(node.kind, NodeKind::Branch);
        assert!(node.children.is_empty());
        assert!(tree.truncation.is_none());
    }

    fn nested(depth: usize) -> Vec<Element> {
        let mut elements = vec![Element::scalar(Tag::new(0x0010, 0x0020), "PatientID", "LO", "deep")];
        for _ in 0..depth {
            elements = vec![Element::sequence(Tag::new(0x0040, 0xA730), "ContentSequence", vec![elements])];
        }
        elements
    }

    #[test]
    fn depth_ceiling_is_reported() {
        let limits = Limits { max_depth: 6, max_nodes: 1000 };
        let tree = build("root", &nested(10), limits);

        assert_eq!(tree.truncation, Some(Truncation::TooDeep { limit: 6 }));
        assert!(tree.root.walk().iter().all(|(d, _)| *d <= 6));
    }

    #[test]
    fn node_ceiling_is_reported() {
        let elements: Vec<Element> = (0..50u16)
            .map(|e| Element::scalar(Tag::new(0x0009, e), "N", "LO", "v"))
            .collect();
        let tree = build("root", &elements, Limits { max_depth: 8, max_nodes: 10 });

        assert_eq!(tree.root.children.len(), 10);
        assert_eq!(tree.truncation, Some(Truncation::TooLarge { limit: 10 }));
    }
}

use std::ops::Range;

use tracing::debug;

use crate::tree::{build, element_label, item_label, Limits, Materializer};
use crate::types::{DisplayNode, Element, Field, Highlight, IndexEntry, SearchOutcome};

/// Trimmed, lowercased form of a raw query.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Locates the first case-insensitive occurrence of an already-normalized `needle`
/// in `haystack`, as a byte range of the original-case text.
pub fn find_folded(haystack: &str, needle: &str) -> Option<Range<usize>> {
    if needle.is_empty() {
        return None;
    }
    // Lowercasing can change byte lengths, so remember which source char produced each folded byte.
    let mut folded = String::with_capacity(haystack.len());
    let mut origin = Vec::with_capacity(haystack.len());
    for (at, ch) in haystack.char_indices() {
        for lower in ch.to_lowercase() {
            let before = folded.len();
            folded.push(lower);
            origin.extend(std::iter::repeat(at).take(folded.len() - before));
        }
    }

    let hit = folded.find(needle)?;
    let start = origin[hit];
    let last = origin[hit + needle.len() - 1];
    let end = last + haystack[last..].chars().next().map_or(0, char::len_utf8);
    Some(start..end)
}

pub fn text_matches(text: &str, needle: &str) -> bool {
    find_folded(text, needle).is_some()
}

/// Direct-match highlights for one element, empty when it does not match.
fn element_highlights(element: &Element, needle: &str) -> Vec<Highlight> {
    let mut highlights = Vec::new();
    if let Some(range) = find_folded(&element.name, needle) {
        highlights.push(Highlight { field: Field::Name, range });
    }
    if let Some(range) = find_folded(&element.value, needle) {
        highlights.push(Highlight { field: Field::Value, range });
    }
    highlights
}

struct Pruner<'q> {
    needle: &'q str,
    m: Materializer,
    match_count: usize,
}

impl Pruner<'_> {
    fn elements(&mut self, elements: &[Element], depth: usize) -> Vec<DisplayNode> {
        if elements.is_empty() || !self.m.enter(depth) {
            return Vec::new();
        }
        elements
            .iter()
            .filter_map(|element| self.element(element, depth))
            .collect()
    }

    fn element(&mut self, element: &Element, depth: usize) -> Option<DisplayNode> {
        // Descendants are decided first; a composite survives through them even without a direct match.
        let children = if element.is_composite() {
            self.items(element, depth)
        } else {
            Vec::new()
        };

        let highlights = element_highlights(element, self.needle);
        let direct = !highlights.is_empty();
        if !direct && children.is_empty() {
            return None;
        }
        if !self.m.reserve() {
            self.discard(&children);
            return None;
        }

        let (label, layout) = element_label(element);
        let mut node = if element.is_composite() {
            DisplayNode::branch(label, children)
        } else {
            DisplayNode::leaf(label)
        };
        node.layout = Some(layout);
        node.highlights = highlights;
        if direct {
            self.match_count += 1;
        }
        self.m.register(
            &node,
            IndexEntry {
                tag: Some(element.tag),
                name: element.name.clone(),
                value: element.value.clone(),
            },
        );
        Some(node)
    }

    fn items(&mut self, element: &Element, depth: usize) -> Vec<DisplayNode> {
        let Some(items) = element.items.as_deref() else {
            return Vec::new();
        };
        if items.is_empty() || !self.m.enter(depth + 1) {
            return Vec::new();
        }
        let mut kept = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let item_children = self.elements(item, depth + 2);
            if item_children.is_empty() {
                continue;
            }
            if !self.m.reserve() {
                self.discard(&item_children);
                continue;
            }
            let node = DisplayNode::branch(item_label(i + 1), item_children);
            self.m.register(&node, IndexEntry::neutral(Some(element.tag)));
            kept.push(node);
        }
        kept
    }

    /// Rolls back subtrees whose parent did not fit, so the index and count only cover attached nodes.
    fn discard(&mut self, nodes: &[DisplayNode]) {
        for node in nodes {
            for (_, n) in node.walk() {
                self.m.unregister(n);
                if !n.highlights.is_empty() {
                    self.match_count -= 1;
                }
            }
        }
    }
}

/// Re-derives the display tree for `query` from the original elements.
///
/// An empty (after trimming) query yields the full tree with no match count.
/// Otherwise only directly matching nodes and their ancestors are kept, each
/// match carrying the first occurrence of the query in its name and value.
pub fn search(root_label: &str, elements: &[Element], query: &str, limits: Limits) -> SearchOutcome {
    let needle = normalize_query(query);
    if needle.is_empty() {
        return SearchOutcome {
            tree: build(root_label, elements, limits),
            match_count: None,
        };
    }

    let mut pruner = Pruner {
        needle: &needle,
        m: Materializer::new(limits),
        match_count: 0,
    };
    let children = pruner.elements(elements, 1);
    let match_count = pruner.match_count;
    debug!(query = %needle, match_count, "search evaluated");

    SearchOutcome {
        tree: pruner.m.finish(root_label, children),
        match_count: Some(match_count),
    }
}

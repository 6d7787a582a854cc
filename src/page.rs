use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Stable identifier the crawler assigns to an interactive element.
pub type NodeId = u32;

/// One interactive element as the crawler rendered it.
///
/// `text` is opaque to the core: it is shown to the operator and copied into
/// the prompt verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub text: String,
}

impl Node {
    pub fn new(id: NodeId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }

    /// Render the node with every line shifted right by `indent` spaces.
    pub fn render(&self, indent: usize) -> String {
        let pad = " ".repeat(indent);
        self.text
            .lines()
            .map(|line| format!("{pad}{line}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Snapshot of the interactive elements on the current page.
///
/// The two maps overlap: an element that accepts both clicks and text shows up
/// in each under the same id. Produced fresh by every crawl and never mutated
/// by the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageIndex {
    clickable: BTreeMap<NodeId, Node>,
    inputable: BTreeMap<NodeId, Node>,
}

impl PageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_clickable(&mut self, node: Node) {
        self.clickable.insert(node.id, node);
    }

    pub fn insert_inputable(&mut self, node: Node) {
        self.inputable.insert(node.id, node);
    }

    pub fn is_clickable(&self, id: NodeId) -> bool {
        self.clickable.contains_key(&id)
    }

    pub fn is_inputable(&self, id: NodeId) -> bool {
        self.inputable.contains_key(&id)
    }

    pub fn clickable(&self, id: NodeId) -> Option<&Node> {
        self.clickable.get(&id)
    }

    pub fn inputable(&self, id: NodeId) -> Option<&Node> {
        self.inputable.get(&id)
    }

    /// Look a node up in either set. The clickable entry wins when both exist.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.clickable.get(&id).or_else(|| self.inputable.get(&id))
    }

    /// Every id in the union of both sets, ascending.
    pub fn ids(&self) -> BTreeSet<NodeId> {
        self.clickable
            .keys()
            .chain(self.inputable.keys())
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clickable.is_empty() && self.inputable.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_counts_shared_ids_once() {
        let mut index = PageIndex::new();
        index.insert_clickable(Node::new(1, "<a>Home</a>"));
        index.insert_clickable(Node::new(2, "<input type=\"search\">"));
        index.insert_inputable(Node::new(2, "<input type=\"search\">"));
        index.insert_inputable(Node::new(5, "<textarea></textarea>"));

        assert_eq!(index.ids().into_iter().collect::<Vec<_>>(), vec![1, 2, 5]);
        assert_eq!(index.len(), 3);
        assert!(index.is_clickable(2) && index.is_inputable(2));
        assert!(!index.is_inputable(1));
        assert!(!index.is_clickable(5));
    }

    #[test]
    fn test_render_indents_every_line() {
        let node = Node::new(3, "<button>\nGo\n</button>");
        assert_eq!(node.render(2), "  <button>\n  Go\n  </button>");
    }

    #[test]
    fn test_node_lookup_prefers_clickable() {
        let mut index = PageIndex::new();
        index.insert_inputable(Node::new(4, "input view"));
        index.insert_clickable(Node::new(4, "click view"));
        assert_eq!(index.node(4).map(|n| n.text.as_str()), Some("click view"));
        assert!(index.node(9).is_none());
        assert!(!index.is_empty());
    }
}

//! Arena tree over the project's address hierarchy
//!
//! Nodes live in a flat `Vec` and refer to each other by index: every node
//! knows its parent and its children, nobody holds a reference to anybody.
//! Children are always pushed after their parent, so walking the arena
//! backwards visits every child before its parent; bottom-up passes
//! (descendant sets, selection state for the whole tree) rely on that.

use super::AddressBook;
use std::collections::{BTreeMap, BTreeSet};

/// Index of a node in its tree
pub type NodeId = usize;

/// What a node stands for, carrying only the fields it needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Structural grouping: building part, topology line, group range
    Group { label: String },
    /// A bus device
    Device { address: String, name: String },
    /// A channel of a device
    Channel { name: String },
    /// A communication object, linked to one or more group addresses
    CommObject {
        number: Option<u32>,
        name: String,
        group_addresses: BTreeSet<String>,
    },
    /// A single group address
    Leaf { address: String, name: String },
}

impl NodeKind {
    /// Text shown for the node (and matched by tree search)
    pub fn label(&self) -> String {
        match self {
            Self::Group { label } => label.clone(),
            Self::Device { address, name } | Self::Leaf { address, name } => {
                format!("({}) {}", address, name)
            }
            Self::Channel { name } => name.clone(),
            Self::CommObject {
                number,
                name,
                group_addresses,
            } => {
                let number = number.map_or_else(|| "?".to_string(), |n| n.to_string());
                if group_addresses.is_empty() {
                    format!("{}: {}", number, name)
                } else {
                    let gas: Vec<&str> = group_addresses.iter().map(String::as_str).collect();
                    format!("{}: {} -> [{}]", number, name, gas.join(", "))
                }
            }
        }
    }

    /// Leaf addresses this node contributes by itself
    fn own_leaf_ids(&self) -> impl Iterator<Item = &String> {
        let (single, many) = match self {
            Self::Leaf { address, .. } => (Some(address), None),
            Self::CommObject {
                group_addresses, ..
            } => (None, Some(group_addresses.iter())),
            _ => (None, None),
        };
        single.into_iter().chain(many.into_iter().flatten())
    }
}

/// Derived per-node selection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    None,
    Partial,
    All,
}

impl SelectionState {
    /// State of a node with the given descendant leaves
    pub fn of<F>(leaves: &BTreeSet<String>, is_selected: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        let selected = leaves.iter().filter(|id| is_selected(id)).count();
        if selected == 0 {
            Self::None
        } else if selected == leaves.len() {
            Self::All
        } else {
            Self::Partial
        }
    }

    /// Checkbox prefix used when rendering tree labels
    pub fn marker(&self) -> &'static str {
        match self {
            Self::None => "[ ]",
            Self::Partial => "[-]",
            Self::All => "[*]",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct AddressTree {
    nodes: Vec<TreeNode>,
}

impl AddressTree {
    /// New tree holding only a root group
    pub fn new(root_label: impl Into<String>) -> Self {
        Self {
            nodes: vec![TreeNode {
                kind: NodeKind::Group {
                    label: root_label.into(),
                },
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    /// Append a child. Panics if `parent` is not a node of this tree.
    pub fn add(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes[parent].children.push(id);
        self.nodes.push(TreeNode {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        id
    }

    /// Parent chain from the node's parent up to the root
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(id).and_then(|n| n.parent);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.nodes[parent].parent;
        }
        chain
    }

    /// All nodes below `id`, pre-order, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let Some(node) = self.nodes.get(id) else {
            return out;
        };
        let mut stack: Vec<NodeId> = node.children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next].children.iter().rev());
        }
        out
    }

    /// Every leaf address at or below `id`
    pub fn descendant_leaf_ids(&self, id: NodeId) -> BTreeSet<String> {
        let mut leaves = BTreeSet::new();
        let Some(node) = self.nodes.get(id) else {
            return leaves;
        };
        leaves.extend(node.kind.own_leaf_ids().cloned());
        for child in self.descendants(id) {
            leaves.extend(self.nodes[child].kind.own_leaf_ids().cloned());
        }
        leaves
    }

    /// Descendant leaf sets for every node in one bottom-up pass
    pub fn leaf_sets(&self) -> Vec<BTreeSet<String>> {
        let mut sets: Vec<BTreeSet<String>> = self
            .nodes
            .iter()
            .map(|n| n.kind.own_leaf_ids().cloned().collect())
            .collect();
        for id in (1..self.nodes.len()).rev() {
            if let Some(parent) = self.nodes[id].parent {
                let child = std::mem::take(&mut sets[id]);
                sets[parent].extend(child.iter().cloned());
                sets[id] = child;
            }
        }
        sets
    }

    /// Selection state of one node
    pub fn state_of<F>(&self, id: NodeId, is_selected: F) -> SelectionState
    where
        F: Fn(&str) -> bool,
    {
        SelectionState::of(&self.descendant_leaf_ids(id), is_selected)
    }

    /// Selection state of every node
    pub fn states<F>(&self, is_selected: F) -> Vec<SelectionState>
    where
        F: Fn(&str) -> bool,
    {
        self.leaf_sets()
            .iter()
            .map(|leaves| SelectionState::of(leaves, &is_selected))
            .collect()
    }

    /// Nodes to show for a case-insensitive label search
    ///
    /// A matching node is kept with its whole subtree; non-matching nodes are
    /// kept only as ancestors of a match. The root is always kept.
    pub fn search(&self, text: &str) -> BTreeSet<NodeId> {
        let needle = text.to_lowercase();
        let mut keep = BTreeSet::from([self.root()]);
        if needle.is_empty() {
            keep.extend(0..self.nodes.len());
            return keep;
        }

        for (id, node) in self.nodes.iter().enumerate().skip(1) {
            if keep.contains(&id) {
                continue;
            }
            if node.kind.label().to_lowercase().contains(&needle) {
                keep.insert(id);
                keep.extend(self.ancestors(id));
                keep.extend(self.descendants(id));
            }
        }
        keep
    }

    /// Group address hierarchy: main group / middle group / address
    ///
    /// Addresses that don't have three parts hang directly below the root.
    pub fn group_address_tree(book: &AddressBook) -> Self {
        let mut tree = Self::new("Group addresses");
        let root = tree.root();

        let mut addresses: Vec<(&str, &str)> = book
            .group_addresses()
            .map(|(address, info)| (address, info.name.as_str()))
            .collect();
        addresses.sort_by(|a, b| natural_cmp(a.0, b.0));

        let mut mains: BTreeMap<String, NodeId> = BTreeMap::new();
        let mut middles: BTreeMap<String, NodeId> = BTreeMap::new();

        for (address, name) in addresses {
            let parts: Vec<&str> = address.split('/').collect();
            let leaf = NodeKind::Leaf {
                address: address.to_string(),
                name: name.to_string(),
            };
            if parts.len() != 3 {
                tree.add(root, leaf);
                continue;
            }

            let main = *mains.entry(parts[0].to_string()).or_insert_with(|| {
                tree.add(
                    root,
                    NodeKind::Group {
                        label: format!("Main group {}", parts[0]),
                    },
                )
            });
            let middle_key = format!("{}/{}", parts[0], parts[1]);
            let middle = *middles.entry(middle_key.clone()).or_insert_with(|| {
                tree.add(
                    main,
                    NodeKind::Group {
                        label: format!("Middle group {}", middle_key),
                    },
                )
            });
            tree.add(middle, leaf);
        }

        tree
    }
}

/// Compare addresses part by part, numerically where both parts are numbers
pub fn natural_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    let mut left = a.split(['/', '.']);
    let mut right = b.split(['/', '.']);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return std::cmp::Ordering::Equal,
            (None, Some(_)) => return std::cmp::Ordering::Less,
            (Some(_), None) => return std::cmp::Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root
    /// ├── Kitchen (group)
    /// │   ├── 1/1/1 (leaf)
    /// │   └── Dimmer (device)
    /// │       └── Channel A
    /// │           └── CO 1 -> [1/1/2, 1/1/3]
    /// └── Empty (group)
    fn sample() -> (AddressTree, NodeId, NodeId, NodeId, NodeId) {
        let mut tree = AddressTree::new("Building");
        let root = tree.root();
        let kitchen = tree.add(
            root,
            NodeKind::Group {
                label: "Kitchen".into(),
            },
        );
        tree.add(
            kitchen,
            NodeKind::Leaf {
                address: "1/1/1".into(),
                name: "Light".into(),
            },
        );
        let device = tree.add(
            kitchen,
            NodeKind::Device {
                address: "1.1.7".into(),
                name: "Dimmer".into(),
            },
        );
        let channel = tree.add(device, NodeKind::Channel { name: "Channel A".into() });
        let co = tree.add(
            channel,
            NodeKind::CommObject {
                number: Some(1),
                name: "Switch".into(),
                group_addresses: BTreeSet::from(["1/1/2".to_string(), "1/1/3".to_string()]),
            },
        );
        let empty = tree.add(root, NodeKind::Group { label: "Empty".into() });
        (tree, kitchen, device, co, empty)
    }

    #[test]
    fn test_descendant_leaf_ids_union() {
        let (tree, kitchen, device, co, empty) = sample();
        assert_eq!(tree.descendant_leaf_ids(kitchen).len(), 3);
        assert_eq!(tree.descendant_leaf_ids(device).len(), 2);
        assert_eq!(tree.descendant_leaf_ids(co).len(), 2);
        assert!(tree.descendant_leaf_ids(empty).is_empty());
        assert_eq!(tree.descendant_leaf_ids(tree.root()).len(), 3);
    }

    #[test]
    fn test_leaf_sets_match_per_node_computation() {
        let (tree, ..) = sample();
        let sets = tree.leaf_sets();
        for id in 0..tree.len() {
            assert_eq!(sets[id], tree.descendant_leaf_ids(id), "node {}", id);
        }
    }

    #[test]
    fn test_ancestors_and_descendants() {
        let (tree, kitchen, device, co, _) = sample();
        assert_eq!(tree.ancestors(co), vec![co - 1, device, kitchen, 0]);
        assert_eq!(tree.descendants(device), vec![co - 1, co]);
    }

    #[test]
    fn test_states() {
        let (tree, kitchen, device, _, empty) = sample();
        let selected: BTreeSet<&str> = BTreeSet::from(["1/1/2", "1/1/3"]);
        let states = tree.states(|id| selected.contains(id));
        assert_eq!(states[device], SelectionState::All);
        assert_eq!(states[kitchen], SelectionState::Partial);
        assert_eq!(states[empty], SelectionState::None);
        assert_eq!(tree.state_of(kitchen, |id| selected.contains(id)), SelectionState::Partial);
    }

    #[test]
    fn test_search_keeps_ancestors_and_subtree() {
        let (tree, kitchen, device, co, empty) = sample();
        let hits = tree.search("DIMMER");
        assert!(hits.contains(&0));
        assert!(hits.contains(&kitchen));
        assert!(hits.contains(&device));
        assert!(hits.contains(&co));
        assert!(!hits.contains(&empty));
        assert!(!hits.contains(&2)); // the 1/1/1 leaf
    }

    #[test]
    fn test_comm_object_label() {
        let (tree, _, _, co, _) = sample();
        assert_eq!(
            tree.node(co).unwrap().kind.label(),
            "1: Switch -> [1/1/2, 1/1/3]"
        );
    }

    #[test]
    fn test_group_address_tree_shape() {
        let book = AddressBook::new()
            .with_group_address("1/2/10", "b", None)
            .with_group_address("1/2/9", "a", None)
            .with_group_address("2/0/1", "c", None)
            .with_group_address("7", "odd", None);
        let tree = AddressTree::group_address_tree(&book);

        let root = tree.node(tree.root()).unwrap();
        let labels: Vec<String> = root
            .children
            .iter()
            .map(|&id| tree.node(id).unwrap().kind.label())
            .collect();
        assert_eq!(labels, vec!["Main group 1", "Main group 2", "(7) odd"]);

        let main1 = root.children[0];
        let middle = tree.node(main1).unwrap().children[0];
        let leaves: Vec<String> = tree
            .node(middle)
            .unwrap()
            .children
            .iter()
            .map(|&id| tree.node(id).unwrap().kind.label())
            .collect();
        assert_eq!(leaves, vec!["(1/2/9) a", "(1/2/10) b"]);
    }

    #[test]
    fn test_natural_cmp() {
        use std::cmp::Ordering;
        assert_eq!(natural_cmp("1/2/9", "1/2/10"), Ordering::Less);
        assert_eq!(natural_cmp("10/0/0", "2/0/0"), Ordering::Greater);
        assert_eq!(natural_cmp("1.1.1", "1.1.1"), Ordering::Equal);
    }
}

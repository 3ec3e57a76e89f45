//! Directory tree cache (C5).
//!
//! spec.md §9 calls for parent back-references modeled as "an index into an
//! arena of nodes... the volume's arena owns all nodes". This uses a
//! `Vec<Option<Node>>` arena with `Option<usize>` parent/child indices
//! instead of the teacher's `Arc<RwLock<BTreeMap<usize, Arc<Inode>>>>`
//! (`crates/fat32/src/lib.rs` `INODE_CACHE`), since this driver is
//! single-threaded and single-owner: no `Arc`/`Weak` cycle to break, just a
//! plain index.

use crate::error::{Error, Result};
use crate::file::File;
use std::collections::HashMap;

pub type NodeId = usize;

struct Node {
    file: File,
    parent: Option<NodeId>,
    /// Keyed by the ASCII-uppercased child name, matching the codec's
    /// case-insensitive lookup rule (spec.md §4.3).
    children: HashMap<String, NodeId>,
    open_count: u32,
    tombstoned: bool,
}

pub struct Tree {
    nodes: Vec<Option<Node>>,
    by_path: HashMap<String, NodeId>,
    root: NodeId,
}

fn key(name: &str) -> String {
    name.to_ascii_uppercase()
}

impl Tree {
    pub fn new(root_file: File) -> Self {
        let path = root_file.path.clone();
        let node = Node {
            file: root_file,
            parent: None,
            children: HashMap::new(),
            open_count: 0,
            tombstoned: false,
        };
        let mut by_path = HashMap::new();
        by_path.insert(path, 0);
        Self {
            nodes: vec![Some(node)],
            by_path,
            root: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes[id].as_ref().expect("dangling node id")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id].as_mut().expect("dangling node id")
    }

    /// Strict equality lookup; does not populate children.
    pub fn search(&self, path: &str) -> Option<NodeId> {
        self.by_path
            .get(path)
            .copied()
            .filter(|&id| !self.node(id).tombstoned)
    }

    pub fn get_file(&self, id: NodeId) -> &File {
        &self.node(id).file
    }

    pub fn get_file_mut(&mut self, id: NodeId) -> &mut File {
        &mut self.node_mut(id).file
    }

    pub fn get_parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.node(parent)
            .children
            .get(&key(name))
            .copied()
            .filter(|&id| !self.node(id).tombstoned)
    }

    /// Create a child node under `parent` holding `file`. If a node for
    /// `file.path` already exists, return it unchanged (no duplicate insert).
    pub fn insert(&mut self, parent: NodeId, file: File) -> NodeId {
        if let Some(&existing) = self.by_path.get(&file.path) {
            return existing;
        }
        let name_key = key(&file.name);
        let path = file.path.clone();
        let id = self.nodes.len();
        self.nodes.push(Some(Node {
            file,
            parent: Some(parent),
            children: HashMap::new(),
            open_count: 0,
            tombstoned: false,
        }));
        self.node_mut(parent).children.insert(name_key, id);
        self.by_path.insert(path, id);
        id
    }

    /// Remove the node for `path`. Permitted only when `open_count == 0`;
    /// otherwise the node is tombstoned and reaped on last `dec_open`.
    pub fn delete(&mut self, path: &str) -> Result<()> {
        let id = *self.by_path.get(path).ok_or(Error::NotFound)?;
        if self.node(id).open_count > 0 {
            self.node_mut(id).tombstoned = true;
            return Ok(());
        }
        self.reap(id);
        Ok(())
    }

    fn reap(&mut self, id: NodeId) {
        let parent = self.node(id).parent;
        let path = self.node(id).file.path.clone();
        let name_key = key(&self.node(id).file.name);
        if let Some(parent) = parent {
            self.node_mut(parent).children.remove(&name_key);
        }
        self.by_path.remove(&path);
        self.nodes[id] = None;
    }

    pub fn inc_open(&mut self, id: NodeId) {
        self.node_mut(id).open_count += 1;
    }

    /// Decrement the open count; reaps the node if it was tombstoned and
    /// this was the last outstanding handle.
    pub fn dec_open(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        node.open_count = node.open_count.saturating_sub(1);
        if node.open_count == 0 && node.tombstoned {
            self.reap(id);
        }
    }

    pub fn is_populated(&self, id: NodeId) -> bool {
        self.node(id).file.children_read
    }

    pub fn mark_populated(&mut self, id: NodeId) {
        self.node_mut(id).file.children_read = true;
    }

    pub fn clear_populated(&mut self, id: NodeId) {
        self.node_mut(id).file.children_read = false;
        let children: Vec<NodeId> = self.node(id).children.values().copied().collect();
        for child in children {
            self.reap(child);
        }
    }

    /// Snapshot of the current children's files, stable against later
    /// inserts since it clones rather than borrows.
    pub fn flatten_children(&self, id: NodeId) -> Vec<File> {
        self.node(id)
            .children
            .values()
            .filter(|&&c| !self.node(c).tombstoned)
            .map(|&c| self.node(c).file.clone())
            .collect()
    }

    pub fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .children
            .values()
            .copied()
            .filter(|&c| !self.node(c).tombstoned)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dentry::ShortDirEntry;

    fn mk_file(path: &str, name: &str) -> File {
        File {
            path: path.to_string(),
            name: name.to_string(),
            dentry: ShortDirEntry::new([0x20; 8], [0x20; 3], 0, 0),
            parent_pos: None,
            lfn_count: 0,
            start_cluster: 0,
            children_read: false,
        }
    }

    #[test]
    fn insert_and_search_round_trip() {
        let mut tree = Tree::new(mk_file("/", ""));
        let root = tree.root();
        let child = tree.insert(root, mk_file("/a.txt", "a.txt"));
        assert_eq!(tree.search("/a.txt"), Some(child));
        assert_eq!(tree.find_child(root, "a.txt"), Some(child));
        assert_eq!(tree.find_child(root, "A.TXT"), Some(child));
    }

    #[test]
    fn insert_is_idempotent_by_path() {
        let mut tree = Tree::new(mk_file("/", ""));
        let root = tree.root();
        let first = tree.insert(root, mk_file("/a.txt", "a.txt"));
        let second = tree.insert(root, mk_file("/a.txt", "a.txt"));
        assert_eq!(first, second);
    }

    #[test]
    fn delete_tombstones_open_node_until_release() {
        let mut tree = Tree::new(mk_file("/", ""));
        let root = tree.root();
        let child = tree.insert(root, mk_file("/a.txt", "a.txt"));
        tree.inc_open(child);
        tree.delete("/a.txt").unwrap();
        assert_eq!(tree.search("/a.txt"), None, "tombstoned node must look absent");
        tree.dec_open(child);
        assert!(tree.find_child(root, "a.txt").is_none());
    }

    #[test]
    fn delete_reaps_immediately_when_not_open() {
        let mut tree = Tree::new(mk_file("/", ""));
        let root = tree.root();
        tree.insert(root, mk_file("/a.txt", "a.txt"));
        tree.delete("/a.txt").unwrap();
        assert!(tree.find_child(root, "a.txt").is_none());
    }

    #[test]
    fn flatten_children_snapshots_current_set() {
        let mut tree = Tree::new(mk_file("/", ""));
        let root = tree.root();
        tree.insert(root, mk_file("/a.txt", "a.txt"));
        tree.insert(root, mk_file("/b.txt", "b.txt"));
        let snapshot = tree.flatten_children(root);
        assert_eq!(snapshot.len(), 2);
    }
}

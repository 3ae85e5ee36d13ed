//! Namespace tree: the directory hierarchy.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. A node owns its
//! children (by id) and points back at its parent without owning it. Each
//! node also carries an ordered entry list holding its files *and* one
//! `Directory` placeholder per child node, which is what listings show.
//!
//! ## Invariant
//!
//! For every node, the names of its `Directory` entries are exactly the
//! names of its child nodes. Only [`NamespaceTree::add_subdirectory`] and
//! [`NamespaceTree::remove_subdirectory`] touch either collection, and they
//! always touch both.
//!
//! The tree knows nothing about blocks or disk bytes; extents are opaque
//! payload on file entries.

use serde::{Deserialize, Serialize};

use omnifs_types::Inode;

use super::error::{FsError, FsResult};
use super::types::{DirectoryEntry, EntryKind};

/// Longest entry name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Handle to a node in the tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One directory.
#[derive(Debug, Clone)]
pub struct DirectoryNode {
    name: String,
    entries: Vec<DirectoryEntry>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl DirectoryNode {
    fn new(name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            children: Vec::new(),
            parent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Files and subdirectory placeholders, in insertion order.
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// No entries and no child nodes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.children.is_empty()
    }
}

/// Serialized form of a subtree.
///
/// `children[i]` is the subtree of the i-th `Directory` entry in `entries`,
/// so the pairing is positional and names are stored once.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub entries: Vec<DirectoryEntry>,
    pub children: Vec<NodeSnapshot>,
}

/// Split an absolute path into its segments.
///
/// Empty segments are skipped, so `//a/b/` is `["a", "b"]` and `/` is `[]`.
pub fn split_path(path: &str) -> FsResult<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(FsError::invalid_path(format!("not absolute: {path}")));
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for segment in &segments {
        validate_name(segment)?;
    }
    Ok(segments)
}

/// Check a single entry name.
pub fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name.contains('/') {
        return Err(FsError::invalid_path(format!("bad name: {name:?}")));
    }
    if name == "." || name == ".." {
        return Err(FsError::invalid_path(format!("relative segment: {name}")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::invalid_path(format!("name longer than {MAX_NAME_LEN} bytes")));
    }
    Ok(())
}

/// The directory hierarchy of one volume.
#[derive(Debug, Clone)]
pub struct NamespaceTree {
    nodes: Vec<Option<DirectoryNode>>,
    free: Vec<usize>,
    root: NodeId,
}

impl Default for NamespaceTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceTree {
    /// A tree holding only an empty root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(DirectoryNode::new("/", None))],
            free: Vec::new(),
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&DirectoryNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> FsResult<&mut DirectoryNode> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| FsError::not_found("stale directory handle"))
    }

    fn alloc(&mut self, node: DirectoryNode) -> NodeId {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    /// Follow child nodes by exact name from the root.
    fn walk(&self, segments: &[&str]) -> Option<NodeId> {
        segments
            .iter()
            .try_fold(self.root, |current, segment| self.find_child_dir(current, segment))
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// The directory that would hold `path`'s final segment, and that
    /// segment.
    ///
    /// Fails NotFound if an intermediate segment is missing or is not a
    /// directory, InvalidPath for `/` (the root has no parent).
    pub fn resolve_parent<'p>(&self, path: &'p str) -> FsResult<(NodeId, &'p str)> {
        let segments = split_path(path)?;
        let Some((name, intermediate)) = segments.split_last() else {
            return Err(FsError::invalid_path("the root has no parent"));
        };
        let parent = self
            .walk(intermediate)
            .ok_or_else(|| FsError::not_found(format!("parent directory of {path}")))?;
        Ok((parent, *name))
    }

    /// The directory named by `path`; `/` is the root.
    pub fn resolve_directory(&self, path: &str) -> FsResult<NodeId> {
        let segments = split_path(path)?;
        self.walk(&segments)
            .ok_or_else(|| FsError::not_found(format!("directory {path}")))
    }

    /// Whether `path` names the root, a directory, or a file.
    pub fn path_exists(&self, path: &str) -> bool {
        let Ok(segments) = split_path(path) else {
            return false;
        };
        let Some((name, intermediate)) = segments.split_last() else {
            return true;
        };
        self.walk(intermediate)
            .is_some_and(|parent| self.find_entry(parent, name).is_some())
    }

    // ========================================================================
    // Lookup within one node
    // ========================================================================

    /// Any entry (file or directory placeholder) named `name`.
    pub fn find_entry(&self, dir: NodeId, name: &str) -> Option<&DirectoryEntry> {
        self.node(dir)?.entries.iter().find(|e| e.name == name)
    }

    /// The `File` entry named `name`.
    pub fn find_file_entry(&self, dir: NodeId, name: &str) -> Option<&DirectoryEntry> {
        self.node(dir)?
            .entries
            .iter()
            .find(|e| e.is_file() && e.name == name)
    }

    pub fn find_file_entry_mut(&mut self, dir: NodeId, name: &str) -> Option<&mut DirectoryEntry> {
        self.nodes
            .get_mut(dir.0)?
            .as_mut()?
            .entries
            .iter_mut()
            .find(|e| e.is_file() && e.name == name)
    }

    /// The child node named `name`.
    pub fn find_child_dir(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        self.node(dir)?
            .children
            .iter()
            .copied()
            .find(|child| self.node(*child).is_some_and(|n| n.name == name))
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Append a file entry. The caller has checked the name is free.
    pub fn add_file(&mut self, dir: NodeId, entry: DirectoryEntry) -> FsResult<()> {
        if entry.kind != EntryKind::File {
            return Err(FsError::invalid_path(format!(
                "{} is not a file entry",
                entry.name
            )));
        }
        self.node_mut(dir)?.entries.push(entry);
        Ok(())
    }

    /// Create an empty child node and its placeholder entry together.
    pub fn add_subdirectory(
        &mut self,
        parent: NodeId,
        name: &str,
        inode: Inode,
        owner: &str,
    ) -> FsResult<NodeId> {
        validate_name(name)?;
        if self.find_entry(parent, name).is_some() {
            return Err(FsError::already_exists(name.to_string()));
        }
        self.node_mut(parent)?;
        let child = self.alloc(DirectoryNode::new(name, Some(parent)));
        let node = self.node_mut(parent)?;
        node.children.push(child);
        node.entries.push(DirectoryEntry::directory(name, owner, inode));
        Ok(child)
    }

    /// Remove the file entry named `name`, returning it.
    pub fn remove_file(&mut self, dir: NodeId, name: &str) -> FsResult<DirectoryEntry> {
        let node = self.node_mut(dir)?;
        let pos = node
            .entries
            .iter()
            .position(|e| e.is_file() && e.name == name)
            .ok_or_else(|| FsError::not_found(name.to_string()))?;
        Ok(node.entries.remove(pos))
    }

    /// Remove the empty child node named `name` and its placeholder entry.
    pub fn remove_subdirectory(&mut self, parent: NodeId, name: &str) -> FsResult<DirectoryEntry> {
        let child = self
            .find_child_dir(parent, name)
            .ok_or_else(|| FsError::not_found(name.to_string()))?;
        if !self.node(child).is_some_and(DirectoryNode::is_empty) {
            return Err(FsError::not_empty(name.to_string()));
        }

        let node = self.node_mut(parent)?;
        node.children.retain(|c| *c != child);
        let pos = node
            .entries
            .iter()
            .position(|e| e.is_dir() && e.name == name)
            .ok_or_else(|| FsError::invalid_format(format!("no entry for subdirectory {name}")))?;
        let entry = node.entries.remove(pos);

        self.nodes[child.0] = None;
        self.free.push(child.0);
        Ok(entry)
    }

    // ========================================================================
    // Whole-tree views
    // ========================================================================

    /// Every live entry in the tree, in no particular order.
    pub fn all_entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.nodes.iter().flatten().flat_map(|n| n.entries.iter())
    }

    /// Every live file entry.
    pub fn files(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.all_entries().filter(|e| e.is_file())
    }

    /// Number of directories, not counting the root.
    pub fn directory_count(&self) -> u64 {
        self.all_entries().filter(|e| e.is_dir()).count() as u64
    }

    /// Check the entry/child duality on every node.
    pub fn verify(&self) -> FsResult<()> {
        for node in self.nodes.iter().flatten() {
            let mut from_entries: Vec<&str> = node
                .entries
                .iter()
                .filter(|e| e.is_dir())
                .map(|e| e.name.as_str())
                .collect();
            let mut from_children: Vec<&str> = node
                .children
                .iter()
                .filter_map(|c| self.node(*c))
                .map(|n| n.name.as_str())
                .collect();
            from_entries.sort_unstable();
            from_children.sort_unstable();
            if from_entries != from_children || from_children.len() != node.children.len() {
                return Err(FsError::invalid_format(format!(
                    "directory {} entries and children disagree",
                    node.name
                )));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Serializable copy of the whole tree.
    pub fn snapshot(&self) -> NodeSnapshot {
        self.snapshot_node(self.root)
    }

    fn snapshot_node(&self, id: NodeId) -> NodeSnapshot {
        let Some(node) = self.node(id) else {
            return NodeSnapshot::default();
        };
        let children = node
            .entries
            .iter()
            .filter(|e| e.is_dir())
            .map(|e| {
                self.find_child_dir(id, &e.name)
                    .map(|child| self.snapshot_node(child))
                    .unwrap_or_default()
            })
            .collect();
        NodeSnapshot {
            entries: node.entries.clone(),
            children,
        }
    }

    /// Rebuild a tree from a snapshot, checking names and duality.
    pub fn from_snapshot(snapshot: NodeSnapshot) -> FsResult<Self> {
        let mut tree = Self::new();
        let root = tree.root;
        tree.restore_into(root, snapshot)?;
        tree.verify()?;
        Ok(tree)
    }

    fn restore_into(&mut self, id: NodeId, snapshot: NodeSnapshot) -> FsResult<()> {
        let dir_entries = snapshot.entries.iter().filter(|e| e.is_dir()).count();
        if dir_entries != snapshot.children.len() {
            return Err(FsError::invalid_format(format!(
                "snapshot has {dir_entries} directory entries but {} subtrees",
                snapshot.children.len()
            )));
        }

        let mut subtrees = snapshot.children.into_iter();
        for entry in snapshot.entries {
            validate_name(&entry.name)
                .map_err(|_| FsError::invalid_format(format!("bad stored name {:?}", entry.name)))?;
            if self.find_entry(id, &entry.name).is_some() {
                return Err(FsError::invalid_format(format!(
                    "duplicate stored name {}",
                    entry.name
                )));
            }
            match entry.kind {
                EntryKind::File => {
                    if entry.extent.is_none() {
                        return Err(FsError::invalid_format(format!(
                            "file {} has no extent",
                            entry.name
                        )));
                    }
                    self.node_mut(id)?.entries.push(entry);
                }
                EntryKind::Directory => {
                    let child = self.alloc(DirectoryNode::new(entry.name.clone(), Some(id)));
                    let node = self.node_mut(id)?;
                    node.children.push(child);
                    node.entries.push(entry);
                    let subtree = subtrees.next().unwrap_or_default();
                    self.restore_into(child, subtree)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::types::Extent;

    fn file(name: &str) -> DirectoryEntry {
        DirectoryEntry::file(name, 3, "admin", Inode::new(1000), Extent::new(0, 1))
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/").unwrap(), Vec::<&str>::new());
        assert_eq!(split_path("//a//b/").unwrap(), vec!["a", "b"]);
        assert!(matches!(split_path("a/b"), Err(FsError::InvalidPath(_))));
        assert!(matches!(split_path("/a/../b"), Err(FsError::InvalidPath(_))));
        assert!(split_path(&format!("/{}", "x".repeat(256))).is_err());
    }

    #[test]
    fn test_resolve_root_and_parent() {
        let tree = NamespaceTree::new();
        assert_eq!(tree.resolve_directory("/").unwrap(), tree.root());
        let (parent, name) = tree.resolve_parent("/a.txt").unwrap();
        assert_eq!(parent, tree.root());
        assert_eq!(name, "a.txt");
        assert!(matches!(tree.resolve_parent("/"), Err(FsError::InvalidPath(_))));
        assert!(matches!(
            tree.resolve_parent("/missing/a.txt"),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_add_subdirectory_keeps_duality() {
        let mut tree = NamespaceTree::new();
        let root = tree.root();
        let docs = tree
            .add_subdirectory(root, "docs", Inode::new(5000), "root")
            .unwrap();
        let node = tree.node(root).unwrap();
        assert_eq!(node.children(), &[docs]);
        assert_eq!(node.entries().len(), 1);
        assert!(node.entries()[0].is_dir());
        assert_eq!(tree.node(docs).unwrap().parent(), Some(root));
        assert_eq!(tree.resolve_directory("/docs").unwrap(), docs);
        tree.verify().unwrap();
    }

    #[test]
    fn test_file_is_not_a_directory_segment() {
        let mut tree = NamespaceTree::new();
        let root = tree.root();
        tree.add_file(root, file("a")).unwrap();
        assert!(matches!(tree.resolve_directory("/a"), Err(FsError::NotFound(_))));
        assert!(matches!(tree.resolve_parent("/a/b"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_find_is_case_sensitive() {
        let mut tree = NamespaceTree::new();
        let root = tree.root();
        tree.add_file(root, file("Notes")).unwrap();
        assert!(tree.find_file_entry(root, "Notes").is_some());
        assert!(tree.find_file_entry(root, "notes").is_none());
    }

    #[test]
    fn test_path_exists() {
        let mut tree = NamespaceTree::new();
        let root = tree.root();
        let docs = tree
            .add_subdirectory(root, "docs", Inode::new(5000), "root")
            .unwrap();
        tree.add_file(docs, file("x")).unwrap();
        assert!(tree.path_exists("/"));
        assert!(tree.path_exists("/docs"));
        assert!(tree.path_exists("/docs/x"));
        assert!(!tree.path_exists("/docs/y"));
        assert!(!tree.path_exists("/docs/x/z"));
        assert!(!tree.path_exists("relative"));
    }

    #[test]
    fn test_remove_file() {
        let mut tree = NamespaceTree::new();
        let root = tree.root();
        tree.add_file(root, file("a")).unwrap();
        let removed = tree.remove_file(root, "a").unwrap();
        assert_eq!(removed.name, "a");
        assert!(matches!(tree.remove_file(root, "a"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_remove_subdirectory_requires_empty() {
        let mut tree = NamespaceTree::new();
        let root = tree.root();
        let docs = tree
            .add_subdirectory(root, "docs", Inode::new(5000), "root")
            .unwrap();
        tree.add_subdirectory(docs, "inner", Inode::new(5001), "root")
            .unwrap();

        assert!(matches!(
            tree.remove_subdirectory(root, "docs"),
            Err(FsError::NotEmpty(_))
        ));
        tree.verify().unwrap();

        tree.remove_subdirectory(docs, "inner").unwrap();
        tree.remove_subdirectory(root, "docs").unwrap();
        assert!(tree.node(root).unwrap().is_empty());
        assert!(tree.node(docs).is_none());
        tree.verify().unwrap();
    }

    #[test]
    fn test_arena_slot_reuse() {
        let mut tree = NamespaceTree::new();
        let root = tree.root();
        let a = tree.add_subdirectory(root, "a", Inode::new(5000), "root").unwrap();
        tree.remove_subdirectory(root, "a").unwrap();
        let b = tree.add_subdirectory(root, "b", Inode::new(5001), "root").unwrap();
        assert_eq!(a, b);
        assert_eq!(tree.node(b).unwrap().name(), "b");
        assert!(tree.find_child_dir(root, "a").is_none());
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_order() {
        let mut tree = NamespaceTree::new();
        let root = tree.root();
        tree.add_file(root, file("z")).unwrap();
        let docs = tree
            .add_subdirectory(root, "docs", Inode::new(5000), "root")
            .unwrap();
        tree.add_file(root, file("a")).unwrap();
        tree.add_file(docs, file("x")).unwrap();

        let bytes = postcard::to_stdvec(&tree.snapshot()).unwrap();
        let snapshot: NodeSnapshot = postcard::from_bytes(&bytes).unwrap();
        let restored = NamespaceTree::from_snapshot(snapshot).unwrap();

        let names: Vec<_> = restored
            .node(restored.root())
            .unwrap()
            .entries()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["z", "docs", "a"]);
        let docs = restored.resolve_directory("/docs").unwrap();
        assert!(restored.find_file_entry(docs, "x").is_some());
        assert_eq!(restored.files().count(), 3);
        assert_eq!(restored.directory_count(), 1);
    }

    #[test]
    fn test_from_snapshot_rejects_mismatch() {
        let snapshot = NodeSnapshot {
            entries: vec![DirectoryEntry::directory("d", "root", Inode::new(5000))],
            children: vec![],
        };
        assert!(matches!(
            NamespaceTree::from_snapshot(snapshot),
            Err(FsError::InvalidFormat(_))
        ));
    }
}

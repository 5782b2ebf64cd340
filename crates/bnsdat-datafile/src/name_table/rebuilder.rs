//! Building a name table from alias strings.
//!
//! Aliases are split after every `_`, `.` and `:`, so `item:long_sword`
//! becomes the edges `item:`, `long_`, `sword`. After all aliases are in,
//! chains of single-child nodes are folded into one edge and the trie is
//! flattened into the entry array, children before parents.

use bnsdat_common::Ref;
use tracing::debug;

use super::{cp949, pack_ref, NameTable, NameTableEntry};
use crate::{Error, FxHashMap, Result};

const SEPARATORS: [char; 3] = ['_', '.', ':'];

/// A trie node. Leaves carry a key and have no children.
#[derive(Debug, Default)]
struct Node {
    key: Option<Ref>,
    children: FxHashMap<String, Node>,
}

impl Node {
    fn leaf(key: Ref) -> Self {
        Self {
            key: Some(key),
            children: FxHashMap::default(),
        }
    }
}

/// Rebuilds the trie of a [`NameTable`]. The table is left untouched until
/// [`Rebuilder::end_rebuild`].
#[derive(Debug)]
pub struct Rebuilder<'a> {
    target: &'a mut NameTable,
    root: FxHashMap<String, Node>,
}

impl<'a> Rebuilder<'a> {
    pub(super) fn new(target: &'a mut NameTable) -> Self {
        Self {
            target,
            root: FxHashMap::default(),
        }
    }

    /// Insert one alias as given. A later alias with the same text replaces
    /// the earlier one.
    pub fn add_alias(&mut self, alias: &str, key: Ref) -> &mut Self {
        let mut children = &mut self.root;
        let mut rest = alias;

        while let Some(split) = rest.find(SEPARATORS) {
            let (segment, tail) = rest.split_at(split + 1);
            children = &mut children.entry(segment.to_string()).or_default().children;
            rest = tail;
        }

        children.insert(rest.to_string(), Node::leaf(key));
        self
    }

    /// Insert the aliases of one table as `prefix:alias`, lower-cased.
    /// Records without an alias are skipped.
    pub fn add_table<I, S>(&mut self, prefix: &str, records: I) -> &mut Self
    where
        I: IntoIterator<Item = (S, Ref)>,
        S: AsRef<str>,
    {
        let prefix = prefix.to_lowercase();
        for (alias, key) in records {
            let alias = alias.as_ref();
            if alias.trim().is_empty() {
                continue;
            }
            self.add_alias(&format!("{prefix}:{}", alias.to_lowercase()), key);
        }
        self
    }

    /// Fold single-child chains and write the result into the table.
    pub fn end_rebuild(mut self) -> Result<()> {
        optimize(&mut self.root, true);

        let mut entries = Vec::new();
        let (root_begin, root_end) = serialize(&self.root, &mut entries)?;
        debug!(entries = entries.len(), "rebuilt name table");

        self.target.replace(root_begin, root_end, entries);
        Ok(())
    }
}

/// Fold every branch child that has exactly one child of its own into a
/// single edge. Directly below the root only leaves are pulled up, so the
/// first level keeps its branches.
fn optimize(children: &mut FxHashMap<String, Node>, is_root: bool) {
    let keys: Vec<String> = children.keys().cloned().collect();

    for key in keys {
        let Some(node) = children.get_mut(&key) else {
            continue;
        };
        if node.key.is_some() {
            continue;
        }
        optimize(&mut node.children, false);

        if node.children.len() != 1 {
            continue;
        }
        let single_is_leaf = node.children.values().all(|child| child.key.is_some());
        if is_root && !single_is_leaf {
            continue;
        }

        if let Some(node) = children.remove(&key) {
            if let Some((suffix, child)) = node.children.into_iter().next() {
                children.insert(key + &suffix, child);
            }
        }
    }
}

/// Append the entries below one node and return the node's packed range.
fn serialize(children: &FxHashMap<String, Node>, entries: &mut Vec<NameTableEntry>) -> Result<(u32, u32)> {
    let mut ordered: Vec<(&String, &Node)> = children.iter().collect();
    ordered.sort_by_cached_key(|(label, _)| cp949::sort_key(label));

    let mut packed = Vec::with_capacity(ordered.len());
    for (_, node) in &ordered {
        packed.push(match node.key {
            Some(key) => pack_ref(key),
            None => serialize(&node.children, entries)?,
        });
    }

    let begin = entry_index(entries.len())?;
    for ((label, _), (child_begin, child_end)) in ordered.into_iter().zip(packed) {
        entries.push(NameTableEntry {
            string: label.clone(),
            begin: child_begin,
            end: child_end,
        });
    }
    let end = entry_index(entries.len())?.wrapping_sub(1);

    Ok((begin << 1, end))
}

fn entry_index(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|&index| index <= u32::MAX >> 1)
        .ok_or(Error::FieldOverflow {
            what: "name table entry index",
            value: len as u64,
        })
}

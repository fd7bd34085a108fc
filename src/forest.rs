use {
    crate::{
        engine::TreeEngine,
        error::{Error, Result},
        types::{BulkNode, Position, Problems},
    },
    cosmwasm_schema::cw_serde,
    cosmwasm_std::Storage,
};

/// A loaded node: its primary key, its user columns, and one transient slot
/// caching the parent. The slot is a lookup shortcut, never an owner; it is
/// dropped whenever the node moves or is refreshed.
#[derive(Clone, Debug)]
pub struct Node<D> {
    pub id: u64,
    pub data: D,
    cached_parent: Option<Box<Node<D>>>,
}

impl<D> Node<D> {
    fn new(id: u64, data: D) -> Self {
        Self {
            id,
            data,
            cached_parent: None,
        }
    }
}

/// Rendering metadata attached to each node of an annotated walk: whether
/// this node opens a deeper level, the 0-based levels that close right after
/// it, and its level relative to the walk's starting point.
#[cw_serde]
#[derive(Eq)]
pub struct NodeInfo {
    pub open: bool,
    pub close: Vec<u32>,
    pub level: u32,
}

/// The node protocol: one operation vocabulary over any tree encoding.
///
/// `Forest` derives the whole API surface (walks, sibling navigation, bulk
/// dump and load, diagnostics) from the [`TreeEngine`] capability set, and
/// validates the position vocabulary in one place, so the engines only see
/// well-formed requests.
///
/// Like the engines it wraps, a forest is declared as a constant and takes
/// the storage on every call:
///
/// ```rust
/// use arbor::{Forest, MpTree};
///
/// const TREE: Forest<MpTree<String>> = Forest::new(MpTree::new("r", "p", "s"));
/// ```
pub struct Forest<E> {
    engine: E,
}

impl<E> Forest<E> {
    pub const fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: TreeEngine> Forest<E> {
    fn node(&self, store: &dyn Storage, id: u64) -> Result<Node<E::Data>> {
        Ok(Node::new(id, self.engine.load(store, id)?))
    }

    fn nodes(&self, store: &dyn Storage, ids: Vec<u64>) -> Result<Vec<Node<E::Data>>> {
        ids.into_iter().map(|id| self.node(store, id)).collect()
    }

    // ------------------------------------------------------------- mutation

    /// Add a new rightmost root (or, on a sorted tree, wherever the ordering
    /// directive puts it).
    pub fn add_root(&self, store: &mut dyn Storage, data: E::Data) -> Result<Node<E::Data>> {
        let id = self.engine.add_root(store, data, None)?;
        self.node(store, id)
    }

    /// Add a new rightmost (or sorted) child of `parent`.
    pub fn add_child(
        &self,
        store: &mut dyn Storage,
        parent: u64,
        data: E::Data,
    ) -> Result<Node<E::Data>> {
        let id = self.engine.add_child(store, parent, data, None)?;
        self.node(store, id)
    }

    /// Add a new sibling of `node` at `pos`.
    pub fn add_sibling(
        &self,
        store: &mut dyn Storage,
        node: u64,
        pos: Position,
        data: E::Data,
    ) -> Result<Node<E::Data>> {
        let pos = self.sibling_pos(pos)?;
        let id = self.engine.add_sibling(store, node, pos, data, None)?;
        self.node(store, id)
    }

    /// Move `node` and its whole subtree to `pos` relative to `target`. The
    /// node value's parent cache is invalidated.
    pub fn move_node(
        &self,
        store: &mut dyn Storage,
        node: &mut Node<E::Data>,
        target: u64,
        pos: Position,
    ) -> Result<()> {
        let pos = self.move_pos(pos)?;
        self.engine.move_node(store, node.id, target, pos)?;
        node.cached_parent = None;
        Ok(())
    }

    /// Delete a node and all its descendants; returns how many rows went
    /// away.
    pub fn delete(&self, store: &mut dyn Storage, id: u64) -> Result<u64> {
        self.engine.delete_many(store, &[id])
    }

    /// Delete several nodes (and their descendants) at once. The set is
    /// reduced to its minimal covering set first.
    pub fn delete_many(&self, store: &mut dyn Storage, ids: &[u64]) -> Result<u64> {
        self.engine.delete_many(store, ids)
    }

    // -------------------------------------------------------------- lookups

    pub fn get(&self, store: &dyn Storage, id: u64) -> Result<Node<E::Data>> {
        self.node(store, id)
    }

    /// Reload the node's user columns and drop its parent cache.
    pub fn refresh(&self, store: &dyn Storage, node: &mut Node<E::Data>) -> Result<()> {
        node.data = self.engine.load(store, node.id)?;
        node.cached_parent = None;
        Ok(())
    }

    pub fn get_depth(&self, store: &dyn Storage, id: u64) -> Result<u32> {
        self.engine.depth(store, id)
    }

    /// The parent node, served from the node value's cache slot unless
    /// `refresh` is set (or the slot is empty).
    pub fn get_parent(
        &self,
        store: &dyn Storage,
        node: &mut Node<E::Data>,
        refresh: bool,
    ) -> Result<Option<Node<E::Data>>> {
        if refresh {
            node.cached_parent = None;
        }
        if let Some(cached) = &node.cached_parent {
            return Ok(Some((**cached).clone()));
        }
        match self.engine.parent_id(store, node.id)? {
            Some(pid) => {
                let parent = self.node(store, pid)?;
                node.cached_parent = Some(Box::new(parent.clone()));
                Ok(Some(parent))
            },
            None => Ok(None),
        }
    }

    pub fn get_root(&self, store: &dyn Storage, id: u64) -> Result<Node<E::Data>> {
        match self.engine.ancestor_ids(store, id)?.first() {
            Some(&root) => self.node(store, root),
            None => self.node(store, id),
        }
    }

    /// Ancestors in root-to-parent order.
    pub fn get_ancestors(&self, store: &dyn Storage, id: u64) -> Result<Vec<Node<E::Data>>> {
        let ids = self.engine.ancestor_ids(store, id)?;
        self.nodes(store, ids)
    }

    /// Descendants in depth-first pre-order, optionally with the node itself
    /// in front.
    pub fn get_descendants(
        &self,
        store: &dyn Storage,
        id: u64,
        include_self: bool,
    ) -> Result<Vec<Node<E::Data>>> {
        let ids = if include_self {
            self.engine.tree_ids(store, Some(id))?
        } else {
            self.engine.descendant_ids(store, id)?
        };
        self.nodes(store, ids)
    }

    pub fn get_descendant_count(&self, store: &dyn Storage, id: u64) -> Result<u64> {
        self.engine.descendant_count(store, id)
    }

    pub fn get_children(&self, store: &dyn Storage, id: u64) -> Result<Vec<Node<E::Data>>> {
        let ids = self.engine.children_ids(store, Some(id))?;
        self.nodes(store, ids)
    }

    pub fn get_children_count(&self, store: &dyn Storage, id: u64) -> Result<u64> {
        self.engine.children_count(store, id)
    }

    pub fn get_first_child(&self, store: &dyn Storage, id: u64) -> Result<Option<Node<E::Data>>> {
        let ids = self.engine.children_ids(store, Some(id))?;
        ids.first().map(|&c| self.node(store, c)).transpose()
    }

    pub fn get_last_child(&self, store: &dyn Storage, id: u64) -> Result<Option<Node<E::Data>>> {
        let ids = self.engine.children_ids(store, Some(id))?;
        ids.last().map(|&c| self.node(store, c)).transpose()
    }

    /// The node's whole sibling group, itself included.
    pub fn get_siblings(&self, store: &dyn Storage, id: u64) -> Result<Vec<Node<E::Data>>> {
        let ids = self.engine.sibling_ids(store, id)?;
        self.nodes(store, ids)
    }

    pub fn get_first_sibling(&self, store: &dyn Storage, id: u64) -> Result<Node<E::Data>> {
        let ids = self.engine.sibling_ids(store, id)?;
        match ids.first() {
            Some(&first) => self.node(store, first),
            None => Err(Error::Corrupted {
                detail: format!("node {id} is missing from its sibling group"),
            }),
        }
    }

    pub fn get_last_sibling(&self, store: &dyn Storage, id: u64) -> Result<Node<E::Data>> {
        let ids = self.engine.sibling_ids(store, id)?;
        match ids.last() {
            Some(&last) => self.node(store, last),
            None => Err(Error::Corrupted {
                detail: format!("node {id} is missing from its sibling group"),
            }),
        }
    }

    pub fn get_prev_sibling(&self, store: &dyn Storage, id: u64) -> Result<Option<Node<E::Data>>> {
        let ids = self.engine.sibling_ids(store, id)?;
        match ids.iter().position(|&s| s == id) {
            Some(at) if at > 0 => self.node(store, ids[at - 1]).map(Some),
            _ => Ok(None),
        }
    }

    pub fn get_next_sibling(&self, store: &dyn Storage, id: u64) -> Result<Option<Node<E::Data>>> {
        let ids = self.engine.sibling_ids(store, id)?;
        match ids.iter().position(|&s| s == id) {
            Some(at) if at + 1 < ids.len() => self.node(store, ids[at + 1]).map(Some),
            _ => Ok(None),
        }
    }

    pub fn get_root_nodes(&self, store: &dyn Storage) -> Result<Vec<Node<E::Data>>> {
        let ids = self.engine.root_ids(store)?;
        self.nodes(store, ids)
    }

    pub fn get_first_root_node(&self, store: &dyn Storage) -> Result<Option<Node<E::Data>>> {
        let ids = self.engine.root_ids(store)?;
        ids.first().map(|&id| self.node(store, id)).transpose()
    }

    pub fn get_last_root_node(&self, store: &dyn Storage) -> Result<Option<Node<E::Data>>> {
        let ids = self.engine.root_ids(store)?;
        ids.last().map(|&id| self.node(store, id)).transpose()
    }

    // ----------------------------------------------------------- predicates

    pub fn is_root(&self, store: &dyn Storage, id: u64) -> Result<bool> {
        Ok(self.engine.parent_id(store, id)?.is_none())
    }

    pub fn is_leaf(&self, store: &dyn Storage, id: u64) -> Result<bool> {
        Ok(self.engine.children_count(store, id)? == 0)
    }

    pub fn is_sibling_of(&self, store: &dyn Storage, id: u64, other: u64) -> Result<bool> {
        Ok(self.engine.parent_id(store, id)? == self.engine.parent_id(store, other)?)
    }

    pub fn is_child_of(&self, store: &dyn Storage, id: u64, other: u64) -> Result<bool> {
        Ok(self.engine.parent_id(store, id)? == Some(other))
    }

    pub fn is_descendant_of(&self, store: &dyn Storage, id: u64, other: u64) -> Result<bool> {
        self.engine.is_descendant(store, id, other)
    }

    // ---------------------------------------------------------------- walks

    /// The subtree under `parent` (inclusive), or the whole forest, in
    /// depth-first pre-order.
    pub fn get_tree(
        &self,
        store: &dyn Storage,
        parent: Option<u64>,
    ) -> Result<Vec<Node<E::Data>>> {
        let ids = self.engine.tree_ids(store, parent)?;
        self.nodes(store, ids)
    }

    /// The pre-order walk annotated for rendering: each node knows whether it
    /// opens a level, which levels close after it, and its relative level.
    pub fn get_annotated_list(
        &self,
        store: &dyn Storage,
        parent: Option<u64>,
    ) -> Result<Vec<(Node<E::Data>, NodeInfo)>> {
        let ids = self.engine.tree_ids(store, parent)?;

        let mut result: Vec<(Node<E::Data>, NodeInfo)> = vec![];
        let mut start_depth = None;
        let mut prev_depth: Option<u32> = None;
        for id in ids {
            let depth = self.engine.depth(store, id)?;
            let start = *start_depth.get_or_insert(depth);
            if let Some(prev) = prev_depth {
                if depth < prev {
                    if let Some((_, info)) = result.last_mut() {
                        info.close = (0..prev - depth).collect();
                    }
                }
            }
            let info = NodeInfo {
                open: prev_depth.map_or(true, |prev| depth > prev),
                close: vec![],
                level: depth - start,
            };
            result.push((self.node(store, id)?, info));
            prev_depth = Some(depth);
        }
        if let (Some(start), Some(prev)) = (start_depth, prev_depth) {
            if let Some((_, info)) = result.last_mut() {
                info.close = (0..prev - start + 1).collect();
            }
        }
        Ok(result)
    }

    /// The children of `parent` (or the roots), each annotated with its
    /// transitive descendant count.
    pub fn get_descendants_group_count(
        &self,
        store: &dyn Storage,
        parent: Option<u64>,
    ) -> Result<Vec<(Node<E::Data>, u64)>> {
        self.engine
            .group_counts(store, parent)?
            .into_iter()
            .map(|(id, count)| Ok((self.node(store, id)?, count)))
            .collect()
    }

    // ----------------------------------------------------------------- bulk

    /// Serialise the subtree under `parent` (or the whole forest) into the
    /// nested bulk form, children in natural order. Bookkeeping columns are
    /// not part of the dump; a dump with `keep_ids` reloads onto the same
    /// primary keys.
    pub fn dump_bulk(
        &self,
        store: &dyn Storage,
        parent: Option<u64>,
        keep_ids: bool,
    ) -> Result<Vec<BulkNode<E::Data>>> {
        match parent {
            Some(id) => Ok(vec![self.dump_subtree(store, id, keep_ids)?]),
            None => self
                .engine
                .root_ids(store)?
                .into_iter()
                .map(|id| self.dump_subtree(store, id, keep_ids))
                .collect(),
        }
    }

    fn dump_subtree(
        &self,
        store: &dyn Storage,
        id: u64,
        keep_ids: bool,
    ) -> Result<BulkNode<E::Data>> {
        let children = self
            .engine
            .children_ids(store, Some(id))?
            .into_iter()
            .map(|child| self.dump_subtree(store, child, keep_ids))
            .collect::<Result<Vec<_>>>()?;
        Ok(BulkNode {
            id: keep_ids.then_some(id),
            data: self.engine.load(store, id)?,
            children,
        })
    }

    /// Load a bulk structure under `parent` (or as new trailing roots),
    /// returning the new ids in pre-order. With `keep_ids` the given primary
    /// keys are used verbatim; a collision fails the whole load, and the
    /// host transaction reverts every row inserted so far.
    ///
    /// An ordering directive takes precedence over the structure's sibling
    /// order.
    pub fn load_bulk(
        &self,
        store: &mut dyn Storage,
        data: &[BulkNode<E::Data>],
        parent: Option<u64>,
        keep_ids: bool,
    ) -> Result<Vec<u64>> {
        let mut added = vec![];
        // iterative pre-order
        let mut stack: Vec<(Option<u64>, &BulkNode<E::Data>)> =
            data.iter().rev().map(|node| (parent, node)).collect();
        while let Some((at, node)) = stack.pop() {
            let forced = if keep_ids {
                Some(node.id.ok_or(Error::MissingBulkId)?)
            } else {
                None
            };
            let id = match at {
                Some(p) => self.engine.add_child(store, p, node.data.clone(), forced)?,
                None => self.engine.add_root(store, node.data.clone(), forced)?,
            };
            added.push(id);
            stack.extend(node.children.iter().rev().map(|child| (Some(id), child)));
        }
        Ok(added)
    }

    // ---------------------------------------------------------- maintenance

    /// Scan the whole table for structural problems; diagnostic only.
    pub fn find_problems(&self, store: &dyn Storage) -> Result<Problems> {
        self.engine.find_problems(store)
    }

    /// Repair the tree. The destructive mode dumps the forest in its current
    /// structural order, clears the table, and reloads it with fresh
    /// hole-free bookkeeping, preserving every primary key. The
    /// non-destructive mode only rewrites what the engine can derive in
    /// place.
    pub fn fix_tree(&self, store: &mut dyn Storage, destructive: bool) -> Result<()> {
        if destructive {
            let dump = self.dump_bulk(store, None, true)?;
            self.engine.clear(store)?;
            self.load_bulk(store, &dump, None, true)?;
            Ok(())
        } else {
            self.engine.repair(store)
        }
    }

    // ----------------------------------------------------------- validation

    fn sibling_pos(&self, pos: Position) -> Result<Position> {
        if pos.is_child() {
            return Err(Error::InvalidPosition {
                pos,
                reason: "add_sibling accepts sibling positions only",
            });
        }
        self.check_sorted(pos)
    }

    fn move_pos(&self, pos: Position) -> Result<Position> {
        self.check_sorted(pos)
    }

    fn check_sorted(&self, pos: Position) -> Result<Position> {
        let sorted = self.engine.order_key().is_some();
        if sorted && !pos.is_sorted() {
            return Err(Error::InvalidPosition {
                pos,
                reason: "this tree computes positions, use a sorted position",
            });
        }
        if !sorted && pos.is_sorted() {
            return Err(Error::MissingNodeOrderBy);
        }
        Ok(pos)
    }
}

use {
    crate::{
        error::Result,
        types::{OrderKey, Position, Problems},
    },
    cosmwasm_std::Storage,
    serde::{de::DeserializeOwned, ser::Serialize},
};

/// The capability set every tree encoding provides.
///
/// An engine owns the bookkeeping columns of one table and knows how to
/// rewrite them on mutation; everything above this trait (the node protocol,
/// bulk dump/load, annotated walks) is derived generically in
/// [`Forest`](crate::Forest).
///
/// Nodes are addressed by their primary key. Enumerations return ids in the
/// engine's natural order, which is depth-first pre-order with siblings
/// left to right.
///
/// Mutating methods may assume their `pos` argument has already been checked
/// against the position vocabulary rules (sibling subset for sibling
/// insertion, sorted positions if and only if the tree carries an ordering
/// directive); the wrapper validates in one place.
pub trait TreeEngine {
    type Data: Serialize + DeserializeOwned + Clone;

    /// The ordering directive. `None` means sibling order is explicit and
    /// part of the caller's intent.
    fn order_key(&self) -> Option<fn(&Self::Data) -> OrderKey>;

    fn load(&self, store: &dyn Storage, id: u64) -> Result<Self::Data>;

    fn contains(&self, store: &dyn Storage, id: u64) -> Result<bool>;

    fn depth(&self, store: &dyn Storage, id: u64) -> Result<u32>;

    /// Create a new rightmost root (or, on a sorted tree, the root that the
    /// ordering directive calls for). `id` forces a primary key, for bulk
    /// restores; the sequence is advanced past it.
    fn add_root(&self, store: &mut dyn Storage, data: Self::Data, id: Option<u64>) -> Result<u64>;

    /// Create a new rightmost (or sorted) child of `parent`.
    fn add_child(
        &self,
        store: &mut dyn Storage,
        parent: u64,
        data: Self::Data,
        id: Option<u64>,
    ) -> Result<u64>;

    /// Create a new sibling of `node` at a sibling position.
    fn add_sibling(
        &self,
        store: &mut dyn Storage,
        node: u64,
        pos: Position,
        data: Self::Data,
        id: Option<u64>,
    ) -> Result<u64>;

    /// Move `node` and its whole subtree relative to `target`.
    fn move_node(
        &self,
        store: &mut dyn Storage,
        node: u64,
        target: u64,
        pos: Position,
    ) -> Result<()>;

    /// Delete the given nodes and all their descendants. The set is reduced
    /// to its minimal covering set first. Returns the number of rows removed.
    fn delete_many(&self, store: &mut dyn Storage, ids: &[u64]) -> Result<u64>;

    /// Remove every row of the table, keeping the primary-key sequence.
    fn clear(&self, store: &mut dyn Storage) -> Result<u64>;

    fn parent_id(&self, store: &dyn Storage, id: u64) -> Result<Option<u64>>;

    fn root_ids(&self, store: &dyn Storage) -> Result<Vec<u64>>;

    /// Children of `parent`, or the roots when `parent` is `None`.
    fn children_ids(&self, store: &dyn Storage, parent: Option<u64>) -> Result<Vec<u64>>;

    fn children_count(&self, store: &dyn Storage, id: u64) -> Result<u64>;

    /// The node's sibling group, including the node itself.
    fn sibling_ids(&self, store: &dyn Storage, id: u64) -> Result<Vec<u64>>;

    /// Ancestors in root-to-parent order.
    fn ancestor_ids(&self, store: &dyn Storage, id: u64) -> Result<Vec<u64>>;

    /// Strict descendants in depth-first pre-order.
    fn descendant_ids(&self, store: &dyn Storage, id: u64) -> Result<Vec<u64>>;

    fn descendant_count(&self, store: &dyn Storage, id: u64) -> Result<u64> {
        Ok(self.descendant_ids(store, id)?.len() as u64)
    }

    /// The subtree under `parent` (inclusive) in depth-first pre-order, or
    /// the whole forest when `parent` is `None`.
    fn tree_ids(&self, store: &dyn Storage, parent: Option<u64>) -> Result<Vec<u64>>;

    fn is_descendant(&self, store: &dyn Storage, id: u64, ancestor: u64) -> Result<bool>;

    /// Children of `parent` (or the roots) paired with their transitive
    /// descendant counts. The default does one walk per child; engines that
    /// can answer from a single scan override it.
    fn group_counts(&self, store: &dyn Storage, parent: Option<u64>) -> Result<Vec<(u64, u64)>> {
        self.children_ids(store, parent)?
            .into_iter()
            .map(|id| Ok((id, self.descendant_count(store, id)?)))
            .collect()
    }

    /// Scan the whole table for structural problems. Diagnostic only: never
    /// called during regular operation.
    fn find_problems(&self, store: &dyn Storage) -> Result<Problems>;

    /// Non-destructive repair: rewrite whatever bookkeeping is derivable
    /// without relabelling (depth and child counters for materialized paths,
    /// interval renumbering for nested sets, sibling order compaction for
    /// adjacency lists).
    fn repair(&self, store: &mut dyn Storage) -> Result<()>;
}

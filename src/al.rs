use {
    crate::{
        engine::TreeEngine,
        error::{Error, Result},
        types::{OrderKey, Position, Problems},
    },
    cosmwasm_std::{Order, StdResult, Storage},
    cw_storage_plus::{Bound, Item, Map},
    serde::{de::DeserializeOwned, Deserialize, Serialize},
};

/// The synthetic parent key under which root nodes are grouped in the child
/// index. Real primary keys start at 1.
const NO_PARENT: u64 = 0;

/// One row of an adjacency list table.
///
/// `sib_order` positions the node among its siblings; on a sorted tree it is
/// unused (kept at zero) and sibling order comes from the ordering directive
/// at read time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AlRow<D> {
    pub parent: Option<u64>,
    pub sib_order: u32,
    pub data: D,
}

/// The adjacency list tree engine.
///
/// Writes are point updates on the node itself (plus a sibling-order shift
/// when inserting into the middle of a group); every tree walk recurses
/// through the `(parent, order)` child index, so reads are proportional to
/// the subtree they enumerate.
pub struct AlTree<'a, D> {
    order_by: Option<fn(&D) -> OrderKey>,
    seq: Item<'a, u64>,
    rows: Map<'a, u64, AlRow<D>>,
    by_parent: Map<'a, (u64, u64), u64>,
}

impl<'a, D> AlTree<'a, D> {
    pub const fn new(
        row_namespace: &'a str,
        child_namespace: &'a str,
        seq_namespace: &'a str,
    ) -> Self {
        Self {
            order_by: None,
            seq: Item::new(seq_namespace),
            rows: Map::new(row_namespace),
            by_parent: Map::new(child_namespace),
        }
    }

    /// Keep all sibling groups sorted by the given key extraction. The
    /// `sib_order` column goes unused in this mode.
    pub const fn ordered_by(mut self, key: fn(&D) -> OrderKey) -> Self {
        self.order_by = Some(key);
        self
    }
}

impl<'a, D> AlTree<'a, D>
where
    D: Serialize + DeserializeOwned + Clone,
{
    fn lookup(&self, store: &dyn Storage, id: u64) -> Result<AlRow<D>> {
        self.rows
            .may_load(store, id)?
            .ok_or(Error::NotFound { id })
    }

    fn alloc_id(&self, store: &mut dyn Storage, id: Option<u64>) -> Result<u64> {
        let last = self.seq.may_load(store)?.unwrap_or(0);
        match id {
            Some(id) => {
                if self.rows.has(store, id) {
                    return Err(Error::NodeAlreadySaved { id });
                }
                if id > last {
                    self.seq.save(store, &id)?;
                }
                Ok(id)
            },
            None => {
                let id = last + 1;
                self.seq.save(store, &id)?;
                Ok(id)
            },
        }
    }

    fn parent_key(parent: Option<u64>) -> u64 {
        parent.unwrap_or(NO_PARENT)
    }

    /// The child-index key of a row.
    fn entry_key(&self, pk: u64, row: &AlRow<D>) -> (u64, u64) {
        let ord = if self.order_by.is_some() {
            pk
        } else {
            row.sib_order as u64
        };
        (Self::parent_key(row.parent), ord)
    }

    fn group_bounds(
        parent_key: u64,
    ) -> (Option<Bound<'a, (u64, u64)>>, Option<Bound<'a, (u64, u64)>>) {
        (
            Some(Bound::inclusive((parent_key, 0u64))),
            Some(Bound::exclusive((parent_key + 1, 0u64))),
        )
    }

    fn group_entries(
        &self,
        store: &dyn Storage,
        parent_key: u64,
    ) -> Result<Vec<((u64, u64), u64)>> {
        let (lower, upper) = Self::group_bounds(parent_key);
        self.by_parent
            .range(store, lower, upper, Order::Ascending)
            .map(|item| item.map_err(Into::into))
            .collect()
    }

    /// A sibling group in reading order: index order when explicit, ordering
    /// directive (ties by primary key) when sorted.
    fn child_rows(&self, store: &dyn Storage, parent: Option<u64>) -> Result<Vec<(u64, AlRow<D>)>> {
        let entries = self.group_entries(store, Self::parent_key(parent))?;
        let mut out = entries
            .into_iter()
            .map(|(_, pk)| Ok((pk, self.lookup(store, pk)?)))
            .collect::<Result<Vec<_>>>()?;

        if let Some(key_fn) = self.order_by {
            let mut keyed = out
                .into_iter()
                .map(|(pk, row)| (key_fn(&row.data), pk, row))
                .collect::<Vec<_>>();
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            out = keyed.into_iter().map(|(_, pk, row)| (pk, row)).collect();
        }
        Ok(out)
    }

    fn last_sib_order(&self, store: &dyn Storage, parent_key: u64) -> Result<u32> {
        let (lower, upper) = Self::group_bounds(parent_key);
        let last = self
            .by_parent
            .range(store, lower, upper, Order::Descending)
            .next()
            .transpose()?;
        Ok(last.map(|((_, ord), _)| ord as u32).unwrap_or(0))
    }

    fn bump_order(order: u32) -> Result<u32> {
        order.checked_add(1).ok_or_else(|| Error::CapacityExceeded {
            reason: "sibling order counter exhausted".to_string(),
        })
    }

    /// Compute the `sib_order` for an insertion relative to `target`, opening
    /// a hole by shifting the siblings at or after it one slot to the right.
    /// Explicit ordering only.
    fn make_hole(
        &self,
        store: &mut dyn Storage,
        target: &AlRow<D>,
        pos: Position,
    ) -> Result<u32> {
        let parent_key = Self::parent_key(target.parent);
        let last = self.last_sib_order(store, parent_key)?;

        if pos == Position::LastSibling
            || (pos == Position::Right && target.sib_order == last)
        {
            return Self::bump_order(last);
        }

        let threshold = match pos {
            Position::FirstSibling => 1,
            Position::Left => target.sib_order,
            Position::Right => Self::bump_order(target.sib_order)?,
            _ => {
                return Err(Error::InvalidPosition {
                    pos,
                    reason: "not a resolvable sibling position",
                })
            },
        };

        // rightmost first, so no two index entries ever collide
        let entries = self.group_entries(store, parent_key)?;
        for ((_, ord), pk) in entries.into_iter().rev() {
            if (ord as u32) < threshold {
                break;
            }
            let mut row = self.lookup(store, pk)?;
            row.sib_order = Self::bump_order(row.sib_order)?;
            self.by_parent.remove(store, (parent_key, ord));
            self.by_parent.save(store, (parent_key, row.sib_order as u64), &pk)?;
            self.rows.save(store, pk, &row)?;
        }
        Ok(threshold)
    }

    fn insert_row(
        &self,
        store: &mut dyn Storage,
        id: Option<u64>,
        row: AlRow<D>,
    ) -> Result<u64> {
        let pk = self.alloc_id(store, id)?;
        self.rows.save(store, pk, &row)?;
        self.by_parent.save(store, self.entry_key(pk, &row), &pk)?;
        Ok(pk)
    }

    /// Append (or, when sorted, simply attach) a node under `parent`.
    fn attach(
        &self,
        store: &mut dyn Storage,
        parent: Option<u64>,
        data: D,
        id: Option<u64>,
    ) -> Result<u64> {
        let sib_order = if self.order_by.is_some() {
            0
        } else {
            Self::bump_order(self.last_sib_order(store, Self::parent_key(parent))?)?
        };
        self.insert_row(store, id, AlRow {
            parent,
            sib_order,
            data,
        })
    }

    fn collect_subtree(&self, store: &dyn Storage, id: u64, out: &mut Vec<u64>) -> Result<()> {
        for (pk, _) in self.child_rows(store, Some(id))? {
            out.push(pk);
            self.collect_subtree(store, pk, out)?;
        }
        Ok(())
    }
}

impl<'a, D> TreeEngine for AlTree<'a, D>
where
    D: Serialize + DeserializeOwned + Clone,
{
    type Data = D;

    fn order_key(&self) -> Option<fn(&D) -> OrderKey> {
        self.order_by
    }

    fn load(&self, store: &dyn Storage, id: u64) -> Result<D> {
        Ok(self.lookup(store, id)?.data)
    }

    fn contains(&self, store: &dyn Storage, id: u64) -> Result<bool> {
        Ok(self.rows.has(store, id))
    }

    fn depth(&self, store: &dyn Storage, id: u64) -> Result<u32> {
        let mut depth = 1;
        let mut row = self.lookup(store, id)?;
        while let Some(parent) = row.parent {
            row = self.lookup(store, parent)?;
            depth += 1;
        }
        Ok(depth)
    }

    fn add_root(&self, store: &mut dyn Storage, data: D, id: Option<u64>) -> Result<u64> {
        self.attach(store, None, data, id)
    }

    fn add_child(
        &self,
        store: &mut dyn Storage,
        parent: u64,
        data: D,
        id: Option<u64>,
    ) -> Result<u64> {
        self.lookup(store, parent)?;
        self.attach(store, Some(parent), data, id)
    }

    fn add_sibling(
        &self,
        store: &mut dyn Storage,
        node: u64,
        pos: Position,
        data: D,
        id: Option<u64>,
    ) -> Result<u64> {
        let row = self.lookup(store, node)?;

        if pos == Position::SortedSibling {
            return self.attach(store, row.parent, data, id);
        }

        let sib_order = self.make_hole(store, &row, pos)?;
        self.insert_row(store, id, AlRow {
            parent: row.parent,
            sib_order,
            data,
        })
    }

    fn move_node(
        &self,
        store: &mut dyn Storage,
        node: u64,
        target: u64,
        pos: Position,
    ) -> Result<()> {
        let moving = self.lookup(store, node)?;
        let mut tgt_pk = target;
        let mut tgt = self.lookup(store, target)?;

        if pos.is_child() && node == target {
            return Err(Error::InvalidMoveToDescendant);
        }
        if self.is_descendant(store, target, node)? {
            return Err(Error::InvalidMoveToDescendant);
        }

        // a child move becomes a sibling move against the last child, or a
        // plain attach when the target has no children yet
        let mut pos = pos;
        let mut attach_under: Option<u64> = None;
        if pos.is_child() {
            match self.child_rows(store, Some(target))?.pop() {
                Some((last_pk, last_row)) => {
                    tgt_pk = last_pk;
                    tgt = last_row;
                    pos = match pos {
                        Position::FirstChild => Position::FirstSibling,
                        Position::LastChild => Position::LastSibling,
                        _ => Position::SortedSibling,
                    };
                },
                None => attach_under = Some(target),
            }
        }

        if node == tgt_pk && matches!(pos, Position::Left | Position::Right) {
            return Ok(());
        }

        // detach from the old slot; holes in the old group are fine
        self.by_parent.remove(store, self.entry_key(node, &moving));

        let (parent, sib_order) = match attach_under {
            Some(p) => {
                let order = if self.order_by.is_some() { 0 } else { 1 };
                (Some(p), order)
            },
            None if pos == Position::SortedSibling => (tgt.parent, 0),
            None => (tgt.parent, self.make_hole(store, &tgt, pos)?),
        };

        let moved = AlRow {
            parent,
            sib_order,
            data: moving.data,
        };
        self.by_parent.save(store, self.entry_key(node, &moved), &node)?;
        self.rows.save(store, node, &moved)?;
        Ok(())
    }

    fn delete_many(&self, store: &mut dyn Storage, ids: &[u64]) -> Result<u64> {
        // minimal covering set: drop every id that has another doomed id
        // among its ancestors
        let mut kept = vec![];
        for &id in ids {
            let ancestors = self.ancestor_ids(store, id)?;
            if !ancestors.iter().any(|a| ids.contains(a)) && !kept.contains(&id) {
                kept.push(id);
            }
        }

        let mut count = 0;
        for id in kept {
            let mut doomed = vec![id];
            self.collect_subtree(store, id, &mut doomed)?;
            for pk in doomed {
                let row = self.lookup(store, pk)?;
                self.by_parent.remove(store, self.entry_key(pk, &row));
                self.rows.remove(store, pk);
                count += 1;
            }
        }
        Ok(count)
    }

    fn clear(&self, store: &mut dyn Storage) -> Result<u64> {
        let mut count = 0;
        loop {
            let page = self
                .by_parent
                .range(store, None, None, Order::Ascending)
                .take(32)
                .collect::<StdResult<Vec<_>>>()?;
            if page.is_empty() {
                return Ok(count);
            }
            for (key, pk) in page {
                self.by_parent.remove(store, key);
                self.rows.remove(store, pk);
                count += 1;
            }
        }
    }

    fn parent_id(&self, store: &dyn Storage, id: u64) -> Result<Option<u64>> {
        Ok(self.lookup(store, id)?.parent)
    }

    fn root_ids(&self, store: &dyn Storage) -> Result<Vec<u64>> {
        self.children_ids(store, None)
    }

    fn children_ids(&self, store: &dyn Storage, parent: Option<u64>) -> Result<Vec<u64>> {
        if let Some(id) = parent {
            self.lookup(store, id)?;
        }
        Ok(self
            .child_rows(store, parent)?
            .into_iter()
            .map(|(pk, _)| pk)
            .collect())
    }

    fn children_count(&self, store: &dyn Storage, id: u64) -> Result<u64> {
        Ok(self.group_entries(store, id)?.len() as u64)
    }

    fn sibling_ids(&self, store: &dyn Storage, id: u64) -> Result<Vec<u64>> {
        let row = self.lookup(store, id)?;
        self.children_ids(store, row.parent)
    }

    fn ancestor_ids(&self, store: &dyn Storage, id: u64) -> Result<Vec<u64>> {
        let mut out = vec![];
        let mut row = self.lookup(store, id)?;
        while let Some(parent) = row.parent {
            out.push(parent);
            row = self.lookup(store, parent)?;
        }
        out.reverse();
        Ok(out)
    }

    fn descendant_ids(&self, store: &dyn Storage, id: u64) -> Result<Vec<u64>> {
        self.lookup(store, id)?;
        let mut out = vec![];
        self.collect_subtree(store, id, &mut out)?;
        Ok(out)
    }

    fn tree_ids(&self, store: &dyn Storage, parent: Option<u64>) -> Result<Vec<u64>> {
        match parent {
            Some(id) => {
                let mut out = vec![id];
                self.collect_subtree(store, id, &mut out)?;
                Ok(out)
            },
            None => {
                let mut out = vec![];
                for (pk, _) in self.child_rows(store, None)? {
                    out.push(pk);
                    self.collect_subtree(store, pk, &mut out)?;
                }
                Ok(out)
            },
        }
    }

    fn is_descendant(&self, store: &dyn Storage, id: u64, ancestor: u64) -> Result<bool> {
        let mut row = self.lookup(store, id)?;
        while let Some(parent) = row.parent {
            if parent == ancestor {
                return Ok(true);
            }
            row = self.lookup(store, parent)?;
        }
        Ok(false)
    }

    fn find_problems(&self, store: &dyn Storage) -> Result<Problems> {
        let mut problems = Problems::default();
        let entries = self
            .rows
            .range(store, None, None, Order::Ascending)
            .collect::<StdResult<Vec<_>>>()?;

        for (pk, row) in entries {
            if let Some(parent) = row.parent {
                if !self.rows.has(store, parent) {
                    problems.orphans.push(pk);
                    continue;
                }
            }
            if self.by_parent.may_load(store, self.entry_key(pk, &row))? != Some(pk) {
                problems.bad_structure.push(pk);
            }
        }
        Ok(problems)
    }

    fn repair(&self, store: &mut dyn Storage) -> Result<()> {
        if self.order_by.is_some() {
            // nothing denormalised to drift in sorted mode
            return Ok(());
        }

        // compact the sibling order of every group back to 1..=n
        let entries = self
            .by_parent
            .range(store, None, None, Order::Ascending)
            .collect::<StdResult<Vec<_>>>()?;

        let mut current_group = None;
        let mut next_order = 0u32;
        for ((parent_key, ord), pk) in entries {
            if current_group != Some(parent_key) {
                current_group = Some(parent_key);
                next_order = 0;
            }
            next_order += 1;
            if ord != next_order as u64 {
                let mut row = self.lookup(store, pk)?;
                row.sib_order = next_order;
                self.by_parent.remove(store, (parent_key, ord));
                self.by_parent.save(store, (parent_key, next_order as u64), &pk)?;
                self.rows.save(store, pk, &row)?;
            }
        }
        Ok(())
    }
}

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

const PAGE_SIZE: usize = 32;

/// One row of a nested sets table.
///
/// Disjoint root subtrees are told apart by `tree_id`; within one tree every
/// node owns the interval `[lft, rgt]`, ancestors strictly containing their
/// descendants, and a balanced tree uses the numbers `1..=2n` with no gaps.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NsRow<D> {
    pub tree_id: u64,
    pub lft: u64,
    pub rgt: u64,
    pub depth: u32,
    pub data: D,
}

/// Where a moved subtree is going, resolved before the subtree is cut out so
/// the anchor survives the interval contraction.
#[derive(Clone, Copy)]
enum Dest {
    FirstOf(Option<u64>),
    LastOf(Option<u64>),
    SortedIn(Option<u64>),
    LeftOf(u64),
    RightOf(u64),
}

/// The nested sets tree engine.
///
/// Reads are interval queries on the `(tree_id, lft)` index; every insertion
/// grows a contiguous gap at the pivot, every deletion contracts it back, so
/// the intervals of one tree always tile `1..=2n`.
pub struct NsTree<'a, D> {
    order_by: Option<fn(&D) -> OrderKey>,
    seq: Item<'a, u64>,
    rows: Map<'a, u64, NsRow<D>>,
    by_pos: Map<'a, (u64, u64), u64>,
}

impl<'a, D> NsTree<'a, D> {
    pub const fn new(
        row_namespace: &'a str,
        pos_namespace: &'a str,
        seq_namespace: &'a str,
    ) -> Self {
        Self {
            order_by: None,
            seq: Item::new(seq_namespace),
            rows: Map::new(row_namespace),
            by_pos: Map::new(pos_namespace),
        }
    }

    /// Keep all sibling groups sorted by the given key extraction.
    pub const fn ordered_by(mut self, key: fn(&D) -> OrderKey) -> Self {
        self.order_by = Some(key);
        self
    }
}

impl<'a, D> NsTree<'a, D>
where
    D: Serialize + DeserializeOwned + Clone,
{
    fn lookup(&self, store: &dyn Storage, id: u64) -> Result<NsRow<D>> {
        self.rows
            .may_load(store, id)?
            .ok_or(Error::NotFound { id })
    }

    fn pk_at(&self, store: &dyn Storage, tree_id: u64, lft: u64) -> Result<u64> {
        self.by_pos
            .may_load(store, (tree_id, lft))?
            .ok_or_else(|| Error::Corrupted {
                detail: format!("no row at position ({tree_id}, {lft})"),
            })
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

    fn insert_row(
        &self,
        store: &mut dyn Storage,
        id: Option<u64>,
        row: NsRow<D>,
    ) -> Result<u64> {
        let pk = self.alloc_id(store, id)?;
        if self.by_pos.has(store, (row.tree_id, row.lft)) {
            return Err(Error::Corrupted {
                detail: format!("position ({}, {}) is already taken", row.tree_id, row.lft),
            });
        }
        self.by_pos.save(store, (row.tree_id, row.lft), &pk)?;
        self.rows.save(store, pk, &row)?;
        Ok(pk)
    }

    fn tree_bounds(tree_id: u64) -> (Option<Bound<'a, (u64, u64)>>, Option<Bound<'a, (u64, u64)>>) {
        (
            Some(Bound::inclusive((tree_id, 0u64))),
            Some(Bound::exclusive((tree_id + 1, 0u64))),
        )
    }

    fn last_entry(&self, store: &dyn Storage) -> Result<Option<((u64, u64), u64)>> {
        self.by_pos
            .range(store, None, None, Order::Descending)
            .next()
            .transpose()
            .map_err(Into::into)
    }

    fn last_tree_id(&self, store: &dyn Storage) -> Result<u64> {
        Ok(self.last_entry(store)?.map(|((tree, _), _)| tree).unwrap_or(0))
    }

    /// The root of every tree, ascending by tree id, skipping to the next
    /// tree after each hit.
    fn root_entries(&self, store: &dyn Storage) -> Result<Vec<(u64, u64)>> {
        let mut out = vec![];
        let mut lower: Option<Bound<(u64, u64)>> = None;
        loop {
            let Some(entry) = self
                .by_pos
                .range(store, lower.take(), None, Order::Ascending)
                .next()
            else {
                break;
            };
            let ((tree, lft), pk) = entry?;
            if lft == 1 {
                out.push((tree, pk));
            }
            lower = Some(Bound::inclusive((tree + 1, 0u64)));
        }
        Ok(out)
    }

    /// Immediate children of a node, left to right, hopping over each child's
    /// interval.
    fn child_rows(&self, store: &dyn Storage, parent: &NsRow<D>) -> Result<Vec<(u64, NsRow<D>)>> {
        let mut out = vec![];
        let mut lft = parent.lft + 1;
        while lft < parent.rgt {
            let pk = self.pk_at(store, parent.tree_id, lft)?;
            let row = self.lookup(store, pk)?;
            lft = row.rgt + 1;
            out.push((pk, row));
        }
        Ok(out)
    }

    /// Root-to-parent ancestor chain, found by descending the intervals that
    /// contain the node.
    fn ancestor_rows(&self, store: &dyn Storage, row: &NsRow<D>) -> Result<Vec<(u64, NsRow<D>)>> {
        let mut out = vec![];
        let mut lft = 1;
        while lft < row.lft {
            let pk = self.pk_at(store, row.tree_id, lft)?;
            let candidate = self.lookup(store, pk)?;
            if candidate.lft < row.lft && candidate.rgt > row.rgt {
                lft = candidate.lft + 1;
                out.push((pk, candidate));
            } else {
                lft = candidate.rgt + 1;
            }
        }
        Ok(out)
    }

    fn parent_row(&self, store: &dyn Storage, row: &NsRow<D>) -> Result<Option<(u64, NsRow<D>)>> {
        Ok(self.ancestor_rows(store, row)?.pop())
    }

    /// Open a gap of `gap` at `pivot`: every position at or after the pivot
    /// moves right. Walks the tree from the right so rekeyed index entries
    /// never collide.
    fn open_gap(&self, store: &mut dyn Storage, tree_id: u64, pivot: u64, gap: u64) -> Result<()> {
        let (lower, mut upper) = Self::tree_bounds(tree_id);
        loop {
            let page = self
                .by_pos
                .range(store, lower.clone(), upper.clone(), Order::Descending)
                .take(PAGE_SIZE)
                .collect::<StdResult<Vec<_>>>()?;
            let Some(((_, lowest), _)) = page.last().copied() else {
                return Ok(());
            };

            for ((_, lft), pk) in page {
                let mut row = self.lookup(store, pk)?;
                let mut touched = false;
                if row.lft >= pivot {
                    self.by_pos.remove(store, (tree_id, lft));
                    row.lft += gap;
                    self.by_pos.save(store, (tree_id, row.lft), &pk)?;
                    touched = true;
                }
                if row.rgt >= pivot {
                    row.rgt += gap;
                    touched = true;
                }
                if touched {
                    self.rows.save(store, pk, &row)?;
                }
            }
            upper = Some(Bound::exclusive((tree_id, lowest)));
        }
    }

    /// Contract the gap left by removing the interval starting at `drop_lft`:
    /// every position after it moves `gap` to the left. Walks the tree from
    /// the left so rekeyed index entries never collide.
    fn close_gap(
        &self,
        store: &mut dyn Storage,
        tree_id: u64,
        drop_lft: u64,
        gap: u64,
    ) -> Result<()> {
        let (mut lower, upper) = Self::tree_bounds(tree_id);
        loop {
            let page = self
                .by_pos
                .range(store, lower.clone(), upper.clone(), Order::Ascending)
                .take(PAGE_SIZE)
                .collect::<StdResult<Vec<_>>>()?;
            let Some(((_, highest), _)) = page.last().copied() else {
                return Ok(());
            };

            for ((_, lft), pk) in page {
                let mut row = self.lookup(store, pk)?;
                let mut touched = false;
                if row.lft > drop_lft {
                    self.by_pos.remove(store, (tree_id, lft));
                    row.lft -= gap;
                    self.by_pos.save(store, (tree_id, row.lft), &pk)?;
                    touched = true;
                }
                if row.rgt > drop_lft {
                    row.rgt -= gap;
                    touched = true;
                }
                if touched {
                    self.rows.save(store, pk, &row)?;
                }
            }
            lower = Some(Bound::exclusive((tree_id, highest)));
        }
    }

    /// Bump every tree id at or above `from` up by one, to make room for a
    /// root insertion. Highest trees first, so rekeys never collide.
    fn renumber_trees(&self, store: &mut dyn Storage, from: u64) -> Result<()> {
        let lower = Some(Bound::inclusive((from, 0u64)));
        let mut upper: Option<Bound<(u64, u64)>> = None;
        loop {
            let page = self
                .by_pos
                .range(store, lower.clone(), upper.clone(), Order::Descending)
                .take(PAGE_SIZE)
                .collect::<StdResult<Vec<_>>>()?;
            let Some((lowest_key, _)) = page.last().copied() else {
                return Ok(());
            };

            for ((tree, lft), pk) in page {
                let mut row = self.lookup(store, pk)?;
                self.by_pos.remove(store, (tree, lft));
                row.tree_id = tree + 1;
                self.by_pos.save(store, (row.tree_id, lft), &pk)?;
                self.rows.save(store, pk, &row)?;
            }
            upper = Some(Bound::exclusive(lowest_key));
        }
    }

    /// First child of `parent` (or root, when `None`) whose ordering key
    /// compares after `key`.
    fn sorted_slot(
        &self,
        store: &dyn Storage,
        parent: Option<&NsRow<D>>,
        key: &OrderKey,
    ) -> Result<Option<(u64, NsRow<D>)>> {
        let key_fn = self.order_key().ok_or(Error::MissingNodeOrderBy)?;
        let group = match parent {
            Some(p) => self.child_rows(store, p)?,
            None => self
                .root_entries(store)?
                .into_iter()
                .map(|(_, pk)| Ok((pk, self.lookup(store, pk)?)))
                .collect::<Result<Vec<_>>>()?,
        };
        for (pk, row) in group {
            if key_fn(&row.data) > *key {
                return Ok(Some((pk, row)));
            }
        }
        Ok(None)
    }

    /// Make a new root slot at `tree_id` (renumbering the trees above it)
    /// unless the slot is past the end.
    fn make_root_slot(&self, store: &mut dyn Storage, tree_id: u64) -> Result<u64> {
        if tree_id <= self.last_tree_id(store)? {
            self.renumber_trees(store, tree_id)?;
        }
        Ok(tree_id)
    }
}

impl<'a, D> TreeEngine for NsTree<'a, D>
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
        Ok(self.lookup(store, id)?.depth)
    }

    fn add_root(&self, store: &mut dyn Storage, data: D, id: Option<u64>) -> Result<u64> {
        let last = self.last_tree_id(store)?;

        if last > 0 && self.order_by.is_some() {
            let root_pk = self.pk_at(store, last, 1)?;
            return self.add_sibling(store, root_pk, Position::SortedSibling, data, id);
        }

        self.insert_row(store, id, NsRow {
            tree_id: last + 1,
            lft: 1,
            rgt: 2,
            depth: 1,
            data,
        })
    }

    fn add_child(
        &self,
        store: &mut dyn Storage,
        parent: u64,
        data: D,
        id: Option<u64>,
    ) -> Result<u64> {
        let prow = self.lookup(store, parent)?;

        if prow.rgt - prow.lft > 1 {
            // there are children already, delegate to sibling insertion
            let (last_child, _) = self
                .child_rows(store, &prow)?
                .pop()
                .ok_or_else(|| Error::Corrupted {
                    detail: format!("interval of node {parent} is not tiled by its children"),
                })?;
            let pos = if self.order_by.is_some() {
                Position::SortedSibling
            } else {
                Position::LastSibling
            };
            return self.add_sibling(store, last_child, pos, data, id);
        }

        // first child of a leaf
        self.open_gap(store, prow.tree_id, prow.rgt, 2)?;
        self.insert_row(store, id, NsRow {
            tree_id: prow.tree_id,
            lft: prow.rgt,
            rgt: prow.rgt + 1,
            depth: prow.depth + 1,
            data,
        })
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

        if row.lft == 1 {
            // a sibling of a root is a new root; roots are whole trees
            let last = self.last_tree_id(store)?;
            let tree_id = match pos {
                Position::LastSibling => last + 1,
                Position::Right if row.tree_id == last => row.tree_id + 1,
                Position::FirstSibling => self.make_root_slot(store, 1)?,
                Position::Left => self.make_root_slot(store, row.tree_id)?,
                Position::Right => self.make_root_slot(store, row.tree_id + 1)?,
                Position::SortedSibling => {
                    let key_fn = self.order_key().ok_or(Error::MissingNodeOrderBy)?;
                    match self.sorted_slot(store, None, &key_fn(&data))? {
                        Some((_, later)) => self.make_root_slot(store, later.tree_id)?,
                        None => self.last_tree_id(store)? + 1,
                    }
                },
                _ => {
                    return Err(Error::InvalidPosition {
                        pos,
                        reason: "not a sibling position",
                    })
                },
            };
            return self.insert_row(store, id, NsRow {
                tree_id,
                lft: 1,
                rgt: 2,
                depth: 1,
                data,
            });
        }

        let (_, parent) = self
            .parent_row(store, &row)?
            .ok_or_else(|| Error::Corrupted {
                detail: format!("node {node} has no enclosing interval"),
            })?;

        let pivot = match pos {
            Position::LastSibling => parent.rgt,
            Position::FirstSibling => parent.lft + 1,
            Position::Left => row.lft,
            Position::Right => row.rgt + 1,
            Position::SortedSibling => {
                let key_fn = self.order_key().ok_or(Error::MissingNodeOrderBy)?;
                match self.sorted_slot(store, Some(&parent), &key_fn(&data))? {
                    Some((_, later)) => later.lft,
                    None => parent.rgt,
                }
            },
            _ => {
                return Err(Error::InvalidPosition {
                    pos,
                    reason: "not a sibling position",
                })
            },
        };

        self.open_gap(store, row.tree_id, pivot, 2)?;
        self.insert_row(store, id, NsRow {
            tree_id: row.tree_id,
            lft: pivot,
            rgt: pivot + 1,
            depth: row.depth,
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
        let tgt = self.lookup(store, target)?;

        if pos.is_child() && node == target {
            return Err(Error::InvalidMoveToDescendant);
        }
        if tgt.tree_id == moving.tree_id && tgt.lft > moving.lft && tgt.rgt < moving.rgt {
            return Err(Error::InvalidMoveToDescendant);
        }
        if node == target && matches!(pos, Position::Left | Position::Right) {
            // moving next to oneself changes nothing
            return Ok(());
        }

        // resolve the destination before cutting the subtree out, anchored on
        // rows that survive the contraction
        let dest = match pos {
            Position::FirstChild => Dest::FirstOf(Some(target)),
            Position::LastChild => Dest::LastOf(Some(target)),
            Position::SortedChild => Dest::SortedIn(Some(target)),
            Position::Left => Dest::LeftOf(target),
            Position::Right => Dest::RightOf(target),
            Position::FirstSibling | Position::LastSibling | Position::SortedSibling => {
                let parent = self.parent_row(store, &tgt)?.map(|(pk, _)| pk);
                match pos {
                    Position::FirstSibling => Dest::FirstOf(parent),
                    Position::LastSibling => Dest::LastOf(parent),
                    _ => Dest::SortedIn(parent),
                }
            },
        };

        // cut the subtree out: snapshot its rows, drop its index entries and
        // contract the interval it occupied
        let (lower, upper) = (
            Some(Bound::inclusive((moving.tree_id, moving.lft))),
            Some(Bound::exclusive((moving.tree_id, moving.rgt))),
        );
        let sub = self
            .by_pos
            .range(store, lower, upper, Order::Ascending)
            .collect::<StdResult<Vec<_>>>()?
            .into_iter()
            .map(|(_, pk)| Ok((pk, self.lookup(store, pk)?)))
            .collect::<Result<Vec<_>>>()?;
        for (_, r) in &sub {
            self.by_pos.remove(store, (r.tree_id, r.lft));
        }
        let gap = moving.rgt - moving.lft + 1;
        self.close_gap(store, moving.tree_id, moving.lft, gap)?;

        // land it
        let (new_tree, new_lft, new_depth) = match dest {
            Dest::FirstOf(Some(p)) | Dest::LastOf(Some(p)) | Dest::SortedIn(Some(p)) => {
                let prow = self.lookup(store, p)?;
                let pivot = match dest {
                    Dest::FirstOf(_) => prow.lft + 1,
                    Dest::LastOf(_) => prow.rgt,
                    _ => {
                        let key_fn = self.order_key().ok_or(Error::MissingNodeOrderBy)?;
                        match self.sorted_slot(store, Some(&prow), &key_fn(&moving.data))? {
                            Some((_, later)) => later.lft,
                            None => prow.rgt,
                        }
                    },
                };
                self.open_gap(store, prow.tree_id, pivot, gap)?;
                (prow.tree_id, pivot, prow.depth + 1)
            },
            Dest::LeftOf(sib) | Dest::RightOf(sib) => {
                let srow = self.lookup(store, sib)?;
                if srow.lft == 1 {
                    let last = self.last_tree_id(store)?;
                    let tree_id = match dest {
                        Dest::LeftOf(_) => self.make_root_slot(store, srow.tree_id)?,
                        _ if srow.tree_id == last => srow.tree_id + 1,
                        _ => self.make_root_slot(store, srow.tree_id + 1)?,
                    };
                    (tree_id, 1, 1)
                } else {
                    let pivot = match dest {
                        Dest::LeftOf(_) => srow.lft,
                        _ => srow.rgt + 1,
                    };
                    self.open_gap(store, srow.tree_id, pivot, gap)?;
                    (srow.tree_id, pivot, srow.depth)
                }
            },
            Dest::FirstOf(None) => (self.make_root_slot(store, 1)?, 1, 1),
            Dest::LastOf(None) => (self.last_tree_id(store)? + 1, 1, 1),
            Dest::SortedIn(None) => {
                let key_fn = self.order_key().ok_or(Error::MissingNodeOrderBy)?;
                let tree_id = match self.sorted_slot(store, None, &key_fn(&moving.data))? {
                    Some((_, later)) => self.make_root_slot(store, later.tree_id)?,
                    None => self.last_tree_id(store)? + 1,
                };
                (tree_id, 1, 1)
            },
        };

        // write the snapshot back at its new coordinates
        for (pk, mut r) in sub {
            r.tree_id = new_tree;
            r.lft = r.lft - moving.lft + new_lft;
            r.rgt = r.rgt - moving.lft + new_lft;
            r.depth = (r.depth as i64 + new_depth as i64 - moving.depth as i64) as u32;
            self.by_pos.save(store, (r.tree_id, r.lft), &pk)?;
            self.rows.save(store, pk, &r)?;
        }
        Ok(())
    }

    fn delete_many(&self, store: &mut dyn Storage, ids: &[u64]) -> Result<u64> {
        let mut targets = ids
            .iter()
            .map(|&id| self.lookup(store, id))
            .collect::<Result<Vec<_>>>()?;
        targets.sort_by_key(|r| (r.tree_id, r.lft));

        // minimal covering set; descendants follow their ancestor directly in
        // (tree_id, lft) order
        let mut kept: Vec<NsRow<D>> = vec![];
        for row in targets {
            let covered = kept.last().map_or(false, |k| {
                k.tree_id == row.tree_id && row.lft > k.lft && row.rgt < k.rgt
            });
            if !covered {
                kept.push(row);
            }
        }

        let mut count = 0;
        let mut ranges = vec![];
        for row in &kept {
            let (lower, upper) = (
                Some(Bound::inclusive((row.tree_id, row.lft))),
                Some(Bound::exclusive((row.tree_id, row.rgt))),
            );
            let doomed = self
                .by_pos
                .range(store, lower, upper, Order::Ascending)
                .collect::<StdResult<Vec<_>>>()?;
            for ((tree, lft), pk) in doomed {
                self.by_pos.remove(store, (tree, lft));
                self.rows.remove(store, pk);
                count += 1;
            }
            ranges.push((row.tree_id, row.lft, row.rgt));
        }

        // contract right to left, so earlier contractions do not shift the
        // reference points of later ones
        ranges.sort();
        for (tree_id, lft, rgt) in ranges.into_iter().rev() {
            self.close_gap(store, tree_id, lft, rgt - lft + 1)?;
        }
        Ok(count)
    }

    fn clear(&self, store: &mut dyn Storage) -> Result<u64> {
        let mut count = 0;
        loop {
            let page = self
                .by_pos
                .range(store, None, None, Order::Ascending)
                .take(PAGE_SIZE)
                .collect::<StdResult<Vec<_>>>()?;
            if page.is_empty() {
                return Ok(count);
            }
            for (key, pk) in page {
                self.by_pos.remove(store, key);
                self.rows.remove(store, pk);
                count += 1;
            }
        }
    }

    fn parent_id(&self, store: &dyn Storage, id: u64) -> Result<Option<u64>> {
        let row = self.lookup(store, id)?;
        Ok(self.parent_row(store, &row)?.map(|(pk, _)| pk))
    }

    fn root_ids(&self, store: &dyn Storage) -> Result<Vec<u64>> {
        Ok(self.root_entries(store)?.into_iter().map(|(_, pk)| pk).collect())
    }

    fn children_ids(&self, store: &dyn Storage, parent: Option<u64>) -> Result<Vec<u64>> {
        match parent {
            Some(id) => {
                let row = self.lookup(store, id)?;
                Ok(self
                    .child_rows(store, &row)?
                    .into_iter()
                    .map(|(pk, _)| pk)
                    .collect())
            },
            None => self.root_ids(store),
        }
    }

    fn children_count(&self, store: &dyn Storage, id: u64) -> Result<u64> {
        let row = self.lookup(store, id)?;
        Ok(self.child_rows(store, &row)?.len() as u64)
    }

    fn sibling_ids(&self, store: &dyn Storage, id: u64) -> Result<Vec<u64>> {
        let row = self.lookup(store, id)?;
        if row.lft == 1 {
            return self.root_ids(store);
        }
        match self.parent_row(store, &row)? {
            Some((pk, _)) => self.children_ids(store, Some(pk)),
            None => self.root_ids(store),
        }
    }

    fn ancestor_ids(&self, store: &dyn Storage, id: u64) -> Result<Vec<u64>> {
        let row = self.lookup(store, id)?;
        Ok(self
            .ancestor_rows(store, &row)?
            .into_iter()
            .map(|(pk, _)| pk)
            .collect())
    }

    fn descendant_ids(&self, store: &dyn Storage, id: u64) -> Result<Vec<u64>> {
        let row = self.lookup(store, id)?;
        let (lower, upper) = (
            Some(Bound::exclusive((row.tree_id, row.lft))),
            Some(Bound::exclusive((row.tree_id, row.rgt))),
        );
        self.by_pos
            .range(store, lower, upper, Order::Ascending)
            .map(|item| Ok(item?.1))
            .collect()
    }

    fn descendant_count(&self, store: &dyn Storage, id: u64) -> Result<u64> {
        let row = self.lookup(store, id)?;
        Ok((row.rgt - row.lft - 1) / 2)
    }

    fn tree_ids(&self, store: &dyn Storage, parent: Option<u64>) -> Result<Vec<u64>> {
        let (lower, upper) = match parent {
            Some(id) => {
                let row = self.lookup(store, id)?;
                (
                    Some(Bound::inclusive((row.tree_id, row.lft))),
                    Some(Bound::exclusive((row.tree_id, row.rgt))),
                )
            },
            None => (None, None),
        };
        self.by_pos
            .range(store, lower, upper, Order::Ascending)
            .map(|item| Ok(item?.1))
            .collect()
    }

    fn is_descendant(&self, store: &dyn Storage, id: u64, ancestor: u64) -> Result<bool> {
        let row = self.lookup(store, id)?;
        let anc = self.lookup(store, ancestor)?;
        Ok(row.tree_id == anc.tree_id && row.lft > anc.lft && row.rgt < anc.rgt)
    }

    fn group_counts(&self, store: &dyn Storage, parent: Option<u64>) -> Result<Vec<(u64, u64)>> {
        let group = match parent {
            Some(id) => {
                let row = self.lookup(store, id)?;
                self.child_rows(store, &row)?
            },
            None => self
                .root_entries(store)?
                .into_iter()
                .map(|(_, pk)| Ok((pk, self.lookup(store, pk)?)))
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(group
            .into_iter()
            .map(|(pk, r)| (pk, (r.rgt - r.lft - 1) / 2))
            .collect())
    }

    fn find_problems(&self, store: &dyn Storage) -> Result<Problems> {
        let mut problems = Problems::default();
        let entries = self
            .by_pos
            .range(store, None, None, Order::Ascending)
            .collect::<StdResult<Vec<_>>>()?;

        let mut current_tree = 0;
        let mut stack: Vec<(u64, u64)> = vec![];
        let mut edge_count = 0u64;
        let mut max_edge = 0u64;
        let mut tree_first_pk = 0u64;

        let flush_tree = |problems: &mut Problems, count: u64, max: u64, first: u64| {
            if count > 0 && max != 2 * count {
                // the interval numbers of a balanced tree tile 1..=2n
                problems.bad_structure.push(first);
            }
        };

        for ((tree, lft), pk) in entries {
            if tree != current_tree {
                flush_tree(&mut problems, edge_count, max_edge, tree_first_pk);
                current_tree = tree;
                stack.clear();
                edge_count = 0;
                max_edge = 0;
                tree_first_pk = pk;
            }
            let row = self.lookup(store, pk)?;
            edge_count += 1;
            max_edge = max_edge.max(row.rgt);

            if row.lft != lft || row.lft >= row.rgt || row.tree_id != tree {
                problems.bad_structure.push(pk);
                continue;
            }
            while stack.last().map_or(false, |&(_, rgt)| rgt < row.lft) {
                stack.pop();
            }
            if let Some(&(_, parent_rgt)) = stack.last() {
                if row.rgt > parent_rgt {
                    problems.bad_structure.push(pk);
                    continue;
                }
            } else if row.lft != 1 {
                problems.bad_structure.push(pk);
                continue;
            }
            let derived_depth = stack.len() as u32 + 1;
            stack.push((row.lft, row.rgt));
            if row.depth != derived_depth {
                problems.bad_depth.push(pk);
            }
        }
        flush_tree(&mut problems, edge_count, max_edge, tree_first_pk);

        Ok(problems)
    }

    fn repair(&self, store: &mut dyn Storage) -> Result<()> {
        // renumber every tree into a dense 1..=2n interval set, deriving the
        // nesting from the current intervals
        for (tree, _) in self.root_entries(store)? {
            let (lower, upper) = Self::tree_bounds(tree);
            let entries = self
                .by_pos
                .range(store, lower, upper, Order::Ascending)
                .collect::<StdResult<Vec<_>>>()?
                .into_iter()
                .map(|(_, pk)| Ok((pk, self.lookup(store, pk)?)))
                .collect::<Result<Vec<_>>>()?;

            // DFS simulation: a counter ticks on every entry and every exit
            let mut counter = 0u64;
            let mut stack: Vec<(usize, u64)> = vec![];
            let mut fixed: Vec<NsRow<D>> = vec![];
            let mut pks = vec![];
            for (pk, row) in &entries {
                while stack.last().map_or(false, |&(_, old_rgt)| old_rgt < row.lft) {
                    let (i, _) = stack.pop().unwrap();
                    counter += 1;
                    fixed[i].rgt = counter;
                }
                counter += 1;
                pks.push(*pk);
                fixed.push(NsRow {
                    tree_id: tree,
                    lft: counter,
                    rgt: 0,
                    depth: stack.len() as u32 + 1,
                    data: row.data.clone(),
                });
                stack.push((fixed.len() - 1, row.rgt));
            }
            while let Some((i, _)) = stack.pop() {
                counter += 1;
                fixed[i].rgt = counter;
            }

            for (_, row) in &entries {
                self.by_pos.remove(store, (tree, row.lft));
            }
            for (pk, row) in pks.into_iter().zip(fixed) {
                self.by_pos.save(store, (tree, row.lft), &pk)?;
                self.rows.save(store, pk, &row)?;
            }
        }
        Ok(())
    }
}

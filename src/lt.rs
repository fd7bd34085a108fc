use {
    crate::{
        engine::TreeEngine,
        error::{Error, Result},
        types::{LabelPath, OrderKey, Position, Problems},
    },
    cosmwasm_std::{Order, StdResult, Storage},
    cw_storage_plus::{Bound, Item, Map},
    serde::{de::DeserializeOwned, Deserialize, Serialize},
    std::collections::HashSet,
};

const PAGE_SIZE: usize = 32;

/// How often an insertion may trigger a shift-right rebalance before the
/// engine falls back to relabelling the whole sibling group.
const MAX_SHIFTS: usize = 2;

// the label alphabet is [0-9A-Z]; digit successors roll over into letters
fn next_symbol(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'8' | b'A'..=b'Y' => Some(b + 1),
        b'9' => Some(b'A'),
        _ => None,
    }
}

/// Advance `cand` to the next admissible candidate of the same length:
/// increment the rightmost position that still can, reset everything after it
/// to its per-position minimum. Returns false when the length is exhausted.
fn bump(cand: &mut [u8], min_at: impl Fn(usize) -> u8) -> bool {
    for j in (0..cand.len()).rev() {
        if let Some(next) = next_symbol(cand[j]) {
            cand[j] = next;
            for k in j + 1..cand.len() {
                cand[k] = min_at(k);
            }
            return true;
        }
    }
    false
}

/// Generate the smallest label strictly between `after` and `before` (either
/// may be absent) that is not in `skip`, under lexicographic string order.
///
/// The label alphabet is `[A-Z]` when unconstrained; a constraint widens it
/// to `[0-9A-Z]`, keeping the digits in reserve so that an insertion to the
/// left of any letter label always has room.
///
/// Candidates are enumerated shortest first, each length starting from the
/// smallest string that beats `after`, and positions where `before` and
/// `after` agree are never revisited; the whole search is linear in the
/// constraint lengths (plus one probe per skipped label), never a Cartesian
/// sweep of the alphabet.
pub fn generate_label(
    before: Option<&str>,
    after: Option<&str>,
    skip: &HashSet<String>,
) -> Result<String> {
    let constrained = before.is_some() || after.is_some();
    let floor = if constrained { b'0' } else { b'A' };

    let start: Vec<u8> = match after {
        Some(a) => a.as_bytes().to_vec(),
        None => vec![floor],
    };

    if let Some(b) = before {
        if b.as_bytes() <= start.as_slice() {
            return Err(Error::InvalidLabelConstraints);
        }
    }

    // a candidate shorter than the shared before/after prefix can never fit
    // between the two
    let start_from = match (before, after) {
        (Some(b), Some(a)) => b.bytes().zip(a.bytes()).take_while(|(x, y)| x == y).count(),
        _ => 0,
    };

    let min_at = |i: usize| start.get(i).copied().unwrap_or(floor);

    for len in (start_from + 1)..=(start.len() + 1) {
        let mut cand: Vec<u8> = if after.is_none() {
            (0..len).map(min_at).collect()
        } else if len <= start.len() {
            // the successor of after's prefix of this length; equal-or-below
            // candidates can never beat `after`
            let mut c = start[..len].to_vec();
            if !bump(&mut c, min_at) {
                continue;
            }
            c
        } else {
            let mut c = start.clone();
            c.push(floor);
            c
        };

        loop {
            if let Some(b) = before {
                if cand.as_slice() >= b.as_bytes() {
                    break;
                }
            }
            let label = cand.iter().copied().map(char::from).collect::<String>();
            if !skip.contains(&label) {
                return Ok(label);
            }
            if !bump(&mut cand, min_at) {
                break;
            }
        }
    }

    Err(Error::InvalidLabelConstraints)
}

/// One row of an ltree table. The path is the only bookkeeping column; depth
/// and sibling order both derive from it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LtRow<D> {
    pub path: LabelPath,
    pub data: D,
}

/// The ltree engine.
///
/// Sibling order is the lexicographic order of variable-width label paths,
/// and labels are generated so that an insertion between any two neighbours
/// finds room without touching other rows. When a neighbourhood is packed
/// solid, the offending sibling and everything right of it grow their label
/// by one letter (the shift-right rebalance); if even that fails twice, the
/// whole sibling group is relabelled from scratch, so insertion never
/// overflows.
pub struct LtTree<'a, D> {
    order_by: Option<fn(&D) -> OrderKey>,
    seq: Item<'a, u64>,
    rows: Map<'a, u64, LtRow<D>>,
    by_path: Map<'a, String, u64>,
}

impl<'a, D> LtTree<'a, D> {
    pub const fn new(
        row_namespace: &'a str,
        path_namespace: &'a str,
        seq_namespace: &'a str,
    ) -> Self {
        Self {
            order_by: None,
            seq: Item::new(seq_namespace),
            rows: Map::new(row_namespace),
            by_path: Map::new(path_namespace),
        }
    }

    /// Keep all sibling groups sorted by the given key extraction.
    pub const fn ordered_by(mut self, key: fn(&D) -> OrderKey) -> Self {
        self.order_by = Some(key);
        self
    }
}

impl<'a, D> LtTree<'a, D>
where
    D: Serialize + DeserializeOwned + Clone,
{
    fn lookup(&self, store: &dyn Storage, id: u64) -> Result<LtRow<D>> {
        self.rows
            .may_load(store, id)?
            .ok_or(Error::NotFound { id })
    }

    fn pk_at(&self, store: &dyn Storage, path: &LabelPath) -> Result<u64> {
        self.by_path
            .may_load(store, path.to_string())?
            .ok_or_else(|| Error::Corrupted {
                detail: format!("no row at path {path:?}"),
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

    /// Bounds covering a path and its whole subtree. The `/` sentinel sorts
    /// between the dot separator and every label symbol.
    fn branch_bounds(path: &LabelPath) -> (Option<Bound<'a, String>>, Option<Bound<'a, String>>) {
        let dotted = path.to_string().into_bytes();
        let mut upper = dotted.clone();
        upper.push(b'/');
        (Some(Bound::InclusiveRaw(dotted)), Some(Bound::ExclusiveRaw(upper)))
    }

    /// Bounds covering only the strict descendants.
    fn subtree_bounds(path: &LabelPath) -> (Option<Bound<'a, String>>, Option<Bound<'a, String>>) {
        let (_, upper) = Self::branch_bounds(path);
        let mut lower = path.to_string().into_bytes();
        lower.push(b'.');
        (Some(Bound::InclusiveRaw(lower)), upper)
    }

    /// Walk the children of a prefix (the roots, for an empty prefix) in
    /// label order, hopping over each child's subtree.
    fn child_entries(
        &self,
        store: &dyn Storage,
        prefix: &LabelPath,
    ) -> Result<Vec<(LabelPath, u64)>> {
        let child_len = prefix.len() + 1;
        let (mut lower, upper) = if prefix.is_empty() {
            (None, None)
        } else {
            Self::subtree_bounds(prefix)
        };

        let mut out = vec![];
        loop {
            let Some(entry) = self
                .by_path
                .range(store, lower.take(), upper.clone(), Order::Ascending)
                .next()
            else {
                break;
            };
            let (key, _) = entry?;
            let child = LabelPath::parse(&key).crop(child_len);

            if let Some(pk) = self.by_path.may_load(store, child.to_string())? {
                out.push((child.clone(), pk));
            }

            let mut skip_past = child.to_string().into_bytes();
            skip_past.push(b'/');
            lower = Some(Bound::InclusiveRaw(skip_past));
        }
        Ok(out)
    }

    fn sibling_entries(&self, store: &dyn Storage, path: &LabelPath) -> Result<Vec<(LabelPath, u64)>> {
        self.child_entries(store, &path.parent())
    }

    /// Rewrite a whole branch under a new prefix, one bounded batch at a
    /// time. The destination must lie outside the branch.
    fn rewrite_subtree(
        &self,
        store: &mut dyn Storage,
        old: &LabelPath,
        new: &LabelPath,
    ) -> Result<()> {
        if old == new {
            return Ok(());
        }

        loop {
            let (lower, upper) = Self::branch_bounds(old);
            let page = self
                .by_path
                .range(store, lower, upper, Order::Ascending)
                .take(PAGE_SIZE)
                .collect::<StdResult<Vec<_>>>()?;
            if page.is_empty() {
                return Ok(());
            }

            for (key, pk) in page {
                let moved = LabelPath::parse(&key).replace_prefix(old.len(), new);
                let mut row = self.lookup(store, pk)?;
                row.path = moved.clone();
                self.rows.save(store, pk, &row)?;
                self.by_path.remove(store, key);
                self.by_path.save(store, moved.to_string(), &pk)?;
            }
        }
    }

    /// The shift-right rebalance: append an `A` to the last label of `from`
    /// and of every sibling to its right, rightmost first, carrying the
    /// change into all their descendants.
    fn shift_right(&self, store: &mut dyn Storage, from: &LabelPath) -> Result<()> {
        let prefix = from.parent();
        let group = self.sibling_entries(store, from)?;
        for (path, _) in group.into_iter().rev() {
            if path < *from {
                break;
            }
            let widened = prefix.child(format!("{}A", path.last_label()));
            self.rewrite_subtree(store, &path, &widened)?;
        }
        Ok(())
    }

    /// The deterministic last resort: give the whole sibling group fresh
    /// ascending letter labels. Goes through throwaway labels first so no
    /// rewrite can collide with a label still in use.
    fn relabel_group(
        &self,
        store: &mut dyn Storage,
        prefix: &LabelPath,
        group: &[(LabelPath, u64)],
    ) -> Result<()> {
        let widest = group
            .iter()
            .map(|(p, _)| p.last_label().len())
            .max()
            .unwrap_or(0);

        let temp = |i: usize| format!("{}{i}", "0".repeat(widest + 1));
        for (i, (path, _)) in group.iter().enumerate() {
            self.rewrite_subtree(store, path, &prefix.child(temp(i)))?;
        }
        for (i, _) in group.iter().enumerate() {
            let fresh = format!(
                "{}{}",
                "Z".repeat(i / 25),
                char::from(b'A' + (i % 25) as u8)
            );
            self.rewrite_subtree(store, &prefix.child(temp(i)), &prefix.child(fresh))?;
        }
        Ok(())
    }

    /// Generate the path for an insertion between the `after` and `before`
    /// siblings under `prefix`, rebalancing as needed.
    fn place_label(
        &self,
        store: &mut dyn Storage,
        prefix: &LabelPath,
        mut before: Option<LabelPath>,
        after: Option<LabelPath>,
    ) -> Result<LabelPath> {
        let mut shifts = 0;
        loop {
            let skip = self
                .child_entries(store, prefix)?
                .into_iter()
                .map(|(p, _)| p.last_label().to_string())
                .collect::<HashSet<_>>();

            match generate_label(
                before.as_ref().map(|p| p.last_label()),
                after.as_ref().map(|p| p.last_label()),
                &skip,
            ) {
                Ok(label) => return Ok(prefix.child(label)),
                Err(Error::InvalidLabelConstraints) if before.is_some() && shifts < MAX_SHIFTS => {
                    let b = before.take().ok_or(Error::InvalidLabelConstraints)?;
                    self.shift_right(store, &b)?;
                    before = Some(prefix.child(format!("{}A", b.last_label())));
                    shifts += 1;
                },
                Err(Error::InvalidLabelConstraints) if before.is_some() => break,
                Err(err) => return Err(err),
            }
        }

        // the rebalance did not free a slot; relabel the group outright and
        // place against the fresh labels, tracking the neighbours by their
        // position in the group
        let group = self.child_entries(store, prefix)?;
        let index_of = |needle: &Option<LabelPath>| -> Result<Option<usize>> {
            match needle {
                None => Ok(None),
                Some(p) => group
                    .iter()
                    .position(|(path, _)| path == p)
                    .map(Some)
                    .ok_or_else(|| Error::Corrupted {
                        detail: format!("{p:?} is not part of its sibling group"),
                    }),
            }
        };
        let before_at = index_of(&before)?;
        let after_at = index_of(&after)?;

        self.relabel_group(store, prefix, &group)?;

        let fresh = self.child_entries(store, prefix)?;
        let label = generate_label(
            before_at.map(|i| fresh[i].0.last_label()),
            after_at.map(|i| fresh[i].0.last_label()),
            &fresh.iter().map(|(p, _)| p.last_label().to_string()).collect(),
        )?;
        Ok(prefix.child(label))
    }

    /// Resolve the `(before, after)` neighbours of an insertion at `pos`
    /// relative to the sibling at `anchor` within `group`.
    fn anchors(
        &self,
        store: &dyn Storage,
        group: &[(LabelPath, u64)],
        anchor: &LabelPath,
        pos: Position,
        data: &D,
    ) -> Result<(Option<LabelPath>, Option<LabelPath>)> {
        let idx = group
            .iter()
            .position(|(p, _)| p == anchor)
            .ok_or_else(|| Error::Corrupted {
                detail: format!("{anchor:?} is not part of its sibling group"),
            })?;

        let path_at = |i: usize| group.get(i).map(|(p, _)| p.clone());
        Ok(match pos {
            Position::FirstSibling => (path_at(0), None),
            Position::Left => (Some(anchor.clone()), idx.checked_sub(1).and_then(path_at)),
            Position::Right => (path_at(idx + 1), Some(anchor.clone())),
            Position::LastSibling => (None, path_at(group.len().saturating_sub(1))),
            Position::SortedSibling | Position::SortedChild => {
                self.sorted_anchors(store, group, data)?
            },
            _ => {
                return Err(Error::InvalidPosition {
                    pos,
                    reason: "not a resolvable sibling position",
                })
            },
        })
    }

    /// The sorted insertion point: before the leftmost sibling comparing
    /// after the new key, or after the last sibling when none does.
    fn sorted_anchors(
        &self,
        store: &dyn Storage,
        group: &[(LabelPath, u64)],
        data: &D,
    ) -> Result<(Option<LabelPath>, Option<LabelPath>)> {
        let key_fn = self.order_key().ok_or(Error::MissingNodeOrderBy)?;
        let key = key_fn(data);
        for (i, (path, pk)) in group.iter().enumerate() {
            let row = self.lookup(store, *pk)?;
            if key_fn(&row.data) > key {
                let after = i.checked_sub(1).and_then(|j| group.get(j)).map(|(p, _)| p.clone());
                return Ok((Some(path.clone()), after));
            }
        }
        Ok((None, group.last().map(|(p, _)| p.clone())))
    }

    fn insert_row(
        &self,
        store: &mut dyn Storage,
        id: Option<u64>,
        path: LabelPath,
        data: D,
    ) -> Result<u64> {
        let pk = self.alloc_id(store, id)?;
        if self.by_path.has(store, path.to_string()) {
            return Err(Error::Corrupted {
                detail: format!("path {path:?} is already taken"),
            });
        }
        self.by_path.save(store, path.to_string(), &pk)?;
        self.rows.save(store, pk, &LtRow { path, data })?;
        Ok(pk)
    }
}

impl<'a, D> TreeEngine for LtTree<'a, D>
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
        Ok(self.lookup(store, id)?.path.len() as u32)
    }

    fn add_root(&self, store: &mut dyn Storage, data: D, id: Option<u64>) -> Result<u64> {
        let roots = self.child_entries(store, &LabelPath::empty())?;

        if let (Some((_, last_pk)), Some(_)) = (roots.last(), self.order_by) {
            return self.add_sibling(store, *last_pk, Position::SortedSibling, data, id);
        }

        let after = roots.last().map(|(p, _)| p.clone());
        let path = self.place_label(store, &LabelPath::empty(), None, after)?;
        self.insert_row(store, id, path, data)
    }

    fn add_child(
        &self,
        store: &mut dyn Storage,
        parent: u64,
        data: D,
        id: Option<u64>,
    ) -> Result<u64> {
        let prow = self.lookup(store, parent)?;
        let children = self.child_entries(store, &prow.path)?;

        if let (Some((_, last_pk)), Some(_)) = (children.last(), self.order_by) {
            return self.add_sibling(store, *last_pk, Position::SortedSibling, data, id);
        }

        let after = children.last().map(|(p, _)| p.clone());
        let path = self.place_label(store, &prow.path, None, after)?;
        self.insert_row(store, id, path, data)
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
        let prefix = row.path.parent();
        let group = self.child_entries(store, &prefix)?;
        let (before, after) = self.anchors(store, &group, &row.path, pos, &data)?;

        let path = self.place_label(store, &prefix, before, after)?;
        self.insert_row(store, id, path, data)
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
        if tgt.path.starts_with(&moving.path) && tgt.path != moving.path {
            return Err(Error::InvalidMoveToDescendant);
        }

        let (prefix, before, after) = if pos.is_child() {
            let children = self.child_entries(store, &tgt.path)?;
            let (before, after) = match pos {
                Position::FirstChild => (children.first().map(|(p, _)| p.clone()), None),
                Position::LastChild => (None, children.last().map(|(p, _)| p.clone())),
                _ => self.sorted_anchors(store, &children, &moving.data)?,
            };
            (tgt.path.clone(), before, after)
        } else {
            let prefix = tgt.path.parent();
            let group = self.child_entries(store, &prefix)?;
            let (before, after) = self.anchors(store, &group, &tgt.path, pos, &moving.data)?;
            (prefix, before, after)
        };

        let new_path = self.place_label(store, &prefix, before, after)?;

        // a rebalance may have moved the node along with its group
        let moving = self.lookup(store, node)?;
        self.rewrite_subtree(store, &moving.path, &new_path)
    }

    fn delete_many(&self, store: &mut dyn Storage, ids: &[u64]) -> Result<u64> {
        let mut targets = ids
            .iter()
            .map(|&id| Ok(self.lookup(store, id)?.path))
            .collect::<Result<Vec<_>>>()?;
        targets.sort();

        // minimal covering set: descendants of other doomed paths are
        // already taken care of
        let mut kept: Vec<LabelPath> = vec![];
        for path in targets {
            if !kept.iter().any(|k| path.starts_with(k)) {
                kept.push(path);
            }
        }

        let mut count = 0;
        for path in kept {
            loop {
                let (lower, upper) = Self::branch_bounds(&path);
                let page = self
                    .by_path
                    .range(store, lower, upper, Order::Ascending)
                    .take(PAGE_SIZE)
                    .collect::<StdResult<Vec<_>>>()?;
                if page.is_empty() {
                    break;
                }
                for (key, pk) in page {
                    self.rows.remove(store, pk);
                    self.by_path.remove(store, key);
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    fn clear(&self, store: &mut dyn Storage) -> Result<u64> {
        let mut count = 0;
        loop {
            let page = self
                .by_path
                .range(store, None, None, Order::Ascending)
                .take(PAGE_SIZE)
                .collect::<StdResult<Vec<_>>>()?;
            if page.is_empty() {
                return Ok(count);
            }
            for (key, pk) in page {
                self.rows.remove(store, pk);
                self.by_path.remove(store, key);
                count += 1;
            }
        }
    }

    fn parent_id(&self, store: &dyn Storage, id: u64) -> Result<Option<u64>> {
        let row = self.lookup(store, id)?;
        if row.path.is_root() {
            return Ok(None);
        }
        self.pk_at(store, &row.path.parent()).map(Some)
    }

    fn root_ids(&self, store: &dyn Storage) -> Result<Vec<u64>> {
        self.children_ids(store, None)
    }

    fn children_ids(&self, store: &dyn Storage, parent: Option<u64>) -> Result<Vec<u64>> {
        let prefix = match parent {
            Some(id) => self.lookup(store, id)?.path,
            None => LabelPath::empty(),
        };
        Ok(self
            .child_entries(store, &prefix)?
            .into_iter()
            .map(|(_, pk)| pk)
            .collect())
    }

    fn children_count(&self, store: &dyn Storage, id: u64) -> Result<u64> {
        let row = self.lookup(store, id)?;
        Ok(self.child_entries(store, &row.path)?.len() as u64)
    }

    fn sibling_ids(&self, store: &dyn Storage, id: u64) -> Result<Vec<u64>> {
        let row = self.lookup(store, id)?;
        Ok(self
            .sibling_entries(store, &row.path)?
            .into_iter()
            .map(|(_, pk)| pk)
            .collect())
    }

    fn ancestor_ids(&self, store: &dyn Storage, id: u64) -> Result<Vec<u64>> {
        let row = self.lookup(store, id)?;
        let mut out = vec![];
        for len in 1..row.path.len() {
            out.push(self.pk_at(store, &row.path.crop(len))?);
        }
        Ok(out)
    }

    fn descendant_ids(&self, store: &dyn Storage, id: u64) -> Result<Vec<u64>> {
        let row = self.lookup(store, id)?;
        let (lower, upper) = Self::subtree_bounds(&row.path);
        self.by_path
            .range(store, lower, upper, Order::Ascending)
            .map(|item| Ok(item?.1))
            .collect()
    }

    fn tree_ids(&self, store: &dyn Storage, parent: Option<u64>) -> Result<Vec<u64>> {
        let (lower, upper) = match parent {
            Some(id) => {
                let row = self.lookup(store, id)?;
                Self::branch_bounds(&row.path)
            },
            None => (None, None),
        };
        self.by_path
            .range(store, lower, upper, Order::Ascending)
            .map(|item| Ok(item?.1))
            .collect()
    }

    fn is_descendant(&self, store: &dyn Storage, id: u64, ancestor: u64) -> Result<bool> {
        let row = self.lookup(store, id)?;
        let anc = self.lookup(store, ancestor)?;
        Ok(row.path.starts_with(&anc.path) && row.path.len() > anc.path.len())
    }

    fn group_counts(&self, store: &dyn Storage, parent: Option<u64>) -> Result<Vec<(u64, u64)>> {
        let (base_len, lower, upper) = match parent {
            Some(id) => {
                let row = self.lookup(store, id)?;
                let (lower, upper) = Self::subtree_bounds(&row.path);
                (row.path.len(), lower, upper)
            },
            None => (0, None, None),
        };
        let child_len = base_len + 1;

        let mut out: Vec<(u64, u64)> = vec![];
        let mut current: Option<String> = None;
        for item in self.by_path.range(store, lower, upper, Order::Ascending) {
            let (key, pk) = item?;
            let path = LabelPath::parse(&key);
            if path.len() == child_len {
                current = Some(format!("{key}."));
                out.push((pk, 0));
            } else if let (Some(prefix), Some(slot)) = (&current, out.last_mut()) {
                if key.starts_with(prefix.as_str()) {
                    slot.1 += 1;
                }
            }
        }
        Ok(out)
    }

    fn find_problems(&self, store: &dyn Storage) -> Result<Problems> {
        let mut problems = Problems::default();
        let entries = self
            .rows
            .range(store, None, None, Order::Ascending)
            .collect::<StdResult<Vec<_>>>()?;

        for (pk, row) in entries {
            if row.path.labels().iter().any(|label| {
                !label.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
            }) {
                problems.bad_characters.push(pk);
                continue;
            }
            if !row.path.is_well_formed()
                || self.by_path.may_load(store, row.path.to_string())? != Some(pk)
            {
                problems.bad_structure.push(pk);
                continue;
            }
            if !row.path.is_root() && !self.by_path.has(store, row.path.parent().to_string()) {
                problems.orphans.push(pk);
            }
        }
        Ok(problems)
    }

    fn repair(&self, _store: &mut dyn Storage) -> Result<()> {
        // nothing is denormalised: depth and order both live in the path.
        // restructuring repairs go through a dump and reload instead.
        Ok(())
    }
}

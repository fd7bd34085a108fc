use {
    crate::{
        engine::TreeEngine,
        error::{Error, Result},
        numconv::{NumConv, BASE36},
        types::{OrderKey, Position, Problems},
    },
    cosmwasm_std::{Order, StdResult, Storage},
    cw_storage_plus::{Bound, Item, Map},
    serde::{de::DeserializeOwned, Deserialize, Serialize},
};

/// How many index entries a branch rewrite touches per write batch.
const PAGE_SIZE: usize = 32;

/// One row of a materialized path table.
///
/// `path` is the concatenation of the fixed-width step codes of all ancestors
/// plus the node's own; `depth` and `numchild` are denormalisations kept in
/// sync by the engine.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MpRow<D> {
    pub path: String,
    pub depth: u32,
    pub numchild: u32,
    pub data: D,
}

/// The materialized path tree engine.
///
/// Every node stores the full root-to-node path as a fixed-width encoded
/// string, so sibling order is raw string order and a subtree is a
/// starts-with range of the path index. Insertions left of an existing
/// sibling shift all subsequent sibling branches one step to the right;
/// everything else is append-only.
///
/// Works like the other storage primitives in this crate: declare it as a
/// constant, hand it a `Storage` per call.
///
/// ```rust
/// use arbor::{Forest, MpTree};
///
/// const TREE: Forest<MpTree<String>> = Forest::new(MpTree::new("r", "p", "s"));
/// ```
pub struct MpTree<'a, D> {
    steplen: usize,
    alphabet: &'a str,
    max_path_len: usize,
    order_by: Option<fn(&D) -> OrderKey>,
    seq: Item<'a, u64>,
    rows: Map<'a, u64, MpRow<D>>,
    by_path: Map<'a, String, u64>,
}

impl<'a, D> MpTree<'a, D> {
    /// A tree with the default configuration: step width 4 (1.6M children
    /// per node), the base-36 alphabet, paths up to 255 symbols (63 levels).
    pub const fn new(
        row_namespace: &'a str,
        path_namespace: &'a str,
        seq_namespace: &'a str,
    ) -> Self {
        Self {
            steplen: 4,
            alphabet: BASE36,
            max_path_len: 255,
            order_by: None,
            seq: Item::new(seq_namespace),
            rows: Map::new(row_namespace),
            by_path: Map::new(path_namespace),
        }
    }

    /// Trade maximum depth for children per node. Wider steps mean more
    /// children and shallower trees.
    pub const fn with_steplen(mut self, steplen: usize) -> Self {
        self.steplen = steplen;
        self
    }

    /// Use a custom step alphabet. It must be unique ascii in ascending byte
    /// order, or every operation will refuse to run.
    pub const fn with_alphabet(mut self, alphabet: &'a str) -> Self {
        self.alphabet = alphabet;
        self
    }

    pub const fn with_max_path_len(mut self, max_path_len: usize) -> Self {
        self.max_path_len = max_path_len;
        self
    }

    /// Keep all sibling groups sorted by the given key extraction. Once set,
    /// insertion positions are computed, not supplied.
    pub const fn ordered_by(mut self, key: fn(&D) -> OrderKey) -> Self {
        self.order_by = Some(key);
        self
    }
}

impl<'a, D> MpTree<'a, D>
where
    D: Serialize + DeserializeOwned + Clone,
{
    fn conv(&self) -> Result<NumConv> {
        let conv = NumConv::new(self.alphabet)?;
        if !conv.is_byte_ordered() {
            return Err(Error::InvalidAlphabet);
        }
        Ok(conv)
    }

    fn lookup(&self, store: &dyn Storage, id: u64) -> Result<MpRow<D>> {
        self.rows
            .may_load(store, id)?
            .ok_or(Error::NotFound { id })
    }

    fn pk_at(&self, store: &dyn Storage, path: &str) -> Result<u64> {
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

    // ---------------------------------------------------------- path algebra

    fn basepath(path: &str, len: usize) -> &str {
        &path[..len.min(path.len())]
    }

    /// The parent prefix; empty for a root path.
    fn parent_path<'b>(&self, path: &'b str) -> &'b str {
        Self::basepath(path, path.len().saturating_sub(self.steplen))
    }

    fn format_step(&self, conv: &NumConv, step: u64) -> Result<String> {
        let key = conv.encode(step, self.steplen)?;
        let pad = char::from(self.alphabet.as_bytes()[0]);
        let mut out = String::with_capacity(self.steplen);
        for _ in key.len()..self.steplen {
            out.push(pad);
        }
        out.push_str(&key);
        Ok(out)
    }

    /// Append a step to a parent prefix, checking the path width limit.
    fn make_path(&self, parent: &str, step: u64) -> Result<String> {
        let conv = self.conv()?;
        let path = format!("{parent}{}", self.format_step(&conv, step)?);
        if path.len() > self.max_path_len {
            return Err(Error::CapacityExceeded {
                reason: format!("path {path:?} is wider than {} symbols", self.max_path_len),
            });
        }
        Ok(path)
    }

    /// The path of the next sibling slot after `path`.
    fn inc_path(&self, path: &str) -> Result<String> {
        let conv = self.conv()?;
        let cut = path.len() - self.steplen;
        let step = conv.decode(&path[cut..])? + 1;
        Ok(format!("{}{}", &path[..cut], self.format_step(&conv, step)?))
    }

    fn last_step(&self, path: &str) -> Result<u64> {
        self.conv()?.decode(&path[path.len() - self.steplen..])
    }

    /// Bounds covering a path and its whole branch.
    fn branch_bounds(path: &str) -> (Option<Bound<'a, String>>, Option<Bound<'a, String>>) {
        let mut upper = path.as_bytes().to_vec();
        upper.push(0xff);
        (
            Some(Bound::InclusiveRaw(path.as_bytes().to_vec())),
            Some(Bound::ExclusiveRaw(upper)),
        )
    }

    /// Bounds covering the strict descendants of a path.
    fn subtree_bounds(path: &str) -> (Option<Bound<'a, String>>, Option<Bound<'a, String>>) {
        let (_, upper) = Self::branch_bounds(path);
        (Some(Bound::ExclusiveRaw(path.as_bytes().to_vec())), upper)
    }

    // ------------------------------------------------------------ index scans

    /// Walk the children of a parent prefix (the roots, for an empty prefix)
    /// in path order, skipping over each child's subtree. Orphaned branches
    /// whose child-level row is missing are passed over.
    fn child_entries(&self, store: &dyn Storage, parent: &str) -> Result<Vec<(String, u64)>> {
        let child_len = parent.len() + self.steplen;
        let (mut lower, upper) = if parent.is_empty() {
            (None, None)
        } else {
            Self::subtree_bounds(parent)
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
            let (path, _) = entry?;

            let Some(child_path) = path.get(..child_len) else {
                // a malformed short path; step over it
                lower = Some(Bound::ExclusiveRaw(path.into_bytes()));
                continue;
            };

            if let Some(pk) = self.by_path.may_load(store, child_path.to_string())? {
                out.push((child_path.to_string(), pk));
            }

            let mut skip = child_path.as_bytes().to_vec();
            skip.push(0xff);
            lower = Some(Bound::InclusiveRaw(skip));
        }
        Ok(out)
    }

    fn last_root_path(&self, store: &dyn Storage) -> Result<Option<String>> {
        let Some(entry) = self.by_path.range(store, None, None, Order::Descending).next() else {
            return Ok(None);
        };
        let (path, _) = entry?;
        Ok(path.get(..self.steplen).map(str::to_string))
    }

    fn last_child_path(&self, store: &dyn Storage, parent: &str) -> Result<Option<String>> {
        let child_len = parent.len() + self.steplen;
        let (lower, upper) = Self::subtree_bounds(parent);
        let Some(entry) = self
            .by_path
            .range(store, lower, upper, Order::Descending)
            .next()
        else {
            return Ok(None);
        };
        let (path, _) = entry?;
        Ok(path.get(..child_len).map(str::to_string))
    }

    /// The rightmost member of `path`'s sibling group.
    fn last_sibling_path(&self, store: &dyn Storage, path: &str) -> Result<String> {
        let parent = self.parent_path(path);
        let last = if parent.is_empty() {
            self.last_root_path(store)?
        } else {
            self.last_child_path(store, parent)?
        };
        last.ok_or_else(|| Error::Corrupted {
            detail: format!("sibling group of {path:?} is empty"),
        })
    }

    fn sibling_entries(&self, store: &dyn Storage, path: &str) -> Result<Vec<(String, u64)>> {
        self.child_entries(store, self.parent_path(path))
    }

    // --------------------------------------------------------- branch rewrite

    /// Replace the `oldpath` prefix with `newpath` on the whole branch,
    /// recomputing the depth column from the new path length. This is the
    /// single range-update of the encoding, applied in bounded batches.
    fn rewrite_branch(&self, store: &mut dyn Storage, oldpath: &str, newpath: &str) -> Result<()> {
        if oldpath == newpath {
            return Ok(());
        }

        loop {
            let (lower, upper) = Self::branch_bounds(oldpath);
            let page = self
                .by_path
                .range(store, lower, upper, Order::Ascending)
                .take(PAGE_SIZE)
                .collect::<StdResult<Vec<_>>>()?;
            if page.is_empty() {
                return Ok(());
            }

            for (path, pk) in page {
                let moved = format!("{newpath}{}", &path[oldpath.len()..]);
                if moved.len() > self.max_path_len {
                    return Err(Error::CapacityExceeded {
                        reason: format!(
                            "path {moved:?} is wider than {} symbols",
                            self.max_path_len,
                        ),
                    });
                }
                let mut row = self.lookup(store, pk)?;
                row.depth = (moved.len() / self.steplen) as u32;
                row.path = moved.clone();
                self.rows.save(store, pk, &row)?;
                self.by_path.remove(store, path);
                self.by_path.save(store, moved, &pk)?;
            }
        }
    }

    /// Delete a node and its whole branch, returning the number of rows
    /// removed.
    fn drop_branch(&self, store: &mut dyn Storage, path: &str) -> Result<u64> {
        let mut count = 0;
        loop {
            let (lower, upper) = Self::branch_bounds(path);
            let page = self
                .by_path
                .range(store, lower, upper, Order::Ascending)
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

    fn insert_row(
        &self,
        store: &mut dyn Storage,
        id: Option<u64>,
        path: String,
        data: D,
    ) -> Result<u64> {
        let pk = self.alloc_id(store, id)?;
        if self.by_path.has(store, path.clone()) {
            return Err(Error::Corrupted {
                detail: format!("path {path:?} is already taken"),
            });
        }
        let row = MpRow {
            depth: (path.len() / self.steplen) as u32,
            numchild: 0,
            path: path.clone(),
            data,
        };
        self.rows.save(store, pk, &row)?;
        self.by_path.save(store, path, &pk)?;
        Ok(pk)
    }

    /// Tolerant child-counter adjustment on the row at `path`, if it exists.
    fn adjust_numchild(&self, store: &mut dyn Storage, path: &str, grow: bool) -> Result<()> {
        let Some(pk) = self.by_path.may_load(store, path.to_string())? else {
            return Ok(());
        };
        let mut row = self.lookup(store, pk)?;
        row.numchild = if grow {
            row.numchild + 1
        } else {
            row.numchild.saturating_sub(1)
        };
        self.rows.save(store, pk, &row)
            .map_err(Into::into)
    }

    // ------------------------------------------------------------- placement

    /// Find the sorted insertion point for `key` in the sibling group of
    /// `member_path`: the step of the leftmost sibling comparing after `key`
    /// plus the sibling paths that must shift right. `None` means append.
    fn sorted_slot(
        &self,
        store: &dyn Storage,
        member_path: &str,
        key: &OrderKey,
    ) -> Result<Option<(u64, Vec<String>)>> {
        let key_fn = self.order_key().ok_or(Error::MissingNodeOrderBy)?;
        let siblings = self.sibling_entries(store, member_path)?;
        for (i, (path, pk)) in siblings.iter().enumerate() {
            let row = self.lookup(store, *pk)?;
            if key_fn(&row.data) > *key {
                let newpos = self.last_step(path)?;
                let shift = siblings[i..].iter().map(|(p, _)| p.clone()).collect();
                return Ok(Some((newpos, shift)));
            }
        }
        Ok(None)
    }

    /// The reordering dance shared by sibling insertion and branch moves.
    ///
    /// Shifts the qualifying sibling branches one step to the right (walking
    /// right to left so no two branches ever collide), then, when `oldpath`
    /// is given, rewrites that branch onto the freed slot. Tracks the shifts
    /// through `oldpath` so a branch that lives inside a shifted sibling is
    /// still found at its new location.
    ///
    /// Returns the (possibly shifted) old path and the new path.
    #[allow(clippy::too_many_arguments)]
    fn place(
        &self,
        store: &mut dyn Storage,
        pos: Position,
        newpos: Option<u64>,
        newdepth: u32,
        target_path: &str,
        presel: Option<(u64, Vec<String>)>,
        mut oldpath: Option<String>,
    ) -> Result<(Option<String>, String)> {
        let last = self.last_sibling_path(store, target_path)?;
        if pos == Position::LastSibling || (pos == Position::Right && target_path == last) {
            // easy, the last slot
            let newpath = self.inc_path(&last)?;
            if let Some(old) = &oldpath {
                self.rewrite_branch(store, old, &newpath)?;
            }
            return Ok((oldpath, newpath));
        }

        let (newpos, shift) = match (newpos, presel) {
            (Some(n), Some((_, s))) => (n, s),
            (_, Some((n, s))) => (n, s),
            _ => {
                let siblings = self.sibling_entries(store, target_path)?;
                let basenum = self.last_step(target_path)?;
                let (newpos, keep_from): (u64, &str) = match pos {
                    Position::FirstSibling => (1, ""),
                    Position::Left => (basenum, target_path),
                    Position::Right => (basenum + 1, target_path),
                    _ => {
                        return Err(Error::InvalidPosition {
                            pos,
                            reason: "not a resolvable sibling position",
                        })
                    },
                };
                let shift = siblings
                    .into_iter()
                    .map(|(p, _)| p)
                    .filter(|p| match pos {
                        Position::Right => p.as_str() > keep_from,
                        _ => p.as_str() >= keep_from,
                    })
                    .collect();
                (newpos, shift)
            },
        };

        let base = Self::basepath(target_path, (newdepth as usize - 1) * self.steplen);
        let newpath = self.make_path(base, newpos)?;

        for sibling in shift.iter().rev() {
            let shifted = self.inc_path(sibling)?;
            self.rewrite_branch(store, sibling, &shifted)?;
            if let Some(old) = &mut oldpath {
                if old.starts_with(sibling.as_str()) {
                    *old = format!("{shifted}{}", &old[sibling.len()..]);
                }
            }
        }

        if let Some(old) = &oldpath {
            self.rewrite_branch(store, old, &newpath)?;
        }
        Ok((oldpath, newpath))
    }
}

impl<'a, D> TreeEngine for MpTree<'a, D>
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
        let last_root = self.last_root_path(store)?;

        if let (Some(last), Some(_)) = (&last_root, self.order_by) {
            // there are roots and an ordering directive, delegate to sorted
            // sibling insertion
            let pk = self.pk_at(store, last)?;
            return self.add_sibling(store, pk, Position::SortedSibling, data, id);
        }

        let newpath = match last_root {
            Some(last) => self.inc_path(&last)?,
            None => self.make_path("", 1)?,
        };
        self.insert_row(store, id, newpath, data)
    }

    fn add_child(
        &self,
        store: &mut dyn Storage,
        parent: u64,
        data: D,
        id: Option<u64>,
    ) -> Result<u64> {
        let parent_row = self.lookup(store, parent)?;
        let last_child = self.last_child_path(store, &parent_row.path)?;

        if let (Some(last), Some(_)) = (&last_child, self.order_by) {
            // delegate sorted insertion to the existing sibling group
            let pk = self.pk_at(store, last)?;
            return self.add_sibling(store, pk, Position::SortedSibling, data, id);
        }

        let newpath = match last_child {
            Some(last) => self.inc_path(&last)?,
            None => self.make_path(&parent_row.path, 1)?,
        };
        let pk = self.insert_row(store, id, newpath, data)?;
        self.adjust_numchild(store, &parent_row.path, true)?;
        Ok(pk)
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

        let mut pos = pos;
        let mut presel = None;
        if pos == Position::SortedSibling {
            let key_fn = self.order_key().ok_or(Error::MissingNodeOrderBy)?;
            match self.sorted_slot(store, &row.path, &key_fn(&data))? {
                Some(slot) => presel = Some(slot),
                None => pos = Position::LastSibling,
            }
        }

        let (_, newpath) = self.place(store, pos, None, row.depth, &row.path, presel, None)?;
        let pk = self.insert_row(store, id, newpath.clone(), data)?;

        let parent = self.parent_path(&newpath).to_string();
        if !parent.is_empty() {
            self.adjust_numchild(store, &parent, true)?;
        }
        Ok(pk)
    }

    fn move_node(
        &self,
        store: &mut dyn Storage,
        node: u64,
        target: u64,
        pos: Position,
    ) -> Result<()> {
        let moving = self.lookup(store, node)?;
        let mut target_row = self.lookup(store, target)?;
        let oldpath = moving.path.clone();

        // a "move to child" becomes a sibling move against the target's last
        // child when there is one; otherwise we are inserting the first child
        let mut pos = pos;
        let mut newdepth = target_row.depth;
        let mut newpos = None;
        let mut presel = None;
        if pos.is_child() {
            if node == target {
                return Err(Error::InvalidMoveToDescendant);
            }
            newdepth += 1;
            match self.last_child_path(store, &target_row.path)? {
                Some(last) => {
                    let pk = self.pk_at(store, &last)?;
                    target_row = self.lookup(store, pk)?;
                    pos = match pos {
                        Position::FirstChild => Position::FirstSibling,
                        Position::LastChild => Position::LastSibling,
                        _ => Position::SortedSibling,
                    };
                },
                None => {
                    // first child of a leaf
                    newpos = Some(1);
                    presel = Some((1, vec![]));
                    pos = Position::FirstSibling;
                },
            }
        }

        if target_row.path.starts_with(&oldpath) && target_row.path != oldpath {
            return Err(Error::InvalidMoveToDescendant);
        }

        if oldpath == target_row.path {
            // moves that would land the node exactly where it is
            let first = self
                .sibling_entries(store, &target_row.path)?
                .first()
                .map(|(p, _)| p.clone());
            let last = self.last_sibling_path(store, &target_row.path)?;
            let noop = match pos {
                Position::Left => true,
                Position::Right | Position::LastSibling => target_row.path == last,
                Position::FirstSibling => Some(&target_row.path) == first.as_ref(),
                _ => false,
            };
            if noop {
                return Ok(());
            }
        }

        if pos == Position::SortedSibling {
            let key_fn = self.order_key().ok_or(Error::MissingNodeOrderBy)?;
            match self.sorted_slot(store, &target_row.path, &key_fn(&moving.data))? {
                Some(slot) => presel = Some(slot),
                None => pos = Position::LastSibling,
            }
        }

        let (adjusted_old, newpath) = self.place(
            store,
            pos,
            newpos,
            newdepth,
            &target_row.path,
            presel,
            Some(oldpath),
        )?;
        let adjusted_old = adjusted_old.unwrap_or_default();

        // the branch moved; settle the child counters of both parents
        let oldparent = self.parent_path(&adjusted_old).to_string();
        let newparent = self.parent_path(&newpath).to_string();
        if oldparent != newparent {
            if !oldparent.is_empty() {
                self.adjust_numchild(store, &oldparent, false)?;
            }
            if !newparent.is_empty() {
                self.adjust_numchild(store, &newparent, true)?;
            }
        }
        Ok(())
    }

    fn delete_many(&self, store: &mut dyn Storage, ids: &[u64]) -> Result<u64> {
        let mut targets = ids
            .iter()
            .map(|&id| Ok(self.lookup(store, id)?.path))
            .collect::<Result<Vec<_>>>()?;
        targets.sort();

        // minimal covering set: a path whose ancestor is already going away
        // is redundant
        let mut kept: Vec<String> = vec![];
        for path in targets {
            if !kept.iter().any(|k| path.starts_with(k.as_str())) {
                kept.push(path);
            }
        }

        let mut count = 0;
        for path in kept {
            let parent = self.parent_path(&path).to_string();
            if !parent.is_empty() {
                self.adjust_numchild(store, &parent, false)?;
            }
            count += self.drop_branch(store, &path)?;
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
            for (path, pk) in page {
                self.rows.remove(store, pk);
                self.by_path.remove(store, path);
                count += 1;
            }
        }
    }

    fn parent_id(&self, store: &dyn Storage, id: u64) -> Result<Option<u64>> {
        let row = self.lookup(store, id)?;
        let parent = self.parent_path(&row.path);
        if parent.is_empty() {
            return Ok(None);
        }
        self.pk_at(store, parent).map(Some)
    }

    fn root_ids(&self, store: &dyn Storage) -> Result<Vec<u64>> {
        self.children_ids(store, None)
    }

    fn children_ids(&self, store: &dyn Storage, parent: Option<u64>) -> Result<Vec<u64>> {
        let parent_path = match parent {
            Some(id) => self.lookup(store, id)?.path,
            None => String::new(),
        };
        Ok(self
            .child_entries(store, &parent_path)?
            .into_iter()
            .map(|(_, pk)| pk)
            .collect())
    }

    fn children_count(&self, store: &dyn Storage, id: u64) -> Result<u64> {
        Ok(self.lookup(store, id)?.numchild as u64)
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
        let mut len = self.steplen;
        while len < row.path.len() {
            out.push(self.pk_at(store, Self::basepath(&row.path, len))?);
            len += self.steplen;
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
        let child_len = base_len + self.steplen;

        // one ordered scan: every child starts a bucket, every deeper row
        // lands in the bucket of the child prefix it carries
        let mut out: Vec<(u64, u64)> = vec![];
        let mut current: Option<String> = None;
        for item in self.by_path.range(store, lower, upper, Order::Ascending) {
            let (path, pk) = item?;
            if path.len() == child_len {
                current = Some(path);
                out.push((pk, 0));
            } else if let (Some(prefix), Some(slot)) = (&current, out.last_mut()) {
                if path.starts_with(prefix.as_str()) {
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
            if row.path.chars().any(|c| !self.alphabet.contains(c)) {
                problems.bad_characters.push(pk);
                continue;
            }
            if row.path.is_empty()
                || row.path.len() % self.steplen != 0
                || self.by_path.may_load(store, row.path.clone())? != Some(pk)
            {
                problems.bad_structure.push(pk);
                continue;
            }
            let parent = self.parent_path(&row.path);
            if !parent.is_empty() && !self.by_path.has(store, parent.to_string()) {
                problems.orphans.push(pk);
                continue;
            }
            if row.depth as usize != row.path.len() / self.steplen {
                problems.bad_depth.push(pk);
                continue;
            }
            let real = self.child_entries(store, &row.path)?.len() as u64;
            if real != row.numchild as u64 {
                problems.bad_child_counts.push(pk);
            }
        }
        Ok(problems)
    }

    fn repair(&self, store: &mut dyn Storage) -> Result<()> {
        let pks = self
            .rows
            .keys(store, None, None, Order::Ascending)
            .collect::<StdResult<Vec<_>>>()?;

        // first settle depths, then recount children against the repaired
        // rows; holes in the step numbering are left alone
        for &pk in &pks {
            let mut row = self.lookup(store, pk)?;
            let derived = (row.path.len() / self.steplen) as u32;
            if row.depth != derived {
                row.depth = derived;
                self.rows.save(store, pk, &row)?;
            }
        }
        for &pk in &pks {
            let mut row = self.lookup(store, pk)?;
            let real = self.child_entries(store, &row.path)?.len() as u32;
            if row.numchild != real {
                row.numchild = real;
                self.rows.save(store, pk, &row)?;
            }
        }
        Ok(())
    }
}

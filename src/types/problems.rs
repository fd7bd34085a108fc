use cosmwasm_schema::cw_serde;

/// The outcome of a structural scan over a whole table.
///
/// Five disjoint id sets; a node stops being checked at its first problem, so
/// it appears in at most one list. Sets that cannot occur for an engine stay
/// empty (only the materialized path engine keeps a `numchild` column, for
/// example). An empty report is the healthy state.
#[cw_serde]
#[derive(Default, Eq)]
pub struct Problems {
    /// Rows with symbols outside the configured alphabet.
    pub bad_characters: Vec<u64>,
    /// Rows whose encoding is malformed (path length not a multiple of the
    /// step length, empty labels, inverted intervals and the like).
    pub bad_structure: Vec<u64>,
    /// Rows whose declared parent does not exist.
    pub orphans: Vec<u64>,
    /// Rows whose depth column disagrees with the one derived from the
    /// encoding.
    pub bad_depth: Vec<u64>,
    /// Rows whose child counter disagrees with the true child count.
    pub bad_child_counts: Vec<u64>,
}

impl Problems {
    pub fn is_empty(&self) -> bool {
        self.bad_characters.is_empty()
            && self.bad_structure.is_empty()
            && self.orphans.is_empty()
            && self.bad_depth.is_empty()
            && self.bad_child_counts.is_empty()
    }
}

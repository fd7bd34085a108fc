use cosmwasm_schema::cw_serde;

/// One component of a node ordering key.
///
/// Mixed-type comparisons never happen in practice, because every sibling
/// group is keyed by the same extraction function; the derived ordering
/// (integers before text) is only there to make the type total.
#[cw_serde]
#[derive(Eq, PartialOrd, Ord)]
pub enum OrderToken {
    Int(i64),
    Text(String),
}

/// The value a sorted tree keeps its sibling groups ordered by, extracted
/// from the user columns of a node. Compared lexicographically, component by
/// component. Ties are broken by insertion order (new nodes land after their
/// equals).
pub type OrderKey = Vec<OrderToken>;

impl From<i64> for OrderToken {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for OrderToken {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for OrderToken {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

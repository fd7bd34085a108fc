use serde::{Deserialize, Serialize};

/// One node of the bulk dump form: the user columns plus the nested children,
/// in sibling order. Engine bookkeeping columns never appear here; they are
/// reconstructed on load. With `keep_ids` the primary key travels along.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BulkNode<D> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub data: D,
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BulkNode<D>>,
}

impl<D> BulkNode<D> {
    pub fn new(data: D) -> Self {
        Self {
            id: None,
            data,
            children: vec![],
        }
    }

    pub fn with_children(data: D, children: Vec<BulkNode<D>>) -> Self {
        Self {
            id: None,
            data,
            children,
        }
    }
}

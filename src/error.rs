use crate::types::Position;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Std(#[from] cosmwasm_std::StdError),

    #[error("node not found: {id}")]
    NotFound {
        id: u64,
    },

    #[error("tree corrupted: {detail}")]
    Corrupted {
        detail: String,
    },

    #[error("invalid relative position {pos}: {reason}")]
    InvalidPosition {
        pos: Position,
        reason: &'static str,
    },

    #[error("missing node ordering directive, cannot use sorted positions")]
    MissingNodeOrderBy,

    #[error("cannot move a node to itself or to one of its descendants")]
    InvalidMoveToDescendant,

    #[error("node {id} is already in the tree")]
    NodeAlreadySaved {
        id: u64,
    },

    #[error("bulk node without an id (keep_ids requires one on every node)")]
    MissingBulkId,

    #[error("path overflow from {path:?}")]
    PathOverflow {
        path: String,
    },

    #[error("capacity exceeded: {reason}")]
    CapacityExceeded {
        reason: String,
    },

    #[error("alphabet symbols must be unique ascii")]
    InvalidAlphabet,

    #[error("symbol {symbol:?} is not in the alphabet")]
    InvalidEncoding {
        symbol: char,
    },

    #[error("no label fits within the given constraints")]
    InvalidLabelConstraints,
}

pub type Result<T> = std::result::Result<T, Error>;

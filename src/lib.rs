pub mod al;
pub mod engine;
pub mod error;
pub mod forest;
pub mod lt;
pub mod mp;
pub mod ns;
pub mod numconv;
pub mod types;

pub use {
    al::{AlRow, AlTree},
    engine::TreeEngine,
    error::{Error, Result},
    forest::{Forest, Node, NodeInfo},
    lt::{generate_label, LtRow, LtTree},
    mp::{MpRow, MpTree},
    ns::{NsRow, NsTree},
    numconv::NumConv,
    types::{BulkNode, LabelPath, OrderKey, OrderToken, Position, Problems},
};

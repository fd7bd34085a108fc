mod bulk;
mod label;
mod order;
mod position;
mod problems;

pub use {
    bulk::BulkNode,
    label::LabelPath,
    order::{OrderKey, OrderToken},
    position::Position,
    problems::Problems,
};

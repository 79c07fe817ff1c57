//! Common functionality shared among the cosim crates.
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `cosim-node`.
#![warn(missing_docs, missing_copy_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod constants;
pub mod device_config;
pub mod node_id;
pub mod objects;
pub mod sdo;

pub use node_id::NodeId;
pub use objects::{ObjectId, ObjectType, ObjectValue};
pub use sdo::AbortCode;

//! Object Dictionary storage for the simulated stack
//!
//! The object dictionary is addressed by a 16-bit object index, and an 8-bit sub index. Objects
//! defined in the device config are either:
//!
//! - VAR: A single variable, accessed at sub index 0
//! - RECORD: A collection of sub-objects of heterogenous types. Sub-index 0 contains the highest
//!   implemented sub index.
//!
//! Every sub object stores one of the integer types in [`ObjectType`](cosim_common::ObjectType),
//! in a [`ScalarField`]. The table of objects is allocated once, when the stack is created, from
//! the flattened [`CellDefinition`](cosim_common::device_config::CellDefinition) list.
//!
//! # The ObjectAccess trait
//!
//! Any struct which implements the [`ObjectAccess`] trait can be used to represent an object in the
//! dictionary. A more ergonomic way to implement this trait is to implement the
//! [`ProvidesSubObjects`] trait, and implement the sub objects individually by implementing the
//! [`SubObjectAccess`] trait.
//!
//! # Object threading support
//!
//! Objects use `Cell` storage and are not `Sync`. The dictionary is only ever accessed from the
//! stack's event loop thread.

mod objects;
mod sub_objects;

// Pull up public sub module definitions. The submodules provide some code organization, but
// shouldn't clutter the public API
pub use objects::*;
pub use sub_objects::*;

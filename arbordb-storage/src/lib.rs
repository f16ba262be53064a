//! Row storage core of ArborDB.
//!
//! Tables cluster into groups stored in shared ordered trees. This
//! crate owns the packed row encoding, the per-table layout
//! descriptors materialized from a resolved schema, and the versioned
//! per-table counters that back auto-increment, surrogate keys and
//! row counts.
pub mod codec;
pub mod error;
pub mod rowdata;
pub mod rowdef;
pub mod status;
pub mod tree;

pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::rowdata::{RowData, Val};
    pub use crate::rowdef::cache::RowDefCache;
    pub use crate::rowdef::{FieldLayout, FieldRef, IndexDef, RowDef, RowDefBuilder, RowDefKind};
    pub use crate::status::cache::TableStatusCache;
    pub use crate::status::update::StatusUpdate;
    pub use crate::status::{TableStatus, TableStatusRecord};
    pub use crate::tree::{MemTree, TreeExchange};
}

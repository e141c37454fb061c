//! Table engine: schema metadata, condition filters, and the DML
//! orchestrator.
//!
//! - [`TableMeta`] / [`FieldMeta`] / [`IndexMeta`]: row layout and catalog
//!   persistence (`<name>.table`)
//! - [`Condition`] / [`ConditionFilter`] / [`CompositeFilter`]: predicate
//!   compilation and evaluation against raw row bytes
//! - [`Table`]: insert/update/delete/scan across the record file and every
//!   attached B+tree index, with compensating rollback on failure

mod engine;
mod error;
mod filter;
mod meta;

pub use engine::Table;
pub use error::TableError;
pub use filter::{CompositeFilter, Condition, ConditionFilter, ConditionOperand};
pub use meta::{
    index_file_path, table_data_path, table_meta_path, AttrInfo, FieldMeta, IndexMeta, TableMeta,
    SYS_FIELD_NUM,
};

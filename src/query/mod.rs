// Submodules for separation of concerns
mod cursor;
pub mod eval;
mod exec;
mod parse;
pub mod plan;
pub mod types;
mod update;

// Public API re-exports
pub use cursor::Cursor;
pub use eval::{compare_bson, eval_filter, path_values, project, values_equal};
pub use exec::{ExecStats, count_docs, delete_one, find_docs, update_one};
pub use parse::{parse_filter, parse_projection, parse_sort, parse_update};
pub(crate) use parse::{direction, truthy};
pub use plan::Plan;
pub use types::{
    CmpOp, DeleteReport, Filter, FindOptions, IndexDescription, IndexReport, InsertReport, Order,
    Projection, SortSpec, UpdateDoc, UpdateOp, UpdateReport,
};
pub use update::{apply_update, upsert_seed};

//! Article sinks.
//!
//! Every extracted article is written to two independent places:
//!
//! - [`snapshot`]: the per-source JSON file, which also records which URLs
//!   have already been processed
//! - [`database`]: a row in the `content` table
//!
//! The sinks do not share a transaction. A failed database insert leaves the
//! snapshot entry in place, and the reverse.
//!
//! # Output Structure
//!
//! ```text
//! snapshot_dir/
//! └── httpsnewsexample.json   # base URL with non-alphanumerics removed
//! ```

pub mod database;
pub mod snapshot;

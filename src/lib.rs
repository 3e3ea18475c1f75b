//! Browse a DICOM dataset as a searchable tree.
//!
//! [`tree::build`] materializes the full display tree of a record and
//! [`search::search`] re-derives a pruned, highlighted tree for a query.
//! [`scheduler::SearchScheduler`] debounces query edits, and
//! [`state::Browser`] owns the tree on screen and swaps it on every rebuild.

pub mod config;
pub mod dictionary;
pub mod error;
pub mod file;
pub mod scheduler;
pub mod search;
pub mod state;
pub mod tree;
pub mod types;
pub mod ui;
pub mod value;

pub use error::{ConfigError, LoadError};
pub use scheduler::{ReadyQuery, SearchScheduler};
pub use search::search;
pub use state::Browser;
pub use tree::{build, Limits};
pub use types::{
    DisplayNode, DisplayTree, Element, Field, Highlight, IndexEntry, NodeId, NodeKind, Record,
    SearchIndex, SearchOutcome, Tag, Truncation,
};

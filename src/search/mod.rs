//! Search index for stored builds
//!
//! The index is eventually consistent with the record store: records are
//! written here after they are durably stored, and may lag or be missing until
//! republished (see `reconcile`).

pub mod error;
pub mod index;
pub mod query;
pub mod schema;

pub use error::{categorize_message, ErrorCategory, IndexError};
pub use index::{IndexDocument, SearchIndex, TantivyBuildIndex, TantivyConfig};
pub use query::{BuildSearch, SearchHit};
pub use schema::BuildIndexSchema;

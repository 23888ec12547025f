//! Query and mutation translation.
//!
//! Turns the string-based REST surface (`q`, `fields`, `include`, `sortBy`,
//! `limit`/`offset`) and JSON mutation payloads into store request arguments:
//!
//! - [`FilterParser`]: `field=expr` lists into a where [`Predicate`](warden_core::Predicate)
//! - [`SelectionBuilder`]: field and include lists into a [`Projection`]
//! - [`MutationTransformer`]: payloads into connect/disconnect/create operations
//! - [`RelationshipResolver`]: memoized relation lookups over the schema catalog
//! - [`paging`]: sort order and page bounds

pub mod filter;
pub mod mutation;
pub mod paging;
pub mod resolver;
pub mod selection;

pub use filter::FilterParser;
pub use mutation::MutationTransformer;
pub use paging::{Page, SortOrder, order_by};
pub use resolver::RelationshipResolver;
pub use selection::{IncludeSpec, Projection, SelectionBuilder};

//! Path resolution and traversal planning for the inventory graph engine.
//!
//! Request paths are validated against the schema's containment and compiled
//! into [`TraversalPlan`]s, which a storage backend executes against a graph
//! transaction. Relationship descriptors compile the same way.

pub mod builder;
pub mod path;
pub mod plan;
pub mod relationship;

pub use builder::QueryBuilder;
pub use path::{KeyBindings, PathResolver, PathStep, PathStepKind, PathVisitor, StepCollector, UriPath};
pub use plan::{QueryStep, TraversalPlan};
pub use relationship::{RelatedToProperty, RelationshipBuilder, RelationshipData, RelationshipDescriptor};

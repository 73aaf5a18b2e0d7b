//! Streaming query execution core: a pull-based operator tree over
//! inverted-index postings, a ranker layer that folds hits into relevance
//! weights, and a sorter/grouping layer that accumulates the top-K results.
//!
//! Grounded throughout on `crates/milli/src/search/new`'s ranking-rule
//! pipeline (`RankingRule` trait, bucket-sort drain loop) generalized to the
//! hit-level positional operators and sorter/grouper family this crate
//! implements; see `DESIGN.md` for the per-module grounding ledger.

pub mod budget;
pub mod constants;
pub mod coordinator;
pub mod docid;
pub mod error;
pub mod extdoc;
pub mod exthit;
pub mod hitpos;
pub mod operators;
pub mod query_tree;
pub mod qword;
pub mod ranker;
pub mod registry;
pub mod schema;
pub mod scope;
pub mod sorter;
pub mod warnings;
pub mod zone;

pub use budget::{Budget, CancellationToken, Deadline, ExecutionContext, OpCosts};
pub use docid::{DocId, DOCID_MAX};
pub use error::{Error, InternalError, Result, UserError};
pub use extdoc::ExtDoc;
pub use exthit::ExtHit;
pub use hitpos::Hitpos;
pub use operators::{BoxNode, ExtNode, NodeSetup};
pub use qword::{Qword, QwordMatch};
pub use registry::{ExtQword, QwordRegistry, QwordSetup};
pub use schema::{AttrDef, AttrLocator, Schema};
pub use scope::MatchScope;
pub use warnings::WarningSink;

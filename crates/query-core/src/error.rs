//! Error taxonomy (spec.md §7), grounded on `crates/milli/src/error.rs`'s
//! `Error`/`InternalError`/`UserError` split.
//!
//! Only the "Broken index", "Parse/semantic" and "Internal invariant" rows
//! of the §7 table produce a `Result::Err` here. "Resource exhaustion" and
//! "Warning" are not failures: they are the `None`-plus-warning-string
//! protocol implemented by [`crate::warnings::WarningSink`] and each
//! node's `get_docs_chunk`/`get_hits_chunk` return type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("internal: {0}")]
    Internal(#[from] InternalError),
    #[error(transparent)]
    User(#[from] UserError),
}

/// "Internal invariant" row: an impossible state-machine transition or a
/// corrupt index structure. The query aborts; no partial result is
/// returned.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("INTERNAL ERROR: impossible qword hit-state transition in {site}")]
    ImpossibleQwordState { site: &'static str },
    #[error("INTERNAL ERROR: MVA offset {offset} out of bounds for attribute {attr}")]
    MvaOffsetOutOfBounds { attr: String, offset: u64 },
    #[error("INTERNAL ERROR: zone '{zone}' has a start at docid {docid} with no matching end")]
    UnbalancedZone { zone: String, docid: u32 },
    #[error("INTERNAL ERROR: doclist bounds violated while reading term '{term}'")]
    DoclistBoundsViolation { term: String },
    #[error("INTERNAL ERROR: {detail}")]
    Other { detail: String },
}

/// "Parse/semantic" row: rejected at sorter construction with a precise
/// message, before any document is touched.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("unknown attribute '{name}' in sort clause")]
    UnknownSortAttribute { name: String },
    #[error("attribute '{name}' is multi-valued and cannot be used as an ORDER BY key")]
    MvaInOrderBy { name: String },
    #[error("HAVING clause used without GROUP BY")]
    HavingWithoutGroupBy,
    #[error("sort clause has {count} keyparts, at most {max} are supported")]
    TooManySortFields { count: usize, max: usize },
    #[error("unknown aggregate column '{name}' referenced by HAVING")]
    UnknownHavingColumn { name: String },
    #[error("NOT may only appear as an operand of AND")]
    BareNotOperator,
    #[error("{operator} requires at least one operand")]
    EmptyOperator { operator: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_error_message_names_the_site() {
        let err: Error = InternalError::ImpossibleQwordState { site: "next_hit" }.into();
        assert!(err.to_string().contains("next_hit"));
        assert!(err.to_string().contains("INTERNAL ERROR"));
    }

    #[test]
    fn user_error_is_precise() {
        let err: Error = UserError::HavingWithoutGroupBy.into();
        assert_eq!(err.to_string(), "HAVING clause used without GROUP BY");
    }
}

//! Adapter errors
//!
//! Only construction and tree-level failures surface as errors. Per-property
//! evaluation problems are logged and the property is omitted.

use crate::dom::ElementId;
use crate::tree::TreeError;
use thiserror::Error;

/// Errors from adapter construction and processing.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid parser namespace '{namespace}': {reason}")]
    InvalidNamespace { namespace: String, reason: String },

    #[error("no parser configuration supplied for '{0}'")]
    MissingConfiguration(String),

    #[error("parser configuration for '{0}' declares no contexts")]
    EmptyContextTable(String),

    #[error("observed element {0} does not exist in the document")]
    ObservedElementMissing(ElementId),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

pub type AdapterResult<T> = Result<T, AdapterError>;

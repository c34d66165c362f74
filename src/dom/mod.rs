//! Live document model
//!
//! An arena DOM that the host mutates and that queues mutation records the
//! way a browser mutation observer would. Adapters only ever read from it.

mod document;
pub mod markup;
mod mutation;
pub mod selector;

pub use document::{Child, Document, DomError, DomResult, Element, ElementId};
pub use markup::{parse_markup, MarkupError};
pub use mutation::{MutationBatch, MutationRecord};
pub use selector::{Selector, SelectorError};

//! Adapter layer
//!
//! Adapters recognize structured regions of the document and keep one
//! layer of the context tree in sync with it. Each variant pairs its own
//! [`ContextParser`] with a composed [`ObservationCore`].

pub mod declarative;
mod error;
mod events;
pub mod expression;
mod identity;
pub mod microdata;
mod observer;
pub mod parser_config;
mod traits;
pub mod widget;

pub use declarative::{DeclarativeAdapter, DeclarativeParser};
pub use error::{AdapterError, AdapterResult};
pub use events::TreeEvent;
pub use expression::{ExprError, Expression};
pub use identity::{AttributeKey, EquivalenceKey, PositionalKey};
pub use microdata::{MicrodataAdapter, MicrodataParser, MICRODATA_NAMESPACE};
pub use observer::ObservationCore;
pub use parser_config::{
    is_declarative_namespace, resolve_namespace, ContextRule, ParserConfig,
    DECLARATIVE_NAMESPACE_PREFIX,
};
pub use traits::{Adapter, ChildElement, ContextParser};
pub use widget::{WidgetAdapter, WidgetParser, DEFAULT_WIDGET_ELEMENT, WIDGET_NAMESPACE};

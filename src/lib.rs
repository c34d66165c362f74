//! semtree: Live Semantic Context Tree Engine
//!
//! Derives a typed tree of semantic entities ("contexts") from a live,
//! mutating document and keeps it in sync as the document changes.
//!
//! # Core Concepts
//!
//! - **Adapters**: recognize contexts by convention (microdata, widgets) or
//!   by a declarative parser configuration
//! - **Context tree**: one merged forest of adapter layers under a
//!   synthetic root, updated incrementally from mutation batches
//! - **Targets**: a small predicate language for finding contexts and
//!   deciding where external content attaches
//!
//! # Example
//!
//! ```
//! use semtree::{Engine, EngineConfig, Target, MICRODATA_NAMESPACE};
//!
//! let markup = r#"<html><body>
//!   <article itemscope itemtype="post" itemid="p1">
//!     <span itemprop="text">hello</span>
//!   </article>
//! </body></html>"#;
//!
//! let mut engine = Engine::from_markup(markup, &EngineConfig::default()).unwrap();
//! engine.start().unwrap();
//!
//! let post = engine.query(&Target::new(MICRODATA_NAMESPACE, "post")).unwrap();
//! assert_eq!(post.id.as_deref(), Some("p1"));
//! ```

pub mod adapter;
pub mod config;
pub mod dom;
mod engine;
pub mod query;
pub mod tree;

pub use adapter::{
    Adapter, AdapterError, ContextParser, DeclarativeAdapter, MicrodataAdapter, ParserConfig,
    TreeEvent, WidgetAdapter, MICRODATA_NAMESPACE, WIDGET_NAMESPACE,
};
pub use config::{ConfigError, EngineConfig};
pub use dom::{parse_markup, Document, ElementId, MutationBatch, MutationRecord};
pub use engine::{Engine, EngineError, EngineResult, FailedAdapter};
pub use query::{LinkIndex, Target, TargetCondition};
pub use tree::{ContextNode, ContextTree, NodeKey, PropertyValue, TransferableContext};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

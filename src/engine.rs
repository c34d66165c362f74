//! Engine: the entry point tying document, adapters and tree together
//!
//! The engine owns the live document and the merged context tree. Host
//! edits go through [`Engine::apply`], which drains the queued mutation
//! records and feeds them to every started adapter in one batch, so
//! readers never observe a half-applied batch.

use crate::adapter::{
    resolve_namespace, Adapter, AdapterError, DeclarativeAdapter, MicrodataAdapter, ParserConfig,
    TreeEvent, WidgetAdapter,
};
use crate::config::{ConfigError, EngineConfig};
use crate::dom::{parse_markup, Document, DomError, DomResult, ElementId, MarkupError, MutationBatch, Selector, SelectorError};
use crate::query::{self, App, InjectionPlan, Link, LinkIndex, Portal, Target};
use crate::tree::{
    ContextNode, ContextTree, NodeKey, Properties, TransferableContext, ENGINE_NAMESPACE,
    ROOT_CONTEXT_TYPE,
};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur in engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no element matches the observe selector '{0}'")]
    ObservedElementNotFound(String),

    #[error("invalid observe selector: {0}")]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Markup(#[from] MarkupError),

    #[error(transparent)]
    Dom(#[from] DomError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// An adapter that could not be attached or started
#[derive(Debug, Clone, PartialEq)]
pub struct FailedAdapter {
    pub namespace: String,
    pub reason: String,
}

/// The context tree engine
#[derive(Debug)]
pub struct Engine {
    document: Document,
    tree: ContextTree,
    adapters: Vec<Box<dyn Adapter>>,
    failed: Vec<FailedAdapter>,
}

impl Engine {
    /// Create an engine over `document`.
    ///
    /// The microdata and widget adapters always attach. Declarative
    /// adapters attach per parser configuration (or per namespace listed in
    /// `parsers`); a misconfigured one is recorded in
    /// [`Engine::failed_adapters`] and the rest still attach.
    pub fn new(document: Document, config: &EngineConfig) -> EngineResult<Self> {
        let observed = observed_element(&document, config.observe.as_deref())?;
        let configs = config.load_parser_configs()?;

        let mut adapters: Vec<Box<dyn Adapter>> = vec![
            Box::new(MicrodataAdapter::new(observed)),
            Box::new(WidgetAdapter::new(observed, config.widget_element.as_str())),
        ];
        let mut failed = Vec::new();

        let requested: Vec<String> = match &config.parsers {
            Some(namespaces) => namespaces.clone(),
            None => configs.iter().map(|c| c.namespace.clone()).collect(),
        };
        let mut attached = HashSet::new();
        for namespace in requested {
            match declarative_adapter(observed, &namespace, &configs) {
                Ok(adapter) => {
                    if attached.insert(adapter.namespace().to_string()) {
                        debug!(namespace = adapter.namespace(), "declarative adapter attached");
                        adapters.push(Box::new(adapter));
                    } else {
                        warn!(namespace = adapter.namespace(), "duplicate parser configuration ignored");
                    }
                }
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "parser configuration rejected");
                    failed.push(FailedAdapter {
                        namespace,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            document,
            tree: ContextTree::new(),
            adapters,
            failed,
        })
    }

    /// Parse `markup` and create an engine over it.
    pub fn from_markup(markup: &str, config: &EngineConfig) -> EngineResult<Self> {
        Self::new(parse_markup(markup)?, config)
    }

    /// Attach an additional adapter. It is started with the next [`Engine::start`].
    pub fn with_adapter(mut self, adapter: Box<dyn Adapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Scan the document with every adapter and begin accepting batches.
    ///
    /// An adapter that fails to start is stopped, recorded in
    /// [`Engine::failed_adapters`] and skipped.
    pub fn start(&mut self) -> EngineResult<Vec<TreeEvent>> {
        let mut events = Vec::new();
        for adapter in self.adapters.iter_mut() {
            match adapter.start(&self.document, &mut self.tree) {
                Ok(started) => events.extend(started),
                Err(e) => {
                    warn!(namespace = adapter.namespace(), error = %e, "adapter failed to start");
                    adapter.stop(&mut self.tree)?;
                    self.failed.push(FailedAdapter {
                        namespace: adapter.namespace().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!(
            adapters = self.adapters.len(),
            contexts = self.tree.len().saturating_sub(1),
            "engine started"
        );
        Ok(events)
    }

    /// Stop every adapter and discard their contexts.
    ///
    /// All adapters are stopped even if one fails; the first error is
    /// returned.
    pub fn stop(&mut self) -> EngineResult<Vec<TreeEvent>> {
        let mut events = Vec::new();
        let mut first_error = None;
        for adapter in self.adapters.iter_mut() {
            match adapter.stop(&mut self.tree) {
                Ok(stopped) => events.extend(stopped),
                Err(e) => {
                    warn!(namespace = adapter.namespace(), error = %e, "adapter failed to stop");
                    first_error.get_or_insert(e);
                }
            }
        }
        info!("engine stopped");
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(events),
        }
    }

    /// Run a host edit and ingest the mutations it produced.
    ///
    /// Records queued before a failing edit step are still ingested, so
    /// the tree stays in sync with the document either way.
    pub fn apply<F>(&mut self, edit: F) -> EngineResult<Vec<TreeEvent>>
    where
        F: FnOnce(&mut Document) -> DomResult<()>,
    {
        let outcome = edit(&mut self.document);
        let batch = self.document.take_records();
        let events = self.ingest(&batch)?;
        outcome?;
        Ok(events)
    }

    /// Feed one batch to every started adapter.
    ///
    /// An adapter that fails on the batch is stopped and recorded in
    /// [`Engine::failed_adapters`]; the others still see the batch.
    pub fn ingest(&mut self, batch: &MutationBatch) -> EngineResult<Vec<TreeEvent>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut events = Vec::new();
        for adapter in self.adapters.iter_mut().filter(|a| a.is_started()) {
            match adapter.process(&self.document, &mut self.tree, batch) {
                Ok(processed) => events.extend(processed),
                Err(e) => {
                    warn!(namespace = adapter.namespace(), error = %e, "adapter failed on batch");
                    match adapter.stop(&mut self.tree) {
                        Ok(stopped) => events.extend(stopped),
                        Err(stop_error) => {
                            warn!(namespace = adapter.namespace(), error = %stop_error, "adapter failed to stop")
                        }
                    }
                    self.failed.push(FailedAdapter {
                        namespace: adapter.namespace().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        debug!(records = batch.len(), events = events.len(), "batch ingested");
        Ok(events)
    }

    /// Snapshot of the first context matching `target`, in pre-order.
    pub fn query(&self, target: &Target) -> Option<TransferableContext> {
        query::find_context_by_target(&self.tree, target, self.tree.root())
            .and_then(|key| self.tree.snapshot(key))
    }

    /// Snapshots of every context matching `target`, in pre-order.
    pub fn query_all(&self, target: &Target) -> Vec<TransferableContext> {
        query::find_all_by_target(&self.tree, target, self.tree.root())
            .into_iter()
            .filter_map(|key| self.tree.snapshot(key))
            .collect()
    }

    /// Matching contexts that are usable as identity anchors.
    pub fn identified_contexts(&self, target: &Target) -> Vec<&ContextNode> {
        query::find_all_by_target(&self.tree, target, self.tree.root())
            .into_iter()
            .filter_map(|key| self.tree.get(key))
            .filter(|node| query::is_identified(node))
            .collect()
    }

    /// Snapshot of the whole tree, from the synthetic root.
    pub fn get_context_tree(&self) -> TransferableContext {
        self.tree
            .snapshot(self.tree.root())
            .unwrap_or_else(|| TransferableContext {
                namespace: ENGINE_NAMESPACE.to_string(),
                context_type: ROOT_CONTEXT_TYPE.to_string(),
                id: None,
                parsed_context: Properties::new(),
                children: Vec::new(),
            })
    }

    /// Does `key` still refer to a live context?
    pub fn is_alive(&self, key: NodeKey) -> bool {
        self.tree.contains(key)
    }

    /// Is the context at `key` alive and its element rendered?
    pub fn is_visible(&self, key: NodeKey) -> bool {
        self.tree
            .get(key)
            .is_some_and(|node| node.is_visible(&self.document))
    }

    pub fn node(&self, key: NodeKey) -> Option<&ContextNode> {
        self.tree.get(key)
    }

    pub fn plan_injections<'a>(&self, key: NodeKey, portals: &'a [Portal]) -> InjectionPlan<'a> {
        query::plan_injections(&self.tree, key, portals)
    }

    pub fn suitable_apps<'a>(&self, key: NodeKey, apps: &'a [App], links: &[Link]) -> Vec<&'a App> {
        query::suitable_apps(&self.tree, key, apps, links)
    }

    pub fn link_index(&self, target: &Target, key: NodeKey) -> Option<LinkIndex> {
        LinkIndex::build(&self.tree, target, key)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn tree(&self) -> &ContextTree {
        &self.tree
    }

    pub fn adapters(&self) -> impl Iterator<Item = &dyn Adapter> {
        self.adapters.iter().map(|a| a.as_ref())
    }

    /// The attached adapter for `namespace`
    pub fn adapter(&self, namespace: &str) -> Option<&dyn Adapter> {
        self.adapters().find(|a| a.namespace() == namespace)
    }

    /// Adapters rejected at construction, at start or on a batch
    pub fn failed_adapters(&self) -> &[FailedAdapter] {
        &self.failed
    }

    pub fn is_started(&self) -> bool {
        self.adapters.iter().any(|a| a.is_started())
    }
}

fn observed_element(document: &Document, observe: Option<&str>) -> EngineResult<ElementId> {
    let Some(source) = observe else {
        return Ok(document.body());
    };
    let selector = Selector::parse(source)?;
    if selector.matches(document, document.root()) {
        return Ok(document.root());
    }
    selector
        .query_first(document, document.root())
        .ok_or_else(|| EngineError::ObservedElementNotFound(source.to_string()))
}

fn declarative_adapter(
    observed: ElementId,
    namespace: &str,
    configs: &[ParserConfig],
) -> Result<DeclarativeAdapter, AdapterError> {
    let resolved = resolve_namespace(namespace)?;
    DeclarativeAdapter::for_namespace(observed, &resolved, configs)
}

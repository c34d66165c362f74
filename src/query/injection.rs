//! Injection planning
//!
//! Decides which externally supplied content attaches where on a context:
//! portals are bucketed by insertion point, and apps are filtered by
//! whether they still have somewhere to inject.

use super::matcher::{matches, order_by_priority};
use super::target::Target;
use crate::dom::ElementId;
use crate::tree::{ContextTree, NodeKey};
use serde::{Deserialize, Serialize};

/// Content registered against a target, ordered by `key`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portal {
    /// Priority key; higher keys come first
    pub key: String,
    pub target: Target,
}

impl Portal {
    pub fn new(key: impl Into<String>, target: Target) -> Self {
        Self {
            key: key.into(),
            target,
        }
    }
}

/// Portals attached to one insertion point
#[derive(Debug, Clone, PartialEq)]
pub struct InsertionPointPlan<'a> {
    pub name: String,
    pub element: ElementId,
    pub portals: Vec<&'a Portal>,
}

/// Where each matching portal attaches on one context
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InjectionPlan<'a> {
    /// Portals without `injectTo`, attached to the context itself
    pub context: Vec<&'a Portal>,
    /// One entry per insertion point of the context, in its order
    pub insertion_points: Vec<InsertionPointPlan<'a>>,
}

impl InjectionPlan<'_> {
    pub fn is_empty(&self) -> bool {
        self.context.is_empty() && self.insertion_points.iter().all(|ip| ip.portals.is_empty())
    }
}

/// Plan portal placement for the context at `key`.
///
/// Portals naming an insertion point the context does not have are left
/// out.
pub fn plan_injections<'a>(tree: &ContextTree, key: NodeKey, portals: &'a [Portal]) -> InjectionPlan<'a> {
    let Some(node) = tree.get(key) else {
        return InjectionPlan::default();
    };

    let mut matched: Vec<&Portal> = portals
        .iter()
        .filter(|portal| matches(tree, &portal.target, key))
        .collect();
    order_by_priority(&mut matched, |portal| portal.key.clone());

    let context = matched
        .iter()
        .filter(|portal| portal.target.inject_to.is_none())
        .copied()
        .collect();
    let insertion_points = node
        .insertion_points
        .iter()
        .map(|ip| InsertionPointPlan {
            name: ip.name.clone(),
            element: ip.element,
            portals: matched
                .iter()
                .filter(|portal| portal.target.inject_to.as_deref() == Some(ip.name.as_str()))
                .copied()
                .collect(),
        })
        .collect();

    InjectionPlan {
        context,
        insertion_points,
    }
}

/// An application and the targets it injects into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: String,
    #[serde(default)]
    pub targets: Vec<Target>,
}

/// Content an app already placed on a context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: String,
    pub app_id: String,
    pub insertion_point: String,
}

/// Apps that may still inject into the context at `key`.
///
/// An app needs a matching non-static target. If every such target is
/// inject-once, the app is suitable only while none of its `links`
/// occupies one of those targets' insertion points.
pub fn suitable_apps<'a>(tree: &ContextTree, key: NodeKey, apps: &'a [App], links: &[Link]) -> Vec<&'a App> {
    apps.iter()
        .filter(|app| {
            let suitable: Vec<&Target> = app
                .targets
                .iter()
                .filter(|target| !target.is_static && matches(tree, target, key))
                .collect();
            if suitable.is_empty() {
                return false;
            }
            if suitable.iter().any(|target| !target.inject_once) {
                return true;
            }
            !suitable.iter().any(|target| {
                links.iter().any(|link| {
                    link.app_id == app.id && Some(link.insertion_point.as_str()) == target.inject_to.as_deref()
                })
            })
        })
        .collect()
}

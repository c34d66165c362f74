//! Query system for the context tree
//!
//! Provides target matching, injection planning and link indexing over a
//! built tree. Nothing here mutates the tree.

mod injection;
mod link_index;
mod matcher;
mod target;

pub use injection::{plan_injections, suitable_apps, App, InjectionPlan, InsertionPointPlan, Link, Portal};
pub use link_index::LinkIndex;
pub use matcher::{
    find_all_by_target, find_context_by_target, get_root_context, is_identified, matches,
    matches_node, order_by_priority,
};
pub use target::{Target, TargetCondition};

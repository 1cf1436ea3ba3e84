//! Boon Fiber: a component runtime with keyed reconciliation, hook state,
//! memoization, context propagation, ordered effects and two update lanes.
//!
//! Components are plain render functions. The runtime keeps one node per
//! component instance, re-executes only what queued updates or changed
//! context require, and commits each finished pass atomically.

pub mod address;
pub mod arena;
pub mod config;
pub mod context;
pub mod effects;
pub mod element;
pub mod error;
pub mod hooks;
mod identity;
pub mod lane;
mod memo;
pub mod output;
mod render;
pub mod runtime;
pub mod value;

pub use address::{ComponentId, ContextId, ElementType, Key, NodeId};
pub use config::RuntimeConfig;
pub use effects::{Cleanup, Deps, EffectEvent};
pub use element::{Component, Context, Element, MemoPolicy, View};
pub use error::{ErrorKind, KeyConflict, RuntimeError, UnhandledAction};
pub use hooks::{HookKind, RefHandle, RenderCx};
pub use lane::{Dispatcher, Lane, Mutation, SchedulerState, StateSetter, Transition, UpdateQueue};
pub use output::{CommitReport, Host, NoopHost, OutputNode};
pub use runtime::{FlushReport, Runtime, WorkStatus};
pub use value::Value;

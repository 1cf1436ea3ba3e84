use crate::address::{Key, NodeId};
use crate::hooks::HookKind;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of runtime failures, as delivered to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    HookSlotMismatch,
    UnhandledAction,
    EffectFailure,
    IdentityConflict,
    UpdateLoop,
    CommitFailed,
    Poisoned,
    UnknownRoot,
}

impl ErrorKind {
    /// Render-time failures abort the pass and leave the last commit intact.
    pub fn is_render_failure(&self) -> bool {
        matches!(
            self,
            Self::HookSlotMismatch | Self::UnhandledAction | Self::IdentityConflict
        )
    }

    /// Failures after which the instance can no longer guarantee a consistent tree.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CommitFailed | Self::Poisoned)
    }
}

/// Why two siblings could not be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyConflict {
    /// Two siblings carry the same key.
    Duplicate(Key),
    /// Keyed and unkeyed siblings in one list.
    Mixed,
}

impl fmt::Display for KeyConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyConflict::Duplicate(key) => write!(f, "duplicate key `{}`", key),
            KeyConflict::Mixed => f.write_str("keyed and unkeyed siblings are mixed"),
        }
    }
}

/// Which half of an effect failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectPhase {
    Run,
    Cleanup,
}

impl fmt::Display for EffectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectPhase::Run => f.write_str("effect"),
            EffectPhase::Cleanup => f.write_str("cleanup"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("hook slot {slot} of {node} diverged: expected {expected:?}, found {found:?}")]
    HookSlotMismatch {
        node: NodeId,
        slot: usize,
        expected: Option<HookKind>,
        found: Option<HookKind>,
    },

    #[error("reducer of {node} rejected action {action:?}")]
    UnhandledAction { node: NodeId, action: Value },

    #[error("{phase} in slot {slot} of {node} failed: {message}")]
    EffectFailure {
        node: NodeId,
        slot: usize,
        phase: EffectPhase,
        message: String,
    },

    #[error("children of {parent} conflict: {conflict}")]
    IdentityConflict { parent: NodeId, conflict: KeyConflict },

    #[error("update loop: {commits} commits in one flush")]
    UpdateLoop { commits: usize },

    #[error("commit failed at {node}: {reason}")]
    CommitFailed { node: NodeId, reason: String },

    #[error("runtime is poisoned by an earlier commit failure: {reason}")]
    Poisoned { reason: String },

    #[error("{root} is not a mounted root")]
    UnknownRoot { root: NodeId },
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::HookSlotMismatch { .. } => ErrorKind::HookSlotMismatch,
            Self::UnhandledAction { .. } => ErrorKind::UnhandledAction,
            Self::EffectFailure { .. } => ErrorKind::EffectFailure,
            Self::IdentityConflict { .. } => ErrorKind::IdentityConflict,
            Self::UpdateLoop { .. } => ErrorKind::UpdateLoop,
            Self::CommitFailed { .. } => ErrorKind::CommitFailed,
            Self::Poisoned { .. } => ErrorKind::Poisoned,
            Self::UnknownRoot { .. } => ErrorKind::UnknownRoot,
        }
    }

    /// The node implicated by the failure, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::HookSlotMismatch { node, .. }
            | Self::UnhandledAction { node, .. }
            | Self::EffectFailure { node, .. }
            | Self::CommitFailed { node, .. } => Some(*node),
            Self::IdentityConflict { parent, .. } => Some(*parent),
            Self::UnknownRoot { root } => Some(*root),
            Self::UpdateLoop { .. } | Self::Poisoned { .. } => None,
        }
    }
}

/// Returned by reducers for actions they do not handle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unhandled action {action:?}")]
pub struct UnhandledAction {
    pub action: Value,
}

impl UnhandledAction {
    pub fn new(action: &Value) -> Self {
        Self {
            action: action.clone(),
        }
    }
}

//! Executable chain structure: barriers, regulators and the error handler.

use serde::{Deserialize, Serialize};

use crate::signature::TaskSignature;

/// What a barrier represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum BarrierKind {
    /// The tasks of chainable group `i`.
    Group(usize),
    /// The final success marker.
    Success,
}

/// Signatures that may run concurrently and must all finish before the next step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Barrier {
    /// What the barrier represents.
    pub kind: BarrierKind,
    /// The signatures to run.
    pub signatures: Vec<TaskSignature>,
}

impl Barrier {
    /// Number of signatures in the barrier.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Returns true if the barrier holds no signatures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// One sequential step of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainStep {
    /// A concurrent group.
    Barrier(Barrier),
    /// A no-op join point between barriers.
    Regulator(TaskSignature),
}

impl ChainStep {
    /// Returns the signatures of this step.
    #[must_use]
    pub fn signatures(&self) -> &[TaskSignature] {
        match self {
            Self::Barrier(barrier) => &barrier.signatures,
            Self::Regulator(signature) => std::slice::from_ref(signature),
        }
    }

    /// Returns the barrier, if this step is one.
    #[must_use]
    pub fn as_barrier(&self) -> Option<&Barrier> {
        match self {
            Self::Barrier(barrier) => Some(barrier),
            Self::Regulator(_) => None,
        }
    }

    /// Returns true for regulator steps.
    #[must_use]
    pub fn is_regulator(&self) -> bool {
        matches!(self, Self::Regulator(_))
    }
}

/// A compiled pipeline run, ready to be handed to an execution service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableChain {
    /// The pipeline id.
    pub pipeline_id: String,
    /// The run's execution id.
    pub execution_id: String,
    /// Steps in execution order.
    pub steps: Vec<ChainStep>,
    /// Dispatched once if any step fails.
    pub error_handler: Option<TaskSignature>,
}

impl ExecutableChain {
    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the chain has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Iterates over the barrier steps.
    pub fn barriers(&self) -> impl Iterator<Item = &Barrier> {
        self.steps.iter().filter_map(ChainStep::as_barrier)
    }

    /// Iterates over every signature in step order, excluding the error handler.
    pub fn signatures(&self) -> impl Iterator<Item = &TaskSignature> {
        self.steps.iter().flat_map(ChainStep::signatures)
    }

    /// Total number of signatures across all steps.
    #[must_use]
    pub fn signature_count(&self) -> usize {
        self.signatures().count()
    }
}

//! Protocol boundary to the external alignment solver. No numerics live
//! here; requests are validated locally where the contract allows, and
//! every response is checked before it becomes a domain value.

pub mod client;
pub mod protocol;

pub use client::{AlignmentClient, RefineParams};
pub use protocol::{
    AlignmentResult, CoarseFitResult, GateVerdict, ModelEntry, RoiHint, SolverMetrics,
    SuggestDiagnostics, SuggestRequest, SuggestResponse, SuggestedPair, Transform,
    TransformProvenance,
};

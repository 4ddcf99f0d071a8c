pub mod config;
pub mod correspondence;
pub mod error;
pub mod gate;
pub mod logging;
pub mod model;
pub mod overlay;
pub mod session;
pub mod solver;
pub mod suggestion;

pub use config::RegistrationConfig;
pub use correspondence::{CorrespondencePair, CorrespondenceStore, Side};
pub use error::RegistrationError;
pub use gate::{Guidance, QualityGate};
pub use model::{FileKind, Model, ModelPresentationAdapter, ModelRole, PickOutcome, Ray};
pub use overlay::{OverlayComposer, OverlayScene};
pub use session::{RegistrationSessionController, RequestLifecycle, SolverAction, ViewMode};
pub use solver::{AlignmentClient, AlignmentResult, Transform, TransformProvenance};
pub use suggestion::{SuggestionOutcome, SuggestionSession};

pub type Result<T> = anyhow::Result<T>;

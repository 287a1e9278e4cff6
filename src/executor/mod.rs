pub mod executor;
pub mod transform;

pub use executor::{StepArtifact, StepExecutor};
pub use transform::apply_transform;

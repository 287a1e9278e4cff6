pub mod migration_plan;
pub mod planner;

pub use migration_plan::{MigrationPlan, MigrationStep};
pub use planner::{StepPlanner, plan};

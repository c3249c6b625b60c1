mod condition;
mod dag;
mod manager;
mod runner;
mod schema;
mod service_manager;

pub use condition::{EvalContext, Expr};
pub use dag::get_levels;
pub use manager::{SubmitError, WorkflowManager};
pub use runner::WorkflowRunner;
pub use schema::{expand_matrix, parse as parse_workflow, validate as validate_workflow, MatrixCombination};
pub use service_manager::{start_services, stop_services, StartedServices};

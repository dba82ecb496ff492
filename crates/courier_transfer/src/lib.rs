pub mod orchestrator;
pub mod outcome;
pub mod query;

pub use orchestrator::{OrchestratorConfig, TransferOrchestrator};
pub use outcome::{Compensation, SideEffect, TransferOutcome};
pub use query::TransferQueryService;

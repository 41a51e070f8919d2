// Core transcoding engine - independent of any front end

pub mod classify;
pub mod core;
pub mod orchestrator;
pub mod scheduler;
pub mod validate;
pub mod worker;

pub use classify::{ClassifiedError, ErrorKind, classify, classify_message};
pub use self::core::*;
pub use orchestrator::{
    Orchestrator, OrchestratorError, OrchestratorOptions, OrchestratorState, SubscriptionId,
};
pub use scheduler::Scheduler;
pub use validate::{Severity, ValidationIssue, ValidationReport, validate_settings};
pub use worker::{
    FfmpegRunner, ProcessRunner, RenderRequest, RunTicket, RunnerEvent, RunnerEventKind,
};

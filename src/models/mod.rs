pub mod agent;
pub mod blocking;
pub mod category;
pub mod command;
pub mod phase;
pub mod requirement;
pub mod review;
pub mod workflow;

pub use agent::{ActivationContext, ActivationPredicate, ActivationRule, Agent, AgentRole};
pub use blocking::{BlockingEvent, BlockingKind, BlockingReason};
pub use category::{CategorySet, ChangeCategory, SECURITY_SENSITIVE};
pub use command::PipelineCommand;
pub use phase::Phase;
pub use requirement::{CoverageStatus, RequirementRecord, TestObservation};
pub use review::{AgentOutcome, ReviewVerdict};
pub use workflow::{TransitionRecord, WorkflowState};

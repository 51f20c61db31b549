//! The nine workflow stages. Each reads the state and returns an update
//! confined to its write-set.

mod communicator;
mod coordinator;
mod decision;
mod escalation;
mod knowledge_lookup;
mod log_analysis;
mod mitigation;
mod root_cause;
mod trigger;

pub use communicator::Communicator;
pub use coordinator::Coordinator;
pub use decision::Decision;
pub use escalation::Escalation;
pub use knowledge_lookup::KnowledgeLookup;
pub use log_analysis::LogAnalysis;
pub use mitigation::{derive_actions, Mitigation};
pub use root_cause::RootCause;
pub use trigger::Trigger;

pub(crate) use escalation::escalation_reason;

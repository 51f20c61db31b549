pub mod config;
pub mod error;
pub mod event;
pub mod results;
pub mod traits;
pub mod types;

pub use config::{AppConfig, WorkflowConfig};
pub use error::{CollaboratorError, ContractViolation, Result, TriageError};
pub use event::{EventBus, WorkflowEvent};
pub use results::*;
pub use types::*;

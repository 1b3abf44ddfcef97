//! Network side of Bridgewatch: the action dispatcher, the orchestration
//! loop that owns the current situation, and the configuration and
//! credential plumbing both need.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod util;

pub use config::{DispatcherConfig, PolicyOverrides, policy_from_env};
pub use dispatcher::{
    ActionRequest, ActionSuccess, CommitReceipt, Dispatcher, FieldSource, MutationEntity,
    MutationPreview, PrepareRequest, SessionIdentity,
};
pub use error::{ConfigError, DispatchError};
pub use orchestrator::{LoopClosed, LoopHandle, Orchestrator};

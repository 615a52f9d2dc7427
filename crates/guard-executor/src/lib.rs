//! Order execution for the trade guardrail engine.
//!
//! - `BrokerExecution`: dyn-compatible broker interface
//! - `PaperBroker`: simulated bridge with scriptable failures
//! - `ExecutionGateway`: bounded retry with exponential backoff
//! - `KillSwitchController`: trigger/reset plus background close-all

pub mod broker;
pub mod error;
pub mod gateway;
pub mod kill_switch;
pub mod paper;
pub mod retry;

pub use broker::{BrokerExecution, BrokerOrder, BrokerPosition, SubmitOutcome};
pub use error::{ExecutorError, ExecutorResult};
pub use gateway::{ExecutionGateway, ExecutionOutcome};
pub use kill_switch::{CloseAllReport, KillSwitchController, KillSwitchTrigger};
pub use paper::PaperBroker;
pub use retry::RetryPolicy;

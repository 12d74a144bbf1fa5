//! Financial Command Gateway
//!
//! Turns flat command lines into calls against a financial operations API:
//! - Parses `resource action [id] --flag value` text into structured commands
//! - Resolves commands through a static route table (method, path, flag placement)
//! - Dispatches through an injectable transport and reports typed outcomes
//! - Stages sensitive operations behind a six-digit passcode
//! - Records every confirmed execution in an audit ledger
//!
//! FLOW:
//! TEXT → PARSE → ROUTE → DISPATCH | STAGE → VERIFY → CONFIRM → REPLAY

pub mod agent;
pub mod api;
pub mod audit;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod mfa;
pub mod models;
pub mod parser;
pub mod routes;
pub mod transport;

pub use error::Result;

// Re-export common types
pub use agent::{Orchestrator, Outcome, Reply};
pub use config::GatewayConfig;
pub use error::{CommandError, ErrorKind, GatewayError};
pub use mfa::{Challenge, MfaGate, PendingAction, SensitiveAction, SensitiveKind};
pub use models::*;

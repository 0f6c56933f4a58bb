//! Core types for Cairn
//!
//! This crate defines the message contract shared by the caller side and
//! the execution context:
//! - Value: SQL value enum used for parameters and row cells
//! - RequestId: unique id correlating a command with its response
//! - Command / CommandMessage: requests sent to the execution context
//! - Output / ResponseMessage: replies from the execution context
//! - EngineError: failures reported inside a command

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod error;
pub mod output;
pub mod types;
pub mod value;

pub use command::{Command, CommandKind, CommandMessage};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use output::{Output, ResponseMessage};
pub use types::{
    BatchItemResult, BatchOperation, ExecuteResult, PingInfo, QueryResult, RequestId, Row,
    Statement,
};
pub use value::Value;

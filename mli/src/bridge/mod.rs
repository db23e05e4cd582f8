//! Channel plumbing shared by driver and worker.
//!
//! - **protocol**: request identifiers, control codes and acks
//! - **codec**: frame codec plus word and address-record encoding
//! - **transport**: TCP/IPC addresses, listeners and connections
//! - **endpoint**: one role-typed socket with request/reply alternation

pub mod codec;
pub mod endpoint;
pub mod protocol;
pub mod transport;

//! RESP (Redis Serialization Protocol) implementation.
//!
//! Requests are inline, whitespace-separated command lines; replies use
//! RESP2 simple strings, errors, integers and bulk strings.

pub mod command;
pub mod frame;
pub mod handler;

//! Protocol implementations.
//!
//! ## Protocols
//! - `resp`: inline commands answered with Redis RESP replies

pub mod resp;

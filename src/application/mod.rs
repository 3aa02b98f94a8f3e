//! Application layer containing the withdrawal logic.
//!
//! `WithdrawalEngine` is the entry point. It owns one instance of every
//! strategy over a shared store handle and can be cloned freely into
//! concurrent tasks; all coordination between those tasks happens in the
//! store.

pub mod engine;
pub mod lease;
pub mod race;
pub mod strategies;

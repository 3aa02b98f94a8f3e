//! Domain layer: value objects, the outcome vocabulary shared by all
//! strategies, key naming, and the store port.

pub mod balance;
pub mod keys;
pub mod outcome;
pub mod ports;

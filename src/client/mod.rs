// src/client/mod.rs

//! Session establishment.

pub mod connector;

pub use connector::Connector;

//! Layers, optimizers and a generic parameter-tree update core for small
//! neural networks.

pub mod backend;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod logging;

pub use error::{NnError, Result};

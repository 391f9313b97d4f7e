pub mod collate;
pub mod dataset;
pub mod loader;
pub mod mnist;
pub mod synthetic;

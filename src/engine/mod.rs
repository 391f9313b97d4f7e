pub mod autodiff;
pub mod context;
pub mod layer;
pub mod loss;
pub mod metric;
pub mod model;
pub mod optimizer;
pub mod train;
pub mod tree;

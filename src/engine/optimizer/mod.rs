//! Gradient-based optimizers over parameter trees.
//!
//! Every optimizer keeps its state as trees congruent with the model it was
//! built from, so one `update` walks the model, the gradient and the state in
//! the same leaf order.

use serde::Deserialize;

use crate::{
    backend::{Backend, Elm},
    engine::tree::{ParameterTree, TensorTree},
    error::Result,
};

pub mod adam;
pub mod riemann;
pub mod rmsprop;
pub mod sgd;

pub use adam::{Adam, AdamConfig};
pub use riemann::{RiemannSgd, RiemannSgdConfig};
pub use rmsprop::{RmsProp, RmsPropConfig};
pub use sgd::{Sgd, SgdConfig};

/// `lr / (1 + decay * step)`
pub(crate) fn decayed_learning_rate(learning_rate: Elm, decay: Elm, step: u64) -> Elm {
    learning_rate / (1.0 + decay * step as Elm)
}

/// Closed set of update rules.
#[derive(Debug, Clone)]
pub enum Optimizer<B: Backend> {
    Sgd(Sgd<B>),
    RmsProp(RmsProp<B>),
    Adam(Adam<B>),
    RiemannSgd(RiemannSgd<B>),
}

impl<B: Backend> Optimizer<B> {
    /// Applies one step of the rule to every leaf of `model`.
    ///
    /// Panics when `gradient` is not congruent with `model`.
    pub fn update<M: ParameterTree<B> + ?Sized>(&mut self, model: &mut M, gradient: &TensorTree<B>) {
        match self {
            Optimizer::Sgd(opt) => opt.update(model, gradient),
            Optimizer::RmsProp(opt) => opt.update(model, gradient),
            Optimizer::Adam(opt) => opt.update(model, gradient),
            Optimizer::RiemannSgd(opt) => opt.update(model, gradient),
        }
    }

    /// Number of updates applied so far.
    pub fn step(&self) -> u64 {
        match self {
            Optimizer::Sgd(opt) => opt.step(),
            Optimizer::RmsProp(opt) => opt.step(),
            Optimizer::Adam(opt) => opt.step(),
            Optimizer::RiemannSgd(opt) => opt.step(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Optimizer::Sgd(_) => "sgd",
            Optimizer::RmsProp(_) => "rmsprop",
            Optimizer::Adam(_) => "adam",
            Optimizer::RiemannSgd(_) => "riemann_sgd",
        }
    }
}

impl<B: Backend> From<Sgd<B>> for Optimizer<B> {
    fn from(opt: Sgd<B>) -> Self {
        Optimizer::Sgd(opt)
    }
}

impl<B: Backend> From<RmsProp<B>> for Optimizer<B> {
    fn from(opt: RmsProp<B>) -> Self {
        Optimizer::RmsProp(opt)
    }
}

impl<B: Backend> From<Adam<B>> for Optimizer<B> {
    fn from(opt: Adam<B>) -> Self {
        Optimizer::Adam(opt)
    }
}

impl<B: Backend> From<RiemannSgd<B>> for Optimizer<B> {
    fn from(opt: RiemannSgd<B>) -> Self {
        Optimizer::RiemannSgd(opt)
    }
}

/// Optimizer choice as it appears in a config file, tagged by `kind`.
///
/// ```toml
/// [optimizer]
/// kind = "rmsprop"
/// learning_rate = 0.2
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Sgd(SgdConfig),
    #[serde(rename = "rmsprop")]
    RmsProp(RmsPropConfig),
    Adam(AdamConfig),
    RiemannSgd(RiemannSgdConfig),
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Adam(AdamConfig::default())
    }
}

impl OptimizerConfig {
    /// Validates the hyperparameters and allocates state congruent with `model`.
    pub fn build<B, M>(&self, model: &M) -> Result<Optimizer<B>>
    where
        B: Backend,
        M: ParameterTree<B> + ?Sized,
    {
        let optimizer = match self {
            OptimizerConfig::Sgd(c) => Optimizer::Sgd(Sgd::new(model, c.clone())?),
            OptimizerConfig::RmsProp(c) => Optimizer::RmsProp(RmsProp::new(model, c.clone())?),
            OptimizerConfig::Adam(c) => Optimizer::Adam(Adam::new(model, c.clone())?),
            OptimizerConfig::RiemannSgd(c) => {
                Optimizer::RiemannSgd(RiemannSgd::new(model, c.clone())?)
            }
        };
        Ok(optimizer)
    }
}

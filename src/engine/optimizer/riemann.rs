use std::marker::PhantomData;

use serde::Deserialize;
use tracing::{debug, trace};

use crate::{
    backend::{Backend, Elm},
    engine::tree::{ParameterTree, TensorTree},
    error::{Result, non_negative},
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RiemannSgdConfig {
    pub learning_rate: Elm,
}

impl Default for RiemannSgdConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
        }
    }
}

impl RiemannSgdConfig {
    pub fn validate(&self) -> Result<()> {
        non_negative("learning_rate", self.learning_rate)?;
        Ok(())
    }
}

/// Gradient descent on a manifold: the model moves through its own
/// [`ParameterTree::retract`] along `-lr * gradient`.
///
/// On flat parameter spaces this is plain SGD.
#[derive(Debug, Clone)]
pub struct RiemannSgd<B: Backend> {
    config: RiemannSgdConfig,
    step: u64,
    _marker: PhantomData<B>,
}

impl<B: Backend> RiemannSgd<B> {
    pub fn new<M: ParameterTree<B> + ?Sized>(model: &M, config: RiemannSgdConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            leaves = model.addresses().len(),
            lr = config.learning_rate,
            "riemann sgd optimizer created"
        );
        Ok(Self {
            config,
            step: 0,
            _marker: PhantomData,
        })
    }

    pub fn update<M: ParameterTree<B> + ?Sized>(&mut self, model: &mut M, gradient: &TensorTree<B>) {
        model.assert_congruent(gradient);
        self.step += 1;
        trace!(step = self.step, lr = self.config.learning_rate, "riemann sgd update");
        model.retract(&gradient.scale(-self.config.learning_rate));
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn config(&self) -> &RiemannSgdConfig {
        &self.config
    }
}

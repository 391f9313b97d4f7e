use serde::Deserialize;
use tracing::{debug, trace};

use crate::{
    backend::{Backend, Elm},
    engine::{
        optimizer::decayed_learning_rate,
        tree::{ParameterTree, TensorTree},
    },
    error::{Result, non_negative},
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SgdConfig {
    pub learning_rate: Elm,
    pub momentum: Elm,
    pub decay: Elm,
    pub nesterov: bool,
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            momentum: 0.0,
            decay: 0.0,
            nesterov: false,
        }
    }
}

impl SgdConfig {
    pub fn validate(&self) -> Result<()> {
        non_negative("learning_rate", self.learning_rate)?;
        non_negative("momentum", self.momentum)?;
        non_negative("decay", self.decay)?;
        Ok(())
    }
}

/// Stochastic gradient descent with optional (Nesterov) momentum.
///
/// ```text
/// v = momentum * v - lr_t * g
/// p += v                            (plain)
/// p += momentum * v - lr_t * g      (nesterov)
/// ```
#[derive(Debug, Clone)]
pub struct Sgd<B: Backend> {
    config: SgdConfig,
    velocity: TensorTree<B>,
    step: u64,
}

impl<B: Backend> Sgd<B> {
    pub fn new<M: ParameterTree<B> + ?Sized>(model: &M, config: SgdConfig) -> Result<Self> {
        config.validate()?;
        let velocity = model.zeros_like();
        debug!(
            leaves = velocity.len(),
            lr = config.learning_rate,
            momentum = config.momentum,
            nesterov = config.nesterov,
            "sgd optimizer created"
        );
        Ok(Self {
            config,
            velocity,
            step: 0,
        })
    }

    pub fn update<M: ParameterTree<B> + ?Sized>(&mut self, model: &mut M, gradient: &TensorTree<B>) {
        model.assert_congruent(gradient);
        model.assert_congruent(&self.velocity);

        self.step += 1;
        let lr = decayed_learning_rate(self.config.learning_rate, self.config.decay, self.step);
        let momentum = self.config.momentum;
        let nesterov = self.config.nesterov;
        trace!(step = self.step, lr, "sgd update");

        let grads = gradient.leaves();
        for (((_, p), (_, g)), (_, v)) in model
            .leaves_mut()
            .into_iter()
            .zip(grads)
            .zip(self.velocity.leaves_mut())
        {
            let lr_g = B::scale(g, lr);
            *v = B::sub(&B::scale(v, momentum), &lr_g);
            let delta = if nesterov {
                B::sub(&B::scale(v, momentum), &lr_g)
            } else {
                v.clone()
            };
            *p = B::add(p, &delta);
        }
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn config(&self) -> &SgdConfig {
        &self.config
    }

    pub fn velocity(&self) -> &TensorTree<B> {
        &self.velocity
    }
}

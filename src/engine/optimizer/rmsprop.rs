use serde::Deserialize;
use tracing::{debug, trace};

use crate::{
    backend::{Backend, Elm},
    engine::{
        optimizer::decayed_learning_rate,
        tree::{ParameterTree, TensorTree},
    },
    error::{Result, non_negative, positive, unit_interval},
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RmsPropConfig {
    pub learning_rate: Elm,
    pub rho: Elm,
    pub epsilon: Elm,
    pub decay: Elm,
}

impl Default for RmsPropConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            rho: 0.9,
            epsilon: 1e-8,
            decay: 0.0,
        }
    }
}

impl RmsPropConfig {
    pub fn validate(&self) -> Result<()> {
        non_negative("learning_rate", self.learning_rate)?;
        unit_interval("rho", self.rho)?;
        positive("epsilon", self.epsilon)?;
        non_negative("decay", self.decay)?;
        Ok(())
    }
}

/// Scales each step by a running average of squared gradients.
#[derive(Debug, Clone)]
pub struct RmsProp<B: Backend> {
    config: RmsPropConfig,
    mean_square: TensorTree<B>,
    step: u64,
}

impl<B: Backend> RmsProp<B> {
    pub fn new<M: ParameterTree<B> + ?Sized>(model: &M, config: RmsPropConfig) -> Result<Self> {
        config.validate()?;
        let mean_square = model.zeros_like();
        debug!(
            leaves = mean_square.len(),
            lr = config.learning_rate,
            rho = config.rho,
            "rmsprop optimizer created"
        );
        Ok(Self {
            config,
            mean_square,
            step: 0,
        })
    }

    pub fn update<M: ParameterTree<B> + ?Sized>(&mut self, model: &mut M, gradient: &TensorTree<B>) {
        model.assert_congruent(gradient);
        model.assert_congruent(&self.mean_square);

        self.step += 1;
        let lr = decayed_learning_rate(self.config.learning_rate, self.config.decay, self.step);
        let RmsPropConfig { rho, epsilon, .. } = self.config;
        trace!(step = self.step, lr, "rmsprop update");

        let grads = gradient.leaves();
        for (((_, p), (_, g)), (_, alpha)) in model
            .leaves_mut()
            .into_iter()
            .zip(grads)
            .zip(self.mean_square.leaves_mut())
        {
            // α = ρα + (1-ρ)g²
            *alpha = B::add(&B::scale(alpha, rho), &B::scale(&B::powi(g, 2), 1.0 - rho));
            let denom = B::add_scalar(&B::sqrt(alpha), epsilon);
            *p = B::sub(p, &B::scale(&B::div(g, &denom), lr));
        }
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn config(&self) -> &RmsPropConfig {
        &self.config
    }

    pub fn mean_square(&self) -> &TensorTree<B> {
        &self.mean_square
    }
}

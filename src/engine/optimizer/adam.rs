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
pub struct AdamConfig {
    pub learning_rate: Elm,
    pub beta1: Elm,
    pub beta2: Elm,
    pub epsilon: Elm,
    pub decay: Elm,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            decay: 0.0,
        }
    }
}

impl AdamConfig {
    pub fn validate(&self) -> Result<()> {
        non_negative("learning_rate", self.learning_rate)?;
        unit_interval("beta1", self.beta1)?;
        unit_interval("beta2", self.beta2)?;
        positive("epsilon", self.epsilon)?;
        non_negative("decay", self.decay)?;
        Ok(())
    }
}

/// Adam with the bias correction folded into the step size.
#[derive(Debug, Clone)]
pub struct Adam<B: Backend> {
    config: AdamConfig,
    first_moments: TensorTree<B>,
    second_moments: TensorTree<B>,
    step: u64,
}

impl<B: Backend> Adam<B> {
    pub fn new<M: ParameterTree<B> + ?Sized>(model: &M, config: AdamConfig) -> Result<Self> {
        config.validate()?;
        let first_moments = model.zeros_like();
        let second_moments = first_moments.clone();
        debug!(
            leaves = first_moments.len(),
            lr = config.learning_rate,
            beta1 = config.beta1,
            beta2 = config.beta2,
            "adam optimizer created"
        );
        Ok(Self {
            config,
            first_moments,
            second_moments,
            step: 0,
        })
    }

    pub fn update<M: ParameterTree<B> + ?Sized>(&mut self, model: &mut M, gradient: &TensorTree<B>) {
        model.assert_congruent(gradient);
        model.assert_congruent(&self.first_moments);
        model.assert_congruent(&self.second_moments);

        self.step += 1;
        let lr = decayed_learning_rate(self.config.learning_rate, self.config.decay, self.step);
        let AdamConfig {
            beta1,
            beta2,
            epsilon,
            ..
        } = self.config;
        let t = i32::try_from(self.step).unwrap_or(i32::MAX);
        // beta1 = 1 では一次モーメントが常に0なので、パラメータは動かさない
        let correction = 1.0 - beta1.powi(t);
        let step_size = if correction > 0.0 {
            lr * (1.0 - beta2.powi(t)).sqrt() / correction
        } else {
            0.0
        };
        trace!(step = self.step, lr, step_size, "adam update");

        let grads = gradient.leaves();
        for ((((_, p), (_, g)), (_, m)), (_, v)) in model
            .leaves_mut()
            .into_iter()
            .zip(grads)
            .zip(self.first_moments.leaves_mut())
            .zip(self.second_moments.leaves_mut())
        {
            *m = B::add(&B::scale(m, beta1), &B::scale(g, 1.0 - beta1));
            *v = B::add(&B::scale(v, beta2), &B::scale(&B::powi(g, 2), 1.0 - beta2));
            let denom = B::add_scalar(&B::sqrt(v), epsilon);
            *p = B::sub(p, &B::scale(&B::div(m, &denom), step_size));
        }
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    pub fn first_moments(&self) -> &TensorTree<B> {
        &self.first_moments
    }

    pub fn second_moments(&self) -> &TensorTree<B> {
        &self.second_moments
    }
}

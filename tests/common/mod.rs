#![allow(dead_code)]

use lamina::backend::Backend;
use lamina::backend::ndarray::NdArray;
use lamina::engine::autodiff::{value_with_gradient, value_with_pullback};
use lamina::engine::context::TrainingContext;
use lamina::engine::layer::Layer;
use lamina::engine::tree::ParameterTree;
use ndarray::ArrayD;

pub type T = ArrayD<f32>;

const EPS: f32 = 1e-2;

/// Scalar probe `L = Σ y ⊙ probe`, so `dL/dy = probe`.
pub fn probe_for(y: &T) -> T {
    NdArray::random_uniform(y.shape(), -1.0, 1.0, Some(11))
}

fn probed<L: Layer<NdArray>>(layer: &L, ctx: &TrainingContext, x: &T, probe: &T) -> f32 {
    (&layer.forward(ctx, x) * probe).sum()
}

/// Compares every parameter gradient of `layer` against central differences.
pub fn check_parameter_gradients<L>(layer: &L, ctx: &TrainingContext, x: &T, tol: f32)
where
    L: Layer<NdArray> + Clone,
{
    let probe = probe_for(&layer.forward(ctx, x));
    let (_, grad) = value_with_gradient::<NdArray, L, _>(layer, ctx, x, |y: &T| {
        ((y * &probe).sum(), probe.clone())
    });
    assert_eq!(grad.addresses(), layer.addresses());

    for (leaf, (path, g)) in grad.iter().enumerate() {
        for j in 0..g.len() {
            let mut plus = layer.clone();
            *plus.leaves_mut()[leaf].1.iter_mut().nth(j).unwrap() += EPS;
            let mut minus = layer.clone();
            *minus.leaves_mut()[leaf].1.iter_mut().nth(j).unwrap() -= EPS;

            let numeric =
                (probed(&plus, ctx, x, &probe) - probed(&minus, ctx, x, &probe)) / (2.0 * EPS);
            let analytic = *g.iter().nth(j).unwrap();
            assert!(
                (analytic - numeric).abs() <= tol,
                "{}[{}]: analytic {} vs numeric {}",
                path,
                j,
                analytic,
                numeric
            );
        }
    }
}

/// Compares the input gradient of `layer` against central differences.
pub fn check_input_gradient<L: Layer<NdArray>>(layer: &L, ctx: &TrainingContext, x: &T, tol: f32) {
    let (y, pullback) = value_with_pullback::<NdArray, L>(layer, ctx, x);
    let probe = probe_for(&y);
    let (_, dx) = pullback.apply(&probe);
    assert_eq!(dx.shape(), x.shape());

    for j in 0..x.len() {
        let mut plus = x.clone();
        *plus.iter_mut().nth(j).unwrap() += EPS;
        let mut minus = x.clone();
        *minus.iter_mut().nth(j).unwrap() -= EPS;
        let numeric =
            (probed(layer, ctx, &plus, &probe) - probed(layer, ctx, &minus, &probe)) / (2.0 * EPS);
        let analytic = *dx.iter().nth(j).unwrap();
        assert!(
            (analytic - numeric).abs() <= tol,
            "input[{}]: analytic {} vs numeric {}",
            j,
            analytic,
            numeric
        );
    }
}

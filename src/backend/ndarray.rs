use ndarray::{Array2, Array4, ArrayD, ArrayView4, Axis, Ix2, Ix4, IxDyn};
use ndarray_rand::{RandomExt, rand_distr::Normal};
use rand::{SeedableRng, distributions::Uniform, rngs::StdRng};

use crate::backend::{Backend, Elm, Padding, Window2D};

#[derive(Debug, Clone)]
pub struct NdArray;

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

// into_shapeはメモリ順序に依存するので、必ず標準レイアウトに揃えてから形状を変える
fn standard(tensor: &ArrayD<Elm>) -> ArrayD<Elm> {
    tensor.as_standard_layout().into_owned()
}

fn view4(tensor: &ArrayD<Elm>) -> ArrayView4<'_, Elm> {
    tensor.view().into_dimensionality::<Ix4>().unwrap_or_else(|_| {
        panic!(
            "Expected a rank-4 NCHW tensor, got shape {:?}",
            tensor.shape()
        )
    })
}

fn dims4(shape: &[usize]) -> (usize, usize, usize, usize) {
    assert_eq!(shape.len(), 4, "Expected a rank-4 shape, got {:?}", shape);
    (shape[0], shape[1], shape[2], shape[3])
}

/// Unfolds every window of `input` into one row: `[N * OH * OW, C * KH * KW]`.
fn im2col(input: &ArrayView4<'_, Elm>, win: &Window2D) -> Array2<Elm> {
    let (n, c, _, _) = input.dim();
    let (kh, kw) = win.kernel;
    let (oh, ow) = win.output;
    let mut cols = Array2::<Elm>::zeros((n * oh * ow, c * kh * kw));
    for b in 0..n {
        for oy in 0..oh {
            for ox in 0..ow {
                let row = (b * oh + oy) * ow + ox;
                let mut col = 0;
                for ch in 0..c {
                    for ky in 0..kh {
                        for kx in 0..kw {
                            if let Some((iy, ix)) = win.source(oy, ox, ky, kx) {
                                cols[[row, col]] = input[[b, ch, iy, ix]];
                            }
                            col += 1;
                        }
                    }
                }
            }
        }
    }
    cols
}

/// Inverse of `im2col`: scatters (and accumulates) rows back into an NCHW tensor.
fn col2im(cols: &Array2<Elm>, shape: (usize, usize, usize, usize), win: &Window2D) -> Array4<Elm> {
    let (n, c, h, w) = shape;
    let (kh, kw) = win.kernel;
    let (oh, ow) = win.output;
    let mut out = Array4::<Elm>::zeros((n, c, h, w));
    for b in 0..n {
        for oy in 0..oh {
            for ox in 0..ow {
                let row = (b * oh + oy) * ow + ox;
                let mut col = 0;
                for ch in 0..c {
                    for ky in 0..kh {
                        for kx in 0..kw {
                            if let Some((iy, ix)) = win.source(oy, ox, ky, kx) {
                                out[[b, ch, iy, ix]] += cols[[row, col]];
                            }
                            col += 1;
                        }
                    }
                }
            }
        }
    }
    out
}

fn filter_matrix(filter: &ArrayD<Elm>) -> Array2<Elm> {
    let (oc, c, kh, kw) = dims4(filter.shape());
    standard(filter)
        .into_shape((oc, c * kh * kw))
        .expect("filter reshape")
}

/// `[N, OC, OH, OW]` -> `[N * OH * OW, OC]`, matching the row order of `im2col`.
fn grad_matrix(grad: &ArrayD<Elm>) -> Array2<Elm> {
    let (n, oc, oh, ow) = dims4(grad.shape());
    view4(grad)
        .permuted_axes([0, 2, 3, 1])
        .as_standard_layout()
        .into_owned()
        .into_shape((n * oh * ow, oc))
        .expect("gradient reshape")
}

fn pool_window(input_shape: &[usize], pool_size: (usize, usize), strides: (usize, usize), padding: Padding) -> Window2D {
    let (_, _, h, w) = dims4(input_shape);
    Window2D::new((h, w), pool_size, strides, padding)
}

impl Backend for NdArray {
    type Tensor = ArrayD<Elm>;

    fn zeros(shape: &[usize]) -> Self::Tensor {
        ArrayD::zeros(shape)
    }
    fn ones(shape: &[usize]) -> Self::Tensor {
        ArrayD::ones(shape)
    }
    fn zeros_like(tensor: &Self::Tensor) -> Self::Tensor {
        ArrayD::zeros(tensor.shape())
    }
    fn ones_like(tensor: &Self::Tensor) -> Self::Tensor {
        ArrayD::ones(tensor.shape())
    }
    fn random_normal(shape: &[usize], mean: Elm, std: Elm, seed: Option<u64>) -> Self::Tensor {
        let mut rng = rng_from(seed);
        let dist = Normal::new(mean, std).expect("standard deviation must be finite and >= 0");
        ArrayD::random_using(shape, dist, &mut rng)
    }
    fn random_uniform(shape: &[usize], low: Elm, high: Elm, seed: Option<u64>) -> Self::Tensor {
        let mut rng = rng_from(seed);
        ArrayD::random_using(shape, Uniform::new_inclusive(low, high), &mut rng)
    }

    fn from_vec(vec: Vec<Elm>, shape: &[usize]) -> Self::Tensor {
        ArrayD::from_shape_vec(shape, vec).unwrap_or_else(|e| {
            panic!("Cannot build tensor of shape {:?}: {}", shape, e)
        })
    }
    fn to_vec(tensor: &Self::Tensor) -> Vec<Elm> {
        tensor.iter().cloned().collect()
    }

    fn shape(tensor: &Self::Tensor) -> Vec<usize> {
        tensor.shape().to_vec()
    }

    fn reshape(tensor: &Self::Tensor, shape: &[usize]) -> Self::Tensor {
        standard(tensor)
            .into_shape(IxDyn(shape))
            .unwrap_or_else(|_| {
                panic!(
                    "Reshape failed: shape={:?}, target={:?}",
                    tensor.shape(),
                    shape
                )
            })
    }

    fn stack(tensors: &[Self::Tensor], axis: usize) -> Self::Tensor {
        let views: Vec<_> = tensors.iter().map(|t| t.view()).collect();
        ndarray::stack(Axis(axis), &views).expect("stacked tensors must share a shape")
    }

    fn add(a: &Self::Tensor, b: &Self::Tensor) -> Self::Tensor {
        a + b
    }
    fn sub(a: &Self::Tensor, b: &Self::Tensor) -> Self::Tensor {
        a - b
    }
    fn mul(a: &Self::Tensor, b: &Self::Tensor) -> Self::Tensor {
        a * b
    }
    fn div(a: &Self::Tensor, b: &Self::Tensor) -> Self::Tensor {
        a / b
    }
    fn scale(a: &Self::Tensor, k: Elm) -> Self::Tensor {
        a.mapv(|v| v * k)
    }
    fn add_scalar(a: &Self::Tensor, k: Elm) -> Self::Tensor {
        a.mapv(|v| v + k)
    }

    // 重み行列との積に用途を限定し、両方2次元であると仮定する
    fn matmul(a: &Self::Tensor, b: &Self::Tensor) -> Self::Tensor {
        let a_view = a.view().into_dimensionality::<Ix2>().unwrap_or_else(|_| {
            panic!("matmul expects 2-D operands, got A={:?}", a.shape())
        });
        let b_view = b.view().into_dimensionality::<Ix2>().unwrap_or_else(|_| {
            panic!("matmul expects 2-D operands, got B={:?}", b.shape())
        });
        assert_eq!(
            a_view.ncols(),
            b_view.nrows(),
            "Inner dimensions must match for matmul: {:?} x {:?}",
            a.shape(),
            b.shape()
        );
        a_view.dot(&b_view).into_dyn()
    }

    fn transpose(tensor: &Self::Tensor) -> Self::Tensor {
        tensor.t().as_standard_layout().into_owned()
    }

    fn sum(a: &Self::Tensor, axis: Option<usize>, keep_dims: bool) -> Self::Tensor {
        match axis {
            Some(ax) => {
                let res = a.sum_axis(Axis(ax));
                if keep_dims {
                    res.insert_axis(Axis(ax))
                } else {
                    res
                }
            }
            None => {
                let val = a.sum();
                if keep_dims {
                    ArrayD::from_elem(vec![1; a.ndim()], val)
                } else {
                    ArrayD::from_elem(vec![], val)
                }
            }
        }
    }

    fn sum_axes(a: &Self::Tensor, axes: &[usize]) -> Self::Tensor {
        axes.iter().fold(a.clone(), |acc, &ax| {
            acc.sum_axis(Axis(ax)).insert_axis(Axis(ax))
        })
    }

    fn mean_axes(a: &Self::Tensor, axes: &[usize]) -> Self::Tensor {
        let count: usize = axes.iter().map(|&ax| a.shape()[ax]).product();
        let summed = Self::sum_axes(a, axes);
        summed.mapv(|v| v / count.max(1) as Elm)
    }

    fn max(a: &Self::Tensor, axis: Option<usize>) -> Self::Tensor {
        match axis {
            Some(ax) => a.map_axis(Axis(ax), |sub| {
                sub.iter().cloned().fold(Elm::NEG_INFINITY, Elm::max)
            }),
            None => ArrayD::from_elem(vec![], a.iter().cloned().fold(Elm::NEG_INFINITY, Elm::max)),
        }
    }

    fn argmax(a: &Self::Tensor, axis: usize) -> Vec<usize> {
        a.map_axis(Axis(axis), |lane| {
            let mut best = 0;
            for (i, &v) in lane.iter().enumerate() {
                if v > lane[best] {
                    best = i;
                }
            }
            best
        })
        .iter()
        .cloned()
        .collect()
    }

    fn neg(a: &Self::Tensor) -> Self::Tensor {
        -a
    }
    fn sqrt(a: &Self::Tensor) -> Self::Tensor {
        a.mapv(|v| v.sqrt())
    }
    fn rsqrt(a: &Self::Tensor) -> Self::Tensor {
        a.mapv(|v| 1.0 / v.sqrt())
    }
    fn powi(a: &Self::Tensor, n: i32) -> Self::Tensor {
        a.mapv(|v| v.powi(n))
    }
    fn exp(a: &Self::Tensor) -> Self::Tensor {
        a.mapv(|v| v.exp())
    }
    fn log(a: &Self::Tensor) -> Self::Tensor {
        a.mapv(|v| v.ln())
    }
    fn relu(a: &Self::Tensor) -> Self::Tensor {
        a.mapv(|v| v.max(0.0))
    }
    fn sigmoid(a: &Self::Tensor) -> Self::Tensor {
        a.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }
    fn tanh(a: &Self::Tensor) -> Self::Tensor {
        a.mapv(|v| v.tanh())
    }
    fn gt_zero(a: &Self::Tensor) -> Self::Tensor {
        a.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
    }

    fn softmax(a: &Self::Tensor, axis: Option<usize>) -> Self::Tensor {
        let axis = axis.unwrap_or_else(|| a.ndim() - 1);
        let mut out = a.clone();
        for mut lane in out.lanes_mut(Axis(axis)) {
            let max = lane.fold(Elm::NEG_INFINITY, |acc, &x| acc.max(x));
            lane.mapv_inplace(|v| (v - max).exp());
            let sum = lane.sum();
            lane.mapv_inplace(|v| v / sum);
        }
        out
    }

    fn log_softmax(a: &Self::Tensor, axis: Option<usize>) -> Self::Tensor {
        let axis = axis.unwrap_or_else(|| a.ndim() - 1);
        let mut out = a.clone();
        for mut lane in out.lanes_mut(Axis(axis)) {
            let max = lane.fold(Elm::NEG_INFINITY, |acc, &x| acc.max(x));
            let log_sum = lane.iter().map(|&v| (v - max).exp()).sum::<Elm>().ln();
            lane.mapv_inplace(|v| v - max - log_sum);
        }
        out
    }

    fn conv2d(
        input: &Self::Tensor,
        filter: &Self::Tensor,
        strides: (usize, usize),
        padding: Padding,
    ) -> Self::Tensor {
        let x = view4(input);
        let (n, c, h, w) = x.dim();
        let (oc, fc, kh, kw) = dims4(filter.shape());
        assert_eq!(
            c, fc,
            "Conv2D channel mismatch: input has {} channels, filter expects {}",
            c, fc
        );
        let win = Window2D::new((h, w), (kh, kw), strides, padding);
        let (oh, ow) = win.output;

        let cols = im2col(&x, &win);
        let out = cols.dot(&filter_matrix(filter).t());
        out.into_shape((n, oh, ow, oc))
            .expect("conv2d output reshape")
            .permuted_axes([0, 3, 1, 2])
            .as_standard_layout()
            .into_owned()
            .into_dyn()
    }

    fn conv2d_backprop_input(
        input_shape: &[usize],
        filter: &Self::Tensor,
        grad: &Self::Tensor,
        strides: (usize, usize),
        padding: Padding,
    ) -> Self::Tensor {
        let (n, c, h, w) = dims4(input_shape);
        let (_, _, kh, kw) = dims4(filter.shape());
        let win = Window2D::new((h, w), (kh, kw), strides, padding);
        let dcols = grad_matrix(grad).dot(&filter_matrix(filter));
        col2im(&dcols, (n, c, h, w), &win).into_dyn()
    }

    fn conv2d_backprop_filter(
        input: &Self::Tensor,
        filter_shape: &[usize],
        grad: &Self::Tensor,
        strides: (usize, usize),
        padding: Padding,
    ) -> Self::Tensor {
        let x = view4(input);
        let (_, _, h, w) = x.dim();
        let (oc, c, kh, kw) = dims4(filter_shape);
        let win = Window2D::new((h, w), (kh, kw), strides, padding);
        let cols = im2col(&x, &win);
        grad_matrix(grad)
            .t()
            .dot(&cols)
            .into_shape((oc, c, kh, kw))
            .expect("filter gradient reshape")
            .into_dyn()
    }

    fn max_pool2d(
        input: &Self::Tensor,
        pool_size: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    ) -> Self::Tensor {
        let x = view4(input);
        let (n, c, _, _) = x.dim();
        let win = pool_window(input.shape(), pool_size, strides, padding);
        let (oh, ow) = win.output;
        let mut out = Array4::<Elm>::zeros((n, c, oh, ow));
        for ((b, ch, oy, ox), cell) in out.indexed_iter_mut() {
            let mut best = Elm::NEG_INFINITY;
            for ky in 0..pool_size.0 {
                for kx in 0..pool_size.1 {
                    if let Some((iy, ix)) = win.source(oy, ox, ky, kx) {
                        best = best.max(x[[b, ch, iy, ix]]);
                    }
                }
            }
            *cell = best;
        }
        out.into_dyn()
    }

    fn max_pool2d_backprop(
        input: &Self::Tensor,
        grad: &Self::Tensor,
        pool_size: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    ) -> Self::Tensor {
        let x = view4(input);
        let g = view4(grad);
        let win = pool_window(input.shape(), pool_size, strides, padding);
        let mut dx = Array4::<Elm>::zeros(x.raw_dim());
        for ((b, ch, oy, ox), &gv) in g.indexed_iter() {
            // 最初に見つかった最大値の位置にだけ勾配を流す
            let mut best: Option<((usize, usize), Elm)> = None;
            for ky in 0..pool_size.0 {
                for kx in 0..pool_size.1 {
                    if let Some((iy, ix)) = win.source(oy, ox, ky, kx) {
                        let v = x[[b, ch, iy, ix]];
                        if best.is_none_or(|(_, bv)| v > bv) {
                            best = Some(((iy, ix), v));
                        }
                    }
                }
            }
            if let Some(((iy, ix), _)) = best {
                dx[[b, ch, iy, ix]] += gv;
            }
        }
        dx.into_dyn()
    }

    fn avg_pool2d(
        input: &Self::Tensor,
        pool_size: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    ) -> Self::Tensor {
        let x = view4(input);
        let (n, c, _, _) = x.dim();
        let win = pool_window(input.shape(), pool_size, strides, padding);
        let (oh, ow) = win.output;
        let mut out = Array4::<Elm>::zeros((n, c, oh, ow));
        for ((b, ch, oy, ox), cell) in out.indexed_iter_mut() {
            let mut total = 0.0;
            let mut count = 0usize;
            for ky in 0..pool_size.0 {
                for kx in 0..pool_size.1 {
                    if let Some((iy, ix)) = win.source(oy, ox, ky, kx) {
                        total += x[[b, ch, iy, ix]];
                        count += 1;
                    }
                }
            }
            *cell = total / count.max(1) as Elm;
        }
        out.into_dyn()
    }

    fn avg_pool2d_backprop(
        input_shape: &[usize],
        grad: &Self::Tensor,
        pool_size: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    ) -> Self::Tensor {
        let g = view4(grad);
        let win = pool_window(input_shape, pool_size, strides, padding);
        let mut dx = Array4::<Elm>::zeros(dims4(input_shape));
        for ((b, ch, oy, ox), &gv) in g.indexed_iter() {
            let cells: Vec<(usize, usize)> = (0..pool_size.0)
                .flat_map(|ky| (0..pool_size.1).map(move |kx| (ky, kx)))
                .filter_map(|(ky, kx)| win.source(oy, ox, ky, kx))
                .collect();
            let share = gv / cells.len().max(1) as Elm;
            for (iy, ix) in cells {
                dx[[b, ch, iy, ix]] += share;
            }
        }
        dx.into_dyn()
    }
}

//! Nested, ordered collections of named tensors.
//!
//! A model, its gradient and every piece of optimizer state are all parameter
//! trees. Congruent trees list the same addresses, in the same order, with the
//! same shapes, so they can be walked in lock-step.

use std::{
    fmt,
    ops::{Add, Mul, Sub},
};

use crate::backend::{Backend, Elm};

/// One step of a [`ParamPath`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Field(&'static str),
    Index(usize),
}

/// Address of a leaf inside a parameter tree, e.g. `dense1.weight` or `layers[0].bias`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ParamPath(Vec<Segment>);

impl ParamPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn field(&self, name: &'static str) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Field(name));
        Self(segments)
    }

    pub fn index(&self, i: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(i));
        Self(segments)
    }

    pub fn join(&self, tail: &ParamPath) -> Self {
        let mut segments = self.0.clone();
        segments.extend_from_slice(&tail.0);
        Self(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Field(name) if i == 0 => write!(f, "{}", name)?,
                Segment::Field(name) => write!(f, ".{}", name)?,
                Segment::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

impl From<&'static str> for ParamPath {
    fn from(name: &'static str) -> Self {
        Self::root().field(name)
    }
}

/// Generic enumeration of the tensor leaves of a structure.
///
/// Implementors only list their leaves (and sub-trees) in declaration order;
/// everything else is derived from that order. Most implementations come from
/// [`parameter_tree!`](crate::parameter_tree).
pub trait ParameterTree<B: Backend> {
    fn collect_leaves<'a>(&'a self, prefix: &ParamPath, out: &mut Vec<(ParamPath, &'a B::Tensor)>);

    fn collect_leaves_mut<'a>(
        &'a mut self,
        prefix: &ParamPath,
        out: &mut Vec<(ParamPath, &'a mut B::Tensor)>,
    );

    fn leaves(&self) -> Vec<(ParamPath, &B::Tensor)> {
        let mut out = Vec::new();
        self.collect_leaves(&ParamPath::root(), &mut out);
        out
    }

    fn leaves_mut(&mut self) -> Vec<(ParamPath, &mut B::Tensor)> {
        let mut out = Vec::new();
        self.collect_leaves_mut(&ParamPath::root(), &mut out);
        out
    }

    fn addresses(&self) -> Vec<ParamPath> {
        self.leaves().into_iter().map(|(path, _)| path).collect()
    }

    fn shapes(&self) -> Vec<Vec<usize>> {
        self.leaves().into_iter().map(|(_, t)| B::shape(t)).collect()
    }

    /// Total number of scalar parameters.
    fn parameter_count(&self) -> usize {
        self.shapes()
            .iter()
            .map(|s| s.iter().product::<usize>())
            .sum()
    }

    fn is_congruent<T: ParameterTree<B> + ?Sized>(&self, other: &T) -> bool {
        first_mismatch::<B, _, _>(self, other).is_none()
    }

    /// Panics with the first differing address when the trees cannot be zipped.
    fn assert_congruent<T: ParameterTree<B> + ?Sized>(&self, other: &T) {
        if let Some(reason) = first_mismatch::<B, _, _>(self, other) {
            panic!("parameter trees are not congruent: {}", reason);
        }
    }

    /// All-zero tree with the same addresses and shapes.
    fn zeros_like(&self) -> TensorTree<B> {
        TensorTree::from_entries(
            self.leaves()
                .into_iter()
                .map(|(path, t)| (path, B::zeros_like(t)))
                .collect(),
        )
    }

    fn to_tensor_tree(&self) -> TensorTree<B> {
        TensorTree::from_entries(
            self.leaves()
                .into_iter()
                .map(|(path, t)| (path, t.clone()))
                .collect(),
        )
    }

    fn add_assign_tree<T: ParameterTree<B> + ?Sized>(&mut self, other: &T) {
        self.assert_congruent(other);
        let rhs = other.leaves();
        for ((_, p), (_, d)) in self.leaves_mut().into_iter().zip(rhs) {
            *p = B::add(p, d);
        }
    }

    fn sub_assign_tree<T: ParameterTree<B> + ?Sized>(&mut self, other: &T) {
        self.assert_congruent(other);
        let rhs = other.leaves();
        for ((_, p), (_, d)) in self.leaves_mut().into_iter().zip(rhs) {
            *p = B::sub(p, d);
        }
    }

    fn scale_in_place(&mut self, k: Elm) {
        for (_, p) in self.leaves_mut() {
            *p = B::scale(p, k);
        }
    }

    /// Moves the parameters along `direction`.
    ///
    /// Flat parameter spaces just add the direction. Trees living on a curved
    /// manifold override this with their own retraction.
    fn retract(&mut self, direction: &TensorTree<B>) {
        self.add_assign_tree(direction);
    }
}

fn first_mismatch<B, L, R>(lhs: &L, rhs: &R) -> Option<String>
where
    B: Backend,
    L: ParameterTree<B> + ?Sized,
    R: ParameterTree<B> + ?Sized,
{
    let left = lhs.leaves();
    let right = rhs.leaves();
    for ((lp, lt), (rp, rt)) in left.iter().zip(right.iter()) {
        if lp != rp {
            return Some(format!("address `{}` vs `{}`", lp, rp));
        }
        let (ls, rs) = (B::shape(lt), B::shape(rt));
        if ls != rs {
            return Some(format!("shape {:?} vs {:?} at `{}`", ls, rs, lp));
        }
    }
    match left.len().cmp(&right.len()) {
        std::cmp::Ordering::Equal => None,
        std::cmp::Ordering::Greater => Some(format!(
            "extra leaf `{}` on the left ({} vs {} leaves)",
            left[right.len()].0,
            left.len(),
            right.len()
        )),
        std::cmp::Ordering::Less => Some(format!(
            "extra leaf `{}` on the right ({} vs {} leaves)",
            right[left.len()].0,
            left.len(),
            right.len()
        )),
    }
}

/// Owned, address-ordered list of tensors: gradients and optimizer state.
#[derive(Debug, Clone)]
pub struct TensorTree<B: Backend> {
    entries: Vec<(ParamPath, B::Tensor)>,
}

impl<B: Backend> Default for TensorTree<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> TensorTree<B> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn from_entries(entries: Vec<(ParamPath, B::Tensor)>) -> Self {
        Self { entries }
    }

    /// All-zero tree congruent with `shape`.
    pub fn zeros<T: ParameterTree<B> + ?Sized>(shape: &T) -> Self {
        shape.zeros_like()
    }

    pub fn with_leaf(mut self, name: &'static str, tensor: B::Tensor) -> Self {
        self.entries.push((ParamPath::from(name), tensor));
        self
    }

    /// Appends every leaf of `child` under the field `name`.
    pub fn with_subtree(mut self, name: &'static str, child: TensorTree<B>) -> Self {
        let prefix = ParamPath::from(name);
        self.entries.extend(
            child
                .entries
                .into_iter()
                .map(|(path, t)| (prefix.join(&path), t)),
        );
        self
    }

    pub fn push(&mut self, path: ParamPath, tensor: B::Tensor) {
        self.entries.push((path, tensor));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &ParamPath) -> Option<&B::Tensor> {
        self.entries.iter().find(|(p, _)| p == path).map(|(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamPath, &B::Tensor)> {
        self.entries.iter().map(|(p, t)| (p, t))
    }

    pub fn into_entries(self) -> Vec<(ParamPath, B::Tensor)> {
        self.entries
    }

    pub fn map(&self, mut f: impl FnMut(&B::Tensor) -> B::Tensor) -> Self {
        Self::from_entries(
            self.entries
                .iter()
                .map(|(path, t)| (path.clone(), f(t)))
                .collect(),
        )
    }

    fn zip_with<T: ParameterTree<B> + ?Sized>(
        &self,
        other: &T,
        f: impl Fn(&B::Tensor, &B::Tensor) -> B::Tensor,
    ) -> Self {
        self.assert_congruent(other);
        Self::from_entries(
            self.entries
                .iter()
                .zip(other.leaves())
                .map(|((path, a), (_, b))| (path.clone(), f(a, b)))
                .collect(),
        )
    }

    pub fn add<T: ParameterTree<B> + ?Sized>(&self, other: &T) -> Self {
        self.zip_with(other, B::add)
    }

    pub fn sub<T: ParameterTree<B> + ?Sized>(&self, other: &T) -> Self {
        self.zip_with(other, B::sub)
    }

    pub fn scale(&self, k: Elm) -> Self {
        self.map(|t| B::scale(t, k))
    }

    /// Sum of squares over every leaf.
    pub fn squared_norm(&self) -> Elm {
        self.entries
            .iter()
            .map(|(_, t)| B::to_vec(t).iter().map(|v| v * v).sum::<Elm>())
            .sum()
    }
}

impl<B: Backend> ParameterTree<B> for TensorTree<B> {
    fn collect_leaves<'a>(&'a self, prefix: &ParamPath, out: &mut Vec<(ParamPath, &'a B::Tensor)>) {
        for (path, t) in &self.entries {
            out.push((prefix.join(path), t));
        }
    }

    fn collect_leaves_mut<'a>(
        &'a mut self,
        prefix: &ParamPath,
        out: &mut Vec<(ParamPath, &'a mut B::Tensor)>,
    ) {
        for (path, t) in &mut self.entries {
            out.push((prefix.join(path), t));
        }
    }
}

impl<B: Backend> Add for TensorTree<B> {
    type Output = TensorTree<B>;
    fn add(self, rhs: Self) -> Self::Output {
        TensorTree::add(&self, &rhs)
    }
}

impl<B: Backend> Add<&TensorTree<B>> for &TensorTree<B> {
    type Output = TensorTree<B>;
    fn add(self, rhs: &TensorTree<B>) -> Self::Output {
        TensorTree::add(self, rhs)
    }
}

impl<B: Backend> Sub for TensorTree<B> {
    type Output = TensorTree<B>;
    fn sub(self, rhs: Self) -> Self::Output {
        TensorTree::sub(&self, &rhs)
    }
}

impl<B: Backend> Sub<&TensorTree<B>> for &TensorTree<B> {
    type Output = TensorTree<B>;
    fn sub(self, rhs: &TensorTree<B>) -> Self::Output {
        TensorTree::sub(self, rhs)
    }
}

impl<B: Backend> Mul<Elm> for TensorTree<B> {
    type Output = TensorTree<B>;
    fn mul(self, k: Elm) -> Self::Output {
        self.scale(k)
    }
}

impl<B: Backend> Mul<Elm> for &TensorTree<B> {
    type Output = TensorTree<B>;
    fn mul(self, k: Elm) -> Self::Output {
        self.scale(k)
    }
}

impl<B: Backend> ParameterTree<B> for () {
    fn collect_leaves<'a>(&'a self, _: &ParamPath, _: &mut Vec<(ParamPath, &'a B::Tensor)>) {}

    fn collect_leaves_mut<'a>(
        &'a mut self,
        _: &ParamPath,
        _: &mut Vec<(ParamPath, &'a mut B::Tensor)>,
    ) {
    }
}

impl<B: Backend, T: ParameterTree<B>> ParameterTree<B> for Vec<T> {
    fn collect_leaves<'a>(&'a self, prefix: &ParamPath, out: &mut Vec<(ParamPath, &'a B::Tensor)>) {
        for (i, item) in self.iter().enumerate() {
            item.collect_leaves(&prefix.index(i), out);
        }
    }

    fn collect_leaves_mut<'a>(
        &'a mut self,
        prefix: &ParamPath,
        out: &mut Vec<(ParamPath, &'a mut B::Tensor)>,
    ) {
        for (i, item) in self.iter_mut().enumerate() {
            item.collect_leaves_mut(&prefix.index(i), out);
        }
    }
}

/// Implements [`ParameterTree`] for a struct from its ordered fields.
///
/// `leaf` fields are tensors, `tree` fields are nested parameter trees. The
/// enumeration order is the order written here.
///
/// ```ignore
/// parameter_tree!(impl<B> for Dense<B> { leaf weight, leaf bias });
/// parameter_tree!(impl<B, A, C> for Chain<A, C>
///     where A: ParameterTree<B>, C: ParameterTree<B>
///     { tree first, tree second });
/// ```
#[macro_export]
macro_rules! parameter_tree {
    (@visit $b:ident, leaf, $value:expr, $path:expr, $out:ident) => {
        $out.push(($path, &$value));
    };
    (@visit $b:ident, tree, $value:expr, $path:expr, $out:ident) => {
        $crate::engine::tree::ParameterTree::<$b>::collect_leaves(&$value, &$path, $out);
    };
    (@visit_mut $b:ident, leaf, $value:expr, $path:expr, $out:ident) => {
        $out.push(($path, &mut $value));
    };
    (@visit_mut $b:ident, tree, $value:expr, $path:expr, $out:ident) => {
        $crate::engine::tree::ParameterTree::<$b>::collect_leaves_mut(&mut $value, &$path, $out);
    };
    (
        impl<$b:ident $(, $g:ident)*> for $ty:ty
        $(where $($wty:ty : $wbound:path),+ $(,)?)?
        { $($kind:ident $field:ident),* $(,)? }
    ) => {
        impl<$b: $crate::backend::Backend $(, $g)*> $crate::engine::tree::ParameterTree<$b> for $ty
        $(where $($wty: $wbound),+)?
        {
            #[allow(unused_variables)]
            fn collect_leaves<'a>(
                &'a self,
                prefix: &$crate::engine::tree::ParamPath,
                out: &mut Vec<(
                    $crate::engine::tree::ParamPath,
                    &'a <$b as $crate::backend::Backend>::Tensor,
                )>,
            ) {
                $(
                    $crate::parameter_tree!(
                        @visit $b, $kind, self.$field, prefix.field(stringify!($field)), out
                    );
                )*
            }

            #[allow(unused_variables)]
            fn collect_leaves_mut<'a>(
                &'a mut self,
                prefix: &$crate::engine::tree::ParamPath,
                out: &mut Vec<(
                    $crate::engine::tree::ParamPath,
                    &'a mut <$b as $crate::backend::Backend>::Tensor,
                )>,
            ) {
                $(
                    $crate::parameter_tree!(
                        @visit_mut $b, $kind, self.$field, prefix.field(stringify!($field)), out
                    );
                )*
            }
        }
    };
}

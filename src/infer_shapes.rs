//! Traits for symbolic shape inference and common implementations.

use std::error::Error;
use std::fmt;

use smallvec::SmallVec;

use crate::analysis::ShapeAnalysis;
use crate::graph::{OpKind, OpRef, ValueId};
use crate::shape_or_data::{ShapeOrData, TensorShapeOrData};
use crate::sym_expr::DimExpr;

/// Errors from inferring the shapes of an operator's results.
#[derive(Clone, Debug, PartialEq)]
pub enum InferError {
    /// A required attribute is absent.
    MissingAttribute(String),

    /// An attribute has a different type than the operator requires.
    WrongAttributeType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// An operand has no shape record yet.
    ///
    /// This indicates the operator was visited before the operator defining
    /// its operand, or that a graph input was not seeded.
    ValueNotYetInferred(ValueId),

    /// An operand's values must be known literals for shape inference, but
    /// are not.
    UnsupportedDynamicOperand(String),

    /// There is no shape inference rule for this operator.
    UnimplementedOperator(String),

    /// Operand records or attributes are inconsistent with what the operator
    /// accepts.
    InvariantViolation(String),
}

impl fmt::Display for InferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAttribute(name) => write!(f, "missing attribute \"{}\"", name),
            Self::WrongAttributeType {
                name,
                expected,
                actual,
            } => write!(
                f,
                "attribute \"{}\" has type {}, expected {}",
                name, actual, expected
            ),
            Self::ValueNotYetInferred(value) => {
                write!(f, "value {} has no shape record", value)
            }
            Self::UnsupportedDynamicOperand(what) => {
                write!(f, "{} must be a known constant", what)
            }
            Self::UnimplementedOperator(name) => {
                write!(f, "shape inference not implemented for {}", name)
            }
            Self::InvariantViolation(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error for InferError {}

/// Return an [`InferError::InvariantViolation`] with a formatted message.
macro_rules! invariant_err {
    ($($arg:tt)*) => {
        $crate::infer_shapes::InferError::InvariantViolation(format!($($arg)*))
    };
}
pub(crate) use invariant_err;

/// Infer the symbolic shapes of an operator's results.
pub trait InferSymbolicShape {
    /// Infer the shape, and for shape-producing operators the values, of each
    /// of `op`'s results.
    ///
    /// Implementations read operand records from `analysis` and may use it to
    /// create new symbols or register constraints. They return one record per
    /// result and do not write records themselves. All fallible reads happen
    /// before any constraint is registered.
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError>;
}

/// Return the tensor record of operand `index` of `op`.
pub(crate) fn operand_tensor<'a>(
    op: &OpRef,
    analysis: &'a ShapeAnalysis,
    index: usize,
) -> Result<&'a TensorShapeOrData, InferError> {
    analysis.tensor(op.operand(index)?)
}

/// Return the list of dimensions an operand contributes to a shape
/// computation.
///
/// This is the operand's data if it has any, since then the operand is itself
/// a shape, and otherwise its shape. The data of a constant fill is a single
/// fill value rather than a shape, so it is never used.
pub(crate) fn operand_dims(
    op: &OpRef,
    analysis: &ShapeAnalysis,
    index: usize,
) -> Result<Vec<DimExpr>, InferError> {
    let tensor = operand_tensor(op, analysis, index)?;
    let is_fill = op.operand_producer(index) == Some(OpKind::Full);
    match tensor.data() {
        Some(data) if !is_fill => Ok(data.to_vec()),
        _ => Ok(tensor.shape().to_vec()),
    }
}

/// Return the values of operand `index`, which must all be known literals.
///
/// `what` describes the operand in the error.
pub(crate) fn literal_operand(
    op: &OpRef,
    analysis: &ShapeAnalysis,
    index: usize,
    what: &str,
) -> Result<Vec<i64>, InferError> {
    operand_tensor(op, analysis, index)?
        .literal_data()
        .ok_or_else(|| InferError::UnsupportedDynamicOperand(format!("{} of {}", what, op.name())))
}

/// Shape inference for operators whose single result has the same record as
/// their first operand.
pub struct SameShape;

impl InferSymbolicShape for SameShape {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let input = analysis.shape_or_data(op.operand(0)?)?;
        Ok([input.clone()].into())
    }
}

/// Shape inference for elementwise binary operators.
///
/// The result shape is the broadcast of the operand shapes. Shapes are aligned
/// from the last dimension, with the shorter one padded with leading 1s.
pub struct ElementwiseBinary;

impl InferSymbolicShape for ElementwiseBinary {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let lhs = operand_dims(op, analysis, 0)?;
        let rhs = operand_dims(op, analysis, 1)?;
        let shape = broadcast_shapes(analysis, &lhs, &rhs);
        Ok([TensorShapeOrData::from_shape(shape).into()].into())
    }
}

/// Broadcast two shapes together.
pub(crate) fn broadcast_shapes(
    analysis: &mut ShapeAnalysis,
    lhs: &[DimExpr],
    rhs: &[DimExpr],
) -> Vec<DimExpr> {
    let lhs_pad = rhs.len().saturating_sub(lhs.len());
    let rhs_pad = lhs.len().saturating_sub(rhs.len());
    let one = DimExpr::Value(1);

    let lhs_iter = std::iter::repeat_n(&one, lhs_pad).chain(lhs);
    let rhs_iter = std::iter::repeat_n(&one, rhs_pad).chain(rhs);

    let mut builder = analysis.builder();
    lhs_iter
        .zip(rhs_iter)
        .map(|(a, b)| builder.broadcast(a, b))
        .collect()
}

/// Compute the shape of a reduction's result.
///
/// `axes` may be negative, in which case they count back from the last
/// dimension. An empty list of axes, or one that covers every dimension,
/// reduces all dimensions. Reduced dimensions become 1 if `keepdim` is true
/// and are removed otherwise.
pub fn reduce_infer_dim(
    input: &[DimExpr],
    axes: &[i64],
    keepdim: bool,
    reduce_all: bool,
) -> Result<Vec<DimExpr>, InferError> {
    let ndim = input.len();
    let mut axes = resolve_axes(ndim, axes.iter())?;
    axes.sort();
    axes.dedup();

    let reduce_all = reduce_all || axes.is_empty() || axes.len() == ndim;

    let out_shape = input
        .iter()
        .enumerate()
        .filter_map(|(i, dim)| {
            if !reduce_all && !axes.contains(&i) {
                Some(dim.clone())
            } else if keepdim {
                Some(DimExpr::Value(1))
            } else {
                None
            }
        })
        .collect();
    Ok(out_shape)
}

/// Resolve an index given as a value in `[-len, len-1]` to a positive index in
/// `[0, len)`, or return None if the index is out of bounds.
fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let len = len.min(i64::MAX as usize) as i64;
    if index < -len || index >= len {
        return None;
    }

    if index >= 0 {
        Some(index as usize)
    } else {
        Some((len + index) as usize)
    }
}

/// Resolve an axis given as a value in `[-ndim, ndim-1]` to the zero-based
/// dimension of a tensor with `ndim` dimensions.
///
/// Negative axis values count backwards from the last dimension.
pub(crate) fn resolve_axis(ndim: usize, axis: i64) -> Result<usize, InferError> {
    resolve_index(ndim, axis)
        .ok_or_else(|| invariant_err!("axis {} is out of range for rank {}", axis, ndim))
}

/// Resolve a sequence of axes values in `[-ndim, ndim-1]` to zero-based
/// dimension indexes in a tensor with `ndim` dimensions.
///
/// Negative axis values count backwards from the last dimension.
pub(crate) fn resolve_axes<'a, I: ExactSizeIterator<Item = &'a i64>>(
    ndim: usize,
    axes: I,
) -> Result<SmallVec<[usize; 4]>, InferError> {
    let mut resolved_axes = SmallVec::with_capacity(axes.len());
    for axis in axes {
        let resolved = resolve_axis(ndim, *axis)?;
        resolved_axes.push(resolved);
    }
    Ok(resolved_axes)
}

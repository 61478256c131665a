//! Shape inference for operators which produce values or shapes.
//!
//! Layout, slicing, reduction and matrix product rules live in submodules.

mod layout;
mod matmul;
mod reduce;
mod slice;

pub use layout::{CinnConcat, CinnReshape, Concat, Reshape, Squeeze, Stack, Tile, Unsqueeze};
pub use matmul::Matmul;
pub use reduce::{CinnReduce, Reduce};
pub use slice::{CinnSlice, Slice};

use crate::analysis::ShapeAnalysis;
use crate::graph::{Attribute, OpRef};
use crate::infer_shapes::{
    InferError, InferSymbolicShape, invariant_err, operand_dims, operand_tensor,
};
use crate::shape_or_data::{ShapeOrData, TensorShapeOrData};
use crate::sym_expr::DimExpr;

/// Graph input with a declared shape.
///
/// Dimensions declared as `-1` are unknown and get a new symbol.
pub struct Data;

impl InferSymbolicShape for Data {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let dims: Vec<i64> = op.attr("shape")?;
        if let Some(dim) = dims.iter().find(|&&d| d < -1) {
            return Err(invariant_err!("invalid dimension {} in data shape", dim));
        }

        let shape = dims
            .into_iter()
            .map(|dim| match dim {
                -1 => analysis.next_symbol(),
                dim => DimExpr::Value(dim),
            })
            .collect();
        Ok([TensorShapeOrData::from_shape(shape).into()].into())
    }
}

/// Constant integer vector.
pub struct FullIntArray;

impl InferSymbolicShape for FullIntArray {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        _analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let values: Vec<i64> = op.attr("value")?;
        let data = values.into_iter().map(DimExpr::Value).collect();
        Ok([TensorShapeOrData::from_data(data).into()].into())
    }
}

/// Tensor of a static shape filled with a constant.
///
/// The fill value is kept as the record's data. Float values are truncated.
pub struct Full;

impl InferSymbolicShape for Full {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        _analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let dims: Vec<i64> = op.attr("shape")?;
        let value = match op.get_attr("value") {
            Some(Attribute::Int(value)) => *value,
            Some(Attribute::Float(value)) if value.is_finite() => value.trunc() as i64,
            Some(Attribute::Float(value)) => {
                return Err(invariant_err!("fill value {} is not finite", value));
            }
            Some(attr) => {
                return Err(InferError::WrongAttributeType {
                    name: "value".into(),
                    expected: "int or float",
                    actual: attr.type_name(),
                });
            }
            None => return Err(InferError::MissingAttribute("value".into())),
        };

        let shape = dims.into_iter().map(DimExpr::Value).collect();
        let record = TensorShapeOrData::fill(shape, DimExpr::Value(value));
        Ok([record.into()].into())
    }
}

/// Shape of a tensor, as a vector.
pub struct Shape;

impl InferSymbolicShape for Shape {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let input = operand_tensor(op, analysis, 0)?;
        let record = TensorShapeOrData::from_data(input.shape().to_vec());
        Ok([record.into()].into())
    }
}

/// Range of values `start..end` with a given step.
///
/// The length is `(end - start) / step` using truncating division, so for
/// ranges whose length is not a multiple of `step` it is one less than the
/// true length.
pub struct Arange;

impl Arange {
    /// Return the scalar value of an operand, or its leading dimension if its
    /// value is unknown.
    fn scalar(op: &OpRef, analysis: &ShapeAnalysis, index: usize) -> Result<DimExpr, InferError> {
        let tensor = operand_tensor(op, analysis, index)?;
        tensor
            .data()
            .and_then(|data| data.first())
            .or_else(|| tensor.shape().first())
            .cloned()
            .ok_or_else(|| invariant_err!("arange operand {} has no value or size", index))
    }
}

impl InferSymbolicShape for Arange {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let start = Self::scalar(op, analysis, 0)?;
        let end = Self::scalar(op, analysis, 1)?;
        let step = Self::scalar(op, analysis, 2)?;
        let len = (end - start) / step;
        Ok([TensorShapeOrData::from_shape(vec![len]).into()].into())
    }
}

/// Embedding lookup.
///
/// The result has the shape of the indices followed by the embedding size.
pub struct Embedding;

impl InferSymbolicShape for Embedding {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let mut out_shape = operand_dims(op, analysis, 0)?;
        let weight = operand_dims(op, analysis, 1)?;
        let Some(embed_size) = weight.get(1) else {
            return Err(invariant_err!(
                "embedding weight has rank {}, expected at least 2",
                weight.len()
            ));
        };
        out_shape.push(embed_size.clone());
        Ok([TensorShapeOrData::from_shape(out_shape).into()].into())
    }
}

/// Gather slices of `x` selected by the last dimension of `index`.
///
/// The result shape is `index.shape[:-1] + x.shape[index.shape[-1]:]`.
pub struct GatherNd;

impl InferSymbolicShape for GatherNd {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let x = operand_dims(op, analysis, 0)?;
        let index = operand_dims(op, analysis, 1)?;

        let Some((index_depth, batch_dims)) = index.split_last() else {
            return Err(invariant_err!("gather_nd index has rank 0"));
        };
        let Some(index_depth) = index_depth.as_value() else {
            return Err(InferError::UnsupportedDynamicOperand(format!(
                "last index dimension ({}) of {}",
                index_depth,
                op.name()
            )));
        };
        let index_depth = usize::try_from(index_depth)
            .ok()
            .filter(|&depth| depth <= x.len())
            .ok_or_else(|| {
                invariant_err!(
                    "gather_nd index depth {} exceeds input rank {}",
                    index_depth,
                    x.len()
                )
            })?;

        let out_shape = batch_dims
            .iter()
            .chain(&x[index_depth..])
            .cloned()
            .collect();
        Ok([TensorShapeOrData::from_shape(out_shape).into()].into())
    }
}

/// Pack operand records into a tensor list.
pub struct Combine;

impl InferSymbolicShape for Combine {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let list = op
            .operands()
            .iter()
            .map(|&value| analysis.tensor(value).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Ok([ShapeOrData::TensorList(list)].into())
    }
}

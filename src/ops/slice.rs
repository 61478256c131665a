use crate::analysis::ShapeAnalysis;
use crate::graph::OpRef;
use crate::infer_shapes::{
    InferError, InferSymbolicShape, invariant_err, literal_operand, operand_tensor,
    resolve_axis,
};
use crate::shape_or_data::{ShapeOrData, TensorShapeOrData};
use crate::sym_expr::DimExpr;

/// End value meaning "slice to the end of the dimension".
const END_OF_DIM: i64 = i32::MAX as i64;

/// Resolve a `start..end` range over a sequence of length `len`.
///
/// Negative bounds count back from the end. Both bounds are then clamped to
/// `[0, len]`, so an empty range is returned if `end <= start`.
fn clamp_range(start: i64, end: i64, len: usize) -> std::ops::Range<usize> {
    let len = len as i64;
    let resolve = |idx: i64| {
        let idx = if idx < 0 { idx + len } else { idx };
        idx.clamp(0, len) as usize
    };
    let start = resolve(start);
    let end = resolve(end).max(start);
    start..end
}

/// Slice operator with `starts` and `ends` operands and an `axes`
/// attribute.
///
/// If the source has known values, the first start and end are applied to the
/// values and the result is a known vector. Otherwise each sliced dimension
/// is computed from the start, end and source dimension.
pub struct Slice;

impl InferSymbolicShape for Slice {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let source = operand_tensor(op, analysis, 0)?;
        let starts = literal_operand(op, analysis, 1, "starts")?;
        let ends = literal_operand(op, analysis, 2, "ends")?;
        let axes: Vec<i64> = op.attr("axes")?;

        if let Some(data) = source.data() {
            let (Some(&start), Some(&end)) = (starts.first(), ends.first()) else {
                return Err(invariant_err!("slice of known values has no start or end"));
            };
            let out_data = data[clamp_range(start, end, data.len())].to_vec();
            return Ok([TensorShapeOrData::from_data(out_data).into()].into());
        }

        if starts.len() < axes.len() || ends.len() < axes.len() {
            return Err(invariant_err!(
                "slice has {} axes but {} starts and {} ends",
                axes.len(),
                starts.len(),
                ends.len()
            ));
        }

        let rank = source.rank();
        let mut out_shape = source.shape().to_vec();
        for ((&axis, &start), &end) in axes.iter().zip(&starts).zip(&ends) {
            let axis = if axis >= 0 {
                axis
            } else {
                (axis + rank as i64).max(0)
            } as usize;
            let Some(dim) = out_shape.get(axis).cloned() else {
                return Err(invariant_err!(
                    "slice axis {} is out of range for rank {}",
                    axis,
                    rank
                ));
            };
            out_shape[axis] = sliced_dim(dim, start, end);
        }

        Ok([TensorShapeOrData::from_shape(out_shape).into()].into())
    }
}

/// Return the size of a dimension of size `dim` after slicing it from
/// `start` to `end`.
///
/// Both bounds are assumed to be in range, so no clamping is applied.
fn sliced_dim(dim: DimExpr, start: i64, end: i64) -> DimExpr {
    let end_expr = if end == END_OF_DIM {
        dim.clone()
    } else {
        DimExpr::Value(end)
    };
    let start_expr = DimExpr::Value(start);

    if (start >= 0 && end >= 0) || (start <= 0 && end <= 0) {
        end_expr - start_expr
    } else if start <= 0 {
        // Negative start, positive end.
        end_expr - start_expr - dim
    } else {
        // Positive start, negative end.
        dim - start_expr + end_expr
    }
}

/// CINN slice, with a single start, end and axis given as attributes.
pub struct CinnSlice;

impl CinnSlice {
    fn first_attr(op: &OpRef, name: &str) -> Result<i64, InferError> {
        let values: Vec<i64> = op.attr(name)?;
        values
            .first()
            .copied()
            .ok_or_else(|| invariant_err!("attribute \"{}\" of {} is empty", name, op.name()))
    }
}

impl InferSymbolicShape for CinnSlice {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let start = Self::first_attr(op, "starts")?;
        let end = Self::first_attr(op, "ends")?;
        let axis = Self::first_attr(op, "axes")?;
        let source = operand_tensor(op, analysis, 0)?;

        if let Some(data) = source.data() {
            let out_data = data[clamp_range(start, end, data.len())].to_vec();
            return Ok([TensorShapeOrData::from_data(out_data).into()].into());
        }

        let axis = resolve_axis(source.rank(), axis)?;
        let mut out_shape = source.shape().to_vec();
        out_shape[axis] = if end == END_OF_DIM {
            out_shape[axis].clone() - DimExpr::Value(start)
        } else {
            DimExpr::Value(end) - DimExpr::Value(start)
        };
        Ok([TensorShapeOrData::from_shape(out_shape).into()].into())
    }
}

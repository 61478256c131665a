use smallvec::SmallVec;
use tracing::warn;

use crate::analysis::ShapeAnalysis;
use crate::graph::OpRef;
use crate::infer_shapes::{
    InferError, InferSymbolicShape, invariant_err, literal_operand, operand_dims,
    operand_tensor, resolve_axis,
};
use crate::shape_or_data::{ShapeOrData, TensorShapeOrData};
use crate::sym_expr::DimExpr;

/// Reshape operator with the target shape given as operand 1.
///
/// One `-1` entry in the target shape is replaced by the number of elements
/// divided by the product of the other entries. If there are several `-1`
/// entries only the last is resolved.
///
/// A second result, if present, receives the record of the shape operand.
pub struct Reshape;

impl InferSymbolicShape for Reshape {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let input = operand_tensor(op, analysis, 0)?;
        let shape_value = op.operand(1)?;
        let shape_record = analysis.shape_or_data(shape_value)?;
        let target = analysis.tensor(shape_value)?.data().ok_or_else(|| {
            InferError::UnsupportedDynamicOperand(format!("shape of {}", op.name()))
        })?;

        let out_shape = resolve_reshape(input.shape(), target);
        if out_shape.iter().any(|dim| dim.is(-1)) {
            warn!(
                op = %op.name(),
                shape = ?target,
                "Reshape target has more than one -1 entry, only the last is resolved"
            );
        }

        let mut results = vec![TensorShapeOrData::from_shape(out_shape).into()];
        if op.results().len() > 1 {
            results.push(shape_record.clone());
        }
        Ok(results)
    }
}

/// Compute the output shape of a reshape from the input shape and a target
/// shape which may contain `-1` entries.
fn resolve_reshape(input: &[DimExpr], target: &[DimExpr]) -> Vec<DimExpr> {
    let numel = DimExpr::product(input);
    let product = DimExpr::product(target.iter().filter(|dim| !dim.is(-1)));

    let mut out_shape = target.to_vec();
    if let Some(wildcard) = out_shape.iter().rposition(|dim| dim.is(-1)) {
        out_shape[wildcard] = numel / product;
    }
    out_shape
}

/// CINN reshape, with the target shape given as literals in the `shape`
/// attribute.
pub struct CinnReshape;

impl InferSymbolicShape for CinnReshape {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        _analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let shape: Vec<i64> = op.attr("shape")?;
        let out_shape = shape.into_iter().map(DimExpr::Value).collect();
        Ok([TensorShapeOrData::from_shape(out_shape).into()].into())
    }
}

/// Remove dimensions of size 1.
///
/// With no axes every literal 1 is removed. With explicit axes, each listed
/// dimension is removed if it is a literal 1 and kept if it is another literal.
pub struct Squeeze;

impl InferSymbolicShape for Squeeze {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let input = operand_dims(op, analysis, 0)?;
        let axes = literal_operand(op, analysis, 1, "axes")?;

        let mut squeeze = vec![false; input.len()];
        if axes.is_empty() {
            for (flag, dim) in squeeze.iter_mut().zip(&input) {
                *flag = dim.is(1);
            }
        } else if !input.is_empty() {
            for &axis in &axes {
                let axis = resolve_axis(input.len(), axis)?;
                let dim = &input[axis];
                if dim.is(1) {
                    squeeze[axis] = true;
                } else if !dim.is_value() {
                    return Err(InferError::UnsupportedDynamicOperand(format!(
                        "squeezed dimension {} ({}) of {}",
                        axis,
                        dim,
                        op.name()
                    )));
                }
            }
        }

        let out_shape = input
            .into_iter()
            .zip(squeeze)
            .filter_map(|(dim, squeeze)| (!squeeze).then_some(dim))
            .collect();
        Ok([TensorShapeOrData::from_shape(out_shape).into()].into())
    }
}

/// Insert dimensions of size 1.
///
/// Axes are applied in order, each one relative to the rank after inserting
/// the previous ones.
pub struct Unsqueeze;

impl InferSymbolicShape for Unsqueeze {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let axes = literal_operand(op, analysis, 1, "axes")?;

        // Unsqueezing a known scalar produces a known vector. This shows up
        // when a shape is rebuilt from individual dimensions.
        let input = operand_tensor(op, analysis, 0)?;
        if input.rank() == 0
            && axes == [0]
            && let Some(data) = input.data()
        {
            return Ok([TensorShapeOrData::from_data(data.to_vec()).into()].into());
        }

        let input = operand_dims(op, analysis, 0)?;
        let out_shape = unsqueeze_shape(&input, &axes)?;
        Ok([TensorShapeOrData::from_shape(out_shape).into()].into())
    }
}

fn unsqueeze_shape(input: &[DimExpr], axes: &[i64]) -> Result<Vec<DimExpr>, InferError> {
    let out_rank = input.len() + axes.len();

    // Marks positions in the output which hold an inserted 1.
    let mut inserted: SmallVec<[bool; 8]> = SmallVec::from_elem(false, out_rank);
    let mut cur_rank = input.len();

    for &axis in axes {
        let pos = if axis < 0 {
            axis + cur_rank as i64 + 1
        } else {
            axis
        };
        let pos = usize::try_from(pos)
            .ok()
            .filter(|&pos| pos <= cur_rank)
            .ok_or_else(|| {
                invariant_err!(
                    "unsqueeze axis {} is out of range for rank {}",
                    axis,
                    cur_rank
                )
            })?;

        // Shift earlier insertions at or after `pos` right by one.
        for i in (pos..cur_rank).rev() {
            if inserted[i] {
                inserted[i + 1] = true;
                inserted[i] = false;
            }
        }
        inserted[pos] = true;
        cur_rank += 1;
    }

    let mut input_dims = input.iter();
    let out_shape = inserted
        .iter()
        .map(|&is_inserted| {
            if is_inserted {
                Some(DimExpr::Value(1))
            } else {
                input_dims.next().cloned()
            }
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| invariant_err!("unsqueeze axes {:?} overlap", axes))?;
    Ok(out_shape)
}

/// Repeat a tensor along each dimension.
pub struct Tile;

impl InferSymbolicShape for Tile {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let input = operand_dims(op, analysis, 0)?;
        let mut repeats = operand_dims(op, analysis, 1)?;
        if repeats.is_empty() {
            repeats = vec![DimExpr::Value(1); input.len()];
        }

        let out_rank = input.len().max(repeats.len());
        let one = DimExpr::Value(1);
        let pad = |dims: &[DimExpr]| -> Vec<DimExpr> {
            std::iter::repeat_n(&one, out_rank - dims.len())
                .chain(dims)
                .cloned()
                .collect()
        };

        let out_shape = pad(&input)
            .into_iter()
            .zip(pad(&repeats))
            .map(|(dim, repeat)| dim * repeat)
            .collect();
        Ok([TensorShapeOrData::from_shape(out_shape).into()].into())
    }
}

/// Check that a set of shapes can be joined along `axis` and return the
/// resolved axis.
///
/// `axis` is resolved as `max(0, axis + rank)` when negative.
fn resolve_join_axis(shapes: &[&[DimExpr]], axis: i64) -> Result<usize, InferError> {
    let Some(first) = shapes.first() else {
        return Err(invariant_err!("cannot concatenate an empty list"));
    };
    let rank = first.len();
    if let Some(other) = shapes.iter().find(|s| s.len() != rank) {
        return Err(invariant_err!(
            "cannot concatenate tensors of rank {} and {}",
            rank,
            other.len()
        ));
    }

    let resolved = if axis >= 0 {
        axis
    } else {
        (axis + rank as i64).max(0)
    } as usize;
    if resolved >= rank {
        return Err(invariant_err!(
            "concat axis {} is out of range for rank {}",
            axis,
            rank
        ));
    }
    Ok(resolved)
}

/// Register that every dimension except `skip_axis` is equal across
/// `shapes`.
fn cstr_eq_along_axes(
    analysis: &mut ShapeAnalysis,
    shapes: &[&[DimExpr]],
    skip_axis: Option<usize>,
) {
    let [first, rest @ ..] = shapes else {
        return;
    };
    let mut builder = analysis.builder();
    for axis in (0..first.len()).filter(|&a| Some(a) != skip_axis) {
        for shape in rest {
            builder.cstr_eq(&first[axis], &shape[axis]);
        }
    }
}

/// Concatenate shapes along `axis`, registering equality constraints for the
/// other dimensions.
fn concat_shapes(
    analysis: &mut ShapeAnalysis,
    shapes: &[&[DimExpr]],
    axis: i64,
) -> Result<Vec<DimExpr>, InferError> {
    let axis = resolve_join_axis(shapes, axis)?;
    cstr_eq_along_axes(analysis, shapes, Some(axis));

    let mut out_shape = shapes[0].to_vec();
    out_shape[axis] = shapes[1..]
        .iter()
        .fold(out_shape[axis].clone(), |sum, shape| {
            sum + shape[axis].clone()
        });
    Ok(out_shape)
}

/// Concatenate a tensor list (operand 0) along the axis given by the value of
/// operand 1.
pub struct Concat;

impl InferSymbolicShape for Concat {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let list = analysis.tensor_list(op.operand(0)?)?.to_vec();
        let axis = literal_operand(op, analysis, 1, "axis")?;
        let Some(&axis) = axis.first() else {
            return Err(invariant_err!("concat axis has no value"));
        };

        let shapes: Vec<&[DimExpr]> = list.iter().map(|t| t.shape()).collect();
        let out_shape = concat_shapes(analysis, &shapes, axis)?;
        Ok([TensorShapeOrData::from_shape(out_shape).into()].into())
    }
}

/// CINN concat, which takes the tensors as separate operands and the axis as
/// an attribute.
pub struct CinnConcat;

impl InferSymbolicShape for CinnConcat {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let axis: i64 = op.attr("axis")?;
        let inputs = op
            .operands()
            .iter()
            .map(|&value| analysis.tensor(value).cloned())
            .collect::<Result<Vec<_>, _>>()?;

        let shapes: Vec<&[DimExpr]> = inputs.iter().map(|t| t.shape()).collect();
        let out_shape = concat_shapes(analysis, &shapes, axis)?;
        Ok([TensorShapeOrData::from_shape(out_shape).into()].into())
    }
}

/// Return the value of a rank-0 record with known data.
fn known_scalar(tensor: &TensorShapeOrData) -> Option<DimExpr> {
    match tensor.data() {
        Some([value]) if tensor.rank() == 0 => Some(value.clone()),
        _ => None,
    }
}

/// Stack a tensor list (operand 0) along a new axis.
///
/// Stacking known scalars along axis 0 produces a known vector. Any other
/// list, including one of known vectors or constant fills, is stacked by
/// shape.
pub struct Stack;

impl InferSymbolicShape for Stack {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let axis: i64 = op.attr("axis")?;
        let list = analysis.tensor_list(op.operand(0)?)?.to_vec();
        let Some(first) = list.first() else {
            return Err(invariant_err!("cannot stack an empty list"));
        };

        let rank = first.rank();
        let resolved = if axis < 0 {
            axis + rank as i64 + 1
        } else {
            axis
        };
        let axis = usize::try_from(resolved)
            .ok()
            .filter(|&a| a <= rank)
            .ok_or_else(|| {
                invariant_err!("stack axis {} is out of range for rank {}", axis, rank)
            })?;

        let count = DimExpr::Value(list.len() as i64);

        if axis == 0 {
            let data: Option<Vec<DimExpr>> = list.iter().map(known_scalar).collect();
            if let Some(data) = data {
                return Ok([TensorShapeOrData::from_data(data).into()].into());
            }
        }

        let shapes: Vec<&[DimExpr]> = list.iter().map(|t| t.shape()).collect();
        if let Some(other) = shapes.iter().find(|s| s.len() != rank) {
            return Err(invariant_err!(
                "cannot stack tensors of rank {} and {}",
                rank,
                other.len()
            ));
        }
        cstr_eq_along_axes(analysis, &shapes, None);

        let mut out_shape = first.shape().to_vec();
        out_shape.insert(axis, count);
        Ok([TensorShapeOrData::from_shape(out_shape).into()].into())
    }
}

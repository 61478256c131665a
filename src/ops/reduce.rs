use crate::analysis::ShapeAnalysis;
use crate::graph::OpRef;
use crate::infer_shapes::{
    InferError, InferSymbolicShape, literal_operand, operand_dims, reduce_infer_dim,
};
use crate::shape_or_data::{ShapeOrData, TensorShapeOrData};

/// Reduction with the axes given as the values of operand 1.
///
/// Operators differ in the names of their attributes, so these are
/// configurable.
pub struct Reduce {
    /// Name of the boolean attribute that keeps reduced dimensions as 1s.
    pub keepdim_attr: &'static str,

    /// Name of the boolean attribute that requests reducing over all
    /// dimensions, if the operator has one.
    pub reduce_all_attr: Option<&'static str>,
}

impl InferSymbolicShape for Reduce {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let keepdim: bool = op.attr(self.keepdim_attr)?;
        let reduce_all = match self.reduce_all_attr {
            Some(name) => op.attr(name)?,
            None => false,
        };
        let input = operand_dims(op, analysis, 0)?;
        let axes = literal_operand(op, analysis, 1, "axes")?;

        let shape = reduce_infer_dim(&input, &axes, keepdim, reduce_all)?;
        Ok([TensorShapeOrData::from_shape(shape).into()].into())
    }
}

/// CINN reduction, with the axes in the `dim` attribute.
pub struct CinnReduce;

impl InferSymbolicShape for CinnReduce {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let keepdim: bool = op.attr("keep_dim")?;
        let axes: Vec<i64> = op.attr("dim")?;
        let input = operand_dims(op, analysis, 0)?;

        let shape = reduce_infer_dim(&input, &axes, keepdim, false)?;
        Ok([TensorShapeOrData::from_shape(shape).into()].into())
    }
}

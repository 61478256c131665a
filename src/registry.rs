//! Mapping from operator kinds to shape inference rules.

use crate::analysis::ShapeAnalysis;
use crate::graph::{OpKind, OpRef};
use crate::infer_shapes::{
    ElementwiseBinary, InferError, InferSymbolicShape, SameShape, invariant_err,
};
use crate::ops;
use crate::shape_or_data::ShapeOrData;

/// Return the shape inference rule for an operator, or `None` if it has none.
fn rule(kind: OpKind, inplace: bool) -> Option<&'static dyn InferSymbolicShape> {
    use OpKind::*;

    let rule: &'static dyn InferSymbolicShape = match kind {
        Combine => &ops::Combine,

        Data => &ops::Data,
        Full => &ops::Full,
        FullIntArray => &ops::FullIntArray,
        Shape | ShapeSr => &ops::Shape,
        Arange => &ops::Arange,

        // The in-place power operator has no rule.
        Pow if inplace => return None,
        Abs | Cast | Exp | Pow | Relu | Rsqrt | Scale | ScaleSr | FullWithTensor => &SameShape,

        Add | Subtract | Multiply | MultiplySr | Divide | ElementwisePow => &ElementwiseBinary,

        Sum | Max => &ops::Reduce {
            keepdim_attr: "keepdim",
            reduce_all_attr: None,
        },
        Prod => &ops::Reduce {
            keepdim_attr: "keep_dim",
            reduce_all_attr: Some("reduce_all"),
        },

        Reshape => &ops::Reshape,
        Slice => &ops::Slice,
        Squeeze => &ops::Squeeze,
        Unsqueeze => &ops::Unsqueeze,
        Tile => &ops::Tile,
        Concat => &ops::Concat,
        Stack => &ops::Stack,

        Embedding => &ops::Embedding,
        GatherNd => &ops::GatherNd,
        Matmul => &ops::Matmul,

        CinnConcat => &ops::CinnConcat,
        CinnReduceMax | CinnReduceMin | CinnReduceProd | CinnReduceSum => &ops::CinnReduce,
        CinnReshape => &ops::CinnReshape,
        CinnSlice => &ops::CinnSlice,

        Assign | BitwiseAnd | Expand | ExpandAs | Feed | GreaterThan => return None,
        Increment | LessThan | Log | LogicalAnd | LogicalNot | NotEqual => return None,
        SparseWeightEmbedding | Split | TopPSampling | Transpose | Tril | Where => return None,
    };
    Some(rule)
}

/// Return true if there is a shape inference rule for an operator.
pub fn has_rule(kind: OpKind, inplace: bool) -> bool {
    rule(kind, inplace).is_some()
}

/// Infer the records of `op`'s results and write them to `analysis`.
///
/// If inference fails `analysis` is left unchanged. No records are written
/// and symbols or constraints created by the rule are discarded.
pub fn infer_one(op: &OpRef, analysis: &mut ShapeAnalysis) -> Result<(), InferError> {
    let rule = rule(op.kind(), op.is_inplace())
        .ok_or_else(|| InferError::UnimplementedOperator(op.name()))?;
    for &result in op.results() {
        analysis.check_write(op.kind(), op.is_inplace(), result)?;
    }

    let checkpoint = analysis.checkpoint();
    let records = match infer_records(rule, op, analysis) {
        Ok(records) => records,
        Err(err) => {
            analysis.rollback(checkpoint);
            return Err(err);
        }
    };

    for (&result, record) in op.results().iter().zip(records) {
        analysis.write_result(op.kind(), op.is_inplace(), result, record)?;
    }
    Ok(())
}

fn infer_records(
    rule: &dyn InferSymbolicShape,
    op: &OpRef,
    analysis: &mut ShapeAnalysis,
) -> Result<Vec<ShapeOrData>, InferError> {
    let records = rule.infer_symbolic_shape(op, analysis)?;
    if records.len() != op.results().len() {
        return Err(invariant_err!(
            "{} inferred {} records for {} results",
            op.name(),
            records.len(),
            op.results().len()
        ));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::{has_rule, infer_one};
    use crate::graph::{OpKind, Operation};
    use crate::infer_shapes::InferError;
    use crate::shape_or_data::{TensorShapeOrData, sym_shape};
    use crate::sym_expr::DimExpr;
    use crate::testing::Harness;

    const UNIMPLEMENTED: &[OpKind] = &[
        OpKind::Assign,
        OpKind::BitwiseAnd,
        OpKind::Expand,
        OpKind::ExpandAs,
        OpKind::Feed,
        OpKind::GreaterThan,
        OpKind::Increment,
        OpKind::LessThan,
        OpKind::Log,
        OpKind::LogicalAnd,
        OpKind::LogicalNot,
        OpKind::NotEqual,
        OpKind::SparseWeightEmbedding,
        OpKind::Split,
        OpKind::TopPSampling,
        OpKind::Transpose,
        OpKind::Tril,
        OpKind::Where,
    ];

    #[test]
    fn test_has_rule() {
        for &kind in OpKind::ALL {
            assert_eq!(
                has_rule(kind, false),
                !UNIMPLEMENTED.contains(&kind),
                "{}",
                kind
            );
        }
        assert!(has_rule(OpKind::Pow, false));
        assert!(!has_rule(OpKind::Pow, true));
        assert!(has_rule(OpKind::Add, true));
    }

    #[test]
    fn test_unimplemented_operators() {
        for &kind in UNIMPLEMENTED {
            let mut h = Harness::new();
            let x = h.input(sym_shape!("n", 3));
            let y = h.input(sym_shape!("n", 3));
            let err = h.run(kind, [x, y], |op| op).err();
            assert_eq!(
                err,
                Some(InferError::UnimplementedOperator(kind.name().to_string()))
            );
            assert_eq!(h.analysis.len(), 2, "{} wrote a record", kind);
            assert!(h.analysis.constraints().is_empty());
        }
    }

    #[test]
    fn test_inplace_pow() {
        let mut h = Harness::new();
        let x = h.input(sym_shape!("n"));
        let err = h.run(OpKind::Pow, [x], |op| op.with_inplace(true)).err();
        assert_eq!(
            err,
            Some(InferError::UnimplementedOperator("pd_op.pow_".into()))
        );
    }

    #[test]
    fn test_inplace_rewrite() {
        let mut h = Harness::new();
        let x = h.input(sym_shape!("n", 1));
        let y = h.input(sym_shape!(1, 4));
        let z = h.run(OpKind::Add, [x, y], |op| op).unwrap();
        assert_eq!(h.tensor(z), &sym_shape!("n", 4));

        // `add_` writes its result into its first operand.
        let w = h.input(sym_shape!("n", 4));
        let index = h.graph.add_op(
            Operation::new(OpKind::Add)
                .with_inplace(true)
                .with_operands([z, w])
                .with_results([z]),
        );
        let op = h.graph.op(index).unwrap();
        infer_one(&op, &mut h.analysis).unwrap();
        assert_eq!(h.tensor(z), &sym_shape!("n", 4));

        // An out-of-place operator may not overwrite an existing record.
        let index = h.graph.add_op(
            Operation::new(OpKind::Multiply)
                .with_operands([x, y])
                .with_results([z]),
        );
        let op = h.graph.op(index).unwrap();
        let err = infer_one(&op, &mut h.analysis).err();
        assert!(matches!(err, Some(InferError::InvariantViolation(_))));
    }

    #[test]
    fn test_result_count_mismatch() {
        let mut h = Harness::new();
        let x = h.input(sym_shape!("n"));
        let err = h.run_multi(OpKind::Relu, [x], 2, |op| op).err();
        assert!(matches!(err, Some(InferError::InvariantViolation(_))));
        assert_eq!(h.analysis.len(), 1);

        // Symbols and constraints of the rejected records are discarded.
        let y = h.input(sym_shape!("m"));
        let err = h.run_multi(OpKind::Add, [x, y], 2, |op| op).err();
        assert!(matches!(err, Some(InferError::InvariantViolation(_))));
        assert!(h.analysis.constraints().is_empty());
        assert_eq!(h.analysis.symbol_count(), 0);
    }

    #[test]
    fn test_rejected_write_leaves_no_constraints() {
        let mut h = Harness::new();
        let x = h.input(sym_shape!("foo"));
        let y = h.input(sym_shape!("bar"));
        let seeded = h.input(sym_shape!(3));

        let index = h.graph.add_op(
            Operation::new(OpKind::Add)
                .with_operands([x, y])
                .with_results([seeded]),
        );
        let op = h.graph.op(index).unwrap();
        let err = infer_one(&op, &mut h.analysis).err();
        assert!(matches!(err, Some(InferError::InvariantViolation(_))));

        assert!(h.analysis.constraints().is_empty());
        assert_eq!(h.analysis.symbol_count(), 0);
        assert_eq!(h.tensor(seeded), &sym_shape!(3));
    }

    #[test]
    fn test_missing_operand_record() {
        let mut h = Harness::new();
        let x = h.graph.add_value();
        let err = h.run(OpKind::Relu, [x], |op| op).err();
        assert_eq!(err, Some(InferError::ValueNotYetInferred(x)));

        // Records are not required for values that are never read.
        let y = h.input(TensorShapeOrData::from_scalar(DimExpr::from(2)));
        let out = h.run(OpKind::Cast, [y, x], |op| op).unwrap();
        assert_eq!(h.tensor(out).data(), Some([DimExpr::Value(2)].as_slice()));
    }
}

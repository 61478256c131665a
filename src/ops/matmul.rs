use crate::analysis::ShapeAnalysis;
use crate::graph::OpRef;
use crate::infer_shapes::{InferError, InferSymbolicShape, invariant_err, operand_dims};
use crate::shape_or_data::{ShapeOrData, TensorShapeOrData};
use crate::sym_expr::DimExpr;

/// Matrix multiplication with optional transposition of either operand.
///
/// A vector `x` is treated as a `[1, k]` matrix and a vector `y` as a
/// `[k, 1]` matrix, and the added dimension is removed from the output.
pub struct Matmul;

impl InferSymbolicShape for Matmul {
    fn infer_symbolic_shape(
        &self,
        op: &OpRef,
        analysis: &mut ShapeAnalysis,
    ) -> Result<Vec<ShapeOrData>, InferError> {
        let transpose_x: bool = op.attr("transpose_x")?;
        let transpose_y: bool = op.attr("transpose_y")?;
        let mut x_dims = operand_dims(op, analysis, 0)?;
        let mut y_dims = operand_dims(op, analysis, 1)?;

        if x_dims.is_empty() || y_dims.is_empty() {
            return Err(invariant_err!(
                "{} operands must have rank >= 1, got ranks {} and {}",
                op.name(),
                x_dims.len(),
                y_dims.len()
            ));
        }

        let x_promoted = x_dims.len() == 1;
        if x_promoted {
            x_dims.insert(0, DimExpr::Value(1));
        }
        let y_promoted = y_dims.len() == 1;
        if y_promoted {
            y_dims.push(DimExpr::Value(1));
        }

        let x_ndim = x_dims.len();
        let y_ndim = y_dims.len();
        let x_batch = &x_dims[..x_ndim - 2];
        let y_batch = &y_dims[..y_ndim - 2];

        // Output shape is (batch dims, M, N).
        let mut out_shape: Vec<DimExpr> = if x_ndim > y_ndim {
            x_batch.to_vec()
        } else if y_ndim > x_ndim {
            y_batch.to_vec()
        } else {
            let mut builder = analysis.builder();
            x_batch
                .iter()
                .zip(y_batch)
                .map(|(a, b)| builder.broadcast(a, b))
                .collect()
        };

        if !x_promoted {
            let m = if transpose_x {
                &x_dims[x_ndim - 1]
            } else {
                &x_dims[x_ndim - 2]
            };
            out_shape.push(m.clone());
        }
        if !y_promoted {
            let n = if transpose_y {
                &y_dims[y_ndim - 2]
            } else {
                &y_dims[y_ndim - 1]
            };
            out_shape.push(n.clone());
        }

        Ok([TensorShapeOrData::from_shape(out_shape).into()].into())
    }
}

#[cfg(test)]
mod tests {
    use symshape_testing::TestCases;

    use crate::graph::OpKind;
    use crate::infer_shapes::InferError;
    use crate::shape_or_data::{TensorShapeOrData, sym_elems, sym_shape};
    use crate::sym_expr::DimExpr;
    use crate::testing::Harness;

    #[test]
    fn test_matmul() {
        #[derive(Debug)]
        struct Case {
            x: TensorShapeOrData,
            y: TensorShapeOrData,
            transpose_x: bool,
            transpose_y: bool,
            expected: Vec<DimExpr>,
        }

        let case = |x, y, expected| Case {
            x,
            y,
            transpose_x: false,
            transpose_y: false,
            expected,
        };

        let cases = [
            // No batch dims
            case(
                sym_shape!("m", "k"),
                sym_shape!("k", "n"),
                sym_elems!("m", "n"),
            ),
            // Batch dims
            case(
                sym_shape!("batch", "m", "k"),
                sym_shape!("batch", "k", "n"),
                sym_elems!("batch", "m", "n"),
            ),
            // Batch dims that are broadcast
            case(
                sym_shape!(1, "batch_b", "m", "k"),
                sym_shape!("batch_a", 1, "k", "n"),
                sym_elems!("batch_a", "batch_b", "m", "n"),
            ),
            // Operands with different ranks use the longer batch dims.
            case(
                sym_shape!("b", 8, "m", "k"),
                sym_shape!("k", "n"),
                sym_elems!("b", 8, "m", "n"),
            ),
            case(
                sym_shape!("m", "k"),
                sym_shape!(4, "k", "n"),
                sym_elems!(4, "m", "n"),
            ),
            // Vector operands
            case(sym_shape!("k"), sym_shape!("k", "n"), sym_elems!("n")),
            case(sym_shape!("m", "k"), sym_shape!("k"), sym_elems!("m")),
            case(sym_shape!("k"), sym_shape!("k"), sym_elems!()),
            case(sym_shape!("k"), sym_shape!(3, "k", "n"), sym_elems!(3, "n")),
            Case {
                x: sym_shape!("k", "m"),
                y: sym_shape!("n", "k"),
                transpose_x: true,
                transpose_y: true,
                expected: sym_elems!("m", "n"),
            },
            Case {
                x: sym_shape!(2, "m", "k"),
                y: sym_shape!(2, "n", "k"),
                transpose_x: false,
                transpose_y: true,
                expected: sym_elems!(2, "m", "n"),
            },
        ];

        cases.test_each(|case| {
            let mut h = Harness::new();
            let x = h.input(case.x.clone());
            let y = h.input(case.y.clone());
            let out = h
                .run(OpKind::Matmul, [x, y], |op| {
                    op.with_attr("transpose_x", case.transpose_x)
                        .with_attr("transpose_y", case.transpose_y)
                })
                .unwrap();
            assert_eq!(h.tensor(out).shape(), case.expected.as_slice());
        })
    }

    #[test]
    fn test_matmul_broadcast_batch_dims() {
        let mut h = Harness::new();
        let x = h.input(sym_shape!("a", "m", "k"));
        let y = h.input(sym_shape!("b", "k", "n"));
        let out = h
            .run(OpKind::Matmul, [x, y], |op| {
                op.with_attr("transpose_x", false)
                    .with_attr("transpose_y", false)
            })
            .unwrap();
        assert_eq!(h.tensor(out), &sym_shape!("S0", "m", "n"));
        assert_eq!(h.analysis.constraints().broadcasts().len(), 1);
    }

    #[test]
    fn test_matmul_invalid() {
        let mut h = Harness::new();
        let scalar = h.input(sym_shape!());
        let y = h.input(sym_shape!("k", "n"));
        let err = h
            .run(OpKind::Matmul, [scalar, y], |op| {
                op.with_attr("transpose_x", false)
                    .with_attr("transpose_y", false)
            })
            .err();
        assert!(matches!(err, Some(InferError::InvariantViolation(_))));

        let x = h.input(sym_shape!("m", "k"));
        let err = h.run(OpKind::Matmul, [x, y], |op| op).err();
        assert_eq!(
            err,
            Some(InferError::MissingAttribute("transpose_x".into()))
        );
    }
}

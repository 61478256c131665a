//! Helpers for testing shape inference rules.

use crate::analysis::ShapeAnalysis;
use crate::graph::{Graph, OpKind, Operation, ValueId};
use crate::infer_shapes::InferError;
use crate::registry::infer_one;
use crate::shape_or_data::{ShapeOrData, TensorShapeOrData};

/// Builds a graph one operator at a time, running shape inference for each
/// operator as it is added.
pub(crate) struct Harness {
    pub graph: Graph,
    pub analysis: ShapeAnalysis,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
            analysis: ShapeAnalysis::new(),
        }
    }

    /// Add a graph input with the given record.
    pub fn input(&mut self, record: impl Into<ShapeOrData>) -> ValueId {
        let value = self.graph.add_value();
        self.analysis.set_shape_or_data(value, record).unwrap();
        value
    }

    /// Add an operator with a single result and infer its record.
    ///
    /// `configure` can be used to set attributes or other properties of the
    /// operation before it is added.
    pub fn run(
        &mut self,
        kind: OpKind,
        operands: impl IntoIterator<Item = ValueId>,
        configure: impl FnOnce(Operation) -> Operation,
    ) -> Result<ValueId, InferError> {
        let results = self.run_multi(kind, operands, 1, configure)?;
        Ok(results[0])
    }

    /// Add an operator with `n_results` results and infer their records.
    pub fn run_multi(
        &mut self,
        kind: OpKind,
        operands: impl IntoIterator<Item = ValueId>,
        n_results: usize,
        configure: impl FnOnce(Operation) -> Operation,
    ) -> Result<Vec<ValueId>, InferError> {
        let results = self.graph.add_values(n_results);
        let op = Operation::new(kind)
            .with_operands(operands)
            .with_results(results.iter().copied());
        let index = self.graph.add_op(configure(op));
        let op = self.graph.op(index).unwrap();
        infer_one(&op, &mut self.analysis)?;
        Ok(results)
    }

    pub fn tensor(&self, value: ValueId) -> &TensorShapeOrData {
        self.analysis.tensor(value).unwrap()
    }

    pub fn record(&self, value: ValueId) -> &ShapeOrData {
        self.analysis.shape_or_data(value).unwrap()
    }
}

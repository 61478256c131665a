//! Per-run analysis state.

use std::borrow::Cow;

use rustc_hash::FxHashMap;

use crate::constraints::{Constraints, DimExprBuilder};
use crate::graph::{OpKind, ValueId};
use crate::infer_shapes::{InferError, invariant_err};
use crate::shape_or_data::{ShapeOrData, TensorShapeOrData};
use crate::sym_expr::DimExpr;
use crate::sym_gen::SymbolGen;

/// Symbol and constraint counts of an analysis at some point in a run.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Checkpoint {
    symbols: u32,
    constraints: (usize, usize),
}

struct Entry {
    record: ShapeOrData,

    /// Kind of operator that first wrote the record, or `None` if it was
    /// seeded by the host.
    writer: Option<OpKind>,
}

/// State of one shape analysis run.
///
/// This holds the shape record of every value inferred so far, the generator
/// for new symbols and the constraints registered by operators. Records are
/// written once per value, except that the in-place variant of the operator
/// which defined a value may rewrite it.
///
/// After a failed run the records for operators visited before the failure
/// remain available.
pub struct ShapeAnalysis {
    records: FxHashMap<ValueId, Entry>,
    sym_gen: SymbolGen,
    constraints: Constraints,
}

impl Default for ShapeAnalysis {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeAnalysis {
    pub fn new() -> Self {
        Self::with_symbol_prefix("S".into())
    }

    /// Create an analysis whose generated symbols are named with `prefix`.
    pub fn with_symbol_prefix(prefix: Cow<'static, str>) -> Self {
        Self {
            records: FxHashMap::default(),
            sym_gen: SymbolGen::with_prefix(prefix),
            constraints: Constraints::new(),
        }
    }

    /// Return the record for `value`.
    pub fn shape_or_data(&self, value: ValueId) -> Result<&ShapeOrData, InferError> {
        self.records
            .get(&value)
            .map(|entry| &entry.record)
            .ok_or(InferError::ValueNotYetInferred(value))
    }

    /// Return the record for `value`, which must be a single tensor.
    pub fn tensor(&self, value: ValueId) -> Result<&TensorShapeOrData, InferError> {
        self.shape_or_data(value)?
            .as_tensor()
            .ok_or_else(|| invariant_err!("value {} is a tensor list, expected a tensor", value))
    }

    /// Return the record for `value`, which must be a tensor list.
    pub fn tensor_list(&self, value: ValueId) -> Result<&[TensorShapeOrData], InferError> {
        self.shape_or_data(value)?
            .as_tensor_list()
            .ok_or_else(|| invariant_err!("value {} is a tensor, expected a tensor list", value))
    }

    pub fn contains(&self, value: ValueId) -> bool {
        self.records.contains_key(&value)
    }

    /// Return the number of values with a record.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Set the record for a value that is not defined by an operator, such as
    /// a graph input.
    ///
    /// Fails if `value` already has a record.
    pub fn set_shape_or_data(
        &mut self,
        value: ValueId,
        record: impl Into<ShapeOrData>,
    ) -> Result<(), InferError> {
        if self.records.contains_key(&value) {
            return Err(invariant_err!("value {} already has a shape record", value));
        }
        self.records.insert(
            value,
            Entry {
                record: record.into(),
                writer: None,
            },
        );
        Ok(())
    }

    /// Check whether an operator of kind `writer` may write the record for
    /// `value`.
    ///
    /// The first write is always allowed. Later writes are only allowed from
    /// the in-place variant of the operator that made the first write.
    pub(crate) fn check_write(
        &self,
        writer: OpKind,
        inplace: bool,
        value: ValueId,
    ) -> Result<(), InferError> {
        match self.records.get(&value) {
            None => Ok(()),
            Some(entry) if inplace && entry.writer == Some(writer) => Ok(()),
            Some(entry) => Err(invariant_err!(
                "value {} already has a shape record written by {}",
                value,
                entry.writer.map(|k| k.name()).unwrap_or("the host")
            )),
        }
    }

    /// Write the record for a value defined by an operator of kind `writer`.
    ///
    /// See [`check_write`](Self::check_write) for when rewrites are allowed.
    pub(crate) fn write_result(
        &mut self,
        writer: OpKind,
        inplace: bool,
        value: ValueId,
        record: ShapeOrData,
    ) -> Result<(), InferError> {
        self.check_write(writer, inplace, value)?;
        if let Some(entry) = self.records.get_mut(&value) {
            entry.record = record;
        } else {
            self.records.insert(
                value,
                Entry {
                    record,
                    writer: Some(writer),
                },
            );
        }
        Ok(())
    }

    /// Generate a new symbol, unique within this run.
    pub fn next_symbol(&mut self) -> DimExpr {
        self.sym_gen.gen_symbol()
    }

    /// Return the number of symbols generated so far.
    pub fn symbol_count(&self) -> u32 {
        self.sym_gen.count()
    }

    /// Return a builder for expressions that need new symbols or constraints.
    pub fn builder(&mut self) -> DimExprBuilder<'_> {
        DimExprBuilder::new(&mut self.constraints, &mut self.sym_gen)
    }

    /// Register the obligation that `lhs == rhs` at runtime.
    pub fn emit_equality_constraint(&mut self, lhs: &DimExpr, rhs: &DimExpr) {
        self.builder().cstr_eq(lhs, rhs)
    }

    /// Return the broadcast of `lhs` and `rhs`, registering a broadcast
    /// obligation if the result cannot be determined statically.
    pub fn emit_broadcast_constraint(&mut self, lhs: &DimExpr, rhs: &DimExpr) -> DimExpr {
        self.builder().broadcast(lhs, rhs)
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            symbols: self.sym_gen.count(),
            constraints: self.constraints.len(),
        }
    }

    /// Discard symbols and constraints created since `checkpoint`.
    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        self.sym_gen.rewind(checkpoint.symbols);
        self.constraints.truncate(checkpoint.constraints);
    }
}

//! Symbolic shape and value inference for tensor dataflow graphs.
//!
//! # About symbolic shape inference
//!
//! Compilers for tensor programs need to know the shapes of the values in a
//! graph in order to plan memory, fuse operators and choose kernels. In many
//! models some dimensions are only known at runtime. A language model for
//! example has dynamic dimensions for the batch size and sequence length.
//!
//! This crate walks a graph in program order and assigns every value a
//! _record_ describing its shape as a list of symbolic expressions. Dimensions
//! that are unknown get a generated symbol such as `S0`. For small integer
//! tensors that hold shapes, such as the output of a `shape` operator, the
//! record also tracks the element values. This lets shape computations in the
//! graph be followed through. For example:
//!
//! ```text
//! %0 = pd_op.data<shape=[-1, 3, -1]>       // shape=[S0, 3, S1]
//! %1 = pd_op.shape(%0)                     // shape=[3] data=[S0, 3, S1]
//! %2 = pd_op.full_int_array<value=[1]>     // shape=[1] data=[1]
//! %3 = pd_op.full_int_array<value=[MAX]>   // shape=[1] data=[2147483647]
//! %4 = pd_op.slice<axes=[0]>(%1, %2, %3)   // shape=[2] data=[3, S1]
//! ```
//!
//! Along the way operators register the runtime obligations they rely on,
//! such as two dimensions being equal or broadcast-compatible. These are
//! collected as [`Constraints`].
//!
//! # Crate overview
//!
//! - [`DimExpr`] is a symbolic dimension expression and [`TensorShapeOrData`]
//!   and [`ShapeOrData`] are the per-value records.
//! - [`Graph`] and [`Operation`] describe the host program.
//! - [`ShapeAnalysis`] holds the records, symbol generator and constraints of
//!   one run.
//! - The [`InferSymbolicShape`] trait is implemented by each rule, found in
//!   [`ops`]. [`infer_one`] dispatches a single operator to its rule.
//! - [`infer_graph`] runs the rules over a whole graph.
//!
//! ```
//! use symshape::{DimExpr, Graph, InferOptions, OpKind, Operation, infer_graph};
//!
//! let mut graph = Graph::new();
//! let x = graph.add_value();
//! let y = graph.add_value();
//! graph.add_op(
//!     Operation::new(OpKind::Data)
//!         .with_attr("shape", vec![-1, 16])
//!         .with_results([x]),
//! );
//! graph.add_op(
//!     Operation::new(OpKind::Shape)
//!         .with_operands([x])
//!         .with_results([y]),
//! );
//!
//! let options = InferOptions::default();
//! let mut analysis = options.analysis();
//! infer_graph(&graph, &mut analysis, &options).unwrap();
//!
//! let shape = analysis.tensor(y).unwrap();
//! assert_eq!(shape.data(), Some([DimExpr::from("S0"), DimExpr::Value(16)].as_slice()));
//! ```

mod analysis;
mod constraints;
mod env;
mod graph;
mod infer_shapes;
pub mod ops;
mod pass;
mod registry;
mod shape_or_data;
mod sym_expr;
mod sym_gen;

#[cfg(test)]
mod testing;

pub use analysis::ShapeAnalysis;
pub use constraints::{BroadcastConstraint, Constraints, DimExprBuilder};
pub use graph::{AttrValue, Attribute, Graph, OpKind, OpRef, Operation, ValueId};
pub use infer_shapes::{
    ElementwiseBinary, InferError, InferSymbolicShape, SameShape, reduce_infer_dim,
};
pub use pass::{InferOptions, PassError, PassStats, infer_graph};
pub use registry::{has_rule, infer_one};
pub use shape_or_data::{ShapeOrData, TensorShapeOrData};
pub use sym_expr::{DimExpr, Symbol};
pub use sym_gen::SymbolGen;

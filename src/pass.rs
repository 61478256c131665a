//! Shape inference over a whole graph.

use std::error::Error;
use std::fmt;

use tracing::{debug, info, trace, warn};

use crate::analysis::ShapeAnalysis;
use crate::env::{env_flag, env_string};
use crate::graph::Graph;
use crate::infer_shapes::InferError;
use crate::registry::infer_one;

/// Options which control a shape inference pass.
#[derive(Clone, Debug, PartialEq)]
pub struct InferOptions {
    /// Prefix for the names of generated symbols.
    pub symbol_prefix: String,

    /// Log every inferred record at `info` level rather than `trace`.
    pub verbose: bool,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            symbol_prefix: "S".to_string(),
            verbose: false,
        }
    }
}

impl InferOptions {
    /// Read options from the environment.
    ///
    /// `SYMSHAPE_VERBOSE` enables verbose logging and `SYMSHAPE_SYMBOL_PREFIX`
    /// sets the symbol prefix. Unset variables use the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            symbol_prefix: env_string("SYMSHAPE_SYMBOL_PREFIX").unwrap_or(defaults.symbol_prefix),
            verbose: env_flag("SYMSHAPE_VERBOSE", defaults.verbose),
        }
    }

    /// Create an empty analysis which generates symbols using these options.
    pub fn analysis(&self) -> ShapeAnalysis {
        ShapeAnalysis::with_symbol_prefix(self.symbol_prefix.clone().into())
    }
}

/// Summary of a completed pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PassStats {
    /// Number of operations visited.
    pub ops: usize,

    /// Number of values whose records were written by the pass.
    pub values: usize,

    /// Number of symbols generated by the analysis, including any generated
    /// before the pass.
    pub symbols: u32,

    pub equality_constraints: usize,
    pub broadcast_constraints: usize,
}

/// Error from a shape inference pass, identifying the operator that failed.
#[derive(Clone, Debug, PartialEq)]
pub struct PassError {
    /// Index of the operation in the graph.
    pub op_index: usize,

    /// Name of the operator, with a trailing `_` for in-place variants.
    pub op_name: String,

    pub error: InferError,
}

impl fmt::Display for PassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shape inference failed for operator #{} ({}): {}",
            self.op_index, self.op_name, self.error
        )
    }
}

impl Error for PassError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// Infer the records of every value defined by an operation in `graph`.
///
/// Operations are visited in program order. Records for graph inputs must be
/// set in `analysis` beforehand. The pass stops at the first operator which
/// fails, leaving the records of operators visited before it in `analysis`.
pub fn infer_graph(
    graph: &Graph,
    analysis: &mut ShapeAnalysis,
    options: &InferOptions,
) -> Result<PassStats, PassError> {
    let mut stats = PassStats::default();

    for op in graph.iter() {
        debug!(index = op.index(), op = %op.name(), "Inferring symbolic shapes");

        if let Err(error) = infer_one(&op, analysis) {
            warn!(
                index = op.index(),
                op = %op.name(),
                error = %error,
                "Symbolic shape inference failed"
            );
            return Err(PassError {
                op_index: op.index(),
                op_name: op.name(),
                error,
            });
        }

        for &value in op.results() {
            let Ok(record) = analysis.shape_or_data(value) else {
                continue;
            };
            if options.verbose {
                info!(op = %op.name(), value = %value, record = %record, "Inferred record");
            } else {
                trace!(op = %op.name(), value = %value, record = %record, "Inferred record");
            }
        }

        stats.ops += 1;
        stats.values += op.results().len();
    }

    let constraints = analysis.constraints();
    stats.symbols = analysis.symbol_count();
    stats.equality_constraints = constraints.equalities().len();
    stats.broadcast_constraints = constraints.broadcasts().len();

    debug!(
        ops = stats.ops,
        values = stats.values,
        symbols = stats.symbols,
        equality_constraints = stats.equality_constraints,
        broadcast_constraints = stats.broadcast_constraints,
        "Symbolic shape inference completed"
    );

    Ok(stats)
}

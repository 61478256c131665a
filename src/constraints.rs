//! Runtime obligations between dimension expressions.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::sym_expr::DimExpr;
use crate::sym_gen::SymbolGen;

/// A broadcast obligation.
///
/// At runtime `lhs` and `rhs` must be equal or one of them must be 1. `result`
/// is the symbol standing for the broadcast size.
#[derive(Clone, Debug, PartialEq)]
pub struct BroadcastConstraint {
    pub lhs: DimExpr,
    pub rhs: DimExpr,
    pub result: DimExpr,
}

/// Store of the equality and broadcast obligations emitted during an analysis
/// run.
///
/// Constraints are only recorded here. Proving or refuting them is left to a
/// solver that consumes the store after the run.
///
/// Adding a constraint that already exists, with operands in either order, has
/// no effect.
#[derive(Default)]
pub struct Constraints {
    equalities: Vec<(DimExpr, DimExpr)>,
    equality_set: FxHashSet<(DimExpr, DimExpr)>,
    broadcasts: Vec<BroadcastConstraint>,
    broadcast_index: FxHashMap<(DimExpr, DimExpr), usize>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the obligation that `lhs` and `rhs` are equal at runtime.
    ///
    /// Returns false if the constraint was already present.
    pub fn add_equality(&mut self, lhs: DimExpr, rhs: DimExpr) -> bool {
        let swapped = (rhs.clone(), lhs.clone());
        if self.equality_set.contains(&swapped) {
            return false;
        }
        if !self.equality_set.insert((lhs.clone(), rhs.clone())) {
            return false;
        }
        self.equalities.push((lhs, rhs));
        true
    }

    /// Return the symbol for the broadcast of `lhs` and `rhs`, registering a
    /// new broadcast obligation if this pair has not been seen before.
    pub fn add_broadcast(
        &mut self,
        lhs: DimExpr,
        rhs: DimExpr,
        sym_gen: &mut SymbolGen,
    ) -> DimExpr {
        if let Some(result) = self.find_broadcast(&lhs, &rhs) {
            return result.clone();
        }
        let result = sym_gen.gen_symbol();
        self.broadcast_index
            .insert((lhs.clone(), rhs.clone()), self.broadcasts.len());
        self.broadcasts.push(BroadcastConstraint {
            lhs,
            rhs,
            result: result.clone(),
        });
        result
    }

    fn find_broadcast(&self, lhs: &DimExpr, rhs: &DimExpr) -> Option<&DimExpr> {
        let idx = self
            .broadcast_index
            .get(&(lhs.clone(), rhs.clone()))
            .or_else(|| self.broadcast_index.get(&(rhs.clone(), lhs.clone())))?;
        self.broadcasts.get(*idx).map(|bc| &bc.result)
    }

    /// Return the broadcast expression that a symbol created by a broadcast
    /// stands for.
    ///
    /// Returns `None` if `sym` is not the result of a registered broadcast.
    pub fn broadcast_definition(&self, sym: &DimExpr) -> Option<DimExpr> {
        self.broadcasts
            .iter()
            .find(|bc| &bc.result == sym)
            .map(|bc| DimExpr::Broadcast(bc.lhs.clone().into(), bc.rhs.clone().into()))
    }

    /// Return equality constraints in the order they were registered.
    pub fn equalities(&self) -> &[(DimExpr, DimExpr)] {
        &self.equalities
    }

    /// Return broadcast constraints in the order they were registered.
    pub fn broadcasts(&self) -> &[BroadcastConstraint] {
        &self.broadcasts
    }

    /// Return true if `lhs == rhs` has been registered, in either order.
    pub fn has_equality(&self, lhs: &DimExpr, rhs: &DimExpr) -> bool {
        self.equality_set.contains(&(lhs.clone(), rhs.clone()))
            || self.equality_set.contains(&(rhs.clone(), lhs.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.equalities.is_empty() && self.broadcasts.is_empty()
    }

    /// Return the number of equality and broadcast constraints, for use with
    /// [`truncate`](Self::truncate).
    pub(crate) fn len(&self) -> (usize, usize) {
        (self.equalities.len(), self.broadcasts.len())
    }

    /// Remove constraints registered after the store had the given lengths.
    pub(crate) fn truncate(&mut self, (n_equalities, n_broadcasts): (usize, usize)) {
        let n_equalities = n_equalities.min(self.equalities.len());
        for pair in self.equalities.drain(n_equalities..) {
            self.equality_set.remove(&pair);
        }
        let n_broadcasts = n_broadcasts.min(self.broadcasts.len());
        for bc in self.broadcasts.drain(n_broadcasts..) {
            self.broadcast_index.remove(&(bc.lhs, bc.rhs));
        }
    }
}

/// Builds dimension expressions that may need new symbols or constraints.
///
/// Obtained from [`ShapeAnalysis::builder`](crate::ShapeAnalysis::builder).
pub struct DimExprBuilder<'a> {
    constraints: &'a mut Constraints,
    sym_gen: &'a mut SymbolGen,
}

impl<'a> DimExprBuilder<'a> {
    pub(crate) fn new(constraints: &'a mut Constraints, sym_gen: &'a mut SymbolGen) -> Self {
        Self {
            constraints,
            sym_gen,
        }
    }

    /// Return the size of the broadcast of two dimensions.
    ///
    /// Equal dimensions broadcast to themselves and a literal 1 broadcasts to
    /// the other side. Otherwise the result is a symbol, registered with the
    /// obligation that at runtime `a == 1 || b == 1 || a == b`.
    pub fn broadcast(&mut self, a: &DimExpr, b: &DimExpr) -> DimExpr {
        if a == b || b.is(1) {
            return a.clone();
        }
        if a.is(1) {
            return b.clone();
        }
        self.constraints
            .add_broadcast(a.clone(), b.clone(), self.sym_gen)
    }

    /// Register the obligation that `a == b` at runtime.
    pub fn cstr_eq(&mut self, a: &DimExpr, b: &DimExpr) {
        self.constraints.add_equality(a.clone(), b.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::{Constraints, DimExprBuilder};
    use crate::sym_expr::DimExpr;
    use crate::sym_gen::SymbolGen;

    #[test]
    fn test_equality_is_idempotent() {
        let mut cstrs = Constraints::new();
        let a = DimExpr::from("a");
        let b = DimExpr::from("b");

        assert!(cstrs.add_equality(a.clone(), b.clone()));
        assert!(!cstrs.add_equality(a.clone(), b.clone()));
        assert!(!cstrs.add_equality(b.clone(), a.clone()));
        assert_eq!(cstrs.equalities(), &[(a.clone(), b.clone())]);
        assert!(cstrs.has_equality(&b, &a));
    }

    #[test]
    fn test_broadcast_trivial_cases() {
        let mut cstrs = Constraints::new();
        let mut sym_gen = SymbolGen::new();
        let mut builder = DimExprBuilder::new(&mut cstrs, &mut sym_gen);

        let x = DimExpr::from("x");
        let one = DimExpr::from(1);

        assert_eq!(builder.broadcast(&x, &one), x);
        assert_eq!(builder.broadcast(&one, &x), x);
        assert_eq!(builder.broadcast(&x, &x), x);
        assert!(cstrs.is_empty());
    }

    #[test]
    fn test_broadcast_is_symmetric() {
        let mut cstrs = Constraints::new();
        let mut sym_gen = SymbolGen::new();
        let a = DimExpr::from("a");
        let b = DimExpr::from("b");

        let mut builder = DimExprBuilder::new(&mut cstrs, &mut sym_gen);
        let ab = builder.broadcast(&a, &b);
        let ba = builder.broadcast(&b, &a);

        assert_eq!(ab, DimExpr::from("S0"));
        assert_eq!(ab, ba);
        assert_eq!(cstrs.broadcasts().len(), 1);
        assert_eq!(
            cstrs.broadcast_definition(&ab),
            Some(DimExpr::Broadcast(a.clone().into(), b.clone().into()))
        );
        assert_eq!(cstrs.broadcast_definition(&a), None);
    }

    #[test]
    fn test_broadcast_of_distinct_literals() {
        let mut cstrs = Constraints::new();
        let mut sym_gen = SymbolGen::new();
        let mut builder = DimExprBuilder::new(&mut cstrs, &mut sym_gen);

        // Incompatible literals are not rejected here. The obligation is left
        // for a solver to refute.
        let result = builder.broadcast(&DimExpr::from(2), &DimExpr::from(3));
        assert_eq!(result, DimExpr::from("S0"));
        assert_eq!(cstrs.broadcasts()[0].lhs, DimExpr::from(2));
    }

    #[test]
    fn test_cstr_eq() {
        let mut cstrs = Constraints::new();
        let mut sym_gen = SymbolGen::new();
        let mut builder = DimExprBuilder::new(&mut cstrs, &mut sym_gen);

        builder.cstr_eq(&DimExpr::from("n"), &DimExpr::from(4));
        builder.cstr_eq(&DimExpr::from(4), &DimExpr::from("n"));
        assert_eq!(cstrs.equalities().len(), 1);
    }
}

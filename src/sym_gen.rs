//! Symbol name generator.

use std::borrow::Cow;

use crate::sym_expr::DimExpr;

/// Generates fresh named symbols.
///
/// Each analysis run owns one generator, so symbol names are unique within a
/// run. Names are formed from a prefix and a counter starting at zero, eg.
/// `S0`, `S1` ...
///
/// New symbols stand for values that cannot be expressed in terms of existing
/// ones, such as an unknown input dimension or the result of a broadcast whose
/// operands cannot be compared. Where a value can be computed from others it
/// should be expressed as a [`DimExpr`] instead.
pub struct SymbolGen {
    prefix: Cow<'static, str>,
    next_symbol_id: u32,
}

impl Default for SymbolGen {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolGen {
    pub fn new() -> Self {
        Self::with_prefix("S".into())
    }

    pub fn with_prefix(prefix: Cow<'static, str>) -> Self {
        Self {
            prefix,
            next_symbol_id: 0,
        }
    }

    /// Return the number of symbols generated so far.
    pub fn count(&self) -> u32 {
        self.next_symbol_id
    }

    /// Forget symbols generated after the first `count`, so their names are
    /// handed out again.
    pub(crate) fn rewind(&mut self, count: u32) {
        self.next_symbol_id = self.next_symbol_id.min(count);
    }

    /// Generate a new symbol.
    pub fn gen_symbol(&mut self) -> DimExpr {
        let name = format!("{}{}", self.prefix, self.next_symbol_id);
        self.next_symbol_id += 1;
        DimExpr::var(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::{DimExpr, SymbolGen};

    #[test]
    fn test_symbol_gen() {
        let mut sym_gen = SymbolGen::new();
        assert_eq!(sym_gen.gen_symbol(), DimExpr::var("S0"));
        assert_eq!(sym_gen.gen_symbol(), DimExpr::var("S1"));
        assert_eq!(sym_gen.count(), 2);

        sym_gen.rewind(1);
        assert_eq!(sym_gen.gen_symbol(), DimExpr::var("S1"));
        sym_gen.rewind(5);
        assert_eq!(sym_gen.count(), 2);

        let mut sym_gen = SymbolGen::with_prefix("dim_".into());
        assert_eq!(sym_gen.gen_symbol(), DimExpr::var("dim_0"));
        assert_eq!(sym_gen.gen_symbol(), DimExpr::var("dim_1"));
    }
}

//! Symbolic expressions representing dimension sizes.

use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::sync::Arc;

/// A named variable standing for a dimension size that is unknown until
/// runtime.
///
/// Two symbols are equal if they have the same name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub name: String,
}

/// Symbolic expression representing an integer value, usually a dimension
/// size or an element of a tensor that holds a shape.
///
/// Expressions are immutable. Composite expressions share their operands via
/// [`Arc`], so cloning an expression is cheap.
///
/// The arithmetic operators (`+`, `-`, `*`, `/`) perform cheap structural
/// simplification as they build the expression: two constants are folded and
/// identities such as `x + 0` or `x * 1` are removed. No other rewriting is
/// done, so `(x + 1) - 1` stays as written.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum DimExpr {
    /// Known integer value.
    Value(i64),
    /// Symbolic value
    Var(Arc<Symbol>),
    /// Addition of two symbolic values
    Add(Arc<DimExpr>, Arc<DimExpr>),
    /// Subtraction of two symbolic values
    Sub(Arc<DimExpr>, Arc<DimExpr>),
    /// Multiplication of two symbolic values
    Mul(Arc<DimExpr>, Arc<DimExpr>),
    /// Truncating division of first expression by second.
    Div(Arc<DimExpr>, Arc<DimExpr>),
    /// Unresolved broadcast of two sizes.
    ///
    /// At runtime this is the larger of the two values, with the obligation
    /// that they are either equal or one of them is 1.
    Broadcast(Arc<DimExpr>, Arc<DimExpr>),
}

impl DimExpr {
    /// Create a named symbol.
    pub fn var(name: &str) -> Self {
        DimExpr::Var(
            Symbol {
                name: name.to_string(),
            }
            .into(),
        )
    }

    /// Return the value of this expression if it is a known constant.
    pub fn as_value(&self) -> Option<i64> {
        match self {
            Self::Value(x) => Some(*x),
            _ => None,
        }
    }

    /// Return true if this expression is a known constant.
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Return true if this expression is the constant `value`.
    pub fn is(&self, value: i64) -> bool {
        self.as_value() == Some(value)
    }

    /// Return the symbol if this expression is a single named variable.
    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Var(sym) => Some(sym),
            _ => None,
        }
    }

    /// Return the unresolved broadcast of `self` and `other`.
    ///
    /// Trivial cases are resolved immediately: equal operands produce that
    /// operand and a constant `1` on either side produces the other side.
    pub fn broadcast(&self, other: &DimExpr) -> DimExpr {
        if self == other || other.is(1) {
            self.clone()
        } else if self.is(1) {
            other.clone()
        } else {
            Self::Broadcast(self.clone().into(), other.clone().into())
        }
    }

    /// Return the product of `dims`, or `1` if `dims` is empty.
    pub fn product<'a>(dims: impl IntoIterator<Item = &'a DimExpr>) -> DimExpr {
        dims.into_iter()
            .fold(DimExpr::Value(1), |prod, dim| prod * dim.clone())
    }

    /// Re-apply constant folding and identity removal throughout an
    /// expression.
    ///
    /// Expressions built with the arithmetic operators are already in this
    /// form. This is useful for trees constructed directly from variants.
    pub fn simplify(&self) -> DimExpr {
        match self {
            Self::Value(_) | Self::Var(_) => self.clone(),
            Self::Add(lhs, rhs) => lhs.simplify() + rhs.simplify(),
            Self::Sub(lhs, rhs) => lhs.simplify() - rhs.simplify(),
            Self::Mul(lhs, rhs) => lhs.simplify() * rhs.simplify(),
            Self::Div(lhs, rhs) => lhs.simplify() / rhs.simplify(),
            Self::Broadcast(lhs, rhs) => lhs.simplify().broadcast(&rhs.simplify()),
        }
    }

    /// Return the precedence of the operator.
    ///
    /// This is used to add parentheses when formatting an expression tree.
    fn precedence(&self) -> u8 {
        match self {
            // Functions and atomic values never need to be wrapped in parens.
            Self::Value(_) | Self::Var(_) | Self::Broadcast(..) => 3,
            Self::Mul(..) | Self::Div(..) => 2,
            Self::Add(..) | Self::Sub(..) => 1,
        }
    }

    fn fmt_with(&self, f: &mut fmt::Formatter<'_>, fmt_var: FmtVar) -> fmt::Result {
        match self {
            Self::Value(val) => write!(f, "{}", val),
            Self::Var(sym) => fmt_var(sym, f),
            Self::Add(lhs, rhs) => self.fmt_binop(f, fmt_var, '+', lhs, rhs),
            Self::Sub(lhs, rhs) => self.fmt_binop(f, fmt_var, '-', lhs, rhs),
            Self::Mul(lhs, rhs) => self.fmt_binop(f, fmt_var, '*', lhs, rhs),
            Self::Div(lhs, rhs) => self.fmt_binop(f, fmt_var, '/', lhs, rhs),
            Self::Broadcast(lhs, rhs) => {
                write!(f, "broadcast(")?;
                lhs.fmt_with(f, fmt_var)?;
                write!(f, ", ")?;
                rhs.fmt_with(f, fmt_var)?;
                write!(f, ")")
            }
        }
    }

    fn fmt_binop(
        &self,
        f: &mut fmt::Formatter<'_>,
        fmt_var: FmtVar,
        op: char,
        lhs: &DimExpr,
        rhs: &DimExpr,
    ) -> fmt::Result {
        lhs.fmt_operand(f, fmt_var, lhs.precedence() < self.precedence())?;
        write!(f, " {op} ")?;

        // Only `a + (b + c)` and `a * (b * c)` can drop the parens around a
        // right operand of equal precedence.
        let rhs_parens = rhs.precedence() < self.precedence()
            || (rhs.precedence() == self.precedence()
                && !matches!(
                    (self, rhs),
                    (Self::Add(..), Self::Add(..)) | (Self::Mul(..), Self::Mul(..))
                ));
        rhs.fmt_operand(f, fmt_var, rhs_parens)
    }

    fn fmt_operand(
        &self,
        f: &mut fmt::Formatter<'_>,
        fmt_var: FmtVar,
        parens: bool,
    ) -> fmt::Result {
        if parens {
            write!(f, "(")?;
            self.fmt_with(f, fmt_var)?;
            write!(f, ")")
        } else {
            self.fmt_with(f, fmt_var)
        }
    }
}

type FmtVar = fn(&Symbol, &mut fmt::Formatter<'_>) -> fmt::Result;

/// Fold a binary operation on two constants, or return `None` if either side
/// is symbolic or the result would overflow.
fn fold_values(
    lhs: &DimExpr,
    rhs: &DimExpr,
    op: impl Fn(i64, i64) -> Option<i64>,
) -> Option<DimExpr> {
    match (lhs, rhs) {
        (DimExpr::Value(x), DimExpr::Value(y)) => op(*x, *y).map(DimExpr::Value),
        _ => None,
    }
}

impl Add<DimExpr> for DimExpr {
    type Output = DimExpr;

    fn add(self, rhs: DimExpr) -> Self {
        if let Some(sum) = fold_values(&self, &rhs, i64::checked_add) {
            return sum;
        }
        match (self, rhs) {
            (DimExpr::Value(0), rhs) => rhs,
            (lhs, DimExpr::Value(0)) => lhs,
            (lhs, rhs) => Self::Add(lhs.into(), rhs.into()),
        }
    }
}

impl Sub<DimExpr> for DimExpr {
    type Output = DimExpr;

    fn sub(self, rhs: DimExpr) -> Self {
        if let Some(diff) = fold_values(&self, &rhs, i64::checked_sub) {
            return diff;
        }
        match (self, rhs) {
            (lhs, DimExpr::Value(0)) => lhs,
            (lhs, rhs) => Self::Sub(lhs.into(), rhs.into()),
        }
    }
}

impl Mul<DimExpr> for DimExpr {
    type Output = DimExpr;

    fn mul(self, rhs: DimExpr) -> Self {
        if let Some(prod) = fold_values(&self, &rhs, i64::checked_mul) {
            return prod;
        }
        match (self, rhs) {
            (DimExpr::Value(1), rhs) => rhs,
            (lhs, DimExpr::Value(1)) => lhs,
            (lhs, rhs) => Self::Mul(lhs.into(), rhs.into()),
        }
    }
}

impl Div<DimExpr> for DimExpr {
    type Output = DimExpr;

    fn div(self, rhs: DimExpr) -> Self {
        // `checked_div` returns `None` for a zero divisor, which leaves the
        // expression unevaluated.
        if let Some(quot) = fold_values(&self, &rhs, i64::checked_div) {
            return quot;
        }
        match (self, rhs) {
            (lhs, DimExpr::Value(1)) => lhs,
            (lhs, rhs) => Self::Div(lhs.into(), rhs.into()),
        }
    }
}

impl From<Symbol> for DimExpr {
    fn from(val: Symbol) -> Self {
        Self::Var(val.into())
    }
}

/// Create a symbol with a given name.
impl<'a> From<&'a str> for DimExpr {
    fn from(name: &'a str) -> Self {
        DimExpr::var(name)
    }
}

impl From<i64> for DimExpr {
    fn from(val: i64) -> Self {
        DimExpr::Value(val)
    }
}

impl fmt::Debug for DimExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with(f, |sym, f| write!(f, "\"{}\"", sym.name))
    }
}

impl fmt::Display for DimExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with(f, |sym, f| write!(f, "{}", sym.name))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::DimExpr;

    #[test]
    fn test_fold_constants() {
        let two = DimExpr::from(2);
        let three = DimExpr::from(3);

        assert_eq!(two.clone() + three.clone(), DimExpr::Value(5));
        assert_eq!(two.clone() - three.clone(), DimExpr::Value(-1));
        assert_eq!(two.clone() * three.clone(), DimExpr::Value(6));
        assert_eq!(DimExpr::from(7) / two.clone(), DimExpr::Value(3));
        assert_eq!(DimExpr::from(-7) / two.clone(), DimExpr::Value(-3));

        // Division by zero is left unevaluated.
        let expr = three.clone() / DimExpr::from(0);
        assert_eq!(
            expr,
            DimExpr::Div(Arc::new(three.clone()), Arc::new(DimExpr::Value(0)))
        );

        // So is overflow.
        let big = DimExpr::from(i64::MAX);
        assert!(matches!(big.clone() + DimExpr::from(1), DimExpr::Add(..)));
    }

    #[test]
    fn test_fold_identities() {
        let x = DimExpr::from("x");
        let zero = DimExpr::from(0);
        let one = DimExpr::from(1);

        assert_eq!(x.clone() + zero.clone(), x);
        assert_eq!(zero.clone() + x.clone(), x);
        assert_eq!(x.clone() - zero.clone(), x);
        assert_eq!(x.clone() * one.clone(), x);
        assert_eq!(one.clone() * x.clone(), x);
        assert_eq!(x.clone() / one.clone(), x);

        // These are not identities and must be kept.
        assert!(matches!(zero.clone() - x.clone(), DimExpr::Sub(..)));
        assert!(matches!(one.clone() / x.clone(), DimExpr::Div(..)));
        assert!(matches!(x.clone() - x.clone(), DimExpr::Sub(..)));
    }

    #[test]
    fn test_symbol_identity() {
        assert_eq!(DimExpr::from("S0"), DimExpr::var("S0"));
        assert_ne!(DimExpr::from("S0"), DimExpr::from("S1"));
        assert_ne!(DimExpr::from("S0"), DimExpr::from(0));
    }

    #[test]
    fn test_structural_equality() {
        let x = DimExpr::from("x");
        let y = DimExpr::from("y");

        assert_eq!(x.clone() * y.clone(), x.clone() * y.clone());

        // Equality is structural, operands are not reordered.
        assert_ne!(x.clone() + y.clone(), y.clone() + x.clone());
    }

    #[test]
    fn test_broadcast() {
        let one = DimExpr::from(1);
        let ten = DimExpr::from(10);
        let foo = DimExpr::from("foo");

        assert_eq!(foo.broadcast(&one), foo);
        assert_eq!(one.broadcast(&foo), foo);
        assert_eq!(foo.broadcast(&foo), foo);
        assert_eq!(ten.broadcast(&one), ten);
        assert_eq!(
            foo.broadcast(&ten),
            DimExpr::Broadcast(foo.clone().into(), ten.clone().into())
        );
    }

    #[test]
    fn test_product() {
        let dims = [DimExpr::from(2), DimExpr::from(3), DimExpr::from(4)];
        assert_eq!(DimExpr::product(&dims), DimExpr::Value(24));

        let dims = [DimExpr::from("batch"), DimExpr::from(4)];
        assert_eq!(
            DimExpr::product(&dims),
            DimExpr::from("batch") * DimExpr::from(4)
        );

        let empty: [DimExpr; 0] = [];
        assert_eq!(DimExpr::product(&empty), DimExpr::Value(1));
    }

    #[test]
    fn test_simplify() {
        let x = DimExpr::from("x");
        let expr = DimExpr::Mul(
            Arc::new(DimExpr::Add(
                Arc::new(x.clone()),
                Arc::new(DimExpr::Value(0)),
            )),
            Arc::new(DimExpr::Div(
                Arc::new(DimExpr::Value(6)),
                Arc::new(DimExpr::Value(6)),
            )),
        );
        assert_eq!(expr.simplify(), x);

        let expr = DimExpr::Broadcast(Arc::new(DimExpr::Value(1)), Arc::new(x.clone()));
        assert_eq!(expr.simplify(), x);
    }

    #[test]
    fn test_display() {
        let expr = (DimExpr::from(1) + DimExpr::from("foo")) * DimExpr::from(3)
            + DimExpr::from("bar")
            - DimExpr::from(5);
        assert_eq!(expr.to_string(), "(1 + foo) * 3 + bar - 5");

        let expr = DimExpr::from("a") - (DimExpr::from("b") - DimExpr::from("c"));
        assert_eq!(expr.to_string(), "a - (b - c)");

        let expr = DimExpr::from("n") / (DimExpr::from("h") * DimExpr::from("w"));
        assert_eq!(expr.to_string(), "n / (h * w)");

        let expr = DimExpr::from("a") * (DimExpr::from("b") / DimExpr::from("c"));
        assert_eq!(expr.to_string(), "a * (b / c)");

        let expr = DimExpr::from("a") + (DimExpr::from("b") - DimExpr::from("c"));
        assert_eq!(expr.to_string(), "a + (b - c)");

        let expr = DimExpr::from("a").broadcast(&DimExpr::from("b"));
        assert_eq!(expr.to_string(), "broadcast(a, b)");
    }

    #[test]
    fn test_debug() {
        let expr = DimExpr::from("foo") * DimExpr::from(3);
        assert_eq!(format!("{:?}", expr), "\"foo\" * 3");
    }
}

//! Per-value records of symbolic shapes and materialized data.

use std::fmt;

use crate::sym_expr::DimExpr;

/// Symbolic shape of a tensor value, plus its element values when they are
/// known.
///
/// Element values are tracked for small integer tensors which hold shapes or
/// shape-derived quantities, such as the output of a `shape` operator. For
/// such a tensor `data` is present, the tensor has rank 1 and `shape[0]` is the
/// literal length of `data`. Rank-0 scalars with known values have an empty
/// shape and a single data element.
///
/// ```
/// use symshape::{DimExpr, TensorShapeOrData};
///
/// // A `[batch, 3]` tensor with unknown values.
/// let x = TensorShapeOrData::from_shape(vec!["batch".into(), 3.into()]);
/// assert_eq!(x.rank(), 2);
/// assert!(x.data().is_none());
///
/// // Its shape, as a tensor with known values.
/// let shape = TensorShapeOrData::from_data(x.shape().to_vec());
/// assert_eq!(shape.shape(), &[DimExpr::Value(2)]);
/// assert_eq!(shape.data(), Some(x.shape()));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct TensorShapeOrData {
    shape: Vec<DimExpr>,
    data: Option<Vec<DimExpr>>,
}

impl TensorShapeOrData {
    /// Create a record for a tensor with the given shape and unknown values.
    pub fn from_shape(shape: Vec<DimExpr>) -> Self {
        Self { shape, data: None }
    }

    /// Create a record for a vector with known values.
    pub fn from_data(data: Vec<DimExpr>) -> Self {
        Self {
            shape: vec![DimExpr::Value(data.len() as i64)],
            data: Some(data),
        }
    }

    /// Create a record for a scalar with a known value.
    pub fn from_scalar(value: DimExpr) -> Self {
        Self {
            shape: Vec::new(),
            data: Some(vec![value]),
        }
    }

    /// Create a record for a tensor of `shape` filled with `value`.
    ///
    /// The record stores the fill value as its only data element, whatever the
    /// shape. Consumers that read data as a vector of dimension sizes must
    /// skip the data of a fill.
    pub fn fill(shape: Vec<DimExpr>, value: DimExpr) -> Self {
        Self {
            shape,
            data: Some(vec![value]),
        }
    }

    pub fn shape(&self) -> &[DimExpr] {
        &self.shape
    }

    pub fn data(&self) -> Option<&[DimExpr]> {
        self.data.as_deref()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Return the known data if every element is a literal.
    pub fn literal_data(&self) -> Option<Vec<i64>> {
        self.data()?.iter().map(|x| x.as_value()).collect()
    }
}

impl fmt::Display for TensorShapeOrData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape=")?;
        fmt_dims(f, &self.shape)?;
        if let Some(data) = &self.data {
            write!(f, " data=")?;
            fmt_dims(f, data)?;
        }
        Ok(())
    }
}

fn fmt_dims(f: &mut fmt::Formatter<'_>, dims: &[DimExpr]) -> fmt::Result {
    write!(f, "[")?;
    for (i, dim) in dims.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", dim)?;
    }
    write!(f, "]")
}

/// Shape record for a value, which is either a single tensor or a list of
/// tensors.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeOrData {
    Tensor(TensorShapeOrData),
    TensorList(Vec<TensorShapeOrData>),
}

impl ShapeOrData {
    pub fn as_tensor(&self) -> Option<&TensorShapeOrData> {
        match self {
            Self::Tensor(t) => Some(t),
            Self::TensorList(_) => None,
        }
    }

    pub fn as_tensor_list(&self) -> Option<&[TensorShapeOrData]> {
        match self {
            Self::Tensor(_) => None,
            Self::TensorList(list) => Some(list),
        }
    }
}

impl From<TensorShapeOrData> for ShapeOrData {
    fn from(val: TensorShapeOrData) -> Self {
        Self::Tensor(val)
    }
}

impl fmt::Display for ShapeOrData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tensor(t) => write!(f, "{}", t),
            Self::TensorList(list) => {
                write!(f, "(")?;
                for (i, t) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
pub(crate) use tests::{sym_elems, sym_shape, sym_vec};

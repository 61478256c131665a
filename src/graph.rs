//! Minimal host graph model.
//!
//! Operators are identified by kind, read ordered operand values and a typed
//! attribute map, and define result values. Operations are stored in program
//! order, so every operand is defined by an earlier operation or seeded by the
//! host before the pass runs.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::infer_shapes::InferError;

/// Identity of a value in a [`Graph`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u32);

impl ValueId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

macro_rules! op_kinds {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Kind of an operator.
        ///
        /// In-place variants, written with a trailing underscore such as
        /// `pd_op.add_`, share the kind of the out-of-place operator and are
        /// distinguished by [`Operation::is_inplace`].
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum OpKind {
            $($variant),*
        }

        impl OpKind {
            /// All operator kinds.
            pub const ALL: &[OpKind] = &[$(OpKind::$variant),*];

            /// Return the dialect-qualified name of the out-of-place operator.
            pub fn name(self) -> &'static str {
                match self {
                    $(OpKind::$variant => $name),*
                }
            }
        }
    };
}

op_kinds! {
    // Builtin
    Combine => "builtin.combine",

    // Values and shapes
    Data => "pd_op.data",
    Full => "pd_op.full",
    FullIntArray => "pd_op.full_int_array",
    FullWithTensor => "pd_op.full_with_tensor",
    Shape => "pd_op.shape",
    ShapeSr => "pd_op.shape_sr",
    Arange => "pd_op.arange",

    // Same shape
    Abs => "pd_op.abs",
    Cast => "pd_op.cast",
    Exp => "pd_op.exp",
    Pow => "pd_op.pow",
    Relu => "pd_op.relu",
    Rsqrt => "pd_op.rsqrt",
    Scale => "pd_op.scale",
    ScaleSr => "pd_op.scale_sr",

    // Elementwise binary
    Add => "pd_op.add",
    Subtract => "pd_op.subtract",
    Multiply => "pd_op.multiply",
    MultiplySr => "pd_op.multiply_sr",
    Divide => "pd_op.divide",
    ElementwisePow => "pd_op.elementwise_pow",

    // Reductions
    Sum => "pd_op.sum",
    Max => "pd_op.max",
    Prod => "pd_op.prod",

    // Layout
    Reshape => "pd_op.reshape",
    Slice => "pd_op.slice",
    Squeeze => "pd_op.squeeze",
    Unsqueeze => "pd_op.unsqueeze",
    Tile => "pd_op.tile",
    Concat => "pd_op.concat",
    Stack => "pd_op.stack",

    // Gathers and products
    Embedding => "pd_op.embedding",
    GatherNd => "pd_op.gather_nd",
    Matmul => "pd_op.matmul",

    // CINN dialect
    CinnConcat => "cinn_op.concat",
    CinnReduceMax => "cinn_op.reduce_max",
    CinnReduceMin => "cinn_op.reduce_min",
    CinnReduceProd => "cinn_op.reduce_prod",
    CinnReduceSum => "cinn_op.reduce_sum",
    CinnReshape => "cinn_op.reshape",
    CinnSlice => "cinn_op.slice",

    // Operators without shape inference
    Assign => "pd_op.assign",
    BitwiseAnd => "pd_op.bitwise_and",
    Expand => "pd_op.expand",
    ExpandAs => "pd_op.expand_as",
    Feed => "pd_op.feed",
    GreaterThan => "pd_op.greater_than",
    Increment => "pd_op.increment",
    LessThan => "pd_op.less_than",
    Log => "pd_op.log",
    LogicalAnd => "pd_op.logical_and",
    LogicalNot => "pd_op.logical_not",
    NotEqual => "pd_op.not_equal",
    SparseWeightEmbedding => "pd_op.sparse_weight_embedding",
    Split => "pd_op.split",
    TopPSampling => "pd_op.top_p_sampling",
    Transpose => "pd_op.transpose",
    Tril => "pd_op.tril",
    Where => "pd_op.where",
}

impl OpKind {
    /// Parse an operator name, returning the kind and whether the name refers
    /// to the in-place variant.
    ///
    /// ```
    /// use symshape::OpKind;
    ///
    /// assert_eq!(OpKind::parse("pd_op.add"), Some((OpKind::Add, false)));
    /// assert_eq!(OpKind::parse("pd_op.add_"), Some((OpKind::Add, true)));
    /// assert_eq!(OpKind::parse("pd_op.conv2d"), None);
    /// ```
    pub fn parse(name: &str) -> Option<(OpKind, bool)> {
        let find = |name: &str| Self::ALL.iter().copied().find(|k| k.name() == name);
        if let Some(kind) = find(name) {
            return Some((kind, false));
        }
        let kind = find(name.strip_suffix('_')?)?;
        Some((kind, true))
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Static attribute of an operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    Bool(bool),
    Int(i64),
    Float(f64),
    Ints(Vec<i64>),
    Str(String),
}

impl Attribute {
    /// Return the name of this attribute's type, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => bool::TYPE_NAME,
            Self::Int(_) => i64::TYPE_NAME,
            Self::Float(_) => f64::TYPE_NAME,
            Self::Ints(_) => <Vec<i64>>::TYPE_NAME,
            Self::Str(_) => String::TYPE_NAME,
        }
    }
}

impl From<bool> for Attribute {
    fn from(val: bool) -> Self {
        Self::Bool(val)
    }
}

impl From<i64> for Attribute {
    fn from(val: i64) -> Self {
        Self::Int(val)
    }
}

impl From<f64> for Attribute {
    fn from(val: f64) -> Self {
        Self::Float(val)
    }
}

impl From<Vec<i64>> for Attribute {
    fn from(val: Vec<i64>) -> Self {
        Self::Ints(val)
    }
}

impl<const N: usize> From<[i64; N]> for Attribute {
    fn from(val: [i64; N]) -> Self {
        Self::Ints(val.into())
    }
}

impl From<&str> for Attribute {
    fn from(val: &str) -> Self {
        Self::Str(val.to_string())
    }
}

/// Conversion from an [`Attribute`] to a Rust type.
pub trait AttrValue: Sized {
    /// Name of the type in error messages.
    const TYPE_NAME: &'static str;

    fn from_attr(attr: &Attribute) -> Option<Self>;
}

impl AttrValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_attr(attr: &Attribute) -> Option<Self> {
        match attr {
            Attribute::Bool(x) => Some(*x),
            _ => None,
        }
    }
}

impl AttrValue for i64 {
    const TYPE_NAME: &'static str = "int";

    fn from_attr(attr: &Attribute) -> Option<Self> {
        match attr {
            Attribute::Int(x) => Some(*x),
            _ => None,
        }
    }
}

impl AttrValue for f64 {
    const TYPE_NAME: &'static str = "float";

    fn from_attr(attr: &Attribute) -> Option<Self> {
        match attr {
            Attribute::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl AttrValue for Vec<i64> {
    const TYPE_NAME: &'static str = "int[]";

    fn from_attr(attr: &Attribute) -> Option<Self> {
        match attr {
            Attribute::Ints(x) => Some(x.clone()),
            _ => None,
        }
    }
}

impl AttrValue for String {
    const TYPE_NAME: &'static str = "str";

    fn from_attr(attr: &Attribute) -> Option<Self> {
        match attr {
            Attribute::Str(x) => Some(x.clone()),
            _ => None,
        }
    }
}

/// An operator instance in a [`Graph`].
#[derive(Clone, Debug)]
pub struct Operation {
    kind: OpKind,
    inplace: bool,
    operands: Vec<ValueId>,
    results: Vec<ValueId>,
    attrs: FxHashMap<String, Attribute>,
}

impl Operation {
    pub fn new(kind: OpKind) -> Self {
        Self {
            kind,
            inplace: false,
            operands: Vec::new(),
            results: Vec::new(),
            attrs: FxHashMap::default(),
        }
    }

    /// Create an operation from a dialect-qualified name such as
    /// `pd_op.add_`.
    pub fn from_name(name: &str) -> Option<Self> {
        let (kind, inplace) = OpKind::parse(name)?;
        Some(Self::new(kind).with_inplace(inplace))
    }

    pub fn with_inplace(mut self, inplace: bool) -> Self {
        self.inplace = inplace;
        self
    }

    pub fn with_operands(mut self, operands: impl IntoIterator<Item = ValueId>) -> Self {
        self.operands.extend(operands);
        self
    }

    pub fn with_results(mut self, results: impl IntoIterator<Item = ValueId>) -> Self {
        self.results.extend(results);
        self
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<Attribute>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn is_inplace(&self) -> bool {
        self.inplace
    }

    /// Return the operator name, including the in-place suffix.
    pub fn name(&self) -> String {
        if self.inplace {
            format!("{}_", self.kind.name())
        } else {
            self.kind.name().to_string()
        }
    }

    pub fn operands(&self) -> &[ValueId] {
        &self.operands
    }

    pub fn results(&self) -> &[ValueId] {
        &self.results
    }

    /// Return the `index`th operand.
    pub fn operand(&self, index: usize) -> Result<ValueId, InferError> {
        self.operands.get(index).copied().ok_or_else(|| {
            InferError::InvariantViolation(format!(
                "{} has {} operands, operand {} requested",
                self.name(),
                self.operands.len(),
                index
            ))
        })
    }

    pub fn get_attr(&self, name: &str) -> Option<&Attribute> {
        self.attrs.get(name)
    }

    /// Return the attribute `name` converted to `T`.
    pub fn attr<T: AttrValue>(&self, name: &str) -> Result<T, InferError> {
        let attr = self
            .attrs
            .get(name)
            .ok_or_else(|| InferError::MissingAttribute(name.to_string()))?;
        T::from_attr(attr).ok_or_else(|| InferError::WrongAttributeType {
            name: name.to_string(),
            expected: T::TYPE_NAME,
            actual: attr.type_name(),
        })
    }
}

/// Operations in program order, and the values they define.
#[derive(Default)]
pub struct Graph {
    ops: Vec<Operation>,
    producers: FxHashMap<ValueId, usize>,
    next_value_id: u32,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new value.
    pub fn add_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value_id);
        self.next_value_id += 1;
        id
    }

    /// Allocate `n` new values.
    pub fn add_values(&mut self, n: usize) -> Vec<ValueId> {
        (0..n).map(|_| self.add_value()).collect()
    }

    /// Append an operation and return its index.
    ///
    /// A value's producer is the first operation that lists it as a result.
    /// In-place operations that redefine a value do not replace it.
    pub fn add_op(&mut self, op: Operation) -> usize {
        let index = self.ops.len();
        for &result in op.results() {
            self.producers.entry(result).or_insert(index);
        }
        self.ops.push(op);
        index
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Return a handle to the operation at `index`.
    pub fn op(&self, index: usize) -> Option<OpRef<'_>> {
        self.ops.get(index).map(|op| OpRef {
            graph: self,
            op,
            index,
        })
    }

    /// Iterate over handles to operations in program order.
    pub fn iter(&self) -> impl Iterator<Item = OpRef<'_>> {
        self.ops.iter().enumerate().map(|(index, op)| OpRef {
            graph: self,
            op,
            index,
        })
    }

    /// Return the operation that defines `value`, or `None` for values
    /// seeded by the host.
    pub fn producer(&self, value: ValueId) -> Option<&Operation> {
        self.producers.get(&value).map(|&idx| &self.ops[idx])
    }
}

/// Handle to an operation in a graph.
///
/// This dereferences to [`Operation`] and can also answer questions about the
/// operations that define its operands.
#[derive(Copy, Clone)]
pub struct OpRef<'a> {
    graph: &'a Graph,
    op: &'a Operation,
    index: usize,
}

impl<'a> OpRef<'a> {
    /// Position of this operation in program order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Return the kind of operator that defines operand `index`, or `None`
    /// if it has no producer in the graph.
    pub fn operand_producer(&self, index: usize) -> Option<OpKind> {
        let value = self.op.operands.get(index)?;
        self.graph.producer(*value).map(|op| op.kind())
    }
}

impl std::ops::Deref for OpRef<'_> {
    type Target = Operation;

    fn deref(&self) -> &Operation {
        self.op
    }
}

impl fmt::Debug for OpRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index, self.op.name())
    }
}

#[cfg(test)]
mod tests {
    use super::{Attribute, Graph, OpKind, Operation};
    use crate::infer_shapes::InferError;

    #[test]
    fn test_parse_op_kind() {
        for &kind in OpKind::ALL {
            assert_eq!(OpKind::parse(kind.name()), Some((kind, false)));
            assert_eq!(
                OpKind::parse(&format!("{}_", kind.name())),
                Some((kind, true))
            );
        }
        assert_eq!(OpKind::parse("pd_op.nonexistent"), None);
        assert_eq!(OpKind::parse(""), None);
    }

    #[test]
    fn test_operation_name() {
        let op = Operation::from_name("pd_op.multiply_").unwrap();
        assert_eq!(op.kind(), OpKind::Multiply);
        assert!(op.is_inplace());
        assert_eq!(op.name(), "pd_op.multiply_");
    }

    #[test]
    fn test_attr() {
        let op = Operation::new(OpKind::Sum)
            .with_attr("keepdim", true)
            .with_attr("axis", [1, 2])
            .with_attr("value", 1.5);

        assert_eq!(op.attr::<bool>("keepdim"), Ok(true));
        assert_eq!(op.attr::<Vec<i64>>("axis"), Ok(vec![1, 2]));
        assert_eq!(op.get_attr("value"), Some(&Attribute::Float(1.5)));
        assert_eq!(
            op.attr::<bool>("reduce_all"),
            Err(InferError::MissingAttribute("reduce_all".into()))
        );
        assert_eq!(
            op.attr::<i64>("keepdim"),
            Err(InferError::WrongAttributeType {
                name: "keepdim".into(),
                expected: "int",
                actual: "bool",
            })
        );
    }

    #[test]
    fn test_operand() {
        let mut graph = Graph::new();
        let [x, y] = [graph.add_value(), graph.add_value()];
        let op = Operation::new(OpKind::Relu)
            .with_operands([x])
            .with_results([y]);
        assert_eq!(op.operand(0), Ok(x));
        assert!(matches!(
            op.operand(1),
            Err(InferError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_producers() {
        let mut graph = Graph::new();
        let x = graph.add_value();
        let y = graph.add_value();
        let z = graph.add_value();

        graph.add_op(Operation::new(OpKind::Full).with_results([y]));
        graph.add_op(
            Operation::new(OpKind::Add)
                .with_operands([x, y])
                .with_results([z]),
        );
        graph.add_op(
            Operation::new(OpKind::Add)
                .with_inplace(true)
                .with_operands([z, y])
                .with_results([z]),
        );

        let add = graph.op(1).unwrap();
        assert_eq!(add.kind(), OpKind::Add);
        assert_eq!(add.operand_producer(0), None);
        assert_eq!(add.operand_producer(1), Some(OpKind::Full));
        assert_eq!(add.operand_producer(2), None);

        assert_eq!(graph.producer(z).map(|op| op.is_inplace()), Some(false));
        assert_eq!(x.to_string(), "%0");
        assert_eq!(graph.iter().count(), 3);
    }
}

//! Predicate compilation and evaluation.
//!
//! A parsed predicate is a conjunction of [`Condition`]s, each comparing an
//! attribute or literal against an attribute or literal. Compilation
//! resolves attribute names to byte ranges against the table schema;
//! evaluation runs directly over raw row buffers.
//!
//! Null semantics: if either operand of a comparison is null, the
//! comparison is false. Only the `IS NULL` family consults null flags
//! directly.

use super::error::TableError;
use super::meta::TableMeta;
use crate::datum::{compare_typed, AttrType, CompOp, Value};

/// One side of a parsed condition.
#[derive(Debug, Clone)]
pub enum ConditionOperand {
    /// Reference to a field by name.
    Attr(String),
    /// Literal value.
    Literal(Value),
}

impl ConditionOperand {
    /// Creates an attribute reference.
    pub fn attr(name: &str) -> Self {
        ConditionOperand::Attr(name.to_string())
    }

    /// Creates a literal operand.
    pub fn literal(value: Value) -> Self {
        ConditionOperand::Literal(value)
    }
}

/// A parsed atomic comparison.
#[derive(Debug, Clone)]
pub struct Condition {
    /// Left operand.
    pub left: ConditionOperand,
    /// Comparison operator.
    pub op: CompOp,
    /// Right operand.
    pub right: ConditionOperand,
}

impl Condition {
    /// Creates a condition.
    pub fn new(left: ConditionOperand, op: CompOp, right: ConditionOperand) -> Self {
        Self { left, op, right }
    }

    /// Shorthand for the common `attr op literal` shape.
    pub fn attr_value(attr: &str, op: CompOp, value: Value) -> Self {
        Self::new(ConditionOperand::attr(attr), op, ConditionOperand::literal(value))
    }
}

#[derive(Debug, Clone)]
enum CompiledOperand {
    Field {
        name: String,
        offset: usize,
        len: usize,
        null_flag: Option<usize>,
    },
    Literal {
        bytes: Vec<u8>,
        is_null: bool,
    },
}

/// One compiled atomic comparison, bound to a table schema.
#[derive(Debug, Clone)]
pub struct ConditionFilter {
    left: CompiledOperand,
    right: CompiledOperand,
    op: CompOp,
    attr_type: AttrType,
}

impl ConditionFilter {
    /// Compiles a condition against a schema.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::FieldMissing`] for unknown attribute names and
    /// [`TableError::FieldTypeMismatch`] when operand types disagree.
    pub fn compile(meta: &TableMeta, condition: &Condition) -> Result<Self, TableError> {
        let (left, left_type) = Self::resolve(meta, &condition.left)?;
        let (right, right_type) = Self::resolve(meta, &condition.right)?;

        let attr_type = match (left_type, right_type) {
            (Some(l), Some(r)) if l != r => {
                let field = match &left {
                    CompiledOperand::Field { name, .. } => name.clone(),
                    _ => match &right {
                        CompiledOperand::Field { name, .. } => name.clone(),
                        _ => String::new(),
                    },
                };
                return Err(TableError::FieldTypeMismatch {
                    field,
                    expected: l,
                    actual: r,
                });
            }
            (Some(t), _) | (_, Some(t)) => t,
            (None, None) => AttrType::Nulls,
        };

        Ok(Self {
            left,
            right,
            op: condition.op,
            attr_type,
        })
    }

    fn resolve(
        meta: &TableMeta,
        operand: &ConditionOperand,
    ) -> Result<(CompiledOperand, Option<AttrType>), TableError> {
        match operand {
            ConditionOperand::Attr(name) => {
                let (pos, field) = meta
                    .field_with_position(name)
                    .ok_or_else(|| TableError::FieldMissing(name.clone()))?;
                Ok((
                    CompiledOperand::Field {
                        name: field.name.clone(),
                        offset: field.offset,
                        len: field.len,
                        null_flag: meta.null_flag_index(pos),
                    },
                    Some(field.attr_type),
                ))
            }
            ConditionOperand::Literal(value) => {
                let ty = if value.is_null {
                    None
                } else {
                    Some(value.attr_type)
                };
                Ok((
                    CompiledOperand::Literal {
                        bytes: value.data.clone(),
                        is_null: value.is_null,
                    },
                    ty,
                ))
            }
        }
    }

    /// Returns the comparison operator.
    pub fn op(&self) -> CompOp {
        self.op
    }

    /// If this atom has exactly one attribute side and one literal side,
    /// returns `(field_name, op, literal_bytes, literal_is_null)` with the
    /// operator oriented as `field op literal`.
    pub fn index_probe(&self) -> Option<(&str, CompOp, &[u8], bool)> {
        match (&self.left, &self.right) {
            (
                CompiledOperand::Field { name, .. },
                CompiledOperand::Literal { bytes, is_null },
            ) => Some((name, self.op, bytes, *is_null)),
            (
                CompiledOperand::Literal { bytes, is_null },
                CompiledOperand::Field { name, .. },
            ) => Some((name, flip(self.op), bytes, *is_null)),
            _ => None,
        }
    }

    fn operand<'a>(&self, operand: &'a CompiledOperand, row: &'a [u8]) -> (&'a [u8], bool) {
        match operand {
            CompiledOperand::Field {
                offset,
                len,
                null_flag,
                ..
            } => {
                let is_null = null_flag.map(|i| row[i] != 0).unwrap_or(false);
                (&row[*offset..*offset + *len], is_null)
            }
            CompiledOperand::Literal { bytes, is_null } => (bytes, *is_null),
        }
    }

    /// Evaluates the comparison against a row buffer.
    pub fn evaluate(&self, row: &[u8]) -> bool {
        let (left_bytes, left_null) = self.operand(&self.left, row);
        let (right_bytes, right_null) = self.operand(&self.right, row);

        match self.op {
            CompOp::IsNull => left_null,
            CompOp::IsNotNull => !left_null,
            _ => {
                if left_null || right_null {
                    return false;
                }
                self.op
                    .matches(compare_typed(self.attr_type, left_bytes, right_bytes))
            }
        }
    }
}

/// Mirrors `field op literal` as `literal op field`.
fn flip(op: CompOp) -> CompOp {
    match op {
        CompOp::Lt => CompOp::Gt,
        CompOp::Le => CompOp::Ge,
        CompOp::Gt => CompOp::Lt,
        CompOp::Ge => CompOp::Le,
        other => other,
    }
}

/// Short-circuit AND over an ordered list of compiled atoms.
#[derive(Debug, Clone)]
pub struct CompositeFilter {
    filters: Vec<ConditionFilter>,
}

impl CompositeFilter {
    /// Compiles every condition against the schema.
    pub fn new(meta: &TableMeta, conditions: &[Condition]) -> Result<Self, TableError> {
        let filters = conditions
            .iter()
            .map(|c| ConditionFilter::compile(meta, c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { filters })
    }

    /// Returns the compiled atoms in order.
    pub fn filters(&self) -> &[ConditionFilter] {
        &self.filters
    }

    /// True if the conjunction is empty (matches every row).
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Evaluates the conjunction against a row buffer.
    pub fn evaluate(&self, row: &[u8]) -> bool {
        self.filters.iter().all(|f| f.evaluate(row))
    }
}

//! Column types, parsed values, and field-level byte comparison.
//!
//! Every column value is persisted in a fixed-width slot of the row buffer:
//! `Int`, `Float` and `Date` occupy 4 little-endian bytes, `Chars` occupies
//! its declared width (zero-padded, not length-prefixed). [`compare_typed`]
//! orders two such slots without deserializing them into owned values.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tolerance under which two floats compare as equal.
pub const FLOAT_EPSILON: f32 = 1e-6;

/// In-slot placeholder written for a null `Chars` field.
pub const NULL_CHARS_SENTINEL: &[u8] = b"NULL";

/// In-slot placeholder written for a null `Date` field (1970-01-01).
pub const NULL_DATE_SENTINEL: i32 = 19700101;

/// Column type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrType {
    /// Unknown type; never valid in a schema.
    Undefined,
    /// Fixed-length character string, zero-padded to the declared width.
    Chars,
    /// 32-bit signed integer.
    Int,
    /// 32-bit IEEE 754 float.
    Float,
    /// Calendar date, stored as a `yyyymmdd` 32-bit integer.
    Date,
    /// Long string; stored fixed-width in the row, overflow is handled by
    /// the paged-file layer and opaque to the engine.
    Text,
    /// Value-side marker for a NULL literal; never a column type.
    Nulls,
}

impl AttrType {
    /// Returns the fixed slot width for self-sizing types, or `None` when
    /// the width comes from the schema declaration.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            AttrType::Int | AttrType::Float | AttrType::Date => Some(4),
            AttrType::Chars | AttrType::Text => None,
            AttrType::Undefined | AttrType::Nulls => None,
        }
    }

    /// Returns true if this type can appear as a column type in a schema.
    pub const fn is_field_type(self) -> bool {
        !matches!(self, AttrType::Undefined | AttrType::Nulls)
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttrType::Undefined => "undefined",
            AttrType::Chars => "chars",
            AttrType::Int => "int",
            AttrType::Float => "float",
            AttrType::Date => "date",
            AttrType::Text => "text",
            AttrType::Nulls => "null",
        };
        write!(f, "{}", name)
    }
}

/// Comparison operator of a predicate atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
}

impl CompOp {
    /// Applies the operator to an ordering produced by [`compare_typed`].
    ///
    /// Only meaningful for the six comparison operators; the IS NULL family
    /// is evaluated against null flags, not orderings.
    pub fn matches(self, ord: Ordering) -> bool {
        match self {
            CompOp::Eq => ord == Ordering::Equal,
            CompOp::Ne => ord != Ordering::Equal,
            CompOp::Lt => ord == Ordering::Less,
            CompOp::Le => ord != Ordering::Greater,
            CompOp::Gt => ord == Ordering::Greater,
            CompOp::Ge => ord != Ordering::Less,
            CompOp::IsNull | CompOp::IsNotNull => false,
        }
    }
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompOp::Eq => "=",
            CompOp::Ne => "<>",
            CompOp::Lt => "<",
            CompOp::Le => "<=",
            CompOp::Gt => ">",
            CompOp::Ge => ">=",
            CompOp::IsNull => "is null",
            CompOp::IsNotNull => "is not null",
        };
        write!(f, "{}", s)
    }
}

/// A parsed literal handed to the engine by the query layer.
///
/// The payload is already in storage form: 4 little-endian bytes for
/// `Int`/`Float`/`Date`, raw bytes for `Chars`/`Text`. A NULL literal has
/// `is_null` set and carries no payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    /// Type of the literal; `Nulls` for a bare NULL.
    pub attr_type: AttrType,
    /// Storage-form payload bytes.
    pub data: Vec<u8>,
    /// True if this literal is SQL NULL.
    pub is_null: bool,
}

impl Value {
    /// Creates an integer literal.
    pub fn int(v: i32) -> Self {
        Self {
            attr_type: AttrType::Int,
            data: v.to_le_bytes().to_vec(),
            is_null: false,
        }
    }

    /// Creates a float literal.
    pub fn float(v: f32) -> Self {
        Self {
            attr_type: AttrType::Float,
            data: v.to_le_bytes().to_vec(),
            is_null: false,
        }
    }

    /// Creates a fixed-length string literal.
    pub fn chars(s: &str) -> Self {
        Self {
            attr_type: AttrType::Chars,
            data: s.as_bytes().to_vec(),
            is_null: false,
        }
    }

    /// Creates a date literal from a `yyyymmdd` integer.
    pub fn date(v: i32) -> Self {
        Self {
            attr_type: AttrType::Date,
            data: v.to_le_bytes().to_vec(),
            is_null: false,
        }
    }

    /// Creates a NULL literal.
    pub fn null() -> Self {
        Self {
            attr_type: AttrType::Nulls,
            data: Vec::new(),
            is_null: true,
        }
    }
}

/// Writes the in-slot sentinel for a null field of the given type.
///
/// The sentinel keeps fixed-width comparison trivial; the trailing null-flag
/// byte of the row remains the source of truth for nullness.
pub fn write_null_sentinel(attr_type: AttrType, slot: &mut [u8]) {
    match attr_type {
        AttrType::Int | AttrType::Float => slot.fill(0),
        AttrType::Date => {
            slot[..4].copy_from_slice(&NULL_DATE_SENTINEL.to_le_bytes());
        }
        AttrType::Chars | AttrType::Text => {
            slot.fill(0);
            let n = NULL_CHARS_SENTINEL.len().min(slot.len());
            slot[..n].copy_from_slice(&NULL_CHARS_SENTINEL[..n]);
        }
        AttrType::Undefined | AttrType::Nulls => slot.fill(0),
    }
}

/// Compares two storage-form field payloads of the same type.
///
/// - `Int` / `Date`: little-endian signed 32-bit comparison.
/// - `Float`: IEEE 754 with differences below [`FLOAT_EPSILON`] treated as
///   equal.
/// - `Chars` / `Text`: lexicographic on the payload with trailing zero
///   padding ignored, so a short literal compares equal to its padded
///   storage form.
pub fn compare_typed(attr_type: AttrType, a: &[u8], b: &[u8]) -> Ordering {
    match attr_type {
        AttrType::Int | AttrType::Date => {
            let x = i32::from_le_bytes([a[0], a[1], a[2], a[3]]);
            let y = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            x.cmp(&y)
        }
        AttrType::Float => {
            let x = f32::from_le_bytes([a[0], a[1], a[2], a[3]]);
            let y = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            if (x - y).abs() <= FLOAT_EPSILON {
                Ordering::Equal
            } else if x < y {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        AttrType::Chars | AttrType::Text => {
            let x = trim_padding(a);
            let y = trim_padding(b);
            x.cmp(y)
        }
        AttrType::Undefined | AttrType::Nulls => a.cmp(b),
    }
}

fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map(|p| p + 1)
        .unwrap_or(0);
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(AttrType::Int.fixed_size(), Some(4));
        assert_eq!(AttrType::Float.fixed_size(), Some(4));
        assert_eq!(AttrType::Date.fixed_size(), Some(4));
        assert_eq!(AttrType::Chars.fixed_size(), None);
        assert!(!AttrType::Nulls.is_field_type());
        assert!(AttrType::Text.is_field_type());
    }

    #[test]
    fn test_int_compare() {
        let a = Value::int(-5);
        let b = Value::int(3);
        assert_eq!(compare_typed(AttrType::Int, &a.data, &b.data), Ordering::Less);
        assert_eq!(compare_typed(AttrType::Int, &b.data, &a.data), Ordering::Greater);
        assert_eq!(compare_typed(AttrType::Int, &a.data, &a.data), Ordering::Equal);
    }

    #[test]
    fn test_float_tolerance() {
        let a = Value::float(1.0);
        let b = Value::float(1.0 + 5e-7);
        let c = Value::float(1.1);
        assert_eq!(compare_typed(AttrType::Float, &a.data, &b.data), Ordering::Equal);
        assert_eq!(compare_typed(AttrType::Float, &a.data, &c.data), Ordering::Less);
    }

    #[test]
    fn test_chars_padding_ignored() {
        // Stored form is padded to the declared width
        let stored = b"abc\0\0\0\0\0";
        let literal = b"abc";
        assert_eq!(
            compare_typed(AttrType::Chars, stored, literal),
            Ordering::Equal
        );
        assert_eq!(
            compare_typed(AttrType::Chars, b"ab\0\0", b"abc\0"),
            Ordering::Less
        );
    }

    #[test]
    fn test_date_compare() {
        let a = Value::date(20210101);
        let b = Value::date(20211231);
        assert_eq!(compare_typed(AttrType::Date, &a.data, &b.data), Ordering::Less);
    }

    #[test]
    fn test_null_sentinels() {
        let mut slot = [0xffu8; 8];
        write_null_sentinel(AttrType::Chars, &mut slot);
        assert_eq!(&slot[..4], b"NULL");
        assert_eq!(&slot[4..], &[0, 0, 0, 0]);

        let mut slot = [0xffu8; 4];
        write_null_sentinel(AttrType::Date, &mut slot);
        assert_eq!(i32::from_le_bytes(slot), NULL_DATE_SENTINEL);

        let mut slot = [0xffu8; 4];
        write_null_sentinel(AttrType::Int, &mut slot);
        assert_eq!(i32::from_le_bytes(slot), 0);
    }

    #[test]
    fn test_value_constructors() {
        assert!(Value::null().is_null);
        assert_eq!(Value::int(7).data, 7i32.to_le_bytes());
        assert_eq!(Value::chars("xy").data, b"xy");
        assert!(!Value::float(0.5).is_null);
    }
}

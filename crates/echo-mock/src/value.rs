// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Runtime values that cross the interception boundary.
//!
//! Every argument handed to an intercepted method and every result handed
//! back is a [`Value`]. Reference instances are carried as [`ObjectRef`]
//! handles whose equality is identity, never structural.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Name of a reference type (mocked, declared, or cascaded).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeName(Arc<str>);

impl TypeName {
    /// Creates a type name from any string-like input.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TypeName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl fmt::Debug for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeName({})", self.0)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identity of a live instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity handle for an instance of a reference type.
///
/// Two handles are equal only when they name the same instance. The type
/// name travels with the handle so cascades and diagnostics can name it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    id: InstanceId,
    type_name: TypeName,
}

impl ObjectRef {
    /// Creates a handle for instance `id` of type `type_name`.
    pub fn new(id: InstanceId, type_name: impl Into<TypeName>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
        }
    }

    /// Instance identity.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Declared type of the instance.
    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.type_name, self.id)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.type_name, self.id)
    }
}

/// Coarse classification of a value used by the conversion table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// Scalar, text, bytes, or object handle.
    Single,
    /// Array, list, set, sorted set, or iterator.
    Sequence,
    /// Key/value map.
    Map,
}

/// A runtime value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Absent reference.
    Null,
    /// Result of a method returning nothing.
    Unit,
    /// Boolean.
    Bool(bool),
    /// Unicode scalar.
    Char(char),
    /// 8-bit signed integer.
    Byte(i8),
    /// 16-bit signed integer.
    Short(i16),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Immutable string.
    Str(String),
    /// Mutable character buffer.
    Chars(String),
    /// Raw byte buffer.
    Bytes(Vec<u8>),
    /// Fixed-length array.
    Array(Vec<Value>),
    /// Ordered list.
    List(Vec<Value>),
    /// Insertion-ordered set without duplicates.
    Set(Vec<Value>),
    /// Set kept in ascending [`Value::total_cmp`] order.
    SortedSet(Vec<Value>),
    /// Single-pass iterator over the contained elements.
    Iter(Vec<Value>),
    /// Insertion-ordered map.
    Map(Vec<(Value, Value)>),
    /// Instance handle.
    Object(ObjectRef),
}

impl Value {
    /// Convenience constructor for [`Value::Str`].
    pub fn str(text: impl Into<String>) -> Self {
        Self::Str(text.into())
    }

    /// Returns the coarse shape of this value.
    pub fn shape(&self) -> Shape {
        match self {
            Self::Array(_) | Self::List(_) | Self::Set(_) | Self::SortedSet(_) | Self::Iter(_) => {
                Shape::Sequence
            }
            Self::Map(_) => Shape::Map,
            _ => Shape::Single,
        }
    }

    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Elements of a sequence value, or `None` for any other shape.
    pub fn elements(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items)
            | Self::List(items)
            | Self::Set(items)
            | Self::SortedSet(items)
            | Self::Iter(items) => Some(items),
            _ => None,
        }
    }

    /// Consumes a sequence value and yields its elements.
    pub fn into_elements(self) -> Result<Vec<Value>, Self> {
        match self {
            Self::Array(items)
            | Self::List(items)
            | Self::Set(items)
            | Self::SortedSet(items)
            | Self::Iter(items) => Ok(items),
            other => Err(other),
        }
    }

    /// Text content of a [`Value::Str`] or [`Value::Chars`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Str(text) | Self::Chars(text) => Some(text),
            _ => None,
        }
    }

    /// Instance handle of a [`Value::Object`].
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Numeric view of integral, floating, and char values.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Byte(v) => Some(f64::from(v)),
            Self::Short(v) => Some(f64::from(v)),
            Self::Int(v) => Some(f64::from(v)),
            #[allow(clippy::cast_precision_loss)]
            Self::Long(v) => Some(v as f64),
            Self::Float(v) => Some(f64::from(v)),
            Self::Double(v) => Some(v),
            Self::Char(c) => Some(f64::from(u32::from(c))),
            _ => None,
        }
    }

    /// Integral view of integral and char values.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Byte(v) => Some(i64::from(v)),
            Self::Short(v) => Some(i64::from(v)),
            Self::Int(v) => Some(i64::from(v)),
            Self::Long(v) => Some(v),
            Self::Char(c) => Some(i64::from(u32::from(c))),
            _ => None,
        }
    }

    /// Short label naming the runtime kind, used in diagnostics.
    pub fn kind_label(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Unit => "void".to_owned(),
            Self::Bool(_) => "bool".to_owned(),
            Self::Char(_) => "char".to_owned(),
            Self::Byte(_) => "i8".to_owned(),
            Self::Short(_) => "i16".to_owned(),
            Self::Int(_) => "i32".to_owned(),
            Self::Long(_) => "i64".to_owned(),
            Self::Float(_) => "f32".to_owned(),
            Self::Double(_) => "f64".to_owned(),
            Self::Str(_) => "str".to_owned(),
            Self::Chars(_) => "chars".to_owned(),
            Self::Bytes(_) => "bytes".to_owned(),
            Self::Array(_) => "array".to_owned(),
            Self::List(_) => "list".to_owned(),
            Self::Set(_) => "set".to_owned(),
            Self::SortedSet(_) => "sorted_set".to_owned(),
            Self::Iter(_) => "iter".to_owned(),
            Self::Map(_) => "map".to_owned(),
            Self::Object(obj) => obj.type_name().to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Unit => 1,
            Self::Bool(_) => 2,
            Self::Char(_)
            | Self::Byte(_)
            | Self::Short(_)
            | Self::Int(_)
            | Self::Long(_)
            | Self::Float(_)
            | Self::Double(_) => 3,
            Self::Str(_) | Self::Chars(_) => 4,
            Self::Bytes(_) => 5,
            Self::Array(_) | Self::List(_) | Self::Set(_) | Self::SortedSet(_) | Self::Iter(_) => 6,
            Self::Map(_) => 7,
            Self::Object(_) => 8,
        }
    }

    /// Total order used to keep [`Value::SortedSet`] contents sorted.
    ///
    /// Values of different kinds order by kind; numbers compare by numeric
    /// value, text lexicographically, objects by instance id.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        let by_rank = self.rank().cmp(&other.rank());
        if by_rank != Ordering::Equal {
            return by_rank;
        }
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            (Self::Object(a), Self::Object(b)) => a.id().cmp(&b.id()),
            (Self::Map(a), Self::Map(b)) => a.len().cmp(&b.len()),
            _ => {
                if let (Some(a), Some(b)) = (self.as_text(), other.as_text()) {
                    return a.cmp(b);
                }
                if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
                    return a.total_cmp(&b);
                }
                if let (Some(a), Some(b)) = (self.elements(), other.elements()) {
                    for (x, y) in a.iter().zip(b) {
                        let ord = x.total_cmp(y);
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                    return a.len().cmp(&b.len());
                }
                Ordering::Equal
            }
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Unit => f.write_str("()"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Char(v) => write!(f, "'{v}'"),
            Self::Byte(v) => write!(f, "{v}i8"),
            Self::Short(v) => write!(f, "{v}i16"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}L"),
            Self::Float(v) => write!(f, "{v}f"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Str(v) | Self::Chars(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => write!(f, "bytes{v:?}"),
            Self::Array(items) => write_items(f, "[", items, "]"),
            Self::List(items) => write_items(f, "list[", items, "]"),
            Self::Set(items) => write_items(f, "set{", items, "}"),
            Self::SortedSet(items) => write_items(f, "sorted{", items, "}"),
            Self::Iter(items) => write_items(f, "iter(", items, ")"),
            Self::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Object(obj) => write!(f, "{obj}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Self::Char(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Self::Object(v)
    }
}

impl From<&ObjectRef> for Value {
    fn from(v: &ObjectRef) -> Self {
        Self::Object(v.clone())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

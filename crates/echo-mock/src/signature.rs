// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Type descriptors and method signatures.
//!
//! Signatures are written in a compact notation:
//!
//! ```text
//! name(param, param, elem...) -> return
//! ```
//!
//! Types are the keywords `void bool char i8 i16 i32 i64 f32 f64 str chars
//! bytes any`, the containers `[T]`, `list<T>`, `set<T>`, `sorted_set<T>`,
//! `iter<T>`, `map<K, V>`, or any other identifier naming a reference type.
//! A trailing `T...` parameter is variadic; at runtime its argument is a
//! [`Value::Array`] of elements. The constructor is named `<init>` and must
//! return `void`. An omitted `-> R` means `-> void`.

use std::fmt;

use thiserror::Error;

use crate::value::{TypeName, Value};

/// Keywords and container names that can never name a reference type.
pub const BUILTIN_TYPE_NAMES: &[&str] = &[
    "void",
    "bool",
    "char",
    "i8",
    "i16",
    "i32",
    "i64",
    "f32",
    "f64",
    "str",
    "chars",
    "bytes",
    "any",
    "list",
    "set",
    "sorted_set",
    "iter",
    "map",
];

/// Name reserved for constructors.
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// Declared type of a parameter or return value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    /// No value.
    Void,
    /// `bool`.
    Bool,
    /// `char`.
    Char,
    /// `i8`.
    Byte,
    /// `i16`.
    Short,
    /// `i32`.
    Int,
    /// `i64`.
    Long,
    /// `f32`.
    Float,
    /// `f64`.
    Double,
    /// Immutable string.
    Str,
    /// Mutable character buffer.
    Chars,
    /// Byte buffer.
    Bytes,
    /// Any reference value; accepts every value unchanged.
    Any,
    /// `[T]`.
    Array(Box<TypeDesc>),
    /// `list<T>`.
    List(Box<TypeDesc>),
    /// `set<T>`.
    Set(Box<TypeDesc>),
    /// `sorted_set<T>`.
    SortedSet(Box<TypeDesc>),
    /// `iter<T>`.
    Iter(Box<TypeDesc>),
    /// `map<K, V>`.
    Map(Box<TypeDesc>, Box<TypeDesc>),
    /// A named reference type.
    Object(TypeName),
}

impl TypeDesc {
    /// Parses a single type descriptor.
    pub fn parse(text: &str) -> Result<Self, SignatureError> {
        let mut cursor = Cursor::new(text);
        let ty = cursor.type_desc()?;
        cursor.skip_ws();
        cursor.expect_end()?;
        Ok(ty)
    }

    /// True for the scalar types that cannot hold `null`.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Char
                | Self::Byte
                | Self::Short
                | Self::Int
                | Self::Long
                | Self::Float
                | Self::Double
        )
    }

    /// True for numeric primitives (including `char`).
    pub fn is_numeric(&self) -> bool {
        self.is_primitive() && !matches!(self, Self::Bool)
    }

    /// True for arrays, lists, sets, sorted sets, and iterators.
    pub fn is_multi_valued(&self) -> bool {
        self.element_type().is_some()
    }

    /// Element type of a multi-valued type.
    pub fn element_type(&self) -> Option<&TypeDesc> {
        match self {
            Self::Array(elem)
            | Self::List(elem)
            | Self::Set(elem)
            | Self::SortedSet(elem)
            | Self::Iter(elem) => Some(elem),
            _ => None,
        }
    }

    /// Reference type name, for types that can cascade.
    pub fn object_name(&self) -> Option<&TypeName> {
        match self {
            Self::Object(name) => Some(name),
            _ => None,
        }
    }

    /// The value a method of this return type yields when nothing was
    /// recorded: zero for numbers, `false`, empty text and containers,
    /// `Unit` for `void`, and `Null` for reference types.
    pub fn zero_value(&self) -> Value {
        match self {
            Self::Void => Value::Unit,
            Self::Bool => Value::Bool(false),
            Self::Char => Value::Char('\0'),
            Self::Byte => Value::Byte(0),
            Self::Short => Value::Short(0),
            Self::Int => Value::Int(0),
            Self::Long => Value::Long(0),
            Self::Float => Value::Float(0.0),
            Self::Double => Value::Double(0.0),
            Self::Str => Value::Str(String::new()),
            Self::Chars => Value::Chars(String::new()),
            Self::Bytes => Value::Bytes(Vec::new()),
            Self::Array(_) => Value::Array(Vec::new()),
            Self::List(_) => Value::List(Vec::new()),
            Self::Set(_) => Value::Set(Vec::new()),
            Self::SortedSet(_) => Value::SortedSet(Vec::new()),
            Self::Iter(_) => Value::Iter(Vec::new()),
            Self::Map(_, _) => Value::Map(Vec::new()),
            Self::Any | Self::Object(_) => Value::Null,
        }
    }

    /// True when `value` is an instance of this declared type as-is.
    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Void, Value::Unit)
            | (Self::Bool, Value::Bool(_))
            | (Self::Char, Value::Char(_))
            | (Self::Byte, Value::Byte(_))
            | (Self::Short, Value::Short(_))
            | (Self::Int, Value::Int(_))
            | (Self::Long, Value::Long(_))
            | (Self::Float, Value::Float(_))
            | (Self::Double, Value::Double(_))
            | (Self::Str, Value::Str(_))
            | (Self::Chars, Value::Chars(_))
            | (Self::Bytes, Value::Bytes(_))
            | (Self::Any, _)
            | (Self::Map(_, _), Value::Map(_)) => true,
            (Self::Array(e), Value::Array(items))
            | (Self::List(e), Value::List(items))
            | (Self::Set(e), Value::Set(items))
            | (Self::SortedSet(e), Value::SortedSet(items))
            | (Self::Iter(e), Value::Iter(items)) => items.iter().all(|item| e.admits(item)),
            (Self::Object(name), Value::Object(obj)) => obj.type_name() == name,
            (ty, Value::Null) => !ty.is_primitive() && *ty != Self::Void,
            _ => false,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Bool => f.write_str("bool"),
            Self::Char => f.write_str("char"),
            Self::Byte => f.write_str("i8"),
            Self::Short => f.write_str("i16"),
            Self::Int => f.write_str("i32"),
            Self::Long => f.write_str("i64"),
            Self::Float => f.write_str("f32"),
            Self::Double => f.write_str("f64"),
            Self::Str => f.write_str("str"),
            Self::Chars => f.write_str("chars"),
            Self::Bytes => f.write_str("bytes"),
            Self::Any => f.write_str("any"),
            Self::Array(e) => write!(f, "[{e}]"),
            Self::List(e) => write!(f, "list<{e}>"),
            Self::Set(e) => write!(f, "set<{e}>"),
            Self::SortedSet(e) => write!(f, "sorted_set<{e}>"),
            Self::Iter(e) => write!(f, "iter<{e}>"),
            Self::Map(k, v) => write!(f, "map<{k}, {v}>"),
            Self::Object(name) => write!(f, "{name}"),
        }
    }
}

/// Errors produced while parsing descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Input ended in the middle of a descriptor.
    #[error("unexpected end of descriptor {text:?}")]
    UnexpectedEnd {
        /// The full descriptor.
        text: String,
    },
    /// A character that cannot appear at this position.
    #[error("unexpected {found:?} at offset {offset} in {text:?}")]
    UnexpectedChar {
        /// The full descriptor.
        text: String,
        /// Byte offset of the character.
        offset: usize,
        /// The offending character.
        found: char,
    },
    /// `...` used on a parameter other than the last.
    #[error("variadic parameter must be last in {text:?}")]
    MisplacedVarargs {
        /// The full descriptor.
        text: String,
    },
    /// A constructor declared a non-void return type.
    #[error("constructor must return void, found {found}")]
    ConstructorReturn {
        /// The declared return type.
        found: TypeDesc,
    },
}

/// A parsed method signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    name: String,
    params: Vec<TypeDesc>,
    varargs: bool,
    returns: TypeDesc,
}

impl MethodSignature {
    /// Parses `name(params) -> return`.
    pub fn parse(text: &str) -> Result<Self, SignatureError> {
        let mut cursor = Cursor::new(text);
        cursor.skip_ws();
        let name = if cursor.eat_str(CONSTRUCTOR_NAME) {
            CONSTRUCTOR_NAME.to_owned()
        } else {
            cursor.identifier()?
        };
        cursor.skip_ws();
        cursor.expect('(')?;
        let mut params = Vec::new();
        let mut varargs = false;
        cursor.skip_ws();
        if !cursor.eat(')') {
            loop {
                if varargs {
                    return Err(SignatureError::MisplacedVarargs {
                        text: text.to_owned(),
                    });
                }
                params.push(cursor.type_desc()?);
                cursor.skip_ws();
                if cursor.eat_str("...") {
                    varargs = true;
                    cursor.skip_ws();
                }
                if cursor.eat(')') {
                    break;
                }
                cursor.expect(',')?;
            }
        }
        cursor.skip_ws();
        let returns = if cursor.eat_str("->") {
            cursor.type_desc()?
        } else {
            TypeDesc::Void
        };
        cursor.skip_ws();
        cursor.expect_end()?;
        if name == CONSTRUCTOR_NAME && returns != TypeDesc::Void {
            return Err(SignatureError::ConstructorReturn { found: returns });
        }
        Ok(Self {
            name,
            params,
            varargs,
            returns,
        })
    }

    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter types; a variadic parameter appears as its
    /// element type.
    pub fn params(&self) -> &[TypeDesc] {
        &self.params
    }

    /// True when the last parameter is variadic.
    pub fn is_varargs(&self) -> bool {
        self.varargs
    }

    /// Declared return type.
    pub fn returns(&self) -> &TypeDesc {
        &self.returns
    }

    /// True for `<init>`.
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
            if self.varargs && i + 1 == self.params.len() {
                f.write_str("...")?;
            }
        }
        write!(f, ") -> {}", self.returns)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parser
// ─────────────────────────────────────────────────────────────────────────────

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn error_here(&self) -> SignatureError {
        match self.peek() {
            Some(found) => SignatureError::UnexpectedChar {
                text: self.text.to_owned(),
                offset: self.pos,
                found,
            },
            None => SignatureError::UnexpectedEnd {
                text: self.text.to_owned(),
            },
        }
    }

    fn expect(&mut self, c: char) -> Result<(), SignatureError> {
        self.skip_ws();
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error_here())
        }
    }

    fn expect_end(&self) -> Result<(), SignatureError> {
        if self.pos == self.text.len() {
            Ok(())
        } else {
            Err(self.error_here())
        }
    }

    fn identifier(&mut self) -> Result<String, SignatureError> {
        self.skip_ws();
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            _ => return Err(self.error_here()),
        }
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '_' | '$') {
                self.pos += c.len_utf8();
            } else if c == '.' && self.rest()[1..].starts_with(|n: char| n.is_alphabetic()) {
                self.pos += 1;
            } else if self.rest().starts_with("::") {
                self.pos += 2;
            } else {
                break;
            }
        }
        Ok(self.text[start..self.pos].to_owned())
    }

    fn type_desc(&mut self) -> Result<TypeDesc, SignatureError> {
        self.skip_ws();
        if self.eat('[') {
            let elem = self.type_desc()?;
            self.expect(']')?;
            return Ok(TypeDesc::Array(Box::new(elem)));
        }
        let word = self.identifier()?;
        let ty = match word.as_str() {
            "void" => TypeDesc::Void,
            "bool" => TypeDesc::Bool,
            "char" => TypeDesc::Char,
            "i8" => TypeDesc::Byte,
            "i16" => TypeDesc::Short,
            "i32" => TypeDesc::Int,
            "i64" => TypeDesc::Long,
            "f32" => TypeDesc::Float,
            "f64" => TypeDesc::Double,
            "str" => TypeDesc::Str,
            "chars" => TypeDesc::Chars,
            "bytes" => TypeDesc::Bytes,
            "any" => TypeDesc::Any,
            "list" => TypeDesc::List(Box::new(self.generic_arg()?)),
            "set" => TypeDesc::Set(Box::new(self.generic_arg()?)),
            "sorted_set" => TypeDesc::SortedSet(Box::new(self.generic_arg()?)),
            "iter" => TypeDesc::Iter(Box::new(self.generic_arg()?)),
            "map" => {
                self.expect('<')?;
                let key = self.type_desc()?;
                self.expect(',')?;
                let value = self.type_desc()?;
                self.expect('>')?;
                TypeDesc::Map(Box::new(key), Box::new(value))
            }
            _ => TypeDesc::Object(TypeName::from(word)),
        };
        Ok(ty)
    }

    fn generic_arg(&mut self) -> Result<TypeDesc, SignatureError> {
        self.expect('<')?;
        let ty = self.type_desc()?;
        self.expect('>')?;
        Ok(ty)
    }
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Conversion of recorded and delegated values to declared return types.
//!
//! The table, keyed on the value's [`Shape`](crate::value::Shape) and the
//! target [`TypeDesc`]:
//!
//! | value                         | target                | result                                   |
//! |-------------------------------|-----------------------|------------------------------------------|
//! | anything                      | `any`                 | unchanged                                |
//! | `null`                        | non-primitive         | `null`                                   |
//! | numeric / `char`              | numeric / `char`      | cast to the target width                 |
//! | `str` / `chars`               | `str` / `chars`       | retagged text                            |
//! | `str` / `chars` / byte array  | `bytes`               | UTF-8 / collected bytes                  |
//! | sequence                      | multi-valued          | container conversion, elements converted |
//! | single value                  | multi-valued          | one-element container                    |
//! | map, or sequence of pairs     | `map<K, V>`           | map with converted keys and values       |
//! | instance                      | reference type        | unchanged                                |
//! | sequence                      | single-valued         | consecutive results (recording only)     |
//!
//! Anything else is incompatible.

use crate::signature::TypeDesc;
use crate::value::{Shape, Value};

/// A recorded value after conversion.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Recorded {
    /// One result.
    One(Value),
    /// Consecutive results, one per invocation.
    Consecutive(Vec<Value>),
}

/// Converts a value recorded with `result(..)` for a method returning `target`.
pub(crate) fn convert_recorded(value: Value, target: &TypeDesc) -> Option<Recorded> {
    if value.shape() == Shape::Sequence && !target.is_multi_valued() && !accepts_sequence_whole(target) {
        let items = value.into_elements().ok()?;
        let converted = items
            .into_iter()
            .map(|item| convert(item, target))
            .collect::<Option<Vec<_>>>()?;
        return Some(Recorded::Consecutive(converted));
    }
    convert(value, target).map(Recorded::One)
}

/// Converts the values of `returns(..)`.
///
/// A multi-valued target with plain elements gathers all of them into one
/// container result; otherwise each value is recorded in turn.
pub(crate) fn convert_sequence(values: Vec<Value>, target: &TypeDesc) -> Option<Vec<Value>> {
    let gather = target.is_multi_valued()
        && values.first().is_some_and(|first| first.shape() != Shape::Sequence);
    if gather {
        return convert(Value::List(values), target).map(|v| vec![v]);
    }
    let mut out = Vec::new();
    for value in values {
        match convert_recorded(value, target)? {
            Recorded::One(v) => out.push(v),
            Recorded::Consecutive(vs) => out.extend(vs),
        }
    }
    Some(out)
}

/// Converts a value produced by a delegate.
///
/// `Unit` (a delegate that returned nothing) becomes `null` for reference
/// targets and is incompatible with primitives.
pub(crate) fn convert_delegated(value: Value, target: &TypeDesc) -> Option<Value> {
    match value {
        Value::Unit if *target == TypeDesc::Void => Some(Value::Unit),
        Value::Unit if target.is_primitive() => None,
        Value::Unit => Some(Value::Null),
        other => convert(other, target),
    }
}

fn accepts_sequence_whole(target: &TypeDesc) -> bool {
    matches!(target, TypeDesc::Any | TypeDesc::Bytes | TypeDesc::Map(_, _))
}

/// Converts one value to `target`.
pub(crate) fn convert(value: Value, target: &TypeDesc) -> Option<Value> {
    match target {
        TypeDesc::Any => Some(value),
        TypeDesc::Void => matches!(value, Value::Unit | Value::Null).then_some(Value::Unit),
        _ if value.is_null() => (!target.is_primitive()).then_some(Value::Null),
        TypeDesc::Bool => matches!(value, Value::Bool(_)).then_some(value),
        TypeDesc::Char
        | TypeDesc::Byte
        | TypeDesc::Short
        | TypeDesc::Int
        | TypeDesc::Long
        | TypeDesc::Float
        | TypeDesc::Double => convert_number(&value, target),
        TypeDesc::Str => value.as_text().map(|t| Value::Str(t.to_owned())),
        TypeDesc::Chars => value.as_text().map(|t| Value::Chars(t.to_owned())),
        TypeDesc::Bytes => convert_bytes(value),
        TypeDesc::Array(_) | TypeDesc::List(_) | TypeDesc::Set(_) | TypeDesc::SortedSet(_) | TypeDesc::Iter(_) => {
            convert_container(value, target)
        }
        TypeDesc::Map(key, val) => convert_map(value, key, val),
        TypeDesc::Object(_) => matches!(value, Value::Object(_)).then_some(value),
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn convert_number(value: &Value, target: &TypeDesc) -> Option<Value> {
    let integral = value.as_i64();
    let float = value.as_f64()?;
    let as_int = || integral.unwrap_or(float as i64);
    let converted = match target {
        TypeDesc::Byte => Value::Byte(as_int() as i8),
        TypeDesc::Short => Value::Short(as_int() as i16),
        TypeDesc::Int => Value::Int(as_int() as i32),
        TypeDesc::Long => Value::Long(as_int()),
        TypeDesc::Float => Value::Float(float as f32),
        TypeDesc::Double => Value::Double(float),
        TypeDesc::Char => Value::Char(char::from_u32(as_int() as u32)?),
        _ => return None,
    };
    Some(converted)
}

fn convert_bytes(value: Value) -> Option<Value> {
    match value {
        Value::Bytes(_) => Some(value),
        Value::Str(text) | Value::Chars(text) => Some(Value::Bytes(text.into_bytes())),
        other => {
            let items = other.into_elements().ok()?;
            #[allow(clippy::cast_sign_loss)]
            let bytes = items
                .iter()
                .map(|item| match item {
                    Value::Byte(b) => Some(*b as u8),
                    _ => None,
                })
                .collect::<Option<Vec<u8>>>()?;
            Some(Value::Bytes(bytes))
        }
    }
}

fn convert_container(value: Value, target: &TypeDesc) -> Option<Value> {
    let elem = target.element_type()?;
    let items = match value.shape() {
        Shape::Sequence => value.into_elements().ok()?,
        Shape::Map => return None,
        Shape::Single => vec![value],
    };
    let mut converted = items
        .into_iter()
        .map(|item| convert(item, elem))
        .collect::<Option<Vec<_>>>()?;
    let out = match target {
        TypeDesc::Array(_) => Value::Array(converted),
        TypeDesc::List(_) => Value::List(converted),
        TypeDesc::Iter(_) => Value::Iter(converted),
        TypeDesc::Set(_) => Value::Set(dedup(converted)),
        TypeDesc::SortedSet(_) => {
            converted.sort_by(Value::total_cmp);
            converted.dedup_by(|a, b| a.total_cmp(b).is_eq());
            Value::SortedSet(converted)
        }
        _ => return None,
    };
    Some(out)
}

fn dedup(items: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn convert_map(value: Value, key: &TypeDesc, val: &TypeDesc) -> Option<Value> {
    let pairs = match value {
        Value::Map(entries) => entries,
        other => other
            .into_elements()
            .ok()?
            .into_iter()
            .map(pair)
            .collect::<Option<Vec<_>>>()?,
    };
    let mut entries: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
    for (k, v) in pairs {
        let k = convert(k, key)?;
        let v = convert(v, val)?;
        if let Some(slot) = entries.iter_mut().find(|(existing, _)| *existing == k) {
            slot.1 = v;
        } else {
            entries.push((k, v));
        }
    }
    Some(Value::Map(entries))
}

/// A one- or two-element sequence as a key/value pair.
fn pair(item: Value) -> Option<(Value, Value)> {
    let mut parts = item.into_elements().ok()?.into_iter();
    let key = parts.next()?;
    let value = parts.next().unwrap_or(Value::Null);
    parts.next().is_none().then_some((key, value))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::value::{InstanceId, ObjectRef};

    fn ty(text: &str) -> TypeDesc {
        TypeDesc::parse(text).unwrap()
    }

    #[test]
    fn numbers_cast_to_target_width() {
        assert_eq!(convert(Value::Int(7), &TypeDesc::Long), Some(Value::Long(7)));
        assert_eq!(convert(Value::Long(300), &TypeDesc::Byte), Some(Value::Byte(44)));
        assert_eq!(convert(Value::Int(65), &TypeDesc::Char), Some(Value::Char('A')));
        assert_eq!(convert(Value::Double(2.9), &TypeDesc::Int), Some(Value::Int(2)));
        assert_eq!(convert(Value::str("7"), &TypeDesc::Int), None);
        assert_eq!(convert(Value::Bool(true), &TypeDesc::Int), None);
    }

    #[test]
    fn null_is_only_for_references() {
        assert_eq!(convert(Value::Null, &TypeDesc::Str), Some(Value::Null));
        assert_eq!(convert(Value::Null, &TypeDesc::Int), None);
        assert_eq!(convert(Value::Null, &TypeDesc::Void), Some(Value::Unit));
    }

    #[test]
    fn sequence_for_single_valued_return_becomes_consecutive() {
        let recorded = convert_recorded(Value::Array(vec![Value::Int(1), Value::Int(2)]), &TypeDesc::Long);
        assert_eq!(
            recorded,
            Some(Recorded::Consecutive(vec![Value::Long(1), Value::Long(2)]))
        );
    }

    #[test]
    fn single_value_for_container_return_is_wrapped() {
        assert_eq!(
            convert_recorded(Value::str("a"), &ty("list<str>")),
            Some(Recorded::One(Value::List(vec![Value::str("a")])))
        );
    }

    #[test]
    fn container_conversion_retags_and_orders() {
        let items = Value::List(vec![Value::Int(3), Value::Int(1), Value::Int(3)]);
        assert_eq!(
            convert(items.clone(), &ty("sorted_set<i64>")),
            Some(Value::SortedSet(vec![Value::Long(1), Value::Long(3)]))
        );
        assert_eq!(
            convert(items, &ty("set<i32>")),
            Some(Value::Set(vec![Value::Int(3), Value::Int(1)]))
        );
    }

    #[test]
    fn pairs_become_map_entries() {
        let pairs = Value::Array(vec![
            Value::Array(vec![Value::str("a"), Value::Int(1)]),
            Value::Array(vec![Value::str("b")]),
        ]);
        assert_eq!(
            convert_recorded(pairs, &ty("map<str, any>")),
            Some(Recorded::One(Value::Map(vec![
                (Value::str("a"), Value::Int(1)),
                (Value::str("b"), Value::Null),
            ])))
        );
        let bad = Value::List(vec![Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])]);
        assert_eq!(convert(bad, &ty("map<i32, i32>")), None, "triples are not pairs");
    }

    #[test]
    fn text_converts_to_bytes() {
        assert_eq!(
            convert(Value::str("hi"), &TypeDesc::Bytes),
            Some(Value::Bytes(b"hi".to_vec()))
        );
        assert_eq!(
            convert(Value::Array(vec![Value::Byte(1), Value::Byte(-1)]), &TypeDesc::Bytes),
            Some(Value::Bytes(vec![1, 255]))
        );
    }

    #[test]
    fn gathered_sequence_for_container_return() {
        let out = convert_sequence(vec![Value::Int(1), Value::Int(2)], &ty("[i32]"));
        assert_eq!(out, Some(vec![Value::Array(vec![Value::Int(1), Value::Int(2)])]));
        let out = convert_sequence(vec![Value::Int(1), Value::Int(2)], &TypeDesc::Int);
        assert_eq!(out, Some(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn delegated_unit_depends_on_target() {
        assert_eq!(convert_delegated(Value::Unit, &TypeDesc::Int), None);
        assert_eq!(convert_delegated(Value::Unit, &TypeDesc::Str), Some(Value::Null));
        let obj = ObjectRef::new(InstanceId(4), "Row");
        assert_eq!(
            convert_delegated(Value::from(&obj), &TypeDesc::Object("Row".into())),
            Some(Value::Object(obj))
        );
    }
}

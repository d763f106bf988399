// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Argument matchers and per-expectation argument specifications.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;

use crate::equivalence::EquivalentInstances;
use crate::error::MockError;
use crate::signature::{MethodSignature, TypeDesc};
use crate::value::{ObjectRef, TypeName, Value};

type PredicateFn = dyn Fn(&Value) -> bool + Send + Sync;

/// A named user predicate over one argument.
#[derive(Clone)]
pub struct Predicate {
    label: String,
    test: Arc<PredicateFn>,
}

impl Predicate {
    /// Wraps `test` under a diagnostic `label`.
    pub fn new(label: impl Into<String>, test: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            test: Arc::new(test),
        }
    }

    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.test, &other.test)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({})", self.label)
    }
}

/// Sink collecting the arguments a capturing matcher saw.
#[derive(Clone, Debug, Default)]
pub struct Captured {
    values: Arc<Mutex<Vec<Value>>>,
}

impl Captured {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured values in capture order.
    pub fn values(&self) -> Vec<Value> {
        self.values.lock().clone()
    }

    /// Most recent capture.
    pub fn last(&self) -> Option<Value> {
        self.values.lock().last().cloned()
    }

    /// Number of captures.
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// True when nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    fn push(&self, value: Value) {
        self.values.lock().push(value);
    }

    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }
}

/// A predicate over a single argument value.
#[derive(Clone, Debug)]
pub enum ArgMatcher {
    /// Accepts anything.
    Any,
    /// Accepts any value of the declared type.
    AnyOf(TypeDesc),
    /// Accepts values equal to the expected one. Instances compare through
    /// the equivalence map.
    Equals(Value),
    /// Accepts values different from the expected one.
    NotEquals(Value),
    /// Accepts numbers within `tolerance` of `expected`.
    Near {
        /// Target value.
        expected: f64,
        /// Inclusive absolute tolerance.
        tolerance: f64,
    },
    /// Accepts only `null`.
    Null,
    /// Accepts anything but `null`.
    NotNull,
    /// Accepts exactly this instance.
    Same(ObjectRef),
    /// Accepts instances whose type is the given name.
    InstanceOf(TypeName),
    /// Accepts text containing the substring.
    Contains(String),
    /// Accepts text starting with the prefix.
    StartsWith(String),
    /// Accepts text ending with the suffix.
    EndsWith(String),
    /// Accepts text the expression matches.
    Regex(Regex),
    /// Accepts values the predicate approves.
    Predicate(Predicate),
    /// Accepts anything and records it into the sink on a full match.
    Capture(Captured),
}

impl ArgMatcher {
    /// Builds a [`ArgMatcher::Regex`], reporting bad patterns as
    /// [`MockError::IllegalArgument`].
    pub fn regex(pattern: &str) -> Result<Self, MockError> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| MockError::illegal_argument(format!("bad pattern {pattern:?}: {e}")))
    }

    /// Builds a [`ArgMatcher::Predicate`].
    pub fn predicate(label: impl Into<String>, test: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Predicate::new(label, test))
    }

    /// Tests one argument.
    pub(crate) fn matches(&self, actual: &Value, eq: &EquivalentInstances) -> bool {
        match self {
            Self::Any | Self::Capture(_) => true,
            Self::AnyOf(ty) => ty.admits(actual),
            Self::Equals(expected) => values_equal(expected, actual, eq),
            Self::NotEquals(expected) => !values_equal(expected, actual, eq),
            Self::Near {
                expected,
                tolerance,
            } => actual
                .as_f64()
                .is_some_and(|v| (v - expected).abs() <= *tolerance),
            Self::Null => actual.is_null(),
            Self::NotNull => !actual.is_null(),
            Self::Same(obj) => actual.as_object() == Some(obj),
            Self::InstanceOf(name) => actual.as_object().is_some_and(|o| o.type_name() == name),
            Self::Contains(part) => actual.as_text().is_some_and(|t| t.contains(part.as_str())),
            Self::StartsWith(part) => actual.as_text().is_some_and(|t| t.starts_with(part.as_str())),
            Self::EndsWith(part) => actual.as_text().is_some_and(|t| t.ends_with(part.as_str())),
            Self::Regex(re) => actual.as_text().is_some_and(|t| re.is_match(t)),
            Self::Predicate(p) => (p.test)(actual),
        }
    }

    /// True when both matchers accept the same arguments.
    pub(crate) fn is_equivalent(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Any, Self::Any)
            | (Self::Null, Self::Null)
            | (Self::NotNull, Self::NotNull) => true,
            (Self::AnyOf(a), Self::AnyOf(b)) => a == b,
            (Self::Equals(a), Self::Equals(b)) | (Self::NotEquals(a), Self::NotEquals(b)) => a == b,
            (
                Self::Near {
                    expected: e1,
                    tolerance: t1,
                },
                Self::Near {
                    expected: e2,
                    tolerance: t2,
                },
            ) => e1.total_cmp(e2).is_eq() && t1.total_cmp(t2).is_eq(),
            (Self::Same(a), Self::Same(b)) => a == b,
            (Self::InstanceOf(a), Self::InstanceOf(b)) => a == b,
            (Self::Contains(a), Self::Contains(b))
            | (Self::StartsWith(a), Self::StartsWith(b))
            | (Self::EndsWith(a), Self::EndsWith(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            (Self::Predicate(a), Self::Predicate(b)) => a.same(b),
            (Self::Capture(a), Self::Capture(b)) => a.same(b),
            _ => false,
        }
    }
}

impl fmt::Display for ArgMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::AnyOf(ty) => write!(f, "any {ty}"),
            Self::Equals(v) => write!(f, "{v}"),
            Self::NotEquals(v) => write!(f, "not {v}"),
            Self::Near {
                expected,
                tolerance,
            } => write!(f, "{expected} ± {tolerance}"),
            Self::Null => f.write_str("null"),
            Self::NotNull => f.write_str("not null"),
            Self::Same(obj) => write!(f, "same {obj}"),
            Self::InstanceOf(name) => write!(f, "instance of {name}"),
            Self::Contains(s) => write!(f, "containing {s:?}"),
            Self::StartsWith(s) => write!(f, "starting with {s:?}"),
            Self::EndsWith(s) => write!(f, "ending with {s:?}"),
            Self::Regex(re) => write!(f, "matching /{}/", re.as_str()),
            Self::Predicate(p) => write!(f, "{}", p.label),
            Self::Capture(_) => f.write_str("captured"),
        }
    }
}

/// Deep equality where instance handles compare through `eq`.
pub(crate) fn values_equal(expected: &Value, actual: &Value, eq: &EquivalentInstances) -> bool {
    match (expected, actual) {
        (Value::Object(a), Value::Object(b)) => eq.is_equivalent(a, b),
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|((k1, v1), (k2, v2))| values_equal(k1, k2, eq) && values_equal(v1, v2, eq))
        }
        _ => match (expected.elements(), actual.elements()) {
            (Some(a), Some(b)) if std::mem::discriminant(expected) == std::mem::discriminant(actual) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y, eq))
            }
            _ => expected == actual,
        },
    }
}

/// Flattens a variadic trailing array so every element is a position.
fn flatten(method: &MethodSignature, args: &[Value]) -> Vec<Value> {
    if !method.is_varargs() {
        return args.to_vec();
    }
    let Some((last, regular)) = args.split_last() else {
        return Vec::new();
    };
    let mut flat = regular.to_vec();
    match last {
        Value::Array(items) => flat.extend(items.iter().cloned()),
        other => flat.push(other.clone()),
    }
    flat
}

/// Expected arguments of one expectation or verification.
///
/// Positions are flattened: variadic elements follow the regular
/// parameters. Without matchers every position compares by equality.
#[derive(Clone, Debug)]
pub(crate) struct ArgumentSpec {
    method: Arc<MethodSignature>,
    values: Vec<Value>,
    matchers: Option<Vec<ArgMatcher>>,
}

impl ArgumentSpec {
    /// Builds the spec for `args`, substituting `staged` matchers by position.
    pub(crate) fn new(
        method: &Arc<MethodSignature>,
        args: &[Value],
        staged: Vec<Option<ArgMatcher>>,
    ) -> Result<Self, MockError> {
        let values = flatten(method, args);
        let matchers = if staged.iter().all(Option::is_none) {
            None
        } else {
            if staged.len() > values.len() {
                return Err(MockError::illegal_argument(format!(
                    "{} matcher(s) staged for {} argument(s) of {method}",
                    staged.len(),
                    values.len()
                )));
            }
            if method.is_varargs() {
                let regular = method.params().len().saturating_sub(1);
                let vararg_slots = regular..values.len();
                let supplied = vararg_slots
                    .clone()
                    .filter(|i| staged.get(*i).is_some_and(Option::is_some))
                    .count();
                if supplied > 0 && supplied < vararg_slots.len() {
                    return Err(MockError::illegal_argument(format!(
                        "variadic arguments of {method} mix matchers and plain values"
                    )));
                }
            }
            let mut staged = staged.into_iter();
            let built = values
                .iter()
                .map(|v| {
                    staged
                        .next()
                        .flatten()
                        .unwrap_or_else(|| ArgMatcher::Equals(v.clone()))
                })
                .collect();
            Some(built)
        };
        Ok(Self {
            method: Arc::clone(method),
            values,
            matchers,
        })
    }

    /// Spec accepting exactly `args`.
    pub(crate) fn exact(method: &Arc<MethodSignature>, args: &[Value]) -> Self {
        Self {
            method: Arc::clone(method),
            values: flatten(method, args),
            matchers: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn has_matchers(&self) -> bool {
        self.matchers.is_some()
    }

    /// Position of the first argument `actual` fails on, if any.
    pub(crate) fn first_mismatch(&self, actual: &[Value], eq: &EquivalentInstances) -> Option<usize> {
        let actual = flatten(&self.method, actual);
        let shared = self.values.len().min(actual.len());
        let position = match &self.matchers {
            None => (0..shared).find(|&i| !values_equal(&self.values[i], &actual[i], eq)),
            Some(matchers) => (0..shared).find(|&i| !matchers[i].matches(&actual[i], eq)),
        };
        match position {
            Some(i) => Some(i),
            None if self.values.len() == actual.len() => None,
            None => Some(shared),
        }
    }

    /// Records `actual` into every capturing position.
    pub(crate) fn capture(&self, actual: &[Value]) {
        let Some(matchers) = &self.matchers else {
            return;
        };
        for (matcher, value) in matchers.iter().zip(flatten(&self.method, actual)) {
            if let ArgMatcher::Capture(sink) = matcher {
                sink.push(value);
            }
        }
    }

    /// True when a later recording with `other` arguments should replace
    /// an expectation recorded with these.
    pub(crate) fn is_replaced_by(&self, other: &Self, eq: &EquivalentInstances) -> bool {
        match (&self.matchers, &other.matchers) {
            (_, None) => self.first_mismatch_flat(&other.values, eq).is_none(),
            (Some(mine), Some(theirs)) => {
                mine.len() == theirs.len() && mine.iter().zip(theirs).all(|(a, b)| a.is_equivalent(b))
            }
            (None, Some(_)) => false,
        }
    }

    fn first_mismatch_flat(&self, flat: &[Value], eq: &EquivalentInstances) -> Option<usize> {
        if flat.len() != self.values.len() {
            return Some(flat.len().min(self.values.len()));
        }
        match &self.matchers {
            None => (0..flat.len()).find(|&i| !values_equal(&self.values[i], &flat[i], eq)),
            Some(m) => (0..flat.len()).find(|&i| !m[i].matches(&flat[i], eq)),
        }
    }

    /// Description of the expectation at `position`.
    pub(crate) fn describe_position(&self, position: usize) -> String {
        match &self.matchers {
            Some(m) => m.get(position).map_or_else(|| "no argument".to_owned(), ToString::to_string),
            None => self
                .values
                .get(position)
                .map_or_else(|| "no argument".to_owned(), ToString::to_string),
        }
    }

    /// Actual argument at flattened `position`, for diagnostics.
    pub(crate) fn describe_actual(&self, actual: &[Value], position: usize) -> String {
        flatten(&self.method, actual)
            .get(position)
            .map_or_else(|| "no argument".to_owned(), ToString::to_string)
    }
}

impl fmt::Display for ArgumentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        let count = self.values.len();
        for i in 0..count {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&self.describe_position(i))?;
        }
        f.write_str(")")
    }
}

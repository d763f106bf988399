// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Declared mocks, runtime instances, and cascaded mocks.

use std::collections::{HashMap, HashSet};

use crate::error::MockError;
use crate::expectation::ExpectationId;
use crate::signature::BUILTIN_TYPE_NAMES;
use crate::value::{InstanceId, ObjectRef, TypeName};

/// A type to declare as mocked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockedType {
    name: TypeName,
    loose: bool,
}

impl MockedType {
    /// A strict-by-default mocked type.
    pub fn new(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            loose: false,
        }
    }

    /// Marks the type for loose matching: expectations recorded on it are
    /// non-strict even inside strict blocks.
    #[must_use]
    pub fn loose(mut self) -> Self {
        self.loose = true;
        self
    }

    /// Type name.
    pub fn name(&self) -> &TypeName {
        &self.name
    }

    /// True for loose types.
    pub fn is_loose(&self) -> bool {
        self.loose
    }
}

impl From<&str> for MockedType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Key of a cascade produced outside any expectation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct MethodKey {
    class: TypeName,
    method: String,
    returns: TypeName,
}

#[derive(Debug, Default)]
pub(crate) struct MockRegistry {
    next_id: u64,
    declared: Vec<ObjectRef>,
    cascaded: HashSet<InstanceId>,
    by_expectation: HashMap<(ExpectationId, TypeName), ObjectRef>,
    by_method: HashMap<MethodKey, ObjectRef>,
}

impl MockRegistry {
    pub(crate) fn declare(&mut self, ty: &MockedType) -> Result<ObjectRef, MockError> {
        let name = ty.name().as_str();
        if name.trim().is_empty() {
            return Err(MockError::illegal_argument("mocked type needs a name"));
        }
        if BUILTIN_TYPE_NAMES.contains(&name) {
            return Err(MockError::illegal_argument(format!("{name} is a builtin type and cannot be mocked")));
        }
        let instance = self.new_instance(ty.name().clone());
        self.declared.push(instance.clone());
        Ok(instance)
    }

    /// Mints a fresh, undeclared instance.
    pub(crate) fn new_instance(&mut self, type_name: TypeName) -> ObjectRef {
        self.next_id += 1;
        ObjectRef::new(InstanceId(self.next_id), type_name)
    }

    /// Two or more declared instances of one type are told apart by identity.
    pub(crate) fn matches_on_instance(&self, type_name: &TypeName) -> bool {
        self.declared
            .iter()
            .filter(|obj| obj.type_name() == type_name)
            .nth(1)
            .is_some()
    }

    pub(crate) fn is_cascaded(&self, instance: &ObjectRef) -> bool {
        self.cascaded.contains(&instance.id())
    }

    fn cascade_instance(&mut self, type_name: &TypeName) -> ObjectRef {
        if let Some(declared) = self.declared.iter().find(|obj| obj.type_name() == type_name) {
            return declared.clone();
        }
        let instance = self.new_instance(type_name.clone());
        self.cascaded.insert(instance.id());
        instance
    }

    /// Cascaded mock for an expectation, created once per returned type.
    pub(crate) fn cascade_for_expectation(&mut self, id: ExpectationId, type_name: &TypeName) -> ObjectRef {
        let key = (id, type_name.clone());
        if let Some(existing) = self.by_expectation.get(&key) {
            return existing.clone();
        }
        let instance = self.cascade_instance(type_name);
        tracing::trace!(cascade = %instance, expectation = id.0, "created cascaded mock");
        self.by_expectation.insert(key, instance.clone());
        instance
    }

    /// Cascaded mock for a call answered outside matching, memoized per method.
    pub(crate) fn cascade_for_method(&mut self, class: &TypeName, method: &str, type_name: &TypeName) -> ObjectRef {
        let key = MethodKey {
            class: class.clone(),
            method: method.to_owned(),
            returns: type_name.clone(),
        };
        if let Some(existing) = self.by_method.get(&key) {
            return existing.clone();
        }
        let instance = self.cascade_instance(type_name);
        self.by_method.insert(key, instance.clone());
        instance
    }

    /// Carries cascaded mocks over to an expectation replacing `from`.
    pub(crate) fn inherit_cascades(&mut self, from: ExpectationId, to: ExpectationId) {
        let inherited: Vec<_> = self
            .by_expectation
            .iter()
            .filter(|((id, _), _)| *id == from)
            .map(|((_, ty), obj)| ((to, ty.clone()), obj.clone()))
            .collect();
        self.by_expectation.extend(inherited);
    }

    /// Forgets everything except the id counter, so handles from a previous
    /// test never alias new ones.
    pub(crate) fn clear(&mut self) {
        *self = Self {
            next_id: self.next_id,
            ..Self::default()
        };
    }
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Instance equivalence: runtime instances standing in for recorded mocks.
//!
//! When replay matches a constructor invocation on a fresh instance against
//! a constructor recorded on a mock, the fresh instance becomes equivalent
//! to the mock for the rest of the test. Entries are never overwritten.

use std::collections::HashMap;

use crate::value::{InstanceId, ObjectRef};

#[derive(Debug, Default)]
pub(crate) struct EquivalentInstances {
    replacements: HashMap<InstanceId, InstanceId>,
}

impl EquivalentInstances {
    /// Maps `new_instance` onto `mock`. Returns false when either side is
    /// already mapped (the first mapping wins) or both are the same.
    pub(crate) fn register(&mut self, new_instance: &ObjectRef, mock: &ObjectRef) -> bool {
        let (new_id, mock_id) = (new_instance.id(), mock.id());
        if new_id == mock_id || self.replacements.contains_key(&new_id) {
            return false;
        }
        self.replacements.insert(new_id, mock_id);
        true
    }

    /// The mock `instance` stands in for, or the instance itself.
    pub(crate) fn resolve(&self, instance: InstanceId) -> InstanceId {
        self.replacements.get(&instance).copied().unwrap_or(instance)
    }

    /// True when both handles name the same instance, directly or
    /// through a mapping.
    pub(crate) fn is_equivalent(&self, a: &ObjectRef, b: &ObjectRef) -> bool {
        self.resolve(a.id()) == self.resolve(b.id())
    }

    /// True when `instance` takes part in any mapping.
    pub(crate) fn is_mapped(&self, instance: &ObjectRef) -> bool {
        let id = instance.id();
        self.replacements.contains_key(&id) || self.replacements.values().any(|m| *m == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.replacements.len()
    }

    pub(crate) fn clear(&mut self) {
        self.replacements.clear();
    }
}

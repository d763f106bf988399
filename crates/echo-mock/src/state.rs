// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! State shared by every phase of one test execution.
//!
//! Expectations live in an arena indexed by [`ExpectationId`]; the strict
//! and non-strict lists hold ids in recording order. The replay log is
//! append-only, and verification refers to its entries by index.

use std::collections::HashSet;

use crate::equivalence::EquivalentInstances;
use crate::expectation::{Expectation, ExpectationId, ExpectedInvocation, Origin};
use crate::invocation::Invocation;
use crate::matcher::ArgumentSpec;
use crate::value::{ObjectRef, TypeName, Value};

/// A mock that participates in strict matching.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum StrictTarget {
    /// Every instance of the type (and its static methods).
    Type(TypeName),
    /// One specific instance.
    Instance(ObjectRef),
}

/// One replayed invocation.
#[derive(Clone, Debug)]
pub(crate) struct ReplayedInvocation {
    pub(crate) expectation: ExpectationId,
    pub(crate) instance: Option<ObjectRef>,
    pub(crate) args: Vec<Value>,
}

/// A replayed invocation that a verification block matched.
#[derive(Clone, Debug)]
pub(crate) struct VerifiedInvocation {
    pub(crate) replay_index: usize,
    pub(crate) block: u32,
}

#[derive(Debug, Default)]
pub(crate) struct PhasedExecutionState {
    expectations: Vec<Expectation>,
    pub(crate) strict: Vec<ExpectationId>,
    non_strict: Vec<ExpectationId>,
    strict_targets: Vec<StrictTarget>,
    pub(crate) replay_log: Vec<ReplayedInvocation>,
    pub(crate) verified: Vec<VerifiedInvocation>,
    pub(crate) equivalence: EquivalentInstances,
    instance_matched: HashSet<TypeName>,
    loose: HashSet<TypeName>,
}

impl PhasedExecutionState {
    /// Instances of `type_name` are told apart from now on.
    pub(crate) fn match_on_instance(&mut self, type_name: TypeName) {
        self.instance_matched.insert(type_name);
    }

    pub(crate) fn is_matched_on_instance(&self, type_name: &TypeName) -> bool {
        self.instance_matched.contains(type_name)
    }

    pub(crate) fn mark_loose(&mut self, type_name: TypeName) {
        self.loose.insert(type_name);
    }

    pub(crate) fn is_loose(&self, type_name: &TypeName) -> bool {
        self.loose.contains(type_name)
    }

    pub(crate) fn get(&self, id: ExpectationId) -> &Expectation {
        &self.expectations[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: ExpectationId) -> &mut Expectation {
        &mut self.expectations[id.0]
    }

    pub(crate) fn expectations(&self) -> impl Iterator<Item = &Expectation> {
        self.expectations.iter()
    }

    pub(crate) fn next_id(&self) -> ExpectationId {
        ExpectationId(self.expectations.len())
    }

    /// Stores a new expectation. A non-strict one supersedes an earlier
    /// equivalent non-strict recording, whose id is returned.
    pub(crate) fn add_expectation(
        &mut self,
        expectation: Expectation,
    ) -> (ExpectationId, Option<ExpectationId>) {
        let id = expectation.id;
        let mut superseded = None;
        if expectation.is_strict() {
            self.strict.push(id);
        } else {
            if expectation.is_recorded() {
                superseded = self.find_replaced(&expectation.invocation);
                if let Some(old) = superseded {
                    self.non_strict.retain(|other| *other != old);
                    self.get_mut(old).superseded = true;
                }
            }
            self.non_strict.push(id);
        }
        self.expectations.push(expectation);
        (id, superseded)
    }

    fn find_replaced(&self, new: &ExpectedInvocation) -> Option<ExpectationId> {
        self.non_strict.iter().copied().find(|&id| {
            let previous = self.get(id);
            previous.is_recorded()
                && previous.invocation.same_signature(&new.class, &new.method)
                && self.same_receiver(&previous.invocation, new)
                && previous.invocation.args.is_replaced_by(&new.args, &self.equivalence)
        })
    }

    fn same_receiver(&self, previous: &ExpectedInvocation, new: &ExpectedInvocation) -> bool {
        match (&previous.instance, &new.instance) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                let per_instance = previous.match_instance || new.match_instance || self.is_matched_on_instance(&new.class);
                !per_instance || new.is_constructor() || self.equivalence.is_equivalent(a, b)
            }
            _ => false,
        }
    }

    pub(crate) fn add_strict_target(&mut self, target: StrictTarget) {
        if !self.strict_targets.contains(&target) {
            self.strict_targets.push(target);
        }
    }

    /// True when invocations on this receiver go through strict matching.
    pub(crate) fn is_strict_target(&self, invocation: &Invocation) -> bool {
        self.strict_targets.iter().any(|target| match target {
            StrictTarget::Type(name) => *name == invocation.class,
            StrictTarget::Instance(obj) => invocation
                .instance
                .as_ref()
                .is_some_and(|inv| self.equivalence.is_equivalent(obj, inv)),
        })
    }

    /// Whether `expectation` accepts `invoked` as its receiver.
    pub(crate) fn receiver_matches(
        &self,
        expectation: &Expectation,
        invoked: Option<&ObjectRef>,
    ) -> bool {
        let recorded = expectation.invocation.instance.as_ref();
        match (recorded, invoked) {
            (None, None) => true,
            (Some(recorded), Some(invoked)) => {
                if expectation.invocation.is_constructor() || self.equivalence.is_equivalent(recorded, invoked) {
                    return true;
                }
                if !expectation.is_recorded()
                    || expectation.invocation.match_instance
                    || self.is_matched_on_instance(&expectation.invocation.class)
                {
                    return false;
                }
                // A mock that a captured instance stands in for accepts only that instance.
                !self.equivalence.is_mapped(recorded)
            }
            _ => false,
        }
    }

    /// Signature and receiver match, arguments not yet considered.
    pub(crate) fn signature_matches(&self, expectation: &Expectation, invocation: &Invocation) -> bool {
        expectation
            .invocation
            .same_signature(&invocation.class, &invocation.method)
            && self.receiver_matches(expectation, invocation.instance.as_ref())
    }

    /// Full match against a recorded or replayed expectation.
    pub(crate) fn fully_matches(&self, expectation: &Expectation, invocation: &Invocation) -> bool {
        self.signature_matches(expectation, invocation)
            && expectation
                .invocation
                .args
                .first_mismatch(&invocation.args, &self.equivalence)
                .is_none()
    }

    /// Non-strict lookup: the first recorded match, else a dynamic one.
    pub(crate) fn find_non_strict(&self, invocation: &Invocation) -> Option<ExpectationId> {
        let mut dynamic = None;
        for &id in &self.non_strict {
            let expectation = self.get(id);
            if dynamic.is_some() && !expectation.is_recorded() {
                continue;
            }
            if self.fully_matches(expectation, invocation) {
                if expectation.is_recorded() {
                    return Some(id);
                }
                dynamic = Some(id);
            }
        }
        dynamic
    }

    /// Replay log entries that hit `id`'s signature with other arguments.
    pub(crate) fn non_matching_calls(&self, id: ExpectationId) -> Vec<String> {
        let wanted = &self.get(id).invocation;
        self.replay_log
            .iter()
            .filter(|entry| entry.expectation != id)
            .filter(|entry| {
                let hit = &self.get(entry.expectation).invocation;
                hit.same_signature(&wanted.class, &wanted.method)
            })
            .map(|entry| describe_replay(&self.get(entry.expectation).invocation, entry))
            .collect()
    }

    pub(crate) fn log_replay(&mut self, expectation: ExpectationId, invocation: &Invocation) -> usize {
        self.replay_log.push(ReplayedInvocation {
            expectation,
            instance: invocation.instance.clone(),
            args: invocation.args.clone(),
        });
        self.replay_log.len() - 1
    }

    /// Creates the dynamic expectation for an unrecorded non-strict call.
    pub(crate) fn add_replayed(&mut self, invocation: &Invocation) -> ExpectationId {
        let id = self.next_id();
        let expected = ExpectedInvocation {
            instance: invocation.instance.clone(),
            match_instance: false,
            class: invocation.class.clone(),
            method: invocation.method.clone(),
            return_type: invocation.return_type().clone(),
            args: ArgumentSpec::exact(&invocation.method, &invocation.args),
        };
        self.add_expectation(Expectation::new(id, Origin::Replayed, expected)).0
    }

    /// True when replay entry `index` was matched by a verification block
    /// numbered below `block`.
    pub(crate) fn verified_before(&self, index: usize, block: u32) -> bool {
        self.verified
            .iter()
            .any(|v| v.replay_index == index && v.block < block)
    }

    pub(crate) fn is_verified(&self, index: usize) -> bool {
        self.verified.iter().any(|v| v.replay_index == index)
    }

    pub(crate) fn mark_verified(&mut self, replay_index: usize, block: u32) {
        self.verified.push(VerifiedInvocation { replay_index, block });
    }
}

/// `Type#method(..) -> R on X with (args)` for one replayed call.
pub(crate) fn describe_replay(expected: &ExpectedInvocation, entry: &ReplayedInvocation) -> String {
    let mut out = expected.describe_method();
    if let Some(instance) = &entry.instance {
        out.push_str(&format!(" on {instance}"));
    }
    out.push_str(" with (");
    for (i, arg) in entry.args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&arg.to_string());
    }
    out.push(')');
    out
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::matcher::ArgMatcher;
    use crate::signature::MethodSignature;
    use crate::value::InstanceId;

    fn expected(instance: &ObjectRef, sig: &str, args: &[Value], staged: Vec<Option<ArgMatcher>>) -> ExpectedInvocation {
        let method = Arc::new(MethodSignature::parse(sig).unwrap());
        ExpectedInvocation {
            instance: Some(instance.clone()),
            match_instance: false,
            class: instance.type_name().clone(),
            return_type: method.returns().clone(),
            args: ArgumentSpec::new(&method, args, staged).unwrap(),
            method,
        }
    }

    fn invocation(instance: &ObjectRef, sig: &str, args: Vec<Value>) -> Invocation {
        let method = Arc::new(MethodSignature::parse(sig).unwrap());
        Invocation::new(Some(instance.clone()), instance.type_name().clone(), method, args)
    }

    #[test]
    fn later_equivalent_non_strict_recording_wins() {
        let db = ObjectRef::new(InstanceId(1), "Database");
        let mut state = PhasedExecutionState::default();
        let first = Expectation::new(
            state.next_id(),
            Origin::NonStrict,
            expected(&db, "find(str) -> i32", &[Value::Null], vec![Some(ArgMatcher::Any)]),
        );
        let (old, _) = state.add_expectation(first);
        let second = Expectation::new(
            state.next_id(),
            Origin::NonStrict,
            expected(&db, "find(str) -> i32", &[Value::Null], vec![Some(ArgMatcher::Any)]),
        );
        let (new, replaced) = state.add_expectation(second);
        assert_eq!(replaced, Some(old));
        assert!(state.get(old).superseded);
        let call = invocation(&db, "find(str) -> i32", vec![Value::str("k")]);
        assert_eq!(state.find_non_strict(&call), Some(new));
    }

    #[test]
    fn recorded_expectations_win_over_dynamic_ones() {
        let db = ObjectRef::new(InstanceId(1), "Database");
        let mut state = PhasedExecutionState::default();
        let call = invocation(&db, "ping() -> bool", vec![]);
        let dynamic = state.add_replayed(&call);
        let recorded = Expectation::new(
            state.next_id(),
            Origin::NonStrict,
            expected(&db, "ping() -> bool", &[], vec![]),
        );
        let (recorded, _) = state.add_expectation(recorded);
        assert_ne!(dynamic, recorded);
        assert_eq!(state.find_non_strict(&call), Some(recorded));
    }

    #[test]
    fn dynamic_expectations_match_only_their_own_instance() {
        let a = ObjectRef::new(InstanceId(1), "Database");
        let b = ObjectRef::new(InstanceId(2), "Database");
        let mut state = PhasedExecutionState::default();
        state.add_replayed(&invocation(&a, "ping() -> bool", vec![]));
        assert!(state
            .find_non_strict(&invocation(&b, "ping() -> bool", vec![]))
            .is_none());
    }

    #[test]
    fn constructor_expectation_accepts_any_receiver() {
        let recorded = ObjectRef::new(InstanceId(1), "Database");
        let fresh = ObjectRef::new(InstanceId(9), "Database");
        let mut state = PhasedExecutionState::default();
        let ctor = Expectation::new(
            state.next_id(),
            Origin::NonStrict,
            expected(&recorded, "<init>(str)", &[Value::str("url")], vec![]),
        );
        let (id, _) = state.add_expectation(ctor);
        let call = invocation(&fresh, "<init>(str)", vec![Value::str("url")]);
        assert_eq!(state.find_non_strict(&call), Some(id));
    }
}

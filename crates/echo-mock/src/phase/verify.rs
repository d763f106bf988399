// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Machinery shared by the verification phases.

use super::{ArgumentStaging, PhaseContext, Production};
use crate::error::{MockError, UnexpectedReason};
use crate::expectation::ExpectedInvocation;
use crate::invocation::Invocation;
use crate::state::{describe_replay, PhasedExecutionState, ReplayedInvocation};

/// How a verification relates to one replayed invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Match {
    Full,
    /// Same method and receiver, different arguments.
    SignatureOnly,
    None,
}

/// The verification most recently handled in a block.
#[derive(Debug)]
pub(crate) struct CurrentVerification {
    pub(crate) expected: ExpectedInvocation,
    /// Replay indices matched so far.
    pub(crate) matched: Vec<usize>,
}

#[derive(Debug)]
pub(crate) struct VerificationCore {
    pub(crate) staging: ArgumentStaging,
    pub(crate) block: u32,
    pub(crate) pending: Option<MockError>,
    pub(crate) current: Option<CurrentVerification>,
}

impl VerificationCore {
    pub(crate) fn new(block: u32) -> Self {
        Self {
            staging: ArgumentStaging::default(),
            block,
            pending: None,
            current: None,
        }
    }

    /// Surfaces the previous verification's failure, else builds the
    /// expected form of `invocation`.
    pub(crate) fn begin(
        &mut self,
        state: &PhasedExecutionState,
        invocation: &Invocation,
    ) -> Result<ExpectedInvocation, MockError> {
        if let Some(err) = self.pending.take() {
            self.staging.discard();
            return Err(err);
        }
        self.staging.take_expected(state, invocation)
    }

    pub(crate) fn current(&self) -> Result<&CurrentVerification, MockError> {
        self.current
            .as_ref()
            .ok_or_else(|| MockError::illegal_state("no invocation has been verified in this block yet"))
    }

    /// Records the match and feeds capturing matchers.
    pub(crate) fn accept(&self, state: &mut PhasedExecutionState, expected: &ExpectedInvocation, index: usize) {
        expected.args.capture(&state.replay_log[index].args);
        state.mark_verified(index, self.block);
    }

    /// The value a verified call returns: the cascade of the last matched
    /// expectation when there is one, else the zero value.
    pub(crate) fn reply(ctx: &PhaseContext<'_>, expected: &ExpectedInvocation, matched: &[usize]) -> Production {
        let value = match (matched.last(), expected.return_type.object_name()) {
            (Some(&index), Some(_)) => {
                let id = ctx.state.replay_log[index].expectation;
                ctx.default_value(id, &expected.return_type)
            }
            _ => expected.return_type.zero_value(),
        };
        Production::Value(value)
    }

    /// Closes the block, surfacing the last pending failure.
    pub(crate) fn end(&mut self) -> Result<(), MockError> {
        if self.staging.discard() {
            return Err(MockError::illegal_state(
                "argument matchers were staged without a following invocation",
            ));
        }
        self.pending.take().map_or(Ok(()), Err)
    }
}

pub(crate) fn classify(state: &PhasedExecutionState, expected: &ExpectedInvocation, entry: &ReplayedInvocation) -> Match {
    let replayed = &state.get(entry.expectation).invocation;
    if !replayed.same_signature(&expected.class, &expected.method) {
        return Match::None;
    }
    let receiver = match (&expected.instance, &entry.instance) {
        (None, None) => true,
        (Some(wanted), Some(actual)) => {
            expected.is_constructor()
                || !(expected.match_instance || state.is_matched_on_instance(&expected.class))
                || state.equivalence.is_equivalent(wanted, actual)
        }
        _ => false,
    };
    if !receiver {
        return Match::None;
    }
    if expected.args.first_mismatch(&entry.args, &state.equivalence).is_none() {
        Match::Full
    } else {
        Match::SignatureOnly
    }
}

/// Replayed calls from `from` on that hit the method with other arguments.
pub(crate) fn non_matching(state: &PhasedExecutionState, expected: &ExpectedInvocation, from: usize) -> Vec<String> {
    state
        .replay_log
        .iter()
        .skip(from)
        .filter(|entry| classify(state, expected, entry) == Match::SignatureOnly)
        .map(|entry| describe_replay(&state.get(entry.expectation).invocation, entry))
        .collect()
}

/// Checks `count` matches against `[min, max]`.
pub(crate) fn check_count(
    state: &PhasedExecutionState,
    expected: &ExpectedInvocation,
    count: usize,
    min: u32,
    max: Option<u32>,
) -> Result<(), MockError> {
    let count = u32::try_from(count).unwrap_or(u32::MAX);
    if count < min {
        return Err(MockError::MissingInvocation {
            expected: expected.to_string(),
            missing: min - count,
            non_matching: non_matching(state, expected, 0),
        });
    }
    if let Some(max) = max.filter(|max| count > *max) {
        return Err(MockError::unexpected(expected, UnexpectedReason::TooMany { max }));
    }
    Ok(())
}

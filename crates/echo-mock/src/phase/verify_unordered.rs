// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Unordered verification: each verified invocation counts every matching
//! replayed call, wherever it happened.

use tracing::trace;

use super::verify::{check_count, classify, CurrentVerification, Match, VerificationCore};
use super::{PhaseContext, PhaseHandler, PhaseKind, Production};
use crate::error::MockError;
use crate::invocation::Invocation;
use crate::state::PhasedExecutionState;

#[derive(Debug)]
pub(crate) struct UnorderedVerificationPhase {
    pub(crate) core: VerificationCore,
}

impl UnorderedVerificationPhase {
    pub(crate) fn new(block: u32) -> Self {
        Self {
            core: VerificationCore::new(block),
        }
    }

    /// Re-checks the current verification against explicit limits.
    pub(crate) fn apply_limits(
        &mut self,
        state: &PhasedExecutionState,
        min: u32,
        max: Option<u32>,
    ) -> Result<(), MockError> {
        self.core.pending = None;
        let current = self.core.current()?;
        check_count(state, &current.expected, current.matched.len(), min, max)
    }

    pub(crate) fn end(&mut self) -> Result<(), MockError> {
        self.core.end()
    }
}

impl PhaseHandler for UnorderedVerificationPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::VerifyUnordered
    }

    fn handle_invocation(
        &mut self,
        ctx: &mut PhaseContext<'_>,
        invocation: &Invocation,
    ) -> Result<Production, MockError> {
        let expected = self.core.begin(ctx.state, invocation)?;
        let state = &*ctx.state;
        let matched: Vec<usize> = state
            .replay_log
            .iter()
            .enumerate()
            .filter(|(_, entry)| classify(state, &expected, entry) == Match::Full)
            .map(|(index, _)| index)
            .collect();
        for &index in &matched {
            self.core.accept(ctx.state, &expected, index);
        }
        let iterations = self.core.staging.iterations();
        let (min, max) = if iterations > 1 {
            (iterations, Some(iterations))
        } else {
            (1, None)
        };
        self.core.pending = check_count(ctx.state, &expected, matched.len(), min, max).err();
        trace!(%invocation, matched = matched.len(), "verified unordered");
        let reply = VerificationCore::reply(ctx, &expected, &matched);
        self.core.current = Some(CurrentVerification { expected, matched });
        Ok(reply)
    }
}

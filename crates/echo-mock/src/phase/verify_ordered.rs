// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ordered verification: verified invocations must appear in replay order.
//!
//! A cursor over the replay log advances past each match. Entries matched
//! by an earlier verification block are invisible here.

use tracing::trace;

use super::verify::{classify, non_matching, CurrentVerification, Match, VerificationCore};
use super::{PhaseContext, PhaseHandler, PhaseKind, Production};
use crate::error::{MockError, UnexpectedReason};
use crate::invocation::Invocation;
use crate::state::PhasedExecutionState;

#[derive(Debug)]
pub(crate) struct OrderedVerificationPhase {
    pub(crate) core: VerificationCore,
    cursor: usize,
}

impl OrderedVerificationPhase {
    pub(crate) fn new(block: u32) -> Self {
        Self {
            core: VerificationCore::new(block),
            cursor: 0,
        }
    }

    fn visible(&self, state: &PhasedExecutionState, index: usize) -> bool {
        !state.verified_before(index, self.core.block)
    }

    /// Consumes further consecutive matches of the current verification
    /// from the cursor, then checks the total against `[min, max]`.
    pub(crate) fn apply_limits(
        &mut self,
        state: &mut PhasedExecutionState,
        min: u32,
        max: Option<u32>,
    ) -> Result<(), MockError> {
        self.core.pending = None;
        let current = self.core.current()?;
        let expected = current.expected.clone();
        if current.matched.is_empty() {
            if min == 0 {
                return Ok(());
            }
            return Err(MockError::MissingInvocation {
                expected: expected.to_string(),
                missing: min,
                non_matching: non_matching(state, &expected, self.cursor),
            });
        }
        let mut count: u32 = 1;
        let mut index = self.cursor;
        while index < state.replay_log.len() {
            if !self.visible(state, index) {
                index += 1;
                continue;
            }
            if classify(state, &expected, &state.replay_log[index]) == Match::Full {
                count += 1;
                if max.is_some_and(|max| count > max) {
                    return Err(MockError::unexpected(
                        &expected,
                        UnexpectedReason::TooMany {
                            max: max.unwrap_or_default(),
                        },
                    ));
                }
                self.core.accept(state, &expected, index);
                if let Some(current) = self.core.current.as_mut() {
                    current.matched.push(index);
                }
                self.cursor = index + 1;
            } else if count >= min {
                break;
            }
            index += 1;
        }
        if count < min {
            return Err(MockError::MissingInvocation {
                expected: expected.to_string(),
                missing: min - count,
                non_matching: Vec::new(),
            });
        }
        Ok(())
    }

    pub(crate) fn end(&mut self) -> Result<(), MockError> {
        self.core.end()
    }
}

impl PhaseHandler for OrderedVerificationPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::VerifyOrdered
    }

    fn handle_invocation(
        &mut self,
        ctx: &mut PhaseContext<'_>,
        invocation: &Invocation,
    ) -> Result<Production, MockError> {
        let expected = self.core.begin(ctx.state, invocation)?;
        let found = (self.cursor..ctx.state.replay_log.len()).find(|&index| {
            self.visible(ctx.state, index)
                && classify(ctx.state, &expected, &ctx.state.replay_log[index]) == Match::Full
        });
        let matched = match found {
            Some(index) => {
                self.core.accept(ctx.state, &expected, index);
                self.cursor = index + 1;
                vec![index]
            }
            None => {
                let out_of_order = (0..self.cursor).any(|index| {
                    !ctx.state.is_verified(index)
                        && classify(ctx.state, &expected, &ctx.state.replay_log[index]) == Match::Full
                });
                let previous = self.core.current.as_ref().map(|c| c.expected.to_string());
                let err = if let (true, Some(required)) = (out_of_order, previous) {
                    MockError::unexpected(invocation, UnexpectedReason::OutOfOrder { required })
                } else {
                    MockError::MissingInvocation {
                        expected: expected.to_string(),
                        missing: 1,
                        non_matching: non_matching(ctx.state, &expected, self.cursor),
                    }
                };
                self.core.pending = Some(err);
                Vec::new()
            }
        };
        trace!(%invocation, cursor = self.cursor, found = !matched.is_empty(), "verified in order");
        let reply = VerificationCore::reply(ctx, &expected, &matched);
        self.core.current = Some(CurrentVerification { expected, matched });
        let iterations = self.core.staging.iterations();
        if iterations > 1 && self.core.pending.is_none() {
            self.core.pending = self.apply_limits(ctx.state, iterations, Some(iterations)).err();
        }
        Ok(reply)
    }
}

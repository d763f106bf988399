// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The per-test execution: one entry point for intercepted calls plus the
//! record and verification blocks the test drives.
//!
//! Lock order is handling lock, then state, then mocks. Argument matchers run
//! with the handling lock held, whether they match an intercepted call or a
//! block's count check, so a matcher that calls a mocked method takes the
//! default-value path. Delegates run after every lock is released.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, instrument, trace, warn};

use crate::config::{EngineConfig, Strictness};
use crate::conversion::convert_delegated;
use crate::error::{MockError, Raised, Thrown};
use crate::invocation::{ExecutionMode, Invocation, Reply};
use crate::lock::{BlockOwner, ThreadLock};
use crate::matcher::ArgMatcher;
use crate::phase::{
    ArgumentStaging, PhaseContext, PhaseHandler, PhaseKind, Production, RecordPhase, ReplayPhase,
    VerificationPhase, VerifyMode,
};
use crate::registry::{MockRegistry, MockedType};
use crate::results::{Delegate, DelegateCall};
use crate::state::PhasedExecutionState;
use crate::value::{ObjectRef, TypeName, Value};

/// Failures deferred until the test thread reaches a safe boundary.
#[derive(Debug, Default)]
struct Failures {
    test_thread: Option<MockError>,
    other_thread: Option<MockError>,
}

impl Failures {
    /// Keeps the first failure per origin.
    fn store(&mut self, err: MockError, on_test_thread: bool) {
        let slot = if on_test_thread {
            &mut self.test_thread
        } else {
            &mut self.other_thread
        };
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

#[derive(Debug, Default)]
struct ExecutionState {
    phased: PhasedExecutionState,
    record: Option<RecordPhase>,
    replay: Option<ReplayPhase>,
    verification: Option<VerificationPhase>,
    failures: Failures,
    /// Number of blocks opened so far; block ids start at 1.
    blocks: u32,
    open_block: Option<u32>,
    finished: bool,
}

impl ExecutionState {
    fn phase(&self) -> Option<PhaseKind> {
        if self.finished {
            return None;
        }
        if let Some(verification) = &self.verification {
            return Some(verification.kind());
        }
        if self.record.is_some() {
            return Some(PhaseKind::Record);
        }
        self.replay.as_ref().map(|_| PhaseKind::Replay)
    }

    fn open_block(&mut self) -> u32 {
        self.blocks += 1;
        self.open_block = Some(self.blocks);
        self.blocks
    }

    fn dispatch(
        &mut self,
        mocks: &Mutex<MockRegistry>,
        config: &EngineConfig,
        invocation: &Invocation,
    ) -> (PhaseKind, Result<Production, MockError>) {
        let Self {
            phased,
            record,
            replay,
            verification,
            ..
        } = self;
        let handler: &mut dyn PhaseHandler = if let Some(verification) = verification.as_mut() {
            verification
        } else if let Some(record) = record.as_mut() {
            record
        } else {
            replay.get_or_insert_with(|| {
                debug!("first invocation outside a block starts replay");
                ReplayPhase::new()
            })
        };
        let kind = handler.kind();
        let mut ctx = PhaseContext {
            state: phased,
            mocks,
            config,
        };
        (kind, handler.handle_invocation(&mut ctx, invocation))
    }
}

/// Coordinates recording, replay and verification for one test.
///
/// Interception layers hand every call on a mocked type to
/// [`Execution::record_or_replay`]; the test opens blocks with
/// [`Execution::record`] and [`Execution::verify`] and finishes with
/// [`Execution::end`].
#[derive(Debug)]
pub struct Execution {
    config: EngineConfig,
    test_thread: Mutex<ThreadId>,
    handling: ThreadLock,
    block_owner: BlockOwner,
    state: Mutex<ExecutionState>,
    mocks: Mutex<MockRegistry>,
}

impl Default for Execution {
    fn default() -> Self {
        Self::with_config(EngineConfig::default())
    }
}

impl Execution {
    /// Creates an execution with the default configuration. The calling
    /// thread becomes the test thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an execution with `config`.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            test_thread: Mutex::new(thread::current().id()),
            handling: ThreadLock::new(),
            block_owner: BlockOwner::default(),
            state: Mutex::new(ExecutionState::default()),
            mocks: Mutex::new(MockRegistry::default()),
        }
    }

    /// The configuration this execution runs with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Declares a mocked type and returns a new mock instance of it.
    ///
    /// # Errors
    /// `IllegalArgument` for builtin or empty type names.
    pub fn declare(&self, ty: impl Into<MockedType>) -> Result<ObjectRef, MockError> {
        let ty = ty.into();
        let mut state = self.state.lock();
        let mut mocks = self.mocks.lock();
        let instance = mocks.declare(&ty)?;
        if mocks.matches_on_instance(ty.name()) {
            state.phased.match_on_instance(ty.name().clone());
        }
        if ty.is_loose() {
            state.phased.mark_loose(ty.name().clone());
        }
        debug!(%instance, loose = ty.is_loose(), "declared mock");
        Ok(instance)
    }

    /// Allocates an instance that is not a mock, such as an object created
    /// by code under test.
    pub fn new_instance(&self, type_name: impl Into<TypeName>) -> ObjectRef {
        self.mocks.lock().new_instance(type_name.into())
    }

    /// Makes `instance` stand in for `mock` when matching receivers. The
    /// first mapping of an instance wins.
    pub fn register_equivalent(&self, instance: &ObjectRef, mock: &ObjectRef) -> bool {
        self.state.lock().phased.equivalence.register(instance, mock)
    }

    /// True when `instance` was synthesized as a cascaded return value.
    pub fn is_cascaded(&self, instance: &ObjectRef) -> bool {
        self.mocks.lock().is_cascaded(instance)
    }

    /// The phase currently handling invocations; `None` before the first
    /// block or invocation and after [`Execution::end`].
    pub fn phase(&self) -> Option<PhaseKind> {
        self.state.lock().phase()
    }

    /// True when a failure is waiting to be surfaced.
    pub fn has_pending_error(&self) -> bool {
        let state = self.state.lock();
        state.failures.test_thread.is_some() || state.failures.other_thread.is_some()
    }

    fn is_test_thread(&self) -> bool {
        *self.test_thread.lock() == thread::current().id()
    }

    fn store_pending(&self, err: MockError) {
        let on_test_thread = self.is_test_thread();
        debug!(%err, on_test_thread, "failure kept as pending");
        self.state.lock().failures.store(err, on_test_thread);
    }

    /// Handles one intercepted call.
    ///
    /// # Errors
    /// `Raised::Thrown` carries a recorded or delegated exception for the
    /// caller to throw. `Raised::Failure` carries engine failures raised in
    /// record and verification phases or by a malformed invocation; replay
    /// failures are kept as pending and the call gets a zero value.
    pub fn record_or_replay(&self, invocation: &Invocation) -> Result<Reply, Raised> {
        invocation.validate()?;
        if self.handling.is_held_by_current_thread() {
            trace!(%invocation, "nested invocation takes the default path");
            return Ok(self.default_reply(invocation));
        }
        if self.block_owner.is_owned_by_other_thread() {
            warn!(%invocation, "invocation during another thread's open block takes the default path");
            return Ok(self.default_reply(invocation));
        }
        let production = {
            let _handling = self.handling.lock();
            let mut state = self.state.lock();
            if state.finished {
                drop(state);
                return Ok(self.default_reply(invocation));
            }
            // A block may have opened since the first owner check.
            if self.block_owner.is_owned_by_other_thread() {
                drop(state);
                warn!(%invocation, "invocation during another thread's open block takes the default path");
                return Ok(self.default_reply(invocation));
            }
            let (kind, outcome) = state.dispatch(&self.mocks, &self.config, invocation);
            match outcome {
                Ok(production) => production,
                Err(err) if kind == PhaseKind::Replay => {
                    let on_test_thread = self.is_test_thread();
                    debug!(%err, on_test_thread, "replay failure kept as pending");
                    state.failures.store(err, on_test_thread);
                    Production::Value(invocation.return_type().zero_value())
                }
                Err(err) => return Err(err.into()),
            }
        };
        self.complete(invocation, production)
    }

    /// Turns a phase decision into a reply. Delegates run here, unlocked.
    fn complete(&self, invocation: &Invocation, production: Production) -> Result<Reply, Raised> {
        match production {
            Production::Value(value) => Ok(Reply::Return(value)),
            Production::ExecuteReal => Ok(Reply::ExecuteReal),
            Production::Throw(thrown) => Err(Raised::Thrown(thrown)),
            Production::Delegate(delegated) => {
                let call = DelegateCall {
                    instance: invocation.instance.as_ref(),
                    args: &invocation.args,
                    invocation_count: delegated.invocation_count,
                    min_invocations: delegated.min_invocations,
                    max_invocations: delegated.max_invocations,
                    method: &delegated.method,
                };
                let value = delegated.delegate.invoke(&call)?;
                let value_type = value.kind_label();
                convert_delegated(value, &delegated.return_type)
                    .map(Reply::Return)
                    .ok_or_else(|| {
                        Raised::Failure(MockError::IncompatibleResult {
                            value_type,
                            return_type: delegated.return_type.to_string(),
                            method: delegated.method,
                        })
                    })
            }
        }
    }

    /// Reply for calls that bypass matching.
    fn default_reply(&self, invocation: &Invocation) -> Reply {
        if invocation.mode == ExecutionMode::Partial {
            return Reply::ExecuteReal;
        }
        let return_type = invocation.return_type();
        match return_type.object_name() {
            Some(name) if self.config.cascading => {
                let method = invocation.method.to_string();
                Reply::Return(Value::Object(self.mocks.lock().cascade_for_method(
                    &invocation.class,
                    &method,
                    name,
                )))
            }
            _ => Reply::Return(return_type.zero_value()),
        }
    }

    /// Opens a record block with the configured default strictness.
    ///
    /// # Errors
    /// `IllegalState` when a block is already open, replay has begun, or
    /// the execution has ended.
    pub fn record(&self) -> Result<RecordBlock<'_>, MockError> {
        self.record_with(self.config.default_strictness)
    }

    /// Opens a record block whose expectations have `strictness`.
    ///
    /// # Errors
    /// See [`Execution::record`].
    #[instrument(skip(self))]
    pub fn record_with(&self, strictness: Strictness) -> Result<RecordBlock<'_>, MockError> {
        self.block_owner.acquire()?;
        let mut state = self.state.lock();
        let refusal = if state.finished {
            Some("the execution has ended")
        } else if state.replay.is_some() {
            Some("cannot record once replay has begun")
        } else {
            None
        };
        if let Some(reason) = refusal {
            drop(state);
            self.block_owner.release();
            return Err(MockError::illegal_state(reason));
        }
        let record = RecordPhase::new(strictness, &state.phased);
        state.record = Some(record);
        let block = state.open_block();
        debug!(block, "record block opened");
        Ok(RecordBlock {
            execution: self,
            block,
        })
    }

    /// Opens a verification block. Replay starts if it has not yet.
    ///
    /// # Errors
    /// A failure kept as pending on the test thread is surfaced here.
    /// `IllegalState` when a block is already open or the execution has
    /// ended.
    #[instrument(skip(self))]
    pub fn verify(&self, mode: VerifyMode) -> Result<VerificationBlock<'_>, MockError> {
        self.block_owner.acquire()?;
        let mut state = self.state.lock();
        let refusal = if state.finished {
            Some(MockError::illegal_state("the execution has ended"))
        } else {
            state.failures.test_thread.take()
        };
        if let Some(err) = refusal {
            drop(state);
            self.block_owner.release();
            return Err(err);
        }
        state.replay.get_or_insert_with(ReplayPhase::new);
        let block = state.open_block();
        state.verification = Some(VerificationPhase::new(mode, block));
        debug!(block, replayed = state.phased.replay_log.len(), "verification block opened");
        Ok(VerificationBlock {
            execution: self,
            block,
        })
    }

    /// Finishes the test and reports its first failure.
    ///
    /// Any open block is closed first. Failures are then reported in this
    /// order: an error closing a record block, a pending failure of the
    /// test thread, the first recorded expectation still below its minimum,
    /// a failure captured on another thread, and the open verification
    /// block's failure.
    ///
    /// # Errors
    /// The failure described above, or `IllegalState` when already ended.
    #[instrument(skip(self))]
    pub fn end(&self) -> Result<(), MockError> {
        let _handling = self.handling.lock();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.finished {
            return Err(MockError::illegal_state("the execution has already ended"));
        }
        let closing = state
            .record
            .take()
            .and_then(|mut record| record.end(&mut state.phased).err());
        let verification = state.verification.take();
        if state.open_block.take().is_some() {
            self.block_owner.release();
        }
        let replay = state.replay.get_or_insert_with(ReplayPhase::new);
        let missing = replay.end_execution(&state.phased).err();
        let verifying = verification.and_then(|mut phase| phase.end(&state.phased).err());
        let outcome = closing
            .or_else(|| state.failures.test_thread.take())
            .or(missing)
            .or_else(|| state.failures.other_thread.take())
            .or(verifying);
        state.finished = true;
        debug!(
            failed = outcome.is_some(),
            replayed = state.phased.replay_log.len(),
            "execution ended"
        );
        outcome.map_or(Ok(()), Err)
    }

    /// Clears every expectation, log, mapping and failure so the execution
    /// can serve another test. The calling thread becomes the test thread.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = ExecutionState {
            blocks: state.blocks,
            ..ExecutionState::default()
        };
        self.mocks.lock().clear();
        self.block_owner.release();
        *self.test_thread.lock() = thread::current().id();
        debug!("execution reset");
    }

    fn with_record<T>(
        &self,
        block: u32,
        f: impl FnOnce(&mut RecordPhase, &mut PhasedExecutionState) -> Result<T, MockError>,
    ) -> Result<T, MockError> {
        let _handling = self.handling.lock();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match (&mut state.record, state.open_block) {
            (Some(record), Some(open)) if open == block => f(record, &mut state.phased),
            _ => Err(MockError::illegal_state("the record block is closed")),
        }
    }

    fn with_verification<T>(
        &self,
        block: u32,
        f: impl FnOnce(&mut VerificationPhase, &mut PhasedExecutionState) -> Result<T, MockError>,
    ) -> Result<T, MockError> {
        let _handling = self.handling.lock();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match (&mut state.verification, state.open_block) {
            (Some(verification), Some(open)) if open == block => f(verification, &mut state.phased),
            _ => Err(MockError::illegal_state("the verification block is closed")),
        }
    }

    fn close_record(&self, block: u32) -> Result<(), MockError> {
        let _handling = self.handling.lock();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.open_block != Some(block) {
            return Ok(());
        }
        state.open_block = None;
        let closed = state
            .record
            .take()
            .map_or(Ok(()), |mut record| record.end(&mut state.phased));
        state.replay = Some(ReplayPhase::new());
        drop(guard);
        self.block_owner.release();
        debug!(block, "record block closed, replay begins");
        closed
    }

    fn close_verification(&self, block: u32) -> Result<(), MockError> {
        let _handling = self.handling.lock();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.open_block != Some(block) {
            return Ok(());
        }
        state.open_block = None;
        let closed = state
            .verification
            .take()
            .map_or(Ok(()), |mut phase| phase.end(&state.phased));
        drop(guard);
        self.block_owner.release();
        debug!(block, ok = closed.is_ok(), "verification block closed");
        closed
    }
}

/// Staging shared by both block kinds.
fn stage(staging: &mut ArgumentStaging, position: Option<usize>, matcher: ArgMatcher) {
    match position {
        Some(position) => staging.set(position, matcher),
        None => staging.push(matcher),
    }
}

/// An open record block. Invocations handled while it is open become
/// expectations; the methods here shape the most recent one.
///
/// Dropping the block ends it; a failure from that is kept as pending.
#[must_use = "the block closes when dropped"]
#[derive(Debug)]
pub struct RecordBlock<'a> {
    execution: &'a Execution,
    block: u32,
}

impl RecordBlock<'_> {
    fn stage(&self, f: impl FnOnce(&mut RecordPhase)) -> &Self {
        let staged = self.execution.with_record(self.block, |record, _| {
            f(record);
            Ok(())
        });
        if let Err(err) = staged {
            debug!(%err, "staging ignored");
        }
        self
    }

    /// Stages `matcher` for the next argument position of the next
    /// invocation.
    pub fn with(&self, matcher: ArgMatcher) -> &Self {
        self.stage(|record| record.stage_matcher(matcher))
    }

    /// Stages `matcher` for argument `position` of the next invocation.
    pub fn with_at(&self, position: usize, matcher: ArgMatcher) -> &Self {
        self.stage(|record| record.stage_matcher_at(position, matcher))
    }

    /// The next invocation only matches calls on `instance`.
    pub fn on_instance(&self, instance: &ObjectRef) -> &Self {
        let instance = instance.clone();
        self.stage(|record| record.stage_instance(instance))
    }

    /// Adds a return value for the current expectation. Multi-valued values
    /// for a single-valued return type become consecutive results.
    ///
    /// # Errors
    /// `IncompatibleResult` when the value does not convert to the return
    /// type; `IllegalArgument` for constructors; `IllegalState` with no
    /// current expectation.
    pub fn result(&self, value: impl Into<Value>) -> Result<&Self, MockError> {
        let value = value.into();
        self.execution
            .with_record(self.block, |record, state| record.add_value(state, value))?;
        Ok(self)
    }

    /// Adds consecutive return values.
    ///
    /// # Errors
    /// As [`RecordBlock::result`], and `IllegalArgument` for no values.
    pub fn returns(&self, values: Vec<Value>) -> Result<&Self, MockError> {
        self.execution
            .with_record(self.block, |record, state| record.add_values(state, values))?;
        Ok(self)
    }

    /// The current expectation throws `thrown` when its turn comes.
    ///
    /// # Errors
    /// `IllegalState` with no current expectation.
    pub fn throws(&self, thrown: Thrown) -> Result<&Self, MockError> {
        self.execution
            .with_record(self.block, |record, state| record.add_thrown(state, thrown))?;
        Ok(self)
    }

    /// The current expectation computes its result with `delegate`.
    ///
    /// # Errors
    /// `IllegalState` with no current expectation.
    pub fn delegate(&self, delegate: impl Delegate + 'static) -> Result<&Self, MockError> {
        let delegate: Arc<dyn Delegate> = Arc::new(delegate);
        self.execution
            .with_record(self.block, |record, state| record.add_delegate(state, delegate))?;
        Ok(self)
    }

    /// The current expectation runs the real implementation.
    ///
    /// # Errors
    /// `IllegalState` with no current expectation.
    pub fn real_implementation(&self) -> Result<&Self, MockError> {
        self.execution
            .with_record(self.block, |record, state| record.add_real_implementation(state))?;
        Ok(self)
    }

    /// Exactly `n` invocations.
    ///
    /// # Errors
    /// `IllegalState` with no current expectation.
    pub fn times(&self, n: u32) -> Result<&Self, MockError> {
        self.times_range(n, Some(n))
    }

    /// At least `n` invocations, keeping any finite maximum that allows it.
    ///
    /// # Errors
    /// `IllegalState` with no current expectation.
    pub fn min_times(&self, n: u32) -> Result<&Self, MockError> {
        self.execution.with_record(self.block, |record, state| {
            let max = record.limits(state)?.1.filter(|max| *max >= n);
            record.set_limits(state, n, max)
        })?;
        Ok(self)
    }

    /// At most `n` invocations.
    ///
    /// # Errors
    /// `IllegalState` with no current expectation.
    pub fn max_times(&self, n: u32) -> Result<&Self, MockError> {
        self.execution.with_record(self.block, |record, state| {
            let min = record.limits(state)?.0.min(n);
            record.set_limits(state, min, Some(n))
        })?;
        Ok(self)
    }

    /// Between `min` and `max` invocations; `None` is unbounded.
    ///
    /// # Errors
    /// `IllegalArgument` when `min > max`; `IllegalState` with no current
    /// expectation.
    pub fn times_range(&self, min: u32, max: Option<u32>) -> Result<&Self, MockError> {
        self.execution
            .with_record(self.block, |record, state| record.set_limits(state, min, max))?;
        Ok(self)
    }

    /// Repeats the block `n` times.
    ///
    /// # Errors
    /// `IllegalArgument` when `n` is zero.
    pub fn iterations(&self, n: u32) -> Result<&Self, MockError> {
        self.execution
            .with_record(self.block, |record, _| record.set_iterations(n))?;
        Ok(self)
    }

    /// Closes the block; replay begins.
    ///
    /// # Errors
    /// `IllegalState` when matchers were staged without an invocation.
    pub fn end(self) -> Result<(), MockError> {
        self.execution.close_record(self.block)
    }
}

impl Drop for RecordBlock<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.execution.close_record(self.block) {
            self.execution.store_pending(err);
        }
    }
}

/// An open verification block. Invocations handled while it is open are
/// checked against the replay log.
///
/// Dropping the block ends it; a failure from that is kept as pending.
#[must_use = "the block closes when dropped"]
#[derive(Debug)]
pub struct VerificationBlock<'a> {
    execution: &'a Execution,
    block: u32,
}

impl VerificationBlock<'_> {
    fn stage(&self, position: Option<usize>, matcher: ArgMatcher) -> &Self {
        let staged = self.execution.with_verification(self.block, |phase, _| {
            stage(phase.staging(), position, matcher);
            Ok(())
        });
        if let Err(err) = staged {
            debug!(%err, "staging ignored");
        }
        self
    }

    /// Stages `matcher` for the next argument position of the next
    /// verified invocation.
    pub fn with(&self, matcher: ArgMatcher) -> &Self {
        self.stage(None, matcher)
    }

    /// Stages `matcher` for argument `position` of the next verified
    /// invocation.
    pub fn with_at(&self, position: usize, matcher: ArgMatcher) -> &Self {
        self.stage(Some(position), matcher)
    }

    /// The next verified invocation only counts calls on `instance`.
    pub fn on_instance(&self, instance: &ObjectRef) -> &Self {
        let instance = instance.clone();
        let staged = self.execution.with_verification(self.block, |phase, _| {
            phase.staging().on_instance(instance);
            Ok(())
        });
        if let Err(err) = staged {
            debug!(%err, "staging ignored");
        }
        self
    }

    /// Every following verification must match `n` times.
    ///
    /// # Errors
    /// `IllegalArgument` when `n` is zero.
    pub fn iterations(&self, n: u32) -> Result<&Self, MockError> {
        self.execution
            .with_verification(self.block, |phase, _| phase.staging().set_iterations(n))?;
        Ok(self)
    }

    fn limits(&self, min: u32, max: Option<u32>) -> Result<&Self, MockError> {
        self.execution
            .with_verification(self.block, |phase, state| phase.apply_limits(state, min, max))?;
        Ok(self)
    }

    /// The last verified invocation happened exactly `n` times.
    ///
    /// # Errors
    /// The verification failure, or `IllegalState` before any verified
    /// invocation.
    pub fn times(&self, n: u32) -> Result<&Self, MockError> {
        self.limits(n, Some(n))
    }

    /// The last verified invocation happened at least `n` times.
    ///
    /// # Errors
    /// As [`VerificationBlock::times`].
    pub fn min_times(&self, n: u32) -> Result<&Self, MockError> {
        self.limits(n, None)
    }

    /// The last verified invocation happened at most `n` times, and at
    /// least once unless `n` is zero.
    ///
    /// # Errors
    /// As [`VerificationBlock::times`].
    pub fn max_times(&self, n: u32) -> Result<&Self, MockError> {
        self.limits(n.min(1), Some(n))
    }

    /// The last verified invocation happened between `min` and `max` times.
    ///
    /// # Errors
    /// As [`VerificationBlock::times`].
    pub fn times_range(&self, min: u32, max: Option<u32>) -> Result<&Self, MockError> {
        self.limits(min, max)
    }

    /// Closes the block; replay resumes.
    ///
    /// # Errors
    /// The block's pending failure, or for full verification the first
    /// replayed invocation left unverified.
    pub fn end(self) -> Result<(), MockError> {
        self.execution.close_verification(self.block)
    }
}

impl Drop for VerificationBlock<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.execution.close_verification(self.block) {
            self.execution.store_pending(err);
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::signature::MethodSignature;

    fn call(instance: &ObjectRef, sig: &str, args: Vec<Value>) -> Invocation {
        let method = Arc::new(MethodSignature::parse(sig).unwrap());
        Invocation::new(Some(instance.clone()), instance.type_name().clone(), method, args)
    }

    #[test]
    fn first_invocation_without_block_starts_replay() {
        let execution = Execution::new();
        let calc = execution.declare("Calculator").unwrap();
        assert_eq!(execution.phase(), None);
        let reply = execution
            .record_or_replay(&call(&calc, "add(i32, i32) -> i32", vec![1.into(), 2.into()]))
            .unwrap();
        assert_eq!(reply, Reply::Return(Value::Int(0)));
        assert_eq!(execution.phase(), Some(PhaseKind::Replay));
        assert!(execution.record().is_err(), "record after replay");
    }

    #[test]
    fn record_block_transitions_to_replay() {
        let execution = Execution::new();
        let calc = execution.declare("Calculator").unwrap();
        let record = execution.record().unwrap();
        assert_eq!(execution.phase(), Some(PhaseKind::Record));
        execution
            .record_or_replay(&call(&calc, "add(i32, i32) -> i32", vec![1.into(), 2.into()]))
            .unwrap();
        record.result(3).unwrap();
        record.end().unwrap();
        assert_eq!(execution.phase(), Some(PhaseKind::Replay));
        let reply = execution
            .record_or_replay(&call(&calc, "add(i32, i32) -> i32", vec![1.into(), 2.into()]))
            .unwrap();
        assert_eq!(reply.into_value(), Some(Value::Int(3)));
        execution.end().unwrap();
        assert_eq!(execution.phase(), None);
    }

    #[test]
    fn only_one_block_may_be_open() {
        let execution = Execution::new();
        let _record = execution.record().unwrap();
        let err = execution.verify(VerifyMode::Unordered).unwrap_err();
        assert!(matches!(err, MockError::IllegalState(_)));
    }

    #[test]
    fn dropped_record_block_keeps_failure_pending() {
        let execution = Execution::new();
        {
            let record = execution.record().unwrap();
            record.with(ArgMatcher::Any);
        }
        assert!(execution.has_pending_error());
        let err = execution.verify(VerifyMode::Unordered).unwrap_err();
        assert!(matches!(err, MockError::IllegalState(_)));
    }

    #[test]
    fn end_twice_is_illegal() {
        let execution = Execution::new();
        execution.end().unwrap();
        assert!(matches!(execution.end(), Err(MockError::IllegalState(_))));
        execution.reset();
        assert!(execution.end().is_ok());
    }

    #[test]
    fn invocations_after_end_get_defaults() {
        let execution = Execution::new();
        let calc = execution.declare("Calculator").unwrap();
        execution.end().unwrap();
        let reply = execution
            .record_or_replay(&call(&calc, "name() -> str", vec![]))
            .unwrap();
        assert_eq!(reply, Reply::Return(Value::str("")));
        assert!(!execution.has_pending_error());
    }

    #[test]
    fn loose_declarations_live_in_per_test_state() {
        let execution = Execution::new();
        execution.declare(MockedType::new("Article").loose()).unwrap();
        execution.declare("Calculator").unwrap();
        {
            let state = execution.state.lock();
            assert!(state.phased.is_loose(&"Article".into()));
            assert!(!state.phased.is_loose(&"Calculator".into()));
        }
        execution.reset();
        assert!(!execution.state.lock().phased.is_loose(&"Article".into()));
    }
}

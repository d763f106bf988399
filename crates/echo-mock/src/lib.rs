// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Record/replay/verify mocking engine.
//!
//! An interception layer forwards every call on a mocked type to
//! [`Execution::record_or_replay`]. What happens to the call depends on the
//! phase the test has put the execution in:
//!
//! - **Record**: the call becomes an expectation, shaped by the open
//!   [`RecordBlock`] (matchers, results, invocation counts).
//! - **Replay**: the call is matched against recorded expectations, strict
//!   ones in order and non-strict ones by predicate, and produces the
//!   recorded result. Failures are deferred until the test reaches a safe
//!   boundary.
//! - **Verify**: the call is checked against the replay log, unordered,
//!   ordered, or exhaustively for a set of mocks.
//!
//! [`Execution::end`] reports missing invocations and deferred failures.
//!
//! # Modules
//!
//! - [`value`]: runtime values and instance handles
//! - [`signature`]: type descriptors and method signatures
//! - [`invocation`]: intercepted calls and the replies given for them
//! - [`matcher`]: argument matchers and captures
//! - [`results`]: delegate results
//! - [`registry`]: declared mocked types
//! - [`config`]: engine configuration and its store
//! - [`error`]: failure taxonomy
//! - [`lock`]: thread-aware locks
//! - [`execution`]: the coordinator and its blocks

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::dbg_macro
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::similar_names
)]

pub mod config;
pub mod error;
pub mod execution;
pub mod invocation;
pub mod lock;
pub mod matcher;
pub mod registry;
pub mod results;
pub mod signature;
pub mod value;

mod conversion;
mod equivalence;
mod expectation;
mod phase;
mod state;

pub use config::{ConfigError, ConfigService, ConfigStore, EngineConfig, StrictAdvancePolicy, Strictness};
pub use error::{MockError, Raised, Thrown, UnexpectedReason};
pub use execution::{Execution, RecordBlock, VerificationBlock};
pub use invocation::{AccessFlags, ExecutionMode, Invocation, Reply};
pub use lock::{ThreadLock, ThreadLockGuard};
pub use matcher::{ArgMatcher, Captured, Predicate};
pub use phase::{PhaseKind, VerifyMode, VerifyScope};
pub use registry::MockedType;
pub use results::{Delegate, DelegateCall};
pub use signature::{MethodSignature, SignatureError, TypeDesc};
pub use value::{InstanceId, ObjectRef, Shape, TypeName, Value};

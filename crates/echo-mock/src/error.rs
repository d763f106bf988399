// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Failure taxonomy for the mocking engine.
//!
//! [`MockError`] covers every failure the engine itself reports. A
//! [`Thrown`] is a failure the test *recorded* as the outcome of an
//! invocation. [`Raised`] is what an intercepted call propagates to the
//! interception layer: either of the two.

use std::fmt;

use thiserror::Error;

/// A recorded failure returned to the caller of a mocked method.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Thrown {
    /// Failure kind, e.g. `"IoError"`.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl Thrown {
    /// Creates a thrown failure of `kind` with `message`.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Why an invocation was reported as unexpected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnexpectedReason {
    /// No recorded expectation accepts the invocation.
    NotRecorded,
    /// A strict expectation that must happen first is still outstanding.
    OutOfOrder {
        /// The outstanding expectation.
        required: String,
    },
    /// The matching expectation already reached its maximum.
    TooMany {
        /// Maximum allowed invocations.
        max: u32,
    },
    /// Full verification found the invocation unverified.
    NotVerified,
}

impl fmt::Display for UnexpectedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRecorded => f.write_str("no matching expectation was recorded"),
            Self::OutOfOrder { required } => write!(f, "expected {required} first"),
            Self::TooMany { max } => write!(f, "exceeds the maximum of {max}"),
            Self::NotVerified => f.write_str("replayed but never verified"),
        }
    }
}

fn instead_got(non_matching: &[String]) -> String {
    if non_matching.is_empty() {
        return String::new();
    }
    let mut out = String::from("; instead got");
    for call in non_matching {
        out.push_str("\n  ");
        out.push_str(call);
    }
    out
}

/// Errors reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MockError {
    /// An expectation ended the test (or a verification) below its minimum.
    #[error("missing {missing} invocation(s) to {expected}{}", instead_got(.non_matching))]
    MissingInvocation {
        /// Description of the expected invocation.
        expected: String,
        /// How many invocations are missing.
        missing: u32,
        /// Invocations with the same signature but different arguments.
        non_matching: Vec<String>,
    },
    /// An invocation nothing allowed.
    #[error("unexpected invocation to {invocation}: {reason}")]
    UnexpectedInvocation {
        /// Description of the offending invocation.
        invocation: String,
        /// Why it was rejected.
        reason: UnexpectedReason,
    },
    /// A strict expectation matched by signature but not by arguments.
    #[error("argument mismatch for {expected} at parameter {position}: expected {matcher}, got {actual}")]
    ArgumentMismatch {
        /// Description of the strict expectation.
        expected: String,
        /// Zero-based position of the first mismatching argument.
        position: usize,
        /// Description of the expected value or matcher.
        matcher: String,
        /// The actual argument.
        actual: String,
    },
    /// A recorded or delegated result cannot be returned from the method.
    #[error("value of type {value_type} is incompatible with return type {return_type} of {method}")]
    IncompatibleResult {
        /// Runtime kind of the offending value.
        value_type: String,
        /// Declared return type.
        return_type: String,
        /// Method the result was destined for.
        method: String,
    },
    /// The engine was used with an invalid argument.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    /// The engine was used in the wrong phase.
    #[error("illegal state: {0}")]
    IllegalState(String),
}

impl MockError {
    pub(crate) fn illegal_argument(msg: impl Into<String>) -> Self {
        Self::IllegalArgument(msg.into())
    }

    pub(crate) fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    pub(crate) fn unexpected(invocation: impl fmt::Display, reason: UnexpectedReason) -> Self {
        Self::UnexpectedInvocation {
            invocation: invocation.to_string(),
            reason,
        }
    }

    /// True for the verification failures that fail a test, as opposed to
    /// misuse of the engine.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingInvocation { .. }
                | Self::UnexpectedInvocation { .. }
                | Self::ArgumentMismatch { .. }
        )
    }
}

/// Outcome of an intercepted call that did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Raised {
    /// A recorded (or delegate-produced) failure to rethrow.
    #[error(transparent)]
    Thrown(#[from] Thrown),
    /// An engine failure surfaced immediately.
    #[error(transparent)]
    Failure(#[from] MockError),
}

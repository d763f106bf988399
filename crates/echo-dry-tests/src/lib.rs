// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for the echo-mock test suite.
#![forbid(unsafe_code)]
//!
//! Tests drive the engine the way an interception layer would: they declare
//! fake mocked types, build invocations for their methods, and hand those to
//! an [`echo_mock::Execution`].
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`delegate`] - Delegates that count and record their calls
//! - [`fixtures`] - Fake mocked types (`Calculator`, `Database`, `Article`)
//! - [`invocation`] - Invocation builder

pub mod config;
pub mod delegate;
pub mod fixtures;
pub mod invocation;

// Re-export commonly used items at crate root for convenience
pub use config::InMemoryConfigStore;
pub use delegate::{CountingDelegate, SeenCall};
pub use fixtures::{FakeType, MockHandle, ARTICLE, CALCULATOR, DATABASE};
pub use invocation::InvocationBuilder;

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use echo_dry_tests::{MockHandle, CALCULATOR, DATABASE};
use echo_mock::{EngineConfig, Execution, MockError, Raised, Reply, Value};

/// Routes engine logs to the test harness output once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A fresh execution with one declared calculator and one database.
pub struct Fixture {
    pub execution: Execution,
    pub calc: MockHandle,
    pub db: MockHandle,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        let execution = Execution::with_config(config);
        let calc = MockHandle::declare(&execution, &CALCULATOR).expect("declare calculator");
        let db = MockHandle::declare(&execution, &DATABASE).expect("declare database");
        Self { execution, calc, db }
    }

    /// Calls `method` on the calculator and returns the produced value.
    pub fn calc(&self, method: &str, args: Vec<Value>) -> Value {
        self.calc
            .value(&self.execution, method, args)
            .unwrap_or_else(|e| panic!("calculator {method} raised {e}"))
    }

    /// Calls `method` on the database and returns the produced value.
    pub fn db(&self, method: &str, args: Vec<Value>) -> Value {
        self.db
            .value(&self.execution, method, args)
            .unwrap_or_else(|e| panic!("database {method} raised {e}"))
    }
}

/// Unwraps the engine failure carried by a raised outcome.
pub fn failure(outcome: Result<Reply, Raised>) -> MockError {
    match outcome {
        Err(Raised::Failure(err)) => err,
        other => panic!("expected an engine failure, got {other:?}"),
    }
}

pub fn s(text: &str) -> Value {
    Value::str(text)
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Result production: delegates, conversions, constructors and partial
//! mocking.
#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use common::{failure, init_tracing, s, Fixture};
use echo_dry_tests::{CountingDelegate, InvocationBuilder, MockHandle, ARTICLE, CALCULATOR, DATABASE};
use echo_mock::{
    ArgMatcher, EngineConfig, Execution, MockError, Raised, Reply, Strictness, Thrown, Value, VerifyMode, VerifyScope,
};

#[test]
fn delegate_sees_arguments_and_counts() {
    let fx = Fixture::new();
    let delegate = CountingDelegate::new(|call| {
        let sum: i64 = call.args.iter().filter_map(Value::as_i64).sum();
        Ok(Value::Long(sum))
    });
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    record.with(ArgMatcher::Any).with(ArgMatcher::Any);
    fx.calc("add", vec![0.into(), 0.into()]);
    record.delegate(delegate.clone()).unwrap().max_times(3).unwrap();
    record.end().unwrap();

    assert_eq!(fx.calc("add", vec![2.into(), 3.into()]), Value::Int(5));
    assert_eq!(fx.calc("add", vec![4.into(), 4.into()]), Value::Int(8));

    let seen = delegate.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].args, vec![Value::Int(2), Value::Int(3)]);
    assert_eq!(seen[1].invocation_count, 2);
    assert_eq!(seen[1].max_invocations, Some(3));
    assert!(seen[0].method.contains("add"), "{}", seen[0].method);
}

#[test]
fn delegate_failure_is_thrown_to_the_caller() {
    let fx = Fixture::new();
    let record = fx.execution.record().unwrap();
    fx.calc("divide", vec![1.0.into(), 0.0.into()]);
    record
        .delegate(CountingDelegate::new(|_| {
            Err(Thrown::new("ArithmeticError", "division by zero"))
        }))
        .unwrap();
    record.end().unwrap();

    match fx.calc.invoke(&fx.execution, "divide", vec![1.0.into(), 0.0.into()]) {
        Err(Raised::Thrown(thrown)) => assert_eq!(thrown.kind, "ArithmeticError"),
        other => panic!("expected a thrown failure, got {other:?}"),
    }
    fx.execution.end().unwrap();
}

#[test]
fn incompatible_delegate_value_fails_the_call() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    fx.calc("count", vec![s("x")]);
    record.delegate(CountingDelegate::returning("seven")).unwrap();
    record.end().unwrap();

    let err = failure(fx.calc.invoke(&fx.execution, "count", vec![s("x")]));
    assert!(matches!(err, MockError::IncompatibleResult { .. }), "{err}");
    assert!(!fx.execution.has_pending_error(), "raised, not deferred");
}

#[test]
fn delegate_returning_nothing_depends_on_return_type() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    fx.calc("name", vec![]);
    record.delegate(CountingDelegate::returning(Value::Unit)).unwrap();
    fx.calc("add", vec![1.into(), 1.into()]);
    record.delegate(CountingDelegate::returning(Value::Unit)).unwrap();
    record.end().unwrap();

    assert_eq!(fx.calc("name", vec![]), Value::Null);
    let err = failure(fx.calc.invoke(&fx.execution, "add", vec![1.into(), 1.into()]));
    assert!(matches!(err, MockError::IncompatibleResult { .. }), "{err}");
}

#[test]
fn delegate_may_call_back_into_mocks() {
    init_tracing();
    let execution = Arc::new(Execution::new());
    let calc = MockHandle::declare(&execution, &CALCULATOR).unwrap();

    let record = execution.record_with(Strictness::NonStrict).unwrap();
    calc.value(&execution, "add", vec![1.into(), 1.into()]).unwrap();
    record.result(7).unwrap();
    calc.value(&execution, "count", vec![s("x")]).unwrap();
    let inner = Arc::downgrade(&execution);
    let handle = calc.clone();
    record
        .delegate(CountingDelegate::new(move |_| {
            let execution = inner.upgrade().ok_or_else(|| Thrown::new("Gone", "execution dropped"))?;
            handle
                .value(&execution, "add", vec![1.into(), 1.into()])
                .map_err(|e| Thrown::new("Nested", e.to_string()))
        }))
        .unwrap();
    record.end().unwrap();

    assert_eq!(calc.value(&execution, "count", vec![s("x")]).unwrap(), Value::Int(7));

    let verify = execution.verify(VerifyMode::Unordered).unwrap();
    calc.value(&execution, "add", vec![1.into(), 1.into()]).unwrap();
    verify.times(1).unwrap();
    verify.end().unwrap();
    execution.end().unwrap();
}

#[test]
fn reentrant_matcher_gets_the_default_path() {
    init_tracing();
    let execution = Arc::new(Execution::new());
    let calc = MockHandle::declare(&execution, &CALCULATOR).unwrap();
    let weak: Weak<Execution> = Arc::downgrade(&execution);
    let handle = calc.clone();

    let record = execution.record_with(Strictness::NonStrict).unwrap();
    record.with(ArgMatcher::predicate("names the calculator", move |value| {
        let Some(execution) = weak.upgrade() else {
            return false;
        };
        let name = handle.value(&execution, "name", vec![]).unwrap_or(Value::Null);
        name == Value::str("") && value.as_text() == Some("calc")
    }));
    calc.value(&execution, "count", vec![Value::Null]).unwrap();
    record.result(1).unwrap();
    record.end().unwrap();

    assert_eq!(calc.value(&execution, "count", vec![s("calc")]).unwrap(), Value::Int(1));
    assert_eq!(calc.value(&execution, "count", vec![s("other")]).unwrap(), Value::Int(0));
}

#[test]
fn reentrant_matcher_in_verification_counts_gets_the_default_path() {
    init_tracing();
    let execution = Arc::new(Execution::new());
    let calc = MockHandle::declare(&execution, &CALCULATOR).unwrap();
    let record = execution.record_with(Strictness::NonStrict).unwrap();
    calc.value(&execution, "add", vec![1.into(), 2.into()]).unwrap();
    record.result(3).unwrap();
    record.end().unwrap();
    for _ in 0..2 {
        assert_eq!(calc.value(&execution, "add", vec![1.into(), 2.into()]).unwrap(), Value::Int(3));
    }

    let nested = Arc::new(AtomicUsize::new(0));
    let weak: Weak<Execution> = Arc::downgrade(&execution);
    let handle = calc.clone();
    let seen = Arc::clone(&nested);
    let verify = execution.verify(VerifyMode::Unordered).unwrap();
    verify.with(ArgMatcher::predicate("calls the calculator", move |_| {
        if let Some(execution) = weak.upgrade() {
            let sum = handle.value(&execution, "add", vec![9.into(), 2.into()]).unwrap_or(Value::Null);
            assert_eq!(sum, Value::Int(0));
            seen.fetch_add(1, Ordering::SeqCst);
        }
        true
    }));
    calc.value(&execution, "add", vec![1.into(), 2.into()]).unwrap();
    let after_call = nested.load(Ordering::SeqCst);
    assert!(after_call > 0);

    verify.times(2).unwrap();
    let err = verify.times(3).unwrap_err();
    assert!(matches!(err, MockError::MissingInvocation { missing: 1, .. }), "{err}");
    assert!(nested.load(Ordering::SeqCst) > after_call);
    verify.end().unwrap();
    execution.end().unwrap();
}

#[test]
fn constructed_instance_stands_in_for_the_recorded_mock() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    fx.db("<init>", vec![s("mem://main")]);
    fx.db("connect", vec![s("mem://main")]);
    record.result(true).unwrap();
    record.end().unwrap();

    let fresh = MockHandle::wrap(fx.execution.new_instance("Database"), &DATABASE).unwrap();
    fresh.value(&fx.execution, "<init>", vec![s("mem://main")]).unwrap();
    assert_eq!(
        fresh.value(&fx.execution, "connect", vec![s("mem://main")]).unwrap(),
        Value::Bool(true)
    );

    let stranger = MockHandle::wrap(fx.execution.new_instance("Database"), &DATABASE).unwrap();
    assert_eq!(
        stranger.value(&fx.execution, "connect", vec![s("mem://main")]).unwrap(),
        Value::Bool(false)
    );
}

#[test]
fn constructors_take_no_result() {
    let fx = Fixture::new();
    let record = fx.execution.record().unwrap();
    fx.db("<init>", vec![s("mem://main")]);
    assert!(matches!(record.result(true), Err(MockError::IllegalArgument(_))));
}

#[test]
fn incompatible_recorded_value_is_rejected() {
    let fx = Fixture::new();
    let record = fx.execution.record().unwrap();
    fx.calc("add", vec![1.into(), 2.into()]);
    let err = record.result("three").unwrap_err();
    match err {
        MockError::IncompatibleResult {
            value_type,
            return_type,
            ..
        } => {
            assert_eq!(return_type, "i32");
            assert!(!value_type.is_empty());
        }
        other => panic!("expected an incompatible result, got {other}"),
    }
}

#[test]
fn recorded_failure_is_thrown_in_turn() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    fx.db("connect", vec![s("mem://main")]);
    record
        .throws(Thrown::new("IoError", "refused"))
        .unwrap()
        .result(true)
        .unwrap();
    record.end().unwrap();

    match fx.db.invoke(&fx.execution, "connect", vec![s("mem://main")]) {
        Err(Raised::Thrown(thrown)) => assert_eq!(thrown.to_string(), "IoError: refused"),
        other => panic!("expected IoError, got {other:?}"),
    }
    assert_eq!(fx.db("connect", vec![s("mem://main")]), Value::Bool(true));
}

#[test]
fn real_implementation_is_requested() {
    let fx = Fixture::new();
    let record = fx.execution.record().unwrap();
    fx.calc("add", vec![1.into(), 2.into()]);
    record.real_implementation().unwrap();
    record.end().unwrap();

    let reply = fx.calc.invoke(&fx.execution, "add", vec![1.into(), 2.into()]).unwrap();
    assert_eq!(reply, Reply::ExecuteReal);
    fx.execution.end().unwrap();
}

#[test]
fn partial_calls_run_real_code_and_need_no_verification() {
    let fx = Fixture::new();
    let reply = fx.calc.invoke_partial(&fx.execution, "clear", vec![]).unwrap();
    assert_eq!(reply, Reply::ExecuteReal);

    let verify = fx
        .execution
        .verify(VerifyMode::Full {
            ordered: false,
            scope: vec![VerifyScope::Instance(fx.calc.instance().clone())],
        })
        .unwrap();
    verify.end().unwrap();
}

#[test]
fn container_results_follow_the_declared_type() {
    let fx = Fixture::new();
    let article = MockHandle::declare(&fx.execution, &ARTICLE).unwrap();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    article.value(&fx.execution, "tags", vec![]).unwrap();
    record.result(vec![s("rust"), s("mock"), s("rust")]).unwrap();
    article.value(&fx.execution, "metadata", vec![]).unwrap();
    record
        .result(vec![
            Value::List(vec![s("lang"), s("en")]),
            Value::List(vec![s("draft")]),
        ])
        .unwrap();
    record.end().unwrap();

    assert_eq!(
        article.value(&fx.execution, "tags", vec![]).unwrap(),
        Value::Set(vec![s("rust"), s("mock")])
    );
    assert_eq!(
        article.value(&fx.execution, "metadata", vec![]).unwrap(),
        Value::Map(vec![(s("lang"), s("en")), (s("draft"), Value::Null)])
    );
}

#[test]
fn single_value_for_container_return_is_wrapped() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    fx.db("query", vec![s("q")]);
    record.result("only").unwrap();
    record.end().unwrap();

    assert_eq!(fx.db("query", vec![s("q")]), Value::List(vec![s("only")]));
}

#[test]
fn cascading_can_be_disabled() {
    let fx = Fixture::with_config(EngineConfig::default().with_cascading(false));
    assert_eq!(fx.calc("memory", vec![]), Value::Null);
    assert_eq!(fx.db("find", vec![s("a")]), Value::Null);
}

#[test]
fn generic_return_type_overrides_the_erased_one() {
    let fx = Fixture::new();
    let repo = fx.execution.declare("Repository").unwrap();
    let call = || {
        InvocationBuilder::on(&repo)
            .method("find_all() -> any")
            .generic_return("list<str>")
            .build()
            .unwrap()
    };
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    fx.execution.record_or_replay(&call()).unwrap();
    record.result("a").unwrap();
    record.end().unwrap();

    let reply = fx.execution.record_or_replay(&call()).unwrap();
    assert_eq!(reply.into_value(), Some(Value::List(vec![s("a")])));
}

#[test]
fn static_methods_have_no_receiver() {
    let fx = Fixture::new();
    fx.execution.declare("Clock").unwrap();
    let now = || InvocationBuilder::on_type("Clock").method("now() -> i64").build().unwrap();

    let record = fx.execution.record().unwrap();
    fx.execution.record_or_replay(&now()).unwrap();
    record.returns(vec![1_i64.into(), 2_i64.into()]).unwrap();
    record.end().unwrap();

    let first = fx.execution.record_or_replay(&now()).unwrap();
    let second = fx.execution.record_or_replay(&now()).unwrap();
    assert_eq!(first, Reply::Return(Value::Long(1)));
    assert_eq!(second, Reply::Return(Value::Long(2)));
    fx.execution.end().unwrap();
}

#[test]
fn malformed_invocation_is_rejected() {
    let fx = Fixture::new();
    let err = failure(fx.calc.invoke(&fx.execution, "add", vec![1.into()]));
    assert!(matches!(err, MockError::IllegalArgument(_)), "{err}");
}

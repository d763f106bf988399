// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Non-strict expectations, argument matchers and captures.
#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{s, Fixture};
use echo_dry_tests::{MockHandle, ARTICLE};
use echo_mock::{ArgMatcher, Captured, MockError, Strictness, UnexpectedReason, Value};

#[test]
fn non_strict_expectation_tolerates_any_count() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    fx.calc("add", vec![1.into(), 2.into()]);
    record.result(3).unwrap();
    record.end().unwrap();

    for _ in 0..5 {
        assert_eq!(fx.calc("add", vec![1.into(), 2.into()]), Value::Int(3));
    }
    fx.execution.end().unwrap();
}

#[test]
fn non_strict_expectation_may_never_happen() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    fx.calc("clear", vec![]);
    record.end().unwrap();
    fx.execution.end().unwrap();
}

#[test]
fn exceeding_the_maximum_fails_on_the_next_call() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    fx.calc("clear", vec![]);
    record.max_times(2).unwrap();
    record.end().unwrap();

    fx.calc("clear", vec![]);
    fx.calc("clear", vec![]);
    assert!(!fx.execution.has_pending_error());
    fx.calc("clear", vec![]);
    assert!(fx.execution.has_pending_error());
    assert!(matches!(
        fx.execution.end(),
        Err(MockError::UnexpectedInvocation {
            reason: UnexpectedReason::TooMany { max: 2 },
            ..
        })
    ));
}

#[test]
fn minimum_is_checked_at_end() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    fx.calc("name", vec![]);
    record.result("calc").unwrap().min_times(2).unwrap();
    record.end().unwrap();

    assert_eq!(fx.calc("name", vec![]), s("calc"));
    assert!(matches!(
        fx.execution.end(),
        Err(MockError::MissingInvocation { missing: 1, .. })
    ));
}

#[test]
fn later_equivalent_recording_wins() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    fx.calc("add", vec![1.into(), 2.into()]);
    record.result(3).unwrap().times(1).unwrap();
    fx.calc("add", vec![1.into(), 2.into()]);
    record.result(30).unwrap();
    record.end().unwrap();

    assert_eq!(fx.calc("add", vec![1.into(), 2.into()]), Value::Int(30));
    assert_eq!(fx.calc("add", vec![1.into(), 2.into()]), Value::Int(30));
    fx.execution.end().expect("superseded expectation is not checked");
}

#[test]
fn consecutive_results_repeat_the_last_one() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    fx.calc("count", vec![s("x")]);
    record.returns(vec![1.into(), 2.into(), 3.into()]).unwrap();
    record.end().unwrap();

    let seen: Vec<Value> = (0..4).map(|_| fx.calc("count", vec![s("x")])).collect();
    assert_eq!(seen, vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(3)]);
}

#[test]
fn sequence_value_for_single_valued_return_becomes_consecutive_results() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    fx.calc("count", vec![s("x")]);
    record.result(vec![Value::Int(4), Value::Int(5)]).unwrap();
    record.end().unwrap();

    assert_eq!(fx.calc("count", vec![s("x")]), Value::Int(4));
    assert_eq!(fx.calc("count", vec![s("x")]), Value::Int(5));
}

#[test]
fn values_for_multi_valued_return_are_gathered() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    fx.calc("history", vec![]);
    record.returns(vec![1.into(), 2.into()]).unwrap();
    record.end().unwrap();

    let expected = Value::List(vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(fx.calc("history", vec![]), expected);
    assert_eq!(fx.calc("history", vec![]), expected);
}

#[test]
fn unrecorded_calls_get_zero_values() {
    let fx = Fixture::new();
    assert_eq!(fx.calc("add", vec![1.into(), 2.into()]), Value::Int(0));
    assert_eq!(fx.calc("history", vec![]), Value::List(vec![]));
    assert_eq!(fx.calc("name", vec![]), s(""));
    assert_eq!(fx.db("connect", vec![s("x")]), Value::Bool(false));
    fx.execution.end().unwrap();
}

#[test]
fn loose_type_is_non_strict_inside_a_strict_block() {
    let fx = Fixture::new();
    let article = MockHandle::declare_loose(&fx.execution, &ARTICLE).unwrap();
    let record = fx.execution.record().unwrap();
    article.value(&fx.execution, "title", vec![]).unwrap();
    record.result("Rust").unwrap();
    record.end().unwrap();

    assert_eq!(article.value(&fx.execution, "word_count", vec![]).unwrap(), Value::Int(0));
    fx.execution.end().expect("loose expectations have no minimum");
}

#[test]
fn matchers_and_literals_mix() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    record.with_at(0, ArgMatcher::Any);
    fx.calc("add", vec![0.into(), 2.into()]);
    record.result(42).unwrap();
    record.end().unwrap();

    assert_eq!(fx.calc("add", vec![7.into(), 2.into()]), Value::Int(42));
    assert_eq!(fx.calc("add", vec![7.into(), 3.into()]), Value::Int(0));
}

#[test]
fn text_matchers() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    record.with(ArgMatcher::StartsWith("SELECT".into()));
    fx.db("query", vec![Value::Null]);
    record.result(vec![s("row")]).unwrap();
    record.with(ArgMatcher::regex(r"^mem://\w+$").unwrap());
    fx.db("connect", vec![Value::Null]);
    record.result(true).unwrap();
    record.end().unwrap();

    assert_eq!(
        fx.db("query", vec![s("SELECT * FROM t")]),
        Value::List(vec![s("row")])
    );
    assert_eq!(fx.db("query", vec![s("DELETE FROM t")]), Value::List(vec![]));
    assert_eq!(fx.db("connect", vec![s("mem://main")]), Value::Bool(true));
    assert_eq!(fx.db("connect", vec![s("file://main")]), Value::Bool(false));
}

#[test]
fn numeric_tolerance_and_predicates() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    record
        .with(ArgMatcher::Near {
            expected: 1.0,
            tolerance: 0.01,
        })
        .with(ArgMatcher::predicate("non-zero", |v| v.as_f64().is_some_and(|d| d != 0.0)));
    fx.calc("divide", vec![0.0.into(), 0.0.into()]);
    record.result(0.5).unwrap();
    record.end().unwrap();

    assert_eq!(fx.calc("divide", vec![1.005.into(), 2.0.into()]), Value::Double(0.5));
    assert_eq!(fx.calc("divide", vec![1.005.into(), 0.0.into()]), Value::Double(0.0));
}

#[test]
fn captures_record_replayed_arguments() {
    let fx = Fixture::new();
    let captured = Captured::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    record.with(ArgMatcher::Capture(captured.clone()));
    fx.calc("count", vec![Value::Null]);
    record.end().unwrap();

    fx.calc("count", vec![s("a")]);
    fx.calc("count", vec![s("b")]);
    assert_eq!(captured.values(), vec![s("a"), s("b")]);
}

#[test]
fn staged_matchers_without_invocation_fail_the_block() {
    let fx = Fixture::new();
    let record = fx.execution.record().unwrap();
    record.with(ArgMatcher::Any);
    assert!(matches!(record.end(), Err(MockError::IllegalState(_))));
}

#[test]
fn varargs_accept_matchers_for_every_element() {
    let fx = Fixture::new();
    let record = fx.execution.record_with(Strictness::NonStrict).unwrap();
    record.with(ArgMatcher::Any).with(ArgMatcher::Any);
    fx.calc("sum", vec![Value::Array(vec![0.into(), 0.into()])]);
    record.result(9_i64).unwrap();
    record.end().unwrap();

    assert_eq!(
        fx.calc("sum", vec![Value::Array(vec![4.into(), 5.into()])]),
        Value::Long(9)
    );
    assert_eq!(
        fx.calc("sum", vec![Value::Array(vec![4.into()])]),
        Value::Long(0),
        "arity of the variadic part must match"
    );
}

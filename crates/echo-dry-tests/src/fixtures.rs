// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fake mocked types.
//!
//! Each [`FakeType`] lists the method descriptors an interception layer
//! would report for it. [`MockHandle`] pairs a declared instance with those
//! descriptors so tests can invoke methods by name.

use std::collections::HashMap;
use std::sync::Arc;

use echo_mock::{
    Execution, ExecutionMode, Invocation, MethodSignature, MockError, MockedType, ObjectRef, Raised,
    Reply, Value,
};

/// A mocked type known by its name and method descriptors.
#[derive(Debug, Clone, Copy)]
pub struct FakeType {
    /// Type name.
    pub name: &'static str,
    /// Method descriptors.
    pub methods: &'static [&'static str],
}

/// A calculator with value, sequence, void, variadic and cascading methods.
pub const CALCULATOR: FakeType = FakeType {
    name: "Calculator",
    methods: &[
        "add(i32, i32) -> i32",
        "count(str) -> i32",
        "divide(f64, f64) -> f64",
        "name() -> str",
        "history() -> list<i32>",
        "sum(i32...) -> i64",
        "clear()",
        "memory() -> Memory",
    ],
};

/// A database connection, with a constructor.
pub const DATABASE: FakeType = FakeType {
    name: "Database",
    methods: &[
        "<init>(str)",
        "connect(str) -> bool",
        "query(str) -> list<str>",
        "next_id() -> i64",
        "find(str) -> Article",
        "save(Article)",
        "close()",
    ],
};

/// An article, for collection and map results.
pub const ARTICLE: FakeType = FakeType {
    name: "Article",
    methods: &[
        "<init>()",
        "title() -> str",
        "set_title(str)",
        "tags() -> set<str>",
        "metadata() -> map<str, str>",
        "word_count() -> i32",
    ],
};

/// A declared mock instance and the parsed signatures of its type.
#[derive(Debug, Clone)]
pub struct MockHandle {
    instance: ObjectRef,
    methods: HashMap<String, Arc<MethodSignature>>,
}

impl MockHandle {
    /// Declares `ty` on `execution`.
    pub fn declare(execution: &Execution, ty: &FakeType) -> Result<Self, MockError> {
        Self::declare_as(execution, ty, MockedType::new(ty.name))
    }

    /// Declares `ty` as loose: expectations on it are never strict.
    pub fn declare_loose(execution: &Execution, ty: &FakeType) -> Result<Self, MockError> {
        Self::declare_as(execution, ty, MockedType::new(ty.name).loose())
    }

    fn declare_as(execution: &Execution, ty: &FakeType, mocked: MockedType) -> Result<Self, MockError> {
        let instance = execution.declare(mocked)?;
        Ok(Self {
            instance,
            methods: parse_methods(ty)?,
        })
    }

    /// Wraps an instance that was not declared, such as a cascaded one or
    /// one created by code under test.
    pub fn wrap(instance: ObjectRef, ty: &FakeType) -> Result<Self, MockError> {
        Ok(Self {
            instance,
            methods: parse_methods(ty)?,
        })
    }

    /// The mock instance.
    pub fn instance(&self) -> &ObjectRef {
        &self.instance
    }

    /// An invocation of `method` (by name) with `args`.
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Invocation, MockError> {
        let signature = self
            .methods
            .get(method)
            .ok_or_else(|| MockError::IllegalArgument(format!("{} has no method {method}", self.instance.type_name())))?;
        Ok(Invocation::new(
            Some(self.instance.clone()),
            self.instance.type_name().clone(),
            Arc::clone(signature),
            args,
        ))
    }

    /// Invokes `method` through `execution`.
    pub fn invoke(&self, execution: &Execution, method: &str, args: Vec<Value>) -> Result<Reply, Raised> {
        execution.record_or_replay(&self.call(method, args)?)
    }

    /// Invokes `method` through `execution` in partial mode.
    pub fn invoke_partial(&self, execution: &Execution, method: &str, args: Vec<Value>) -> Result<Reply, Raised> {
        let call = self.call(method, args)?.with_mode(ExecutionMode::Partial);
        execution.record_or_replay(&call)
    }

    /// Invokes `method` and returns the produced value, treating
    /// [`Reply::ExecuteReal`] as [`Value::Null`].
    pub fn value(&self, execution: &Execution, method: &str, args: Vec<Value>) -> Result<Value, Raised> {
        Ok(self.invoke(execution, method, args)?.into_value().unwrap_or(Value::Null))
    }
}

fn parse_methods(ty: &FakeType) -> Result<HashMap<String, Arc<MethodSignature>>, MockError> {
    ty.methods
        .iter()
        .map(|descriptor| {
            let signature = MethodSignature::parse(descriptor)
                .map_err(|e| MockError::IllegalArgument(e.to_string()))?;
            Ok((signature.name().to_string(), Arc::new(signature)))
        })
        .collect()
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Invocation builder.
//!
//! # Example
//!
//! ```
//! use echo_dry_tests::InvocationBuilder;
//! use echo_mock::{InstanceId, ObjectRef, Value};
//!
//! let calc = ObjectRef::new(InstanceId(1), "Calculator");
//! let call = InvocationBuilder::on(&calc)
//!     .method("add(i32, i32) -> i32")
//!     .arg(1)
//!     .arg(2)
//!     .build()
//!     .unwrap();
//! assert_eq!(call.args, vec![Value::Int(1), Value::Int(2)]);
//! ```

use echo_mock::{AccessFlags, ExecutionMode, Invocation, MockError, ObjectRef, TypeName, Value};

/// Builder for [`Invocation`] values in tests.
///
/// All methods take `self` by value and return `Self` for chaining.
#[derive(Debug, Clone)]
pub struct InvocationBuilder {
    instance: Option<ObjectRef>,
    class: TypeName,
    method: String,
    generic: Option<String>,
    mode: ExecutionMode,
    args: Vec<Value>,
}

impl InvocationBuilder {
    /// A call on `instance`.
    pub fn on(instance: &ObjectRef) -> Self {
        Self {
            instance: Some(instance.clone()),
            class: instance.type_name().clone(),
            method: String::new(),
            generic: None,
            mode: ExecutionMode::Regular,
            args: Vec::new(),
        }
    }

    /// A static call on `class`.
    pub fn on_type(class: impl Into<TypeName>) -> Self {
        Self {
            instance: None,
            class: class.into(),
            method: String::new(),
            generic: None,
            mode: ExecutionMode::Regular,
            args: Vec::new(),
        }
    }

    /// The method descriptor, such as `add(i32, i32) -> i32`.
    pub fn method(mut self, descriptor: &str) -> Self {
        self.method = descriptor.to_string();
        self
    }

    /// Appends one argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Appends several arguments.
    pub fn args(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.args.extend(values);
        self
    }

    /// Overrides the declared return type.
    pub fn generic_return(mut self, descriptor: &str) -> Self {
        self.generic = Some(descriptor.to_string());
        self
    }

    /// The call may run the real implementation.
    pub fn partial(mut self) -> Self {
        self.mode = ExecutionMode::Partial;
        self
    }

    /// Parses the descriptors and validates the call.
    pub fn build(self) -> Result<Invocation, MockError> {
        let access = if self.instance.is_some() {
            AccessFlags::PUBLIC
        } else {
            AccessFlags::PUBLIC.union(AccessFlags::STATIC)
        };
        Invocation::from_descriptors(
            self.instance,
            access,
            self.class.as_str(),
            &self.method,
            self.generic.as_deref(),
            self.mode,
            self.args,
        )
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use echo_mock::{InstanceId, TypeDesc};

    #[test]
    fn static_calls_carry_the_static_flag() {
        let call = InvocationBuilder::on_type("Clock")
            .method("now() -> i64")
            .build()
            .unwrap();
        assert!(call.access.is_static());
        assert!(call.instance.is_none());
    }

    #[test]
    fn generic_return_overrides_declared_type() {
        let repo = ObjectRef::new(InstanceId(7), "Repository");
        let call = InvocationBuilder::on(&repo)
            .method("find(str) -> any")
            .generic_return("Article")
            .arg("a-1")
            .build()
            .unwrap();
        assert_eq!(call.return_type(), &TypeDesc::Object(TypeName::new("Article")));
    }

    #[test]
    fn malformed_descriptor_is_illegal_argument() {
        let repo = ObjectRef::new(InstanceId(7), "Repository");
        let err = InvocationBuilder::on(&repo).method("find(str").build().unwrap_err();
        assert!(matches!(err, MockError::IllegalArgument(_)));
    }
}

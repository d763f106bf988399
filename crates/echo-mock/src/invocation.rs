// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Intercepted invocations and their replies.

use std::fmt;
use std::sync::Arc;

use crate::error::MockError;
use crate::signature::{MethodSignature, TypeDesc};
use crate::value::{ObjectRef, TypeName, Value};

/// Access modifiers of the intercepted method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AccessFlags(u32);

impl AccessFlags {
    /// `public`.
    pub const PUBLIC: Self = Self(0x0001);
    /// `private`.
    pub const PRIVATE: Self = Self(0x0002);
    /// `protected`.
    pub const PROTECTED: Self = Self(0x0004);
    /// Static: no receiving instance.
    pub const STATIC: Self = Self(0x0008);
    /// `final`.
    pub const FINAL: Self = Self(0x0010);

    /// Builds flags from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of both flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True for static methods.
    pub const fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }
}

/// How unrecorded invocations on the target should behave.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Fully mocked: unrecorded invocations yield defaults.
    #[default]
    Regular,
    /// Partially mocked: unrecorded invocations run the real code.
    Partial,
}

/// One intercepted call.
#[derive(Clone, Debug)]
pub struct Invocation {
    /// Receiving instance; `None` for static methods.
    pub instance: Option<ObjectRef>,
    /// Access modifiers.
    pub access: AccessFlags,
    /// Declaring type.
    pub class: TypeName,
    /// Parsed method signature.
    pub method: Arc<MethodSignature>,
    /// Generic return type, overriding the erased one in `method`.
    pub generic_return: Option<TypeDesc>,
    /// Execution mode of the target.
    pub mode: ExecutionMode,
    /// Actual arguments; a variadic argument is a [`Value::Array`].
    pub args: Vec<Value>,
}

impl Invocation {
    /// Creates a regular, public invocation.
    pub fn new(
        instance: Option<ObjectRef>,
        class: impl Into<TypeName>,
        method: Arc<MethodSignature>,
        args: Vec<Value>,
    ) -> Self {
        let access = if instance.is_none() {
            AccessFlags::PUBLIC.union(AccessFlags::STATIC)
        } else {
            AccessFlags::PUBLIC
        };
        Self {
            instance,
            access,
            class: class.into(),
            method,
            generic_return: None,
            mode: ExecutionMode::Regular,
            args,
        }
    }

    /// Builds an invocation from textual descriptors, as an interception
    /// layer sees them.
    pub fn from_descriptors(
        instance: Option<ObjectRef>,
        access: AccessFlags,
        class_desc: &str,
        method_desc: &str,
        generic_signature: Option<&str>,
        mode: ExecutionMode,
        args: Vec<Value>,
    ) -> Result<Self, MockError> {
        let class = class_desc.trim();
        if class.is_empty() {
            return Err(MockError::illegal_argument("empty class descriptor"));
        }
        let method = MethodSignature::parse(method_desc)
            .map_err(|e| MockError::illegal_argument(e.to_string()))?;
        let generic_return = generic_signature
            .map(TypeDesc::parse)
            .transpose()
            .map_err(|e| MockError::illegal_argument(e.to_string()))?;
        let invocation = Self {
            instance,
            access,
            class: TypeName::new(class),
            method: Arc::new(method),
            generic_return,
            mode,
            args,
        };
        invocation.validate()?;
        Ok(invocation)
    }

    /// Sets the execution mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the access flags.
    #[must_use]
    pub fn with_access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    /// Overrides the return type with a generic one.
    #[must_use]
    pub fn with_generic_return(mut self, ty: TypeDesc) -> Self {
        self.generic_return = Some(ty);
        self
    }

    /// Effective return type.
    pub fn return_type(&self) -> &TypeDesc {
        self.generic_return
            .as_ref()
            .unwrap_or_else(|| self.method.returns())
    }

    /// True for constructor invocations.
    pub fn is_constructor(&self) -> bool {
        self.method.is_constructor()
    }

    /// Checks arity and receiver against the signature.
    pub fn validate(&self) -> Result<(), MockError> {
        if self.access.is_static() == self.instance.is_some() {
            return Err(MockError::illegal_argument(format!(
                "{}#{}: static methods take no instance and instance methods need one",
                self.class, self.method
            )));
        }
        let params = self.method.params();
        if self.args.len() != params.len() {
            return Err(MockError::illegal_argument(format!(
                "{}#{} takes {} argument(s), got {}",
                self.class,
                self.method,
                params.len(),
                self.args.len()
            )));
        }
        if self.method.is_varargs() {
            if let Some(last) = self.args.last() {
                if !matches!(last, Value::Array(_) | Value::Null) {
                    return Err(MockError::illegal_argument(format!(
                        "variadic argument of {}#{} must be an array",
                        self.class, self.method
                    )));
                }
            }
        }
        Ok(())
    }

    /// `Type#method(..) -> R` without arguments.
    pub fn describe_method(&self) -> String {
        format!("{}#{}", self.class, self.method)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class, self.method)?;
        if let Some(instance) = &self.instance {
            write!(f, " on {instance}")?;
        }
        f.write_str(" with (")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

/// What the interception layer should do with a call.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Return this value to the caller.
    Return(Value),
    /// Run the real implementation.
    ExecuteReal,
}

impl Reply {
    /// The returned value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Return(v) => Some(v),
            Self::ExecuteReal => None,
        }
    }

    /// Consumes the reply and yields the returned value, if any.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Return(v) => Some(v),
            Self::ExecuteReal => None,
        }
    }
}

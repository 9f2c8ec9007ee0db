//! Dynamically typed values carried through attribute and operation calls.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use mantle_object_name::ObjectName;

/// Type names used in signatures, attribute types and return types.
pub mod types {
	pub const VOID: &str = "void";
	pub const BOOLEAN: &str = "boolean";
	pub const INT: &str = "int";
	pub const LONG: &str = "long";
	pub const DOUBLE: &str = "double";
	pub const STRING: &str = "string";
	pub const OBJECT_NAME: &str = "objectname";
	pub const LIST: &str = "list";
	pub const OBJECT: &str = "object";

	/// Primitive types reject [`crate::Value::Null`].
	pub fn is_primitive(type_name: &str) -> bool {
		matches!(type_name, BOOLEAN | INT | LONG | DOUBLE)
	}
}

/// A value passed to or returned from a managed object.
#[derive(Clone, Default)]
pub enum Value {
	#[default]
	Null,
	Bool(bool),
	Int(i32),
	Long(i64),
	Double(f64),
	Str(String),
	Name(ObjectName),
	List(Vec<Value>),
	/// Arbitrary shared payload. Compared by identity.
	Opaque(Arc<dyn Any + Send + Sync>),
}

impl Value {
	pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
		Self::Opaque(Arc::new(value))
	}

	/// Type name of this value; `Null` reports `object`.
	pub fn type_name(&self) -> &'static str {
		match self {
			Self::Null | Self::Opaque(_) => types::OBJECT,
			Self::Bool(_) => types::BOOLEAN,
			Self::Int(_) => types::INT,
			Self::Long(_) => types::LONG,
			Self::Double(_) => types::DOUBLE,
			Self::Str(_) => types::STRING,
			Self::Name(_) => types::OBJECT_NAME,
			Self::List(_) => types::LIST,
		}
	}

	/// Returns true if this value may be passed where `type_name` is declared.
	pub fn conforms_to(&self, type_name: &str) -> bool {
		match (self, type_name) {
			(_, types::OBJECT) => true,
			(_, types::VOID) => matches!(self, Self::Null),
			(Self::Null, t) => !types::is_primitive(t),
			(Self::Int(_), types::LONG) => true,
			(v, t) => v.type_name() == t,
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_int(&self) -> Option<i32> {
		match self {
			Self::Int(i) => Some(*i),
			_ => None,
		}
	}

	/// Widens `Int` to `i64`.
	pub fn as_long(&self) -> Option<i64> {
		match self {
			Self::Int(i) => Some(i64::from(*i)),
			Self::Long(l) => Some(*l),
			_ => None,
		}
	}

	pub fn as_double(&self) -> Option<f64> {
		match self {
			Self::Double(d) => Some(*d),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_name(&self) -> Option<&ObjectName> {
		match self {
			Self::Name(n) => Some(n),
			_ => None,
		}
	}

	pub fn as_list(&self) -> Option<&[Value]> {
		match self {
			Self::List(items) => Some(items),
			_ => None,
		}
	}

	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		match self {
			Self::Opaque(any) => any.downcast_ref(),
			_ => None,
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Null, Self::Null) => true,
			(Self::Bool(a), Self::Bool(b)) => a == b,
			(Self::Int(a), Self::Int(b)) => a == b,
			(Self::Long(a), Self::Long(b)) => a == b,
			(Self::Double(a), Self::Double(b)) => a == b,
			(Self::Str(a), Self::Str(b)) => a == b,
			(Self::Name(a), Self::Name(b)) => a == b,
			(Self::List(a), Self::List(b)) => a == b,
			(Self::Opaque(a), Self::Opaque(b)) => Arc::ptr_eq(a, b),
			_ => false,
		}
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Null => f.write_str("Null"),
			Self::Bool(b) => write!(f, "Bool({b})"),
			Self::Int(i) => write!(f, "Int({i})"),
			Self::Long(l) => write!(f, "Long({l})"),
			Self::Double(d) => write!(f, "Double({d})"),
			Self::Str(s) => write!(f, "Str({s:?})"),
			Self::Name(n) => write!(f, "Name({n})"),
			Self::List(items) => f.debug_tuple("List").field(items).finish(),
			Self::Opaque(_) => f.write_str("Opaque(..)"),
		}
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Self::Bool(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Self::Int(v)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Self::Long(v)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Self::Double(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Self::Str(v.to_owned())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Self::Str(v)
	}
}

impl From<ObjectName> for Value {
	fn from(v: ObjectName) -> Self {
		Self::Name(v)
	}
}

impl From<Vec<Value>> for Value {
	fn from(v: Vec<Value>) -> Self {
		Self::List(v)
	}
}

//! Query expressions filtering `query_names` / `query_mbeans` results.
//!
//! An expression that fails to evaluate for a name (missing attribute,
//! permission denied, target error) is treated as not matching that name.

use mantle_object_name::ObjectName;

use crate::server::MBeanServer;
use crate::{Result, Value};

pub trait QueryExp: Send + Sync {
	fn apply(&self, server: &MBeanServer, name: &ObjectName) -> Result<bool>;
}

impl<F> QueryExp for F
where
	F: Fn(&MBeanServer, &ObjectName) -> Result<bool> + Send + Sync,
{
	fn apply(&self, server: &MBeanServer, name: &ObjectName) -> Result<bool> {
		self(server, name)
	}
}

pub struct AttributeEquals {
	attribute: String,
	value: Value,
}

impl QueryExp for AttributeEquals {
	fn apply(&self, server: &MBeanServer, name: &ObjectName) -> Result<bool> {
		Ok(server.get_attribute(name, &self.attribute)? == self.value)
	}
}

pub struct ClassNameEquals(String);

impl QueryExp for ClassNameEquals {
	fn apply(&self, server: &MBeanServer, name: &ObjectName) -> Result<bool> {
		Ok(server.get_object_instance(name)?.class_name == self.0)
	}
}

pub struct InstanceOf(String);

impl QueryExp for InstanceOf {
	fn apply(&self, server: &MBeanServer, name: &ObjectName) -> Result<bool> {
		server.is_instance_of(name, &self.0)
	}
}

pub struct And(Box<dyn QueryExp>, Box<dyn QueryExp>);

impl QueryExp for And {
	fn apply(&self, server: &MBeanServer, name: &ObjectName) -> Result<bool> {
		Ok(self.0.apply(server, name)? && self.1.apply(server, name)?)
	}
}

pub struct Or(Box<dyn QueryExp>, Box<dyn QueryExp>);

impl QueryExp for Or {
	fn apply(&self, server: &MBeanServer, name: &ObjectName) -> Result<bool> {
		Ok(self.0.apply(server, name)? || self.1.apply(server, name)?)
	}
}

pub struct Not(Box<dyn QueryExp>);

impl QueryExp for Not {
	fn apply(&self, server: &MBeanServer, name: &ObjectName) -> Result<bool> {
		Ok(!self.0.apply(server, name)?)
	}
}

/// Matches objects whose `attribute` currently equals `value`.
pub fn attr_eq(attribute: impl Into<String>, value: impl Into<Value>) -> AttributeEquals {
	AttributeEquals {
		attribute: attribute.into(),
		value: value.into(),
	}
}

/// Matches objects registered with exactly this class name.
pub fn class_name_eq(class_name: impl Into<String>) -> ClassNameEquals {
	ClassNameEquals(class_name.into())
}

/// Matches objects whose class is, or declares it implements, `type_name`.
pub fn instance_of(type_name: impl Into<String>) -> InstanceOf {
	InstanceOf(type_name.into())
}

pub fn and(lhs: impl QueryExp + 'static, rhs: impl QueryExp + 'static) -> And {
	And(Box::new(lhs), Box::new(rhs))
}

pub fn or(lhs: impl QueryExp + 'static, rhs: impl QueryExp + 'static) -> Or {
	Or(Box::new(lhs), Box::new(rhs))
}

pub fn not(inner: impl QueryExp + 'static) -> Not {
	Not(Box::new(inner))
}

/// Wraps a closure so its argument types are inferred from the query signature.
pub fn predicate<F>(f: F) -> F
where
	F: Fn(&MBeanServer, &ObjectName) -> Result<bool> + Send + Sync,
{
	f
}

//! Plain-data metadata describing a managed object's management interface.
//!
//! These types carry no behavior. [`ManagementInfo`] values handed out by the
//! server are snapshots assembled from the live invocation contexts, so they
//! reflect descriptor and interceptor changes made after registration.

use mantle_object_name::ObjectName;

use crate::{Descriptor, Value};

/// Describes one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
	pub name: String,
	pub type_name: String,
	pub description: String,
	pub readable: bool,
	pub writable: bool,
	pub descriptor: Descriptor,
	/// Names of the interceptors currently in this attribute's chain, outermost first.
	pub interceptors: Vec<String>,
}

/// Expected effect of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Impact {
	Info,
	Action,
	ActionInfo,
	#[default]
	Unknown,
}

/// Describes one parameter of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
	pub name: String,
	pub type_name: String,
	pub description: String,
}

/// Describes one operation overload.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationInfo {
	pub name: String,
	pub parameters: Vec<ParameterInfo>,
	pub return_type: String,
	pub description: String,
	pub impact: Impact,
	pub descriptor: Descriptor,
	pub interceptors: Vec<String>,
}

impl OperationInfo {
	/// Parameter type names in declaration order.
	pub fn signature(&self) -> Vec<String> {
		self.parameters.iter().map(|p| p.type_name.clone()).collect()
	}
}

/// Describes a family of notifications a managed object may emit.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationInfo {
	pub types: Vec<String>,
	pub name: String,
	pub description: String,
	pub descriptor: Descriptor,
}

impl NotificationInfo {
	pub fn new<I, S>(types: I, name: impl Into<String>, description: impl Into<String>) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			types: types.into_iter().map(Into::into).collect(),
			name: name.into(),
			description: description.into(),
			descriptor: Descriptor::new(),
		}
	}
}

/// Full management interface snapshot of one managed object.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagementInfo {
	pub class_name: String,
	pub description: String,
	pub attributes: Vec<AttributeInfo>,
	pub operations: Vec<OperationInfo>,
	pub notifications: Vec<NotificationInfo>,
	pub descriptor: Descriptor,
}

impl ManagementInfo {
	pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
		self.attributes.iter().find(|a| a.name == name)
	}

	pub fn operations_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a OperationInfo> + 'a {
		self.operations.iter().filter(move |o| o.name == name)
	}
}

/// A registered name together with the class of the object behind it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectInstance {
	pub name: ObjectName,
	pub class_name: String,
}

/// Attribute name and value, as used by batch get/set.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
	pub name: String,
	pub value: Value,
}

impl Attribute {
	pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
		}
	}
}

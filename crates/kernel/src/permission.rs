//! Access checks performed by the server before sensitive operations.

use std::fmt;

use mantle_object_name::ObjectName;

use crate::{ManagementError, Result};

/// The operation a caller is attempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
	GetAttribute,
	SetAttribute,
	Invoke,
	RegisterMBean,
	UnregisterMBean,
	InstantiateMBean,
	QueryNames,
	QueryMBeans,
	GetMBeanInfo,
	GetObjectInstance,
	IsInstanceOf,
	AddNotificationListener,
	RemoveNotificationListener,
	GetContextLoader,
	EditInterceptors,
	SetDescriptor,
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::GetAttribute => "getAttribute",
			Self::SetAttribute => "setAttribute",
			Self::Invoke => "invoke",
			Self::RegisterMBean => "registerMBean",
			Self::UnregisterMBean => "unregisterMBean",
			Self::InstantiateMBean => "instantiate",
			Self::QueryNames => "queryNames",
			Self::QueryMBeans => "queryMBeans",
			Self::GetMBeanInfo => "getMBeanInfo",
			Self::GetObjectInstance => "getObjectInstance",
			Self::IsInstanceOf => "isInstanceOf",
			Self::AddNotificationListener => "addNotificationListener",
			Self::RemoveNotificationListener => "removeNotificationListener",
			Self::GetContextLoader => "getClassLoaderFor",
			Self::EditInterceptors => "editInterceptors",
			Self::SetDescriptor => "setDescriptor",
		})
	}
}

/// What a permission check is asked about. Absent parts are wildcards.
#[derive(Debug, Clone, Copy)]
pub struct PermissionRequest<'a> {
	pub class_name: Option<&'a str>,
	pub member: Option<&'a str>,
	pub name: Option<&'a ObjectName>,
	pub action: Action,
}

impl<'a> PermissionRequest<'a> {
	pub fn new(action: Action) -> Self {
		Self {
			class_name: None,
			member: None,
			name: None,
			action,
		}
	}

	pub fn class_name(mut self, class_name: &'a str) -> Self {
		self.class_name = Some(class_name);
		self
	}

	pub fn member(mut self, member: &'a str) -> Self {
		self.member = Some(member);
		self
	}

	pub fn name(mut self, name: &'a ObjectName) -> Self {
		self.name = Some(name);
		self
	}

	/// The denial error for this request.
	pub fn deny(&self) -> ManagementError {
		let target = match (self.name, self.member) {
			(Some(name), Some(member)) => format!("{name}#{member}"),
			(Some(name), None) => name.to_string(),
			(None, Some(member)) => member.to_owned(),
			(None, None) => self.class_name.unwrap_or("*").to_owned(),
		};
		ManagementError::PermissionDenied {
			action: self.action,
			target,
		}
	}
}

/// Decides whether a request may proceed.
pub trait PermissionChecker: Send + Sync {
	fn check(&self, request: &PermissionRequest<'_>) -> Result<()>;
}

impl<F> PermissionChecker for F
where
	F: Fn(&PermissionRequest<'_>) -> bool + Send + Sync,
{
	fn check(&self, request: &PermissionRequest<'_>) -> Result<()> {
		if self(request) { Ok(()) } else { Err(request.deny()) }
	}
}

/// Grants every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
	fn check(&self, _: &PermissionRequest<'_>) -> Result<()> {
		Ok(())
	}
}

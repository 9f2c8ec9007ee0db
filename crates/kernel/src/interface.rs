//! Explicit management interfaces.
//!
//! A managed resource describes itself once, at registration time, with a
//! [`ManagementInterface`]: a manifest of attributes and operations whose
//! accessors are already bound to the resource. The invoker turns that
//! manifest into invocation contexts, so no member lookup happens per call.

use std::sync::Arc;

use mantle_object_name::ObjectName;

use crate::info::{Impact, NotificationInfo, ParameterInfo};
use crate::notification::NotificationBroadcaster;
use crate::server::MBeanServer;
use crate::{Descriptor, TargetError, Value};

pub type Getter = Arc<dyn Fn() -> Result<Value, TargetError> + Send + Sync>;
pub type Setter = Arc<dyn Fn(Value) -> Result<(), TargetError> + Send + Sync>;
pub type OperationHandler = Arc<dyn Fn(&[Value]) -> Result<Value, TargetError> + Send + Sync>;

/// An object that can be registered with an [`MBeanServer`].
pub trait ManagedResource: Send + Sync + 'static {
	/// Builds the management interface, binding accessors to this instance.
	fn interface(self: Arc<Self>) -> ManagementInterface;

	/// Registration hooks, if the resource wants to take part in its own
	/// registration.
	fn lifecycle(&self) -> Option<&dyn RegistrationLifecycle> {
		None
	}

	/// Notification support, if the resource emits notifications.
	fn broadcaster(&self) -> Option<&dyn NotificationBroadcaster> {
		None
	}
}

/// Hooks run around registration and unregistration.
///
/// Every hook runs with the resource's context loader installed and never
/// while the registry lock is held, so hooks may call back into the server.
pub trait RegistrationLifecycle: Send + Sync {
	/// May veto registration, or choose the name when the caller supplied
	/// none. `Ok(None)` keeps the proposed name.
	fn pre_register(&self, server: &MBeanServer, name: Option<&ObjectName>) -> Result<Option<ObjectName>, TargetError> {
		let _ = (server, name);
		Ok(None)
	}

	/// Called with `true` before the entry becomes visible; an error rolls the
	/// registration back. Called with `false` after a failed registration,
	/// where errors are only logged.
	fn post_register(&self, registered: bool) -> Result<(), TargetError> {
		let _ = registered;
		Ok(())
	}

	/// An error aborts the unregistration and leaves the entry in place.
	fn pre_deregister(&self) -> Result<(), TargetError> {
		Ok(())
	}

	/// Errors are logged; the entry is already gone.
	fn post_deregister(&self) -> Result<(), TargetError> {
		Ok(())
	}
}

/// One attribute of a management interface.
pub struct AttributeDef {
	pub(crate) name: String,
	pub(crate) type_name: String,
	pub(crate) description: String,
	pub(crate) descriptor: Descriptor,
	pub(crate) getter: Option<Getter>,
	pub(crate) setter: Option<Setter>,
}

impl AttributeDef {
	pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			type_name: type_name.into(),
			description: String::new(),
			descriptor: Descriptor::new(),
			getter: None,
			setter: None,
		}
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = description.into();
		self
	}

	pub fn descriptor(mut self, descriptor: Descriptor) -> Self {
		self.descriptor = descriptor;
		self
	}

	/// Makes the attribute readable.
	pub fn getter<F>(mut self, getter: F) -> Self
	where
		F: Fn() -> Result<Value, TargetError> + Send + Sync + 'static,
	{
		self.getter = Some(Arc::new(getter));
		self
	}

	/// Makes the attribute writable.
	pub fn setter<F>(mut self, setter: F) -> Self
	where
		F: Fn(Value) -> Result<(), TargetError> + Send + Sync + 'static,
	{
		self.setter = Some(Arc::new(setter));
		self
	}

	pub fn is_readable(&self) -> bool {
		self.getter.is_some()
	}

	pub fn is_writable(&self) -> bool {
		self.setter.is_some()
	}
}

/// One operation overload of a management interface.
pub struct OperationDef {
	pub(crate) name: String,
	pub(crate) parameters: Vec<ParameterInfo>,
	pub(crate) return_type: String,
	pub(crate) description: String,
	pub(crate) impact: Impact,
	pub(crate) descriptor: Descriptor,
	pub(crate) handler: OperationHandler,
}

impl OperationDef {
	pub fn new<F>(name: impl Into<String>, return_type: impl Into<String>, handler: F) -> Self
	where
		F: Fn(&[Value]) -> Result<Value, TargetError> + Send + Sync + 'static,
	{
		Self {
			name: name.into(),
			parameters: Vec::new(),
			return_type: return_type.into(),
			description: String::new(),
			impact: Impact::Unknown,
			descriptor: Descriptor::new(),
			handler: Arc::new(handler),
		}
	}

	/// Appends a parameter; order defines the signature.
	pub fn param(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
		self.parameters.push(ParameterInfo {
			name: name.into(),
			type_name: type_name.into(),
			description: String::new(),
		});
		self
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = description.into();
		self
	}

	pub fn impact(mut self, impact: Impact) -> Self {
		self.impact = impact;
		self
	}

	pub fn descriptor(mut self, descriptor: Descriptor) -> Self {
		self.descriptor = descriptor;
		self
	}

	pub fn signature(&self) -> Vec<String> {
		self.parameters.iter().map(|p| p.type_name.clone()).collect()
	}
}

/// Manifest of everything a resource exposes for management.
pub struct ManagementInterface {
	pub(crate) class_name: String,
	pub(crate) description: String,
	pub(crate) supertypes: Vec<String>,
	pub(crate) attributes: Vec<AttributeDef>,
	pub(crate) operations: Vec<OperationDef>,
	pub(crate) notifications: Vec<NotificationInfo>,
	pub(crate) descriptor: Descriptor,
}

impl ManagementInterface {
	pub fn new(class_name: impl Into<String>) -> Self {
		Self {
			class_name: class_name.into(),
			description: String::new(),
			supertypes: Vec::new(),
			attributes: Vec::new(),
			operations: Vec::new(),
			notifications: Vec::new(),
			descriptor: Descriptor::new(),
		}
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = description.into();
		self
	}

	/// Declares an additional type name reported by `is_instance_of`.
	pub fn implements(mut self, type_name: impl Into<String>) -> Self {
		self.supertypes.push(type_name.into());
		self
	}

	pub fn attribute(mut self, attribute: AttributeDef) -> Self {
		self.attributes.push(attribute);
		self
	}

	pub fn operation(mut self, operation: OperationDef) -> Self {
		self.operations.push(operation);
		self
	}

	pub fn notification(mut self, notification: NotificationInfo) -> Self {
		self.notifications.push(notification);
		self
	}

	pub fn descriptor(mut self, descriptor: Descriptor) -> Self {
		self.descriptor = descriptor;
		self
	}

	pub fn class_name(&self) -> &str {
		&self.class_name
	}
}

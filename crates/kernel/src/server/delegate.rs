//! The server's own managed object.

use std::sync::Arc;

use mantle_object_name::ObjectName;

use crate::info::NotificationInfo;
use crate::interface::{AttributeDef, ManagedResource, ManagementInterface};
use crate::notification::{BroadcasterSupport, Notification, NotificationBroadcaster, NotificationSource};
use crate::value::types;
use crate::{TargetError, Value};

pub const DELEGATE_CLASS: &str = "MBeanServerDelegate";

/// Emitted after an object becomes visible.
pub const REGISTERED: &str = "JMX.mbean.registered";
/// Emitted after an object has been removed.
pub const UNREGISTERED: &str = "JMX.mbean.unregistered";

const SPECIFICATION_NAME: &str = "Java Management Extensions";
const SPECIFICATION_VERSION: &str = "1.2 Maintenance Release";
const IMPLEMENTATION_NAME: &str = "mantle";
const IMPLEMENTATION_VENDOR: &str = "mantle";

/// Identifies the server and announces registration changes.
pub struct ServerDelegate {
	name: ObjectName,
	server_id: String,
	support: BroadcasterSupport,
}

impl ServerDelegate {
	pub(crate) fn new(name: ObjectName, server_id: String) -> Self {
		Self {
			name,
			server_id,
			support: BroadcasterSupport::with_info(vec![registration_info()]),
		}
	}

	pub fn server_id(&self) -> &str {
		&self.server_id
	}

	pub(crate) fn announce(&self, kind: &'static str, affected: &ObjectName) {
		let notification = Notification::new(
			kind,
			NotificationSource::Name(self.name.clone()),
			self.support.next_sequence(),
			affected.canonical_name(),
		)
		.with_user_data(affected.clone());
		let delivered = self.support.send_notification(&notification);
		tracing::trace!(kind, name = %affected, delivered, "delegate notification sent");
	}
}

fn registration_info() -> NotificationInfo {
	NotificationInfo::new(
		[REGISTERED, UNREGISTERED],
		"MBeanServerNotification",
		"Registration changes in the server",
	)
}

fn constant(value: String) -> impl Fn() -> Result<Value, TargetError> + Send + Sync + 'static {
	move || Ok(Value::Str(value.clone()))
}

impl ManagedResource for ServerDelegate {
	fn interface(self: Arc<Self>) -> ManagementInterface {
		ManagementInterface::new(DELEGATE_CLASS)
			.description("Represents the management server from the management point of view")
			.attribute(
				AttributeDef::new("MBeanServerId", types::STRING)
					.description("Unique identifier of this server")
					.getter(constant(self.server_id.clone())),
			)
			.attribute(AttributeDef::new("SpecificationName", types::STRING).getter(constant(SPECIFICATION_NAME.to_owned())))
			.attribute(AttributeDef::new("SpecificationVersion", types::STRING).getter(constant(SPECIFICATION_VERSION.to_owned())))
			.attribute(AttributeDef::new("ImplementationName", types::STRING).getter(constant(IMPLEMENTATION_NAME.to_owned())))
			.attribute(
				AttributeDef::new("ImplementationVersion", types::STRING).getter(constant(env!("CARGO_PKG_VERSION").to_owned())),
			)
			.attribute(AttributeDef::new("ImplementationVendor", types::STRING).getter(constant(IMPLEMENTATION_VENDOR.to_owned())))
			.notification(registration_info())
	}

	fn broadcaster(&self) -> Option<&dyn NotificationBroadcaster> {
		Some(&self.support)
	}
}

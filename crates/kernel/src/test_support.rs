//! Managed resources shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use mantle_object_name::ObjectName;
use parking_lot::Mutex;

use crate::context;
use crate::info::{Impact, NotificationInfo};
use crate::interface::{AttributeDef, ManagedResource, ManagementInterface, OperationDef, RegistrationLifecycle};
use crate::notification::{BroadcasterSupport, Notification, NotificationBroadcaster, NotificationSource};
use crate::server::MBeanServer;
use crate::value::types;
use crate::{ServerConfig, TargetError, Value};

pub(crate) const ALARM: &str = "thermostat.alarm";

pub(crate) fn name(s: &str) -> ObjectName {
	ObjectName::parse(s).unwrap()
}

pub(crate) fn server() -> MBeanServer {
	MBeanServer::new(ServerConfig::default()).unwrap()
}

/// Read-write `Target`, read-only `Reads`, write-only `Secret`, overloaded
/// `adjust`, failing and panicking operations, and an alarm notification.
#[derive(Default)]
pub(crate) struct Thermostat {
	pub(crate) target: Mutex<i32>,
	pub(crate) reads: AtomicI64,
	pub(crate) secret: Mutex<String>,
	pub(crate) support: BroadcasterSupport,
}

impl Thermostat {
	pub(crate) fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub(crate) fn alarm(&self, message: &str) -> usize {
		let notification = Notification::new(
			ALARM,
			NotificationSource::Local("thermostat".to_owned()),
			self.support.next_sequence(),
			message,
		);
		self.support.send_notification(&notification)
	}
}

impl ManagedResource for Thermostat {
	fn interface(self: Arc<Self>) -> ManagementInterface {
		let (get, set, reads, secret, adjust, alarm) = (
			Arc::clone(&self),
			Arc::clone(&self),
			Arc::clone(&self),
			Arc::clone(&self),
			Arc::clone(&self),
			Arc::clone(&self),
		);
		ManagementInterface::new("Thermostat")
			.description("Test thermostat")
			.implements("Device")
			.attribute(
				AttributeDef::new("Target", types::INT)
					.getter(move || {
						get.reads.fetch_add(1, Ordering::SeqCst);
						Ok(Value::Int(*get.target.lock()))
					})
					.setter(move |value| {
						let Some(v) = value.as_int() else {
							return Err(TargetError::invalid_value("not an int"));
						};
						if v < 0 {
							return Err(TargetError::invalid_value("target must not be negative"));
						}
						*set.target.lock() = v;
						Ok(())
					}),
			)
			.attribute(
				AttributeDef::new("Reads", types::LONG).getter(move || Ok(Value::Long(reads.reads.load(Ordering::SeqCst)))),
			)
			.attribute(AttributeDef::new("Secret", types::STRING).setter(move |value| {
				*secret.secret.lock() = value.as_str().unwrap_or_default().to_owned();
				Ok(())
			}))
			.operation(
				OperationDef::new("adjust", types::INT, move |args| {
					let delta = args[0].as_int().unwrap_or_default();
					let mut target = adjust.target.lock();
					*target += delta;
					Ok(Value::Int(*target))
				})
				.param("delta", types::INT)
				.impact(Impact::Action),
			)
			.operation(
				OperationDef::new("adjust", types::INT, |args| {
					let sum = args.iter().filter_map(Value::as_int).sum::<i32>();
					Ok(Value::Int(sum))
				})
				.param("a", types::INT)
				.param("b", types::INT),
			)
			.operation(OperationDef::new("fail", types::VOID, |_| Err(TargetError::failure("boom"))))
			.operation(OperationDef::new("crash", types::VOID, |_| panic!("thermostat exploded")))
			.operation(OperationDef::new("mistyped", types::INT, |_| Ok(Value::Str("nope".to_owned()))))
			.operation(OperationDef::new("loader", types::STRING, |_| {
				let name = context::current().map_or_else(|| "none".to_owned(), |l| l.name().to_owned());
				Ok(Value::Str(name))
			}))
			.operation(
				OperationDef::new("alarm", types::INT, move |args| {
					let message = args[0].as_str().unwrap_or_default();
					Ok(Value::Int(i32::try_from(alarm.alarm(message)).unwrap_or(i32::MAX)))
				})
				.param("message", types::STRING),
			)
			.notification(NotificationInfo::new([ALARM], "Alarm", "Temperature alarm"))
	}

	fn broadcaster(&self) -> Option<&dyn NotificationBroadcaster> {
		Some(&self.support)
	}
}

/// Resource whose lifecycle hooks record calls and can be told to fail.
#[derive(Default)]
pub(crate) struct Hooked {
	pub(crate) events: Mutex<Vec<String>>,
	pub(crate) choose: Option<ObjectName>,
	pub(crate) veto_post_register: bool,
	pub(crate) veto_pre_deregister: bool,
	pub(crate) fail_post_deregister: bool,
	/// Name of the loader current while `pre_register` ran.
	pub(crate) loader_in_hook: Mutex<Option<String>>,
}

impl Hooked {
	pub(crate) fn events(&self) -> Vec<String> {
		self.events.lock().clone()
	}

	fn record(&self, event: impl Into<String>) {
		self.events.lock().push(event.into());
	}
}

impl ManagedResource for Hooked {
	fn interface(self: Arc<Self>) -> ManagementInterface {
		ManagementInterface::new("Hooked").attribute(AttributeDef::new("Alive", types::BOOLEAN).getter(|| Ok(Value::Bool(true))))
	}

	fn lifecycle(&self) -> Option<&dyn RegistrationLifecycle> {
		Some(self)
	}
}

impl RegistrationLifecycle for Hooked {
	fn pre_register(&self, _: &MBeanServer, name: Option<&ObjectName>) -> Result<Option<ObjectName>, TargetError> {
		self.record(format!("pre_register({})", name.map_or_else(|| "-".to_owned(), ToString::to_string)));
		*self.loader_in_hook.lock() = context::current().map(|l| l.name().to_owned());
		Ok(self.choose.clone())
	}

	fn post_register(&self, registered: bool) -> Result<(), TargetError> {
		self.record(format!("post_register({registered})"));
		if registered && self.veto_post_register {
			return Err(TargetError::failure("post-register veto"));
		}
		Ok(())
	}

	fn pre_deregister(&self) -> Result<(), TargetError> {
		self.record("pre_deregister");
		if self.veto_pre_deregister {
			return Err(TargetError::failure("still busy"));
		}
		Ok(())
	}

	fn post_deregister(&self) -> Result<(), TargetError> {
		self.record("post_deregister");
		if self.fail_post_deregister {
			return Err(TargetError::failure("cleanup failed"));
		}
		Ok(())
	}
}

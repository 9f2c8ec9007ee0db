//! Notifications emitted by managed objects.
//!
//! Delivery is synchronous: [`BroadcasterSupport::send_notification`] runs
//! every matching listener on the calling thread before returning. A filter
//! that errors or panics counts as a rejection for that listener only, and a
//! panicking listener does not stop delivery to the others.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use mantle_object_name::ObjectName;
use parking_lot::RwLock;

use crate::info::NotificationInfo;
use crate::invocation::panic_message;
use crate::{TargetError, Value};

mod routing;

pub use routing::SourceRewritingListener;
pub(crate) use routing::{ListenerTable, NotificationRegistration};


/// Where a notification came from.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationSource {
	/// Registered name of the emitting object.
	Name(ObjectName),
	/// In-process label used before the emitter is known by name.
	Local(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
	/// Dotted type, e.g. `JMX.mbean.registered`.
	pub kind: String,
	pub source: NotificationSource,
	pub sequence: u64,
	pub timestamp: DateTime<Utc>,
	pub message: String,
	pub user_data: Option<Value>,
}

impl Notification {
	pub fn new(kind: impl Into<String>, source: NotificationSource, sequence: u64, message: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			source,
			sequence,
			timestamp: Utc::now(),
			message: message.into(),
			user_data: None,
		}
	}

	pub fn with_user_data(mut self, data: impl Into<Value>) -> Self {
		self.user_data = Some(data.into());
		self
	}

	pub fn source_name(&self) -> Option<&ObjectName> {
		match &self.source {
			NotificationSource::Name(name) => Some(name),
			NotificationSource::Local(_) => None,
		}
	}
}

pub trait NotificationListener: Send + Sync {
	fn handle_notification(&self, notification: &Notification, handback: Option<&Value>);
}

impl<F> NotificationListener for F
where
	F: Fn(&Notification, Option<&Value>) + Send + Sync,
{
	fn handle_notification(&self, notification: &Notification, handback: Option<&Value>) {
		self(notification, handback)
	}
}

pub trait NotificationFilter: Send + Sync {
	/// `Err` is treated the same as `Ok(false)`.
	fn is_enabled(&self, notification: &Notification) -> Result<bool, TargetError>;
}

impl<F> NotificationFilter for F
where
	F: Fn(&Notification) -> bool + Send + Sync,
{
	fn is_enabled(&self, notification: &Notification) -> Result<bool, TargetError> {
		Ok(self(notification))
	}
}

/// Accepts notifications whose type starts with one of the enabled prefixes.
#[derive(Debug, Clone, Default)]
pub struct TypeFilter {
	prefixes: Vec<String>,
}

impl TypeFilter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn enable(mut self, prefix: impl Into<String>) -> Self {
		self.prefixes.push(prefix.into());
		self
	}

	pub fn disable(&mut self, prefix: &str) {
		self.prefixes.retain(|p| p != prefix);
	}
}

impl NotificationFilter for TypeFilter {
	fn is_enabled(&self, notification: &Notification) -> Result<bool, TargetError> {
		Ok(self
			.prefixes
			.iter()
			.any(|p| notification.kind.starts_with(p.as_str())))
	}
}

/// Capability of managed objects that emit notifications.
pub trait NotificationBroadcaster: Send + Sync {
	fn add_notification_listener(
		&self,
		listener: Arc<dyn NotificationListener>,
		filter: Option<Arc<dyn NotificationFilter>>,
		handback: Option<Value>,
	);

	/// Removes every registration of `listener`. Returns false if there was none.
	fn remove_notification_listener(&self, listener: &Arc<dyn NotificationListener>) -> bool;

	/// Removes the first registration matching the exact triple.
	fn remove_notification_listener_with(
		&self,
		listener: &Arc<dyn NotificationListener>,
		filter: Option<&Arc<dyn NotificationFilter>>,
		handback: Option<&Value>,
	) -> bool;

	fn notification_info(&self) -> Vec<NotificationInfo> {
		Vec::new()
	}
}

pub(crate) fn same_listener(a: &Arc<dyn NotificationListener>, b: &Arc<dyn NotificationListener>) -> bool {
	std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

pub(crate) fn same_filter(a: Option<&Arc<dyn NotificationFilter>>, b: Option<&Arc<dyn NotificationFilter>>) -> bool {
	match (a, b) {
		(None, None) => true,
		(Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
		_ => false,
	}
}

#[derive(Clone)]
struct ListenerEntry {
	listener: Arc<dyn NotificationListener>,
	filter: Option<Arc<dyn NotificationFilter>>,
	handback: Option<Value>,
}

impl ListenerEntry {
	fn accepts(&self, notification: &Notification) -> bool {
		let Some(filter) = &self.filter else {
			return true;
		};
		match catch_unwind(AssertUnwindSafe(|| filter.is_enabled(notification))) {
			Ok(Ok(enabled)) => enabled,
			Ok(Err(error)) => {
				tracing::warn!(kind = %notification.kind, %error, "notification filter failed; rejecting");
				false
			}
			Err(payload) => {
				tracing::warn!(
					kind = %notification.kind,
					message = %panic_message(payload.as_ref()),
					"notification filter panicked; rejecting"
				);
				false
			}
		}
	}
}

/// Reusable listener list and fan-out for [`NotificationBroadcaster`]s.
#[derive(Default)]
pub struct BroadcasterSupport {
	listeners: RwLock<Vec<ListenerEntry>>,
	sequence: AtomicU64,
	info: Vec<NotificationInfo>,
}

impl BroadcasterSupport {
	pub fn new() -> Self {
		Self::default()
	}

	/// Support that reports `info` from `notification_info`.
	pub fn with_info(info: Vec<NotificationInfo>) -> Self {
		Self {
			info,
			..Self::default()
		}
	}

	/// Sequence numbers start at 1.
	pub fn next_sequence(&self) -> u64 {
		self.sequence.fetch_add(1, Ordering::Relaxed) + 1
	}

	pub fn listener_count(&self) -> usize {
		self.listeners.read().len()
	}

	/// Delivers `notification` to every listener whose filter accepts it.
	/// Returns the number of deliveries.
	pub fn send_notification(&self, notification: &Notification) -> usize {
		let snapshot = self.listeners.read().clone();
		let mut delivered = 0;
		for entry in snapshot.iter().filter(|e| e.accepts(notification)) {
			let outcome = catch_unwind(AssertUnwindSafe(|| {
				entry
					.listener
					.handle_notification(notification, entry.handback.as_ref())
			}));
			match outcome {
				Ok(()) => delivered += 1,
				Err(payload) => tracing::warn!(
					kind = %notification.kind,
					message = %panic_message(payload.as_ref()),
					"notification listener panicked"
				),
			}
		}
		delivered
	}
}

impl NotificationBroadcaster for BroadcasterSupport {
	fn add_notification_listener(
		&self,
		listener: Arc<dyn NotificationListener>,
		filter: Option<Arc<dyn NotificationFilter>>,
		handback: Option<Value>,
	) {
		self.listeners.write().push(ListenerEntry {
			listener,
			filter,
			handback,
		});
	}

	fn remove_notification_listener(&self, listener: &Arc<dyn NotificationListener>) -> bool {
		let mut listeners = self.listeners.write();
		let before = listeners.len();
		listeners.retain(|e| !same_listener(&e.listener, listener));
		listeners.len() != before
	}

	fn remove_notification_listener_with(
		&self,
		listener: &Arc<dyn NotificationListener>,
		filter: Option<&Arc<dyn NotificationFilter>>,
		handback: Option<&Value>,
	) -> bool {
		let mut listeners = self.listeners.write();
		let found = listeners.iter().position(|e| {
			same_listener(&e.listener, listener) && same_filter(e.filter.as_ref(), filter) && e.handback.as_ref() == handback
		});
		match found {
			Some(pos) => {
				listeners.remove(pos);
				true
			}
			None => false,
		}
	}

	fn notification_info(&self) -> Vec<NotificationInfo> {
		self.info.clone()
	}
}

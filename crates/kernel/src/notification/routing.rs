//! Server-side bookkeeping for listeners added through the server.

use std::sync::Arc;

use mantle_object_name::ObjectName;
use parking_lot::Mutex;

use super::{
	Notification, NotificationFilter, NotificationListener, NotificationSource, same_filter, same_listener,
};
use crate::Value;

/// Forwards notifications with their source replaced by a registered name.
///
/// Resources emitting notifications usually do not know the name they were
/// registered under; listeners added through the server always see it.
pub struct SourceRewritingListener {
	source: ObjectName,
	inner: Arc<dyn NotificationListener>,
}

impl SourceRewritingListener {
	pub fn new(source: ObjectName, inner: Arc<dyn NotificationListener>) -> Self {
		Self { source, inner }
	}

	pub fn source(&self) -> &ObjectName {
		&self.source
	}
}

impl NotificationListener for SourceRewritingListener {
	fn handle_notification(&self, notification: &Notification, handback: Option<&Value>) {
		if notification.source_name() == Some(&self.source) {
			return self.inner.handle_notification(notification, handback);
		}
		let mut rewritten = notification.clone();
		rewritten.source = NotificationSource::Name(self.source.clone());
		self.inner.handle_notification(&rewritten, handback);
	}
}

/// One listener added through the server.
pub(crate) struct NotificationRegistration {
	pub(crate) source: ObjectName,
	pub(crate) listener: Arc<dyn NotificationListener>,
	pub(crate) filter: Option<Arc<dyn NotificationFilter>>,
	pub(crate) handback: Option<Value>,
	/// What was actually installed on the broadcaster.
	pub(crate) proxy: Arc<dyn NotificationListener>,
}

impl NotificationRegistration {
	fn is_for(&self, source: &ObjectName, listener: &Arc<dyn NotificationListener>) -> bool {
		self.source == *source && same_listener(&self.listener, listener)
	}
}

/// Maps caller listeners to the proxies installed on broadcasters.
#[derive(Default)]
pub(crate) struct ListenerTable {
	registrations: Mutex<Vec<NotificationRegistration>>,
}

impl ListenerTable {
	pub(crate) fn insert(&self, registration: NotificationRegistration) {
		self.registrations.lock().push(registration);
	}

	/// Removes every registration of `listener` on `source`.
	pub(crate) fn take_all(
		&self,
		source: &ObjectName,
		listener: &Arc<dyn NotificationListener>,
	) -> Vec<NotificationRegistration> {
		let mut registrations = self.registrations.lock();
		let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *registrations)
			.into_iter()
			.partition(|r| r.is_for(source, listener));
		*registrations = kept;
		taken
	}

	/// Removes the first registration matching the exact triple.
	pub(crate) fn take_first(
		&self,
		source: &ObjectName,
		listener: &Arc<dyn NotificationListener>,
		filter: Option<&Arc<dyn NotificationFilter>>,
		handback: Option<&Value>,
	) -> Option<NotificationRegistration> {
		let mut registrations = self.registrations.lock();
		let pos = registrations.iter().position(|r| {
			r.is_for(source, listener) && same_filter(r.filter.as_ref(), filter) && r.handback.as_ref() == handback
		})?;
		Some(registrations.remove(pos))
	}

	/// Removes the registration that installed `proxy`.
	pub(crate) fn take_proxy(&self, proxy: &Arc<dyn NotificationListener>) -> Option<NotificationRegistration> {
		let mut registrations = self.registrations.lock();
		let pos = registrations.iter().position(|r| same_listener(&r.proxy, proxy))?;
		Some(registrations.remove(pos))
	}

	/// Removes every registration whose source is `source`.
	pub(crate) fn remove_source(&self, source: &ObjectName) -> Vec<NotificationRegistration> {
		let mut registrations = self.registrations.lock();
		let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *registrations)
			.into_iter()
			.partition(|r| r.source == *source);
		*registrations = kept;
		taken
	}
}

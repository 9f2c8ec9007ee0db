//! The server facade.
//!
//! # Purpose
//!
//! [`MBeanServer`] is the public entry point for registering managed objects
//! and reaching them by name. It owns the [`Registry`], runs permission
//! checks, drives the registration lifecycle and routes notifications.
//!
//! # Registration
//!
//! ```text
//! initialize invoker -> pre_register hook -> validate name -> reserve
//!     -> post_register(true) hook -> publish -> JMX.mbean.registered
//! ```
//!
//! A veto from `post_register` releases the reservation; nothing was ever
//! visible. Any failure after `pre_register` ran reports `post_register(false)`
//! to the resource. No hook runs while the registry lock is held.
//!
//! # Unregistration
//!
//! `pre_deregister` may abort. Once it has passed, the entry is removed, every
//! listener added through the server for that name is detached, and
//! `post_deregister` failures are only logged.

use std::sync::Arc;

use mantle_object_name::ObjectName;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::config::ServerConfig;
use crate::context::ContextLoader;
use crate::info::{Attribute, ManagementInfo, ObjectInstance};
use crate::interface::ManagedResource;
use crate::invocation::{Interceptor, TracingInterceptor};
use crate::invoker::{Invoker, InvokerOptions, Member};
use crate::notification::{
	ListenerTable, NotificationFilter, NotificationListener, NotificationRegistration, SourceRewritingListener,
};
use crate::permission::{Action, AllowAll, PermissionChecker, PermissionRequest};
use crate::query::QueryExp;
use crate::registry::{EntryHandle, Registry, RegistryEntry};
use crate::{ManagementError, Result, Value};

mod delegate;
mod factory;

pub use delegate::{DELEGATE_CLASS, REGISTERED, ServerDelegate, UNREGISTERED};
pub use factory::ResourceFactory;

#[cfg(test)]
mod tests;

/// Domain holding the server's own objects. Clients cannot register into it
/// or unregister from it.
pub const RESERVED_DOMAIN: &str = "JMImplementation";

/// Registered name of the [`ServerDelegate`].
pub const DELEGATE_NAME: &str = "JMImplementation:type=MBeanServerDelegate";

pub struct MBeanServer {
	default_domain: String,
	options: InvokerOptions,
	tracer: Option<Arc<dyn Interceptor>>,
	registry: Registry,
	listeners: ListenerTable,
	factories: RwLock<FxHashMap<String, Arc<dyn ResourceFactory>>>,
	permissions: Arc<dyn PermissionChecker>,
	delegate: Arc<ServerDelegate>,
}

impl MBeanServer {
	/// Creates a server and registers its delegate.
	pub fn new(config: ServerConfig) -> Result<Self> {
		config.validate()?;
		let delegate_name = ObjectName::parse(DELEGATE_NAME)?;
		let delegate = Arc::new(ServerDelegate::new(delegate_name.clone(), config.resolve_server_id()));
		let server = Self {
			options: InvokerOptions {
				strip_operation_qualifier: config.strip_operation_qualifier,
			},
			tracer: config
				.trace_invocations
				.then(|| Arc::new(TracingInterceptor) as Arc<dyn Interceptor>),
			default_domain: config.default_domain,
			registry: Registry::new(),
			listeners: ListenerTable::default(),
			factories: RwLock::new(FxHashMap::default()),
			permissions: Arc::new(AllowAll),
			delegate: Arc::clone(&delegate),
		};
		server.register(delegate, Some(delegate_name), None, true)?;
		tracing::debug!(server_id = server.delegate.server_id(), "management server started");
		Ok(server)
	}

	/// Replaces the permission checker, which allows everything by default.
	pub fn with_permission_checker(mut self, checker: impl PermissionChecker + 'static) -> Self {
		self.permissions = Arc::new(checker);
		self
	}

	pub fn delegate(&self) -> &Arc<ServerDelegate> {
		&self.delegate
	}

	pub fn get_default_domain(&self) -> &str {
		&self.default_domain
	}

	fn check(&self, request: PermissionRequest<'_>) -> Result<()> {
		self.permissions.check(&request)
	}

	/// Substitutes the default domain into a name with an empty domain.
	fn qualify(&self, name: &ObjectName) -> Result<ObjectName> {
		if name.domain().is_empty() {
			Ok(name.with_domain(&self.default_domain)?)
		} else {
			Ok(name.clone())
		}
	}

	fn lookup(&self, name: &ObjectName) -> Result<EntryHandle> {
		self.registry.get(&self.qualify(name)?)
	}

	// ── registration ──

	pub fn register_mbean(&self, resource: Arc<dyn ManagedResource>, name: Option<ObjectName>) -> Result<ObjectInstance> {
		self.register(resource, name, None, false)
	}

	/// Registers `resource` bound to `loader`; calls into it run with `loader` current.
	pub fn register_mbean_in(
		&self,
		resource: Arc<dyn ManagedResource>,
		name: Option<ObjectName>,
		loader: &Arc<ContextLoader>,
	) -> Result<ObjectInstance> {
		self.register(resource, name, Some(loader), false)
	}

	pub fn register_factory(&self, class_name: impl Into<String>, factory: Arc<dyn ResourceFactory>) {
		self.factories.write().insert(class_name.into(), factory);
	}

	/// Builds an object with the factory registered for `class_name` and registers it.
	pub fn create_mbean(
		&self,
		class_name: &str,
		name: Option<ObjectName>,
		args: &[Value],
		signature: &[&str],
	) -> Result<ObjectInstance> {
		let mut request = PermissionRequest::new(Action::InstantiateMBean).class_name(class_name);
		if let Some(name) = &name {
			request = request.name(name);
		}
		self.check(request)?;

		let factory = self
			.factories
			.read()
			.get(class_name)
			.cloned()
			.ok_or_else(|| ManagementError::UnknownClass(class_name.to_owned()))?;
		if args.len() != signature.len() {
			return Err(ManagementError::dispatch(
				class_name,
				format!("expected {} arguments, got {}", signature.len(), args.len()),
			));
		}
		if let Some((i, arg)) = args.iter().enumerate().find(|(i, arg)| !arg.conforms_to(signature[*i])) {
			return Err(ManagementError::dispatch(
				class_name,
				format!("argument {i} is {}, declared {}", arg.type_name(), signature[i]),
			));
		}

		let resource = factory
			.create(args)
			.map_err(|e| ManagementError::from_target(class_name, e))?;
		let loader = factory.context_loader();
		self.register(resource, name, loader.as_ref(), false)
	}

	fn register(
		&self,
		resource: Arc<dyn ManagedResource>,
		name: Option<ObjectName>,
		loader: Option<&Arc<ContextLoader>>,
		internal: bool,
	) -> Result<ObjectInstance> {
		let mut invoker = Invoker::new(resource, loader, self.options);
		invoker.initialize()?;
		let invoker = Arc::new(invoker);

		let proposed = name.as_ref().map(|n| self.qualify(n)).transpose()?;
		let mut request = PermissionRequest::new(Action::RegisterMBean).class_name(invoker.class_name());
		if let Some(name) = &proposed {
			request = request.name(name);
		}
		self.check(request)?;

		let chosen = invoker.pre_register(self, proposed.as_ref())?;
		let name = match self.claim(chosen.or(proposed), internal) {
			Ok(name) => name,
			Err(error) => {
				self.report_failed_registration(&invoker, None);
				return Err(error);
			}
		};

		if let Err(error) = invoker.post_register(&name, true) {
			self.registry.release(&name);
			invoker.abort_registration();
			tracing::debug!(%name, %error, "registration vetoed after pre-register");
			return Err(error);
		}

		if let Some(tracer) = &self.tracer {
			invoker.add_attribute_interceptor(Arc::clone(tracer));
			invoker.add_operation_interceptor(Arc::clone(tracer));
		}
		invoker.mark_registered(&name);
		let entry = match self.registry.publish(RegistryEntry::new(name.clone(), Arc::clone(&invoker))) {
			Ok(entry) => entry,
			Err(error) => {
				self.registry.release(&name);
				self.report_failed_registration(&invoker, Some(&name));
				return Err(error);
			}
		};
		tracing::debug!(%name, class_name = entry.class_name(), "managed object registered");
		self.delegate.announce(REGISTERED, &name);
		Ok(entry.instance())
	}

	/// Resolves and reserves the final name of a registration.
	fn claim(&self, name: Option<ObjectName>, internal: bool) -> Result<ObjectName> {
		let name = self.qualify(&name.ok_or(ManagementError::MissingName)?)?;
		if name.is_pattern() {
			return Err(ManagementError::PatternNotAllowed(name));
		}
		if !internal && name.domain() == RESERVED_DOMAIN {
			return Err(ManagementError::Reserved(name));
		}
		self.registry.reserve(&name)?;
		Ok(name)
	}

	fn report_failed_registration(&self, invoker: &Invoker, name: Option<&ObjectName>) {
		invoker.abort_registration();
		let label = name.cloned().unwrap_or_else(ObjectName::wildcard);
		if let Err(error) = invoker.post_register(&label, false) {
			tracing::warn!(class_name = invoker.class_name(), %error, "post-register hook failed after aborted registration");
		}
	}

	pub fn unregister_mbean(&self, name: &ObjectName) -> Result<()> {
		let name = self.qualify(name)?;
		if name.domain() == RESERVED_DOMAIN {
			return Err(ManagementError::Reserved(name));
		}
		let entry = self.registry.get(&name)?;
		self.check(
			PermissionRequest::new(Action::UnregisterMBean)
				.class_name(entry.class_name())
				.name(&name),
		)?;

		let invoker = entry.invoker();
		if !invoker.begin_deregister() {
			// Another caller is already unregistering it.
			return Err(ManagementError::NotFound(name));
		}
		if let Err(error) = invoker.pre_deregister(&name) {
			invoker.cancel_deregister();
			tracing::debug!(%name, %error, "unregistration aborted by pre-deregister");
			return Err(error);
		}

		self.registry.remove(&name)?;
		invoker.finish_deregister();
		self.detach_listeners(&entry);
		if let Err(error) = invoker.post_deregister(&name) {
			tracing::warn!(%name, %error, "post-deregister hook failed");
		}
		tracing::debug!(%name, "managed object unregistered");
		self.delegate.announce(UNREGISTERED, &name);
		Ok(())
	}

	fn detach_listeners(&self, entry: &RegistryEntry) {
		let removed = self.listeners.remove_source(entry.name());
		if removed.is_empty() {
			return;
		}
		if let Some(broadcaster) = entry.resource().broadcaster() {
			for registration in &removed {
				broadcaster.remove_notification_listener(&registration.proxy);
			}
		}
		tracing::debug!(name = %entry.name(), count = removed.len(), "detached notification listeners");
	}

	// ── attributes and operations ──

	pub fn get_attribute(&self, name: &ObjectName, attribute: &str) -> Result<Value> {
		let entry = self.lookup(name)?;
		self.check(
			PermissionRequest::new(Action::GetAttribute)
				.class_name(entry.class_name())
				.member(attribute)
				.name(entry.name()),
		)?;
		entry.invoker().get_attribute(attribute)
	}

	/// Reads several attributes. Attributes that cannot be read are left out of
	/// the result rather than failing the whole call.
	pub fn get_attributes(&self, name: &ObjectName, attributes: &[&str]) -> Result<Vec<Attribute>> {
		let entry = self.lookup(name)?;
		let mut values = Vec::with_capacity(attributes.len());
		for &attribute in attributes {
			let read = self
				.check(
					PermissionRequest::new(Action::GetAttribute)
						.class_name(entry.class_name())
						.member(attribute)
						.name(entry.name()),
				)
				.and_then(|()| entry.invoker().get_attribute(attribute));
			match read {
				Ok(value) => values.push(Attribute::new(attribute, value)),
				Err(error) => tracing::debug!(name = %entry.name(), attribute, %error, "dropping attribute from batch read"),
			}
		}
		Ok(values)
	}

	pub fn set_attribute(&self, name: &ObjectName, attribute: Attribute) -> Result<()> {
		let entry = self.lookup(name)?;
		self.check(
			PermissionRequest::new(Action::SetAttribute)
				.class_name(entry.class_name())
				.member(&attribute.name)
				.name(entry.name()),
		)?;
		entry.invoker().set_attribute(&attribute.name, attribute.value)
	}

	/// Writes several attributes and returns the ones that were written.
	pub fn set_attributes(&self, name: &ObjectName, attributes: Vec<Attribute>) -> Result<Vec<Attribute>> {
		let entry = self.lookup(name)?;
		let mut written = Vec::with_capacity(attributes.len());
		for attribute in attributes {
			let write = self
				.check(
					PermissionRequest::new(Action::SetAttribute)
						.class_name(entry.class_name())
						.member(&attribute.name)
						.name(entry.name()),
				)
				.and_then(|()| entry.invoker().set_attribute(&attribute.name, attribute.value.clone()));
			match write {
				Ok(()) => written.push(attribute),
				Err(error) => tracing::debug!(
					name = %entry.name(),
					attribute = %attribute.name,
					%error,
					"dropping attribute from batch write"
				),
			}
		}
		Ok(written)
	}

	pub fn invoke(&self, name: &ObjectName, operation: &str, args: Vec<Value>, signature: &[&str]) -> Result<Value> {
		let entry = self.lookup(name)?;
		self.check(
			PermissionRequest::new(Action::Invoke)
				.class_name(entry.class_name())
				.member(operation)
				.name(entry.name()),
		)?;
		entry.invoker().invoke(operation, args, signature)
	}

	// ── introspection ──

	pub fn get_mbean_info(&self, name: &ObjectName) -> Result<ManagementInfo> {
		let entry = self.lookup(name)?;
		self.check(
			PermissionRequest::new(Action::GetMBeanInfo)
				.class_name(entry.class_name())
				.name(entry.name()),
		)?;
		Ok(entry.invoker().management_info())
	}

	pub fn get_object_instance(&self, name: &ObjectName) -> Result<ObjectInstance> {
		let entry = self.lookup(name)?;
		self.check(
			PermissionRequest::new(Action::GetObjectInstance)
				.class_name(entry.class_name())
				.name(entry.name()),
		)?;
		Ok(entry.instance())
	}

	pub fn is_registered(&self, name: &ObjectName) -> bool {
		self.qualify(name).is_ok_and(|name| self.registry.contains(&name))
	}

	pub fn is_instance_of(&self, name: &ObjectName, type_name: &str) -> Result<bool> {
		let entry = self.lookup(name)?;
		self.check(
			PermissionRequest::new(Action::IsInstanceOf)
				.class_name(entry.class_name())
				.name(entry.name()),
		)?;
		Ok(entry.invoker().is_instance_of(type_name))
	}

	/// The loader `name` was registered with, if any.
	pub fn get_context_loader_for(&self, name: &ObjectName) -> Result<Option<Arc<ContextLoader>>> {
		let entry = self.lookup(name)?;
		self.check(
			PermissionRequest::new(Action::GetContextLoader)
				.class_name(entry.class_name())
				.name(entry.name()),
		)?;
		Ok(entry.context_loader())
	}

	pub fn get_mbean_count(&self) -> usize {
		self.registry.count()
	}

	pub fn get_domains(&self) -> Vec<String> {
		self.registry.domains()
	}

	/// Entries matching `pattern` (everything when `None`) that the caller may
	/// see under `action` and that satisfy `query`.
	fn query(&self, pattern: Option<&ObjectName>, query: Option<&dyn QueryExp>, action: Action) -> Result<Vec<EntryHandle>> {
		let pattern = match pattern {
			Some(pattern) => self.qualify(pattern)?,
			None => ObjectName::wildcard(),
		};
		let found = self
			.registry
			.find(&pattern)
			.into_iter()
			.filter(|entry| {
				self.check(
					PermissionRequest::new(action)
						.class_name(entry.class_name())
						.name(entry.name()),
				)
				.is_ok()
			})
			.filter(|entry| {
				let Some(query) = query else {
					return true;
				};
				query.apply(self, entry.name()).unwrap_or_else(|error| {
					tracing::trace!(name = %entry.name(), %error, "query evaluation failed; not matching");
					false
				})
			})
			.collect();
		Ok(found)
	}

	pub fn query_names(&self, pattern: Option<&ObjectName>, query: Option<&dyn QueryExp>) -> Result<Vec<ObjectName>> {
		Ok(self
			.query(pattern, query, Action::QueryNames)?
			.iter()
			.map(|entry| entry.name().clone())
			.collect())
	}

	pub fn query_mbeans(&self, pattern: Option<&ObjectName>, query: Option<&dyn QueryExp>) -> Result<Vec<ObjectInstance>> {
		Ok(self
			.query(pattern, query, Action::QueryMBeans)?
			.iter()
			.map(|entry| entry.instance())
			.collect())
	}

	// ── notifications ──

	fn broadcaster_entry(&self, name: &ObjectName, action: Action) -> Result<EntryHandle> {
		let entry = self.lookup(name)?;
		self.check(
			PermissionRequest::new(action)
				.class_name(entry.class_name())
				.name(entry.name()),
		)?;
		if entry.resource().broadcaster().is_none() {
			return Err(ManagementError::NotABroadcaster(entry.name().clone()));
		}
		Ok(entry)
	}

	/// Subscribes `listener` to notifications from `name`. Delivered
	/// notifications carry `name` as their source.
	pub fn add_notification_listener(
		&self,
		name: &ObjectName,
		listener: Arc<dyn NotificationListener>,
		filter: Option<Arc<dyn NotificationFilter>>,
		handback: Option<Value>,
	) -> Result<()> {
		let entry = self.broadcaster_entry(name, Action::AddNotificationListener)?;
		let Some(broadcaster) = entry.resource().broadcaster() else {
			return Err(ManagementError::NotABroadcaster(entry.name().clone()));
		};
		let proxy: Arc<dyn NotificationListener> =
			Arc::new(SourceRewritingListener::new(entry.name().clone(), Arc::clone(&listener)));
		broadcaster.add_notification_listener(Arc::clone(&proxy), filter.clone(), handback.clone());
		self.listeners.insert(NotificationRegistration {
			source: entry.name().clone(),
			listener,
			filter,
			handback,
			proxy: Arc::clone(&proxy),
		});

		// An unregistration that ran concurrently may already have swept this source.
		let still_bound = self
			.registry
			.get(entry.name())
			.is_ok_and(|current| Arc::ptr_eq(&current, &entry));
		if !still_bound {
			self.listeners.take_proxy(&proxy);
			broadcaster.remove_notification_listener(&proxy);
			tracing::debug!(name = %entry.name(), "listener added during unregistration; rolled back");
			return Err(ManagementError::NotFound(entry.name().clone()));
		}
		Ok(())
	}

	/// Removes every subscription of `listener` to `name`.
	pub fn remove_notification_listener(&self, name: &ObjectName, listener: &Arc<dyn NotificationListener>) -> Result<()> {
		let entry = self.broadcaster_entry(name, Action::RemoveNotificationListener)?;
		let removed = self.listeners.take_all(entry.name(), listener);
		if removed.is_empty() {
			return Err(ManagementError::ListenerNotFound(entry.name().clone()));
		}
		if let Some(broadcaster) = entry.resource().broadcaster() {
			for registration in &removed {
				broadcaster.remove_notification_listener(&registration.proxy);
			}
		}
		Ok(())
	}

	/// Removes the subscription made with exactly this listener, filter and handback.
	pub fn remove_notification_listener_with(
		&self,
		name: &ObjectName,
		listener: &Arc<dyn NotificationListener>,
		filter: Option<&Arc<dyn NotificationFilter>>,
		handback: Option<&Value>,
	) -> Result<()> {
		let entry = self.broadcaster_entry(name, Action::RemoveNotificationListener)?;
		let registration = self
			.listeners
			.take_first(entry.name(), listener, filter, handback)
			.ok_or_else(|| ManagementError::ListenerNotFound(entry.name().clone()))?;
		if let Some(broadcaster) = entry.resource().broadcaster() {
			broadcaster.remove_notification_listener_with(
				&registration.proxy,
				registration.filter.as_ref(),
				registration.handback.as_ref(),
			);
		}
		Ok(())
	}

	// ── interceptors and descriptors ──

	fn editable(&self, name: &ObjectName, action: Action) -> Result<EntryHandle> {
		let entry = self.lookup(name)?;
		self.check(
			PermissionRequest::new(action)
				.class_name(entry.class_name())
				.name(entry.name()),
		)?;
		Ok(entry)
	}

	/// Puts `interceptor` in front of every operation chain of `name`.
	pub fn add_operation_interceptor(&self, name: &ObjectName, interceptor: Arc<dyn Interceptor>) -> Result<()> {
		self.editable(name, Action::EditInterceptors)?
			.invoker()
			.add_operation_interceptor(interceptor);
		Ok(())
	}

	pub fn remove_operation_interceptor(&self, name: &ObjectName, interceptor: &Arc<dyn Interceptor>) -> Result<bool> {
		Ok(self
			.editable(name, Action::EditInterceptors)?
			.invoker()
			.remove_operation_interceptor(interceptor))
	}

	/// Puts `interceptor` in front of every attribute chain of `name`.
	pub fn add_attribute_interceptor(&self, name: &ObjectName, interceptor: Arc<dyn Interceptor>) -> Result<()> {
		self.editable(name, Action::EditInterceptors)?
			.invoker()
			.add_attribute_interceptor(interceptor);
		Ok(())
	}

	pub fn remove_attribute_interceptor(&self, name: &ObjectName, interceptor: &Arc<dyn Interceptor>) -> Result<bool> {
		Ok(self
			.editable(name, Action::EditInterceptors)?
			.invoker()
			.remove_attribute_interceptor(interceptor))
	}

	pub fn set_descriptor_field(&self, name: &ObjectName, member: Member<'_>, key: &str, value: Value) -> Result<()> {
		self.editable(name, Action::SetDescriptor)?
			.invoker()
			.set_descriptor_field(member, key, value)
	}
}

//! Per-object dispatch engine.
//!
//! # Purpose
//!
//! An [`Invoker`] owns the invocation contexts of one registered object and
//! is the only path by which attribute reads/writes, operations and
//! registration hooks reach that object.
//!
//! # Lookup
//!
//! * Attributes are keyed by name; attributes cannot be overloaded.
//! * Operations are keyed by name and then by exact signature. A call that
//!   names a known operation with the right number of parameters but the
//!   wrong types fails with `NoSuchMethod`; any other miss is
//!   `OperationNotFound`.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized -> Initialized -> Registered -> Deregistering -> Deregistered
//!                       |             |               |
//!                       +-------------+-> Deregistered (rollback)
//!                                                     +-> Registered (pre-deregister veto)
//! ```
//!
//! Calls on a `Deregistered` invoker fail with `NotFound`. Lifecycle hooks
//! still run after the owning loader is dropped; calls do not.
//!
//! # Execution context
//!
//! Every call and hook runs with the object's [`ContextLoader`] installed via
//! [`ContextGuard`]; the previous loader is restored on every exit path.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use mantle_object_name::ObjectName;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::{ContextGuard, ContextLoader};
use crate::error::LifecyclePhase;
use crate::info::{ManagementInfo, NotificationInfo};
use crate::interface::{ManagedResource, ManagementInterface};
use crate::invocation::{Access, Interceptor, Invocation, InvocationContext, panic_message};
use crate::server::MBeanServer;
use crate::value::types;
use crate::{Descriptor, ManagementError, Result, TargetError, Value};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokerState {
	Uninitialized,
	Initialized,
	Registered,
	Deregistering,
	Deregistered,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InvokerOptions {
	/// Reduce `a.b.op` to `op` before operation lookup.
	pub strip_operation_qualifier: bool,
}

/// Addresses a descriptor: the object's own, or one member's.
#[derive(Debug, Clone, Copy)]
pub enum Member<'a> {
	Resource,
	Attribute(&'a str),
	Operation { name: &'a str, signature: &'a [&'a str] },
}

pub struct Invoker {
	resource: Arc<dyn ManagedResource>,
	loader: Option<Weak<ContextLoader>>,
	options: InvokerOptions,
	state: Mutex<InvokerState>,
	name: OnceLock<ObjectName>,
	class_name: String,
	description: String,
	supertypes: Vec<String>,
	attributes: Vec<Arc<InvocationContext>>,
	attribute_index: FxHashMap<String, usize>,
	operations: Vec<Arc<InvocationContext>>,
	/// Operation name -> overload positions in `operations`.
	operation_index: FxHashMap<String, Vec<usize>>,
	notifications: Vec<NotificationInfo>,
	descriptor: RwLock<Descriptor>,
	/// Serializes chain edits so every context sees them in the same order.
	chain_edit: Mutex<()>,
}

impl Invoker {
	pub fn new(resource: Arc<dyn ManagedResource>, loader: Option<&Arc<ContextLoader>>, options: InvokerOptions) -> Self {
		Self {
			resource,
			loader: loader.map(Arc::downgrade),
			options,
			state: Mutex::new(InvokerState::Uninitialized),
			name: OnceLock::new(),
			class_name: String::new(),
			description: String::new(),
			supertypes: Vec::new(),
			attributes: Vec::new(),
			attribute_index: FxHashMap::default(),
			operations: Vec::new(),
			operation_index: FxHashMap::default(),
			notifications: Vec::new(),
			descriptor: RwLock::new(Descriptor::new()),
			chain_edit: Mutex::new(()),
		}
	}

	/// Introspects the resource and builds one invocation context per member.
	pub fn initialize(&mut self) -> Result<()> {
		if self.state() != InvokerState::Uninitialized {
			return Err(ManagementError::dispatch(&self.class_name, "invoker already initialized"));
		}
		let interface = Arc::clone(&self.resource).interface();
		validate(&interface)?;

		let ManagementInterface {
			class_name,
			description,
			supertypes,
			attributes,
			operations,
			notifications,
			descriptor,
		} = interface;

		for def in attributes {
			self.attribute_index.insert(def.name.clone(), self.attributes.len());
			self.attributes.push(Arc::new(InvocationContext::for_attribute(def)));
		}
		for def in operations {
			self.operation_index
				.entry(def.name.clone())
				.or_default()
				.push(self.operations.len());
			self.operations.push(Arc::new(InvocationContext::for_operation(def)));
		}
		self.class_name = class_name;
		self.description = description;
		self.supertypes = supertypes;
		self.notifications = notifications;
		*self.descriptor.get_mut() = descriptor;
		*self.state.get_mut() = InvokerState::Initialized;
		Ok(())
	}

	pub fn state(&self) -> InvokerState {
		*self.state.lock()
	}

	fn transition(&self, from: InvokerState, to: InvokerState) -> bool {
		let mut state = self.state.lock();
		if *state != from {
			return false;
		}
		*state = to;
		true
	}

	pub(crate) fn mark_registered(&self, name: &ObjectName) -> bool {
		if !self.transition(InvokerState::Initialized, InvokerState::Registered) {
			return false;
		}
		let _ = self.name.set(name.clone());
		true
	}

	/// Ends a registration that never became visible.
	pub(crate) fn abort_registration(&self) {
		let mut state = self.state.lock();
		if matches!(*state, InvokerState::Initialized | InvokerState::Registered) {
			*state = InvokerState::Deregistered;
		}
	}

	pub(crate) fn begin_deregister(&self) -> bool {
		self.transition(InvokerState::Registered, InvokerState::Deregistering)
	}

	pub(crate) fn cancel_deregister(&self) {
		self.transition(InvokerState::Deregistering, InvokerState::Registered);
	}

	pub(crate) fn finish_deregister(&self) {
		self.transition(InvokerState::Deregistering, InvokerState::Deregistered);
	}

	fn ensure_live(&self) -> Result<()> {
		if self.state() != InvokerState::Deregistered {
			return Ok(());
		}
		match self.name.get() {
			Some(name) => Err(ManagementError::NotFound(name.clone())),
			None => Err(ManagementError::dispatch(&self.class_name, "managed object was never registered")),
		}
	}

	pub fn resource(&self) -> &Arc<dyn ManagedResource> {
		&self.resource
	}

	pub fn class_name(&self) -> &str {
		&self.class_name
	}

	/// The owning loader, if one was bound and is still alive.
	pub fn context_loader(&self) -> Option<Arc<ContextLoader>> {
		self.loader.as_ref().and_then(Weak::upgrade)
	}

	pub fn is_instance_of(&self, type_name: &str) -> bool {
		self.class_name == type_name || self.supertypes.iter().any(|t| t == type_name)
	}

	fn enter_context(&self, member: &str) -> Result<ContextGuard> {
		match &self.loader {
			None => Ok(ContextGuard::enter(None)),
			Some(weak) => weak
				.upgrade()
				.map(|loader| ContextGuard::enter(Some(loader)))
				.ok_or_else(|| ManagementError::dispatch(member, "context loader has been dropped")),
		}
	}

	fn run(&self, context: &InvocationContext, access: Access, args: Vec<Value>) -> Result<Value> {
		let _guard = self.enter_context(context.name())?;
		Invocation::new(context, access, args).invoke()
	}

	fn attribute(&self, name: &str) -> Result<&Arc<InvocationContext>> {
		self.attribute_index
			.get(name)
			.map(|&i| &self.attributes[i])
			.ok_or_else(|| ManagementError::AttributeNotFound(name.to_owned()))
	}

	pub fn get_attribute(&self, name: &str) -> Result<Value> {
		self.ensure_live()?;
		let context = self.attribute(name)?;
		if !context.is_readable() {
			return Err(ManagementError::NotReadable(name.to_owned()));
		}
		self.run(context, Access::Get, Vec::new())
	}

	pub fn set_attribute(&self, name: &str, value: Value) -> Result<()> {
		self.ensure_live()?;
		let context = self.attribute(name)?;
		if !context.is_writable() {
			return Err(ManagementError::NotWritable(name.to_owned()));
		}
		if !value.conforms_to(context.type_name()) {
			return Err(ManagementError::InvalidValue {
				member: name.to_owned(),
				reason: format!("expected {}, got {}", context.type_name(), value.type_name()),
			});
		}
		self.run(context, Access::Set, vec![value]).map(drop)
	}

	fn operation_name<'a>(&self, name: &'a str) -> &'a str {
		if self.options.strip_operation_qualifier {
			name.rsplit_once('.').map_or(name, |(_, tail)| tail)
		} else {
			name
		}
	}

	fn operation(&self, name: &str, signature: &[&str]) -> Result<&Arc<InvocationContext>> {
		let overloads = self.operation_index.get(name).map_or(&[][..], Vec::as_slice);
		let mut same_arity = false;
		for &i in overloads {
			let context = &self.operations[i];
			if context.signature().len() != signature.len() {
				continue;
			}
			if context.signature().iter().zip(signature).all(|(a, b)| a == b) {
				return Ok(context);
			}
			same_arity = true;
		}
		let signature = signature.iter().map(|s| (*s).to_owned()).collect();
		if same_arity {
			Err(ManagementError::NoSuchMethod {
				name: name.to_owned(),
				signature,
			})
		} else {
			Err(ManagementError::OperationNotFound {
				name: name.to_owned(),
				signature,
			})
		}
	}

	pub fn invoke(&self, operation: &str, args: Vec<Value>, signature: &[&str]) -> Result<Value> {
		self.ensure_live()?;
		let name = self.operation_name(operation);
		let context = self.operation(name, signature)?;
		self.run(context, Access::Invoke, args)
	}

	/// Snapshot of the current interface, including descriptor and chain edits.
	pub fn management_info(&self) -> ManagementInfo {
		ManagementInfo {
			class_name: self.class_name.clone(),
			description: self.description.clone(),
			attributes: self.attributes.iter().map(|c| c.attribute_info()).collect(),
			operations: self.operations.iter().map(|c| c.operation_info()).collect(),
			notifications: self.notifications.clone(),
			descriptor: self.descriptor.read().clone(),
		}
	}

	pub fn set_descriptor_field(&self, member: Member<'_>, key: &str, value: Value) -> Result<()> {
		match member {
			Member::Resource => {
				self.descriptor.write().set(key, value);
			}
			Member::Attribute(name) => self.attribute(name)?.set_descriptor_field(key, value),
			Member::Operation { name, signature } => self.operation(name, signature)?.set_descriptor_field(key, value),
		}
		Ok(())
	}

	/// Prepends `interceptor` to every operation chain.
	pub fn add_operation_interceptor(&self, interceptor: Arc<dyn Interceptor>) {
		let _edit = self.chain_edit.lock();
		for context in &self.operations {
			context.prepend(&interceptor);
		}
	}

	/// Removes the first occurrence of `interceptor` from every operation chain.
	pub fn remove_operation_interceptor(&self, interceptor: &Arc<dyn Interceptor>) -> bool {
		let _edit = self.chain_edit.lock();
		self.operations
			.iter()
			.fold(false, |removed, context| context.remove(interceptor) | removed)
	}

	pub fn add_attribute_interceptor(&self, interceptor: Arc<dyn Interceptor>) {
		let _edit = self.chain_edit.lock();
		for context in &self.attributes {
			context.prepend(&interceptor);
		}
	}

	pub fn remove_attribute_interceptor(&self, interceptor: &Arc<dyn Interceptor>) -> bool {
		let _edit = self.chain_edit.lock();
		self.attributes
			.iter()
			.fold(false, |removed, context| context.remove(interceptor) | removed)
	}

	/// Suspending in-flight calls is not implemented.
	pub fn suspend(&self, wait: Option<Duration>) -> Result<()> {
		let _ = wait;
		Err(ManagementError::NotSupported("suspending invocations"))
	}

	pub fn resume(&self) -> Result<()> {
		Err(ManagementError::NotSupported("resuming invocations"))
	}

	fn hook<T>(
		&self,
		phase: LifecyclePhase,
		label: &str,
		f: impl FnOnce() -> std::result::Result<T, TargetError>,
	) -> Result<T> {
		// A dropped loader leaves the hook running with no current loader.
		let _guard = ContextGuard::enter(self.context_loader());
		let outcome = match catch_unwind(AssertUnwindSafe(f)) {
			Ok(outcome) => outcome,
			Err(payload) => Err(TargetError::Fault(panic_message(payload.as_ref()))),
		};
		outcome.map_err(|source| ManagementError::Lifecycle {
			phase,
			name: label.to_owned(),
			source,
		})
	}

	pub fn pre_register(&self, server: &MBeanServer, proposed: Option<&ObjectName>) -> Result<Option<ObjectName>> {
		let Some(lifecycle) = self.resource.lifecycle() else {
			return Ok(None);
		};
		let label = proposed.map_or_else(|| self.class_name.clone(), ToString::to_string);
		self.hook(LifecyclePhase::PreRegister, &label, || {
			lifecycle.pre_register(server, proposed)
		})
	}

	pub fn post_register(&self, name: &ObjectName, registered: bool) -> Result<()> {
		let Some(lifecycle) = self.resource.lifecycle() else {
			return Ok(());
		};
		self.hook(LifecyclePhase::PostRegister, &name.to_string(), || {
			lifecycle.post_register(registered)
		})
	}

	pub fn pre_deregister(&self, name: &ObjectName) -> Result<()> {
		let Some(lifecycle) = self.resource.lifecycle() else {
			return Ok(());
		};
		self.hook(LifecyclePhase::PreDeregister, &name.to_string(), || lifecycle.pre_deregister())
	}

	pub fn post_deregister(&self, name: &ObjectName) -> Result<()> {
		let Some(lifecycle) = self.resource.lifecycle() else {
			return Ok(());
		};
		self.hook(LifecyclePhase::PostDeregister, &name.to_string(), || lifecycle.post_deregister())
	}
}

fn validate(interface: &ManagementInterface) -> Result<()> {
	let class = interface.class_name.as_str();
	if class.is_empty() {
		return Err(ManagementError::not_manageable("<anonymous>", "empty class name"));
	}
	if interface.attributes.is_empty() && interface.operations.is_empty() {
		return Err(ManagementError::not_manageable(class, "exposes no attributes or operations"));
	}

	let mut seen = FxHashSet::default();
	for attr in &interface.attributes {
		if attr.name.is_empty() {
			return Err(ManagementError::not_manageable(class, "attribute with empty name"));
		}
		if !seen.insert(attr.name.as_str()) {
			return Err(ManagementError::not_manageable(class, format!("duplicate attribute {:?}", attr.name)));
		}
		if attr.type_name.is_empty() || attr.type_name == types::VOID {
			return Err(ManagementError::not_manageable(class, format!("attribute {:?} has no type", attr.name)));
		}
		if !attr.is_readable() && !attr.is_writable() {
			return Err(ManagementError::not_manageable(
				class,
				format!("attribute {:?} is neither readable nor writable", attr.name),
			));
		}
	}

	let mut overloads = FxHashSet::default();
	for op in &interface.operations {
		if op.name.is_empty() {
			return Err(ManagementError::not_manageable(class, "operation with empty name"));
		}
		if op.return_type.is_empty() || op.parameters.iter().any(|p| p.type_name.is_empty()) {
			return Err(ManagementError::not_manageable(class, format!("operation {:?} has an untyped slot", op.name)));
		}
		if !overloads.insert((op.name.as_str(), op.signature())) {
			return Err(ManagementError::not_manageable(
				class,
				format!("duplicate overload {}({})", op.name, op.signature().join(", ")),
			));
		}
	}
	Ok(())
}

//! Invocation contexts, per-call invocations and the interceptor chain.
//!
//! # Mental model
//!
//! * One [`InvocationContext`] per attribute and per operation overload, built
//!   at registration and shared by every call to that member.
//! * One [`Invocation`] per call. It pins the context's chain snapshot when it
//!   is created and walks it with a cursor; when the chain is exhausted the
//!   context's dispatcher runs.
//!
//! # Concurrency
//!
//! * Chains are published through `ArcSwap`; mutation builds a new vector and
//!   swaps it in. A call that already pinned the old snapshot finishes on it.
//! * Descriptors sit behind a `parking_lot::RwLock` and are copied into each
//!   invocation, so interceptors may edit the copy freely.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;

use crate::info::{AttributeInfo, Impact, OperationInfo, ParameterInfo};
use crate::interface::{AttributeDef, OperationDef};
use crate::{Descriptor, Result, Value};

mod dispatch;
mod interceptors;

pub(crate) use dispatch::{Dispatcher, panic_message};
pub use interceptors::{AttributeCacheInterceptor, TracingInterceptor};

/// A call-wrapping handler. Must call [`Invocation::invoke`] to continue the
/// chain, or return without doing so to short-circuit it.
pub trait Interceptor: Send + Sync {
	/// Label reported in [`crate::ManagementInfo`].
	fn name(&self) -> &str;

	fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value>;
}

pub(crate) type Chain = Vec<Arc<dyn Interceptor>>;

/// Identity comparison that ignores vtable addresses.
pub(crate) fn same_interceptor(a: &Arc<dyn Interceptor>, b: &Arc<dyn Interceptor>) -> bool {
	std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
	Attribute,
	Operation,
}

/// What a single invocation asks of its member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
	Get,
	Set,
	Invoke,
}

impl std::fmt::Display for Access {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Self::Get => "get",
			Self::Set => "set",
			Self::Invoke => "invoke",
		})
	}
}

/// Cached metadata and dispatch binding for one member.
pub struct InvocationContext {
	name: String,
	kind: MemberKind,
	signature: Vec<String>,
	/// Attribute type for attributes, return type for operations.
	type_name: String,
	readable: bool,
	writable: bool,
	description: String,
	parameters: Vec<ParameterInfo>,
	impact: Impact,
	chain: ArcSwap<Chain>,
	dispatcher: Dispatcher,
	descriptor: RwLock<Descriptor>,
}

impl InvocationContext {
	pub(crate) fn for_attribute(def: AttributeDef) -> Self {
		Self {
			readable: def.getter.is_some(),
			writable: def.setter.is_some(),
			name: def.name,
			kind: MemberKind::Attribute,
			signature: Vec::new(),
			type_name: def.type_name,
			description: def.description,
			parameters: Vec::new(),
			impact: Impact::Unknown,
			chain: ArcSwap::from_pointee(Vec::new()),
			dispatcher: Dispatcher::Attribute {
				getter: def.getter,
				setter: def.setter,
			},
			descriptor: RwLock::new(def.descriptor),
		}
	}

	pub(crate) fn for_operation(def: OperationDef) -> Self {
		Self {
			signature: def.parameters.iter().map(|p| p.type_name.clone()).collect(),
			name: def.name,
			kind: MemberKind::Operation,
			type_name: def.return_type,
			readable: false,
			writable: false,
			description: def.description,
			parameters: def.parameters,
			impact: def.impact,
			chain: ArcSwap::from_pointee(Vec::new()),
			dispatcher: Dispatcher::Operation { handler: def.handler },
			descriptor: RwLock::new(def.descriptor),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn kind(&self) -> MemberKind {
		self.kind
	}

	pub fn signature(&self) -> &[String] {
		&self.signature
	}

	/// Attribute type, or operation return type (`void` for none).
	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	pub fn is_readable(&self) -> bool {
		self.readable
	}

	pub fn is_writable(&self) -> bool {
		self.writable
	}

	pub fn descriptor(&self) -> Descriptor {
		self.descriptor.read().clone()
	}

	pub(crate) fn set_descriptor_field(&self, key: &str, value: Value) {
		self.descriptor.write().set(key, value);
	}

	/// Current chain snapshot.
	pub fn chain(&self) -> Arc<Chain> {
		self.chain.load_full()
	}

	pub fn interceptor_names(&self) -> Vec<String> {
		self.chain.load().iter().map(|i| i.name().to_owned()).collect()
	}

	/// Publishes a new chain with `interceptor` in front.
	pub(crate) fn prepend(&self, interceptor: &Arc<dyn Interceptor>) {
		self.chain.rcu(|current| {
			let mut next = Vec::with_capacity(current.len() + 1);
			next.push(Arc::clone(interceptor));
			next.extend(current.iter().cloned());
			next
		});
	}

	/// Publishes a new chain without the first occurrence of `interceptor`.
	pub(crate) fn remove(&self, interceptor: &Arc<dyn Interceptor>) -> bool {
		let mut removed = false;
		self.chain.rcu(|current| {
			let mut next: Chain = (**current).clone();
			removed = match next.iter().position(|i| same_interceptor(i, interceptor)) {
				Some(pos) => {
					next.remove(pos);
					true
				}
				None => false,
			};
			next
		});
		removed
	}

	pub(crate) fn attribute_info(&self) -> AttributeInfo {
		AttributeInfo {
			name: self.name.clone(),
			type_name: self.type_name.clone(),
			description: self.description.clone(),
			readable: self.readable,
			writable: self.writable,
			descriptor: self.descriptor(),
			interceptors: self.interceptor_names(),
		}
	}

	pub(crate) fn operation_info(&self) -> OperationInfo {
		OperationInfo {
			name: self.name.clone(),
			parameters: self.parameters.clone(),
			return_type: self.type_name.clone(),
			description: self.description.clone(),
			impact: self.impact,
			descriptor: self.descriptor(),
			interceptors: self.interceptor_names(),
		}
	}
}

/// One call in flight. Not shared across threads.
pub struct Invocation<'a> {
	context: &'a InvocationContext,
	chain: Arc<Chain>,
	cursor: usize,
	access: Access,
	args: Vec<Value>,
	descriptor: Descriptor,
}

impl<'a> Invocation<'a> {
	pub(crate) fn new(context: &'a InvocationContext, access: Access, args: Vec<Value>) -> Self {
		Self {
			chain: context.chain(),
			descriptor: context.descriptor(),
			context,
			cursor: 0,
			access,
			args,
		}
	}

	/// Runs the next interceptor, or the dispatcher once the chain is exhausted.
	pub fn invoke(&mut self) -> Result<Value> {
		match self.chain.get(self.cursor).cloned() {
			Some(next) => {
				self.cursor += 1;
				next.invoke(self)
			}
			None => {
				let context = self.context;
				context.dispatcher.dispatch(self)
			}
		}
	}

	pub fn context(&self) -> &'a InvocationContext {
		self.context
	}

	pub fn member(&self) -> &'a str {
		self.context.name()
	}

	pub fn access(&self) -> Access {
		self.access
	}

	pub fn args(&self) -> &[Value] {
		&self.args
	}

	pub fn args_mut(&mut self) -> &mut Vec<Value> {
		&mut self.args
	}

	/// Invocation-local copy of the member descriptor.
	pub fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	pub fn descriptor_mut(&mut self) -> &mut Descriptor {
		&mut self.descriptor
	}

	/// Number of interceptors still ahead of the cursor.
	pub fn remaining(&self) -> usize {
		self.chain.len().saturating_sub(self.cursor)
	}
}

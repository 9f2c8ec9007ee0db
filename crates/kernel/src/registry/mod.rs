//! Name-keyed store of registered managed objects.
//!
//! Registration is split into [`Registry::reserve`] and [`Registry::publish`]
//! so that lifecycle hooks can run between the two without holding the lock.
//! A reserved name blocks competing registrations but is invisible to
//! lookups; [`Registry::release`] abandons the reservation.

use std::sync::Arc;

use mantle_object_name::ObjectName;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::ContextLoader;
use crate::info::ObjectInstance;
use crate::interface::ManagedResource;
use crate::invoker::Invoker;
use crate::{ManagementError, Result};


/// One registered object.
pub struct RegistryEntry {
	name: ObjectName,
	invoker: Arc<Invoker>,
}

/// Shared handle returned by lookups; stays usable after unregistration.
pub type EntryHandle = Arc<RegistryEntry>;

impl RegistryEntry {
	pub fn new(name: ObjectName, invoker: Arc<Invoker>) -> Self {
		Self { name, invoker }
	}

	pub fn name(&self) -> &ObjectName {
		&self.name
	}

	pub fn class_name(&self) -> &str {
		self.invoker.class_name()
	}

	pub fn invoker(&self) -> &Arc<Invoker> {
		&self.invoker
	}

	pub fn resource(&self) -> &Arc<dyn ManagedResource> {
		self.invoker.resource()
	}

	pub fn context_loader(&self) -> Option<Arc<ContextLoader>> {
		self.invoker.context_loader()
	}

	pub fn instance(&self) -> ObjectInstance {
		ObjectInstance {
			name: self.name.clone(),
			class_name: self.class_name().to_owned(),
		}
	}

	/// True if both entries wrap the same resource instance.
	pub fn is_same_resource(&self, resource: &Arc<dyn ManagedResource>) -> bool {
		std::ptr::addr_eq(Arc::as_ptr(self.resource()), Arc::as_ptr(resource))
	}
}

impl std::fmt::Debug for RegistryEntry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RegistryEntry")
			.field("name", &self.name)
			.field("class_name", &self.class_name())
			.finish()
	}
}

#[derive(Default)]
struct RegistryState {
	entries: FxHashMap<ObjectName, EntryHandle>,
	reserved: FxHashSet<ObjectName>,
	/// Domain -> number of live entries in it.
	domains: FxHashMap<String, usize>,
}

#[derive(Default)]
pub struct Registry {
	state: RwLock<RegistryState>,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Claims `name` for an in-flight registration.
	pub fn reserve(&self, name: &ObjectName) -> Result<()> {
		let mut state = self.state.write();
		if state.entries.contains_key(name) || !state.reserved.insert(name.clone()) {
			return Err(ManagementError::DuplicateName(name.clone()));
		}
		Ok(())
	}

	/// Makes `entry` visible, consuming its reservation if there is one.
	pub fn publish(&self, entry: RegistryEntry) -> Result<EntryHandle> {
		let mut state = self.state.write();
		let name = entry.name.clone();
		if state.entries.contains_key(&name) {
			return Err(ManagementError::DuplicateName(name));
		}
		state.reserved.remove(&name);
		*state.domains.entry(name.domain().to_owned()).or_default() += 1;
		let handle = Arc::new(entry);
		state.entries.insert(name, Arc::clone(&handle));
		Ok(handle)
	}

	/// Abandons a reservation. No-op if `name` was not reserved.
	pub fn release(&self, name: &ObjectName) {
		self.state.write().reserved.remove(name);
	}

	/// Reserves and publishes in one step.
	pub fn register(&self, entry: RegistryEntry) -> Result<EntryHandle> {
		self.reserve(&entry.name)?;
		self.publish(entry)
	}

	pub fn remove(&self, name: &ObjectName) -> Result<EntryHandle> {
		let mut state = self.state.write();
		let entry = state
			.entries
			.remove(name)
			.ok_or_else(|| ManagementError::NotFound(name.clone()))?;
		let domain = name.domain();
		if let Some(count) = state.domains.get_mut(domain) {
			*count -= 1;
			if *count == 0 {
				state.domains.remove(domain);
			}
		}
		Ok(entry)
	}

	pub fn get(&self, name: &ObjectName) -> Result<EntryHandle> {
		self.state
			.read()
			.entries
			.get(name)
			.cloned()
			.ok_or_else(|| ManagementError::NotFound(name.clone()))
	}

	pub fn contains(&self, name: &ObjectName) -> bool {
		self.state.read().entries.contains_key(name)
	}

	/// Entries matching `pattern`, ordered by canonical name.
	pub fn find(&self, pattern: &ObjectName) -> Vec<EntryHandle> {
		let state = self.state.read();
		if !pattern.is_pattern() {
			return state.entries.get(pattern).cloned().into_iter().collect();
		}
		let mut found: Vec<_> = state
			.entries
			.iter()
			.filter(|(name, _)| pattern.matches(name))
			.map(|(_, entry)| Arc::clone(entry))
			.collect();
		drop(state);
		found.sort_by(|a, b| a.name.cmp(&b.name));
		found
	}

	pub fn count(&self) -> usize {
		self.state.read().entries.len()
	}

	/// Domains with at least one live entry, sorted.
	pub fn domains(&self) -> Vec<String> {
		let mut domains: Vec<_> = self.state.read().domains.keys().cloned().collect();
		domains.sort_unstable();
		domains
	}
}

//! Call-scoped execution context.
//!
//! Each registered object may be bound to a [`ContextLoader`], the module or
//! deployment unit it belongs to. While a call into the object runs, that
//! loader is the thread's *current* loader, so code the object calls can find
//! its own module's resources. [`ContextGuard`] installs a loader and restores
//! the previous one when dropped, including during unwinding.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

thread_local! {
	static CURRENT: RefCell<Option<Arc<ContextLoader>>> = const { RefCell::new(None) };
}

static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a module that owns managed objects.
///
/// The registry only keeps weak references to loaders; their lifetime belongs
/// to whoever deployed the module.
pub struct ContextLoader {
	id: u64,
	name: String,
}

impl ContextLoader {
	pub fn new(name: impl Into<String>) -> Arc<Self> {
		Arc::new(Self {
			id: NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed),
			name: name.into(),
		})
	}

	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn name(&self) -> &str {
		&self.name
	}
}

impl PartialEq for ContextLoader {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for ContextLoader {}

impl fmt::Debug for ContextLoader {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ContextLoader({}#{})", self.name, self.id)
	}
}

/// Returns the loader installed on this thread, if any.
pub fn current() -> Option<Arc<ContextLoader>> {
	CURRENT.with(|c| c.borrow().clone())
}

/// Installs a loader for the guard's lifetime.
#[must_use = "the previous loader is restored as soon as the guard is dropped"]
pub struct ContextGuard {
	previous: Option<Arc<ContextLoader>>,
}

impl ContextGuard {
	/// Makes `loader` current. `None` clears the current loader.
	pub fn enter(loader: Option<Arc<ContextLoader>>) -> Self {
		let previous = CURRENT.with(|c| c.replace(loader));
		Self { previous }
	}
}

impl Drop for ContextGuard {
	fn drop(&mut self) {
		let previous = self.previous.take();
		CURRENT.with(|c| *c.borrow_mut() = previous);
	}
}

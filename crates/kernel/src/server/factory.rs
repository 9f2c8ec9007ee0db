use std::sync::Arc;

use crate::context::ContextLoader;
use crate::interface::ManagedResource;
use crate::{TargetError, Value};

/// Builds managed resources for [`super::MBeanServer::create_mbean`].
///
/// Factories are registered under a class name; the server checks the
/// caller's arguments against the declared signature before `create` runs.
pub trait ResourceFactory: Send + Sync {
	fn create(&self, args: &[Value]) -> Result<Arc<dyn ManagedResource>, TargetError>;

	/// Loader the created object is bound to.
	fn context_loader(&self) -> Option<Arc<ContextLoader>> {
		None
	}
}

//! Managed-object registry and invocation dispatch.
//!
//! Resources describe themselves with a [`ManagementInterface`] and are
//! registered with an [`MBeanServer`] under an [`ObjectName`]. Every attribute
//! read, write and operation call then travels:
//!
//! ```text
//! MBeanServer -> Registry lookup -> Invoker -> Invocation
//!     -> interceptor chain -> Dispatcher -> resource
//! ```
//!
//! with the resource's [`ContextLoader`] current for the duration of the call.
//! Errors from any layer come back as [`ManagementError`].

pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod info;
pub mod interface;
pub mod invocation;
pub mod invoker;
pub mod notification;
pub mod permission;
pub mod query;
pub mod registry;
pub mod server;
pub mod value;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, ServerConfig};
pub use context::{ContextGuard, ContextLoader};
pub use descriptor::Descriptor;
pub use error::{LifecyclePhase, ManagementError, Result, TargetError};
pub use info::{Attribute, AttributeInfo, Impact, ManagementInfo, NotificationInfo, ObjectInstance, OperationInfo};
pub use interface::{AttributeDef, ManagedResource, ManagementInterface, OperationDef, RegistrationLifecycle};
pub use invocation::{AttributeCacheInterceptor, Interceptor, Invocation, TracingInterceptor};
pub use invoker::{Invoker, InvokerState, Member};
pub use mantle_object_name::{MalformedObjectName, ObjectName};
pub use notification::{
	BroadcasterSupport, Notification, NotificationBroadcaster, NotificationFilter, NotificationListener,
	NotificationSource, TypeFilter,
};
pub use permission::{Action, PermissionChecker, PermissionRequest};
pub use server::MBeanServer;
pub use value::Value;

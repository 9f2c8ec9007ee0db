//! Error taxonomy for registry, dispatch and notification calls.
//!
//! Resource code reports failures with [`TargetError`]; the dispatcher and
//! the server normalize everything callers see into [`ManagementError`].

use mantle_object_name::{MalformedObjectName, ObjectName};

use crate::config::ConfigError;
use crate::permission::Action;

/// Failure raised by managed-resource code (accessors, operations, hooks).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
	/// Application-level failure; the caller may recover.
	#[error("{0}")]
	Failure(String),
	/// Unrecoverable condition inside the target; do not retry.
	#[error("fatal: {0}")]
	Fault(String),
	/// The target refused a value passed to it.
	#[error("invalid value: {0}")]
	InvalidValue(String),
}

impl TargetError {
	pub fn failure(msg: impl Into<String>) -> Self {
		Self::Failure(msg.into())
	}

	pub fn fault(msg: impl Into<String>) -> Self {
		Self::Fault(msg.into())
	}

	pub fn invalid_value(msg: impl Into<String>) -> Self {
		Self::InvalidValue(msg.into())
	}
}

/// Registration lifecycle phase, carried by [`ManagementError::Lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
	PreRegister,
	PostRegister,
	PreDeregister,
	PostDeregister,
}

impl std::fmt::Display for LifecyclePhase {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Self::PreRegister => "pre-register",
			Self::PostRegister => "post-register",
			Self::PreDeregister => "pre-deregister",
			Self::PostDeregister => "post-deregister",
		})
	}
}

/// Error returned by every server, registry and invoker operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ManagementError {
	#[error("no managed object registered as {0}")]
	NotFound(ObjectName),

	#[error("a managed object is already registered as {0}")]
	DuplicateName(ObjectName),

	#[error("{class_name} is not manageable: {reason}")]
	NotManageable { class_name: String, reason: String },

	#[error("no attribute {0:?}")]
	AttributeNotFound(String),

	#[error("no operation {name:?} taking ({})", .signature.join(", "))]
	OperationNotFound { name: String, signature: Vec<String> },

	#[error("operation {name:?} has no overload taking ({})", .signature.join(", "))]
	NoSuchMethod { name: String, signature: Vec<String> },

	#[error("attribute {0:?} is not readable")]
	NotReadable(String),

	#[error("attribute {0:?} is not writable")]
	NotWritable(String),

	#[error("invalid value for {member:?}: {reason}")]
	InvalidValue { member: String, reason: String },

	#[error("cannot dispatch {member:?}: {reason}")]
	DispatchFailure { member: String, reason: String },

	#[error("{member:?} failed: {source}")]
	TargetFailure {
		member: String,
		#[source]
		source: TargetError,
	},

	#[error("{member:?} raised a fatal error: {source}")]
	TargetFault {
		member: String,
		#[source]
		source: TargetError,
	},

	#[error("permission denied: {action} on {target}")]
	PermissionDenied { action: Action, target: String },

	#[error("listener is not registered with {0}")]
	ListenerNotFound(ObjectName),

	#[error("{0} does not broadcast notifications")]
	NotABroadcaster(ObjectName),

	#[error(transparent)]
	MalformedName(#[from] MalformedObjectName),

	#[error("{0} is a pattern and cannot name a single managed object")]
	PatternNotAllowed(ObjectName),

	#[error("no object name was supplied and the resource did not choose one")]
	MissingName,

	#[error("{0} lies in a reserved domain")]
	Reserved(ObjectName),

	#[error("{phase} hook for {name} rejected: {source}")]
	Lifecycle {
		phase: LifecyclePhase,
		name: String,
		#[source]
		source: TargetError,
	},

	#[error("no factory registered for class {0:?}")]
	UnknownClass(String),

	#[error("{0} is not supported")]
	NotSupported(&'static str),

	#[error(transparent)]
	Config(#[from] ConfigError),
}

impl ManagementError {
	/// Normalizes a [`TargetError`] raised while executing `member`.
	pub fn from_target(member: &str, error: TargetError) -> Self {
		match error {
			TargetError::Failure(_) => Self::TargetFailure {
				member: member.to_owned(),
				source: error,
			},
			TargetError::Fault(_) => Self::TargetFault {
				member: member.to_owned(),
				source: error,
			},
			TargetError::InvalidValue(reason) => Self::InvalidValue {
				member: member.to_owned(),
				reason,
			},
		}
	}

	pub(crate) fn dispatch(member: &str, reason: impl Into<String>) -> Self {
		Self::DispatchFailure {
			member: member.to_owned(),
			reason: reason.into(),
		}
	}

	pub(crate) fn not_manageable(class_name: &str, reason: impl Into<String>) -> Self {
		Self::NotManageable {
			class_name: class_name.to_owned(),
			reason: reason.into(),
		}
	}
}

pub type Result<T, E = ManagementError> = std::result::Result<T, E>;

//! Server configuration.

use mantle_object_name::ObjectName;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::server::RESERVED_DOMAIN;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to parse server config: {0}")]
	Parse(String),
	#[error("default domain {0:?} is not a plain domain name")]
	InvalidDefaultDomain(String),
}

/// Settings for an [`crate::MBeanServer`].
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
	/// Domain substituted into names registered or queried with an empty domain.
	pub default_domain: String,
	/// Reported by the server delegate; generated when absent.
	pub server_id: Option<String>,
	/// Reduce dotted operation names (`a.b.op`) to their last segment.
	pub strip_operation_qualifier: bool,
	/// Put a tracing interceptor on every newly registered object.
	pub trace_invocations: bool,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			default_domain: "DefaultDomain".to_owned(),
			server_id: None,
			strip_operation_qualifier: false,
			trace_invocations: false,
		}
	}
}

impl ServerConfig {
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		let domain = &self.default_domain;
		let plain = ObjectName::with_property(domain, "type", "check").is_ok_and(|n| !n.is_pattern());
		if domain.is_empty() || domain == RESERVED_DOMAIN || !plain {
			return Err(ConfigError::InvalidDefaultDomain(domain.clone()));
		}
		Ok(())
	}

	pub(crate) fn resolve_server_id(&self) -> String {
		match &self.server_id {
			Some(id) => id.clone(),
			None => format!("mantle-{}", Uuid::new_v4()),
		}
	}
}

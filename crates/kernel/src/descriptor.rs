//! Auxiliary key/value metadata attached to managed objects and their members.

use std::collections::BTreeMap;

use crate::Value;

/// Well-known descriptor field names.
pub mod fields {
	/// Seconds an attribute value stays fresh for [`crate::AttributeCacheInterceptor`].
	/// `0` caches forever; negative or absent disables caching.
	pub const CURRENCY_TIME_LIMIT: &str = "currencyTimeLimit";
	pub const DISPLAY_NAME: &str = "displayName";
	pub const SEVERITY: &str = "severity";
}

/// Ordered field map. Keys are case-sensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Descriptor {
	fields: BTreeMap<String, Value>,
}

impl Descriptor {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder-style insert.
	pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.set(key, value);
		self
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.fields.get(key)
	}

	/// Returns the previous value.
	pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
		self.fields.insert(key.into(), value.into())
	}

	pub fn remove(&mut self, key: &str) -> Option<Value> {
		self.fields.remove(key)
	}

	pub fn len(&self) -> usize {
		self.fields.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.fields.iter().map(|(k, v)| (k.as_str(), v))
	}
}

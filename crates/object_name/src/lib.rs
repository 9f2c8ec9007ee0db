//! Structured names for managed objects.
//!
//! An [`ObjectName`] is a domain plus an unordered set of key properties:
//!
//! ```text
//! domain:key1=value1,key2=value2
//! ```
//!
//! Names are immutable once parsed. Equality, hashing and ordering use the
//! canonical form, in which key properties are sorted by key, so
//! `d:b=2,a=1` and `d:a=1,b=2` are the same name.
//!
//! # Patterns
//!
//! A name may also act as a query pattern:
//!
//! * Domain pattern: the domain contains `*` (any run of characters) or `?`
//!   (exactly one character).
//! * Property-list pattern: the key property list ends in `*`. A candidate
//!   matches when it carries at least the listed properties with equal values.
//!
//! `*:*` (or just `*`) matches every name. Patterns cannot be registered; they
//! are only used with [`ObjectName::matches`].

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

mod parse;
mod pattern;


pub use parse::{quote, unquote};

/// Error produced when a string is not a well-formed object name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedObjectName {
	#[error("missing ':' domain separator in {0:?}")]
	MissingDomainSeparator(String),
	#[error("domain {0:?} contains an illegal character")]
	InvalidDomain(String),
	#[error("key property list is empty")]
	EmptyKeyList,
	#[error("key property {0:?} has no '='")]
	MissingEquals(String),
	#[error("key property has an empty key")]
	EmptyKey,
	#[error("key {0:?} contains an illegal character")]
	InvalidKey(String),
	#[error("value for key {0:?} is empty")]
	EmptyValue(String),
	#[error("value {value:?} for key {key:?} contains an illegal character")]
	InvalidValue { key: String, value: String },
	#[error("malformed quoted value {0:?}")]
	InvalidQuotedValue(String),
	#[error("duplicate key {0:?}")]
	DuplicateKey(String),
	#[error("wildcard '*' must be the last key property")]
	MisplacedWildcard,
}

/// Immutable structured identifier of a managed object.
#[derive(Clone)]
pub struct ObjectName {
	domain: Box<str>,
	properties: BTreeMap<Box<str>, Box<str>>,
	domain_pattern: bool,
	property_pattern: bool,
	canonical: Box<str>,
}

impl ObjectName {
	/// Parses a name from its string form.
	pub fn parse(s: &str) -> Result<Self, MalformedObjectName> {
		let parsed = parse::parse(s)?;
		Ok(Self::assemble(
			parsed.domain,
			parsed.properties,
			parsed.property_pattern,
		))
	}

	/// Builds a non-pattern name from a domain and key properties.
	pub fn new<I, K, V>(domain: &str, properties: I) -> Result<Self, MalformedObjectName>
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		parse::validate_domain(domain)?;
		let mut map = BTreeMap::new();
		for (key, value) in properties {
			let key: String = key.into();
			let value: String = value.into();
			parse::validate_key(&key)?;
			parse::validate_value(&key, &value)?;
			if map.insert(key.clone().into_boxed_str(), value.into_boxed_str()).is_some() {
				return Err(MalformedObjectName::DuplicateKey(key));
			}
		}
		if map.is_empty() {
			return Err(MalformedObjectName::EmptyKeyList);
		}
		Ok(Self::assemble(domain.into(), map, false))
	}

	/// Shorthand for a name with a single key property.
	pub fn with_property(domain: &str, key: &str, value: &str) -> Result<Self, MalformedObjectName> {
		Self::new(domain, [(key, value)])
	}

	/// The pattern matching every name (`*:*`).
	pub fn wildcard() -> Self {
		Self::assemble("*".into(), BTreeMap::new(), true)
	}

	/// Returns a copy of this name placed in another domain.
	pub fn with_domain(&self, domain: &str) -> Result<Self, MalformedObjectName> {
		parse::validate_domain(domain)?;
		Ok(Self::assemble(
			domain.into(),
			self.properties.clone(),
			self.property_pattern,
		))
	}

	fn assemble(domain: Box<str>, properties: BTreeMap<Box<str>, Box<str>>, property_pattern: bool) -> Self {
		let domain_pattern = pattern::is_glob(&domain);
		let mut canonical = String::with_capacity(domain.len() + 16);
		canonical.push_str(&domain);
		canonical.push(':');
		canonical.push_str(&canonical_key_list(&properties));
		if property_pattern {
			if !properties.is_empty() {
				canonical.push(',');
			}
			canonical.push('*');
		}
		Self {
			domain,
			properties,
			domain_pattern,
			property_pattern,
			canonical: canonical.into_boxed_str(),
		}
	}

	pub fn domain(&self) -> &str {
		&self.domain
	}

	/// Returns the raw value of a key property, quotes included.
	pub fn key_property(&self, key: &str) -> Option<&str> {
		self.properties.get(key).map(|v| &**v)
	}

	/// Iterates key properties in canonical (key-sorted) order.
	pub fn key_properties(&self) -> impl Iterator<Item = (&str, &str)> {
		self.properties.iter().map(|(k, v)| (&**k, &**v))
	}

	/// Canonical key property list, without the pattern marker.
	pub fn canonical_key_property_list(&self) -> String {
		canonical_key_list(&self.properties)
	}

	/// Canonical string form, used for equality, ordering and display.
	pub fn canonical_name(&self) -> &str {
		&self.canonical
	}

	pub fn is_pattern(&self) -> bool {
		self.domain_pattern || self.property_pattern
	}

	pub fn is_domain_pattern(&self) -> bool {
		self.domain_pattern
	}

	pub fn is_property_pattern(&self) -> bool {
		self.property_pattern
	}

	/// Returns true if this name, read as a pattern, selects `candidate`.
	///
	/// A non-pattern name only matches itself. `candidate` is compared
	/// literally even if it is itself a pattern.
	pub fn matches(&self, candidate: &ObjectName) -> bool {
		let domain_ok = if self.domain_pattern {
			pattern::glob_match(&self.domain, &candidate.domain)
		} else {
			self.domain == candidate.domain
		};
		if !domain_ok {
			return false;
		}
		if self.property_pattern {
			self.properties
				.iter()
				.all(|(k, v)| candidate.properties.get(k) == Some(v))
		} else {
			self.properties == candidate.properties
		}
	}
}

fn canonical_key_list(properties: &BTreeMap<Box<str>, Box<str>>) -> String {
	let mut out = String::new();
	for (i, (key, value)) in properties.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}
		out.push_str(key);
		out.push('=');
		out.push_str(value);
	}
	out
}

impl PartialEq for ObjectName {
	fn eq(&self, other: &Self) -> bool {
		self.canonical == other.canonical
	}
}

impl Eq for ObjectName {}

impl Hash for ObjectName {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.canonical.hash(state);
	}
}

impl PartialOrd for ObjectName {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for ObjectName {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.canonical.cmp(&other.canonical)
	}
}

impl fmt::Display for ObjectName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.canonical)
	}
}

impl fmt::Debug for ObjectName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ObjectName({})", self.canonical)
	}
}

impl FromStr for ObjectName {
	type Err = MalformedObjectName;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl TryFrom<&str> for ObjectName {
	type Error = MalformedObjectName;

	fn try_from(s: &str) -> Result<Self, Self::Error> {
		Self::parse(s)
	}
}

impl serde::Serialize for ObjectName {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.canonical)
	}
}

impl<'de> serde::Deserialize<'de> for ObjectName {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		Self::parse(&raw).map_err(serde::de::Error::custom)
	}
}

use std::collections::BTreeMap;

use crate::MalformedObjectName;

pub(crate) struct Parsed {
	pub domain: Box<str>,
	pub properties: BTreeMap<Box<str>, Box<str>>,
	pub property_pattern: bool,
}

const KEY_ILLEGAL: &[char] = &[',', '=', ':', '*', '?', '"', '\n'];
const VALUE_ILLEGAL: &[char] = &[',', '=', ':', '"', '*', '?', '\n'];

pub(crate) fn parse(s: &str) -> Result<Parsed, MalformedObjectName> {
	if s == "*" {
		return Ok(Parsed {
			domain: "*".into(),
			properties: BTreeMap::new(),
			property_pattern: true,
		});
	}

	let (domain, rest) = s
		.split_once(':')
		.ok_or_else(|| MalformedObjectName::MissingDomainSeparator(s.to_owned()))?;
	validate_domain(domain)?;
	if rest.is_empty() {
		return Err(MalformedObjectName::EmptyKeyList);
	}

	let segments = split_segments(rest)?;
	let last = segments.len() - 1;
	let mut properties = BTreeMap::new();
	let mut property_pattern = false;

	for (i, segment) in segments.into_iter().enumerate() {
		if segment == "*" {
			if i != last {
				return Err(MalformedObjectName::MisplacedWildcard);
			}
			property_pattern = true;
			continue;
		}
		let (key, value) = segment
			.split_once('=')
			.ok_or_else(|| MalformedObjectName::MissingEquals(segment.to_owned()))?;
		validate_key(key)?;
		validate_value(key, value)?;
		if properties.insert(Box::from(key), Box::from(value)).is_some() {
			return Err(MalformedObjectName::DuplicateKey(key.to_owned()));
		}
	}

	Ok(Parsed {
		domain: domain.into(),
		properties,
		property_pattern,
	})
}

/// Splits a key property list on commas that are not inside a quoted value.
fn split_segments(rest: &str) -> Result<Vec<&str>, MalformedObjectName> {
	let mut segments = Vec::new();
	let mut start = 0;
	let mut in_quotes = false;
	let mut escaped = false;

	for (i, c) in rest.char_indices() {
		if escaped {
			escaped = false;
			continue;
		}
		match c {
			'\\' if in_quotes => escaped = true,
			'"' => in_quotes = !in_quotes,
			',' if !in_quotes => {
				segments.push(&rest[start..i]);
				start = i + 1;
			}
			_ => {}
		}
	}
	if in_quotes {
		return Err(MalformedObjectName::InvalidQuotedValue(rest[start..].to_owned()));
	}
	segments.push(&rest[start..]);

	if segments.iter().any(|s| s.is_empty()) {
		return Err(MalformedObjectName::EmptyKey);
	}
	Ok(segments)
}

pub(crate) fn validate_domain(domain: &str) -> Result<(), MalformedObjectName> {
	if domain.contains([':', '\n']) {
		return Err(MalformedObjectName::InvalidDomain(domain.to_owned()));
	}
	Ok(())
}

pub(crate) fn validate_key(key: &str) -> Result<(), MalformedObjectName> {
	if key.is_empty() {
		return Err(MalformedObjectName::EmptyKey);
	}
	if key.contains(KEY_ILLEGAL) {
		return Err(MalformedObjectName::InvalidKey(key.to_owned()));
	}
	Ok(())
}

pub(crate) fn validate_value(key: &str, value: &str) -> Result<(), MalformedObjectName> {
	if value.is_empty() {
		return Err(MalformedObjectName::EmptyValue(key.to_owned()));
	}
	if value.starts_with('"') {
		return validate_quoted(value);
	}
	if value.contains(VALUE_ILLEGAL) {
		return Err(MalformedObjectName::InvalidValue {
			key: key.to_owned(),
			value: value.to_owned(),
		});
	}
	Ok(())
}

fn validate_quoted(value: &str) -> Result<(), MalformedObjectName> {
	let bad = || MalformedObjectName::InvalidQuotedValue(value.to_owned());
	if value.len() < 2 || !value.ends_with('"') {
		return Err(bad());
	}
	let inner = &value[1..value.len() - 1];
	let mut chars = inner.chars();
	while let Some(c) = chars.next() {
		match c {
			'\\' => match chars.next() {
				Some('"' | '\\' | 'n' | '*' | '?') => {}
				_ => return Err(bad()),
			},
			'"' | '\n' => return Err(bad()),
			_ => {}
		}
	}
	Ok(())
}

/// Quotes an arbitrary string so it can be used as a key property value.
pub fn quote(s: &str) -> String {
	let mut out = String::with_capacity(s.len() + 2);
	out.push('"');
	for c in s.chars() {
		match c {
			'"' => out.push_str("\\\""),
			'\\' => out.push_str("\\\\"),
			'\n' => out.push_str("\\n"),
			'*' => out.push_str("\\*"),
			'?' => out.push_str("\\?"),
			c => out.push(c),
		}
	}
	out.push('"');
	out
}

/// Reverses [`quote`]. Returns `None` if `s` is not a well-formed quoted value.
pub fn unquote(s: &str) -> Option<String> {
	validate_quoted(s).ok()?;
	let inner = &s[1..s.len() - 1];
	let mut out = String::with_capacity(inner.len());
	let mut chars = inner.chars();
	while let Some(c) = chars.next() {
		if c == '\\' {
			match chars.next()? {
				'n' => out.push('\n'),
				other => out.push(other),
			}
		} else {
			out.push(c);
		}
	}
	Some(out)
}

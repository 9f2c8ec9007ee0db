//! Built-in interceptors.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{Access, Interceptor, Invocation};
use crate::descriptor::fields::CURRENCY_TIME_LIMIT;
use crate::{Descriptor, Result, Value};

/// Logs every call passing through it.
#[derive(Debug, Default)]
pub struct TracingInterceptor;

impl Interceptor for TracingInterceptor {
	fn name(&self) -> &str {
		"tracing"
	}

	fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value> {
		let member = invocation.member();
		let access = invocation.access();
		let started = Instant::now();
		let result = invocation.invoke();
		let elapsed = started.elapsed();
		match &result {
			Ok(_) => tracing::debug!(member, %access, ?elapsed, "managed call completed"),
			Err(error) => tracing::debug!(member, %access, ?elapsed, %error, "managed call failed"),
		}
		result
	}
}

enum Freshness {
	Forever,
	For(Duration),
}

impl Freshness {
	fn from_descriptor(descriptor: &Descriptor) -> Option<Self> {
		let raw = descriptor.get(CURRENCY_TIME_LIMIT)?;
		let secs = match raw {
			Value::Str(s) => s.trim().parse::<i64>().ok()?,
			other => other.as_long()?,
		};
		match secs {
			s if s < 0 => None,
			0 => Some(Self::Forever),
			s => Some(Self::For(Duration::from_secs(s.unsigned_abs()))),
		}
	}

	fn is_fresh(&self, stored: Instant) -> bool {
		match self {
			Self::Forever => true,
			Self::For(limit) => stored.elapsed() < *limit,
		}
	}
}

struct CachedValue {
	value: Value,
	stored: Instant,
}

/// Serves attribute reads from a cache while the value is younger than the
/// attribute's `currencyTimeLimit` descriptor field.
///
/// Writes drop the cached entry; the next read refills it. Cache entries are
/// keyed by attribute name, so use one instance per managed object.
/// Operations pass straight through.
#[derive(Default)]
pub struct AttributeCacheInterceptor {
	entries: Mutex<FxHashMap<String, CachedValue>>,
}

impl AttributeCacheInterceptor {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn invalidate(&self, attribute: &str) {
		self.entries.lock().remove(attribute);
	}

	fn lookup(&self, attribute: &str, freshness: &Freshness) -> Option<Value> {
		let entries = self.entries.lock();
		let cached = entries.get(attribute)?;
		freshness.is_fresh(cached.stored).then(|| cached.value.clone())
	}

	fn store(&self, attribute: &str, value: Value) {
		self.entries.lock().insert(
			attribute.to_owned(),
			CachedValue {
				value,
				stored: Instant::now(),
			},
		);
	}
}

impl Interceptor for AttributeCacheInterceptor {
	fn name(&self) -> &str {
		"attribute-cache"
	}

	fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value> {
		let member = invocation.member();
		match invocation.access() {
			Access::Get => {
				let Some(freshness) = Freshness::from_descriptor(invocation.descriptor()) else {
					return invocation.invoke();
				};
				if let Some(hit) = self.lookup(member, &freshness) {
					tracing::trace!(member, "attribute cache hit");
					return Ok(hit);
				}
				let value = invocation.invoke()?;
				self.store(member, value.clone());
				Ok(value)
			}
			Access::Set => {
				// Inner interceptors may rewrite the value, so only a read can refill.
				let result = invocation.invoke();
				self.invalidate(member);
				result
			}
			Access::Invoke => invocation.invoke(),
		}
	}
}

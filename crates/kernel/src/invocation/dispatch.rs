//! Terminal step of every chain: the call into the resource itself.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use super::{Access, Invocation};
use crate::interface::{Getter, OperationHandler, Setter};
use crate::value::types;
use crate::{ManagementError, Result, TargetError, Value};

/// Accessor bound when the invocation context was built.
pub(crate) enum Dispatcher {
	Attribute {
		getter: Option<Getter>,
		setter: Option<Setter>,
	},
	Operation {
		handler: OperationHandler,
	},
}

impl Dispatcher {
	pub(crate) fn dispatch(&self, invocation: &mut Invocation<'_>) -> Result<Value> {
		let context = invocation.context();
		let member = context.name();
		tracing::trace!(member, access = %invocation.access(), "dispatch");

		match (self, invocation.access()) {
			(Self::Attribute { getter: Some(getter), .. }, Access::Get) => {
				let value = guarded(member, || getter())?;
				check_return(member, context.type_name(), &value)?;
				Ok(value)
			}
			(Self::Attribute { setter: Some(setter), .. }, Access::Set) => {
				let [value] = std::mem::take(invocation.args_mut())
					.try_into()
					.map_err(|args: Vec<Value>| {
						ManagementError::dispatch(member, format!("setter takes one value, got {}", args.len()))
					})?;
				if !value.conforms_to(context.type_name()) {
					return Err(ManagementError::InvalidValue {
						member: member.to_owned(),
						reason: format!("expected {}, got {}", context.type_name(), value.type_name()),
					});
				}
				guarded(member, || setter(value))?;
				Ok(Value::Null)
			}
			(Self::Operation { handler }, Access::Invoke) => {
				let signature = context.signature();
				let args = invocation.args();
				if args.len() != signature.len() {
					return Err(ManagementError::dispatch(
						member,
						format!("expected {} arguments, got {}", signature.len(), args.len()),
					));
				}
				if let Some((i, (arg, ty))) = args
					.iter()
					.zip(signature)
					.enumerate()
					.find(|(_, (arg, ty))| !arg.conforms_to(ty))
				{
					return Err(ManagementError::dispatch(
						member,
						format!("argument {i} is {}, declared {ty}", arg.type_name()),
					));
				}
				let value = guarded(member, || handler(args))?;
				check_return(member, context.type_name(), &value)?;
				Ok(value)
			}
			(_, access) => Err(ManagementError::dispatch(member, format!("no accessor bound for {access}"))),
		}
	}
}

/// Runs target code, mapping its errors and panics into the taxonomy.
fn guarded<T>(member: &str, f: impl FnOnce() -> std::result::Result<T, TargetError>) -> Result<T> {
	match catch_unwind(AssertUnwindSafe(f)) {
		Ok(Ok(value)) => Ok(value),
		Ok(Err(error)) => Err(ManagementError::from_target(member, error)),
		Err(payload) => {
			let message = panic_message(payload.as_ref());
			tracing::warn!(member, %message, "managed object panicked");
			Err(ManagementError::TargetFault {
				member: member.to_owned(),
				source: TargetError::Fault(message),
			})
		}
	}
}

fn check_return(member: &str, declared: &str, value: &Value) -> Result<()> {
	if declared == types::VOID || value.conforms_to(declared) {
		return Ok(());
	}
	Err(ManagementError::dispatch(
		member,
		format!("returned {}, declared {declared}", value.type_name()),
	))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		(*s).to_owned()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"panic with non-string payload".to_owned()
	}
}

//! Parameter binding and output write-back.
//!
//! Binding walks a contract's members in declaration order and produces one
//! [`CallParameter`] per member. It runs entirely before a connection is
//! opened, so a missing required value never reaches the backend.

use conduit_core::{
    Arguments, CallContext, CallParameter, CancellationToken, ContractDescriptor, Direction,
    Error, Execution, InstanceKey, MemberDescriptor, MemberLookup, Result, TransformContext,
    Value,
};

use crate::notify::{Notifier, UnresolvedMember};

/// Sibling lookup over the live arguments.
struct ArgumentLookup<'a> {
    args: &'a dyn Arguments,
}

impl MemberLookup for ArgumentLookup<'_> {
    fn lookup(&self, member: &str) -> Option<Value> {
        self.args.get(member)
    }
}

fn instance_of(context: &CallContext, args: &dyn Arguments) -> InstanceKey {
    let slot = args as *const _ as *const () as usize;
    InstanceKey::new(context.call_id(), slot)
}

/// Current value of `member`, following its derivation path if it has one.
fn member_value(member: &MemberDescriptor, args: &dyn Arguments) -> Value {
    let Some(path) = &member.derived_from else {
        return args.get(&member.name).unwrap_or(Value::Null);
    };
    let mut segments = path.iter();
    let mut current = match segments.next().and_then(|root| args.get(root)) {
        Some(root) => root,
        None => return Value::Null,
    };
    for segment in segments {
        current = match current.field(segment) {
            Some(next) => next.clone(),
            None => return Value::Null,
        };
    }
    current
}

/// Bind `args` against `descriptor`.
///
/// Output-only members become `Null` placeholders. Input members are read,
/// checked for presence when required, passed through their outgoing
/// transform and registered under their source name.
pub(crate) fn bind(
    descriptor: &ContractDescriptor,
    args: &dyn Arguments,
    context: &CallContext,
    cancel: &CancellationToken,
) -> Result<Vec<CallParameter>> {
    cancel.check()?;

    let lookup = ArgumentLookup { args };
    let instance = instance_of(context, args);
    let mut parameters = Vec::with_capacity(descriptor.members().len());

    for member in descriptor.members() {
        if member.direction == Direction::Out {
            parameters.push(CallParameter {
                name: member.source_name.clone(),
                value: Value::Null,
                direction: Direction::Out,
                is_transformed: false,
            });
            continue;
        }

        let value = member_value(member, args);
        if member.required && value.is_null() {
            return Err(Error::Binding {
                contract: descriptor.name().to_string(),
                member: member.name.clone(),
                reason: "required value is missing".to_string(),
            });
        }

        // Optional and absent: bound as Null, never transformed.
        let (value, is_transformed) = match &member.transform {
            Some(_) if value.is_null() => (Value::Null, false),
            Some(transform) => {
                let ctx = TransformContext {
                    owner: descriptor.name(),
                    member: &member.name,
                    call: Some(context),
                    siblings: &lookup,
                    instance,
                };
                let bound = transform
                    .to_source(value, &ctx)
                    .map_err(|e| e.into_binding(descriptor.name(), &member.name))?;
                (bound, true)
            }
            None => (value, false),
        };

        parameters.push(CallParameter {
            name: member.source_name.clone(),
            value,
            direction: member.direction,
            is_transformed,
        });
    }

    Ok(parameters)
}

/// Copy output parameter values back onto the arguments.
///
/// Every incoming transform runs before the first write, so a failing
/// transform leaves the arguments untouched.
pub(crate) fn write_back(
    descriptor: &ContractDescriptor,
    execution: &Execution,
    args: &mut dyn Arguments,
    context: &CallContext,
    notifier: &Notifier,
) -> Result<()> {
    let mut pending = Vec::new();
    {
        let shared: &dyn Arguments = &*args;
        let lookup = ArgumentLookup { args: shared };
        let instance = instance_of(context, shared);

        for member in descriptor.members().iter().filter(|m| m.direction.is_output()) {
            let Some(raw) = execution.output(&member.source_name) else {
                notifier.unresolved_member(&UnresolvedMember {
                    context,
                    member: &member.name,
                    reason: "backend returned no value for the output parameter",
                });
                continue;
            };
            let value = match &member.transform {
                Some(transform) => {
                    let ctx = TransformContext {
                        owner: descriptor.name(),
                        member: &member.name,
                        call: Some(context),
                        siblings: &lookup,
                        instance,
                    };
                    transform
                        .from_source(raw.clone(), &ctx)
                        .map_err(|e| e.into_binding(descriptor.name(), &member.name))?
                }
                None => raw.clone(),
            };
            pending.push((member, value));
        }
    }

    for (member, value) in pending {
        if !args.set_output(&member.name, value)? {
            notifier.unresolved_member(&UnresolvedMember {
                context,
                member: &member.name,
                reason: "arguments do not accept output values",
            });
        }
    }
    Ok(())
}

//! Apply an edit script to a document in place.
//!
//! Deltas apply in order against a mutable value. Context frames
//! navigate into their child, apply their nested deltas bottom-up, and
//! leave the rewritten child in place. Structural operations address
//! object keys or array indices; a root address on an insert replaces
//! the whole target, on a delete it empties it to an object.
//!
//! Application stops at the first failing delta. Already-applied deltas
//! are not rolled back; patching is not transactional.

use crate::addr::Addr;
use crate::delta::{Delta, Op};
use crate::error::{DiffError, DiffResult};
use crate::value::Value;

/// Apply `deltas` to `target`, mutating it in place.
pub fn patch(deltas: &[Delta], target: &mut Value) -> DiffResult<()> {
    for delta in deltas {
        apply(target, delta)?;
    }
    Ok(())
}

fn apply(target: &mut Value, delta: &Delta) -> DiffResult<()> {
    // nested frames patch their child first, bottom-up
    if !delta.deltas.is_empty() {
        let child = child_mut(target, &delta.addr)?;
        for nested in &delta.deltas {
            apply(child, nested)?;
        }
    }

    match delta.op {
        Op::Context => Ok(()),
        Op::Insert => insert(target, &delta.addr, required_value(delta)?),
        Op::Delete => remove(target, &delta.addr).map(|_| ()),
        Op::Update => update(target, &delta.addr, required_value(delta)?),
        Op::Move => {
            let source = delta
                .source_path
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| DiffError::MissingSourcePath {
                    addr: delta.addr.to_string(),
                })?;
            let (parent_path, last) = source.split_at(source.len() - 1);
            let mut cursor: &mut Value = &mut *target;
            for addr in parent_path {
                cursor = child_mut(cursor, addr)?;
            }
            let moved = remove(cursor, &last[0])?;
            let value = delta.value.clone().unwrap_or(moved);
            insert(target, &delta.addr, value)
        }
    }
}

fn required_value(delta: &Delta) -> DiffResult<Value> {
    // inserts and updates always carry a payload; treat absence as null
    Ok(delta.value.clone().unwrap_or(Value::Null))
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn wrong_container(addr: &Addr, target: &Value) -> DiffError {
    DiffError::WrongContainer {
        addr: addr.to_string(),
        target: kind_name(target),
    }
}

/// Navigate to the child a context frame addresses.
fn child_mut<'t>(target: &'t mut Value, addr: &Addr) -> DiffResult<&'t mut Value> {
    match addr {
        Addr::Root => Ok(target),
        Addr::Key(key) => match target {
            Value::Object(fields) => fields
                .get_mut(key)
                .ok_or_else(|| DiffError::MissingKey { key: key.clone() }),
            other => Err(wrong_container(addr, other)),
        },
        Addr::Index(i) => match target {
            Value::Array(items) => {
                let len = items.len();
                usize::try_from(*i)
                    .ok()
                    .and_then(|idx| items.get_mut(idx))
                    .ok_or(DiffError::IndexOutOfRange { index: *i, len })
            }
            other => Err(wrong_container(addr, other)),
        },
    }
}

fn insert(target: &mut Value, addr: &Addr, value: Value) -> DiffResult<()> {
    match addr {
        Addr::Root => {
            *target = value;
            Ok(())
        }
        Addr::Key(key) => match target {
            Value::Object(fields) => {
                fields.insert(key.clone(), value);
                Ok(())
            }
            other => Err(wrong_container(addr, other)),
        },
        Addr::Index(i) => match target {
            Value::Array(items) => {
                let idx = usize::try_from(*i).ok().filter(|idx| *idx <= items.len());
                match idx {
                    Some(idx) => {
                        items.insert(idx, value);
                        Ok(())
                    }
                    None => Err(DiffError::IndexOutOfRange { index: *i, len: items.len() }),
                }
            }
            other => Err(wrong_container(addr, other)),
        },
    }
}

fn remove(target: &mut Value, addr: &Addr) -> DiffResult<Value> {
    match addr {
        Addr::Root => {
            let old = std::mem::replace(target, Value::Object(Default::default()));
            Ok(old)
        }
        Addr::Key(key) => match target {
            Value::Object(fields) => fields
                .remove(key)
                .ok_or_else(|| DiffError::MissingKey { key: key.clone() }),
            other => Err(wrong_container(addr, other)),
        },
        Addr::Index(i) => match target {
            Value::Array(items) => {
                let idx = usize::try_from(*i).ok().filter(|idx| *idx < items.len());
                match idx {
                    Some(idx) => Ok(items.remove(idx)),
                    None => Err(DiffError::IndexOutOfRange { index: *i, len: items.len() }),
                }
            }
            other => Err(wrong_container(addr, other)),
        },
    }
}

fn update(target: &mut Value, addr: &Addr, value: Value) -> DiffResult<()> {
    match addr {
        Addr::Root => {
            *target = value;
            Ok(())
        }
        Addr::Key(key) => match target {
            Value::Object(fields) => match fields.get_mut(key) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(DiffError::MissingKey { key: key.clone() }),
            },
            other => Err(wrong_container(addr, other)),
        },
        Addr::Index(i) => match target {
            Value::Array(items) => {
                let len = items.len();
                match usize::try_from(*i).ok().and_then(|idx| items.get_mut(idx)) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(DiffError::IndexOutOfRange { index: *i, len }),
                }
            }
            other => Err(wrong_container(addr, other)),
        },
    }
}

//! Empty-value pruning
//!
//! Outgoing payloads and normalized upstream objects must not carry
//! `null`, empty objects, or empty arrays at any depth. `0`, `false`, and
//! `""` are real values and are always kept.

use serde_json::{Map, Value};

enum Frame {
    Object {
        out: Map<String, Value>,
        rest: std::vec::IntoIter<(String, Value)>,
        key: String,
    },
    Array {
        out: Vec<Value>,
        rest: std::vec::IntoIter<Value>,
    },
}

enum Step {
    Descend(Value),
    Finished(Option<Value>),
}

/// Remove empty values at every level of nesting, bottom-up.
///
/// Containers whose children were all removed are themselves removed, and
/// arrays are re-densified as they are rebuilt. Returns `None` when the
/// whole value prunes away. Idempotent: pruning pruned data is a no-op.
///
/// Driven by an explicit work stack, so arbitrarily deep payloads cannot
/// overflow the call stack.
pub fn prune(root: Value) -> Option<Value> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut step = Step::Descend(root);

    loop {
        step = match step {
            Step::Descend(Value::Object(map)) => {
                let mut rest = map.into_iter().collect::<Vec<_>>().into_iter();
                match rest.next() {
                    Some((key, child)) => {
                        stack.push(Frame::Object {
                            out: Map::new(),
                            rest,
                            key,
                        });
                        Step::Descend(child)
                    }
                    None => Step::Finished(None),
                }
            }
            Step::Descend(Value::Array(items)) => {
                let mut rest = items.into_iter();
                match rest.next() {
                    Some(child) => {
                        stack.push(Frame::Array {
                            out: Vec::new(),
                            rest,
                        });
                        Step::Descend(child)
                    }
                    None => Step::Finished(None),
                }
            }
            Step::Descend(Value::Null) => Step::Finished(None),
            Step::Descend(leaf) => Step::Finished(Some(leaf)),
            Step::Finished(done) => match stack.last_mut() {
                None => return done,
                Some(Frame::Object { out, rest, key }) => {
                    if let Some(value) = done {
                        out.insert(std::mem::take(key), value);
                    }
                    match rest.next() {
                        Some((next_key, child)) => {
                            *key = next_key;
                            Step::Descend(child)
                        }
                        None => {
                            let Some(Frame::Object { out, .. }) = stack.pop() else {
                                unreachable!()
                            };
                            Step::Finished(if out.is_empty() {
                                None
                            } else {
                                Some(Value::Object(out))
                            })
                        }
                    }
                }
                Some(Frame::Array { out, rest }) => {
                    if let Some(value) = done {
                        out.push(value);
                    }
                    match rest.next() {
                        Some(child) => Step::Descend(child),
                        None => {
                            let Some(Frame::Array { out, .. }) = stack.pop() else {
                                unreachable!()
                            };
                            Step::Finished(if out.is_empty() {
                                None
                            } else {
                                Some(Value::Array(out))
                            })
                        }
                    }
                }
            },
        };
    }
}

/// [`prune`], falling back to an empty object for payload call sites that
/// must always produce an object.
pub fn prune_or_empty(root: Value) -> Value {
    prune(root).unwrap_or(Value::Object(Map::new()))
}

use serde_json::Value;

/// Bare array, or the first wrapper key holding one. Anything else is empty.
pub fn unwrap_list(v: Value, keys: &[&str]) -> Value {
    match v {
        Value::Array(_) => v,
        Value::Object(mut map) => keys
            .iter()
            .find_map(|k| match map.remove(*k) {
                Some(inner @ Value::Array(_)) => Some(inner),
                _ => None,
            })
            .unwrap_or_else(|| Value::Array(Vec::new())),
        _ => Value::Array(Vec::new()),
    }
}

/// The first wrapper key holding an object, else the value itself.
pub fn unwrap_one(v: Value, keys: &[&str]) -> Value {
    let inner = v.as_object().and_then(|map| {
        keys.iter()
            .find_map(|k| map.get(*k).filter(|inner| inner.is_object()).cloned())
    });
    inner.unwrap_or(v)
}

/// `{ "error": .. }` or `{ "message": .. }`, verbatim.
pub fn error_message(v: &Value) -> Option<String> {
    let obj = v.as_object()?;
    ["error", "message"].iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(inner) => inner
            .get("message")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        _ => None,
    })
}

/// Reply fields layered over the record that was sent. Non-object replies
/// (e.g. a bare `"ok"`) leave the sent record untouched.
pub fn merge_created(sent: Value, reply: Value) -> Value {
    match (sent, reply) {
        (Value::Object(mut base), Value::Object(extra)) => {
            for (k, v) in extra {
                if k == "message" || v.is_null() {
                    continue;
                }
                base.insert(k, v);
            }
            Value::Object(base)
        }
        (sent, _) => sent,
    }
}

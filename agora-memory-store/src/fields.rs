use std::cmp::Ordering;

use agora_api::{Document, Error, FieldOp, FieldUpdate};
use serde_json::Value;

pub fn get_field<'a>(doc: &'a Document, field: &str) -> Option<&'a Value> {
    let mut parts = field.split('.');
    let mut cur = doc.get(parts.next()?)?;
    for p in parts {
        cur = cur.as_object()?.get(p)?;
    }
    Some(cur)
}

/// Walks to the object holding the last segment of `field`, creating intermediate objects
fn parent_mut<'a>(
    doc: &'a mut Document,
    field: &'a str,
) -> Result<(&'a mut Document, &'a str), Error> {
    let (parents, last) = match field.rsplit_once('.') {
        Some((parents, last)) => (Some(parents), last),
        None => (None, field),
    };
    let mut cur = doc;
    if let Some(parents) = parents {
        for p in parents.split('.') {
            let next = cur
                .entry(p.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !next.is_object() {
                *next = Value::Object(Document::new());
            }
            cur = match next {
                Value::Object(o) => o,
                _ => unreachable!("field was just made an object"),
            };
        }
    }
    if last.is_empty() {
        return Err(Error::InvalidArgument(format!("empty field path {field:?}")));
    }
    Ok((cur, last))
}

pub fn apply_update(doc: &mut Document, update: FieldUpdate) -> Result<(), Error> {
    let (parent, key) = parent_mut(doc, &update.field)?;
    match update.op {
        FieldOp::Set(v) => {
            parent.insert(key.to_string(), v);
        }
        FieldOp::Delete => {
            parent.remove(key);
        }
        FieldOp::ArrayUnion(values) => {
            let entry = parent
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !entry.is_array() {
                *entry = Value::Array(Vec::new());
            }
            if let Value::Array(arr) = entry {
                for v in values {
                    if !arr.contains(&v) {
                        arr.push(v);
                    }
                }
            }
        }
        FieldOp::ArrayRemove(values) => {
            let entry = parent
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match entry {
                Value::Array(arr) => arr.retain(|v| !values.contains(v)),
                _ => *entry = Value::Array(Vec::new()),
            }
        }
    }
    Ok(())
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over json values: by type first, then by value
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (a, b) in a.iter().zip(b.iter()) {
                match compare_values(a, b) {
                    Ordering::Equal => continue,
                    o => return o,
                }
            }
            a.len().cmp(&b.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

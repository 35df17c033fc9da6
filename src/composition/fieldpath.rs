//! # Field Paths
//!
//! Addressing into JSON trees with paths such as `spec.forProvider.name`,
//! `spec.items[0].name` or `metadata.labels['octopilot.io/app']`.
//!
//! Writes create missing intermediate objects and arrays; arrays are padded
//! with nulls when an index lies beyond their end. Written indices are
//! bounded by [`MAX_ARRAY_INDEX`].

use super::PatchError;
use serde_json::{Map, Value};
use std::fmt;

/// Largest array index a write may address
pub const MAX_ARRAY_INDEX: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => write!(f, "{name}"),
            Segment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// Parse a field path into segments
pub fn parse(path: &str) -> Result<Vec<Segment>, PatchError> {
    let invalid = |reason: &str| PatchError::InvalidFieldPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.is_empty() {
        return Err(invalid("empty field path"));
    }

    let mut segments = Vec::new();
    let mut field = String::new();
    let mut after_bracket = false;
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if field.is_empty() && !after_bracket {
                    return Err(invalid("empty field name"));
                }
                if !field.is_empty() {
                    segments.push(Segment::Field(std::mem::take(&mut field)));
                }
                if chars.peek().is_none() {
                    return Err(invalid("trailing period"));
                }
                after_bracket = false;
            }
            '[' => {
                if !field.is_empty() {
                    segments.push(Segment::Field(std::mem::take(&mut field)));
                } else if segments.is_empty() {
                    return Err(invalid("path must start with a field name"));
                }

                let mut inner = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed {
                    return Err(invalid("unterminated '['"));
                }
                segments.push(parse_bracket(&inner).map_err(|reason| invalid(reason))?);

                if !matches!(chars.peek(), None | Some('.') | Some('[')) {
                    return Err(invalid("unexpected character after ']'"));
                }
                after_bracket = true;
            }
            ']' => return Err(invalid("unexpected ']'")),
            c => field.push(c),
        }
    }

    if !field.is_empty() {
        segments.push(Segment::Field(field));
    }
    Ok(segments)
}

fn parse_bracket(inner: &str) -> Result<Segment, &'static str> {
    let inner = inner.trim();
    if inner.is_empty() {
        return Err("empty brackets");
    }
    if inner.len() >= 2 && inner.starts_with('\'') && inner.ends_with('\'') {
        let quoted = &inner[1..inner.len() - 1];
        if quoted.is_empty() {
            return Err("empty quoted field name");
        }
        return Ok(Segment::Field(quoted.to_string()));
    }
    match inner.parse::<usize>() {
        Ok(i) => Ok(Segment::Index(i)),
        Err(_) => Ok(Segment::Field(inner.to_string())),
    }
}

/// Value at `segments`, if every step exists
pub fn get<'a>(value: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments.iter().try_fold(value, |current, segment| match segment {
        Segment::Field(name) => current.as_object()?.get(name),
        Segment::Index(i) => current.as_array()?.get(*i),
    })
}

/// Write `new` at `segments`, creating intermediates as needed
pub fn set(value: &mut Value, segments: &[Segment], new: Value) -> Result<(), String> {
    let Some((last, parents)) = segments.split_last() else {
        *value = new;
        return Ok(());
    };

    let mut current = value;
    for segment in parents {
        current = child_mut(current, segment)?;
    }
    *child_mut(current, last)? = new;
    Ok(())
}

fn child_mut<'a>(value: &'a mut Value, segment: &Segment) -> Result<&'a mut Value, String> {
    match segment {
        Segment::Field(name) => {
            if value.is_null() {
                *value = Value::Object(Map::new());
            }
            let Value::Object(map) = value else {
                return Err(format!("cannot set field {name} on a non-object value"));
            };
            Ok(map.entry(name.clone()).or_insert(Value::Null))
        }
        Segment::Index(i) => {
            if value.is_null() {
                *value = Value::Array(Vec::new());
            }
            let Value::Array(items) = value else {
                return Err(format!("cannot set index {i} on a non-array value"));
            };
            let len = i
                .checked_add(1)
                .filter(|_| *i <= MAX_ARRAY_INDEX)
                .ok_or_else(|| format!("index {i} exceeds the maximum of {MAX_ARRAY_INDEX}"))?;
            if items.len() < len {
                items.resize(len, Value::Null);
            }
            items
                .get_mut(*i)
                .ok_or_else(|| format!("index {i} is out of range"))
        }
    }
}

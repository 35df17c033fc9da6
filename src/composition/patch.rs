//! # Patch Engine
//!
//! Copies values from a composite resource into a composed resource.
//!
//! Each patch reads `fromFieldPath` on the source, runs the value through its
//! transforms in order and writes it to `toFieldPath` (defaulting to
//! `fromFieldPath`) on the destination. Patches are applied in list order so
//! a later patch overwrites what an earlier one wrote to the same path.
//!
//! A patch whose source field does not exist is skipped.

use super::fieldpath;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("invalid field path {path}: {reason}")]
    InvalidFieldPath { path: String, reason: String },

    #[error("cannot set {path}: {reason}")]
    SetField { path: String, reason: String },

    #[error("transform at index {index} failed: {reason}")]
    Transform { index: usize, reason: String },
}

/// Copies a field from the composite to the composed resource
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    /// Path of the source field on the composite resource
    pub from_field_path: String,
    /// Path of the destination field on the composed resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_field_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<Transform>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum TransformType {
    Map,
    Math,
    String,
    Convert,
}

/// A transform applied to a patched value; the field named by `type` holds
/// its configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    pub r#type: TransformType,
    /// Lookup table from input string to output string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub math: Option<MathTransform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<StringTransform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert: Option<ConvertTransform>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MathTransform {
    pub multiply: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StringTransform {
    /// Format string with one `%s`, `%d` or `%v` verb
    pub fmt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConvertTransform {
    /// One of string, int, int64, float64, bool
    pub to_type: String,
}

impl Patch {
    /// Apply this patch from `from` onto `to`
    pub fn apply(&self, from: &Value, to: &mut Value) -> Result<(), PatchError> {
        let from_path = fieldpath::parse(&self.from_field_path)?;
        let (to_path_str, to_path) = match self.to_field_path.as_deref() {
            Some(p) if !p.is_empty() => (p, fieldpath::parse(p)?),
            _ => (self.from_field_path.as_str(), from_path.clone()),
        };

        let Some(value) = fieldpath::get(from, &from_path) else {
            return Ok(());
        };

        let value = self
            .transforms
            .iter()
            .enumerate()
            .try_fold(value.clone(), |v, (index, t)| {
                t.resolve(v)
                    .map_err(|reason| PatchError::Transform { index, reason })
            })?;

        fieldpath::set(to, &to_path, value).map_err(|reason| PatchError::SetField {
            path: to_path_str.to_string(),
            reason,
        })
    }
}

impl Transform {
    pub fn resolve(&self, input: Value) -> Result<Value, String> {
        let missing = || format!("{:?} transform has no configuration", self.r#type);
        match self.r#type {
            TransformType::Map => map(self.map.as_ref().ok_or_else(missing)?, input),
            TransformType::Math => math(self.math.as_ref().ok_or_else(missing)?, input),
            TransformType::String => string_fmt(self.string.as_ref().ok_or_else(missing)?, input),
            TransformType::Convert => convert(self.convert.as_ref().ok_or_else(missing)?, input),
        }
    }
}

fn map(table: &BTreeMap<String, String>, input: Value) -> Result<Value, String> {
    let Value::String(key) = &input else {
        return Err(format!("map transform input must be a string, got {input}"));
    };
    table
        .get(key)
        .map(|v| Value::String(v.clone()))
        .ok_or_else(|| format!("key {key} is not found in map"))
}

fn math(t: &MathTransform, input: Value) -> Result<Value, String> {
    if let Some(i) = input.as_i64() {
        return i
            .checked_mul(t.multiply)
            .map(Value::from)
            .ok_or_else(|| format!("{i} * {} overflows", t.multiply));
    }
    if let Some(f) = input.as_f64() {
        return Ok(Value::from(f * t.multiply as f64));
    }
    Err(format!("math transform input must be a number, got {input}"))
}

fn plain(input: &Value) -> String {
    match input {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn string_fmt(t: &StringTransform, input: Value) -> Result<Value, String> {
    let mut out = String::with_capacity(t.fmt.len());
    let mut used = false;
    let mut chars = t.fmt.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') | Some('v') => {
                if used {
                    return Err(format!("format {:?} has more than one verb", t.fmt));
                }
                out.push_str(&plain(&input));
                used = true;
            }
            Some('d') => {
                if used {
                    return Err(format!("format {:?} has more than one verb", t.fmt));
                }
                let Some(n) = input.as_i64() else {
                    return Err(format!("%d needs an integer, got {input}"));
                };
                out.push_str(&n.to_string());
                used = true;
            }
            Some(other) => return Err(format!("unsupported format verb %{other}")),
            None => return Err(format!("format {:?} ends with '%'", t.fmt)),
        }
    }
    Ok(Value::String(out))
}

fn convert(t: &ConvertTransform, input: Value) -> Result<Value, String> {
    let fail = || format!("cannot convert {input} to {}", t.to_type);
    match t.to_type.as_str() {
        "string" => match &input {
            Value::String(_) => Ok(input.clone()),
            Value::Number(_) | Value::Bool(_) => Ok(Value::String(plain(&input))),
            _ => Err(fail()),
        },
        "int" | "int64" => match &input {
            Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|e| format!("{}: {e}", fail())),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Value::from)
                .ok_or_else(fail),
            Value::Bool(b) => Ok(Value::from(i64::from(*b))),
            _ => Err(fail()),
        },
        "float64" => match &input {
            Value::String(s) => s.trim().parse::<f64>().map(Value::from).map_err(|e| format!("{}: {e}", fail())),
            Value::Number(n) => n.as_f64().map(Value::from).ok_or_else(fail),
            _ => Err(fail()),
        },
        "bool" => match &input {
            Value::Bool(_) => Ok(input.clone()),
            Value::String(s) => s.trim().parse::<bool>().map(Value::Bool).map_err(|e| format!("{}: {e}", fail())),
            _ => Err(fail()),
        },
        other => Err(format!("unsupported conversion target {other}")),
    }
}

/// Apply `patches` in order; the first failure aborts with the patch index
pub fn apply_patches(patches: &[Patch], from: &Value, to: &mut Value) -> Result<()> {
    for (index, patch) in patches.iter().enumerate() {
        patch
            .apply(from, to)
            .map_err(|source| Error::Patch { index, source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(from: &str, to: Option<&str>) -> Patch {
        Patch {
            from_field_path: from.to_string(),
            to_field_path: to.map(str::to_string),
            transforms: vec![],
        }
    }

    fn transform(value: Value) -> Transform {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_to_field_path_defaults_to_from() {
        let from = json!({"metadata": {"labels": {"app": "x"}}});
        let mut to = json!({});
        patch("metadata.labels", None).apply(&from, &mut to).unwrap();
        assert_eq!(to, json!({"metadata": {"labels": {"app": "x"}}}));
    }

    #[test]
    fn test_missing_source_is_noop() {
        let from = json!({"spec": {}});
        let mut to = json!({"spec": {"size": 1}});
        patch("spec.size", None).apply(&from, &mut to).unwrap();
        assert_eq!(to, json!({"spec": {"size": 1}}));
    }

    #[test]
    fn test_later_patch_wins() {
        let from = json!({"spec": {"a": "first", "b": "second"}});
        let mut to = json!({});
        let patches = vec![
            patch("spec.a", Some("spec.target")),
            patch("spec.b", Some("spec.target")),
        ];
        apply_patches(&patches, &from, &mut to).unwrap();
        assert_eq!(to["spec"]["target"], "second");
    }

    #[test]
    fn test_failure_reports_index() {
        let from = json!({"spec": {"a": 1}});
        let mut to = json!({});
        let patches = vec![patch("spec.a", None), patch("spec..b", None)];
        let err = apply_patches(&patches, &from, &mut to).unwrap_err();
        assert!(matches!(err, Error::Patch { index: 1, .. }));
        // Patches before the failure were applied
        assert_eq!(to["spec"]["a"], 1);
    }

    #[test]
    fn test_oversized_index_is_a_set_field_error() {
        let from = json!({"spec": {"size": 1}});
        let mut to = json!({});
        let patches = vec![patch("spec.size", Some("spec.x[18446744073709551615]"))];
        let err = apply_patches(&patches, &from, &mut to).unwrap_err();
        assert!(matches!(
            err,
            Error::Patch {
                index: 0,
                source: PatchError::SetField { .. }
            }
        ));
    }

    #[test]
    fn test_transforms_chain_in_order() {
        let from = json!({"spec": {"size": 3}});
        let mut to = json!({});
        let p = Patch {
            from_field_path: "spec.size".to_string(),
            to_field_path: Some("spec.forProvider.description".to_string()),
            transforms: vec![
                transform(json!({"type": "math", "math": {"multiply": 2}})),
                transform(json!({"type": "string", "string": {"fmt": "size-%d"}})),
            ],
        };
        p.apply(&from, &mut to).unwrap();
        assert_eq!(to["spec"]["forProvider"]["description"], "size-6");
    }

    #[test]
    fn test_map_transform() {
        let t = transform(json!({"type": "map", "map": {"eu": "europe-west1"}}));
        assert_eq!(t.resolve(json!("eu")).unwrap(), json!("europe-west1"));
        assert!(t.resolve(json!("us")).unwrap_err().contains("not found"));
    }

    #[test]
    fn test_convert_transform() {
        let to_int = transform(json!({"type": "convert", "convert": {"toType": "int"}}));
        assert_eq!(to_int.resolve(json!("42")).unwrap(), json!(42));
        assert!(to_int.resolve(json!("forty")).is_err());

        let to_string = transform(json!({"type": "convert", "convert": {"toType": "string"}}));
        assert_eq!(to_string.resolve(json!(true)).unwrap(), json!("true"));

        let to_bool = transform(json!({"type": "convert", "convert": {"toType": "bool"}}));
        assert_eq!(to_bool.resolve(json!("false")).unwrap(), json!(false));
    }

    #[test]
    fn test_transform_without_configuration_fails() {
        let t = transform(json!({"type": "math"}));
        assert!(t.resolve(json!(1)).is_err());
    }

    #[test]
    fn test_string_fmt_escapes() {
        let t = transform(json!({"type": "string", "string": {"fmt": "100%% %s"}}));
        assert_eq!(t.resolve(json!("done")).unwrap(), json!("100% done"));
    }
}

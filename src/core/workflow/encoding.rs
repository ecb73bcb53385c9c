//! Value-tree encoding for parameter groups.
//!
//! Scalars, mappings and sequences are kept inline. Long homogeneous numeric
//! arrays are lifted out into child blocks and replaced by `null`; a side
//! table records where each block belongs so decoding can splice it back.

use crate::core::workflow::error::WorkflowError;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NumericKind {
    Int,
    Float,
}

/// Side-table entry locating one extracted array within the encoded value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArrayRef {
    pub path: Vec<PathSegment>,
    pub child: String,
    pub dtype: NumericKind,
    pub len: usize,
}

/// Extracted numeric payload, persisted as its own child object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum NumericBlock {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl NumericBlock {
    pub fn len(&self) -> usize {
        match self {
            NumericBlock::Int(values) => values.len(),
            NumericBlock::Float(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> NumericKind {
        match self {
            NumericBlock::Int(_) => NumericKind::Int,
            NumericBlock::Float(_) => NumericKind::Float,
        }
    }

    fn into_value(self) -> Value {
        match self {
            NumericBlock::Int(values) => Value::Array(values.into_iter().map(Value::from).collect()),
            NumericBlock::Float(values) => Value::Array(
                values
                    .into_iter()
                    .map(|v| Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null))
                    .collect(),
            ),
        }
    }
}

/// Inline part of an encoded value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EncodedValue {
    pub data: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arrays: Vec<ArrayRef>,
}

/// Encode `value`, extracting homogeneous numeric arrays of at least
/// `threshold` items. Returns the inline part and the child blocks keyed by
/// their side-table ids.
pub fn encode(value: &Value, threshold: usize) -> (EncodedValue, Vec<(String, NumericBlock)>) {
    let mut arrays = Vec::new();
    let mut children = Vec::new();
    let mut path = Vec::new();
    let data = encode_node(value, threshold, &mut path, &mut arrays, &mut children);
    (EncodedValue { data, arrays }, children)
}

fn encode_node(
    value: &Value,
    threshold: usize,
    path: &mut Vec<PathSegment>,
    arrays: &mut Vec<ArrayRef>,
    children: &mut Vec<(String, NumericBlock)>,
) -> Value {
    match value {
        Value::Array(items) => {
            if items.len() >= threshold {
                if let Some(block) = numeric_block(items) {
                    let child = children.len().to_string();
                    arrays.push(ArrayRef {
                        path: path.clone(),
                        child: child.clone(),
                        dtype: block.kind(),
                        len: block.len(),
                    });
                    children.push((child, block));
                    return Value::Null;
                }
            }
            let mut out = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                path.push(PathSegment::Index(idx));
                out.push(encode_node(item, threshold, path, arrays, children));
                path.pop();
            }
            Value::Array(out)
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                path.push(PathSegment::Key(key.clone()));
                out.insert(
                    key.clone(),
                    encode_node(item, threshold, path, arrays, children),
                );
                path.pop();
            }
            Value::Object(out)
        }
        scalar => scalar.clone(),
    }
}

fn numeric_block(items: &[Value]) -> Option<NumericBlock> {
    if items.iter().all(|v| v.is_i64()) {
        return Some(NumericBlock::Int(
            items.iter().filter_map(Value::as_i64).collect(),
        ));
    }
    if items.iter().all(|v| v.is_f64()) {
        return Some(NumericBlock::Float(
            items.iter().filter_map(Value::as_f64).collect(),
        ));
    }
    None
}

/// Rebuild the full value tree, loading child blocks on demand.
pub fn decode<F>(encoded: &EncodedValue, mut load_child: F) -> Result<Value, WorkflowError>
where
    F: FnMut(&ArrayRef) -> Result<NumericBlock, WorkflowError>,
{
    let mut data = encoded.data.clone();
    for array in &encoded.arrays {
        let block = load_child(array)?;
        splice(&mut data, &array.path, block.into_value());
    }
    Ok(data)
}

fn splice(target: &mut Value, path: &[PathSegment], value: Value) {
    let mut current = target;
    for segment in path {
        let next = match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get_mut(key),
            (Value::Array(items), PathSegment::Index(idx)) => items.get_mut(*idx),
            _ => None,
        };
        match next {
            Some(next) => current = next,
            None => return,
        }
    }
    *current = value;
}

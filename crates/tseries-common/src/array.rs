//! In-memory model of self-describing array files.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

/// Value of a global or variable attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Text(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret as a flag. Integer attributes count as true when non-zero,
    /// which is how backends without a boolean type store flags.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            AttrValue::Int(i) => Some(*i != 0),
            AttrValue::Ints(v) if v.len() == 1 => Some(v[0] != 0),
            AttrValue::Text(s) => match s.to_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Float(f) => Some(*f),
            AttrValue::Ints(v) if v.len() == 1 => Some(v[0] as f64),
            AttrValue::Floats(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

/// Name, dimensions, shape and attributes of one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableHeader {
    pub name: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    pub attributes: IndexMap<String, AttrValue>,
}

impl VariableHeader {
    pub fn new(name: impl Into<String>, dimensions: &[(&str, usize)]) -> Self {
        Self {
            name: name.into(),
            dimensions: dimensions.iter().map(|(d, _)| d.to_string()).collect(),
            shape: dimensions.iter().map(|(_, n)| *n).collect(),
            attributes: IndexMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn has_dimension(&self, dim: &str) -> bool {
        self.dimensions.iter().any(|d| d == dim)
    }

    /// Whether `dim` is the leading (record) dimension.
    pub fn leads_with(&self, dim: &str) -> bool {
        self.dimensions.first().is_some_and(|d| d == dim)
    }

    /// Number of elements described by `shape`; 1 for scalars.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }
}

/// Header of one array file: variables and global attributes, in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetHeader {
    pub variables: IndexMap<String, VariableHeader>,
    pub attributes: IndexMap<String, AttrValue>,
}

impl DatasetHeader {
    pub fn variable(&self, name: &str) -> Option<&VariableHeader> {
        self.variables.get(name)
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|k| k.as_str())
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }
}

/// Flat, row-major variable values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayValues {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// NC_CHAR data.
    Char(Vec<u8>),
}

macro_rules! each_variant {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            ArrayValues::I8($v) => $body,
            ArrayValues::U8($v) => $body,
            ArrayValues::I16($v) => $body,
            ArrayValues::I32($v) => $body,
            ArrayValues::I64($v) => $body,
            ArrayValues::F32($v) => $body,
            ArrayValues::F64($v) => $body,
            ArrayValues::Char($v) => $body,
        }
    };
}

impl ArrayValues {
    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ArrayValues::I8(_) => "i8",
            ArrayValues::U8(_) => "u8",
            ArrayValues::I16(_) => "i16",
            ArrayValues::I32(_) => "i32",
            ArrayValues::I64(_) => "i64",
            ArrayValues::F32(_) => "f32",
            ArrayValues::F64(_) => "f64",
            ArrayValues::Char(_) => "char",
        }
    }

    /// Numeric values widened to f64; `None` for character data.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            ArrayValues::I8(v) => Some(v.iter().map(|&x| x as f64).collect()),
            ArrayValues::U8(v) => Some(v.iter().map(|&x| x as f64).collect()),
            ArrayValues::I16(v) => Some(v.iter().map(|&x| x as f64).collect()),
            ArrayValues::I32(v) => Some(v.iter().map(|&x| x as f64).collect()),
            ArrayValues::I64(v) => Some(v.iter().map(|&x| x as f64).collect()),
            ArrayValues::F32(v) => Some(v.iter().map(|&x| x as f64).collect()),
            ArrayValues::F64(v) => Some(v.clone()),
            ArrayValues::Char(_) => None,
        }
    }

    fn extend_from(&mut self, other: &ArrayValues, variable: &str) -> CommonResult<()> {
        match (self, other) {
            (ArrayValues::I8(a), ArrayValues::I8(b)) => a.extend_from_slice(b),
            (ArrayValues::U8(a), ArrayValues::U8(b)) => a.extend_from_slice(b),
            (ArrayValues::I16(a), ArrayValues::I16(b)) => a.extend_from_slice(b),
            (ArrayValues::I32(a), ArrayValues::I32(b)) => a.extend_from_slice(b),
            (ArrayValues::I64(a), ArrayValues::I64(b)) => a.extend_from_slice(b),
            (ArrayValues::F32(a), ArrayValues::F32(b)) => a.extend_from_slice(b),
            (ArrayValues::F64(a), ArrayValues::F64(b)) => a.extend_from_slice(b),
            (ArrayValues::Char(a), ArrayValues::Char(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(CommonError::TypeMismatch {
                    variable: variable.to_string(),
                    left: a.type_name(),
                    right: b.type_name(),
                })
            }
        }
        Ok(())
    }
}

/// A variable's header together with its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableData {
    pub header: VariableHeader,
    pub values: ArrayValues,
}

impl VariableData {
    /// Pair a header with values, checking the element count.
    pub fn new(header: VariableHeader, values: ArrayValues) -> CommonResult<Self> {
        if header.element_count() != values.len() {
            return Err(CommonError::ShapeMismatch {
                variable: header.name.clone(),
                expected: header.shape.clone(),
                found: vec![values.len()],
            });
        }
        Ok(Self { header, values })
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    /// Length of the leading dimension, 1 for scalars.
    pub fn leading_len(&self) -> usize {
        self.header.shape.first().copied().unwrap_or(1)
    }

    /// Append `other` along the leading dimension.
    ///
    /// Dimension names and every trailing extent must match.
    pub fn append_leading(&mut self, other: &VariableData) -> CommonResult<()> {
        let trailing_matches = self.header.dimensions == other.header.dimensions
            && self.header.shape.get(1..) == other.header.shape.get(1..);
        if self.header.shape.is_empty() || !trailing_matches {
            return Err(CommonError::ShapeMismatch {
                variable: self.header.name.clone(),
                expected: self.header.shape.clone(),
                found: other.header.shape.clone(),
            });
        }
        self.values.extend_from(&other.values, &self.header.name)?;
        self.header.shape[0] += other.header.shape[0];
        Ok(())
    }

    /// Concatenate slabs in order along the leading dimension.
    pub fn concat_leading<I>(parts: I) -> CommonResult<Option<VariableData>>
    where
        I: IntoIterator<Item = VariableData>,
    {
        let mut parts = parts.into_iter();
        let Some(mut merged) = parts.next() else {
            return Ok(None);
        };
        for part in parts {
            merged.append_leading(&part)?;
        }
        Ok(Some(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slab(name: &str, steps: usize, fill: f32) -> VariableData {
        let header = VariableHeader::new(name, &[("time", steps), ("lat", 2), ("lon", 3)]);
        VariableData::new(header, ArrayValues::F32(vec![fill; steps * 6])).unwrap()
    }

    #[test]
    fn test_new_checks_element_count() {
        let header = VariableHeader::new("T", &[("time", 2), ("lat", 2)]);
        assert!(VariableData::new(header, ArrayValues::F64(vec![0.0; 3])).is_err());
    }

    #[test]
    fn test_concat_along_time() {
        let merged = VariableData::concat_leading(vec![slab("T", 1, 1.0), slab("T", 2, 2.0)])
            .unwrap()
            .unwrap();
        assert_eq!(merged.header.shape, vec![3, 2, 3]);
        assert_eq!(merged.values.len(), 18);
        match &merged.values {
            ArrayValues::F32(v) => {
                assert_eq!(v[0], 1.0);
                assert_eq!(v[6], 2.0);
            }
            other => panic!("unexpected type {}", other.type_name()),
        }
    }

    #[test]
    fn test_concat_rejects_mismatched_grid() {
        let mut a = slab("T", 1, 0.0);
        let header = VariableHeader::new("T", &[("time", 1), ("lat", 3), ("lon", 3)]);
        let b = VariableData::new(header, ArrayValues::F32(vec![0.0; 9])).unwrap();
        assert!(matches!(
            a.append_leading(&b),
            Err(CommonError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_concat_rejects_mismatched_type() {
        let mut a = slab("T", 1, 0.0);
        let header = VariableHeader::new("T", &[("time", 1), ("lat", 2), ("lon", 3)]);
        let b = VariableData::new(header, ArrayValues::F64(vec![0.0; 6])).unwrap();
        assert!(matches!(
            a.append_leading(&b),
            Err(CommonError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_concat_empty_is_none() {
        assert!(VariableData::concat_leading(Vec::new()).unwrap().is_none());
    }

    #[test]
    fn test_attr_flags() {
        assert_eq!(AttrValue::Bool(true).as_bool(), Some(true));
        assert_eq!(AttrValue::Int(0).as_bool(), Some(false));
        assert_eq!(AttrValue::Ints(vec![1]).as_bool(), Some(true));
        assert_eq!(AttrValue::Text("complete".into()).as_bool(), None);
    }
}

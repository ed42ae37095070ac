//! Conversions between NetCDF attribute values and [`AttrValue`].

use netcdf::AttributeValue;
use tseries_common::{ArrayValues, AttrValue};

/// Map a stored attribute onto the engine-neutral value model.
///
/// Returns `None` for attribute types with no counterpart.
pub(crate) fn from_netcdf(value: AttributeValue) -> Option<AttrValue> {
    let value = match value {
        AttributeValue::Str(s) => AttrValue::Text(s),
        AttributeValue::Strs(v) => AttrValue::Text(v.join("\n")),
        AttributeValue::Schar(v) => AttrValue::Int(v.into()),
        AttributeValue::Uchar(v) => AttrValue::Int(v.into()),
        AttributeValue::Short(v) => AttrValue::Int(v.into()),
        AttributeValue::Ushort(v) => AttrValue::Int(v.into()),
        AttributeValue::Int(v) => AttrValue::Int(v.into()),
        AttributeValue::Uint(v) => AttrValue::Int(v.into()),
        AttributeValue::Longlong(v) => AttrValue::Int(v),
        AttributeValue::Ulonglong(v) => AttrValue::Int(i64::try_from(v).ok()?),
        AttributeValue::Float(v) => AttrValue::Float(v.into()),
        AttributeValue::Double(v) => AttrValue::Float(v),
        AttributeValue::Schars(v) => ints(v.into_iter().map(i64::from)),
        AttributeValue::Uchars(v) => ints(v.into_iter().map(i64::from)),
        AttributeValue::Shorts(v) => ints(v.into_iter().map(i64::from)),
        AttributeValue::Ushorts(v) => ints(v.into_iter().map(i64::from)),
        AttributeValue::Ints(v) => ints(v.into_iter().map(i64::from)),
        AttributeValue::Uints(v) => ints(v.into_iter().map(i64::from)),
        AttributeValue::Longlongs(v) => AttrValue::Ints(v),
        AttributeValue::Ulonglongs(v) => {
            AttrValue::Ints(v.into_iter().map(i64::try_from).collect::<Result<_, _>>().ok()?)
        }
        AttributeValue::Floats(v) => AttrValue::Floats(v.into_iter().map(f64::from).collect()),
        AttributeValue::Doubles(v) => AttrValue::Floats(v),
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(value)
}

fn ints(values: impl Iterator<Item = i64>) -> AttrValue {
    AttrValue::Ints(values.collect())
}

/// Map a value for writing. Booleans are stored as short integers; integers
/// that fit are stored as 32-bit ints.
pub(crate) fn to_netcdf(value: &AttrValue) -> AttributeValue {
    match value {
        AttrValue::Text(s) => AttributeValue::Str(s.clone()),
        AttrValue::Bool(b) => AttributeValue::Short(i16::from(*b)),
        AttrValue::Int(v) => match i32::try_from(*v) {
            Ok(v) => AttributeValue::Int(v),
            Err(_) => AttributeValue::Longlong(*v),
        },
        AttrValue::Float(v) => AttributeValue::Double(*v),
        AttrValue::Ints(v) => match v.iter().map(|x| i32::try_from(*x)).collect::<Result<Vec<i32>, _>>() {
            Ok(narrow) => AttributeValue::Ints(narrow),
            Err(_) => AttributeValue::Longlongs(v.clone()),
        },
        AttrValue::Floats(v) => AttributeValue::Doubles(v.clone()),
    }
}

/// Attributes whose type must match the variable's data type.
pub(crate) fn is_fill_attribute(name: &str) -> bool {
    matches!(name, "_FillValue" | "missing_value")
}

/// Cast a numeric attribute to the element type of `values`.
pub(crate) fn typed_like(value: &AttrValue, values: &ArrayValues) -> Option<AttributeValue> {
    let v = value.as_f64()?;
    let typed = match values {
        ArrayValues::I8(_) => AttributeValue::Schar(v as i8),
        ArrayValues::U8(_) => AttributeValue::Uchar(v as u8),
        ArrayValues::I16(_) => AttributeValue::Short(v as i16),
        ArrayValues::I32(_) => AttributeValue::Int(v as i32),
        ArrayValues::I64(_) => AttributeValue::Longlong(v as i64),
        ArrayValues::F32(_) => AttributeValue::Float(v as f32),
        ArrayValues::F64(_) => AttributeValue::Double(v),
        ArrayValues::Char(_) => return None,
    };
    Some(typed)
}

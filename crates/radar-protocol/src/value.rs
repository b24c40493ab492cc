//! The typed parameter serialization format: a sum of variants tagged by a
//! single type-code byte, plus the stateless decoder over a [`ByteReader`].

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Number;
use thiserror::Error;

use crate::reader::{ByteReader, ReaderError};

/// Type codes, matching the wire format exactly (ASCII mnemonics where the
/// original protocol uses them).
pub mod type_code {
    pub const UNKNOWN: u8 = 0;
    pub const DICTIONARY: u8 = 68; // 'D'
    pub const STRING_ARRAY: u8 = 97; // 'a'
    pub const BYTE: u8 = 98; // 'b'
    pub const DOUBLE: u8 = 100; // 'd'
    pub const EVENT_DATA: u8 = 101; // 'e'
    pub const FLOAT: u8 = 102; // 'f'
    pub const HASHTABLE: u8 = 104; // 'h'
    pub const INTEGER: u8 = 105; // 'i'
    pub const SHORT: u8 = 107; // 'k'
    pub const LONG: u8 = 108; // 'l'
    pub const INTEGER_ARRAY: u8 = 110; // 'n'
    pub const BOOLEAN: u8 = 111; // 'o'
    pub const OPERATION_RESPONSE: u8 = 112; // 'p'
    pub const OPERATION_REQUEST: u8 = 113; // 'q'
    pub const STRING: u8 = 115; // 's'
    pub const BYTE_ARRAY: u8 = 120; // 'x'
    pub const TYPED_ARRAY: u8 = 121; // 'y'
    pub const OBJECT_ARRAY: u8 = 122; // 'z'
    pub const NULL: u8 = 42;
}

/// Errors raised while decoding a typed value or parameter table.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error(transparent)]
    Reader(#[from] ReaderError),
    #[error("unknown type code {0}")]
    UnknownTypeCode(u8),
}

/// Key/value identity for parameter table entries. Keys are small
/// non-negative integers (0-255) on the wire.
pub type ParameterTable = BTreeMap<u8, Value>;

/// A decoded event payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventData {
    pub code: u8,
    pub parameters: ParameterTable,
}

/// A decoded operation request payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub operation_code: u8,
    pub parameters: ParameterTable,
}

/// A decoded operation response payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub operation_code: u8,
    pub return_code: u16,
    pub debug_message: Box<Value>,
    pub parameters: ParameterTable,
}

/// A single typed value, tagged by a wire type code.
///
/// Tree-shaped by construction (no cycles): arrays and dictionaries nest
/// other `Value`s, never themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unknown,
    Null,
    Byte(u8),
    Bool(bool),
    Short(u16),
    Int(u32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    ByteArray(Vec<u8>),
    IntArray(Vec<u32>),
    StringArray(Vec<String>),
    /// `y` — one declared type code for every element.
    TypedArray(Vec<Value>),
    /// `z` — a type code precedes each element.
    ObjectArray(Vec<Value>),
    /// `h` — always inline-typed keys and values.
    Hashtable(Vec<(Value, Value)>),
    /// `D` — declared key/value types, inline only when declared as 0/42.
    Dictionary(Vec<(Value, Value)>),
    Event(EventData),
    Request(OperationRequest),
    Response(OperationResponse),
}

/// Decodes one value whose type code has already been read from the stream.
pub fn decode_one(reader: &mut ByteReader, type_code: u8) -> Result<Value, DecodeError> {
    use type_code as tc;
    Ok(match type_code {
        tc::UNKNOWN => Value::Unknown,
        tc::NULL => Value::Null,
        tc::BYTE => Value::Byte(reader.read_u8()?),
        tc::BOOLEAN => Value::Bool(reader.read_u8()? != 0),
        tc::SHORT => Value::Short(reader.read_u16_be()?),
        tc::INTEGER => Value::Int(reader.read_u32_be()?),
        tc::LONG => Value::Long(reader.read_i64_be()?),
        tc::FLOAT => Value::Float(reader.read_f32_be()?),
        tc::DOUBLE => Value::Double(reader.read_f64_be()?),
        tc::STRING => Value::Str(decode_string(reader)?),
        tc::BYTE_ARRAY => Value::ByteArray(decode_byte_array(reader)?),
        tc::INTEGER_ARRAY => Value::IntArray(decode_int_array(reader)?),
        tc::STRING_ARRAY => Value::StringArray(decode_string_array(reader)?),
        tc::TYPED_ARRAY => Value::TypedArray(decode_typed_array(reader)?),
        tc::OBJECT_ARRAY => Value::ObjectArray(decode_object_array(reader)?),
        tc::HASHTABLE => Value::Hashtable(decode_hashtable(reader)?),
        tc::DICTIONARY => Value::Dictionary(decode_dictionary(reader)?),
        tc::EVENT_DATA => Value::Event(decode_event_data(reader)?),
        tc::OPERATION_REQUEST => Value::Request(decode_operation_request(reader)?),
        tc::OPERATION_RESPONSE => Value::Response(decode_operation_response(reader)?),
        other => return Err(DecodeError::UnknownTypeCode(other)),
    })
}

fn decode_string(reader: &mut ByteReader) -> Result<String, DecodeError> {
    let len = reader.read_u16_be()?;
    if len == 0 {
        return Ok(String::new());
    }
    let bytes = reader.read_bytes(len as usize)?;
    // Invalid UTF-8 must not abort the decode; surface via lossy conversion.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn decode_byte_array(reader: &mut ByteReader) -> Result<Vec<u8>, DecodeError> {
    let len = reader.read_u32_be()?;
    Ok(reader.read_bytes(len as usize)?)
}

fn decode_int_array(reader: &mut ByteReader) -> Result<Vec<u32>, DecodeError> {
    let len = reader.read_u32_be()?;
    let mut out = Vec::with_capacity(len as usize);
    for _ in 0..len {
        out.push(reader.read_u32_be()?);
    }
    Ok(out)
}

fn decode_string_array(reader: &mut ByteReader) -> Result<Vec<String>, DecodeError> {
    let len = reader.read_u16_be()?;
    let mut out = Vec::with_capacity(len as usize);
    for _ in 0..len {
        out.push(decode_string(reader)?);
    }
    Ok(out)
}

fn decode_typed_array(reader: &mut ByteReader) -> Result<Vec<Value>, DecodeError> {
    let len = reader.read_u16_be()?;
    let elem_type = reader.read_u8()?;
    let mut out = Vec::with_capacity(len as usize);
    for _ in 0..len {
        out.push(decode_one(reader, elem_type)?);
    }
    Ok(out)
}

fn decode_object_array(reader: &mut ByteReader) -> Result<Vec<Value>, DecodeError> {
    let len = reader.read_u16_be()?;
    let mut out = Vec::with_capacity(len as usize);
    for _ in 0..len {
        let elem_type = reader.read_u8()?;
        out.push(decode_one(reader, elem_type)?);
    }
    Ok(out)
}

fn decode_hashtable(reader: &mut ByteReader) -> Result<Vec<(Value, Value)>, DecodeError> {
    let len = reader.read_u16_be()?;
    decode_dictionary_elements(reader, len as usize, 0, 0)
}

fn decode_dictionary(reader: &mut ByteReader) -> Result<Vec<(Value, Value)>, DecodeError> {
    let key_type = reader.read_u8()?;
    let value_type = reader.read_u8()?;
    let len = reader.read_u16_be()?;
    decode_dictionary_elements(reader, len as usize, key_type, value_type)
}

/// Shared key/value reader for both `h` (always-inline) and `D` (inline
/// only when the declared type is 0/42) wire forms.
fn decode_dictionary_elements(
    reader: &mut ByteReader,
    count: usize,
    key_type: u8,
    value_type: u8,
) -> Result<Vec<(Value, Value)>, DecodeError> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let kt = if key_type == type_code::UNKNOWN || key_type == type_code::NULL {
            reader.read_u8()?
        } else {
            key_type
        };
        let key = decode_one(reader, kt)?;

        let vt = if value_type == type_code::UNKNOWN || value_type == type_code::NULL {
            reader.read_u8()?
        } else {
            value_type
        };
        let value = decode_one(reader, vt)?;

        out.push((key, value));
    }
    Ok(out)
}

/// `2-byte count, then count entries of (1-byte key, 1-byte type code, value)`.
pub fn decode_parameter_table(reader: &mut ByteReader) -> Result<ParameterTable, DecodeError> {
    let count = reader.read_u16_be()?;
    let mut table = ParameterTable::new();
    for _ in 0..count {
        let key = reader.read_u8()?;
        let type_code = reader.read_u8()?;
        let value = decode_one(reader, type_code)?;
        table.insert(key, value);
    }
    Ok(table)
}

/// Move-event (code 3) position patch: the only place little-endian floats
/// appear on the wire. Mutates `parameters` in place when the preconditions
/// hold; otherwise leaves them untouched.
fn apply_move_event_patch(parameters: &mut ParameterTable) {
    let Some(Value::ByteArray(bytes)) = parameters.get(&1) else {
        return;
    };
    if bytes.len() < 17 {
        return;
    }
    let mut cursor = ByteReader::new(&bytes[9..17]);
    // Infallible: we just checked len >= 17, so both reads have 4 bytes each.
    let pos0 = cursor.read_f32_le().expect("slice has >= 8 bytes");
    let pos1 = cursor.read_f32_le().expect("slice has >= 8 bytes");
    parameters.insert(4, Value::Float(pos0));
    parameters.insert(5, Value::Float(pos1));
    parameters.insert(252, Value::Byte(3));
}

pub fn decode_event_data(reader: &mut ByteReader) -> Result<EventData, DecodeError> {
    let code = reader.read_u8()?;
    let mut parameters = decode_parameter_table(reader)?;
    if code == 3 {
        apply_move_event_patch(&mut parameters);
    }
    Ok(EventData { code, parameters })
}

pub fn decode_operation_request(reader: &mut ByteReader) -> Result<OperationRequest, DecodeError> {
    let operation_code = reader.read_u8()?;
    let parameters = decode_parameter_table(reader)?;
    Ok(OperationRequest {
        operation_code,
        parameters,
    })
}

pub fn decode_operation_response(
    reader: &mut ByteReader,
) -> Result<OperationResponse, DecodeError> {
    let operation_code = reader.read_u8()?;
    let return_code = reader.read_u16_be()?;
    let debug_type_code = reader.read_u8()?;
    let debug_message = decode_one(reader, debug_type_code)?;
    let parameters = decode_parameter_table(reader)?;
    Ok(OperationResponse {
        operation_code,
        return_code,
        debug_message: Box::new(debug_message),
        parameters,
    })
}

// ---------------------------------------------------------------------------
// JSON representation
// ---------------------------------------------------------------------------

/// Longs outside this range lose precision as a JSON number and are emitted
/// as strings instead, consistently for every long value.
const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;
const MIN_SAFE_INTEGER: i64 = -9_007_199_254_740_991;

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::Unknown | Value::Null => serializer.serialize_none(),
            Value::Byte(v) => serializer.serialize_u8(*v),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Short(v) => serializer.serialize_u16(*v),
            Value::Int(v) => serializer.serialize_u32(*v),
            Value::Long(v) => {
                if (MIN_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(v) {
                    Number::from(*v).serialize(serializer)
                } else {
                    serializer.serialize_str(&v.to_string())
                }
            }
            Value::Float(v) => serializer.serialize_f32(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::Str(v) => serializer.serialize_str(v),
            Value::ByteArray(v) => {
                use serde::ser::SerializeStruct;
                let mut s = serializer.serialize_struct("Buffer", 2)?;
                s.serialize_field("type", "Buffer")?;
                s.serialize_field("data", v)?;
                s.end()
            }
            Value::IntArray(v) => v.serialize(serializer),
            Value::StringArray(v) => v.serialize(serializer),
            Value::TypedArray(v) | Value::ObjectArray(v) => v.serialize(serializer),
            Value::Hashtable(pairs) | Value::Dictionary(pairs) => {
                use serde::ser::SerializeSeq;
                let mut seq = serializer.serialize_seq(Some(pairs.len()))?;
                for (k, v) in pairs {
                    seq.serialize_element(&KeyValue { key: k, value: v })?;
                }
                seq.end()
            }
            Value::Event(e) => e.serialize(serializer),
            Value::Request(r) => r.serialize(serializer),
            Value::Response(r) => r.serialize(serializer),
        }
    }
}

/// Dictionary/hashtable entries have no prescribed JSON shape in the wire
/// protocol (they never appear in the top-level batch envelope in practice);
/// emitted as `{"key": ..., "value": ...}` pairs rather than assuming keys
/// are JSON-object-safe strings.
#[derive(Serialize)]
struct KeyValue<'a> {
    key: &'a Value,
    value: &'a Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_string(s: &str) -> Vec<u8> {
        let mut out = (s.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(s.as_bytes());
        out
    }

    #[test]
    fn decodes_empty_string_without_consuming_bytes() {
        let data = 0u16.to_be_bytes();
        let mut r = ByteReader::new(&data);
        let v = decode_one(&mut r, type_code::STRING).unwrap();
        assert_eq!(v, Value::Str(String::new()));
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn decodes_nonzero_string() {
        let data = encode_string("hello");
        let mut r = ByteReader::new(&data);
        let v = decode_one(&mut r, type_code::STRING).unwrap();
        assert_eq!(v, Value::Str("hello".to_owned()));
    }

    #[test]
    fn invalid_utf8_does_not_abort_decode() {
        let mut data = 3u16.to_be_bytes().to_vec();
        data.extend_from_slice(&[0xFF, 0xFE, b'a']);
        let mut r = ByteReader::new(&data);
        let v = decode_one(&mut r, type_code::STRING).unwrap();
        match v {
            Value::Str(s) => assert!(s.ends_with('a')),
            _ => panic!("expected string"),
        }
    }

    #[test]
    fn unknown_type_code_fails_decode() {
        let data = [0u8; 4];
        let mut r = ByteReader::new(&data);
        let err = decode_one(&mut r, 200).unwrap_err();
        assert_eq!(err, DecodeError::UnknownTypeCode(200));
    }

    #[test]
    fn typed_array_uses_one_shared_type_code() {
        // count=2, elem type = byte, then two bytes
        let data = [0x00, 0x02, type_code::BYTE, 0x05, 0x06];
        let mut r = ByteReader::new(&data);
        let v = decode_one(&mut r, type_code::TYPED_ARRAY).unwrap();
        assert_eq!(v, Value::TypedArray(vec![Value::Byte(5), Value::Byte(6)]));
    }

    #[test]
    fn object_array_carries_per_element_type_code() {
        let data = [0x00, 0x02, type_code::BYTE, 0x05, type_code::BOOLEAN, 0x01];
        let mut r = ByteReader::new(&data);
        let v = decode_one(&mut r, type_code::OBJECT_ARRAY).unwrap();
        assert_eq!(
            v,
            Value::ObjectArray(vec![Value::Byte(5), Value::Bool(true)])
        );
    }

    #[test]
    fn dictionary_with_declared_types_zero_uses_inline_keys() {
        // key_type=0, value_type=0, count=1, then inline key type (byte)=5, inline value type (bool)=true
        let data = [
            type_code::UNKNOWN,
            type_code::UNKNOWN,
            0x00,
            0x01,
            type_code::BYTE,
            7,
            type_code::BOOLEAN,
            1,
        ];
        let mut r = ByteReader::new(&data);
        let v = decode_one(&mut r, type_code::DICTIONARY).unwrap();
        assert_eq!(
            v,
            Value::Dictionary(vec![(Value::Byte(7), Value::Bool(true))])
        );
    }

    #[test]
    fn hashtable_always_uses_inline_types() {
        let data = [0x00, 0x01, type_code::BYTE, 9, type_code::BYTE, 10];
        let mut r = ByteReader::new(&data);
        let v = decode_one(&mut r, type_code::HASHTABLE).unwrap();
        assert_eq!(v, Value::Hashtable(vec![(Value::Byte(9), Value::Byte(10))]));
    }

    #[test]
    fn parameter_table_empty() {
        let data = 0u16.to_be_bytes();
        let mut r = ByteReader::new(&data);
        let table = decode_parameter_table(&mut r).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn parameter_table_short_read_propagates() {
        // count says 1 entry but no bytes follow
        let data = 1u16.to_be_bytes();
        let mut r = ByteReader::new(&data);
        assert!(decode_parameter_table(&mut r).is_err());
    }

    #[test]
    fn move_event_patches_position_fields() {
        let mut bytes = vec![0u8; 17];
        bytes[9..13].copy_from_slice(&1.5f32.to_le_bytes());
        bytes[13..17].copy_from_slice(&(-2.25f32).to_le_bytes());

        let mut params = ParameterTable::new();
        params.insert(1, Value::ByteArray(bytes));
        apply_move_event_patch(&mut params);

        assert_eq!(params.get(&4), Some(&Value::Float(1.5)));
        assert_eq!(params.get(&5), Some(&Value::Float(-2.25)));
        assert_eq!(params.get(&252), Some(&Value::Byte(3)));
    }

    #[test]
    fn move_event_patch_is_noop_when_too_short() {
        let mut params = ParameterTable::new();
        params.insert(1, Value::ByteArray(vec![0u8; 10]));
        apply_move_event_patch(&mut params);
        assert!(!params.contains_key(&4));
    }

    #[test]
    fn long_outside_safe_range_serializes_as_string() {
        let v = Value::Long(i64::MAX);
        let json = serde_json::to_value(&v).unwrap();
        assert!(json.is_string());
    }

    #[test]
    fn long_within_safe_range_serializes_as_number() {
        let v = Value::Long(42);
        let json = serde_json::to_value(&v).unwrap();
        assert!(json.is_number());
    }

    #[test]
    fn byte_array_serializes_as_legacy_buffer_shape() {
        let v = Value::ByteArray(vec![1, 2, 3]);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["type"], "Buffer");
        assert_eq!(json["data"], serde_json::json!([1, 2, 3]));
    }
}

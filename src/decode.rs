//! Protocol buffer binary payload decoding.
//!
//! The decoding functionality can be accessed by building a decoding context and acquiring a
//! message or message reference. See the example in the [crate root](crate).
//!
//! Decoding never fails outright. Data that does not fit the message definition is kept as
//! [`Value::Unknown`], truncated data as [`Value::Incomplete`] and data that could not be read as
//! a field as [`MessageValue::garbage`]. Messages and groups nested deeper than
//! [`RECURSION_LIMIT`] are kept as [`Value::TooDeep`]. [`MessageValue::find_defect`] reports
//! whether any such problems were encountered.

use crate::context::*;
use bytes::Bytes;
use std::convert::{TryFrom, TryInto};

/// Deepest nesting of messages and groups the decoders descend into.
pub const RECURSION_LIMIT: usize = 100;

/// Decoded protocol buffer value.
#[derive(Debug, PartialEq, Clone)]
pub enum Value
{
    /// `double` value.
    Double(f64),
    /// `float` value.
    Float(f32),
    /// `int32` value.
    Int32(i32),
    /// `int64` value.
    Int64(i64),
    /// `uint32` value.
    UInt32(u32),
    /// `uint64` value.
    UInt64(u64),
    /// `sint32` value.
    SInt32(i32),
    /// `sint64` value.
    SInt64(i64),
    /// `fixed32` value.
    Fixed32(u32),
    /// `fixed64` value.
    Fixed64(u64),
    /// `sfixed32` value.
    SFixed32(i32),
    /// `sfixed64` value.
    SFixed64(i64),
    /// `bool` value.
    Bool(bool),
    /// `string` value.
    String(String),
    /// `bytes` value.
    Bytes(Bytes),

    /// A repeated packed value.
    Packed(PackedArray),

    /// Message type value.
    Message(Box<MessageValue>),

    /// Enum type value.
    Enum(EnumValue),

    /// Value which was incomplete due to missing bytes in the payload.
    Incomplete(Bytes),

    /// Message or group nested deeper than [`RECURSION_LIMIT`], left undecoded.
    TooDeep(Bytes),

    /// Value which wasn't defined in the context.
    ///
    /// The wire type allows the decoder to tell how large an unknown value is. This allows the
    /// unknown value to be skipped and decoding can continue from the next value.
    Unknown(UnknownValue),
}

/// Packed scalar fields.
#[derive(Debug, PartialEq, Clone)]
pub enum PackedArray
{
    /// `double` value.
    Double(Vec<f64>),
    /// `float` value.
    Float(Vec<f32>),
    /// `int32` value.
    Int32(Vec<i32>),
    /// `int64` value.
    Int64(Vec<i64>),
    /// `uint32` value.
    UInt32(Vec<u32>),
    /// `uint64` value.
    UInt64(Vec<u64>),
    /// `sint32` value.
    SInt32(Vec<i32>),
    /// `sint64` value.
    SInt64(Vec<i64>),
    /// `fixed32` value.
    Fixed32(Vec<u32>),
    /// `fixed64` value.
    Fixed64(Vec<u64>),
    /// `sfixed32` value.
    SFixed32(Vec<i32>),
    /// `sfixed64` value.
    SFixed64(Vec<i64>),
    /// `bool` value.
    Bool(Vec<bool>),
    /// Enum values.
    Enum(EnumRef, Vec<i64>),
}

/// Unknown value.
#[derive(Debug, PartialEq, Clone)]
pub enum UnknownValue
{
    /// Unknown varint (wire type = 0).
    Varint(u64),

    /// Unknown 64-bit value (wire type = 1).
    Fixed64(u64),

    /// Unknown variable length value (wire type = 2).
    VariableLength(Bytes),

    /// Unknown group (wire type = 3). Contains the bytes between the start and end tags.
    Group(Bytes),

    /// Unknown 32-bit value (wire type = 5).
    Fixed32(u32),

    /// Invalid value.
    ///
    /// Invalid value is a value for which the wire type wasn't valid. Encountering invalid wire
    /// type will result in the remaining bytes to be consumed from the current variable length
    /// stream as it is imposible to tell how large such invalid value is.
    ///
    /// The decoding will continue after the current variable length value.
    Invalid(Bytes),
}

/// Enum value.
#[derive(Debug, PartialEq, Clone)]
pub struct EnumValue
{
    /// Reference to the enum type.
    pub enum_ref: EnumRef,

    /// Value.
    pub value: i64,
}

/// Message value.
#[derive(Debug, PartialEq, Clone)]
pub struct MessageValue
{
    /// Reference to the message type.
    pub msg_ref: MessageRef,

    /// Mesage field values.
    pub fields: Vec<FieldValue>,

    /// Garbage data at the end of the message.
    ///
    /// As opposed to an `UnknownValue::Invalid`, the garbage data did not have a valid field
    /// number and for that reason cannot be placed into the `fields` vector.
    pub garbage: Option<Bytes>,
}

/// Field value.
#[derive(Debug, PartialEq, Clone)]
pub struct FieldValue
{
    /// Field number.
    pub number: u64,

    /// Field value.
    pub value: Value,
}

impl Value
{
    fn decode(data: &mut &[u8], vt: &ValueType, ctx: &Context, depth: usize) -> Self
    {
        let original = *data;
        let opt = match vt {
            ValueType::Double => {
                try_read_8_bytes(data).map(|b| Value::Double(f64::from_le_bytes(b)))
            }
            ValueType::Float => try_read_4_bytes(data).map(|b| Value::Float(f32::from_le_bytes(b))),
            ValueType::Int32 => i32::from_signed_varint(data).map(Value::Int32),
            ValueType::Int64 => i64::from_signed_varint(data).map(Value::Int64),
            ValueType::UInt32 => read_varint(data).map(|u| Value::UInt32(u as u32)),
            ValueType::UInt64 => read_varint(data).map(Value::UInt64),
            ValueType::SInt32 => read_varint(data).map(|u| Value::SInt32(zigzag(u) as i32)),
            ValueType::SInt64 => read_varint(data).map(|u| Value::SInt64(zigzag(u))),
            ValueType::Fixed32 => {
                try_read_4_bytes(data).map(|b| Value::Fixed32(u32::from_le_bytes(b)))
            }
            ValueType::Fixed64 => {
                try_read_8_bytes(data).map(|b| Value::Fixed64(u64::from_le_bytes(b)))
            }
            ValueType::SFixed32 => {
                try_read_4_bytes(data).map(|b| Value::SFixed32(i32::from_le_bytes(b)))
            }
            ValueType::SFixed64 => {
                try_read_8_bytes(data).map(|b| Value::SFixed64(i64::from_le_bytes(b)))
            }
            ValueType::Bool => read_varint(data).map(|u| Value::Bool(u != 0)),
            ValueType::String => read_string(data).map(Value::String),
            ValueType::Bytes => read_bytes(data).map(Value::Bytes),
            ValueType::Enum(eref) => i32::from_signed_varint(data).map(|v| {
                Value::Enum(EnumValue {
                    enum_ref: *eref,
                    value: i64::from(v),
                })
            }),
            ValueType::Message(mref) => read_length_delimited(data).map(|consumed| {
                match depth < RECURSION_LIMIT {
                    true => Value::Message(Box::new(
                        ctx.resolve_message(*mref)
                            .decode_nested(consumed, ctx, depth + 1),
                    )),
                    false => Value::TooDeep(Bytes::copy_from_slice(consumed)),
                }
            }),
        };

        opt.unwrap_or_else(|| return_incomplete(data, original))
    }

    fn decode_packed(data: &mut &[u8], vt: &ValueType) -> Self
    {
        let original = *data;
        let mut array = match read_length_delimited(data) {
            Some(array) => array,
            None => return return_incomplete(data, original),
        };

        // Reading the packed arrays follows very similar format for each type.  The variances are
        // in how to read the data from the stream and what to do with the data to get the final
        // value.
        //
        // This macro implements the basic structure with holes for the varying bits.
        macro_rules! read_packed {
            ($variant:ident @ $val:ident = $try_read:expr => $insert:expr ) => {{
                let mut output = vec![];
                loop {
                    if array.is_empty() {
                        break PackedArray::$variant(output);
                    }

                    match $try_read {
                        Some($val) => output.push($insert),
                        None => return return_incomplete(data, original),
                    }
                }
            }};
        }

        let packed = match vt {
            ValueType::Double => {
                read_packed! { Double @ b = try_read_8_bytes(&mut array) => f64::from_le_bytes(b) }
            }
            ValueType::Float => {
                read_packed! { Float @ b = try_read_4_bytes(&mut array) => f32::from_le_bytes(b) }
            }
            ValueType::Int32 => {
                read_packed! { Int32 @ b = i32::from_signed_varint(&mut array) => b }
            }
            ValueType::Int64 => {
                read_packed! { Int64 @ b = i64::from_signed_varint(&mut array) => b }
            }
            ValueType::UInt32 => {
                read_packed! { UInt32 @ b = read_varint(&mut array) => b as u32 }
            }
            ValueType::UInt64 => {
                read_packed! { UInt64 @ b = read_varint(&mut array) => b }
            }
            ValueType::SInt32 => {
                read_packed! { SInt32 @ b = read_varint(&mut array) => zigzag(b) as i32 }
            }
            ValueType::SInt64 => {
                read_packed! { SInt64 @ b = read_varint(&mut array) => zigzag(b) }
            }
            ValueType::Fixed32 => {
                read_packed! { Fixed32 @ b = try_read_4_bytes(&mut array) => u32::from_le_bytes(b) }
            }
            ValueType::Fixed64 => {
                read_packed! { Fixed64 @ b = try_read_8_bytes(&mut array) => u64::from_le_bytes(b) }
            }
            ValueType::SFixed32 => {
                read_packed! { SFixed32 @ b = try_read_4_bytes(&mut array) => i32::from_le_bytes(b) }
            }
            ValueType::SFixed64 => {
                read_packed! { SFixed64 @ b = try_read_8_bytes(&mut array) => i64::from_le_bytes(b) }
            }
            ValueType::Bool => {
                read_packed! { Bool @ b = read_varint(&mut array) => b != 0 }
            }
            ValueType::Enum(eref) => {
                let mut output = vec![];
                while !array.is_empty() {
                    match i32::from_signed_varint(&mut array) {
                        Some(v) => output.push(i64::from(v)),
                        None => return return_incomplete(data, original),
                    }
                }
                PackedArray::Enum(*eref, output)
            }
            _ => panic!("Non-scalar type was handled as packed"),
        };

        Value::Packed(packed)
    }

    fn decode_unknown(data: &mut &[u8], number: u64, vt: u8, depth: usize) -> Value
    {
        let original = *data;
        let value = match vt {
            0 => read_varint(data).map(UnknownValue::Varint),
            1 => {
                try_read_8_bytes(data).map(|value| UnknownValue::Fixed64(u64::from_le_bytes(value)))
            }
            2 => read_length_delimited(data)
                .map(|consumed| UnknownValue::VariableLength(Bytes::copy_from_slice(consumed))),
            3 => match skip_group(data, number, depth + 1) {
                Ok(content) => Some(UnknownValue::Group(Bytes::copy_from_slice(content))),
                Err(SkipError::TooDeep) => {
                    let bytes = Bytes::copy_from_slice(data);
                    *data = &[];
                    return Value::TooDeep(bytes);
                }
                Err(SkipError::Truncated) => None,
            },
            5 => {
                try_read_4_bytes(data).map(|value| UnknownValue::Fixed32(u32::from_le_bytes(value)))
            }
            _ => {
                let bytes = Bytes::copy_from_slice(data);
                *data = &[];
                Some(UnknownValue::Invalid(bytes))
            }
        };

        value
            .map(Value::Unknown)
            .unwrap_or_else(|| return_incomplete(data, original))
    }

    /// Describes the first value that could not be decoded, if any.
    fn find_defect(&self, ctx: &Context) -> Option<String>
    {
        match self {
            Value::Incomplete(bytes) => Some(format!("truncated value ({} bytes left)", bytes.len())),
            Value::Unknown(UnknownValue::Invalid(..)) => Some("invalid wire type".to_string()),
            Value::TooDeep(..) => {
                Some(format!("nested more than {} levels deep", RECURSION_LIMIT))
            }
            Value::Message(msg) => msg.find_defect(ctx),
            _ => None,
        }
    }
}

fn return_incomplete(data: &mut &[u8], original: &[u8]) -> Value
{
    *data = &[];
    Value::Incomplete(Bytes::copy_from_slice(original))
}

fn zigzag(u: u64) -> i64
{
    ((u >> 1) as i64) ^ -((u & 1) as i64)
}

pub(crate) fn try_read_8_bytes(data: &mut &[u8]) -> Option<[u8; 8]>
{
    if data.len() < 8 {
        return None;
    }

    match (data[..8]).try_into() {
        Ok(v) => {
            *data = &data[8..];
            Some(v)
        }
        Err(_) => None,
    }
}

pub(crate) fn try_read_4_bytes(data: &mut &[u8]) -> Option<[u8; 4]>
{
    if data.len() < 4 {
        return None;
    }

    match (data[..4]).try_into() {
        Ok(v) => {
            *data = &data[4..];
            Some(v)
        }
        Err(_) => None,
    }
}

/// Reads a length prefixed slice. Leaves `data` untouched on failure.
pub(crate) fn read_length_delimited<'a>(data: &mut &'a [u8]) -> Option<&'a [u8]>
{
    let original = *data;
    let len = match read_varint(data).and_then(|l| usize::try_from(l).ok()) {
        Some(len) if len <= data.len() => len,
        _ => {
            *data = original;
            return None;
        }
    };
    let (consumed, remainder) = data.split_at(len);
    *data = remainder;
    Some(consumed)
}

fn read_string(data: &mut &[u8]) -> Option<String>
{
    read_length_delimited(data).map(|s| String::from_utf8_lossy(s).to_string())
}

fn read_bytes(data: &mut &[u8]) -> Option<Bytes>
{
    read_length_delimited(data).map(Bytes::copy_from_slice)
}

enum SkipError
{
    Truncated,
    TooDeep,
}

/// Skips the fields of a group whose start tag has already been read.
///
/// Returns the group content without the end tag. `depth` is the nesting level of the group.
fn skip_group<'a>(data: &mut &'a [u8], number: u64, depth: usize) -> Result<&'a [u8], SkipError>
{
    if depth > RECURSION_LIMIT {
        return Err(SkipError::TooDeep);
    }

    let original = *data;
    let mut cursor = *data;
    loop {
        let before_tag = cursor;
        let tag = read_varint(&mut cursor).ok_or(SkipError::Truncated)?;
        let (field, wire_type) = (tag >> 3, (tag & 0x07) as u8);
        let skipped = match wire_type {
            0 => read_varint(&mut cursor).map(|_| ()),
            1 => try_read_8_bytes(&mut cursor).map(|_| ()),
            2 => read_length_delimited(&mut cursor).map(|_| ()),
            3 => {
                skip_group(&mut cursor, field, depth + 1)?;
                Some(())
            }
            4 if field == number => {
                let content_len = original.len() - before_tag.len();
                *data = cursor;
                return Ok(&original[..content_len]);
            }
            5 => try_read_4_bytes(&mut cursor).map(|_| ()),
            _ => None,
        };
        skipped.ok_or(SkipError::Truncated)?;
    }
}

impl MessageRef
{
    /// Decode a message.
    ///
    /// Will **panic** if the message defined by the `MessageRef` does not exist in this context.
    /// Such panic means the `MessageRef` came from a different context. The panic is not
    /// guaranteed, as a message with an equal `MessageRef` may exist in multiple contexts.
    pub fn decode(self, data: &[u8], ctx: &Context) -> MessageValue
    {
        ctx.resolve_message(self).decode(data, ctx)
    }
}

impl MessageInfo
{
    /// Decode a message.
    ///
    /// Will **panic** if the message defined by the `MessageRef` does not exist in this context.
    /// Such panic means the `MessageRef` came from a different context. The panic is not
    /// guaranteed, as a message with an equal `MessageRef` may exist in multiple contexts.
    pub fn decode(&self, data: &[u8], ctx: &Context) -> MessageValue
    {
        self.decode_nested(data, ctx, 0)
    }

    /// Decodes a message found `depth` levels below the outermost one.
    pub(crate) fn decode_nested(&self, mut data: &[u8], ctx: &Context, depth: usize)
        -> MessageValue
    {
        let mut msg = MessageValue {
            msg_ref: self.self_ref,
            fields: vec![],
            garbage: None,
        };

        loop {
            if data.is_empty() {
                break;
            }

            let field_start = data;
            let tag = match read_varint(&mut data) {
                Some(tag) if tag >> 3 != 0 => tag,
                _ => {
                    msg.garbage = Some(Bytes::copy_from_slice(field_start));
                    break;
                }
            };

            let number = tag >> 3;
            let wire_type = (tag & 0x07) as u8;

            let value = match self.get_field(number) {
                // Parsers must accept both packed and unpacked encodings for repeated scalars.
                Some(field)
                    if is_repeated(field) && field.field_type.is_packable() && wire_type == 2 =>
                {
                    Value::decode_packed(&mut data, &field.field_type)
                }
                Some(field) if field.field_type.wire_type() == wire_type => {
                    Value::decode(&mut data, &field.field_type, ctx, depth)
                }
                _ => Value::decode_unknown(&mut data, number, wire_type, depth),
            };

            msg.fields.push(FieldValue { number, value })
        }

        msg
    }
}

fn is_repeated(field: &MessageField) -> bool
{
    matches!(
        field.multiplicity,
        Multiplicity::Repeated | Multiplicity::RepeatedPacked
    )
}

impl MessageValue
{
    /// Describes the first part of the message that could not be decoded.
    ///
    /// Returns `None` if the whole message, including nested messages, was decoded without
    /// running into truncated values, invalid wire types, excessive nesting or trailing garbage.
    pub fn find_defect(&self, ctx: &Context) -> Option<String>
    {
        let info = ctx.resolve_message(self.msg_ref);
        for field in &self.fields {
            if let Some(defect) = field.value.find_defect(ctx) {
                return Some(format!("{}.{}: {}", info.full_name, field.number, defect));
            }
        }

        self.garbage.as_ref().map(|garbage| {
            format!(
                "{}: {} bytes of trailing data could not be read as a field",
                info.full_name,
                garbage.len()
            )
        })
    }
}

/// Reads a base 128 varint.
///
/// Returns `None` and leaves `data` untouched if the varint is truncated or longer than ten
/// bytes.
pub(crate) fn read_varint(data: &mut &[u8]) -> Option<u64>
{
    let bytes = *data;
    let mut result = 0u64;
    for (idx, b) in bytes.iter().enumerate().take(10) {
        result |= u64::from(b & 0x7f) << (idx * 7);
        if b & 0x80 == 0 {
            *data = &bytes[idx + 1..];
            return Some(result);
        }
    }

    None
}

trait FromSignedVarint: Sized
{
    fn from_signed_varint(data: &mut &[u8]) -> Option<Self>;
}

impl FromSignedVarint for i32
{
    fn from_signed_varint(data: &mut &[u8]) -> Option<Self>
    {
        // Negative values are sign extended to 64 bits on the wire.
        read_varint(data).map(|u| u as i64 as i32)
    }
}

impl FromSignedVarint for i64
{
    fn from_signed_varint(data: &mut &[u8]) -> Option<Self>
    {
        read_varint(data).map(|u| u as i64)
    }
}

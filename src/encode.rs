//! Protocol buffer binary payload encoding.
//!
//! Encoding is the inverse of [decoding](crate::decode): a [`MessageValue`] is written back into
//! the wire format. Values that could not be decoded in the first place
//! ([`Value::Incomplete`], [`Value::TooDeep`] and [`UnknownValue::Invalid`]) are not written.

use crate::decode::*;
use bytes::{BufMut, BytesMut};

impl MessageValue
{
    /// Encodes the message into the protobuf wire format.
    pub fn encode(&self) -> BytesMut
    {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf
    }

    fn encode_into(&self, buf: &mut BytesMut)
    {
        for field in &self.fields {
            field.value.encode_into(field.number, buf);
        }

        if let Some(garbage) = &self.garbage {
            buf.put_slice(garbage);
        }
    }
}

impl Value
{
    fn encode_into(&self, number: u64, buf: &mut BytesMut)
    {
        match self {
            Value::Double(v) => {
                put_tag(buf, number, 1);
                buf.put_f64_le(*v);
            }
            Value::Float(v) => {
                put_tag(buf, number, 5);
                buf.put_f32_le(*v);
            }
            Value::Int32(v) => put_varint_field(buf, number, *v as i64 as u64),
            Value::Int64(v) => put_varint_field(buf, number, *v as u64),
            Value::UInt32(v) => put_varint_field(buf, number, u64::from(*v)),
            Value::UInt64(v) => put_varint_field(buf, number, *v),
            Value::SInt32(v) => put_varint_field(buf, number, zigzag_encode(i64::from(*v))),
            Value::SInt64(v) => put_varint_field(buf, number, zigzag_encode(*v)),
            Value::Fixed32(v) => {
                put_tag(buf, number, 5);
                buf.put_u32_le(*v);
            }
            Value::Fixed64(v) => {
                put_tag(buf, number, 1);
                buf.put_u64_le(*v);
            }
            Value::SFixed32(v) => {
                put_tag(buf, number, 5);
                buf.put_i32_le(*v);
            }
            Value::SFixed64(v) => {
                put_tag(buf, number, 1);
                buf.put_i64_le(*v);
            }
            Value::Bool(v) => put_varint_field(buf, number, u64::from(*v)),
            Value::String(s) => put_length_delimited(buf, number, s.as_bytes()),
            Value::Bytes(b) => put_length_delimited(buf, number, b),
            Value::Enum(e) => put_varint_field(buf, number, e.value as u64),
            Value::Message(m) => put_length_delimited(buf, number, &m.encode()),
            Value::Packed(p) => put_length_delimited(buf, number, &p.encode()),
            Value::Unknown(u) => u.encode_into(number, buf),
            Value::Incomplete(..) | Value::TooDeep(..) => {}
        }
    }
}

impl PackedArray
{
    fn encode(&self) -> BytesMut
    {
        let mut buf = BytesMut::new();
        match self {
            PackedArray::Double(v) => v.iter().for_each(|i| buf.put_f64_le(*i)),
            PackedArray::Float(v) => v.iter().for_each(|i| buf.put_f32_le(*i)),
            PackedArray::Int32(v) => v.iter().for_each(|i| put_varint(&mut buf, *i as i64 as u64)),
            PackedArray::Int64(v) => v.iter().for_each(|i| put_varint(&mut buf, *i as u64)),
            PackedArray::UInt32(v) => v.iter().for_each(|i| put_varint(&mut buf, u64::from(*i))),
            PackedArray::UInt64(v) => v.iter().for_each(|i| put_varint(&mut buf, *i)),
            PackedArray::SInt32(v) => v
                .iter()
                .for_each(|i| put_varint(&mut buf, zigzag_encode(i64::from(*i)))),
            PackedArray::SInt64(v) => v.iter().for_each(|i| put_varint(&mut buf, zigzag_encode(*i))),
            PackedArray::Fixed32(v) => v.iter().for_each(|i| buf.put_u32_le(*i)),
            PackedArray::Fixed64(v) => v.iter().for_each(|i| buf.put_u64_le(*i)),
            PackedArray::SFixed32(v) => v.iter().for_each(|i| buf.put_i32_le(*i)),
            PackedArray::SFixed64(v) => v.iter().for_each(|i| buf.put_i64_le(*i)),
            PackedArray::Bool(v) => v.iter().for_each(|i| put_varint(&mut buf, u64::from(*i))),
            PackedArray::Enum(_, v) => v.iter().for_each(|i| put_varint(&mut buf, *i as u64)),
        }
        buf
    }
}

impl UnknownValue
{
    fn encode_into(&self, number: u64, buf: &mut BytesMut)
    {
        match self {
            UnknownValue::Varint(v) => put_varint_field(buf, number, *v),
            UnknownValue::Fixed64(v) => {
                put_tag(buf, number, 1);
                buf.put_u64_le(*v);
            }
            UnknownValue::VariableLength(b) => put_length_delimited(buf, number, b),
            UnknownValue::Group(content) => {
                put_tag(buf, number, 3);
                buf.put_slice(content);
                put_tag(buf, number, 4);
            }
            UnknownValue::Fixed32(v) => {
                put_tag(buf, number, 5);
                buf.put_u32_le(*v);
            }
            UnknownValue::Invalid(..) => {}
        }
    }
}

fn zigzag_encode(v: i64) -> u64
{
    ((v << 1) ^ (v >> 63)) as u64
}

fn put_tag(buf: &mut BytesMut, number: u64, wire_type: u8)
{
    put_varint(buf, number << 3 | u64::from(wire_type));
}

fn put_varint_field(buf: &mut BytesMut, number: u64, value: u64)
{
    put_tag(buf, number, 0);
    put_varint(buf, value);
}

fn put_length_delimited(buf: &mut BytesMut, number: u64, data: &[u8])
{
    put_tag(buf, number, 2);
    put_varint(buf, data.len() as u64);
    buf.put_slice(data);
}

pub(crate) fn put_varint(buf: &mut BytesMut, mut value: u64)
{
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

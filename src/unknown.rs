//! Schema-less protobuf parsing and text rendering.
//!
//! Without a message definition the payload can only be split into numbered fields by wire
//! type. [`UnknownFieldSet`] holds such a parse and renders it in the protobuf text format,
//! printing length-delimited values as nested blocks whenever they parse as field sets
//! themselves.

use bytes::Bytes;
use snafu::Snafu;
use std::collections::BTreeMap;
use std::fmt::{self, Write};

use crate::decode::{
    read_length_delimited, read_varint, try_read_4_bytes, try_read_8_bytes, RECURSION_LIMIT,
};

/// Error parsing wire data without a schema.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum WireError
{
    /// The data ends inside a field tag.
    #[snafu(display("truncated field tag at offset {}", offset))]
    TruncatedTag
    {
        offset: usize
    },

    /// Field number zero is reserved.
    #[snafu(display("invalid field number 0 at offset {}", offset))]
    ZeroFieldNumber
    {
        offset: usize
    },

    /// Wire types 6 and 7 do not exist.
    #[snafu(display("invalid wire type {} at offset {}", wire_type, offset))]
    InvalidWireType
    {
        wire_type: u8, offset: usize
    },

    /// The data ends inside a value.
    #[snafu(display("truncated value of field {} at offset {}", number, offset))]
    TruncatedValue
    {
        number: u64, offset: usize
    },

    /// An end-group tag that closes no open group.
    #[snafu(display("unexpected end of group {} at offset {}", number, offset))]
    UnexpectedEndGroup
    {
        number: u64, offset: usize
    },

    /// Groups nested deeper than the decoders descend into.
    #[snafu(display(
        "group at offset {} is nested more than {} levels deep",
        offset,
        RECURSION_LIMIT
    ))]
    TooDeep
    {
        offset: usize
    },

    /// A group without its end-group tag.
    #[snafu(display("group {} is not terminated", number))]
    UnterminatedGroup
    {
        number: u64
    },
}

/// Values of a single field number, grouped by wire type.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct UnknownField
{
    /// Varint values.
    pub varint: Vec<u64>,

    /// 32-bit values.
    pub fixed32: Vec<u32>,

    /// 64-bit values.
    pub fixed64: Vec<u64>,

    /// Length-delimited values.
    pub length_delimited: Vec<Bytes>,

    /// Groups.
    pub group: Vec<UnknownFieldSet>,
}

/// Fields of a payload parsed without a schema, ordered by field number.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct UnknownFieldSet
{
    fields: BTreeMap<u64, UnknownField>,
}

impl UnknownFieldSet
{
    /// Parses a payload strictly.
    ///
    /// Fails on truncated values, field number zero, unknown wire types, unbalanced groups and
    /// groups nested deeper than [`RECURSION_LIMIT`].
    pub fn parse(data: &[u8]) -> Result<Self, WireError>
    {
        parse_nested(data, 0)
    }

    /// Iterates the fields in field number order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &UnknownField)>
    {
        self.fields.iter().map(|(n, f)| (*n, f))
    }

    /// Gets the values for a field number.
    pub fn get(&self, number: u64) -> Option<&UnknownField>
    {
        self.fields.get(&number)
    }

    /// True if the set has no fields.
    pub fn is_empty(&self) -> bool
    {
        self.fields.is_empty()
    }

    /// Renders the set in the protobuf text format.
    pub fn to_text(&self) -> String
    {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_text(&mut out, 0);
        out
    }

    fn write_text(&self, out: &mut String, indent: usize) -> fmt::Result
    {
        let pad = "  ".repeat(indent);
        for (number, field) in &self.fields {
            for v in &field.varint {
                writeln!(out, "{}{}: {}", pad, number, v)?;
            }
            for v in &field.fixed32 {
                writeln!(out, "{}{}: 0x{:08x}", pad, number, v)?;
            }
            for v in &field.fixed64 {
                writeln!(out, "{}{}: 0x{:016x}", pad, number, v)?;
            }
            for v in &field.length_delimited {
                match parse_nested(v, indent + 1) {
                    Ok(nested) => {
                        writeln!(out, "{}{}: {{", pad, number)?;
                        nested.write_text(out, indent + 1)?;
                        writeln!(out, "{}}}", pad)?;
                    }
                    Err(_) => writeln!(out, "{}{}: \"{}\"", pad, number, escape_bytes(v))?,
                }
            }
            for group in &field.group {
                writeln!(out, "{}{} {{", pad, number)?;
                group.write_text(out, indent + 1)?;
                writeln!(out, "{}}}", pad)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for UnknownFieldSet
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.write_str(&self.to_text())
    }
}

/// Parses a set found `depth` levels below the outermost one.
fn parse_nested(data: &[u8], depth: usize) -> Result<UnknownFieldSet, WireError>
{
    if depth > RECURSION_LIMIT {
        return Err(WireError::TooDeep { offset: 0 });
    }

    let mut cursor = data;
    parse_fields(&mut cursor, data.len(), None, depth)
}

/// Parses fields until the data ends or the end tag of `group` is found.
fn parse_fields(
    data: &mut &[u8],
    total: usize,
    group: Option<u64>,
    depth: usize,
) -> Result<UnknownFieldSet, WireError>
{
    let mut set = UnknownFieldSet::default();
    loop {
        if data.is_empty() {
            return match group {
                Some(number) => Err(WireError::UnterminatedGroup { number }),
                None => Ok(set),
            };
        }

        let offset = total - data.len();
        let tag = read_varint(data).ok_or(WireError::TruncatedTag { offset })?;
        let number = tag >> 3;
        let wire_type = (tag & 0x07) as u8;
        if number == 0 {
            return Err(WireError::ZeroFieldNumber { offset });
        }

        if wire_type == 4 {
            return match group {
                Some(expected) if expected == number => Ok(set),
                _ => Err(WireError::UnexpectedEndGroup { number, offset }),
            };
        }

        let truncated = WireError::TruncatedValue { number, offset };
        let field = set.fields.entry(number).or_default();
        match wire_type {
            0 => field.varint.push(read_varint(data).ok_or(truncated)?),
            1 => {
                let bytes = try_read_8_bytes(data).ok_or(truncated)?;
                field.fixed64.push(u64::from_le_bytes(bytes));
            }
            2 => {
                let bytes = read_length_delimited(data).ok_or(truncated)?;
                field.length_delimited.push(Bytes::copy_from_slice(bytes));
            }
            3 => {
                if depth >= RECURSION_LIMIT {
                    return Err(WireError::TooDeep { offset });
                }
                let nested = parse_fields(data, total, Some(number), depth + 1)?;
                field.group.push(nested);
            }
            5 => {
                let bytes = try_read_4_bytes(data).ok_or(truncated)?;
                field.fixed32.push(u32::from_le_bytes(bytes));
            }
            _ => return Err(WireError::InvalidWireType { wire_type, offset }),
        }
    }
}

/// Escapes bytes the way the protobuf text format prints strings.
pub fn escape_bytes(data: &[u8]) -> String
{
    let mut out = String::with_capacity(data.len());
    for &b in data {
        match b {
            0x07 => out.push_str("\\a"),
            0x08 => out.push_str("\\b"),
            0x0c => out.push_str("\\f"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x0b => out.push_str("\\v"),
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'"' => out.push_str("\\\""),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:03o}", b);
            }
        }
    }
    out
}

//! # Value model
//!
//! The closed set of data a transform may capture or keep as request state.

use std::collections::BTreeMap;
use std::fmt;

use crate::Decoder;
use crate::Encoder;
use crate::Error;
use crate::Result;
use crate::Tag;

/// Deepest container nesting accepted on either side of the wire.
pub const MAX_DEPTH: usize = 32;

/// A self-describing piece of plain data.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Unit,
    Bool(bool),
    U64(u64),
    S64(i64),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::U64(_) => "u64",
            Value::S64(_) => "s64",
            Value::F64(_) => "f64",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Levels of container nesting; scalars are depth 0.
    pub fn depth(&self) -> usize {
        match self {
            Value::List(items) => 1 + items.iter().map(Value::depth).max().unwrap_or(0),
            Value::Map(entries) => 1 + entries.values().map(Value::depth).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// Encodes this value as a standalone buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        encode_value(&mut enc, self)?;
        enc.into_bytes()
    }

    /// Decodes a standalone buffer produced by [`Value::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Value> {
        let mut dec = Decoder::new(bytes);
        let value = decode_value(&mut dec)?;
        dec.finish()?;
        Ok(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::S64(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "{}", String::from_utf8_lossy(v)),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<u64> for Value { fn from(v: u64) -> Self { Value::U64(v) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::S64(v) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::F64(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::Str(v.to_string()) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::Str(v) } }
impl From<&[u8]> for Value { fn from(v: &[u8]) -> Self { Value::Bytes(v.to_vec()) } }
impl From<Vec<u8>> for Value { fn from(v: Vec<u8>) -> Self { Value::Bytes(v) } }
impl From<Vec<Value>> for Value { fn from(v: Vec<Value>) -> Self { Value::List(v) } }
impl From<BTreeMap<String, Value>> for Value { fn from(v: BTreeMap<String, Value>) -> Self { Value::Map(v) } }

/// Writes `value` into the encoder.
///
/// # Errors
/// `Error::TooDeep` if the value nests beyond [`MAX_DEPTH`].
pub fn encode_value(enc: &mut Encoder, value: &Value) -> Result<()> {
    let depth = value.depth();
    if depth > MAX_DEPTH {
        return Err(Error::TooDeep(depth));
    }
    write(enc, value)
}

fn write(enc: &mut Encoder, value: &Value) -> Result<()> {
    match value {
        Value::Unit => enc.unit(),
        Value::Bool(v) => enc.bool(*v),
        Value::U64(v) => enc.u64(*v),
        Value::S64(v) => enc.s64(*v),
        Value::F64(v) => enc.f64(*v),
        Value::Str(v) => enc.str(v),
        Value::Bytes(v) => enc.bytes(v),
        Value::List(items) => {
            enc.list_begin()?;
            for item in items {
                write(enc, item)?;
            }
            enc.list_end()
        }
        Value::Map(entries) => {
            enc.map_begin()?;
            for (key, item) in entries {
                enc.variant_begin(key)?;
                write(enc, item)?;
                enc.variant_end()?;
            }
            enc.map_end()
        }
    }
}

/// Reads one value from the decoder.
///
/// # Errors
/// Structural errors from the decoder, `Error::TooDeep` past [`MAX_DEPTH`].
pub fn decode_value(dec: &mut Decoder<'_>) -> Result<Value> {
    read(dec, 0)
}

fn read(dec: &mut Decoder<'_>, depth: usize) -> Result<Value> {
    let tag = dec.peek_tag()?;
    let value = match tag {
        Tag::Unit => { dec.unit()?; Value::Unit }
        Tag::BoolTrue | Tag::BoolFalse => Value::Bool(dec.bool()?),
        Tag::U32 => Value::U64(dec.u32()? as u64),
        Tag::U64 => Value::U64(dec.u64()?),
        Tag::S64 => Value::S64(dec.s64()?),
        Tag::F64 => Value::F64(dec.f64()?),
        Tag::String => Value::Str(dec.str()?.to_string()),
        Tag::Bytes => Value::Bytes(dec.bytes()?.to_vec()),
        Tag::List | Tag::Map if depth >= MAX_DEPTH => return Err(Error::TooDeep(depth + 1)),
        Tag::List => {
            let mut list = dec.list()?;
            let mut items = Vec::new();
            while let Some(mut item) = list.next()? {
                items.push(read(&mut item, depth + 1)?);
                item.finish()?;
            }
            Value::List(items)
        }
        Tag::Map => {
            let mut map = dec.map()?;
            let mut entries = BTreeMap::new();
            while let Some((key, mut item)) = map.next()? {
                let v = read(&mut item, depth + 1)?;
                item.finish()?;
                if entries.insert(key.to_string(), v).is_some() {
                    return Err(Error::DuplicateKey(key.to_string()));
                }
            }
            Value::Map(entries)
        }
        Tag::Variant => return Err(Error::InvalidTag(tag as u8)),
    };
    Ok(value)
}

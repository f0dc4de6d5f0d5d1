//! OSC-style frames for the rendering engine.
//!
//! A frame is three sections, each NUL padded to a 4-byte boundary:
//!
//! ```text
//! [address\0..][,tags\0..][arg][arg]...
//! ```
//!
//! Numbers are written as big-endian `i32` when they are integer-valued and
//! fit, otherwise as big-endian `f32`. Strings are NUL padded like the address.
//! There is no length prefix: one frame travels in one datagram.

use thiserror::Error;

const TYPE_TAG_PREFIX: u8 = b',';
const TAG_INT: u8 = b'i';
const TAG_FLOAT: u8 = b'f';
const TAG_STRING: u8 = b's';

#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Number(f64),
    Str(String),
}

impl OscArg {
    pub fn type_tag(&self) -> u8 {
        match self {
            OscArg::Number(value) if as_int32(*value).is_some() => TAG_INT,
            OscArg::Number(_) => TAG_FLOAT,
            OscArg::Str(_) => TAG_STRING,
        }
    }
}

impl From<f64> for OscArg {
    fn from(value: f64) -> Self {
        OscArg::Number(value)
    }
}

impl From<i32> for OscArg {
    fn from(value: i32) -> Self {
        OscArg::Number(f64::from(value))
    }
}

impl From<&str> for OscArg {
    fn from(value: &str) -> Self {
        OscArg::Str(value.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OscError {
    #[error("string contains an embedded NUL byte")]
    EmbeddedNul,
    #[error("frame truncated at offset {offset}")]
    Truncated { offset: usize },
    #[error("type tag section must start with ','")]
    MissingTypeTags,
    #[error("unsupported type tag {0:?}")]
    UnsupportedTag(char),
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

/// Encoded frame. Built once per send and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolFrame(Vec<u8>);

impl ProtocolFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for ProtocolFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Section length for `len` payload bytes: `len + (4 - len % 4)`.
///
/// Always leaves at least one NUL and is never below 4.
pub fn padded_len(len: usize) -> usize {
    len + (4 - len % 4)
}

pub fn encode_message(address: &str, args: &[OscArg]) -> Result<ProtocolFrame, OscError> {
    let mut tags = Vec::with_capacity(args.len() + 1);
    tags.push(TYPE_TAG_PREFIX);
    tags.extend(args.iter().map(OscArg::type_tag));

    let capacity = padded_len(address.len()) + padded_len(tags.len()) + args.len() * 4;
    let mut buffer = Vec::with_capacity(capacity);
    write_padded(&mut buffer, address.as_bytes())?;
    write_padded(&mut buffer, &tags)?;

    for arg in args {
        match arg {
            OscArg::Number(value) => match as_int32(*value) {
                Some(int) => buffer.extend_from_slice(&int.to_be_bytes()),
                None => buffer.extend_from_slice(&(*value as f32).to_be_bytes()),
            },
            OscArg::Str(text) => write_padded(&mut buffer, text.as_bytes())?,
        }
    }

    Ok(ProtocolFrame(buffer))
}

fn write_padded(buffer: &mut Vec<u8>, bytes: &[u8]) -> Result<(), OscError> {
    if bytes.contains(&0) {
        return Err(OscError::EmbeddedNul);
    }
    let padded = padded_len(bytes.len());
    buffer.extend_from_slice(bytes);
    buffer.resize(buffer.len() + (padded - bytes.len()), 0);
    Ok(())
}

fn as_int32(value: f64) -> Option<i32> {
    let integral = value.fract() == 0.0
        && value >= f64::from(i32::MIN)
        && value <= f64::from(i32::MAX);
    integral.then_some(value as i32)
}

/// Decoded frame, mostly useful for diagnostics and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub type_tags: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn decode(bytes: &[u8]) -> Result<Self, OscError> {
        let mut offset = 0;
        let address = read_padded_str(bytes, &mut offset)?;
        let type_tags = read_padded_str(bytes, &mut offset)?;

        let tags = type_tags
            .strip_prefix(char::from(TYPE_TAG_PREFIX))
            .ok_or(OscError::MissingTypeTags)?;

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.chars() {
            let arg = match tag {
                'i' => {
                    let word = read_word(bytes, &mut offset)?;
                    OscArg::Number(f64::from(i32::from_be_bytes(word)))
                }
                'f' => {
                    let word = read_word(bytes, &mut offset)?;
                    OscArg::Number(f64::from(f32::from_be_bytes(word)))
                }
                's' => OscArg::Str(read_padded_str(bytes, &mut offset)?),
                other => return Err(OscError::UnsupportedTag(other)),
            };
            args.push(arg);
        }

        Ok(Self {
            address,
            type_tags,
            args,
        })
    }
}

fn read_word(bytes: &[u8], offset: &mut usize) -> Result<[u8; 4], OscError> {
    let end = *offset + 4;
    let word = bytes
        .get(*offset..end)
        .ok_or(OscError::Truncated { offset: *offset })?;
    *offset = end;
    let mut out = [0u8; 4];
    out.copy_from_slice(word);
    Ok(out)
}

fn read_padded_str(bytes: &[u8], offset: &mut usize) -> Result<String, OscError> {
    let rest = bytes
        .get(*offset..)
        .ok_or(OscError::Truncated { offset: *offset })?;
    let len = rest
        .iter()
        .position(|byte| *byte == 0)
        .ok_or(OscError::Truncated { offset: *offset })?;
    let end = *offset + padded_len(len);
    if end > bytes.len() {
        return Err(OscError::Truncated { offset: *offset });
    }
    let text = std::str::from_utf8(&rest[..len]).map_err(|_| OscError::InvalidUtf8)?;
    *offset = end;
    Ok(text.to_string())
}

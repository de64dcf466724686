// storefront/src/services/emv_qr.rs

//! EMV merchant-presented QR payloads: two-digit tag, two-digit length, value.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmvError {
  #[error("Value for tag {tag} is {len} bytes; at most 99 allowed")]
  ValueTooLong { tag: String, len: usize },

  #[error("Value for tag {tag} must be printable ASCII")]
  NotAscii { tag: String },

  #[error("Malformed TLV at offset {offset}")]
  Malformed { offset: usize },

  #[error("CRC mismatch: payload says {stated}, computed {computed}")]
  CrcMismatch { stated: String, computed: String },
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection, no xor-out).
pub fn crc16_ccitt_false(data: &[u8]) -> u16 {
  let mut crc: u16 = 0xFFFF;
  for byte in data {
    crc ^= u16::from(*byte) << 8;
    for _ in 0..8 {
      crc = if crc & 0x8000 != 0 {
        (crc << 1) ^ 0x1021
      } else {
        crc << 1
      };
    }
  }
  crc
}

/// The length field counts characters; restricting values to ASCII keeps it
/// equal to the byte length the CRC and parser work on.
fn encode(tag: &str, value: &str) -> Result<String, EmvError> {
  if !value.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
    return Err(EmvError::NotAscii { tag: tag.to_string() });
  }
  if value.len() > 99 {
    return Err(EmvError::ValueTooLong {
      tag: tag.to_string(),
      len: value.len(),
    });
  }
  Ok(format!("{}{:02}{}", tag, value.len(), value))
}

#[derive(Debug, Default, Clone)]
pub struct TlvBuilder {
  buf: String,
}

impl TlvBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn field(mut self, tag: &str, value: &str) -> Result<Self, EmvError> {
    self.buf.push_str(&encode(tag, value)?);
    Ok(self)
  }

  /// Emits a template tag whose value is the nested builder's output.
  pub fn template(self, tag: &str, nested: TlvBuilder) -> Result<Self, EmvError> {
    let inner = nested.buf;
    self.field(tag, &inner)
  }

  /// Appends tag 63 with the CRC over everything before it, including `6304`.
  pub fn finish_with_crc(mut self) -> String {
    self.buf.push_str("6304");
    let crc = crc16_ccitt_false(self.buf.as_bytes());
    self.buf.push_str(&format!("{:04X}", crc));
    self.buf
  }
}

/// Splits a flat TLV string into `(tag, value)` pairs.
pub fn parse_tlv(payload: &str) -> Result<Vec<(String, String)>, EmvError> {
  let mut fields = Vec::new();
  let mut offset = 0;
  while offset < payload.len() {
    let header = payload
      .get(offset..offset + 4)
      .ok_or(EmvError::Malformed { offset })?;
    let len: usize = header[2..].parse().map_err(|_| EmvError::Malformed { offset })?;
    let value = payload
      .get(offset + 4..offset + 4 + len)
      .ok_or(EmvError::Malformed { offset })?;
    fields.push((header[..2].to_string(), value.to_string()));
    offset += 4 + len;
  }
  Ok(fields)
}

/// Checks the trailing tag 63 against the rest of the payload.
pub fn verify_crc(payload: &str) -> Result<(), EmvError> {
  let split = payload.len().checked_sub(4).ok_or(EmvError::Malformed { offset: 0 })?;
  let (body, stated) = payload.split_at(split);
  if !body.ends_with("6304") {
    return Err(EmvError::Malformed { offset: split });
  }
  let computed = format!("{:04X}", crc16_ccitt_false(body.as_bytes()));
  if computed != stated {
    return Err(EmvError::CrcMismatch {
      stated: stated.to_string(),
      computed,
    });
  }
  Ok(())
}

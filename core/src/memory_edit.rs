//! Memory edit specs
//!
//! Parses what the user types into the memory edit box before anything is
//! sent to the service:
//!
//! - `30=FF` writes one byte
//! - `30:3F` fills an inclusive range with random bytes
//! - `30:3F=00` fills an inclusive range with one value
//!
//! Numbers are hex and may be written `0x1F`, `1Fh` or `1F`.

use rand::Rng;
use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::error::Fault;

pub const INVALID_FORMAT: &str = "Invalid memory edit format.";

/// One `[address, value]` write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryWrite {
    pub address: u16,
    pub value: u8,
}

impl Serialize for MemoryWrite {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&format!("0x{:x}", self.address))?;
        seq.serialize_element(&format!("0x{:x}", self.value))?;
        seq.end()
    }
}

/// A validated edit, serialized as a list of `[address, value]` pairs
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct MemoryEdit {
    writes: Vec<MemoryWrite>,
}

impl MemoryEdit {
    pub fn writes(&self) -> &[MemoryWrite] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Parse an edit string, using the thread RNG for random range fills
pub fn parse(input: &str) -> Result<MemoryEdit, Fault> {
    parse_with(input, &mut rand::thread_rng())
}

pub fn parse_with<R: Rng + ?Sized>(input: &str, rng: &mut R) -> Result<MemoryEdit, Fault> {
    let input = input.trim();

    let (target, value) = match input.split_once('=') {
        Some((target, value)) => (target, Some(parse_number(value)?)),
        None => (input, None),
    };

    let writes = match target.split_once(':') {
        Some((start, end)) => {
            let start = parse_address(start)?;
            let end = parse_address(end)?;
            if start > end {
                return Err(invalid());
            }
            (start..=end)
                .map(|address| MemoryWrite {
                    address,
                    value: match value {
                        Some(value) => value,
                        None => rng.gen(),
                    },
                })
                .collect()
        }
        None => {
            let value = value.ok_or_else(invalid)?;
            vec![MemoryWrite {
                address: parse_address(target)?,
                value,
            }]
        }
    };

    Ok(MemoryEdit { writes })
}

fn parse_address(text: &str) -> Result<u16, Fault> {
    let raw = parse_hex(text)?;
    u16::try_from(raw).map_err(|_| invalid())
}

fn parse_number(text: &str) -> Result<u8, Fault> {
    let raw = parse_hex(text)?;
    u8::try_from(raw).map_err(|_| invalid())
}

/// Accepts `0x1F`, `1Fh` and bare `1F`
fn parse_hex(text: &str) -> Result<u32, Fault> {
    let text = text.trim();
    let digits = if let Some(rest) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        rest
    } else if let Some(rest) = text.strip_suffix('h').or_else(|| text.strip_suffix('H')) {
        rest
    } else {
        text
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    u32::from_str_radix(digits, 16).map_err(|_| invalid())
}

fn invalid() -> Fault {
    Fault::validation(INVALID_FORMAT)
}

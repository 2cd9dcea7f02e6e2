/*!
Wire word (28-bit) encoding and decoding.

This module provides the core wire word data structure and the bit
permutation shared by the encoder and decoder. The permutation comes from
the link's pin mapping: logical data bit `i` travels on wire bit
`BIT_SEQUENCE[i]`, interleaved with the control signals.
*/

use crate::error::{ClinkError, Result};
use crate::protocol::{DATA_MASK, DVAL_BIT, FVAL_BIT, LVAL_BIT, SPARE_BIT, WORD_MASK};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire bit position of every logical data bit, least significant first.
pub const BIT_SEQUENCE: [u32; 24] = [
    0, 1, 2, 3, 4, 6, 27, 5, 7, 8, 9, 12, 13, 14, 10, 11, 15, 18, 19, 20, 21, 22, 16, 17,
];

/// Control signals carried by every wire word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlFlags {
    /// Frame valid
    pub fval: bool,
    /// Line valid
    pub lval: bool,
    /// Data valid
    pub dval: bool,
    pub spare: bool,
}

impl ControlFlags {
    /// Flags of an active pixel: frame, line and data all valid
    pub const ACTIVE: Self = Self { fval: true, lval: true, dval: true, spare: false };

    /// Flags of an idle word: nothing valid
    pub const IDLE: Self = Self { fval: false, lval: false, dval: false, spare: false };

    pub fn new(fval: bool, lval: bool, dval: bool) -> Self {
        Self { fval, lval, dval, spare: false }
    }

    fn to_bits(self) -> u32 {
        (u32::from(self.lval) << LVAL_BIT)
            | (u32::from(self.fval) << FVAL_BIT)
            | (u32::from(self.dval) << DVAL_BIT)
            | (u32::from(self.spare) << SPARE_BIT)
    }

    fn from_bits(raw: u32) -> Self {
        Self {
            fval: (raw >> FVAL_BIT) & 1 != 0,
            lval: (raw >> LVAL_BIT) & 1 != 0,
            dval: (raw >> DVAL_BIT) & 1 != 0,
            spare: (raw >> SPARE_BIT) & 1 != 0,
        }
    }
}

/// One pixel as three 8-bit channels.
///
/// Channel A occupies data bits 0..8, B bits 8..16 and C bits 16..24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pixel {
    pub a: u8,
    pub b: u8,
    pub c: u8,
}

impl Pixel {
    pub fn new(a: u8, b: u8, c: u8) -> Self {
        Self { a, b, c }
    }

    /// Split 24 bits of data into channels
    pub fn unpack(data: u32) -> Self {
        Self {
            a: (data & 0xFF) as u8,
            b: ((data >> 8) & 0xFF) as u8,
            c: ((data >> 16) & 0xFF) as u8,
        }
    }

    /// Join channels into 24 bits of data
    pub fn pack(self) -> u32 {
        u32::from(self.a) | (u32::from(self.b) << 8) | (u32::from(self.c) << 16)
    }

    /// 16-bit value formed by channels A (low byte) and B (high byte)
    pub fn value(self) -> u16 {
        u16::from(self.a) | (u16::from(self.b) << 8)
    }
}

impl From<u32> for Pixel {
    fn from(data: u32) -> Self {
        Self::unpack(data)
    }
}

/// Result of decoding a wire word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// 24-bit logical pixel data
    pub data: u32,
    pub flags: ControlFlags,
}

impl Decoded {
    pub fn pixel(&self) -> Pixel {
        Pixel::unpack(self.data)
    }
}

/// A 28-bit encoded link word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireWord(u32);

impl WireWord {
    /// Idle word: no control signal asserted, no data
    pub const IDLE: Self = Self(0);

    /// Wrap a raw value, rejecting bits above the 28-bit word
    pub fn from_raw(raw: u32) -> Result<Self> {
        if raw & !WORD_MASK != 0 {
            return Err(ClinkError::InvalidWord(raw));
        }
        Ok(Self(raw))
    }

    /// Wrap a raw value, dropping bits above the 28-bit word
    pub fn from_raw_truncating(raw: u32) -> Self {
        Self(raw & WORD_MASK)
    }

    /// Raw 28-bit value
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Encode 24 bits of pixel data plus control flags.
    ///
    /// Data bits above bit 23 are ignored.
    pub fn encode(data: u32, flags: ControlFlags) -> Self {
        let data = data & DATA_MASK;
        let permuted = BIT_SEQUENCE
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, &j)| acc | (((data >> i) & 1) << j));
        Self(permuted | flags.to_bits())
    }

    /// Encode a pixel plus control flags
    pub fn encode_pixel(pixel: Pixel, flags: ControlFlags) -> Self {
        Self::encode(pixel.pack(), flags)
    }

    /// Undo the permutation and split out the control flags
    pub fn decode(self) -> Decoded {
        Decoded {
            data: self.data(),
            flags: self.flags(),
        }
    }

    /// Only the 24 logical data bits
    pub fn data(self) -> u32 {
        BIT_SEQUENCE
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, &j)| acc | (((self.0 >> j) & 1) << i))
    }

    /// Only the control flags
    pub fn flags(self) -> ControlFlags {
        ControlFlags::from_bits(self.0)
    }
}

impl fmt::Display for WireWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:07X}", self.0)
    }
}

/// Encode data and flags into a wire word
pub fn encode(data: u32, flags: ControlFlags) -> WireWord {
    WireWord::encode(data, flags)
}

/// Decode a wire word into data and flags
pub fn decode(word: WireWord) -> Decoded {
    word.decode()
}

/*!
Frame generation and serializer word packing.

[`FrameGenerator`] turns a 2-D array of pixel data into the wire words a
camera would send for one frame: vertical blanking lines first, then every
row preceded by horizontal blanking. It is the reference source used to
validate the parser and ROI engines, and the pattern image played back by
the link serializer.
*/

use crate::error::{ClinkError, Result};
use crate::protocol::{CLOCK_PATTERN, DATA_MASK, HBLANK_WORDS, LANES, LANE_BITS, VBLANK_LINES, WORD_BITS, WORD_MASK};
use crate::wire::{ControlFlags, WireWord};
use serde::{Deserialize, Serialize};
use std::iter;

/// Generates wire words for lines and frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGenerator {
    /// Blank words before each line (LVAL low)
    pub hblank: usize,
    /// Blank lines before each frame (FVAL low)
    pub vblank: usize,
}

impl FrameGenerator {
    pub fn new(hblank: usize, vblank: usize) -> Self {
        Self { hblank, vblank }
    }

    /// Words for one line.
    ///
    /// `hblank` words with LVAL and DVAL low carry the line's first pixel,
    /// then every pixel follows with LVAL high and DVAL equal to `fval`.
    pub fn gen_line<'a>(&self, line: &'a [u32], fval: bool) -> impl Iterator<Item = WireWord> + 'a {
        let hblank = self.hblank;
        let blank_data = line.first().copied().unwrap_or(0);
        let blank = WireWord::encode(blank_data, ControlFlags::new(fval, false, false));
        let active = ControlFlags::new(fval, true, fval);

        iter::repeat(blank)
            .take(hblank)
            .chain(line.iter().map(move |&data| WireWord::encode(data, active)))
    }

    /// Words for one frame.
    ///
    /// `vblank` copies of the first row with FVAL low, then every row with
    /// FVAL high. A frame without rows produces no words.
    pub fn gen_frame<'a, R>(&self, rows: &'a [R]) -> impl Iterator<Item = WireWord> + 'a
    where
        R: AsRef<[u32]>,
    {
        let generator = *self;
        let first: &'a [u32] = rows.first().map(|row| row.as_ref()).unwrap_or(&[]);
        let vblank = if rows.is_empty() { 0 } else { self.vblank };

        (0..vblank)
            .flat_map(move |_| generator.gen_line(first, false))
            .chain(rows.iter().flat_map(move |row| generator.gen_line(row.as_ref(), true)))
    }

    /// Number of words `gen_frame` yields for `rows`
    pub fn frame_len<R: AsRef<[u32]>>(&self, rows: &[R]) -> usize {
        let Some(first) = rows.first() else {
            return 0;
        };
        let blank = self.vblank * (self.hblank + first.as_ref().len());
        let active: usize = rows.iter().map(|row| self.hblank + row.as_ref().len()).sum();
        blank + active
    }
}

impl Default for FrameGenerator {
    fn default() -> Self {
        Self::new(HBLANK_WORDS, VBLANK_LINES)
    }
}

/// Ramp test image: row `i` holds `i*width .. (i+1)*width`.
///
/// Values wrap at 24 bits.
pub fn ramp(width: usize, height: usize) -> Vec<Vec<u32>> {
    (0..height)
        .map(|row| {
            (0..width)
                .map(|col| ((row * width + col) as u32) & DATA_MASK)
                .collect()
        })
        .collect()
}

/// Parallel vector driven into the 7:1 serializer for one word.
///
/// Lane 0 (bits 0..7) carries the link clock pattern, lanes 1-4 carry the
/// 28 wire bits.
pub fn serializer_word(word: WireWord) -> u64 {
    u64::from(CLOCK_PATTERN) | (u64::from(word.raw()) << LANE_BITS)
}

/// The serializer vector split into its five 7-bit lanes
pub fn serializer_lanes(word: WireWord) -> [u8; LANES] {
    let vector = serializer_word(word);
    let mut lanes = [0u8; LANES];
    for (i, lane) in lanes.iter_mut().enumerate() {
        *lane = ((vector >> (i as u32 * LANE_BITS)) & 0x7F) as u8;
    }
    lanes
}

/// Recover the wire word from a serializer vector
pub fn deserialize_word(vector: u64) -> Result<WireWord> {
    let clock = (vector & 0x7F) as u8;
    if clock != CLOCK_PATTERN {
        return Err(ClinkError::ClockPattern(clock));
    }
    if vector >> (LANE_BITS + WORD_BITS) != 0 {
        return Err(ClinkError::invalid_stream(format!(
            "serializer vector {:#x} wider than {} bits",
            vector,
            LANE_BITS + WORD_BITS
        )));
    }
    Ok(WireWord::from_raw_truncating((vector >> LANE_BITS) as u32 & WORD_MASK))
}

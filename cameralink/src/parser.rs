/*!
Stream parser: wire words in, coordinate-tagged pixel samples out.

The parser decodes each word's control flags and channels in the same
cycle, and tracks the pixel coordinates in registers:

- `x` counts up while LVAL is high and returns to 0 while it is low
- `y` advances once on the first LVAL-low cycle after an active line
  (detected one cycle after the line ends), and returns to 0 while FVAL is low

The coordinates reported with a word are the registered counters, i.e. the
position of the pixel that word carries.
*/

use crate::error::{ClinkError, Result};
use crate::protocol::MAX_COORDINATE_BITS;
use crate::register::{Clocked, Register};
use crate::wire::{Pixel, WireWord};
use serde::{Deserialize, Serialize};

/// One decoded cycle of the pixel stream.
///
/// Valid for the cycle it was produced in; every ROI engine reads the same copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelSample {
    pub x: u32,
    pub y: u32,
    pub a: u8,
    pub b: u8,
    pub c: u8,
    /// DVAL: this cycle carries a valid pixel
    pub strobe: bool,
    /// FVAL low: outside the active frame
    pub end_of_frame: bool,
}

impl PixelSample {
    pub fn pixel(&self) -> Pixel {
        Pixel::new(self.a, self.b, self.c)
    }
}

/// Registered parser state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct ParserState {
    x: u32,
    y: u32,
    last_lval: bool,
    last_fval: bool,
}

/// Coordinate tracking parser
#[derive(Debug, Clone)]
pub struct StreamParser {
    width: u32,
    state: Register<ParserState>,
}

impl StreamParser {
    /// Create a parser with `width`-bit coordinate counters
    pub fn new(width: u32) -> Result<Self> {
        if width == 0 || width > MAX_COORDINATE_BITS {
            return Err(ClinkError::invalid_parameter(format!(
                "coordinate width must be 1..={} bits, got {}",
                MAX_COORDINATE_BITS, width
            )));
        }
        Ok(Self {
            width,
            state: Register::default(),
        })
    }

    /// Coordinate counter width in bits
    pub fn width(&self) -> u32 {
        self.width
    }

    fn mask(&self) -> u32 {
        (1u32 << self.width) - 1
    }

    /// Current registered coordinates
    pub fn position(&self) -> (u32, u32) {
        let state = self.state.get();
        (state.x, state.y)
    }

    /// Combinational outputs for `word` given the registered state
    pub fn evaluate(&self, word: WireWord) -> PixelSample {
        let decoded = word.decode();
        let pixel = decoded.pixel();
        let state = self.state.get();
        PixelSample {
            x: state.x,
            y: state.y,
            a: pixel.a,
            b: pixel.b,
            c: pixel.c,
            strobe: decoded.flags.dval,
            end_of_frame: !decoded.flags.fval,
        }
    }

    /// Stage the next register values for `word`
    pub fn stage(&mut self, word: WireWord) {
        let flags = word.flags();
        let q = self.state.get();
        let mask = self.mask();

        let mut d = ParserState {
            x: q.x.wrapping_add(1) & mask,
            y: q.y,
            last_lval: flags.lval,
            last_fval: flags.fval,
        };
        if !flags.lval {
            d.x = 0;
            if q.last_fval && q.last_lval {
                d.y = q.y.wrapping_add(1) & mask;
            }
        }
        if !flags.fval {
            d.y = 0;
        }
        self.state.set(d);
    }

    /// Evaluate, stage and commit one full cycle
    pub fn step(&mut self, word: WireWord) -> PixelSample {
        let sample = self.evaluate(word);
        self.stage(word);
        self.commit();
        sample
    }

    /// Return to the power-on state
    pub fn reset(&mut self) {
        self.state.reset(ParserState::default());
    }
}

impl Clocked for StreamParser {
    fn commit(&mut self) {
        self.state.commit();
    }
}

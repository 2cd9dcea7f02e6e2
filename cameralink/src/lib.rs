/*!
# Camera Link Pixel Stream Core

This crate models the receive side of a Camera Link frame grabber at the
cycle level: one 28-bit wire word enters per clock, a parser turns the
LVAL/FVAL/DVAL handshake into pixel coordinates, and any number of ROI
engines sum pixel values over a window and hand the result to a consumer
through a strobe/acknowledge handshake.

## Core Types

- [`WireWord`] - 28-bit encoded link word
- [`ControlFlags`] - LVAL/FVAL/DVAL/spare control bits
- [`PixelSample`] - Decoded per-cycle pixel with coordinates
- [`Window`] - ROI rectangle
- [`Grabber`] - Parser plus N ROI engines

## Modules

- [`wire`] - Bit permutation codec
- [`pattern`] - Frame generator and serializer word packing
- [`register`] - Double-buffered clocked state
- [`parser`] - Coordinate tracking stream parser
- [`roi`] - Windowed accumulation engine
- [`grabber`] - Parser and engine composition
- [`consumer`] - Acknowledging result consumer
- [`stream`] - Wire word byte streams and files
- [`error`] - Common error types
*/

pub mod wire;
pub mod pattern;
pub mod register;
pub mod parser;
pub mod roi;
pub mod grabber;
pub mod consumer;
pub mod stream;
pub mod error;

// Re-export commonly used types
pub use wire::{WireWord, ControlFlags, Decoded, Pixel, BIT_SEQUENCE};
pub use pattern::FrameGenerator;
pub use register::{Clocked, Register};
pub use parser::{PixelSample, StreamParser};
pub use roi::{MembershipRule, RoiEngine, RoiResult, Window};
pub use grabber::Grabber;
pub use consumer::{AckConsumer, Completion};
pub use error::{ClinkError, Result};

/// Version information for the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol constants
pub mod protocol {
    /// Width of a wire word in bits
    pub const WORD_BITS: u32 = 28;

    /// Mask covering every valid wire word bit
    pub const WORD_MASK: u32 = (1 << WORD_BITS) - 1;

    /// Number of pixel data bits carried per word (three 8-bit channels)
    pub const DATA_BITS: u32 = 24;

    /// Mask covering the logical pixel data
    pub const DATA_MASK: u32 = (1 << DATA_BITS) - 1;

    /// Wire bit positions of the control signals
    pub const SPARE_BIT: u32 = 23;
    pub const LVAL_BIT: u32 = 24;
    pub const FVAL_BIT: u32 = 25;
    pub const DVAL_BIT: u32 = 26;

    /// Default horizontal blanking words emitted before each line
    pub const HBLANK_WORDS: usize = 2;

    /// Default vertical blanking lines emitted before each frame
    pub const VBLANK_LINES: usize = 3;

    /// Bits per serializer lane (7:1 LVDS serialization)
    pub const LANE_BITS: u32 = 7;

    /// Serializer lanes: one clock lane followed by four data lanes
    pub const LANES: usize = 5;

    /// Pattern driven on the clock lane of every serializer vector
    pub const CLOCK_PATTERN: u8 = 0b110_0001;

    /// Width of a pixel value summed by the ROI engines (channels A and B)
    pub const PIXEL_VALUE_BITS: u32 = 16;

    /// Widest coordinate counter supported by the parser
    pub const MAX_COORDINATE_BITS: u32 = 16;
}

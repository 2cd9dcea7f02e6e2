/*!
Region-of-interest accumulation engine.

Each [`RoiEngine`] watches the shared pixel stream, sums the 16-bit value of
every valid pixel (channel A low, channel B high, optionally right-shifted)
that falls inside its [`Window`], and presents the finished sum once per
frame. The result is held with `strobe` high until the consumer raises
`acknowledge`; the acknowledged cycle clears the sum for the next frame.

Operating rules:

- there must be at least one LVAL-low cycle between lines
- there must be at least two FVAL-low cycles between frames
- results must be acknowledged before the next frame ends, otherwise the
  pending sum keeps accumulating into the next frame and one strobe is lost
*/

use crate::error::{ClinkError, Result};
use crate::parser::PixelSample;
use crate::protocol::{MAX_COORDINATE_BITS, PIXEL_VALUE_BITS};
use crate::register::{Clocked, Register};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::debug;

static WINDOW_PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Window {
    pub x0: u32,
    pub x1: u32,
    pub y0: u32,
    pub y1: u32,
}

impl Window {
    pub fn new(x0: u32, x1: u32, y0: u32, y1: u32) -> Self {
        Self { x0, x1, y0, y1 }
    }

    /// A window no pixel can fall into
    pub fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    pub fn contains_x(&self, x: u32) -> bool {
        self.x0 <= x && x < self.x1
    }

    pub fn contains_y(&self, y: u32) -> bool {
        self.y0 <= y && y < self.y1
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.contains_x(x) && self.contains_y(y)
    }

    /// Number of pixel positions covered
    pub fn area(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        u64::from(self.x1 - self.x0) * u64::from(self.y1 - self.y0)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{},{}..{}", self.x0, self.x1, self.y0, self.y1)
    }
}

impl FromStr for Window {
    type Err = ClinkError;

    /// Parse `"x0..x1,y0..y1"`
    fn from_str(s: &str) -> Result<Self> {
        let re = WINDOW_PATTERN
            .get_or_init(|| Regex::new(r"^\s*(\d+)\s*\.\.\s*(\d+)\s*,\s*(\d+)\s*\.\.\s*(\d+)\s*$"))
            .as_ref()
            .map_err(|e| ClinkError::invalid_window(e.to_string()))?;
        let captures = re
            .captures(s)
            .ok_or_else(|| ClinkError::invalid_window(format!("expected \"x0..x1,y0..y1\", got {:?}", s)))?;

        let mut bounds = [0u32; 4];
        for (i, bound) in bounds.iter_mut().enumerate() {
            let text = &captures[i + 1];
            *bound = text
                .parse()
                .map_err(|_| ClinkError::invalid_window(format!("bound {:?} out of range", text)))?;
        }
        Ok(Self::new(bounds[0], bounds[1], bounds[2], bounds[3]))
    }
}

/// How the engine decides window membership each cycle.
///
/// Coordinate counters only ever step up by one or return to 0, so for fixed
/// bounds both rules select exactly `[lower, upper)`, including bounds past
/// the edge of the frame. They differ when bounds move while a counter is
/// already between them: `Latched` stays clear until the counter next
/// reaches the new lower bound, `Comparator` follows the new bounds at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipRule {
    /// Set when the coordinate equals the lower bound, cleared when it
    /// equals the upper bound or drops below the lower one. Never set for an
    /// empty range.
    #[default]
    Latched,
    /// Recomputed from `lower <= coordinate < upper`
    Comparator,
}

impl FromStr for MembershipRule {
    type Err = ClinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "latched" | "latch" => Ok(Self::Latched),
            "comparator" | "compare" => Ok(Self::Comparator),
            other => Err(ClinkError::invalid_parameter(format!("unknown membership rule {:?}", other))),
        }
    }
}

impl MembershipRule {
    fn next(self, current: bool, position: u32, lower: u32, upper: u32) -> bool {
        match self {
            Self::Latched => {
                let mut good = current;
                if position == lower && lower < upper {
                    good = true;
                }
                if position == upper || position < lower {
                    good = false;
                }
                good
            }
            Self::Comparator => lower <= position && position < upper,
        }
    }
}

fn check_shift(shift: u32) -> Result<()> {
    if shift > PIXEL_VALUE_BITS {
        return Err(ClinkError::invalid_parameter(format!(
            "shift must be at most {}, got {}",
            PIXEL_VALUE_BITS, shift
        )));
    }
    Ok(())
}

/// Result presented to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoiResult {
    pub sum: u64,
    /// High while a completed sum waits for acknowledgement
    pub strobe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct RoiState {
    x_good: bool,
    y_good: bool,
    /// Previous cycle carried a valid pixel
    pixel_strobe: bool,
    /// Shifted value of that pixel
    value: u32,
    /// At least one pixel counted since the last acknowledge
    done: bool,
    sum: u64,
    out_strobe: bool,
}

/// Windowed sum over the pixel stream
#[derive(Debug, Clone)]
pub struct RoiEngine {
    window: Window,
    rule: MembershipRule,
    width: u32,
    shift: u32,
    sum_bits: u32,
    state: Register<RoiState>,
}

impl RoiEngine {
    /// Create an engine for `width`-bit coordinates, dropping the low
    /// `shift` bits of every pixel value.
    pub fn new(width: u32, shift: u32) -> Result<Self> {
        if width == 0 || width > MAX_COORDINATE_BITS {
            return Err(ClinkError::invalid_parameter(format!(
                "coordinate width must be 1..={} bits, got {}",
                MAX_COORDINATE_BITS, width
            )));
        }
        check_shift(shift)?;
        Ok(Self {
            window: Window::default(),
            rule: MembershipRule::default(),
            width,
            shift,
            sum_bits: 2 * width + PIXEL_VALUE_BITS - shift,
            state: Register::default(),
        })
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    pub fn with_rule(mut self, rule: MembershipRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// Change the window; used from the next cycle on
    pub fn set_window(&mut self, window: Window) {
        self.window = window;
    }

    pub fn rule(&self) -> MembershipRule {
        self.rule
    }

    pub fn set_rule(&mut self, rule: MembershipRule) {
        self.rule = rule;
    }

    /// Coordinate width in bits
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    /// Change the value shift; the sum register narrows or widens to match
    pub fn set_shift(&mut self, shift: u32) -> Result<()> {
        check_shift(shift)?;
        self.shift = shift;
        self.sum_bits = 2 * self.width + PIXEL_VALUE_BITS - shift;
        Ok(())
    }

    /// Width of the sum register.
    ///
    /// A full frame of maximal pixels fits without overflow.
    pub fn sum_bits(&self) -> u32 {
        self.sum_bits
    }

    fn sum_mask(&self) -> u64 {
        (1u64 << self.sum_bits) - 1
    }

    /// Registered result for this cycle
    pub fn result(&self) -> RoiResult {
        let state = self.state.get();
        RoiResult {
            sum: state.sum,
            strobe: state.out_strobe,
        }
    }

    /// Stage the next state from this cycle's sample and acknowledge line
    pub fn stage(&mut self, sample: &PixelSample, acknowledge: bool) {
        let q = self.state.get();
        let w = self.window;
        let mut d = q;

        d.x_good = self.rule.next(q.x_good, sample.x, w.x0, w.x1);
        d.y_good = self.rule.next(q.y_good, sample.y, w.y0, w.y1);

        if sample.strobe {
            d.value = u32::from(sample.pixel().value()) >> self.shift;
            d.pixel_strobe = true;
        } else {
            d.pixel_strobe = false;
        }

        if q.x_good && q.y_good && q.pixel_strobe {
            d.sum = q.sum.wrapping_add(u64::from(q.value)) & self.sum_mask();
            d.done = true;
        }

        if q.done && sample.end_of_frame {
            d.out_strobe = true;
        }

        if q.out_strobe && acknowledge {
            d.out_strobe = false;
            d.sum = 0;
            d.done = false;
        }

        if d.out_strobe && !q.out_strobe {
            debug!("ROI {} result ready: sum {}", w, d.sum);
        } else if q.out_strobe && !d.out_strobe {
            debug!("ROI {} result acknowledged", w);
        }

        self.state.set(d);
    }

    /// Stage and commit one full cycle
    pub fn step(&mut self, sample: &PixelSample, acknowledge: bool) -> RoiResult {
        self.stage(sample, acknowledge);
        self.commit();
        self.result()
    }

    /// Return to the power-on state, keeping the configuration
    pub fn reset(&mut self) {
        self.state.reset(RoiState::default());
    }
}

impl Clocked for RoiEngine {
    fn commit(&mut self) {
        self.state.commit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(x: u32, y: u32, value: u16) -> PixelSample {
        PixelSample {
            x,
            y,
            a: (value & 0xFF) as u8,
            b: (value >> 8) as u8,
            c: 0,
            strobe: true,
            end_of_frame: false,
        }
    }

    fn blank(x: u32, y: u32, end_of_frame: bool) -> PixelSample {
        PixelSample {
            x,
            y,
            end_of_frame,
            ..PixelSample::default()
        }
    }

    #[test]
    fn test_window_parsing() {
        let window: Window = "0..10, 2..5".parse().unwrap();
        assert_eq!(window, Window::new(0, 10, 2, 5));
        assert_eq!(window.to_string(), "0..10,2..5");
        assert!("0..10".parse::<Window>().is_err());
        assert!("a..b,c..d".parse::<Window>().is_err());
        assert!("0..99999999999,0..1".parse::<Window>().is_err());
        // Parsing twice reuses the compiled pattern
        assert_eq!("1..2,3..4".parse::<Window>().unwrap(), Window::new(1, 2, 3, 4));
    }

    #[test]
    fn test_window_geometry() {
        let window = Window::new(1, 3, 0, 2);
        assert!(window.contains(1, 0));
        assert!(window.contains(2, 1));
        assert!(!window.contains(3, 1));
        assert!(!window.contains(1, 2));
        assert_eq!(window.area(), 4);
        assert!(Window::new(3, 3, 0, 1).is_empty());
        assert!(Window::new(0, 1, 4, 2).is_empty());
        assert_eq!(Window::new(4, 2, 0, 1).area(), 0);
    }

    #[test]
    fn test_rule_parsing() {
        assert_eq!("Latched".parse::<MembershipRule>().unwrap(), MembershipRule::Latched);
        assert_eq!("comparator".parse::<MembershipRule>().unwrap(), MembershipRule::Comparator);
        assert!("window".parse::<MembershipRule>().is_err());
    }

    #[test]
    fn test_latched_rule_edges() {
        let rule = MembershipRule::Latched;
        assert!(rule.next(false, 2, 2, 4));
        assert!(rule.next(true, 3, 2, 4));
        assert!(!rule.next(true, 4, 2, 4));
        assert!(!rule.next(false, 3, 2, 4));
        // Equal bounds: clear wins
        assert!(!rule.next(false, 2, 2, 2));
        // Inverted bounds never set
        assert!(!rule.next(false, 4, 4, 2));
        // Counter restarting below the window clears, even if the upper
        // bound was never reached
        assert!(!rule.next(true, 0, 1, 10));
        assert!(rule.next(true, 9, 1, 10));
    }

    #[test]
    fn test_rules_differ_only_for_moved_bounds() {
        // Counter at 3 when the window moves from [5, 8) to [0, 8)
        assert!(!MembershipRule::Latched.next(false, 3, 0, 8));
        assert!(MembershipRule::Comparator.next(false, 3, 0, 8));

        // A counter walking 0..width then restarting agrees everywhere
        for (lower, upper) in [(0, 3), (1, 10), (2, 2), (4, 1), (0, 100)] {
            let mut latched = false;
            for position in (0..6).chain(0..6) {
                latched = MembershipRule::Latched.next(latched, position, lower, upper);
                let compared = MembershipRule::Comparator.next(false, position, lower, upper);
                assert_eq!(latched, compared, "[{}, {}) at {}", lower, upper, position);
            }
        }
    }

    #[test]
    fn test_comparator_rule() {
        let rule = MembershipRule::Comparator;
        assert!(rule.next(false, 3, 2, 4));
        assert!(!rule.next(true, 4, 2, 4));
        assert!(!rule.next(true, 1, 2, 4));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(RoiEngine::new(0, 0).is_err());
        assert!(RoiEngine::new(12, 17).is_err());
        assert_eq!(RoiEngine::new(12, 4).unwrap().sum_bits(), 36);

        let mut roi = RoiEngine::new(12, 0).unwrap();
        assert_eq!(roi.sum_bits(), 40);
        roi.set_shift(8).unwrap();
        assert_eq!(roi.sum_bits(), 32);
        assert!(roi.set_shift(17).is_err());
        assert_eq!(roi.shift(), 8);
    }

    #[test]
    fn test_pixel_counted_one_cycle_later() {
        let mut roi = RoiEngine::new(8, 0).unwrap().with_window(Window::new(0, 4, 0, 4));

        // Enter the window
        roi.step(&blank(0, 0, false), false);
        roi.step(&pixel(0, 0, 5), false);
        assert_eq!(roi.result().sum, 0);
        roi.step(&pixel(1, 0, 7), false);
        assert_eq!(roi.result().sum, 5);
        roi.step(&blank(0, 0, false), false);
        assert_eq!(roi.result().sum, 12);
        assert!(!roi.result().strobe);
    }

    #[test]
    fn test_strobe_and_acknowledge() {
        let mut roi = RoiEngine::new(8, 0).unwrap().with_window(Window::new(0, 4, 0, 4));
        roi.step(&blank(0, 0, false), false);
        roi.step(&pixel(0, 0, 300), false);
        roi.step(&blank(0, 0, false), false);
        // Frame ends
        roi.step(&blank(0, 0, true), false);
        let result = roi.step(&blank(0, 0, true), false);
        assert_eq!(result, RoiResult { sum: 300, strobe: true });

        // Held until acknowledged
        for _ in 0..5 {
            assert!(roi.step(&blank(0, 0, true), false).strobe);
        }
        let result = roi.step(&blank(0, 0, true), true);
        assert_eq!(result, RoiResult { sum: 0, strobe: false });
        // No new pixels: no new strobe
        for _ in 0..5 {
            assert!(!roi.step(&blank(0, 0, true), false).strobe);
        }
    }

    #[test]
    fn test_acknowledge_without_strobe_is_ignored() {
        let mut roi = RoiEngine::new(8, 0).unwrap().with_window(Window::new(0, 4, 0, 4));
        roi.step(&blank(0, 0, false), false);
        roi.step(&pixel(0, 0, 9), true);
        roi.step(&blank(0, 0, false), true);
        assert_eq!(roi.result().sum, 9);
    }

    #[test]
    fn test_shift_scales_value() {
        let mut roi = RoiEngine::new(8, 4).unwrap().with_window(Window::new(0, 4, 0, 4));
        roi.step(&blank(0, 0, false), false);
        roi.step(&pixel(0, 0, 0x0123), false);
        roi.step(&pixel(1, 0, 0xFFFF), false);
        roi.step(&blank(0, 0, false), false);
        assert_eq!(roi.result().sum, 0x012 + 0xFFF);
    }

    #[test]
    fn test_channel_c_is_not_summed() {
        let mut roi = RoiEngine::new(8, 0).unwrap().with_window(Window::new(0, 4, 0, 4));
        let mut sample = pixel(0, 0, 1);
        sample.c = 0xFF;
        roi.step(&blank(0, 0, false), false);
        roi.step(&sample, false);
        roi.step(&blank(0, 0, false), false);
        assert_eq!(roi.result().sum, 1);
    }

    #[test]
    fn test_reset_keeps_window() {
        let window = Window::new(0, 2, 0, 2);
        let mut roi = RoiEngine::new(8, 0).unwrap().with_window(window);
        roi.step(&blank(0, 0, false), false);
        roi.step(&pixel(0, 0, 3), false);
        roi.step(&blank(0, 0, false), false);
        roi.reset();
        assert_eq!(roi.result(), RoiResult::default());
        assert_eq!(roi.window(), window);
    }
}

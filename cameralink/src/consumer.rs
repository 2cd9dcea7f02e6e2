/*!
Result consumer for the strobe/acknowledge handshake.

[`AckConsumer`] plays the control-plane side of every ROI engine: after each
clock it looks at the registered results, takes any sum whose strobe is
high, and holds that engine's acknowledge line high for exactly one cycle.
That is the fastest legal response, so no result is lost as long as frames
are separated by the minimum blanking.
*/

use crate::error::Result;
use crate::grabber::Grabber;
use crate::roi::Window;
use crate::wire::WireWord;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Idle cycles run after a stream so the last frame's results can strobe
pub const FLUSH_CYCLES: usize = 4;

/// One acknowledged ROI sum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Engine index inside the grabber
    pub engine: usize,
    /// Per-engine result counter, starting at 0
    pub sequence: u64,
    /// Clock cycle the strobe was observed on
    pub cycle: u64,
    pub window: Window,
    pub sum: u64,
}

impl Completion {
    /// Single-line JSON form
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Acknowledges every strobed result one cycle after it appears
#[derive(Debug, Clone, Default)]
pub struct AckConsumer {
    acking: Vec<bool>,
    sequence: Vec<u64>,
}

impl AckConsumer {
    pub fn new(engines: usize) -> Self {
        Self {
            acking: vec![false; engines],
            sequence: vec![0; engines],
        }
    }

    /// Results taken so far, per engine
    pub fn counts(&self) -> &[u64] {
        &self.sequence
    }

    /// Inspect the grabber after a tick and drive its acknowledge lines
    pub fn observe(&mut self, grabber: &mut Grabber) -> Result<Vec<Completion>> {
        if self.acking.len() < grabber.len() {
            self.acking.resize(grabber.len(), false);
            self.sequence.resize(grabber.len(), 0);
        }

        let mut completed = Vec::new();
        for index in 0..grabber.len() {
            if self.acking[index] {
                // The acknowledged cycle has run; release the line
                grabber.acknowledge(index, false)?;
                self.acking[index] = false;
                continue;
            }

            let result = grabber.result(index)?;
            if !result.strobe {
                continue;
            }

            let completion = Completion {
                engine: index,
                sequence: self.sequence[index],
                cycle: grabber.cycles(),
                window: grabber.engine(index)?.window(),
                sum: result.sum,
            };
            debug!(
                "ROI {} result #{}: sum {} at cycle {}",
                index, completion.sequence, completion.sum, completion.cycle
            );
            self.sequence[index] += 1;
            self.acking[index] = true;
            grabber.acknowledge(index, true)?;
            completed.push(completion);
        }
        Ok(completed)
    }

    /// Tick the grabber once and observe the results
    pub fn tick(&mut self, grabber: &mut Grabber, word: WireWord) -> Result<Vec<Completion>> {
        grabber.tick(word);
        self.observe(grabber)
    }

    /// Run a whole word stream, then flush with idle cycles
    pub fn drive<I>(&mut self, grabber: &mut Grabber, words: I) -> Result<Vec<Completion>>
    where
        I: IntoIterator<Item = WireWord>,
    {
        let mut completed = Vec::new();
        for word in words {
            completed.extend(self.tick(grabber, word)?);
        }
        completed.extend(self.flush(grabber)?);
        Ok(completed)
    }

    /// Run idle cycles so pending results strobe and get acknowledged
    pub fn flush(&mut self, grabber: &mut Grabber) -> Result<Vec<Completion>> {
        let mut completed = Vec::new();
        for _ in 0..FLUSH_CYCLES {
            completed.extend(self.tick(grabber, WireWord::IDLE)?);
        }
        Ok(completed)
    }
}

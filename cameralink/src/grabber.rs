/*!
Grabber: one stream parser feeding any number of ROI engines.

Every engine sees the same [`PixelSample`] each cycle and is configured and
acknowledged on its own. A [`Grabber::tick`] evaluates all components from
their registered state first and commits them together afterwards, so the
order in which engines are visited does not matter.
*/

use crate::error::{ClinkError, Result};
use crate::parser::{PixelSample, StreamParser};
use crate::register::Clocked;
use crate::roi::{MembershipRule, RoiEngine, RoiResult, Window};
use crate::wire::WireWord;
use tracing::debug;

/// Parser plus ROI engines driven by one clock
#[derive(Debug, Clone)]
pub struct Grabber {
    parser: StreamParser,
    engines: Vec<RoiEngine>,
    /// Acknowledge input line of each engine (level, held until changed)
    acknowledge: Vec<bool>,
    sample: PixelSample,
    cycles: u64,
}

impl Grabber {
    /// Create a grabber with `count` engines on `width`-bit coordinates.
    ///
    /// Engines start with an empty window and no shift.
    pub fn new(count: usize, width: u32) -> Result<Self> {
        let engines = (0..count)
            .map(|_| RoiEngine::new(width, 0))
            .collect::<Result<Vec<_>>>()?;
        Self::with_engines(width, engines)
    }

    /// Create a grabber from pre-built engines.
    ///
    /// Every engine must use the same coordinate width as the parser.
    pub fn with_engines(width: u32, engines: Vec<RoiEngine>) -> Result<Self> {
        let parser = StreamParser::new(width)?;
        if let Some((index, engine)) = engines.iter().enumerate().find(|(_, e)| e.width() != width) {
            return Err(ClinkError::config(format!(
                "ROI engine {} uses {}-bit coordinates, parser uses {}",
                index,
                engine.width(),
                width
            )));
        }
        debug!("Grabber with {} ROI engines, {}-bit coordinates", engines.len(), width);
        Ok(Self {
            parser,
            acknowledge: vec![false; engines.len()],
            engines,
            sample: PixelSample::default(),
            cycles: 0,
        })
    }

    /// Number of ROI engines
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Clock cycles run so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn parser(&self) -> &StreamParser {
        &self.parser
    }

    /// Sample produced by the most recent tick
    pub fn sample(&self) -> PixelSample {
        self.sample
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.engines.len() {
            return Err(ClinkError::EngineIndex {
                index,
                count: self.engines.len(),
            });
        }
        Ok(())
    }

    pub fn engine(&self, index: usize) -> Result<&RoiEngine> {
        self.check_index(index)?;
        Ok(&self.engines[index])
    }

    pub fn engines(&self) -> &[RoiEngine] {
        &self.engines
    }

    /// Set an engine's window; used from the next cycle on
    pub fn configure(&mut self, index: usize, window: Window) -> Result<()> {
        self.check_index(index)?;
        self.engines[index].set_window(window);
        Ok(())
    }

    pub fn set_rule(&mut self, index: usize, rule: MembershipRule) -> Result<()> {
        self.check_index(index)?;
        self.engines[index].set_rule(rule);
        Ok(())
    }

    /// Set an engine's pixel value shift
    pub fn set_shift(&mut self, index: usize, shift: u32) -> Result<()> {
        self.check_index(index)?;
        self.engines[index].set_shift(shift)
    }

    /// Drive an engine's acknowledge line
    pub fn acknowledge(&mut self, index: usize, level: bool) -> Result<()> {
        self.check_index(index)?;
        self.acknowledge[index] = level;
        Ok(())
    }

    /// Registered result of an engine
    pub fn result(&self, index: usize) -> Result<RoiResult> {
        Ok(self.engine(index)?.result())
    }

    /// Registered results of all engines
    pub fn results(&self) -> Vec<RoiResult> {
        self.engines.iter().map(RoiEngine::result).collect()
    }

    /// Run one clock cycle with `word` on the link
    pub fn tick(&mut self, word: WireWord) -> PixelSample {
        let sample = self.parser.evaluate(word);
        self.parser.stage(word);
        for (engine, &ack) in self.engines.iter_mut().zip(&self.acknowledge) {
            engine.stage(&sample, ack);
        }
        self.commit();

        self.sample = sample;
        self.cycles += 1;
        sample
    }

    /// Run one cycle per word, returning the strobed samples
    pub fn run<I>(&mut self, words: I) -> Vec<PixelSample>
    where
        I: IntoIterator<Item = WireWord>,
    {
        words
            .into_iter()
            .map(|word| self.tick(word))
            .filter(|sample| sample.strobe)
            .collect()
    }

    /// Return every component to the power-on state, keeping configuration
    pub fn reset(&mut self) {
        self.parser.reset();
        for engine in &mut self.engines {
            engine.reset();
        }
        self.acknowledge.iter_mut().for_each(|ack| *ack = false);
        self.sample = PixelSample::default();
        self.cycles = 0;
    }
}

impl Clocked for Grabber {
    fn commit(&mut self) {
        self.parser.commit();
        for engine in &mut self.engines {
            engine.commit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::AckConsumer;
    use crate::pattern::FrameGenerator;

    fn frame(nx: usize, ny: usize) -> Vec<Vec<u32>> {
        (0..ny)
            .map(|y| (0..nx).map(|x| (y * nx + x) as u32).collect())
            .collect()
    }

    /// Feed `words` then idle cycles until `index` strobes; acknowledge it
    /// and check the handshake clears.
    fn run_and_collect(grabber: &mut Grabber, words: Vec<WireWord>, index: usize) -> Option<u64> {
        grabber.run(words);
        for _ in 0..4 {
            if grabber.result(index).unwrap().strobe {
                break;
            }
            grabber.tick(WireWord::IDLE);
        }
        let result = grabber.result(index).unwrap();
        if !result.strobe {
            return None;
        }
        grabber.acknowledge(index, true).unwrap();
        grabber.tick(WireWord::IDLE);
        grabber.acknowledge(index, false).unwrap();
        grabber.tick(WireWord::IDLE);
        let cleared = grabber.result(index).unwrap();
        assert!(!cleared.strobe);
        assert_eq!(cleared.sum, 0);
        Some(result.sum)
    }

    fn expected_sum(data: &[Vec<u32>], window: Window) -> u64 {
        data.iter()
            .enumerate()
            .flat_map(|(y, row)| row.iter().enumerate().map(move |(x, &v)| (x, y, v)))
            .filter(|&(x, y, _)| window.contains(x as u32, y as u32))
            .map(|(_, _, v)| u64::from(v))
            .sum()
    }

    #[test]
    fn test_three_by_four_scenario() {
        let (nx, ny) = (3, 4);
        let data = frame(nx, ny);
        let words: Vec<_> = FrameGenerator::default().gen_frame(&data).collect();

        let mut grabber = Grabber::new(3, 12).unwrap();
        grabber.configure(1, Window::new(0, 1, 0, 3)).unwrap();
        grabber.configure(2, Window::new(0, 10, 0, 10)).unwrap();

        let samples = grabber.run(words);
        assert_eq!(samples.len(), nx * ny);
        for sample in &samples {
            assert_eq!(u32::from(sample.a), data[sample.y as usize][sample.x as usize]);
        }

        grabber.tick(WireWord::IDLE);
        grabber.tick(WireWord::IDLE);
        assert_eq!(grabber.result(1).unwrap(), RoiResult { sum: 9, strobe: true });
        assert_eq!(grabber.result(2).unwrap(), RoiResult { sum: 66, strobe: true });
        // Engine 0 keeps its empty default window
        assert!(!grabber.result(0).unwrap().strobe);
    }

    #[test]
    fn test_sums_match_reference_for_many_windows() {
        let (nx, ny) = (7, 5);
        let data = frame(nx, ny);
        let generator = FrameGenerator::default();
        let windows = [
            Window::new(0, 7, 0, 5),
            Window::new(2, 5, 1, 4),
            Window::new(6, 7, 4, 5),
            Window::new(3, 4, 0, 5),
            Window::new(0, 100, 2, 3),
        ];

        for rule in [MembershipRule::Latched, MembershipRule::Comparator] {
            for &window in &windows {
                let mut grabber = Grabber::new(1, 10).unwrap();
                grabber.configure(0, window).unwrap();
                grabber.set_rule(0, rule).unwrap();
                let words: Vec<_> = generator.gen_frame(&data).collect();
                let sum = run_and_collect(&mut grabber, words, 0);
                assert_eq!(sum, Some(expected_sum(&data, window)), "{:?} {}", rule, window);
            }
        }
    }

    #[test]
    fn test_lossless_shift() {
        // Values are multiples of 16, so a shift of 4 drops nothing
        let data: Vec<Vec<u32>> = (0..3)
            .map(|y| (0..4).map(|x| ((y * 4 + x) * 16) as u32).collect())
            .collect();
        let window = Window::new(1, 3, 0, 3);
        let engine = RoiEngine::new(10, 4).unwrap().with_window(window);
        let mut grabber = Grabber::with_engines(10, vec![engine]).unwrap();
        assert!(grabber.set_shift(0, 20).is_err());

        let words: Vec<_> = FrameGenerator::default().gen_frame(&data).collect();
        let sum = run_and_collect(&mut grabber, words, 0);
        assert_eq!(sum, Some(expected_sum(&data, window) >> 4));
    }

    #[test]
    fn test_empty_windows_never_strobe() {
        let data = frame(4, 4);
        let generator = FrameGenerator::default();
        let windows = [
            Window::new(2, 2, 0, 4),
            Window::new(3, 1, 0, 4),
            Window::new(0, 4, 3, 3),
            Window::new(0, 4, 3, 0),
            Window::new(10, 20, 0, 4),
        ];
        for rule in [MembershipRule::Latched, MembershipRule::Comparator] {
            let mut grabber = Grabber::new(windows.len(), 8).unwrap();
            for (i, &window) in windows.iter().enumerate() {
                grabber.configure(i, window).unwrap();
                grabber.set_rule(i, rule).unwrap();
            }
            for _ in 0..2 {
                for word in generator.gen_frame(&data) {
                    grabber.tick(word);
                    assert!(grabber.results().iter().all(|r| !r.strobe));
                }
            }
            for _ in 0..4 {
                grabber.tick(WireWord::IDLE);
                assert!(grabber.results().iter().all(|r| !r.strobe));
            }
        }
    }

    #[test]
    fn test_one_strobe_per_frame_with_prompt_acknowledge() {
        let data = frame(4, 3);
        let generator = FrameGenerator::default();
        let window = Window::new(1, 3, 1, 3);
        let mut grabber = Grabber::new(1, 8).unwrap();
        grabber.configure(0, window).unwrap();

        let mut sums = Vec::new();
        let words: Vec<_> = (0..3).flat_map(|_| generator.gen_frame(&data)).chain([WireWord::IDLE; 4]).collect();
        for word in words {
            grabber.tick(word);
            let result = grabber.result(0).unwrap();
            if result.strobe {
                sums.push(result.sum);
                grabber.acknowledge(0, true).unwrap();
            } else {
                grabber.acknowledge(0, false).unwrap();
            }
        }
        let expected = expected_sum(&data, window);
        assert_eq!(sums, vec![expected; 3]);
    }

    #[test]
    fn test_missed_acknowledge_merges_frames() {
        let data = frame(3, 2);
        let generator = FrameGenerator::default();
        let window = Window::new(0, 3, 0, 2);
        let mut grabber = Grabber::new(1, 8).unwrap();
        grabber.configure(0, window).unwrap();

        let words: Vec<_> = (0..2).flat_map(|_| generator.gen_frame(&data)).collect();
        grabber.run(words);
        grabber.tick(WireWord::IDLE);
        grabber.tick(WireWord::IDLE);
        let result = grabber.result(0).unwrap();
        assert!(result.strobe);
        assert_eq!(result.sum, 2 * expected_sum(&data, window));
    }

    #[test]
    fn test_engines_are_independent() {
        let data = frame(4, 4);
        let mut grabber = Grabber::new(2, 8).unwrap();
        grabber.configure(0, Window::new(0, 2, 0, 2)).unwrap();
        grabber.configure(1, Window::new(2, 4, 2, 4)).unwrap();

        grabber.run(FrameGenerator::default().gen_frame(&data).collect::<Vec<_>>());
        grabber.tick(WireWord::IDLE);
        grabber.tick(WireWord::IDLE);

        // Acknowledging one engine leaves the other pending
        grabber.acknowledge(0, true).unwrap();
        grabber.tick(WireWord::IDLE);
        assert!(!grabber.result(0).unwrap().strobe);
        let pending = grabber.result(1).unwrap();
        assert!(pending.strobe);
        assert_eq!(pending.sum, 10 + 11 + 14 + 15);
    }

    #[test]
    fn test_reconfiguration_between_frames() {
        let data = frame(4, 2);
        let words: Vec<_> = FrameGenerator::default().gen_frame(&data).collect();

        let mut sums = Vec::new();
        for rule in [MembershipRule::Comparator, MembershipRule::Latched] {
            let mut grabber = Grabber::new(1, 8).unwrap();
            grabber.set_rule(0, rule).unwrap();
            grabber.configure(0, Window::new(0, 1, 0, 1)).unwrap();
            assert_eq!(run_and_collect(&mut grabber, words.clone(), 0), Some(0));

            grabber.configure(0, Window::new(3, 4, 1, 2)).unwrap();
            sums.push(run_and_collect(&mut grabber, words.clone(), 0));
        }
        // Only (3, 1) is inside the new window under either rule
        assert_eq!(sums, vec![Some(7), Some(7)]);
    }

    #[test]
    fn test_windows_past_frame_edge_over_several_frames() {
        let (nx, ny) = (3, 4);
        let data = frame(nx, ny);
        let generator = FrameGenerator::default();
        let windows = [
            Window::new(1, 10, 0, 10),
            Window::new(0, 10, 2, 10),
            Window::new(1, 10, 2, 10),
            Window::new(2, 3, 1, 10),
            Window::new(1, 2, 3, 4),
        ];
        let frames = 3;

        for rule in [MembershipRule::Latched, MembershipRule::Comparator] {
            let mut grabber = Grabber::new(windows.len(), 12).unwrap();
            for (i, &window) in windows.iter().enumerate() {
                grabber.configure(i, window).unwrap();
                grabber.set_rule(i, rule).unwrap();
            }

            let words: Vec<_> = (0..frames).flat_map(|_| generator.gen_frame(&data)).collect();
            let completed = AckConsumer::new(windows.len()).drive(&mut grabber, words).unwrap();

            for (i, &window) in windows.iter().enumerate() {
                let sums: Vec<_> = completed.iter().filter(|c| c.engine == i).map(|c| c.sum).collect();
                assert_eq!(sums, vec![expected_sum(&data, window); frames], "{:?} {}", rule, window);
            }
        }
        // 3x4 ramp without column 0
        assert_eq!(expected_sum(&data, windows[0]), 48);
        assert_eq!(expected_sum(&data, windows[1]), 51);
    }

    #[test]
    fn test_rejects_mismatched_engine_width() {
        let engines = vec![RoiEngine::new(12, 0).unwrap(), RoiEngine::new(10, 0).unwrap()];
        let err = Grabber::with_engines(12, engines).unwrap_err();
        assert!(matches!(err, ClinkError::Config(_)));
        assert!(err.to_string().contains("engine 1"));
    }

    #[test]
    fn test_bad_index() {
        let mut grabber = Grabber::new(2, 8).unwrap();
        assert!(matches!(
            grabber.configure(2, Window::default()),
            Err(ClinkError::EngineIndex { index: 2, count: 2 })
        ));
        assert!(grabber.acknowledge(5, true).is_err());
        assert!(grabber.result(2).is_err());
    }

    #[test]
    fn test_reset() {
        let data = frame(2, 2);
        let mut grabber = Grabber::new(1, 8).unwrap();
        grabber.configure(0, Window::new(0, 2, 0, 2)).unwrap();
        grabber.run(FrameGenerator::default().gen_frame(&data).collect::<Vec<_>>());
        assert!(grabber.cycles() > 0);
        grabber.reset();
        assert_eq!(grabber.cycles(), 0);
        assert_eq!(grabber.result(0).unwrap(), RoiResult::default());
        assert_eq!(grabber.engine(0).unwrap().window(), Window::new(0, 2, 0, 2));
    }
}

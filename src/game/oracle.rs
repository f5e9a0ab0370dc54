use crate::core::input::Lane;
use crate::game::difficulty::Difficulty;
use crate::game::note::Note;

/// Snapshot of the authoritative music clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MusicClock {
    pub position_s: f32,
    pub bpm: f32,
    pub loop_length_s: f32,
}

impl MusicClock {
    #[inline(always)]
    pub fn seconds_per_beat(&self) -> f32 {
        60.0 / self.bpm
    }

    /// Seconds until playback next reaches `time_s`, in `[0, loop_length_s)`.
    ///
    /// Times already behind the playhead wrap to the next pass of the loop.
    #[inline(always)]
    pub fn seconds_until(&self, time_s: f32) -> f32 {
        let delta = time_s - self.position_s;
        if self.loop_length_s > 0.0 {
            delta.rem_euclid(self.loop_length_s)
        } else {
            delta.max(0.0)
        }
    }

    /// Signed distance from the playhead to `time_s`, taking the shorter way
    /// around the loop. Negative means `time_s` is behind.
    #[inline(always)]
    pub fn signed_offset(&self, time_s: f32) -> f32 {
        let delta = time_s - self.position_s;
        if self.loop_length_s > 0.0 {
            delta - self.loop_length_s * (delta / self.loop_length_s).round()
        } else {
            delta
        }
    }
}

/// The chart and clock owner the battle layer queries. Notes returned here
/// are owned by the oracle; the battle layer only compares them.
pub trait ChartOracle {
    fn clock(&self) -> MusicClock;

    /// Notes for the next `measures` measures, non-empty, in arrival order.
    fn chart_slice(&mut self, measures: u32, instrument: u32, difficulty: Difficulty) -> Vec<Note>;

    /// Notes the given held-lane combination could hit right now.
    fn hittable_notes(&self, instrument: u32, difficulty: Difficulty, held: &[Lane]) -> Vec<Note>;

    /// Notes that scrolled past the target line during the last `elapsed_s`.
    fn passed_notes(&mut self, instrument: u32, difficulty: Difficulty, elapsed_s: f32) -> Vec<Note>;
}

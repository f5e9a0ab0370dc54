use crate::core::events::{BeatInfo, Message};

/// Turns elapsed music time into beat-window events.
///
/// For beat `b` the window opens at `b * spb - window_s`, the beat center is
/// at `b * spb` and the window closes at `b * spb + window_s`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Metronome {
    bpm: f32,
    beats_per_measure: u32,
    window_s: f64,
    time_s: f64,
}

impl Metronome {
    pub fn new(bpm: f32, beats_per_measure: u32, window_s: f32) -> Self {
        debug_assert!(bpm > 0.0 && beats_per_measure > 0, "invalid tempo");
        let spb = 60.0 / f64::from(bpm);
        Self {
            bpm,
            beats_per_measure,
            window_s: f64::from(window_s).clamp(0.0, spb / 2.0),
            time_s: 0.0,
        }
    }

    #[inline(always)]
    fn seconds_per_beat(&self) -> f64 {
        60.0 / f64::from(self.bpm)
    }

    fn beat_info(&self, beat: i64) -> BeatInfo {
        BeatInfo {
            beat: beat.rem_euclid(i64::from(self.beats_per_measure)) as u32,
            beats_per_measure: self.beats_per_measure,
            bpm: self.bpm,
        }
    }

    /// Events whose time falls in `(t, t + dt]`, in time order.
    pub fn advance(&mut self, dt: f32) -> Vec<Message> {
        let t0 = self.time_s;
        let t1 = t0 + f64::from(dt);
        self.time_s = t1;
        if dt <= 0.0 {
            return Vec::new();
        }

        let spb = self.seconds_per_beat();
        let first = ((t0 - self.window_s) / spb).floor() as i64;
        let last = ((t1 + self.window_s) / spb).ceil() as i64;

        let mut events: Vec<(f64, u8, Message)> = Vec::new();
        for b in first.max(0)..=last {
            let center = b as f64 * spb;
            let info = self.beat_info(b);
            let marks = [
                (center - self.window_s, 0, Message::EnterBeatWindow(info)),
                (center, 1, Message::BeatCenter(info)),
                (center + self.window_s, 2, Message::ExitBeatWindow(info)),
            ];
            for (at, order, msg) in marks {
                if at > t0 && at <= t1 {
                    events.push((at, order, msg));
                }
            }
        }
        events.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        events.into_iter().map(|(_, _, msg)| msg).collect()
    }
}

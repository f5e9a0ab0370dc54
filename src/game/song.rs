//! Looping in-memory chart used as the music oracle by the demo and tests.

use std::cmp::Ordering;

use log::debug;
use rustc_hash::FxHashMap;

use crate::core::input::Lane;
use crate::game::difficulty::Difficulty;
use crate::game::note::Note;
use crate::game::oracle::{ChartOracle, MusicClock};

pub const DEFAULT_HIT_WINDOW_S: f32 = 0.1;

#[derive(Clone, Debug)]
pub struct Song {
    bpm: f32,
    beats_per_measure: u32,
    loop_measures: u32,
    position_s: f32,
    hit_window_s: f32,
    charts: FxHashMap<(u32, Difficulty), Vec<Note>>,
}

impl Song {
    pub fn new(bpm: f32, beats_per_measure: u32, loop_measures: u32) -> Self {
        debug_assert!(bpm > 0.0, "bpm must be positive");
        debug_assert!(beats_per_measure > 0 && loop_measures > 0, "empty loop");
        Self {
            bpm,
            beats_per_measure,
            loop_measures,
            position_s: 0.0,
            hit_window_s: DEFAULT_HIT_WINDOW_S,
            charts: FxHashMap::default(),
        }
    }

    pub fn with_hit_window(mut self, seconds: f32) -> Self {
        self.hit_window_s = seconds;
        self
    }

    #[inline(always)]
    pub const fn bpm(&self) -> f32 {
        self.bpm
    }

    #[inline(always)]
    pub const fn beats_per_measure(&self) -> u32 {
        self.beats_per_measure
    }

    #[inline(always)]
    pub fn loop_beats(&self) -> f32 {
        (self.beats_per_measure * self.loop_measures) as f32
    }

    #[inline(always)]
    pub fn loop_length_s(&self) -> f32 {
        self.loop_beats() * 60.0 / self.bpm
    }

    #[inline(always)]
    pub const fn position_s(&self) -> f32 {
        self.position_s
    }

    /// Replaces a chart. Notes outside the loop are dropped; the rest are
    /// kept in beat order.
    pub fn set_chart(&mut self, instrument: u32, difficulty: Difficulty, mut notes: Vec<Note>) {
        let loop_beats = self.loop_beats();
        let before = notes.len();
        notes.retain(|n| n.beat >= 0.0 && n.beat < loop_beats);
        if notes.len() != before {
            debug!(
                "Dropped {} notes outside the {loop_beats}-beat loop (instrument {instrument})",
                before - notes.len()
            );
        }
        notes.sort_by(|a, b| a.beat.partial_cmp(&b.beat).unwrap_or(Ordering::Equal));
        self.charts.insert((instrument, difficulty), notes);
    }

    pub fn advance(&mut self, dt: f32) {
        self.seek(self.position_s + dt);
    }

    pub fn seek(&mut self, position_s: f32) {
        let len = self.loop_length_s();
        self.position_s = if len > 0.0 { position_s.rem_euclid(len) } else { 0.0 };
    }

    fn chart(&self, instrument: u32, difficulty: Difficulty) -> &[Note] {
        self.charts
            .get(&(instrument, difficulty))
            .map(Vec::as_slice).unwrap_or_default()
    }
}

impl ChartOracle for Song {
    fn clock(&self) -> MusicClock {
        MusicClock {
            position_s: self.position_s,
            bpm: self.bpm,
            loop_length_s: self.loop_length_s(),
        }
    }

    /// Notes still inside their late hit window belong to the pass that is
    /// ending; they are left out so judgment and the falling object always
    /// refer to the same occurrence.
    fn chart_slice(&mut self, measures: u32, instrument: u32, difficulty: Difficulty) -> Vec<Note> {
        let clock = self.clock();
        let span_s = (measures * self.beats_per_measure) as f32 * clock.seconds_per_beat();
        let mut slice: Vec<(f32, Note)> = self
            .chart(instrument, difficulty)
            .iter()
            .filter(|n| {
                let offset = clock.signed_offset(n.time_seconds(clock.bpm));
                !(-self.hit_window_s..0.0).contains(&offset)
            })
            .map(|n| (clock.seconds_until(n.time_seconds(clock.bpm)), *n))
            .filter(|(until, _)| *until < span_s)
            .collect();
        slice.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        slice.into_iter().map(|(_, n)| n).collect()
    }

    /// A single note is playable when its lane is the highest held fret.
    /// Lower frets may stay held as anchors.
    fn hittable_notes(&self, instrument: u32, difficulty: Difficulty, held: &[Lane]) -> Vec<Note> {
        let Some(anchor) = held.iter().copied().max() else {
            return Vec::new();
        };
        let clock = self.clock();
        self.chart(instrument, difficulty)
            .iter()
            .filter(|n| n.lane == anchor)
            .filter(|n| clock.signed_offset(n.time_seconds(clock.bpm)).abs() <= self.hit_window_s)
            .copied()
            .collect()
    }

    fn passed_notes(&mut self, instrument: u32, difficulty: Difficulty, elapsed_s: f32) -> Vec<Note> {
        if elapsed_s <= 0.0 {
            return Vec::new();
        }
        let clock = self.clock();
        let len = clock.loop_length_s;
        self.chart(instrument, difficulty)
            .iter()
            .filter(|n| {
                let deadline = n.time_seconds(clock.bpm) + self.hit_window_s;
                (clock.position_s - deadline).rem_euclid(len) < elapsed_s
            })
            .copied()
            .collect()
    }
}

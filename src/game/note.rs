use bitflags::bitflags;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::core::input::Lane;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NoteFlags: u8 {
        /// Hammer-on / pull-off: may be hit by a fret press or release alone.
        const QUICK_TRIGGER = 1 << 0;
    }
}

/// One chart note. Equality is (lane, beat, flags).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Note {
    pub lane: Lane,
    pub beat: f32,
    pub flags: NoteFlags,
}

impl Note {
    pub const fn new(lane: Lane, beat: f32) -> Self {
        Self {
            lane,
            beat,
            flags: NoteFlags::empty(),
        }
    }

    pub const fn quick_trigger(lane: Lane, beat: f32) -> Self {
        Self {
            lane,
            beat,
            flags: NoteFlags::QUICK_TRIGGER,
        }
    }

    #[inline(always)]
    pub const fn is_quick_trigger(&self) -> bool {
        self.flags.contains(NoteFlags::QUICK_TRIGGER)
    }

    #[inline(always)]
    pub fn time_seconds(&self, bpm: f32) -> f32 {
        self.beat * 60.0 / bpm
    }

    #[inline(always)]
    pub fn key(&self) -> NoteKey {
        // -0.0 and 0.0 compare equal, so they must hash equal too.
        let beat_bits = if self.beat == 0.0 { 0 } else { self.beat.to_bits() };
        NoteKey {
            lane: self.lane,
            beat_bits,
            flags: self.flags,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NoteKey {
    lane: Lane,
    beat_bits: u32,
    flags: NoteFlags,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(i8)]
pub enum NoteState {
    #[default]
    Pending = 0,
    Hit = 1,
    Missed = -1,
}

impl NoteState {
    #[inline(always)]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Resolves a pending note. Any other transition is a programming error.
    #[inline(always)]
    pub fn resolve(&mut self, to: Self) {
        assert!(
            self.is_pending() && !to.is_pending(),
            "illegal note state transition {:?} -> {:?}",
            *self,
            to
        );
        *self = to;
    }
}

/// Chart positions keyed by note identity, each list in chart order.
#[derive(Clone, Debug, Default)]
pub struct ChartIndex {
    positions: FxHashMap<NoteKey, SmallVec<[usize; 2]>>,
}

impl ChartIndex {
    pub fn build(notes: &[Note]) -> Self {
        let mut positions: FxHashMap<NoteKey, SmallVec<[usize; 2]>> = FxHashMap::default();
        for (i, note) in notes.iter().enumerate() {
            positions.entry(note.key()).or_default().push(i);
        }
        Self { positions }
    }

    #[inline(always)]
    pub fn positions(&self, note: &Note) -> &[usize] {
        self.positions.get(&note.key()).map(|p| p.as_slice()).unwrap_or_default()
    }
}

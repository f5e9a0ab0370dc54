use rustc_hash::FxHashMap;
use serde::Serialize;
use smallvec::SmallVec;

pub const NUM_LANES: usize = 5;

/// Colored fret buttons, ordered low to high along the neck.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(u8)]
pub enum Lane {
    Green = 0,
    Red = 1,
    Yellow = 2,
    Blue = 3,
    Orange = 4,
}

impl Lane {
    pub const ALL: [Self; NUM_LANES] = [Self::Green, Self::Red, Self::Yellow, Self::Blue, Self::Orange];

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PadDir {
    Up,
    Down,
    Left,
    Right,
}

impl PadDir {
    /// Grid offset (x, y) for a one-cell move, y pointing up.
    #[inline(always)]
    pub const fn grid_offset(self) -> (i32, i32) {
        match self {
            Self::Left => (-1, 0),
            Self::Up => (0, 1),
            Self::Down => (0, -1),
            Self::Right => (1, 0),
        }
    }
}

/// Abstract controller buttons. Device mapping happens upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Button {
    Fret(Lane),
    Strum,
    Dir(PadDir),
    Tilt,
    Plus,
    Minus,
}

impl Button {
    #[inline(always)]
    pub const fn lane(self) -> Option<Lane> {
        match self {
            Self::Fret(lane) => Some(lane),
            _ => None,
        }
    }
}

pub type HeldLanes = SmallVec<[Lane; NUM_LANES]>;

/// Currently pressed frets per player, oldest press first.
///
/// A lane appears at most once; pressing an already-held lane moves it to
/// the back so `most_recent` always reflects the latest press.
#[derive(Clone, Debug, Default)]
pub struct HeldInputs {
    players: FxHashMap<usize, HeldLanes>,
}

impl HeldInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, player: usize, lane: Lane) {
        let held = self.players.entry(player).or_default();
        held.retain(|l| *l != lane);
        held.push(lane);
    }

    pub fn release(&mut self, player: usize, lane: Lane) {
        if let Some(held) = self.players.get_mut(&player) {
            held.retain(|l| *l != lane);
        }
    }

    #[inline(always)]
    pub fn lanes(&self, player: usize) -> &[Lane] {
        self.players.get(&player).map(|held| held.as_slice()).unwrap_or_default()
    }

    #[inline(always)]
    pub fn most_recent(&self, player: usize) -> Option<Lane> {
        self.lanes(player).last().copied()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }
}

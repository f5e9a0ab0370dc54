//! Falling note objects, target markers and battle sprites in screen space.
//!
//! Coordinates are in pixels with y pointing up; notes fall from above the
//! target line towards `destroy_y`.

use log::{debug, trace};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::core::events::UnitRef;
use crate::core::input::{Lane, NUM_LANES};
use crate::game::difficulty::Difficulty;
use crate::game::note::Note;

pub type Rgba = [f32; 4];

const DIVIDER_COLOR: Rgba = [1.0, 1.0, 1.0, 0.6];

#[inline(always)]
pub const fn lane_color(lane: Lane) -> Rgba {
    match lane {
        Lane::Green => [0.0, 1.0, 0.0, 1.0],
        Lane::Red => [1.0, 0.0, 0.0, 1.0],
        Lane::Yellow => [1.0, 1.0, 0.0, 1.0],
        Lane::Blue => [0.0, 0.0, 1.0, 1.0],
        Lane::Orange => [1.0, 0.5, 0.0, 1.0],
    }
}

/// Fall speed in pixels per second, linear in the difficulty tier.
#[inline(always)]
pub fn fall_speed(difficulty: Difficulty, min: f32, max: f32) -> f32 {
    (max - min).mul_add(difficulty.fraction(), min)
}

/// Screen split into two lane bands, one per combatant, lower player number
/// on the left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BattleLayout {
    pub width: f32,
    pub height: f32,
    pub target_line_y: f32,
    pub destroy_y: f32,
}

impl BattleLayout {
    pub const fn new(width: f32, height: f32, target_line_y: f32, destroy_y: f32) -> Self {
        Self {
            width,
            height,
            target_line_y,
            destroy_y,
        }
    }

    #[inline(always)]
    fn center_margin(&self) -> f32 {
        self.width * 2.0 / 27.0
    }

    #[inline(always)]
    fn unit_margin(&self) -> f32 {
        self.width * 3.5 / 27.0
    }

    #[inline(always)]
    fn fret_range(&self) -> f32 {
        self.width / 3.0
    }

    /// Left edge of a band. Bands never overlap.
    #[inline(always)]
    pub fn band_origin(&self, band: usize) -> f32 {
        let fret_range = self.fret_range();
        self.unit_margin() - fret_range / 10.0 + band as f32 * (fret_range + self.center_margin())
    }

    #[inline(always)]
    pub fn band_width(&self) -> f32 {
        self.fret_range() + self.fret_range() / 5.0
    }

    #[inline(always)]
    pub fn lane_x(&self, band: usize, lane: Lane) -> f32 {
        self.band_origin(band) + (lane.index() + 1) as f32 * self.fret_range() / 5.0
    }

    /// Where a note must start so it crosses the target line after
    /// `arrival_s` seconds at `speed`.
    #[inline(always)]
    pub fn spawn_position(&self, band: usize, lane: Lane, speed: f32, arrival_s: f32) -> [f32; 2] {
        [self.lane_x(band, lane), speed.mul_add(arrival_s, self.target_line_y)]
    }

    pub fn target_positions(&self) -> [[f32; 2]; 2 * NUM_LANES] {
        let mut out = [[0.0; 2]; 2 * NUM_LANES];
        for band in 0..2 {
            for lane in Lane::ALL {
                out[band * NUM_LANES + lane.index()] = [self.lane_x(band, lane), self.target_line_y];
            }
        }
        out
    }

    /// Sprite anchor and facing (degrees) for each band.
    pub fn sprite_positions(&self) -> [([f32; 2], f32); 2] {
        let margin = self.unit_margin() / 2.0;
        let mid_y = self.height / 2.0;
        [([margin, mid_y], 0.0), ([self.width - margin, mid_y], 180.0)]
    }

    #[inline(always)]
    pub fn divider_x(&self) -> f32 {
        self.width / 2.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteObject {
    pub player: usize,
    pub chart_index: usize,
    pub note: Note,
    pub position: [f32; 2],
    /// Vertical velocity in pixels per second; negative while falling.
    pub velocity: f32,
    pub color: Rgba,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetMarker {
    pub position: [f32; 2],
    pub color: Rgba,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BattleSprite {
    pub unit: UnitRef,
    pub position: [f32; 2],
    pub rotation_deg: f32,
}

#[derive(Clone, Debug, Default)]
pub struct Stage {
    pub target_line_visible: bool,
    pub divider_visible: bool,
    pub divider_color: Rgba,
    pub targets: Vec<TargetMarker>,
    pub sprites: SmallVec<[BattleSprite; 2]>,
}

/// Live falling notes keyed by `(player, chart_index)`.
#[derive(Clone, Debug, Default)]
pub struct NoteField {
    objects: FxHashMap<(usize, usize), NoteObject>,
    stage: Stage,
}

impl NoteField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, object: NoteObject) {
        trace!(
            "spawn note p{} #{} {:?} at {:?} v={}",
            object.player, object.chart_index, object.note.lane, object.position, object.velocity
        );
        self.objects.insert((object.player, object.chart_index), object);
    }

    /// Removes a note object. Missing objects are ignored.
    pub fn destroy(&mut self, player: usize, chart_index: usize) -> bool {
        self.objects.remove(&(player, chart_index)).is_some()
    }

    /// Moves every object and culls those that fell below `destroy_y`.
    pub fn advance(&mut self, dt: f32, destroy_y: f32) -> usize {
        let before = self.objects.len();
        self.objects.retain(|_, obj| {
            obj.position[1] += obj.velocity * dt;
            obj.position[1] >= destroy_y
        });
        before - self.objects.len()
    }

    #[inline(always)]
    pub fn get(&self, player: usize, chart_index: usize) -> Option<&NoteObject> {
        self.objects.get(&(player, chart_index))
    }

    #[inline(always)]
    pub fn live_count(&self) -> usize {
        self.objects.len()
    }

    pub fn clear(&mut self) -> usize {
        let n = self.objects.len();
        self.objects.clear();
        n
    }

    #[inline(always)]
    pub const fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Lays out the ten target markers and the two sprites, and shows the
    /// target line and divider. `bands` lists units left to right.
    pub fn show_stage(&mut self, layout: &BattleLayout, bands: [UnitRef; 2]) {
        self.stage.targets = layout
            .target_positions()
            .iter()
            .enumerate()
            .map(|(i, &position)| TargetMarker {
                position,
                color: lane_color(Lane::ALL[i % NUM_LANES]),
            })
            .collect();
        self.stage.sprites = layout
            .sprite_positions()
            .iter()
            .zip(bands)
            .map(|(&(position, rotation_deg), unit)| BattleSprite {
                unit,
                position,
                rotation_deg,
            })
            .collect();
        self.stage.divider_color = DIVIDER_COLOR;
        self.stage.target_line_visible = true;
        self.stage.divider_visible = true;
        debug!("Battle stage shown (divider at x={})", layout.divider_x());
    }

    pub fn hide_stage(&mut self) {
        self.stage.sprites.clear();
        self.stage.target_line_visible = false;
        self.stage.divider_visible = false;
    }
}

#[cfg(test)]
mod tests {
    use super::{BattleLayout, NoteField, NoteObject, fall_speed, lane_color};
    use crate::core::events::UnitRef;
    use crate::core::input::Lane;
    use crate::game::difficulty::Difficulty;
    use crate::game::note::Note;

    const LAYOUT: BattleLayout = BattleLayout::new(1620.0, 900.0, 120.0, -60.0);

    fn unit(player: usize) -> UnitRef {
        UnitRef {
            player,
            unit: 1,
            color: Lane::Red,
        }
    }

    #[test]
    fn speed_scales_linearly_with_tier() {
        assert!((fall_speed(Difficulty::EASY, 240.0, 400.0) - 240.0).abs() < 1e-3);
        assert!((fall_speed(Difficulty::MEDIUM, 240.0, 400.0) - 320.0).abs() < 1e-3);
        assert!((fall_speed(Difficulty::HARD, 240.0, 400.0) - 400.0).abs() < 1e-3);
    }

    #[test]
    fn bands_are_disjoint_and_lanes_ascend() {
        let left_end = LAYOUT.band_origin(0) + LAYOUT.band_width();
        assert!(left_end <= LAYOUT.band_origin(1), "bands overlap");
        for band in 0..2 {
            let xs: Vec<f32> = Lane::ALL.iter().map(|&l| LAYOUT.lane_x(band, l)).collect();
            assert!(xs.windows(2).all(|w| w[0] < w[1]));
        }
        let targets = LAYOUT.target_positions();
        assert!((targets[0][0] - (LAYOUT.width * 3.5 / 27.0 + LAYOUT.width / 30.0)).abs() < 1e-3);
        assert!((targets[5][0] - LAYOUT.lane_x(1, Lane::Green)).abs() < 1e-3);
    }

    #[test]
    fn a_spawned_note_reaches_the_target_line_on_time() {
        let speed = fall_speed(Difficulty::MEDIUM, 240.0, 400.0);
        let arrival = 1.25;
        let mut field = NoteField::new();
        field.spawn(NoteObject {
            player: 0,
            chart_index: 3,
            note: Note::new(Lane::Blue, 2.5),
            position: LAYOUT.spawn_position(0, Lane::Blue, speed, arrival),
            velocity: -speed,
            color: lane_color(Lane::Blue),
        });
        for _ in 0..5 {
            field.advance(arrival / 5.0, LAYOUT.destroy_y);
        }
        let obj = field.get(0, 3).expect("note still alive at the target line");
        assert!((obj.position[1] - LAYOUT.target_line_y).abs() < 1e-2, "y = {}", obj.position[1]);

        field.advance(1.0, LAYOUT.destroy_y);
        assert_eq!(field.live_count(), 0, "notes below the destroy line are culled");
        assert!(!field.destroy(0, 3), "destroying a missing object is a no-op");
    }

    #[test]
    fn stage_places_the_lower_player_on_the_left() {
        let mut field = NoteField::new();
        field.show_stage(&LAYOUT, [unit(0), unit(1)]);
        let stage = field.stage();
        assert_eq!(stage.targets.len(), 10);
        assert_eq!(stage.sprites[0].unit.player, 0);
        assert!(stage.sprites[0].position[0] < stage.sprites[1].position[0]);
        assert!((stage.sprites[1].rotation_deg - 180.0).abs() < 1e-6);
        assert!(stage.target_line_visible && stage.divider_visible);

        field.hide_stage();
        assert!(field.stage().sprites.is_empty());
        assert!(!field.stage().target_line_visible);
    }
}

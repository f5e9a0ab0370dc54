//! One rhythm battle from EnterBattle to ExitBattle.
//!
//! The manager owns every registered combatant's battle data and the note
//! field. A battle starts on `EnterBattle`, sweeps misses every tick, counts
//! measures on beat-window exits and arms a short grace timer once the
//! configured number of measures has played. When the timer runs out the
//! field is torn down and exactly one `ExitBattle` is raised.

use log::{debug, info, trace, warn};
use rustc_hash::FxHashMap;

use crate::config::Config;
use crate::core::events::{BeatInfo, Message, MessageRouter, UnitRef};
use crate::core::input::{Button, HeldInputs, Lane};
use crate::game::difficulty::Difficulty;
use crate::game::matcher::{HitAttempt, try_hit_note};
use crate::game::note::{ChartIndex, Note, NoteState};
use crate::game::note_field::{BattleLayout, NoteField, NoteObject, fall_speed, lane_color};
use crate::game::oracle::ChartOracle;
use crate::game::score::BattleOutcome;

#[derive(Clone, Debug)]
pub struct CombatantBattleData {
    pub player: usize,
    pub instrument: u32,
    /// Current selection; may change mid-battle.
    pub difficulty: Difficulty,
    /// Tier the running slice was fetched with.
    pub battle_difficulty: Difficulty,
    pub notes: Vec<Note>,
    /// Index-aligned with `notes`.
    pub states: Vec<NoteState>,
    pub index: ChartIndex,
    pub hit_last_note: bool,
    pub unit: Option<UnitRef>,
}

impl CombatantBattleData {
    pub fn new(player: usize, instrument: u32, difficulty: Difficulty) -> Self {
        Self {
            player,
            instrument,
            difficulty,
            battle_difficulty: difficulty,
            notes: Vec::new(),
            states: Vec::new(),
            index: ChartIndex::default(),
            hit_last_note: false,
            unit: None,
        }
    }

    /// Loads a fresh slice with every note pending.
    pub fn begin(&mut self, unit: Option<UnitRef>, notes: Vec<Note>) {
        self.unit = unit;
        self.battle_difficulty = self.difficulty;
        self.index = ChartIndex::build(&notes);
        self.states = vec![NoteState::Pending; notes.len()];
        self.notes = notes;
        self.hit_last_note = false;
        self.assert_aligned();
    }

    #[inline(always)]
    pub fn assert_aligned(&self) {
        assert_eq!(
            self.notes.len(),
            self.states.len(),
            "player {} note states out of step with the chart slice",
            self.player
        );
    }

    /// Marks the first pending position of `note` as missed.
    fn sweep(&mut self, note: &Note) -> Option<usize> {
        let i = self
            .index
            .positions(note)
            .iter()
            .copied()
            .find(|&i| self.states[i].is_pending())?;
        self.states[i].resolve(NoteState::Missed);
        self.hit_last_note = false;
        Some(i)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BattleSettings {
    pub measures: u32,
    pub end_grace_beats: f32,
    pub velocity_min: f32,
    pub velocity_max: f32,
    pub layout: BattleLayout,
}

impl BattleSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            measures: cfg.battle_measures,
            end_grace_beats: cfg.end_grace_beats,
            velocity_min: cfg.velocity_min,
            velocity_max: cfg.velocity_max,
            layout: BattleLayout::new(
                cfg.display_width as f32,
                cfg.display_height as f32,
                cfg.target_line_y,
                cfg.destroy_y,
            ),
        }
    }
}

impl Default for BattleSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Countdown checked once per tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EndTimer {
    remaining_s: f32,
}

impl EndTimer {
    pub const fn new(seconds: f32) -> Self {
        Self {
            remaining_s: seconds,
        }
    }

    /// Returns true once the countdown has run out.
    #[inline(always)]
    pub fn tick(&mut self, dt: f32) -> bool {
        self.remaining_s -= dt;
        self.remaining_s <= 0.0
    }
}

#[derive(Clone, Copy, Debug)]
struct ActiveBattle {
    attacker: UnitRef,
    defender: UnitRef,
    measures_played: u32,
    end_timer: Option<EndTimer>,
}

impl ActiveBattle {
    #[inline(always)]
    const fn involves(&self, player: usize) -> bool {
        self.attacker.player == player || self.defender.player == player
    }
}

#[derive(Clone, Debug, Default)]
pub struct BattleManager {
    settings: BattleSettings,
    combatants: FxHashMap<usize, CombatantBattleData>,
    field: NoteField,
    active: Option<ActiveBattle>,
}

impl BattleManager {
    pub fn new(settings: BattleSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    #[inline(always)]
    pub const fn settings(&self) -> &BattleSettings {
        &self.settings
    }

    /// Registers a player, or updates instrument and difficulty if known.
    pub fn register_player(&mut self, player: usize, instrument: u32, difficulty: Difficulty) {
        let data = self
            .combatants
            .entry(player)
            .or_insert_with(|| CombatantBattleData::new(player, instrument, difficulty));
        data.instrument = instrument;
        data.difficulty = difficulty;
        debug!("Registered player {player} (instrument {instrument}, {difficulty:?})");
    }

    pub fn set_player_instrument(&mut self, player: usize, instrument: u32) {
        let Some(data) = self.combatants.get_mut(&player) else {
            panic!("player {player} is not registered");
        };
        data.instrument = instrument;
    }

    #[inline(always)]
    pub fn player_difficulty(&self, player: usize) -> Option<Difficulty> {
        self.combatants.get(&player).map(|c| c.difficulty)
    }

    #[inline(always)]
    pub fn combatant(&self, player: usize) -> Option<&CombatantBattleData> {
        self.combatants.get(&player)
    }

    #[inline(always)]
    pub const fn is_in_battle(&self) -> bool {
        self.active.is_some()
    }

    #[inline(always)]
    pub const fn field(&self) -> &NoteField {
        &self.field
    }

    #[inline(always)]
    pub fn end_pending(&self) -> bool {
        self.active.is_some_and(|b| b.end_timer.is_some())
    }

    pub fn start_battle<O: ChartOracle + ?Sized>(
        &mut self,
        attacker: UnitRef,
        defender: UnitRef,
        oracle: &mut O,
    ) {
        debug_assert!(
            self.combatants.contains_key(&attacker.player)
                && self.combatants.contains_key(&defender.player),
            "both combatants must be registered before a battle"
        );
        debug_assert_ne!(attacker.player, defender.player, "a player cannot fight itself");
        if self.active.is_some() {
            warn!("EnterBattle while a battle is running; ignoring");
            return;
        }

        let clock = oracle.clock();
        let layout = self.settings.layout;
        let (left, right) = if attacker.player < defender.player {
            (attacker, defender)
        } else {
            (defender, attacker)
        };

        for (band, unit) in [left, right].into_iter().enumerate() {
            let Some(data) = self.combatants.get_mut(&unit.player) else {
                warn!("Player {} is not registered; no chart for this battle", unit.player);
                continue;
            };
            let notes = oracle.chart_slice(self.settings.measures, data.instrument, data.difficulty);
            debug_assert!(!notes.is_empty(), "chart slice for player {} is empty", unit.player);
            data.begin(Some(unit), notes);

            let speed = fall_speed(
                data.battle_difficulty,
                self.settings.velocity_min,
                self.settings.velocity_max,
            );
            for (chart_index, note) in data.notes.iter().enumerate() {
                let arrival_s = clock.seconds_until(note.time_seconds(clock.bpm));
                self.field.spawn(NoteObject {
                    player: unit.player,
                    chart_index,
                    note: *note,
                    position: layout.spawn_position(band, note.lane, speed, arrival_s),
                    velocity: -speed,
                    color: lane_color(note.lane),
                });
            }
            debug!(
                "Player {} slice: {} notes at {speed} px/s",
                unit.player,
                data.notes.len()
            );
        }

        self.field.show_stage(&layout, [left, right]);
        self.active = Some(ActiveBattle {
            attacker,
            defender,
            measures_played: 0,
            end_timer: None,
        });
        info!(
            "Battle started: player {} (unit {}) vs player {} (unit {})",
            attacker.player, attacker.unit, defender.player, defender.unit
        );
    }

    /// Per-tick work: miss sweep (attacker first), note motion, end timer.
    pub fn update<O: ChartOracle + ?Sized>(
        &mut self,
        dt: f32,
        oracle: &mut O,
        router: &mut MessageRouter,
    ) {
        let Some(battle) = self.active else {
            return;
        };

        for player in [battle.attacker.player, battle.defender.player] {
            let Some(data) = self.combatants.get_mut(&player) else {
                continue;
            };
            for note in oracle.passed_notes(data.instrument, data.battle_difficulty, dt) {
                if let Some(i) = data.sweep(&note) {
                    trace!("Player {player} missed #{i} ({:?})", note.lane);
                    router.raise(Message::NoteMiss {
                        player,
                        instrument: data.instrument,
                    });
                }
            }
        }

        self.field.advance(dt, self.settings.layout.destroy_y);

        let expired = self
            .active
            .as_mut()
            .and_then(|b| b.end_timer.as_mut())
            .is_some_and(|timer| timer.tick(dt));
        if expired {
            self.end_battle(router);
        }
    }

    pub fn on_exit_beat_window(&mut self, beat: &BeatInfo) {
        let Some(battle) = self.active.as_mut() else {
            return;
        };
        if beat.is_last_in_measure() {
            battle.measures_played += 1;
            debug!("Battle measure {} complete", battle.measures_played);
        }
    }

    pub fn on_beat_center(&mut self, beat: &BeatInfo) {
        let Some(battle) = self.active.as_mut() else {
            return;
        };
        if !beat.is_last_in_measure() || battle.measures_played != self.settings.measures {
            return;
        }
        if battle.end_timer.is_some() {
            trace!("End of battle already scheduled");
            return;
        }
        let delay_s = self.settings.end_grace_beats * beat.seconds_per_beat();
        battle.end_timer = Some(EndTimer::new(delay_s));
        debug!("Battle ends in {delay_s:.3}s");
    }

    pub fn cancel_pending_end(&mut self) {
        if let Some(battle) = self.active.as_mut()
            && battle.end_timer.take().is_some()
        {
            debug!("Pending battle end cancelled");
        }
    }

    /// Drops a running battle without an outcome. Used when the scene goes
    /// away mid-battle.
    pub fn abandon(&mut self) -> bool {
        let Some(battle) = self.active.take() else {
            return false;
        };
        let culled = self.field.clear();
        self.field.hide_stage();
        info!(
            "Battle abandoned: player {} vs player {} ({culled} notes left on screen)",
            battle.attacker.player, battle.defender.player
        );
        true
    }

    /// Tears down the field and raises the single ExitBattle for the running
    /// battle. Does nothing when no battle is active.
    pub fn end_battle(&mut self, router: &mut MessageRouter) -> Option<BattleOutcome> {
        let battle = self.active.take()?;
        let culled = self.field.clear();
        self.field.hide_stage();

        let states = |player: usize| {
            self.combatants
                .get(&player)
                .map(|c| c.states.as_slice())
                .unwrap_or_default()
        };
        let outcome = BattleOutcome::from_states(
            battle.attacker,
            states(battle.attacker.player),
            battle.defender,
            states(battle.defender.player),
        );
        info!(
            "Battle over: attacker {:.0}% / defender {:.0}% ({culled} notes left on screen)",
            outcome.attacker_hit_percent * 100.0,
            outcome.defender_hit_percent * 100.0
        );
        router.raise(outcome.to_message());
        Some(outcome)
    }

    pub fn on_button_down<O: ChartOracle + ?Sized>(
        &mut self,
        player: usize,
        button: Button,
        held: &HeldInputs,
        oracle: &O,
        router: &mut MessageRouter,
    ) {
        if !self.active.is_some_and(|b| b.involves(player)) {
            return;
        }
        let Some(data) = self.combatants.get_mut(&player) else {
            return;
        };
        let lanes = held.lanes(player);
        match button {
            Button::Strum => {
                try_hit_note(data, HitAttempt::Strum, lanes, oracle, &mut self.field, router);
            }
            Button::Fret(lane) if data.hit_last_note => {
                if lanes.iter().any(|&l| l > lane) {
                    return;
                }
                let attempt = HitAttempt::QuickTrigger(lane);
                if !try_hit_note(data, attempt, lanes, oracle, &mut self.field, router) {
                    data.hit_last_note = false;
                }
            }
            _ => {}
        }
    }

    pub fn on_button_up<O: ChartOracle + ?Sized>(
        &mut self,
        player: usize,
        button: Button,
        held: &HeldInputs,
        oracle: &O,
        router: &mut MessageRouter,
    ) {
        let Button::Fret(released) = button else {
            return;
        };
        if !self.active.is_some_and(|b| b.involves(player)) {
            return;
        }
        let Some(data) = self.combatants.get_mut(&player) else {
            return;
        };
        if !data.hit_last_note {
            return;
        }
        let lanes = held.lanes(player);
        let next: Option<Lane> = lanes.iter().copied().filter(|&l| l != released).max();
        if let Some(lane) = next {
            try_hit_note(data, HitAttempt::QuickTrigger(lane), lanes, oracle, &mut self.field, router);
        }
    }

    /// Applies a requested tier; unknown players are registered on the fly.
    pub fn on_difficulty_change(&mut self, player: usize, requested: i32) {
        let Ok(difficulty) = Difficulty::try_from(requested) else {
            warn!("Rejected difficulty {requested} for player {player}; tiers are 0..={}", Difficulty::MAX);
            return;
        };
        self.combatants
            .entry(player)
            .or_insert_with(|| CombatantBattleData::new(player, 0, difficulty))
            .difficulty = difficulty;
        info!("Player {player} difficulty set to {}", difficulty.tier());
    }

    pub fn handle<O: ChartOracle + ?Sized>(
        &mut self,
        msg: &Message,
        held: &HeldInputs,
        oracle: &mut O,
        router: &mut MessageRouter,
    ) {
        match *msg {
            Message::ButtonDown { player, button } => {
                self.on_button_down(player, button, held, oracle, router);
            }
            Message::ButtonUp { player, button } => {
                self.on_button_up(player, button, held, oracle, router);
            }
            Message::ExitBeatWindow(beat) => self.on_exit_beat_window(&beat),
            Message::BeatCenter(beat) => self.on_beat_center(&beat),
            Message::EnterBattle { attacker, defender } => {
                self.start_battle(attacker, defender, oracle);
            }
            Message::SceneChange => self.cancel_pending_end(),
            Message::DifficultyChange { player, difficulty } => {
                self.on_difficulty_change(player, difficulty);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BattleManager, BattleSettings};
    use crate::core::events::{BeatInfo, Message, MessageRouter, UnitRef};
    use crate::core::input::{Button, HeldInputs, Lane};
    use crate::game::difficulty::Difficulty;
    use crate::game::note::{Note, NoteState};
    use crate::game::song::Song;

    const BEATS: u32 = 4;

    fn unit(player: usize) -> UnitRef {
        UnitRef {
            player,
            unit: player as u32 + 10,
            color: Lane::Blue,
        }
    }

    fn beat(beat: u32) -> BeatInfo {
        BeatInfo {
            beat,
            beats_per_measure: BEATS,
            bpm: 120.0,
        }
    }

    fn song() -> Song {
        let mut song = Song::new(120.0, BEATS, 1).with_hit_window(0.05);
        song.set_chart(0, Difficulty::EASY, vec![Note::new(Lane::Green, 0.0), Note::new(Lane::Red, 1.0)]);
        song.set_chart(1, Difficulty::EASY, vec![Note::new(Lane::Yellow, 2.0), Note::new(Lane::Blue, 3.0)]);
        song
    }

    fn manager() -> BattleManager {
        let mut battle = BattleManager::new(BattleSettings::default());
        battle.register_player(0, 0, Difficulty::EASY);
        battle.register_player(1, 1, Difficulty::EASY);
        battle
    }

    fn drain(router: &mut MessageRouter) -> Vec<Message> {
        std::iter::from_fn(|| router.next()).collect()
    }

    #[test]
    fn passed_notes_are_swept_as_misses() {
        let mut song = song();
        let mut battle = manager();
        let mut router = MessageRouter::new();
        let mut held = HeldInputs::new();
        battle.start_battle(unit(0), unit(1), &mut song);

        song.seek(0.02);
        held.press(0, Lane::Green);
        battle.on_button_down(0, Button::Strum, &held, &song, &mut router);
        assert_eq!(drain(&mut router), vec![Message::NoteHit { player: 0, instrument: 0 }]);

        song.seek(0.6);
        battle.update(0.58, &mut song, &mut router);
        let data = battle.combatant(0).expect("registered");
        assert_eq!(data.states, vec![NoteState::Hit, NoteState::Missed]);
        assert!(!data.hit_last_note);
        assert_eq!(drain(&mut router), vec![Message::NoteMiss { player: 0, instrument: 0 }]);
    }

    #[test]
    fn spawned_notes_match_the_slice() {
        let mut song = song();
        let mut battle = manager();
        battle.start_battle(unit(1), unit(0), &mut song);
        assert_eq!(battle.field().live_count(), 4);
        let stage = battle.field().stage();
        assert_eq!(stage.sprites[0].unit.player, 0, "lower player number sits on the left");

        let speed = battle.settings().velocity_min;
        let red = battle.field().get(0, 1).expect("red note spawned");
        let expected = battle.settings().layout.target_line_y + speed * 0.5;
        assert!((red.position[1] - expected).abs() < 1e-3, "y = {}", red.position[1]);
        let yellow = battle.field().get(1, 0).expect("yellow note spawned");
        assert!(yellow.position[0] > red.position[0], "player 1 uses the right band");
    }

    #[test]
    fn battle_ends_once_after_the_grace_delay() {
        let mut song = song();
        let mut battle = manager();
        let mut router = MessageRouter::new();
        let mut held = HeldInputs::new();
        battle.start_battle(unit(0), unit(1), &mut song);

        for (seek, lane) in [(0.0, Lane::Green), (0.5, Lane::Red)] {
            song.seek(seek);
            held.clear();
            held.press(0, lane);
            battle.on_button_down(0, Button::Strum, &held, &song, &mut router);
        }
        song.seek(1.99);
        battle.update(1.99, &mut song, &mut router);

        battle.on_exit_beat_window(&beat(3));
        battle.on_beat_center(&beat(2));
        assert!(!battle.end_pending(), "only the last beat of a measure ends a battle");
        battle.on_beat_center(&beat(3));
        assert!(battle.end_pending());
        battle.on_beat_center(&beat(3));

        battle.update(0.1, &mut song, &mut router);
        assert!(battle.is_in_battle(), "half a beat is 0.25s at 120 bpm");
        battle.update(0.2, &mut song, &mut router);
        assert!(!battle.is_in_battle());
        assert_eq!(battle.field().live_count(), 0);

        let exits: Vec<Message> = drain(&mut router)
            .into_iter()
            .filter(|m| matches!(m, Message::ExitBattle { .. }))
            .collect();
        assert_eq!(
            exits,
            vec![Message::ExitBattle {
                attacker: unit(0),
                defender: unit(1),
                attacker_hit_percent: 1.0,
                defender_hit_percent: 0.0,
            }]
        );
        battle.update(1.0, &mut song, &mut router);
        assert!(battle.end_battle(&mut router).is_none());
    }

    #[test]
    fn scene_change_cancels_the_pending_end() {
        let mut song = song();
        let mut battle = manager();
        let mut router = MessageRouter::new();
        battle.start_battle(unit(0), unit(1), &mut song);
        battle.on_exit_beat_window(&beat(3));
        battle.on_beat_center(&beat(3));
        battle.cancel_pending_end();
        battle.update(1.0, &mut song, &mut router);
        assert!(battle.is_in_battle());
        assert!(!battle.end_pending());
    }

    #[test]
    fn out_of_range_difficulty_is_not_applied() {
        let mut battle = manager();
        battle.on_difficulty_change(0, 2);
        assert_eq!(battle.player_difficulty(0), Some(Difficulty::HARD));
        battle.on_difficulty_change(0, 3);
        assert_eq!(battle.player_difficulty(0), Some(Difficulty::HARD));
        battle.on_difficulty_change(0, -1);
        assert_eq!(battle.player_difficulty(0), Some(Difficulty::HARD));

        battle.on_difficulty_change(5, 1);
        assert_eq!(battle.player_difficulty(5), Some(Difficulty::MEDIUM), "unknown players get registered");
    }

    #[test]
    fn quick_trigger_chains_on_press_and_release() {
        let mut song = Song::new(120.0, BEATS, 1).with_hit_window(0.05);
        song.set_chart(
            0,
            Difficulty::EASY,
            vec![
                Note::new(Lane::Red, 0.0),
                Note::quick_trigger(Lane::Yellow, 1.0),
                Note::quick_trigger(Lane::Red, 2.0),
            ],
        );
        song.set_chart(1, Difficulty::EASY, vec![Note::new(Lane::Green, 0.0)]);
        let mut battle = manager();
        let mut router = MessageRouter::new();
        let mut held = HeldInputs::new();
        battle.start_battle(unit(0), unit(1), &mut song);

        held.press(0, Lane::Red);
        battle.on_button_down(0, Button::Strum, &held, &song, &mut router);

        song.seek(0.5);
        held.press(0, Lane::Yellow);
        battle.on_button_down(0, Button::Fret(Lane::Yellow), &held, &song, &mut router);

        song.seek(1.0);
        held.release(0, Lane::Yellow);
        battle.on_button_up(0, Button::Fret(Lane::Yellow), &held, &song, &mut router);

        let data = battle.combatant(0).expect("registered");
        assert_eq!(data.states, vec![NoteState::Hit; 3]);
        assert_eq!(drain(&mut router).len(), 3);
    }

    #[test]
    fn a_battle_started_late_in_a_window_skips_that_note() {
        let mut song = song();
        let mut battle = manager();
        let mut router = MessageRouter::new();
        let mut held = HeldInputs::new();
        song.seek(0.02);
        battle.start_battle(unit(0), unit(1), &mut song);

        let data = battle.combatant(0).expect("registered");
        assert_eq!(data.notes, vec![Note::new(Lane::Red, 1.0)]);
        let red = battle.field().get(0, 0).expect("red note spawned");
        let expected = battle.settings().layout.target_line_y + battle.settings().velocity_min * 0.48;
        assert!((red.position[1] - expected).abs() < 1e-2, "y = {}", red.position[1]);

        held.press(0, Lane::Green);
        battle.on_button_down(0, Button::Strum, &held, &song, &mut router);
        let data = battle.combatant(0).expect("registered");
        assert_eq!(data.states, vec![NoteState::Pending], "nothing on screen was judged");
        assert_eq!(drain(&mut router), vec![Message::NoteMiss { player: 0, instrument: 0 }]);

        song.seek(0.1);
        battle.update(0.08, &mut song, &mut router);
        assert_eq!(battle.combatant(0).expect("registered").states, vec![NoteState::Pending]);
        assert!(drain(&mut router).is_empty(), "the skipped note is never swept");
    }

    #[test]
    fn instrument_can_be_switched_after_registration() {
        let mut battle = manager();
        battle.set_player_instrument(1, 3);
        assert_eq!(battle.combatant(1).map(|c| c.instrument), Some(3));
        assert_eq!(battle.player_difficulty(1), Some(Difficulty::EASY), "difficulty is untouched");
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn switching_an_unknown_players_instrument_panics() {
        let mut battle = manager();
        battle.set_player_instrument(9, 0);
    }

    #[test]
    fn abandoning_drops_the_battle_without_an_outcome() {
        let mut song = song();
        let mut battle = manager();
        let mut router = MessageRouter::new();
        battle.start_battle(unit(0), unit(1), &mut song);
        assert!(battle.abandon());
        assert!(!battle.is_in_battle());
        assert_eq!(battle.field().live_count(), 0);
        assert!(!battle.field().stage().target_line_visible);
        assert!(battle.end_battle(&mut router).is_none());
        assert_eq!(router.next(), None);
        assert!(!battle.abandon());
    }

    #[test]
    fn spectators_cannot_hit_notes() {
        let mut song = song();
        let mut battle = manager();
        battle.register_player(2, 0, Difficulty::EASY);
        let mut router = MessageRouter::new();
        let mut held = HeldInputs::new();
        battle.start_battle(unit(0), unit(1), &mut song);
        held.press(2, Lane::Green);
        battle.on_button_down(2, Button::Strum, &held, &song, &mut router);
        assert_eq!(router.next(), None);
    }
}

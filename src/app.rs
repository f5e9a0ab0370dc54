//! Headless demo: a short scripted turn phase followed by one autoplayed
//! battle, driven at a fixed tick rate.

use log::{debug, info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use std::error::Error;

use melodybattle::config;
use melodybattle::core::events::{Message, UnitRef};
use melodybattle::core::input::{Button, Lane, PadDir};
use melodybattle::game::difficulty::Difficulty;
use melodybattle::game::metronome::Metronome;
use melodybattle::game::note::Note;
use melodybattle::game::oracle::ChartOracle;
use melodybattle::game::score::BattleOutcome;
use melodybattle::game::session::{Phase, Session};
use melodybattle::game::song::Song;

/* -------------------- demo constants -------------------- */
const TICK_S: f32 = 1.0 / 120.0;
const MAX_RUNTIME_S: f32 = 30.0;
const BPM: f32 = 120.0;
const BEATS_PER_MEASURE: u32 = 4;
const LOOP_MEASURES: u32 = 2;
const TURN_MEASURES: u32 = 1;
/// Autoplayer hit chance per player.
const ACCURACY: [f32; 2] = [0.9, 0.6];
const INSTRUMENTS: [u32; 2] = [0, 1];

/// Charts for both instruments at every tier. Higher tiers subdivide the
/// beat; every other note after the first is a quick-trigger on tier 2.
fn build_song() -> Song {
    let mut song = Song::new(BPM, BEATS_PER_MEASURE, LOOP_MEASURES);
    let loop_beats = (BEATS_PER_MEASURE * LOOP_MEASURES) as usize;
    for instrument in INSTRUMENTS {
        for tier in 0..=Difficulty::MAX {
            let Ok(difficulty) = Difficulty::try_from(i32::from(tier)) else {
                continue;
            };
            let per_beat = 1usize << tier;
            let notes = (0..loop_beats * per_beat)
                .map(|i| {
                    let beat = i as f32 / per_beat as f32;
                    let lane = Lane::ALL[(i + instrument as usize * 2) % Lane::ALL.len()];
                    if tier == Difficulty::MAX && i % 2 == 1 {
                        Note::quick_trigger(lane, beat)
                    } else {
                        Note::new(lane, beat)
                    }
                })
                .collect();
            song.set_chart(instrument, difficulty, notes);
        }
    }
    song
}

/// Scripted board input for the turn phase: on-beat moves, off-beat strums.
fn turn_script(spb: f32) -> Vec<(f32, Message)> {
    let mut script = Vec::new();
    for beat in 0..TURN_MEASURES * BEATS_PER_MEASURE {
        let center = beat as f32 * spb;
        let player = (beat as usize / 2) % 2;
        if beat % 2 == 0 {
            script.push((center, Message::SwitchPlayer { player }));
        }
        script.push((
            center + TICK_S,
            Message::ButtonDown {
                player,
                button: Button::Dir(PadDir::Right),
            },
        ));
        script.push((
            center + spb / 2.0,
            Message::ButtonDown {
                player,
                button: Button::Strum,
            },
        ));
    }
    script
}

/// Presses the right fret (and strums when needed) as each note reaches the
/// target line, succeeding with the player's configured accuracy.
#[derive(Default)]
struct Autoplayer {
    attempted: FxHashSet<(usize, usize)>,
}

impl Autoplayer {
    fn play(&mut self, session: &mut Session<Song>, players: &[usize]) {
        let clock = session.oracle().clock();
        let mut inputs = Vec::new();
        for &player in players {
            let Some(data) = session.battle().combatant(player) else {
                continue;
            };
            for (i, note) in data.notes.iter().enumerate() {
                if !data.states[i].is_pending() || self.attempted.contains(&(player, i)) {
                    continue;
                }
                if clock.signed_offset(note.time_seconds(clock.bpm)) > 0.0 {
                    continue;
                }
                self.attempted.insert((player, i));
                if rand::random::<f32>() >= ACCURACY[player % ACCURACY.len()] {
                    debug!("Autoplayer lets player {player} drop note #{i}");
                    continue;
                }
                let fret = Button::Fret(note.lane);
                inputs.push(Message::ButtonDown { player, button: fret });
                if !(note.is_quick_trigger() && data.hit_last_note) {
                    inputs.push(Message::ButtonDown {
                        player,
                        button: Button::Strum,
                    });
                }
                inputs.push(Message::ButtonUp { player, button: fret });
            }
        }
        session.post_all(inputs);
    }
}

#[derive(Default)]
struct Tally {
    hits: FxHashMap<usize, u32>,
    misses: FxHashMap<usize, u32>,
    actions: u32,
    rejects: u32,
}

impl Tally {
    fn record(&mut self, msg: &Message) {
        match *msg {
            Message::NoteHit { player, .. } => *self.hits.entry(player).or_default() += 1,
            Message::NoteMiss { player, .. } => *self.misses.entry(player).or_default() += 1,
            Message::UnitAction { .. } => self.actions += 1,
            Message::RejectAction { .. } => self.rejects += 1,
            _ => {}
        }
    }
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cfg = config::get();
    let song = build_song();
    let spb = 60.0 / song.bpm();
    let mut metronome = Metronome::new(song.bpm(), song.beats_per_measure(), cfg.beat_window_seconds);

    let mut session = Session::new(song, &cfg, 0);
    for (player, instrument) in INSTRUMENTS.into_iter().enumerate() {
        session.register_player(player, instrument, Difficulty::MEDIUM);
    }

    let attacker = UnitRef {
        player: 0,
        unit: 1,
        color: Lane::Red,
    };
    let defender = UnitRef {
        player: 1,
        unit: 4,
        color: Lane::Blue,
    };
    let mut script = turn_script(spb);
    let battle_at = (TURN_MEASURES * BEATS_PER_MEASURE) as f32 * spb;
    script.push((battle_at, Message::EnterBattle { attacker, defender }));
    script.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut script = script.into_iter().peekable();

    info!(
        "Demo: {BPM} bpm, {} measure battle after {TURN_MEASURES} turn measure(s)",
        cfg.battle_measures
    );

    let mut autoplayer = Autoplayer::default();
    let mut tally = Tally::default();
    let mut outcome: Option<BattleOutcome> = None;
    let mut elapsed = 0.0f32;

    while outcome.is_none() && elapsed < MAX_RUNTIME_S {
        elapsed += TICK_S;
        session.oracle_mut().advance(TICK_S);
        session.post_all(metronome.advance(TICK_S));
        while let Some((_, msg)) = script.next_if(|(at, _)| *at <= elapsed) {
            session.post(msg);
        }
        if session.phase() == Phase::Battle {
            autoplayer.play(&mut session, &[attacker.player, defender.player]);
        }
        session.tick(TICK_S);

        for msg in session.drain_published() {
            tally.record(&msg);
            if let Message::ExitBattle {
                attacker,
                defender,
                attacker_hit_percent,
                defender_hit_percent,
            } = msg
            {
                outcome = Some(BattleOutcome {
                    attacker,
                    defender,
                    attacker_hit_percent,
                    defender_hit_percent,
                });
            }
        }
    }

    session.post(Message::SceneChange);
    session.tick(TICK_S);

    info!(
        "Turn phase: {} accepted action(s), {} rejected",
        tally.actions, tally.rejects
    );
    for player in [attacker.player, defender.player] {
        info!(
            "Player {player}: {} hit, {} missed",
            tally.hits.get(&player).copied().unwrap_or(0),
            tally.misses.get(&player).copied().unwrap_or(0)
        );
    }

    match outcome {
        Some(outcome) => {
            match outcome.leader() {
                Some(side) => info!("{side:?} wins the exchange"),
                None => info!("Battle tied"),
            }
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        None => warn!("No battle outcome after {MAX_RUNTIME_S}s"),
    }
    Ok(())
}

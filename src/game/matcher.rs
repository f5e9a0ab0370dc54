//! Matches a strum or a quick-trigger against a combatant's chart slice.

use log::{debug, trace};
use smallvec::smallvec;

use crate::core::events::{Message, MessageRouter};
use crate::core::input::{HeldLanes, Lane};
use crate::game::battle::CombatantBattleData;
use crate::game::note::{Note, NoteState};
use crate::game::note_field::NoteField;
use crate::game::oracle::ChartOracle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitAttempt {
    /// Evaluated against every held lane.
    Strum,
    /// Hammer-on / pull-off on a single lane, without a strum.
    QuickTrigger(Lane),
}

/// Quick-triggers can only hit notes flagged for it; a strum hits anything.
#[inline(always)]
pub const fn is_legal(note: &Note, attempt: HitAttempt) -> bool {
    match attempt {
        HitAttempt::Strum => true,
        HitAttempt::QuickTrigger(_) => note.is_quick_trigger(),
    }
}

/// Attempts to hit one note for `combatant`.
///
/// `held` is the player's held-lane set at call time. The first pending
/// chart position (in chart order) matching an oracle candidate wins. A
/// failed strum counts as a miss; a failed quick-trigger emits nothing.
pub fn try_hit_note<O: ChartOracle + ?Sized>(
    combatant: &mut CombatantBattleData,
    attempt: HitAttempt,
    held: &[Lane],
    oracle: &O,
    field: &mut NoteField,
    router: &mut MessageRouter,
) -> bool {
    let lanes: HeldLanes = match attempt {
        HitAttempt::Strum => held.iter().copied().collect(),
        HitAttempt::QuickTrigger(lane) => smallvec![lane],
    };
    let candidates =
        oracle.hittable_notes(combatant.instrument, combatant.battle_difficulty, &lanes);

    for candidate in &candidates {
        let found = combatant
            .index
            .positions(candidate)
            .iter()
            .copied()
            .find(|&i| combatant.states[i].is_pending() && is_legal(&combatant.notes[i], attempt));
        let Some(i) = found else {
            continue;
        };
        combatant.states[i].resolve(NoteState::Hit);
        combatant.hit_last_note = true;
        field.destroy(combatant.player, i);
        router.raise(Message::NoteHit {
            player: combatant.player,
            instrument: combatant.instrument,
        });
        trace!("Player {} hit #{i} ({:?}) via {attempt:?}", combatant.player, candidate.lane);
        return true;
    }

    if attempt == HitAttempt::Strum {
        debug!("Player {} strummed {:?} with nothing to hit", combatant.player, lanes);
        combatant.hit_last_note = false;
        router.raise(Message::NoteMiss {
            player: combatant.player,
            instrument: combatant.instrument,
        });
    }
    false
}

#[cfg(test)]
mod tests {
    use super::{HitAttempt, is_legal, try_hit_note};
    use crate::core::events::{Message, MessageRouter};
    use crate::core::input::Lane;
    use crate::game::battle::CombatantBattleData;
    use crate::game::difficulty::Difficulty;
    use crate::game::note::{Note, NoteState};
    use crate::game::note_field::NoteField;
    use crate::game::oracle::ChartOracle;
    use crate::game::song::Song;

    fn song(chart: Vec<Note>) -> Song {
        let mut song = Song::new(120.0, 4, 1).with_hit_window(0.05);
        song.set_chart(0, Difficulty::EASY, chart);
        song
    }

    fn combatant(song: &mut Song) -> CombatantBattleData {
        let mut data = CombatantBattleData::new(0, 0, Difficulty::EASY);
        let slice = song.chart_slice(1, 0, Difficulty::EASY);
        data.begin(None, slice);
        data
    }

    #[test]
    fn quick_trigger_only_hits_flagged_notes() {
        let plain = Note::new(Lane::Red, 1.0);
        let hopo = Note::quick_trigger(Lane::Red, 1.0);
        assert!(is_legal(&plain, HitAttempt::Strum));
        assert!(is_legal(&hopo, HitAttempt::Strum));
        assert!(!is_legal(&plain, HitAttempt::QuickTrigger(Lane::Red)));
        assert!(is_legal(&hopo, HitAttempt::QuickTrigger(Lane::Red)));
    }

    #[test]
    fn strum_hits_the_first_note_only() {
        let mut song = song(vec![Note::new(Lane::Green, 0.0), Note::new(Lane::Red, 1.0)]);
        let mut data = combatant(&mut song);
        let mut field = NoteField::new();
        let mut router = MessageRouter::new();
        song.seek(0.02);

        assert!(try_hit_note(&mut data, HitAttempt::Strum, &[Lane::Green], &song, &mut field, &mut router));
        assert_eq!(data.states, vec![NoteState::Hit, NoteState::Pending]);
        assert!(data.hit_last_note);
        assert_eq!(router.next(), Some(Message::NoteHit { player: 0, instrument: 0 }));
        assert_eq!(router.next(), None);
    }

    #[test]
    fn repeated_strum_is_a_miss_not_a_second_hit() {
        let mut song = song(vec![Note::new(Lane::Green, 0.0), Note::new(Lane::Red, 1.0)]);
        let mut data = combatant(&mut song);
        let mut field = NoteField::new();
        let mut router = MessageRouter::new();
        song.seek(0.02);

        assert!(try_hit_note(&mut data, HitAttempt::Strum, &[Lane::Green], &song, &mut field, &mut router));
        assert!(!try_hit_note(&mut data, HitAttempt::Strum, &[Lane::Green], &song, &mut field, &mut router));
        assert_eq!(data.states, vec![NoteState::Hit, NoteState::Pending], "state unchanged");
        assert!(!data.hit_last_note);
        assert_eq!(router.next(), Some(Message::NoteHit { player: 0, instrument: 0 }));
        assert_eq!(router.next(), Some(Message::NoteMiss { player: 0, instrument: 0 }));
    }

    #[test]
    fn failed_quick_trigger_is_silent() {
        let mut song = song(vec![Note::new(Lane::Green, 0.0), Note::new(Lane::Red, 1.0)]);
        let mut data = combatant(&mut song);
        let mut field = NoteField::new();
        let mut router = MessageRouter::new();
        song.seek(0.5);
        data.hit_last_note = true;

        let hit = try_hit_note(
            &mut data,
            HitAttempt::QuickTrigger(Lane::Red),
            &[Lane::Red],
            &song,
            &mut field,
            &mut router,
        );
        assert!(!hit, "an unflagged note cannot be quick-triggered");
        assert_eq!(router.next(), None);
        assert!(data.hit_last_note, "the caller decides whether to drop the chain");
    }

    #[test]
    fn quick_trigger_uses_only_the_given_lane() {
        let mut song = song(vec![Note::new(Lane::Green, 0.0), Note::quick_trigger(Lane::Red, 1.0)]);
        let mut data = combatant(&mut song);
        let mut field = NoteField::new();
        let mut router = MessageRouter::new();
        song.seek(0.49);

        let hit = try_hit_note(
            &mut data,
            HitAttempt::QuickTrigger(Lane::Red),
            &[Lane::Green, Lane::Blue],
            &song,
            &mut field,
            &mut router,
        );
        assert!(hit, "a held blue fret must not mask the quick-triggered red lane");
        assert_eq!(data.states[1], NoteState::Hit);
    }
}

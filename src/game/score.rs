use serde::Serialize;

use crate::core::events::{Message, UnitRef};
use crate::game::note::NoteState;

#[inline(always)]
pub fn hit_count(states: &[NoteState]) -> usize {
    states.iter().filter(|s| **s == NoteState::Hit).count()
}

/// Fraction of notes hit, in `[0, 1]`. An empty slice scores 0.
#[inline(always)]
pub fn hit_percent(states: &[NoteState]) -> f32 {
    if states.is_empty() {
        return 0.0;
    }
    hit_count(states) as f32 / states.len() as f32
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Side {
    Attacker,
    Defender,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BattleOutcome {
    pub attacker: UnitRef,
    pub defender: UnitRef,
    pub attacker_hit_percent: f32,
    pub defender_hit_percent: f32,
}

impl BattleOutcome {
    pub fn from_states(
        attacker: UnitRef,
        attacker_states: &[NoteState],
        defender: UnitRef,
        defender_states: &[NoteState],
    ) -> Self {
        Self {
            attacker,
            defender,
            attacker_hit_percent: hit_percent(attacker_states),
            defender_hit_percent: hit_percent(defender_states),
        }
    }

    /// The side with the better accuracy, `None` on a tie.
    pub fn leader(&self) -> Option<Side> {
        if self.attacker_hit_percent > self.defender_hit_percent {
            Some(Side::Attacker)
        } else if self.defender_hit_percent > self.attacker_hit_percent {
            Some(Side::Defender)
        } else {
            None
        }
    }

    pub const fn to_message(&self) -> Message {
        Message::ExitBattle {
            attacker: self.attacker,
            defender: self.defender,
            attacker_hit_percent: self.attacker_hit_percent,
            defender_hit_percent: self.defender_hit_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BattleOutcome, Side, hit_count, hit_percent};
    use crate::core::events::UnitRef;
    use crate::core::input::Lane;
    use crate::game::note::NoteState::{Hit, Missed, Pending};

    fn unit(player: usize) -> UnitRef {
        UnitRef {
            player,
            unit: 0,
            color: Lane::Green,
        }
    }

    #[test]
    fn percent_stays_in_unit_range() {
        assert_eq!(hit_count(&[Hit, Missed, Pending, Hit]), 2);
        assert!((hit_percent(&[Hit, Missed, Pending, Hit]) - 0.5).abs() < 1e-6);
        assert!((hit_percent(&[Hit, Hit]) - 1.0).abs() < 1e-6);
        assert!(hit_percent(&[Missed, Missed]).abs() < 1e-6);
        assert!(hit_percent(&[]).abs() < 1e-6, "empty slices score zero");
    }

    #[test]
    fn leader_prefers_higher_accuracy() {
        let outcome = BattleOutcome::from_states(unit(0), &[Hit, Hit], unit(1), &[Missed, Missed]);
        assert_eq!(outcome.leader(), Some(Side::Attacker));
        let tie = BattleOutcome::from_states(unit(0), &[Hit, Missed], unit(1), &[Missed, Hit]);
        assert_eq!(tie.leader(), None);
    }
}

use log::debug;
use serde::Serialize;

use crate::core::events::{Message, MessageRouter};
use crate::core::input::Button;

/// Chart density / fall speed tier, always within `0..=Difficulty::MAX`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Difficulty(u8);

impl Difficulty {
    pub const MAX: u8 = 2;
    pub const EASY: Self = Self(0);
    pub const MEDIUM: Self = Self(1);
    pub const HARD: Self = Self(2);

    #[inline(always)]
    pub const fn tier(self) -> u8 {
        self.0
    }

    /// 0.0 for the easiest tier, 1.0 for the hardest.
    #[inline(always)]
    pub fn fraction(self) -> f32 {
        f32::from(self.0) / f32::from(Self::MAX)
    }
}

impl TryFrom<i32> for Difficulty {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(tier) if tier <= Self::MAX => Ok(Self(tier)),
            _ => Err(value),
        }
    }
}

/// Plus/Minus step the player's tier, raising a change only when the result
/// stays in range.
pub fn on_button_down(
    player: usize,
    button: Button,
    current: Option<Difficulty>,
    router: &mut MessageRouter,
) {
    let delta = match button {
        Button::Plus => 1,
        Button::Minus => -1,
        _ => return,
    };
    let next = i32::from(current.unwrap_or_default().tier()) + delta;
    if Difficulty::try_from(next).is_err() {
        debug!("Player {player} difficulty already at the limit; ignoring step to {next}");
        return;
    }
    router.raise(Message::DifficultyChange {
        player,
        difficulty: next,
    });
}

//! Rhythm-synchronized combat core: falling-note battles between two
//! combatants, input-to-note matching and beat-window action gating.

pub mod config;
pub mod core;
pub mod game;

pub mod battle;
pub mod difficulty;
pub mod gate;
pub mod matcher;
pub mod metronome;
pub mod note;
pub mod note_field;
pub mod oracle;
pub mod score;
pub mod session;
pub mod song;

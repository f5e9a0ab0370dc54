pub mod events;
pub mod input;

//! Typed messages and the router that queues and delivers them.
//!
//! Components never call each other directly. Handlers `raise` messages into
//! the router; the session pops them in order and hands each one to every
//! active subscriber registered for its kind. Messages raised while a message
//! is being handled are delivered before anything queued from outside, which
//! keeps the "raise means it happened now" behavior handlers rely on.

use std::collections::VecDeque;

use bitflags::bitflags;
use log::trace;
use serde::Serialize;
use smallvec::SmallVec;

use crate::core::input::{Button, Lane};

/// Board unit taking part in a battle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct UnitRef {
    pub player: usize,
    pub unit: u32,
    pub color: Lane,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BeatInfo {
    /// Beat index within the current measure.
    pub beat: u32,
    pub beats_per_measure: u32,
    pub bpm: f32,
}

impl BeatInfo {
    #[inline(always)]
    pub const fn is_last_in_measure(&self) -> bool {
        self.beat + 1 == self.beats_per_measure
    }

    #[inline(always)]
    pub fn seconds_per_beat(&self) -> f32 {
        60.0 / self.bpm
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ActionKind {
    Select,
    Move,
    Attack,
    Special,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ActionPayload {
    None,
    Lane(Option<Lane>),
    Offset { dx: i32, dy: i32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Message {
    ButtonDown {
        player: usize,
        button: Button,
    },
    ButtonUp {
        player: usize,
        button: Button,
    },
    EnterBeatWindow(BeatInfo),
    ExitBeatWindow(BeatInfo),
    BeatCenter(BeatInfo),
    SceneChange,
    SwitchPlayer {
        player: usize,
    },
    NoteHit {
        player: usize,
        instrument: u32,
    },
    NoteMiss {
        player: usize,
        instrument: u32,
    },
    EnterBattle {
        attacker: UnitRef,
        defender: UnitRef,
    },
    ExitBattle {
        attacker: UnitRef,
        defender: UnitRef,
        attacker_hit_percent: f32,
        defender_hit_percent: f32,
    },
    UnitAction {
        kind: ActionKind,
        player: usize,
        payload: ActionPayload,
    },
    /// `player` attempted `kind`; `turn_owner` is who actually holds the turn.
    RejectAction {
        kind: ActionKind,
        player: usize,
        turn_owner: usize,
    },
    /// Raw requested tier; the battle manager validates it.
    DifficultyChange {
        player: usize,
        difficulty: i32,
    },
    PauseGame {
        player: usize,
    },
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MessageKinds: u16 {
        const BUTTON_DOWN = 1 << 0;
        const BUTTON_UP = 1 << 1;
        const ENTER_BEAT_WINDOW = 1 << 2;
        const EXIT_BEAT_WINDOW = 1 << 3;
        const BEAT_CENTER = 1 << 4;
        const SCENE_CHANGE = 1 << 5;
        const SWITCH_PLAYER = 1 << 6;
        const NOTE_HIT = 1 << 7;
        const NOTE_MISS = 1 << 8;
        const ENTER_BATTLE = 1 << 9;
        const EXIT_BATTLE = 1 << 10;
        const UNIT_ACTION = 1 << 11;
        const REJECT_ACTION = 1 << 12;
        const DIFFICULTY_CHANGE = 1 << 13;
        const PAUSE_GAME = 1 << 14;
    }
}

impl Message {
    pub const fn kind(&self) -> MessageKinds {
        match self {
            Self::ButtonDown { .. } => MessageKinds::BUTTON_DOWN,
            Self::ButtonUp { .. } => MessageKinds::BUTTON_UP,
            Self::EnterBeatWindow(_) => MessageKinds::ENTER_BEAT_WINDOW,
            Self::ExitBeatWindow(_) => MessageKinds::EXIT_BEAT_WINDOW,
            Self::BeatCenter(_) => MessageKinds::BEAT_CENTER,
            Self::SceneChange => MessageKinds::SCENE_CHANGE,
            Self::SwitchPlayer { .. } => MessageKinds::SWITCH_PLAYER,
            Self::NoteHit { .. } => MessageKinds::NOTE_HIT,
            Self::NoteMiss { .. } => MessageKinds::NOTE_MISS,
            Self::EnterBattle { .. } => MessageKinds::ENTER_BATTLE,
            Self::ExitBattle { .. } => MessageKinds::EXIT_BATTLE,
            Self::UnitAction { .. } => MessageKinds::UNIT_ACTION,
            Self::RejectAction { .. } => MessageKinds::REJECT_ACTION,
            Self::DifficultyChange { .. } => MessageKinds::DIFFICULTY_CHANGE,
            Self::PauseGame { .. } => MessageKinds::PAUSE_GAME,
        }
    }

    /// Raw controller input, discarded once a scene change is in flight.
    #[inline(always)]
    pub const fn is_input(&self) -> bool {
        matches!(self, Self::ButtonDown { .. } | Self::ButtonUp { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Subscriber {
    BeatWindowGate,
    BattleManager,
    DifficultySelect,
}

#[derive(Clone, Copy, Debug)]
struct Registration {
    subscriber: Subscriber,
    kinds: MessageKinds,
    active: bool,
}

#[derive(Clone, Debug, Default)]
pub struct MessageRouter {
    queue: VecDeque<Message>,
    raised: Vec<Message>,
    registrations: Vec<Registration>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `subscriber` to `kinds`, merging with any live registration.
    pub fn add_handler(&mut self, subscriber: Subscriber, kinds: MessageKinds) {
        if let Some(reg) = self
            .registrations
            .iter_mut()
            .find(|r| r.subscriber == subscriber && r.active)
        {
            reg.kinds |= kinds;
            return;
        }
        self.registrations.push(Registration {
            subscriber,
            kinds,
            active: true,
        });
    }

    /// Phase one of unsubscription: the handler stops receiving messages
    /// immediately; the registration itself goes away in `flush_removals`.
    pub fn remove_handler_deferred(&mut self, subscriber: Subscriber) {
        for reg in self
            .registrations
            .iter_mut()
            .filter(|r| r.subscriber == subscriber)
        {
            reg.active = false;
        }
    }

    pub fn remove_all_deferred(&mut self) {
        for reg in &mut self.registrations {
            reg.active = false;
        }
    }

    /// Phase two, run at the end of a tick. Returns how many were dropped.
    pub fn flush_removals(&mut self) -> usize {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.active);
        before - self.registrations.len()
    }

    pub fn is_subscribed(&self, subscriber: Subscriber, kind: MessageKinds) -> bool {
        self.registrations
            .iter()
            .any(|r| r.active && r.subscriber == subscriber && r.kinds.intersects(kind))
    }

    pub fn handlers_for(&self, kind: MessageKinds) -> SmallVec<[Subscriber; 4]> {
        self.registrations
            .iter()
            .filter(|r| r.active && r.kinds.intersects(kind))
            .map(|r| r.subscriber)
            .collect()
    }

    /// Queues a message from outside the dispatch loop (input, clock).
    pub fn post(&mut self, msg: Message) {
        trace!("post {msg:?}");
        self.queue.push_back(msg);
    }

    /// Raises a message from inside a handler.
    pub fn raise(&mut self, msg: Message) {
        trace!("raise {msg:?}");
        self.raised.push(msg);
    }

    pub fn next(&mut self) -> Option<Message> {
        for msg in self.raised.drain(..).rev() {
            self.queue.push_front(msg);
        }
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::{BeatInfo, Message, MessageKinds, MessageRouter, Subscriber};
    use crate::core::input::Button;

    fn down(player: usize) -> Message {
        Message::ButtonDown {
            player,
            button: Button::Strum,
        }
    }

    #[test]
    fn raised_messages_jump_ahead_of_posted_ones() {
        let mut router = MessageRouter::new();
        router.post(down(0));
        router.post(down(1));
        assert_eq!(router.next(), Some(down(0)));
        router.raise(Message::PauseGame { player: 0 });
        router.raise(Message::SceneChange);
        assert_eq!(router.next(), Some(Message::PauseGame { player: 0 }));
        assert_eq!(router.next(), Some(Message::SceneChange));
        assert_eq!(router.next(), Some(down(1)));
        assert_eq!(router.next(), None);
    }

    #[test]
    fn deferred_removal_silences_before_it_unregisters() {
        let mut router = MessageRouter::new();
        router.add_handler(Subscriber::BeatWindowGate, MessageKinds::BUTTON_DOWN);
        router.add_handler(Subscriber::BeatWindowGate, MessageKinds::BUTTON_UP);
        router.add_handler(Subscriber::BattleManager, MessageKinds::BUTTON_DOWN);
        assert_eq!(router.handlers_for(MessageKinds::BUTTON_DOWN).len(), 2);
        assert!(router.is_subscribed(Subscriber::BeatWindowGate, MessageKinds::BUTTON_UP));

        router.remove_handler_deferred(Subscriber::BeatWindowGate);
        assert_eq!(
            router.handlers_for(MessageKinds::BUTTON_DOWN).as_slice(),
            &[Subscriber::BattleManager],
            "inactive handlers must not be returned before the flush"
        );
        assert_eq!(router.flush_removals(), 1);
        assert_eq!(router.flush_removals(), 0);
    }

    #[test]
    fn message_kinds_are_distinct() {
        let beat = BeatInfo {
            beat: 3,
            beats_per_measure: 4,
            bpm: 120.0,
        };
        assert!(beat.is_last_in_measure());
        assert!((beat.seconds_per_beat() - 0.5).abs() < 1e-6);
        assert_eq!(Message::BeatCenter(beat).kind(), MessageKinds::BEAT_CENTER);
        assert_ne!(Message::EnterBeatWindow(beat).kind(), Message::ExitBeatWindow(beat).kind());
        assert!(down(0).is_input());
        assert!(!Message::SceneChange.is_input());
    }

    #[test]
    fn messages_serialize_with_a_type_tag() {
        let json = serde_json::to_string(&Message::NoteHit {
            player: 1,
            instrument: 0,
        })
        .expect("messages serialize");
        assert!(json.contains("\"type\":\"NoteHit\""), "got {json}");
    }
}

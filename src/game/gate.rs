//! Turn-phase input gate.
//!
//! Between `EnterBeatWindow` and `ExitBeatWindow` the turn owner may perform
//! one action. Everything else is rejected, except Tilt which always goes
//! through for the turn owner.

use log::{debug, trace};
use rustc_hash::FxHashMap;

use crate::core::events::{ActionKind, ActionPayload, Message, MessageRouter};
use crate::core::input::{Button, HeldInputs, HeldLanes, Lane};

#[derive(Clone, Debug)]
pub struct BeatWindowGate {
    accepting: bool,
    turn_owner: usize,
    held_this_window: FxHashMap<usize, HeldLanes>,
    switch_unit_on_end_beat: bool,
    enabled: bool,
    ignore: bool,
}

impl BeatWindowGate {
    pub fn new(turn_owner: usize, switch_unit_on_end_beat: bool) -> Self {
        Self {
            accepting: false,
            turn_owner,
            held_this_window: FxHashMap::default(),
            switch_unit_on_end_beat,
            enabled: true,
            ignore: false,
        }
    }

    #[inline(always)]
    pub const fn is_accepting(&self) -> bool {
        self.accepting
    }

    #[inline(always)]
    pub const fn turn_owner(&self) -> usize {
        self.turn_owner
    }

    #[inline(always)]
    pub const fn is_ignoring(&self) -> bool {
        self.ignore
    }

    pub fn set_turn_owner(&mut self, player: usize) {
        debug!("Turn passes to player {player}");
        self.turn_owner = player;
    }

    /// Battles take over input while disabled.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.accepting = false;
            self.held_this_window.clear();
        }
    }

    /// Drops all further input. Used once the scene is going away.
    pub fn ignore_input(&mut self) {
        self.ignore = true;
        self.accepting = false;
    }

    #[inline(always)]
    fn listening(&self) -> bool {
        self.enabled && !self.ignore
    }

    pub fn lanes_this_window(&self, player: usize) -> &[Lane] {
        self.held_this_window
            .get(&player)
            .map(|lanes| lanes.as_slice())
            .unwrap_or_default()
    }

    fn act_or_reject(
        &self,
        player: usize,
        kind: ActionKind,
        payload: ActionPayload,
        router: &mut MessageRouter,
    ) {
        if self.accepting && player == self.turn_owner {
            router.raise(Message::UnitAction {
                kind,
                player,
                payload,
            });
        } else {
            trace!("Player {player} {kind:?} rejected (owner {}, open {})", self.turn_owner, self.accepting);
            router.raise(Message::RejectAction {
                kind,
                player,
                turn_owner: self.turn_owner,
            });
        }
    }

    pub fn on_button_down(
        &mut self,
        player: usize,
        button: Button,
        held: &HeldInputs,
        router: &mut MessageRouter,
    ) {
        if !self.listening() {
            return;
        }
        match button {
            Button::Strum => {
                let payload = ActionPayload::Lane(held.most_recent(player));
                self.act_or_reject(player, ActionKind::Attack, payload, router);
            }
            Button::Dir(dir) => {
                let (dx, dy) = dir.grid_offset();
                self.act_or_reject(player, ActionKind::Move, ActionPayload::Offset { dx, dy }, router);
            }
            Button::Tilt if player == self.turn_owner => {
                router.raise(Message::UnitAction {
                    kind: ActionKind::Special,
                    player,
                    payload: ActionPayload::None,
                });
            }
            Button::Fret(lane) if self.accepting => {
                let lanes = self.held_this_window.entry(player).or_default();
                lanes.retain(|l| *l != lane);
                lanes.push(lane);
            }
            Button::Plus if player == self.turn_owner => {
                router.raise(Message::PauseGame { player });
            }
            _ => {}
        }
    }

    pub fn on_button_up(&mut self, player: usize, button: Button, router: &mut MessageRouter) {
        if !self.listening() || !self.accepting || player != self.turn_owner {
            return;
        }
        if let Button::Fret(lane) = button {
            router.raise(Message::UnitAction {
                kind: ActionKind::Select,
                player,
                payload: ActionPayload::Lane(Some(lane)),
            });
        }
    }

    pub fn on_enter_beat_window(&mut self) {
        if self.listening() {
            self.accepting = true;
        }
    }

    pub fn on_exit_beat_window(&mut self, router: &mut MessageRouter) {
        if self.accepting && self.switch_unit_on_end_beat
            && let Some(&lane) = self.lanes_this_window(self.turn_owner).last()
        {
            router.raise(Message::UnitAction {
                kind: ActionKind::Select,
                player: self.turn_owner,
                payload: ActionPayload::Lane(Some(lane)),
            });
        }
        self.held_this_window.clear();
        self.accepting = false;
    }

    /// One action per beat.
    #[inline(always)]
    pub fn on_unit_action(&mut self) {
        self.accepting = false;
    }

    pub fn handle(&mut self, msg: &Message, held: &HeldInputs, router: &mut MessageRouter) {
        match *msg {
            Message::ButtonDown { player, button } => self.on_button_down(player, button, held, router),
            Message::ButtonUp { player, button } => self.on_button_up(player, button, router),
            Message::EnterBeatWindow(_) => self.on_enter_beat_window(),
            Message::ExitBeatWindow(_) => self.on_exit_beat_window(router),
            Message::UnitAction { .. } => self.on_unit_action(),
            Message::SwitchPlayer { player } => self.set_turn_owner(player),
            Message::SceneChange => self.ignore_input(),
            _ => {}
        }
    }
}

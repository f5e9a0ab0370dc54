//! Per-scene context: held inputs, message routing and the two input
//! consumers (turn gate and battle manager).
//!
//! Each `tick` runs the battle update (until the scene closes), drains the message queue (handlers
//! may raise more messages; those are delivered first) and finally drops
//! handlers that were unsubscribed during the tick.

use log::{debug, info, trace};

use crate::config::Config;
use crate::core::events::{Message, MessageKinds, MessageRouter, Subscriber};
use crate::core::input::HeldInputs;
use crate::game::battle::{BattleManager, BattleSettings};
use crate::game::difficulty::{self, Difficulty};
use crate::game::gate::BeatWindowGate;
use crate::game::oracle::ChartOracle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Board turns; input goes through the beat-window gate.
    Turn,
    /// A rhythm battle owns input.
    Battle,
}

const GATE_KINDS: MessageKinds = MessageKinds::BUTTON_DOWN
    .union(MessageKinds::BUTTON_UP)
    .union(MessageKinds::ENTER_BEAT_WINDOW)
    .union(MessageKinds::EXIT_BEAT_WINDOW)
    .union(MessageKinds::UNIT_ACTION)
    .union(MessageKinds::SWITCH_PLAYER)
    .union(MessageKinds::SCENE_CHANGE);

const BATTLE_KINDS: MessageKinds = MessageKinds::BUTTON_DOWN
    .union(MessageKinds::BUTTON_UP)
    .union(MessageKinds::EXIT_BEAT_WINDOW)
    .union(MessageKinds::BEAT_CENTER)
    .union(MessageKinds::ENTER_BATTLE)
    .union(MessageKinds::SCENE_CHANGE)
    .union(MessageKinds::DIFFICULTY_CHANGE);

pub struct Session<O: ChartOracle> {
    oracle: O,
    router: MessageRouter,
    held: HeldInputs,
    gate: BeatWindowGate,
    battle: BattleManager,
    phase: Phase,
    scene_closed: bool,
    published: Vec<Message>,
}

impl<O: ChartOracle> Session<O> {
    pub fn new(oracle: O, cfg: &Config, first_player: usize) -> Self {
        let mut router = MessageRouter::new();
        router.add_handler(Subscriber::BeatWindowGate, GATE_KINDS);
        router.add_handler(Subscriber::BattleManager, BATTLE_KINDS);
        router.add_handler(Subscriber::DifficultySelect, MessageKinds::BUTTON_DOWN);
        Self {
            oracle,
            router,
            held: HeldInputs::new(),
            gate: BeatWindowGate::new(first_player, cfg.switch_unit_on_end_beat),
            battle: BattleManager::new(BattleSettings::from_config(cfg)),
            phase: Phase::Turn,
            scene_closed: false,
            published: Vec::new(),
        }
    }

    pub fn register_player(&mut self, player: usize, instrument: u32, difficulty: Difficulty) {
        self.battle.register_player(player, instrument, difficulty);
    }

    /// Queues an external message (input, clock, board) for the next tick.
    pub fn post(&mut self, msg: Message) {
        self.router.post(msg);
    }

    pub fn post_all(&mut self, msgs: impl IntoIterator<Item = Message>) {
        for msg in msgs {
            self.router.post(msg);
        }
    }

    pub fn tick(&mut self, dt: f32) {
        if !self.scene_closed {
            self.battle.update(dt, &mut self.oracle, &mut self.router);
        }
        while let Some(msg) = self.router.next() {
            self.dispatch(msg);
        }
        let removed = self.router.flush_removals();
        if removed > 0 {
            debug!("Dropped {removed} handler registrations");
        }
    }

    fn dispatch(&mut self, msg: Message) {
        if self.scene_closed && msg.is_input() {
            trace!("scene closed, dropping {msg:?}");
            return;
        }

        match msg {
            Message::ButtonDown { player, button } => {
                if let Some(lane) = button.lane() {
                    self.held.press(player, lane);
                }
            }
            Message::ButtonUp { player, button } => {
                if let Some(lane) = button.lane() {
                    self.held.release(player, lane);
                }
            }
            Message::EnterBattle { .. } => self.enter_phase(Phase::Battle),
            Message::ExitBattle { .. } => self.enter_phase(Phase::Turn),
            _ => {}
        }

        for subscriber in self.router.handlers_for(msg.kind()) {
            // A handler earlier in this loop may have unsubscribed the rest.
            if !self.router.is_subscribed(subscriber, msg.kind()) {
                continue;
            }
            match subscriber {
                Subscriber::BeatWindowGate => self.gate.handle(&msg, &self.held, &mut self.router),
                Subscriber::BattleManager => {
                    self.battle
                        .handle(&msg, &self.held, &mut self.oracle, &mut self.router);
                }
                Subscriber::DifficultySelect => {
                    if let Message::ButtonDown { player, button } = msg {
                        let current = self.battle.player_difficulty(player);
                        difficulty::on_button_down(player, button, current, &mut self.router);
                    }
                }
            }
        }

        if msg == Message::SceneChange {
            self.close_scene();
        }
        self.published.push(msg);
    }

    fn enter_phase(&mut self, phase: Phase) {
        if self.phase == phase {
            return;
        }
        debug!("Session phase {:?} -> {phase:?}", self.phase);
        self.phase = phase;
        self.gate.set_enabled(phase == Phase::Turn);
    }

    fn close_scene(&mut self) {
        self.scene_closed = true;
        self.held.clear();
        self.battle.abandon();
        self.router.remove_all_deferred();
        info!("Scene closing; input handlers released at end of tick");
    }

    /// Everything dispatched since the last call, in delivery order.
    pub fn drain_published(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.published)
    }

    #[inline(always)]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[inline(always)]
    pub const fn is_scene_closed(&self) -> bool {
        self.scene_closed
    }

    #[inline(always)]
    pub const fn oracle(&self) -> &O {
        &self.oracle
    }

    #[inline(always)]
    pub const fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    #[inline(always)]
    pub const fn held(&self) -> &HeldInputs {
        &self.held
    }

    #[inline(always)]
    pub const fn gate(&self) -> &BeatWindowGate {
        &self.gate
    }

    #[inline(always)]
    pub const fn battle(&self) -> &BattleManager {
        &self.battle
    }

    #[inline(always)]
    pub const fn router(&self) -> &MessageRouter {
        &self.router
    }
}

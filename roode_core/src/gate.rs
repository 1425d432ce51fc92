//! Crossing-direction state machine over the two presence bits.
//!
//! A person entering the room is seen by the corridor sensor first, then by
//! both, then by the room sensor alone. Leaving is the mirror image. The engine
//! remembers the direction implied by the first single-sensor state of a
//! sequence and confirms it when the opposite single state (or a clear out of
//! `Both`) follows.

use roode_traits::{Channel, RangeFinder, Transmitter};

use crate::publish::{send, send_labeled, wire_value};
use crate::sensor::RangeSensor;

/// Presence bits for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresenceSample {
    pub room: bool,
    pub corridor: bool,
}

impl PresenceSample {
    pub fn new(room: bool, corridor: bool) -> Self {
        Self { room, corridor }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    #[default]
    Empty,
    RoomOnly,
    CorridorOnly,
    Both,
}

impl From<PresenceSample> for GateState {
    fn from(s: PresenceSample) -> Self {
        match (s.room, s.corridor) {
            (false, false) => GateState::Empty,
            (true, false) => GateState::RoomOnly,
            (false, true) => GateState::CorridorOnly,
            (true, true) => GateState::Both,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Entering,
    Leaving,
}

impl Direction {
    fn reverse(self) -> Self {
        match self {
            Direction::Entering => Direction::Leaving,
            Direction::Leaving => Direction::Entering,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchState {
    #[default]
    Off,
    On,
}

/// A confirmed traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    pub direction: Direction,
    /// Counter value after the crossing.
    pub count: u32,
    /// Set when the crossing flipped the room switch.
    pub switch: Option<SwitchState>,
}

/// Result of one `GateEngine::step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Unchanged,
    Moved(GateState),
    Crossed(Crossing),
    /// A sensor is in timeout; the engine is frozen at `Empty`.
    Suspended,
}

#[derive(Debug, Default)]
pub struct GateEngine {
    state: GateState,
    pending: Option<Direction>,
    count: u32,
}

impl GateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn pending(&self) -> Option<Direction> {
        self.pending
    }

    pub fn switch_state(&self) -> SwitchState {
        if self.count > 0 {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }

    /// Back to the power-on state: empty doorway, nobody in the room.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feed one presence sample through the state machine.
    pub fn advance(&mut self, sample: PresenceSample) -> Option<Crossing> {
        use GateState::*;

        let prev = self.state;
        let next = GateState::from(sample);
        if prev == next {
            return None;
        }

        let mut crossing = None;
        match (prev, next) {
            (Empty, CorridorOnly) => self.pending = Some(Direction::Entering),
            (Empty, RoomOnly) => self.pending = Some(Direction::Leaving),
            (Empty, Both) => {
                tracing::debug!("both sensors triggered at once, direction unknown");
                self.pending = None;
            }
            (CorridorOnly | RoomOnly, Both) => {}
            (CorridorOnly, RoomOnly) | (RoomOnly, CorridorOnly) => {
                tracing::debug!(from = ?prev, to = ?next, "presence jumped sides, restarting sequence");
                self.pending = Some(if next == CorridorOnly {
                    Direction::Entering
                } else {
                    Direction::Leaving
                });
            }
            (CorridorOnly | RoomOnly, Empty) => {
                if let Some(d) = self.pending.take() {
                    tracing::debug!(direction = ?d, "sequence abandoned");
                }
            }
            (Both, RoomOnly) => {
                if self.pending == Some(Direction::Entering) {
                    crossing = Some(self.confirm(Direction::Entering));
                }
            }
            (Both, CorridorOnly) => {
                if self.pending == Some(Direction::Leaving) {
                    crossing = Some(self.confirm(Direction::Leaving));
                }
            }
            (Both, Empty) => match self.pending.take() {
                Some(d) => {
                    crossing = Some(self.confirm(d));
                    // `confirm` re-arms the reverse direction. After a clear
                    // nobody is left in the doorway to step back.
                    self.pending = None;
                }
                None => tracing::warn!("simultaneous clear without a pending direction, discarded"),
            },
            _ => {}
        }

        tracing::debug!(from = ?prev, to = ?next, pending = ?self.pending, "gate transition");
        self.state = next;
        crossing
    }

    fn confirm(&mut self, direction: Direction) -> Crossing {
        let before = self.count;
        self.count = match direction {
            Direction::Entering => before.saturating_add(1),
            Direction::Leaving => before.saturating_sub(1),
        };
        if direction == Direction::Leaving && before == 0 {
            tracing::debug!("leaving crossing with an empty room, counter stays at 0");
        }
        // A person standing in the doorway after a crossing may step back.
        self.pending = Some(direction.reverse());

        let switch = match (before, self.count) {
            (0, n) if n > 0 => Some(SwitchState::On),
            (b, 0) if b > 0 => Some(SwitchState::Off),
            _ => None,
        };
        tracing::info!(?direction, count = self.count, ?switch, "crossing");
        Crossing {
            direction,
            count: self.count,
            switch,
        }
    }

    /// Drop any half-finished sequence and sit at `Empty`.
    fn suspend(&mut self) {
        if self.state != GateState::Empty || self.pending.is_some() {
            tracing::debug!(state = ?self.state, pending = ?self.pending, "sensor timeout, sequence flushed");
        }
        self.state = GateState::Empty;
        self.pending = None;
    }

    /// Read both sensors (room first), advance and publish any crossing.
    pub fn step<A, B, T>(
        &mut self,
        room: &mut RangeSensor<A>,
        corridor: &mut RangeSensor<B>,
        tx: &mut T,
    ) -> StepOutcome
    where
        A: RangeFinder,
        B: RangeFinder,
        T: Transmitter + ?Sized,
    {
        room.read();
        corridor.read();
        if room.timeout_occurred() || corridor.timeout_occurred() {
            self.suspend();
            return StepOutcome::Suspended;
        }

        let prev = self.state;
        let sample = PresenceSample::new(room.is_present(), corridor.is_present());
        match self.advance(sample) {
            Some(c) => {
                publish_crossing(tx, &c);
                StepOutcome::Crossed(c)
            }
            None if self.state != prev => StepOutcome::Moved(self.state),
            None => StepOutcome::Unchanged,
        }
    }
}

fn publish_crossing<T: Transmitter + ?Sized>(tx: &mut T, c: &Crossing) {
    send(tx, Channel::PeopleCounter, wire_value(c.count));
    match c.switch {
        Some(SwitchState::On) => send_labeled(tx, Channel::RoomSwitch, 1, "On"),
        Some(SwitchState::Off) => send_labeled(tx, Channel::RoomSwitch, 0, "Off"),
        None => {}
    }
}

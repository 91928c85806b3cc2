//! Startup latches. Inbound navigation is resolved exactly once, after the
//! metadata, the controller, the filter surface and the leading ledger have
//! all reported in, in whatever order they finish.

use bitflags::bitflags;
use crossbeam_channel::{Receiver, Sender};

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Readiness: u8 {
        const METADATA = 0b0001;
        const CONTROLLER = 0b0010;
        const FILTER_SURFACE = 0b0100;
        const LEADING_LEDGER = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Still waiting for the listed latches.
    Waiting(Readiness),
    /// This latch was the last one; resolution may run now.
    Opened,
    AlreadyOpen,
}

/// One-way latches combined by a single gate check.
#[derive(Debug, Clone, Default)]
pub struct ReadinessGate {
    latched: Readiness,
    opened: bool,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a latch and re-checks the gate. Latches never reset, and the
    /// gate reports `Opened` only once.
    pub fn latch(&mut self, flag: Readiness) -> GateState {
        if self.opened {
            return GateState::AlreadyOpen;
        }
        self.latched |= flag;
        if self.latched.is_all() {
            self.opened = true;
            tracing::info!("startup gate open");
            GateState::Opened
        } else {
            tracing::debug!(latched = ?self.latched, "startup latch set");
            GateState::Waiting(self.missing())
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    pub fn missing(&self) -> Readiness {
        Readiness::all() - self.latched
    }
}

/// Sending half handed to whatever completes a precondition.
#[derive(Debug, Clone)]
pub struct ReadinessSender {
    tx: Sender<Readiness>,
}

impl ReadinessSender {
    /// Returns false once the barrier is gone.
    pub fn signal(&self, flag: Readiness) -> bool {
        self.tx.send(flag).is_ok()
    }
}

/// Collects latch events from any thread and feeds them to one gate.
#[derive(Debug)]
pub struct StartupBarrier {
    gate: ReadinessGate,
    tx: Sender<Readiness>,
    rx: Receiver<Readiness>,
}

impl Default for StartupBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl StartupBarrier {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            gate: ReadinessGate::new(),
            tx,
            rx,
        }
    }

    pub fn sender(&self) -> ReadinessSender {
        ReadinessSender {
            tx: self.tx.clone(),
        }
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    /// Latches directly on the owning thread.
    pub fn latch(&mut self, flag: Readiness) -> GateState {
        self.gate.latch(flag)
    }

    /// Consumes queued events without blocking.
    pub fn drain(&mut self) -> GateState {
        let mut state = if self.gate.is_open() {
            GateState::AlreadyOpen
        } else {
            GateState::Waiting(self.gate.missing())
        };
        while let Ok(flag) = self.rx.try_recv() {
            match self.gate.latch(flag) {
                GateState::AlreadyOpen => {}
                other => state = other,
            }
        }
        state
    }
}

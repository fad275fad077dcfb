// Shared set-point state between the bus message router and the control
// tick.
//
// The router writes from the bus-receive context, the tick reads from the
// control schedule; every field is an individual atomic with sequentially
// consistent ordering, so a reader can never observe a torn multi-byte
// reference value. Mode changes land here and take effect at the next tick
// boundary, never mid-tick.

use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};

/// Control state machine modes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerMode {
    #[default]
    Idle = 0,
    CurrentControl = 1,
    PositionControl = 2,
}

impl ControllerMode {
    pub fn from_raw(raw: u8) -> Option<ControllerMode> {
        match raw {
            0 => Some(ControllerMode::Idle),
            1 => Some(ControllerMode::CurrentControl),
            2 => Some(ControllerMode::PositionControl),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u8 {
        self as u8
    }
}

/// Mode plus current/position references, shared by `Arc`.
#[derive(Debug, Default)]
pub struct SetpointState {
    mode: AtomicU8,
    current_ref_ma: AtomicI32,
    position_ref: AtomicI32,
}

impl SetpointState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ControllerMode {
        // The raw byte only ever comes from `set_mode`, so it is always a
        // valid mode code.
        ControllerMode::from_raw(self.mode.load(Ordering::SeqCst))
            .unwrap_or(ControllerMode::Idle)
    }

    pub fn set_mode(&self, mode: ControllerMode) {
        self.mode.store(mode.as_raw(), Ordering::SeqCst);
    }

    pub fn current_ref_ma(&self) -> i16 {
        self.current_ref_ma.load(Ordering::SeqCst) as i16
    }

    pub fn set_current_ref_ma(&self, value: i16) {
        self.current_ref_ma.store(value as i32, Ordering::SeqCst);
    }

    pub fn position_ref(&self) -> i32 {
        self.position_ref.load(Ordering::SeqCst)
    }

    pub fn set_position_ref(&self, value: i32) {
        self.position_ref.store(value, Ordering::SeqCst);
    }
}

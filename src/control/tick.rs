// Fixed-period control state machine for the drive node.
//
// Each tick reads the shared mode exactly once, decides what to command
// (pure), then performs the drive IO (dispatch). Keeping the transition
// logic free of IO makes the mode machine testable on its own and
// guarantees a mode change is only ever observed whole, at a tick boundary.

use std::io::{Read, Write};

use tracing::{error, warn};

use crate::motor::{CopleyDrive, DriveMode, ProtocolError};

use super::state::{ControllerMode, SetpointState};

/// Cyclic reference currents stepped through in current-control mode (mA).
pub const CURRENT_TABLE: [i16; 4] = [0, 200, 0, 200];

/// What one tick decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Nothing to command this tick.
    Hold,
    /// Command a reference current over the drive link.
    SetCurrent(i16),
    /// Command a trajectory position over the drive link.
    CommandPosition(i32),
}

/// One tick's full plan: an optional drive mode switch, then the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    pub mode_switch: Option<DriveMode>,
    pub action: TickAction,
}

/// How a tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Dispatch succeeded (or there was nothing to dispatch).
    Ok,
    /// Dispatch failed; the failure was counted.
    Failed,
    /// Dispatch failed and the failure threshold was reached: the machine
    /// forced the shared mode back to Idle.
    EscalatedToIdle,
}

/// Mode-driven set-point generator.
pub struct ControlTick {
    table_index: usize,
    last_mode: Option<ControllerMode>,
    consecutive_errors: u32,
    max_consecutive_errors: u32,
}

impl ControlTick {
    pub fn new(max_consecutive_errors: u32) -> Self {
        Self {
            table_index: 0,
            last_mode: None,
            consecutive_errors: 0,
            max_consecutive_errors,
        }
    }

    /// Run one tick against the shared state and the drive.
    pub fn run<P: Read + Write>(
        &mut self,
        state: &SetpointState,
        drive: &mut CopleyDrive<P>,
    ) -> TickOutcome {
        let mode = state.mode();
        let plan = self.plan(mode, state);

        match dispatch(&plan, drive) {
            Ok(()) => {
                self.consecutive_errors = 0;
                TickOutcome::Ok
            }
            Err(e) => {
                self.consecutive_errors += 1;
                warn!(
                    "drive dispatch failed ({} consecutive): {}",
                    self.consecutive_errors, e
                );
                if self.consecutive_errors >= self.max_consecutive_errors {
                    error!(
                        "{} consecutive drive failures, escalating to Idle",
                        self.consecutive_errors
                    );
                    state.set_mode(ControllerMode::Idle);
                    self.consecutive_errors = 0;
                    TickOutcome::EscalatedToIdle
                } else {
                    TickOutcome::Failed
                }
            }
        }
    }

    /// Pure transition: decide this tick's plan for the observed mode.
    ///
    /// The table index deliberately survives mode changes, so re-entering
    /// current control resumes the cycle where it left off.
    pub fn plan(&mut self, mode: ControllerMode, state: &SetpointState) -> TickPlan {
        let entering = self.last_mode != Some(mode);
        self.last_mode = Some(mode);

        match mode {
            ControllerMode::Idle => {
                state.set_current_ref_ma(0);
                state.set_position_ref(0);
                let action = if entering {
                    // Quiesce the drive once on entry; steady idle commands
                    // nothing.
                    TickAction::SetCurrent(0)
                } else {
                    TickAction::Hold
                };
                TickPlan {
                    mode_switch: None,
                    action,
                }
            }
            ControllerMode::CurrentControl => {
                let value = CURRENT_TABLE[self.table_index];
                self.table_index = (self.table_index + 1) % CURRENT_TABLE.len();
                state.set_current_ref_ma(value);
                TickPlan {
                    mode_switch: entering.then_some(DriveMode::Current),
                    action: TickAction::SetCurrent(value),
                }
            }
            ControllerMode::PositionControl => TickPlan {
                mode_switch: entering.then_some(DriveMode::Position),
                action: TickAction::CommandPosition(state.position_ref()),
            },
        }
    }
}

/// Perform the drive IO a plan calls for.
fn dispatch<P: Read + Write>(
    plan: &TickPlan,
    drive: &mut CopleyDrive<P>,
) -> Result<(), ProtocolError> {
    if let Some(mode) = plan.mode_switch {
        drive.set_mode(mode)?;
    }
    match plan.action {
        TickAction::Hold => Ok(()),
        TickAction::SetCurrent(value) => drive.set_current_ma(value),
        TickAction::CommandPosition(position) => drive.command_position(position),
    }
}

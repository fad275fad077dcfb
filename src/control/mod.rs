// Control context for the drive node.
//
// Provides:
// - Shared mode/set-point state (router writes, tick reads)
// - Inbound bus frame router
// - Fixed-period control tick state machine and its loop

pub mod router;
pub mod state;
pub mod tick;

pub use router::route_frame;
pub use state::{ControllerMode, SetpointState};
pub use tick::{ControlTick, TickAction, TickOutcome, CURRENT_TABLE};

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::bridge::PeriodicScheduler;
use crate::bus::{BusError, BusRx};
use crate::motor::CopleyDrive;

/// Cap on frames routed per tick, so a chatty bus cannot starve the
/// dispatch deadline.
const MAX_ROUTE_PER_TICK: usize = 16;

/// Control loop timing and error policy.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Tick period; shorter than the bridge periods, this context runs the
    /// tightest schedule in the process.
    pub period: Duration,
    /// Consecutive dispatch failures tolerated before forcing Idle.
    pub max_consecutive_errors: u32,
}

/// Counters owned by the control loop.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ControlStats {
    pub ticks: u64,
    pub routed_frames: u64,
    pub dispatch_errors: u64,
    pub idle_escalations: u64,
    pub bus_errors: u64,
}

/// Run the router and control tick until `stop` is raised.
///
/// Each cycle drains pending bus frames into the shared state (bounded by
/// the receive timeout and a per-tick cap), then runs one tick. On the way
/// out the drive is commanded to zero current; cleanup errors are ignored.
pub fn control_loop<R, P>(
    mut rx: R,
    mut drive: CopleyDrive<P>,
    state: Arc<SetpointState>,
    stop: Arc<AtomicBool>,
    config: ControlConfig,
) -> ControlStats
where
    R: BusRx,
    P: Read + Write,
{
    let mut stats = ControlStats::default();
    let mut tick = ControlTick::new(config.max_consecutive_errors);
    let mut scheduler = PeriodicScheduler::start(config.period);

    while !stop.load(Ordering::Acquire) {
        for _ in 0..MAX_ROUTE_PER_TICK {
            match rx.recv() {
                Ok(frame) => {
                    if route_frame(&state, &frame) {
                        stats.routed_frames += 1;
                    }
                }
                Err(BusError::Timeout) => break,
                Err(e) => {
                    warn!("bus receive error in control loop: {}", e);
                    stats.bus_errors += 1;
                    break;
                }
            }
        }

        match tick.run(&state, &mut drive) {
            TickOutcome::Ok => {}
            TickOutcome::Failed => stats.dispatch_errors += 1,
            TickOutcome::EscalatedToIdle => {
                stats.dispatch_errors += 1;
                stats.idle_escalations += 1;
            }
        }
        stats.ticks += 1;

        scheduler.wait_next();
    }

    // Leave the drive quiescent; ignore errors on cleanup.
    let _ = drive.set_current_ma(0);

    debug!(
        "control loop done: ticks={} routed={} errors={}",
        stats.ticks, stats.routed_frames, stats.dispatch_errors
    );
    stats
}

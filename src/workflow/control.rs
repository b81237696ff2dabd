//! Control channel between a workflow handle and its running task.

use std::time::Duration;
use tokio::sync::watch;

/// Requests raised against a running workflow.
///
/// Flags only ever go from `false` to `true` during the life of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    /// Finish the current cycle, then stop.
    pub stop: bool,
    /// Stop at the next suspension point.
    pub cancel: bool,
    /// Process is going down; leave durable state as is.
    pub shutdown: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Stop,
    Cancel,
    Shutdown,
}

impl ControlState {
    /// Interrupt honoured between cycles (before starting one, or while sleeping).
    pub fn between_cycles(&self) -> Option<Interrupt> {
        if self.cancel {
            Some(Interrupt::Cancel)
        } else if self.stop {
            Some(Interrupt::Stop)
        } else if self.shutdown {
            Some(Interrupt::Shutdown)
        } else {
            None
        }
    }

    /// Interrupt honoured inside a cycle. A stop request lets the cycle finish.
    pub fn within_cycle(&self) -> Option<Interrupt> {
        if self.cancel {
            Some(Interrupt::Cancel)
        } else if self.shutdown {
            Some(Interrupt::Shutdown)
        } else {
            None
        }
    }
}

pub type ControlSender = watch::Sender<ControlState>;
pub type ControlReceiver = watch::Receiver<ControlState>;

pub fn channel(initial: ControlState) -> (ControlSender, ControlReceiver) {
    watch::channel(initial)
}

/// Sleep for `duration` unless `wakes` matches the control state first.
///
/// Returns `true` when the full duration elapsed.
pub async fn sleep_unless<F>(control: &mut ControlReceiver, duration: Duration, wakes: F) -> bool
where
    F: Fn(&ControlState) -> bool,
{
    let current = *control.borrow_and_update();
    if wakes(&current) {
        return false;
    }

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = control.changed() => {
                if changed.is_err() {
                    // Sender gone; nothing can interrupt us any more.
                    (&mut sleep).await;
                    return true;
                }
                let current = *control.borrow_and_update();
                if wakes(&current) {
                    return false;
                }
            }
        }
    }
}

//! Merge Scheduler — the single-flight run loop: rerun coalescing,
//! timer-based deferred wakeups, and error backoff.
//!
//! A process-wide singleton, constructed once at startup and never
//! destroyed, that coalesces concurrent triggers into at most one pending
//! rerun and arms a timer for the next scan.

use crate::config::Config;
use crate::gateway::Gateway;
use crate::step::{self, StepOutcome};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

const ERROR_BACKOFF: Duration = Duration::from_secs(600);

#[derive(Default)]
struct State {
    running: bool,
    rerun_requested: bool,
    timer: Option<JoinHandle<()>>,
}

pub struct Scheduler {
    gateway: Arc<dyn Gateway>,
    config: Config,
    state: Mutex<State>,
    /// Signaled when the Step hits a non-recoverable error and the HTTP
    /// listener should stop accepting webhook events until the backoff
    /// elapses.
    listener_close: Notify,
}

impl Scheduler {
    pub fn new(gateway: Arc<dyn Gateway>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            config,
            state: Mutex::new(State::default()),
            listener_close: Notify::new(),
        })
    }

    pub fn listener_close(&self) -> &Notify {
        &self.listener_close
    }

    /// Runs PR Step to completion, coalescing concurrent calls into a single
    /// pending rerun.
    pub async fn run(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap();
            if state.running {
                state.rerun_requested = true;
                return;
            }
            state.running = true;
        }

        loop {
            {
                let mut state = self.state.lock().unwrap();
                state.rerun_requested = false;
                if let Some(timer) = state.timer.take() {
                    timer.abort();
                }
            }

            match step::run(self.gateway.as_ref(), &self.config).await {
                Ok(outcome) => {
                    let rerun_requested = self.state.lock().unwrap().rerun_requested;
                    if !rerun_requested {
                        if let StepOutcome::Idle(Some(delay)) = outcome {
                            self.arm_timer(delay);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "PR step failed, backing off");
                    self.state.lock().unwrap().rerun_requested = true;
                    self.listener_close.notify_one();
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }

            let should_exit = !self.state.lock().unwrap().rerun_requested;
            if should_exit {
                break;
            }
        }

        self.state.lock().unwrap().running = false;
    }

    fn arm_timer(self: &Arc<Self>, delay: Duration) {
        let mut state = self.state.lock().unwrap();
        assert!(
            state.timer.is_none(),
            "bug: arming a scan timer while one is already pending"
        );
        let scheduler = Arc::clone(self);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Clear the handle before waking the scheduler: `run`'s loop
            // start aborts whatever timer is pending, and this task is that
            // timer. Leaving the handle in place would have `run` abort its
            // own task out from under itself at its first suspension point.
            scheduler.state.lock().unwrap().timer = None;
            scheduler.run().await;
        }));
    }
}

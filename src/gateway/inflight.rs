//! Per-version fill coordination
//!
//! The first caller to ask for an uncached version becomes the leader and
//! performs the fill; every later caller for the same key follows and
//! receives the leader's outcome. The registry entry is retired when the
//! leader completes or its future is dropped, whichever comes first.
//!
//! A leader dropped before completing also cancels its token, so work the
//! fill handed to other tasks stops instead of running on unobserved.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::gateway::GatewayError;

/// Result of one fill: the populated version directory
pub type FillOutcome = Result<PathBuf, GatewayError>;

type Fills = HashMap<String, watch::Receiver<Option<FillOutcome>>>;

#[derive(Clone, Default)]
pub struct InFlight {
    fills: Arc<Mutex<Fills>>,
}

pub enum Slot {
    Leader(FillGuard),
    Follower(Follower),
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `key`
    pub fn join(&self, key: &str) -> Slot {
        let mut fills = self.lock();

        if let Some(rx) = fills.get(key) {
            return Slot::Follower(Follower { rx: rx.clone() });
        }

        let (tx, rx) = watch::channel(None);
        fills.insert(key.to_string(), rx);

        Slot::Leader(FillGuard {
            key: key.to_string(),
            tx,
            fills: Arc::clone(&self.fills),
            cancel: CancellationToken::new(),
            retired: false,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> MutexGuard<'_, Fills> {
        self.fills.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held by the caller performing a fill
pub struct FillGuard {
    key: String,
    tx: watch::Sender<Option<FillOutcome>>,
    fills: Arc<Mutex<Fills>>,
    cancel: CancellationToken,
    retired: bool,
}

impl FillGuard {
    /// Token cancelled if this guard is dropped without completing
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Publish the outcome to every follower and retire the entry
    pub fn complete(mut self, outcome: FillOutcome) {
        self.retire();
        self.tx.send_replace(Some(outcome));
    }

    fn retire(&mut self) {
        if self.retired {
            return;
        }
        self.fills
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        self.retired = true;
    }
}

impl Drop for FillGuard {
    fn drop(&mut self) {
        if !self.retired {
            warn!("Fill for {} abandoned before completing", self.key);
            self.cancel.cancel();
        }
        // the sender drops right after, which wakes followers with Aborted
        self.retire();
    }
}

pub struct Follower {
    rx: watch::Receiver<Option<FillOutcome>>,
}

impl Follower {
    /// Wait for the leader's outcome
    pub async fn wait(mut self) -> FillOutcome {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| {
            debug!("Leader went away without an outcome");
            Err(GatewayError::Aborted)
        })
    }
}

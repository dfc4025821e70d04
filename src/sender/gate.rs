//! One-shot first-send delay
//!
//! Freshly started subscribers need a moment to dial in before anything is
//! published. The first send of any sender sharing the gate waits out the
//! grace period; concurrent first sends wait on the same cell and every later
//! send passes straight through.

use std::time::Duration;

use tokio::sync::OnceCell;

/// Shared by every topic sender of an admin
#[derive(Debug)]
pub struct FirstSendGate {
    delay: Duration,
    opened: OnceCell<()>,
}

impl FirstSendGate {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            opened: OnceCell::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened.initialized()
    }

    /// Wait until the grace period is over
    pub async fn wait(&self) {
        let delay = self.delay;
        self.opened
            .get_or_init(|| async move {
                if !delay.is_zero() {
                    tracing::info!(
                        delay_ms = delay.as_millis() as u64,
                        "Delaying first send for late joiners"
                    );
                    tokio::time::sleep(delay).await;
                }
            })
            .await;
    }
}

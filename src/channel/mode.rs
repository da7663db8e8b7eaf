use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    #[default]
    Idle,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum LinkState {
    Connecting,
    Connected,
    #[serde(rename_all = "camelCase")]
    Reconnecting { attempt: u32, retry_in_ms: u64 },
    Closed,
}

/// What readers see: the last pushed mode plus whether the link behind it is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeSnapshot {
    pub mode: Mode,
    pub link: LinkState,
}

impl ModeSnapshot {
    /// The mode may be out of date because the channel is not connected.
    pub fn is_stale(&self) -> bool {
        !matches!(self.link, LinkState::Connected)
    }
}

/// The single writer of the process-wide mode. Deliberately not `Clone`.
pub struct ModePublisher {
    tx: watch::Sender<ModeSnapshot>,
}

impl ModePublisher {
    pub fn new() -> (Self, ModeReader) {
        let (tx, rx) = watch::channel(ModeSnapshot {
            mode: Mode::Idle,
            link: LinkState::Connecting,
        });
        (Self { tx }, ModeReader { rx })
    }

    /// Returns true when the mode actually changed.
    pub fn set_mode(&self, mode: Mode) -> bool {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.mode == mode {
                return false;
            }
            snapshot.mode = mode;
            true
        })
    }

    pub fn set_link(&self, link: LinkState) {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.link == link {
                return false;
            }
            snapshot.link = link;
            true
        });
    }

    /// A fresh connection starts over at `Idle`; mode and link change in one update.
    /// Returns true when the mode was reset.
    pub fn connected(&self) -> bool {
        let mut reset = false;
        self.tx.send_if_modified(|snapshot| {
            let next = ModeSnapshot {
                mode: Mode::Idle,
                link: LinkState::Connected,
            };
            if *snapshot == next {
                return false;
            }
            reset = snapshot.mode != Mode::Idle;
            *snapshot = next;
            true
        });
        reset
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        *self.tx.borrow()
    }
}

/// Cloneable read side; hands out per-screen subscriptions.
#[derive(Clone)]
pub struct ModeReader {
    rx: watch::Receiver<ModeSnapshot>,
}

impl ModeReader {
    pub fn snapshot(&self) -> ModeSnapshot {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> ModeSubscription {
        let mut rx = self.rx.clone();
        rx.borrow_and_update();
        ModeSubscription { rx }
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct ModeSubscription {
    rx: watch::Receiver<ModeSnapshot>,
}

impl ModeSubscription {
    pub fn current(&self) -> ModeSnapshot {
        *self.rx.borrow()
    }

    /// Wait for the next change; `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<ModeSnapshot> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::{Mode, ModeReader, ModeSnapshot};
use crate::config::KioskConfig;
use crate::db::VisitStatus;
use crate::device::CameraLease;
use crate::gate::ScreenScope;

use super::screens::{build_screen, ScreenController};
use super::{
    Capabilities, FlowSnapshot, Journal, NavRequest, Navigator, Screen, ScreenBoard,
    ScreenContext, Session, UserInput,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

struct Mounted {
    screen: Screen,
    session: Session,
    scope: ScreenScope,
    controller: Box<dyn ScreenController>,
}

/// Drives the screen sequence. Exactly one screen is mounted at a time and a
/// screen is always fully torn down before the next one mounts.
pub struct FlowController {
    capabilities: Capabilities,
    config: Arc<KioskConfig>,
    lease: CameraLease,
    journal: Journal,
    modes: ModeReader,
    last_mode: Mode,
    snapshots: Arc<watch::Sender<FlowSnapshot>>,
    nav_tx: mpsc::UnboundedSender<NavRequest>,
    nav_rx: mpsc::UnboundedReceiver<NavRequest>,
    current: Option<Mounted>,
}

impl FlowController {
    pub fn new(
        capabilities: Capabilities,
        config: KioskConfig,
        modes: ModeReader,
        journal: Journal,
    ) -> Self {
        let (nav_tx, nav_rx) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(FlowSnapshot::blank());
        Self {
            capabilities,
            config: Arc::new(config),
            lease: CameraLease::new(),
            journal,
            modes,
            last_mode: Mode::Idle,
            snapshots: Arc::new(snapshots),
            nav_tx,
            nav_rx,
            current: None,
        }
    }

    /// Use a lease shared with other camera users in the process.
    pub fn with_lease(mut self, lease: CameraLease) -> Self {
        self.lease = lease;
        self
    }

    pub fn spawn(self) -> FlowHandle {
        let snapshots = self.snapshots.subscribe();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(self.run(input_rx, cancel_token.clone()));

        FlowHandle {
            snapshots,
            input: input_tx,
            cancel_token,
            handle: Some(handle),
        }
    }

    async fn run(
        mut self,
        mut input_rx: mpsc::UnboundedReceiver<UserInput>,
        cancel_token: CancellationToken,
    ) {
        let mut modes = self.modes.subscribe();
        let mut modes_open = true;
        let mut inputs_open = true;

        self.last_mode = self.modes.snapshot().mode;
        let start = match self.last_mode {
            Mode::Active => Screen::QrScan,
            Mode::Idle => Screen::Idle,
        };
        self.mount(start).await;

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    log_info!("flow controller shutting down");
                    break;
                }
                Some(request) = self.nav_rx.recv() => self.on_navigation(request).await,
                changed = modes.changed(), if modes_open => match changed {
                    Some(snapshot) => self.on_mode(snapshot).await,
                    None => {
                        log_warn!("mode publisher gone; screens no longer follow push mode");
                        modes_open = false;
                    }
                },
                input = input_rx.recv(), if inputs_open => match input {
                    Some(input) => self.on_input(input).await,
                    None => inputs_open = false,
                },
            }
        }

        self.unmount(VisitStatus::Interrupted).await;
    }

    async fn on_navigation(&mut self, request: NavRequest) {
        let current_id = self.current.as_ref().map(|mounted| mounted.session.id);
        if current_id != Some(request.from) {
            log_debug!(
                "dropping stale navigation to {} from session {}",
                request.to.name(),
                request.from
            );
            return;
        }
        self.transition(request.to, VisitStatus::Completed).await;
    }

    /// Only a change of mode moves screens; link-state updates just refresh the snapshot.
    async fn on_mode(&mut self, snapshot: ModeSnapshot) {
        self.snapshots.send_modify(|shown| shown.channel = snapshot);
        if snapshot.mode == self.last_mode {
            return;
        }
        self.last_mode = snapshot.mode;

        let on_screen = self.current.as_ref().map(|mounted| mounted.screen.clone());

        match (snapshot.mode, on_screen) {
            (Mode::Active, Some(Screen::Idle)) => {
                log_info!("push mode active; jumping to scan");
                self.transition(Screen::QrScan, VisitStatus::Interrupted).await;
            }
            (Mode::Idle, Some(screen)) if screen != Screen::Idle => {
                log_info!("push mode idle; returning from {}", screen.name());
                self.transition(Screen::Idle, VisitStatus::Interrupted).await;
            }
            _ => {}
        }
    }

    async fn on_input(&mut self, input: UserInput) {
        match input {
            UserInput::Retry => {
                if let Some(screen) = self.current.as_ref().map(|mounted| mounted.screen.clone()) {
                    log_info!("remounting {}", screen.name());
                    self.transition(screen, VisitStatus::Interrupted).await;
                }
            }
            other => {
                if let Some(mounted) = self.current.as_mut() {
                    mounted.controller.handle_input(other).await;
                }
            }
        }
    }

    async fn transition(&mut self, to: Screen, outcome: VisitStatus) {
        self.unmount(outcome).await;
        self.mount(to).await;
    }

    async fn mount(&mut self, screen: Screen) {
        let session = Session::start();
        let scope = ScreenScope::new();
        let channel = self.modes.snapshot();

        self.snapshots
            .send_replace(FlowSnapshot::mounting(screen.clone(), session.id, channel));
        self.journal.visit_started(&session, &screen).await;

        let context = ScreenContext {
            session: session.clone(),
            scope: scope.clone(),
            navigator: Navigator::new(self.nav_tx.clone(), session.id, scope.clone()),
            board: ScreenBoard::new(self.snapshots.clone(), session.id, scope.clone()),
            capabilities: self.capabilities.clone(),
            config: self.config.clone(),
            lease: self.lease.clone(),
            journal: self.journal.clone(),
        };

        let mut controller = build_screen(&screen, context);
        log_info!("mounting {} (session {})", screen.name(), session.id);
        if let Err(err) = controller.mount().await {
            log_warn!("{} failed to mount: {err:#}", screen.name());
        }

        self.current = Some(Mounted {
            screen,
            session,
            scope,
            controller,
        });
    }

    async fn unmount(&mut self, outcome: VisitStatus) {
        let Some(mut mounted) = self.current.take() else {
            return;
        };

        mounted.controller.unmount().await;
        mounted.scope.close();
        mounted.session.end();
        self.journal.visit_ended(&mounted.session, outcome).await;
        log_debug!("unmounted {} (session {})", mounted.screen.name(), mounted.session.id);
    }
}

/// Renderer-side handle: read snapshots, send input, stop the flow.
pub struct FlowHandle {
    snapshots: watch::Receiver<FlowSnapshot>,
    input: mpsc::UnboundedSender<UserInput>,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl FlowHandle {
    pub fn snapshots(&self) -> watch::Receiver<FlowSnapshot> {
        self.snapshots.clone()
    }

    pub fn current(&self) -> FlowSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn send(&self, input: UserInput) -> bool {
        self.input.send(input).is_ok()
    }

    /// Unmount the current screen and stop. Safe to call twice.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await.context("flow controller task failed to join")?;
        }
        Ok(())
    }
}

impl Drop for FlowHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

pub mod api;
pub mod channel;
pub mod config;
pub mod db;
pub mod detection;
pub mod device;
pub mod flow;
pub mod gate;
pub mod scan;
pub mod utils;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;
use tokio::sync::{broadcast, watch};

use channel::{EventChannel, ModeReader, PatientLookup, PushTransport, WsTransport};
use config::{ConfigStore, KioskConfig};
use db::Database;
use flow::{FlowController, FlowHandle, FlowSnapshot, Journal, UserInput};

pub use flow::Capabilities;

const CONFIG_FILE: &str = "config.json";
const JOURNAL_FILE: &str = "journal.sqlite3";

/// A running kiosk: the push channel plus the screen flow reading from it.
pub struct KioskRuntime {
    channel: EventChannel,
    flow: FlowHandle,
    journal: Option<Database>,
}

impl KioskRuntime {
    /// Boot from a data directory holding `config.json` and the visit journal.
    pub async fn start(data_dir: &Path, capabilities: Capabilities) -> Result<Self> {
        utils::init_logging();
        info!("kiosk starting up...");

        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let config = ConfigStore::new(data_dir.join(CONFIG_FILE))?.snapshot();
        let database = Database::new(data_dir.join(JOURNAL_FILE))?;
        // close out visits a crash left open before anything new is journaled
        database.recover_incomplete(Utc::now()).await?;

        let transport = Arc::new(WsTransport::from_config(&config.backend, &config.channel)?);
        info!("push channel at {}", transport.url());

        Ok(Self::with_transport(config, capabilities, transport, Some(database)))
    }

    /// Wire the flow to an explicit push transport. No logging or recovery.
    pub fn with_transport(
        config: KioskConfig,
        capabilities: Capabilities,
        transport: Arc<dyn PushTransport>,
        journal: Option<Database>,
    ) -> Self {
        let channel = EventChannel::spawn(transport, config.channel.clone());
        let flow = FlowController::new(
            capabilities,
            config,
            channel.modes(),
            Journal::new(journal.clone()),
        )
        .spawn();

        Self {
            channel,
            flow,
            journal,
        }
    }

    pub fn snapshots(&self) -> watch::Receiver<FlowSnapshot> {
        self.flow.snapshots()
    }

    pub fn current(&self) -> FlowSnapshot {
        self.flow.current()
    }

    pub fn send(&self, input: UserInput) -> bool {
        self.flow.send(input)
    }

    pub fn modes(&self) -> ModeReader {
        self.channel.modes()
    }

    pub fn subscribe_patients(&self) -> broadcast::Receiver<PatientLookup> {
        self.channel.subscribe_patients()
    }

    pub fn journal(&self) -> Option<&Database> {
        self.journal.as_ref()
    }

    /// Stop the flow first so the mounted screen releases the camera, then the channel.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.flow.shutdown().await?;
        self.channel.shutdown().await?;
        info!("kiosk stopped");
        Ok(())
    }
}

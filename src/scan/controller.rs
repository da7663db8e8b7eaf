use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use log::info;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::VideoStream;

use super::{AcceptedCode, DecodeEvent, QrDecoder, ScanDeduper};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub type AcceptedReceiver = watch::Receiver<Option<AcceptedCode>>;

/// Owns at most one decoder feed and the deduper consuming it.
pub struct ScanController {
    decoder: Option<Arc<dyn QrDecoder>>,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    accepted: Option<AcceptedReceiver>,
}

impl ScanController {
    pub fn new() -> Self {
        Self {
            decoder: None,
            handle: None,
            cancel_token: None,
            accepted: None,
        }
    }

    /// Start scanning, or hand back the running scan's output if already started.
    pub async fn start(
        &mut self,
        decoder: Arc<dyn QrDecoder>,
        stream: Arc<dyn VideoStream>,
        deduper: ScanDeduper,
    ) -> Result<AcceptedReceiver> {
        if let (Some(_), Some(accepted)) = (&self.handle, &self.accepted) {
            info!("scanner already running; reusing feed");
            return Ok(accepted.clone());
        }

        let feed = decoder
            .start(stream)
            .await
            .context("failed to start QR decoder")?;

        let cancel_token = CancellationToken::new();
        let (accepted_tx, accepted_rx) = watch::channel(None);
        let handle = tokio::spawn(scan_loop(feed, deduper, accepted_tx, cancel_token.clone()));

        self.decoder = Some(decoder);
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.accepted = Some(accepted_rx.clone());
        Ok(accepted_rx)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop consuming decode events, then stop the decoder. Safe to repeat.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.accepted = None;

        let joined = match self.handle.take() {
            Some(handle) => handle.await.context("scan task failed to join"),
            None => Ok(()),
        };

        if let Some(decoder) = self.decoder.take() {
            decoder.stop().await;
        }
        joined
    }
}

impl Default for ScanController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

async fn scan_loop(
    mut feed: mpsc::Receiver<DecodeEvent>,
    mut deduper: ScanDeduper,
    accepted: watch::Sender<Option<AcceptedCode>>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            event = feed.recv() => match event {
                Some(DecodeEvent::Decoded(text)) => {
                    if let Some(code) = deduper.accept(&text, Instant::now()) {
                        log_info!("accepted code {}", code.code);
                        accepted.send_replace(Some(code));
                    } else {
                        log_debug!("decode ignored ({} chars)", text.len());
                    }
                }
                Some(DecodeEvent::FrameError(_)) => {}
                None => {
                    log_info!("decoder feed closed");
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::device::Frame;
    use crate::scan::{CodeGrammar, CodePolicy};

    struct NullStream;

    impl VideoStream for NullStream {
        fn id(&self) -> &str {
            "null"
        }

        fn current_frame(&self) -> Option<Frame> {
            None
        }

        fn stop_tracks(&self) {}
    }

    #[derive(Default)]
    struct ManualDecoder {
        tx: StdMutex<Option<mpsc::Sender<DecodeEvent>>>,
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl ManualDecoder {
        async fn emit(&self, event: DecodeEvent) {
            let tx = self.tx.lock().unwrap().clone().unwrap();
            tx.send(event).await.unwrap();
        }
    }

    #[async_trait]
    impl QrDecoder for ManualDecoder {
        async fn start(&self, _stream: Arc<dyn VideoStream>) -> Result<mpsc::Receiver<DecodeEvent>> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::channel(16);
            *self.tx.lock().unwrap() = Some(tx);
            Ok(rx)
        }

        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.tx.lock().unwrap().take();
        }
    }

    fn single_fire_deduper() -> ScanDeduper {
        ScanDeduper::new(
            CodeGrammar::new(&CodePolicy::default()).unwrap(),
            Duration::from_millis(1_500),
            true,
        )
    }

    #[tokio::test]
    async fn burst_of_reads_yields_one_canonical_code() {
        let decoder = Arc::new(ManualDecoder::default());
        let mut scanner = ScanController::new();
        let mut accepted = scanner
            .start(decoder.clone(), Arc::new(NullStream), single_fire_deduper())
            .await
            .unwrap();

        decoder.emit(DecodeEvent::FrameError("no code".into())).await;
        decoder.emit(DecodeEvent::Decoded("??".into())).await;
        for _ in 0..5 {
            decoder.emit(DecodeEvent::Decoded("AB-123".into())).await;
        }
        decoder.emit(DecodeEvent::Decoded("CD-456".into())).await;

        accepted.changed().await.unwrap();
        assert_eq!(accepted.borrow_and_update().as_ref().unwrap().code, "AB-123");

        scanner.stop().await.unwrap();
        assert!(!accepted.has_changed().unwrap_or(false));
    }

    #[tokio::test]
    async fn start_twice_starts_decoder_once() {
        let decoder = Arc::new(ManualDecoder::default());
        let mut scanner = ScanController::new();

        scanner
            .start(decoder.clone(), Arc::new(NullStream), single_fire_deduper())
            .await
            .unwrap();
        scanner
            .start(decoder.clone(), Arc::new(NullStream), single_fire_deduper())
            .await
            .unwrap();

        assert_eq!(decoder.starts.load(Ordering::SeqCst), 1);
        scanner.stop().await.unwrap();
        scanner.stop().await.unwrap();
        assert_eq!(decoder.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_feed_ends_the_scan_task() {
        let decoder = Arc::new(ManualDecoder::default());
        let mut scanner = ScanController::new();
        let accepted = scanner
            .start(decoder.clone(), Arc::new(NullStream), single_fire_deduper())
            .await
            .unwrap();

        decoder.tx.lock().unwrap().take();
        scanner.stop().await.unwrap();
        assert!(accepted.borrow().is_none());
    }
}

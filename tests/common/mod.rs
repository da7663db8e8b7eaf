#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use image::RgbImage;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};

use kiosk_flow::api::{ApiError, Backend, Question, RatingSubmission};
use kiosk_flow::channel::{PushConnection, PushTransport};
use kiosk_flow::config::KioskConfig;
use kiosk_flow::detection::{BoundingBox, PresenceDetector};
use kiosk_flow::device::{CameraInfo, CameraProvider, DeviceError, Frame, VideoStream};
use kiosk_flow::flow::FlowSnapshot;
use kiosk_flow::scan::{DecodeEvent, QrDecoder};
use kiosk_flow::Capabilities;

pub const FRAME_WIDTH: u32 = 128;
pub const FRAME_HEIGHT: u32 = 72;

/// 30x25 on 128x72 covers ~8% of the frame.
pub fn close_box() -> BoundingBox {
    BoundingBox::new(10.0, 10.0, 30.0, 25.0)
}

pub struct FakeStream {
    id: String,
    frame: Arc<RgbImage>,
    pub stops: AtomicUsize,
}

impl VideoStream for FakeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn current_frame(&self) -> Option<Frame> {
        Some(Frame::from_shared(self.frame.clone()))
    }

    fn stop_tracks(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Two cameras ("Front", "Back Camera"); opens can be scripted to fail.
pub struct FakeCamera {
    /// When set, no cameras are listed.
    pub unplugged: AtomicBool,
    pub opens: AtomicUsize,
    pub opened_ids: Mutex<Vec<Option<String>>>,
    failures: Mutex<VecDeque<DeviceError>>,
    streams: Mutex<Vec<Arc<FakeStream>>>,
}

impl FakeCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            unplugged: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            opened_ids: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            streams: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_next(&self, error: DeviceError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Streams opened and not stopped yet.
    pub fn live_streams(&self) -> usize {
        self.streams
            .lock()
            .unwrap()
            .iter()
            .filter(|stream| stream.stops.load(Ordering::SeqCst) == 0)
            .count()
    }

    pub fn total_stops(&self) -> usize {
        self.streams
            .lock()
            .unwrap()
            .iter()
            .map(|stream| stream.stops.load(Ordering::SeqCst))
            .sum()
    }
}

#[async_trait]
impl CameraProvider for FakeCamera {
    async fn list_cameras(&self) -> Result<Vec<CameraInfo>, DeviceError> {
        if self.unplugged.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(vec![
            CameraInfo {
                id: "front".into(),
                label: "Front".into(),
            },
            CameraInfo {
                id: "back".into(),
                label: "Back Camera".into(),
            },
        ])
    }

    async fn open(&self, camera_id: Option<&str>) -> Result<Arc<dyn VideoStream>, DeviceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.opened_ids
            .lock()
            .unwrap()
            .push(camera_id.map(str::to_string));
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let stream = Arc::new(FakeStream {
            id: camera_id.unwrap_or("default").to_string(),
            frame: Arc::new(RgbImage::new(FRAME_WIDTH, FRAME_HEIGHT)),
            stops: AtomicUsize::new(0),
        });
        self.streams.lock().unwrap().push(stream.clone());
        Ok(stream)
    }
}

/// Returns whatever boxes are currently set.
pub struct FakeDetector {
    ready: AtomicBool,
    boxes: Mutex<Vec<BoundingBox>>,
}

impl FakeDetector {
    pub fn new(boxes: Vec<BoundingBox>) -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(true),
            boxes: Mutex::new(boxes),
        })
    }

    pub fn set_boxes(&self, boxes: Vec<BoundingBox>) {
        *self.boxes.lock().unwrap() = boxes;
    }
}

#[async_trait]
impl PresenceDetector for FakeDetector {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn detect(&self, _frame: &Frame) -> Result<Vec<BoundingBox>> {
        Ok(self.boxes.lock().unwrap().clone())
    }
}

/// Decoder whose feed the test writes into.
#[derive(Default)]
pub struct ManualDecoder {
    feed: Mutex<Option<mpsc::Sender<DecodeEvent>>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl ManualDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn decode(&self, text: &str) -> bool {
        let feed = self.feed.lock().unwrap().clone();
        match feed {
            Some(feed) => feed.send(DecodeEvent::Decoded(text.into())).await.is_ok(),
            None => false,
        }
    }

    pub async fn frame_error(&self) -> bool {
        let feed = self.feed.lock().unwrap().clone();
        match feed {
            Some(feed) => feed
                .send(DecodeEvent::FrameError("no code".into()))
                .await
                .is_ok(),
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.feed.lock().unwrap().is_some()
    }
}

#[async_trait]
impl QrDecoder for ManualDecoder {
    async fn start(&self, _stream: Arc<dyn VideoStream>) -> Result<mpsc::Receiver<DecodeEvent>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(32);
        *self.feed.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.feed.lock().unwrap().take();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    TriggerQr(String),
    FetchQuestion,
    Submit(RatingSubmission),
    FetchPatient(String),
}

pub struct FakeBackend {
    pub calls: Mutex<Vec<BackendCall>>,
    pub fail_trigger: AtomicBool,
    pub fail_submit: AtomicBool,
    pub question_delay: Mutex<Duration>,
    pub question: Mutex<Question>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_trigger: AtomicBool::new(false),
            fail_submit: AtomicBool::new(false),
            question_delay: Mutex::new(Duration::ZERO),
            question: Mutex::new(Question {
                question: "How was your visit?".into(),
                hn: Some("HN-42".into()),
            }),
        })
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn triggers(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::TriggerQr(hn) => Some(hn),
                _ => None,
            })
            .collect()
    }

    pub fn submissions(&self) -> Vec<RatingSubmission> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Submit(submission) => Some(submission),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn trigger_qr(&self, hn: &str) -> Result<(), ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(BackendCall::TriggerQr(hn.to_string()));
        if self.fail_trigger.load(Ordering::SeqCst) {
            return Err(ApiError::Status(503));
        }
        Ok(())
    }

    async fn fetch_question(&self) -> Result<Question, ApiError> {
        self.calls.lock().unwrap().push(BackendCall::FetchQuestion);
        let delay = *self.question_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        Ok(self.question.lock().unwrap().clone())
    }

    async fn submit_rating(&self, submission: &RatingSubmission) -> Result<(), ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(BackendCall::Submit(submission.clone()));
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("connection reset".into()));
        }
        Ok(())
    }

    async fn fetch_patient(&self, code: &str) -> Result<Value, ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(BackendCall::FetchPatient(code.to_string()));
        Ok(json!({ "HN": code }))
    }
}

struct QueuedConnection {
    frames: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl PushConnection for QueuedConnection {
    async fn next_text(&mut self) -> Option<Result<String>> {
        self.frames.recv().await.map(Ok)
    }
}

/// Push transport that yields one in-memory connection per `open_connection`.
#[derive(Default)]
pub struct ManualTransport {
    pending: Mutex<VecDeque<QueuedConnection>>,
}

impl ManualTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open_connection(&self) -> mpsc::UnboundedSender<String> {
        let (tx, frames) = mpsc::unbounded_channel();
        self.pending
            .lock()
            .unwrap()
            .push_back(QueuedConnection { frames });
        tx
    }
}

#[async_trait]
impl PushTransport for ManualTransport {
    async fn connect(&self) -> Result<Box<dyn PushConnection>> {
        match self.pending.lock().unwrap().pop_front() {
            Some(connection) => Ok(Box::new(connection)),
            None => Err(anyhow::anyhow!("backend offline")),
        }
    }
}

pub struct Fakes {
    pub camera: Arc<FakeCamera>,
    pub detector: Arc<FakeDetector>,
    pub decoder: Arc<ManualDecoder>,
    pub backend: Arc<FakeBackend>,
}

impl Fakes {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Self {
            camera: FakeCamera::new(),
            detector: FakeDetector::new(boxes),
            decoder: ManualDecoder::new(),
            backend: FakeBackend::new(),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            cameras: self.camera.clone(),
            detector: self.detector.clone(),
            decoder: self.decoder.clone(),
            backend: self.backend.clone(),
        }
    }
}

pub fn test_config() -> KioskConfig {
    KioskConfig::default()
}

/// Wait (in virtual time) until `predicate` holds for the latest snapshot.
pub async fn wait_for<F>(snapshots: &mut watch::Receiver<FlowSnapshot>, mut predicate: F) -> FlowSnapshot
where
    F: FnMut(&FlowSnapshot) -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            {
                let current = snapshots.borrow_and_update();
                if predicate(&current) {
                    return current.clone();
                }
            }
            if snapshots.changed().await.is_err() {
                panic!("flow stopped while waiting");
            }
        }
    })
    .await;

    match waited {
        Ok(snapshot) => snapshot,
        Err(_) => panic!("timed out; last snapshot: {:?}", *snapshots.borrow()),
    }
}

/// Let spawned tasks run without moving virtual time much.
pub async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
}

use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DetectionConfig;
use crate::device::VideoStream;

use super::loop_worker::detection_loop;
use super::{PresenceDetector, ProximityReading};

pub type ReadingReceiver = watch::Receiver<Option<ProximityReading>>;

/// Owns at most one running detection loop.
pub struct DetectionController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    readings: Option<ReadingReceiver>,
}

impl DetectionController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            readings: None,
        }
    }

    /// Start the loop, or hand back the running loop's readings if it is already up.
    pub fn start(
        &mut self,
        stream: Arc<dyn VideoStream>,
        detector: Arc<dyn PresenceDetector>,
        config: DetectionConfig,
    ) -> ReadingReceiver {
        if let (Some(_), Some(readings)) = (&self.handle, &self.readings) {
            info!("detection already running; reusing loop");
            return readings.clone();
        }

        let cancel_token = CancellationToken::new();
        let (readings_tx, readings_rx) = watch::channel(None);

        let handle = tokio::spawn(detection_loop(
            stream,
            detector,
            config,
            readings_tx,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.readings = Some(readings_rx.clone());
        readings_rx
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Cancel the loop and wait until it has exited. Safe to call when stopped.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.readings = None;

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("detection loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for DetectionController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DetectionController {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use image::RgbImage;

    use super::*;
    use crate::detection::BoundingBox;
    use crate::device::Frame;

    struct ScriptedStream {
        frames: StdMutex<VecDeque<Option<(u32, u32)>>>,
        reads: AtomicUsize,
    }

    impl ScriptedStream {
        fn steady(width: u32, height: u32) -> Arc<Self> {
            Self::scripted(vec![Some((width, height))])
        }

        fn scripted(script: Vec<Option<(u32, u32)>>) -> Arc<Self> {
            Arc::new(Self {
                frames: StdMutex::new(script.into()),
                reads: AtomicUsize::new(0),
            })
        }
    }

    impl VideoStream for ScriptedStream {
        fn id(&self) -> &str {
            "scripted"
        }

        fn current_frame(&self) -> Option<Frame> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let mut frames = self.frames.lock().unwrap();
            let next = if frames.len() > 1 {
                frames.pop_front().flatten()
            } else {
                frames.front().copied().flatten()
            };
            let (width, height) = next?;
            Some(Frame::new(RgbImage::new(width, height)))
        }

        fn stop_tracks(&self) {}
    }

    /// Returns one box per call from a script; each call can take a different time.
    struct ScriptedDetector {
        ready: AtomicBool,
        calls: AtomicUsize,
        script: StdMutex<VecDeque<(u64, Option<BoundingBox>)>>,
    }

    impl ScriptedDetector {
        fn new(script: Vec<(u64, Option<BoundingBox>)>) -> Arc<Self> {
            Arc::new(Self {
                ready: AtomicBool::new(true),
                calls: AtomicUsize::new(0),
                script: StdMutex::new(script.into()),
            })
        }
    }

    #[async_trait]
    impl PresenceDetector for ScriptedDetector {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn detect(&self, _frame: &Frame) -> anyhow::Result<Vec<BoundingBox>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some((delay_ms, bbox)) => {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok(bbox.into_iter().collect())
                }
                None => Err(anyhow!("script exhausted")),
            }
        }
    }

    fn close_box() -> Option<BoundingBox> {
        Some(BoundingBox::new(400.0, 200.0, 300.0, 250.0))
    }

    fn far_box() -> Option<BoundingBox> {
        Some(BoundingBox::new(10.0, 10.0, 40.0, 40.0))
    }

    #[tokio::test(start_paused = true)]
    async fn close_subject_sets_close_enough() {
        let stream = ScriptedStream::steady(1280, 720);
        let detector = ScriptedDetector::new(vec![(10, close_box())]);
        let mut controller = DetectionController::new();

        let mut readings = controller.start(stream, detector, DetectionConfig::default());
        readings.changed().await.unwrap();
        let reading = readings.borrow().clone().unwrap();

        assert!(reading.close_enough);
        assert_eq!((reading.frame_width, reading.frame_height), (1280, 720));
        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn detector_not_ready_is_never_called() {
        let stream = ScriptedStream::steady(640, 480);
        let detector = ScriptedDetector::new(vec![]);
        detector.ready.store(false, Ordering::SeqCst);
        let mut controller = DetectionController::new();

        let readings = controller.start(stream, detector.clone(), DetectionConfig::default());
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
        assert!(readings.borrow().is_none());
        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn frames_not_ready_skip_silently() {
        let stream = ScriptedStream::scripted(vec![None, None, Some((640, 480))]);
        let detector = ScriptedDetector::new(vec![(5, far_box())]);
        let mut controller = DetectionController::new();

        let mut readings = controller.start(stream.clone(), detector.clone(), DetectionConfig::default());
        readings.changed().await.unwrap();

        assert!(stream.reads.load(Ordering::SeqCst) >= 3);
        assert_eq!(readings.borrow().as_ref().unwrap().seq, 1);
        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stale_result_is_discarded() {
        // Tick 1 takes 500ms, tick 2 answers after 10ms: tick 1's late answer must lose.
        let stream = ScriptedStream::steady(1280, 720);
        let detector = ScriptedDetector::new(vec![(500, close_box()), (10, far_box())]);
        let config = DetectionConfig {
            detect_timeout_ms: 5_000,
            ..DetectionConfig::default()
        };
        let mut controller = DetectionController::new();

        let readings = controller.start(stream, detector, config);
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        let reading = readings.borrow().clone().unwrap();
        assert_eq!(reading.seq, 2);
        assert!(!reading.close_enough);
        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_change_is_picked_up() {
        let stream = ScriptedStream::scripted(vec![Some((640, 480)), Some((1280, 720))]);
        let detector = ScriptedDetector::new(vec![(1, far_box()), (1, far_box())]);
        let mut controller = DetectionController::new();

        let mut readings = controller.start(stream, detector, DetectionConfig::default());
        readings.changed().await.unwrap();
        assert_eq!(readings.borrow_and_update().as_ref().unwrap().frame_width, 640);
        readings.changed().await.unwrap();
        assert_eq!(readings.borrow_and_update().as_ref().unwrap().frame_width, 1280);
        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn streak_counts_consecutive_close_ticks() {
        let stream = ScriptedStream::steady(1280, 720);
        let detector = ScriptedDetector::new(vec![
            (1, close_box()),
            (1, close_box()),
            (1, far_box()),
            (1, close_box()),
        ]);
        let mut controller = DetectionController::new();

        let mut readings = controller.start(stream, detector, DetectionConfig::default());
        let mut streaks = Vec::new();
        for _ in 0..4 {
            readings.changed().await.unwrap();
            streaks.push(readings.borrow_and_update().as_ref().unwrap().close_streak);
        }

        assert_eq!(streaks, vec![1, 2, 0, 1]);
        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_detector_call_times_out_and_loop_continues() {
        let stream = ScriptedStream::steady(1280, 720);
        let detector = ScriptedDetector::new(vec![(2_000, close_box()), (1, far_box())]);
        let config = DetectionConfig {
            interval_ms: 5_000,
            ..DetectionConfig::default()
        };
        assert_eq!(config.detect_timeout_ms, 1_000);
        let mut controller = DetectionController::new();

        let mut readings = controller.start(stream, detector.clone(), config);

        // the 2s answer would have landed by now; it was cut off at 1s
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(readings.borrow_and_update().is_none());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);

        readings.changed().await.unwrap();
        let reading = readings.borrow().clone().unwrap();
        assert_eq!(reading.seq, 2);
        assert!(!reading.close_enough);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 2);
        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_breaks_the_close_streak() {
        let stream = ScriptedStream::steady(1280, 720);
        let detector = ScriptedDetector::new(vec![
            (1, close_box()),
            (2_000, close_box()),
            (1, close_box()),
        ]);
        let config = DetectionConfig {
            interval_ms: 5_000,
            ..DetectionConfig::default()
        };
        let mut controller = DetectionController::new();

        let mut readings = controller.start(stream, detector, config);
        readings.changed().await.unwrap();
        let first = readings.borrow_and_update().clone().unwrap();
        assert_eq!((first.seq, first.close_streak), (1, 1));

        // tick 2 times out, so tick 3 starts a new streak
        readings.changed().await.unwrap();
        let third = readings.borrow_and_update().clone().unwrap();
        assert_eq!((third.seq, third.close_streak), (3, 1));
        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_reuses_running_loop() {
        let stream = ScriptedStream::steady(640, 480);
        let detector = ScriptedDetector::new(vec![]);
        let mut controller = DetectionController::new();

        controller.start(stream.clone(), detector.clone(), DetectionConfig::default());
        controller.start(stream, detector, DetectionConfig::default());
        assert!(controller.is_running());

        controller.stop().await.unwrap();
        assert!(!controller.is_running());
        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_effective_before_returning() {
        let stream = ScriptedStream::steady(640, 480);
        let detector = ScriptedDetector::new(vec![]);
        let mut controller = DetectionController::new();

        controller.start(stream.clone(), detector, DetectionConfig::default());
        tokio::time::sleep(Duration::from_millis(450)).await;
        controller.stop().await.unwrap();

        let reads = stream.reads.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(stream.reads.load(Ordering::SeqCst), reads);
    }
}

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{error::Elapsed, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::DetectionConfig;
use crate::device::{Frame, VideoStream};

use super::{BoundingBox, PresenceDetector, ProximityReading};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

struct TickOutcome {
    seq: u64,
    frame_width: u32,
    frame_height: u32,
    result: std::result::Result<Result<Vec<BoundingBox>>, Elapsed>,
}

/// Poll `stream` every `config.interval()` and publish one reading per applied tick.
///
/// Detector calls run off the tick so a slow call never delays the ticker;
/// results are applied in issue order and anything older than the newest
/// applied tick is discarded.
pub async fn detection_loop(
    stream: Arc<dyn VideoStream>,
    detector: Arc<dyn PresenceDetector>,
    config: DetectionConfig,
    readings: watch::Sender<Option<ProximityReading>>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut in_flight: JoinSet<TickOutcome> = JoinSet::new();
    let mut issued: u64 = 0;
    let mut applied: u64 = 0;
    let mut close_streak: u32 = 0;
    let mut frame_size: Option<(u32, u32)> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("detection loop on {} shutting down", stream.id());
                break;
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(err) if err.is_cancelled() => continue,
                    Err(err) => {
                        log_warn!("detector task failed: {err}");
                        continue;
                    }
                };

                if outcome.seq <= applied {
                    log_debug!("dropping stale detection result {} (applied {})", outcome.seq, applied);
                    continue;
                }
                applied = outcome.seq;

                match outcome.result {
                    Ok(Ok(boxes)) => {
                        let mut reading = ProximityReading::evaluate(
                            outcome.seq,
                            &boxes,
                            outcome.frame_width,
                            outcome.frame_height,
                            config.area_threshold,
                        );
                        close_streak = if reading.close_enough {
                            close_streak.saturating_add(1)
                        } else {
                            0
                        };
                        reading.close_streak = close_streak;
                        readings.send_replace(Some(reading));
                    }
                    Ok(Err(err)) => {
                        close_streak = 0;
                        log_warn!("detection tick {} failed: {err:?}", outcome.seq);
                    }
                    Err(_) => {
                        close_streak = 0;
                        log_warn!(
                            "detection tick {} timed out (> {}ms)",
                            outcome.seq,
                            config.detect_timeout_ms
                        );
                    }
                }
            }
            _ = ticker.tick() => {
                if !detector.is_ready() {
                    log_debug!("detector not ready, skipping tick");
                    continue;
                }

                let Some(frame) = stream.current_frame() else {
                    log_debug!("frame source not ready, skipping tick");
                    continue;
                };

                let size = (frame.width(), frame.height());
                if frame_size != Some(size) {
                    log_info!("frame source now {}x{}", size.0, size.1);
                    frame_size = Some(size);
                }

                issued += 1;
                in_flight.spawn(run_detector(
                    issued,
                    frame,
                    detector.clone(),
                    config.detect_timeout(),
                ));
            }
        }
    }

    in_flight.abort_all();
}

async fn run_detector(
    seq: u64,
    frame: Frame,
    detector: Arc<dyn PresenceDetector>,
    timeout: std::time::Duration,
) -> TickOutcome {
    let result = tokio::time::timeout(timeout, detector.detect(&frame)).await;
    TickOutcome {
        seq,
        frame_width: frame.width(),
        frame_height: frame.height(),
        result,
    }
}

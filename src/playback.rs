//! Repeating playback timer.
//!
//! The driver runs a tokio interval task that advances a [`Playback`] clock
//! by one step per tick and emits a [`PlaybackFrame`] per step. Every frame
//! with a position fires a wind lookup; only the answer to the latest
//! request is kept (see [`WindTracker`]).
//!
//! Run it on a current-thread runtime to keep the single-writer model of the
//! UI loop. Pausing, resetting or dropping the driver aborts the timer task.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::providers::WindProvider;
use crate::timeline::{Playback, PlaybackState, Timeline, WindReading, WindTracker};
use crate::{PlannerConfig, Point};

/// One step of playback (or one scrub).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackFrame {
    pub elapsed_hours: f64,
    pub time: DateTime<Utc>,
    pub position: Option<Point>,
    /// Share of the total voyage time, 0..=1
    pub fraction: f64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn frame_at(timeline: &Timeline, elapsed_hours: f64, fraction: f64) -> PlaybackFrame {
    PlaybackFrame {
        elapsed_hours,
        time: timeline.time_at(elapsed_hours),
        position: timeline.position_at_elapsed(elapsed_hours),
        fraction,
    }
}

/// Fire-and-forget wind lookup for a frame; the tracker drops stale answers.
fn spawn_wind_lookup(
    provider: &Arc<dyn WindProvider>,
    tracker: &Arc<Mutex<WindTracker>>,
    frame: &PlaybackFrame,
) {
    let Some(point) = frame.position else {
        return;
    };
    let time = frame.time;
    let token = lock(tracker).request();
    let provider = Arc::clone(provider);
    let tracker = Arc::clone(tracker);

    tokio::spawn(async move {
        let wind = provider.query(point, time).await;
        lock(&tracker).complete(token, point, time, wind);
    });
}

/// Owns the playback clock and its timer task.
pub struct PlaybackDriver {
    timeline: Arc<Timeline>,
    playback: Arc<Mutex<Playback>>,
    wind: Arc<Mutex<WindTracker>>,
    provider: Arc<dyn WindProvider>,
    tick: Duration,
    frames: mpsc::UnboundedSender<PlaybackFrame>,
    task: Option<JoinHandle<()>>,
}

impl PlaybackDriver {
    /// Create a stopped driver and the receiver its frames arrive on.
    pub fn new(
        timeline: Timeline,
        config: &PlannerConfig,
        provider: Arc<dyn WindProvider>,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackFrame>) {
        let (frames, receiver) = mpsc::unbounded_channel();
        let playback = Playback::for_timeline(&timeline, config.playback_step_minutes);
        let driver = Self {
            timeline: Arc::new(timeline),
            playback: Arc::new(Mutex::new(playback)),
            wind: Arc::new(Mutex::new(WindTracker::new())),
            provider,
            tick: Duration::from_millis(config.playback_tick_ms.max(1)),
            frames,
            task: None,
        };
        (driver, receiver)
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn state(&self) -> PlaybackState {
        lock(&self.playback).state()
    }

    pub fn elapsed_hours(&self) -> f64 {
        lock(&self.playback).elapsed_hours()
    }

    /// Latest accepted wind reading.
    pub fn latest_wind(&self) -> Option<WindReading> {
        lock(&self.wind).latest().cloned()
    }

    /// Whether the timer task is alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Start (or restart from the end) and spawn the timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn play(&mut self) {
        lock(&self.playback).play();
        self.spawn_timer();
    }

    pub fn pause(&mut self) {
        self.cancel_timer();
        lock(&self.playback).pause();
    }

    pub fn resume(&mut self) {
        lock(&self.playback).resume();
        self.spawn_timer();
    }

    /// Stop and rewind to departure.
    pub fn reset(&mut self) {
        self.cancel_timer();
        lock(&self.playback).reset();
    }

    /// Jump to `fraction` of the total voyage time and emit that frame.
    pub fn scrub(&mut self, fraction: f64) -> PlaybackFrame {
        let (elapsed, fraction) = {
            let mut playback = lock(&self.playback);
            let elapsed = playback.scrub(fraction);
            (elapsed, playback.fraction())
        };
        let frame = frame_at(&self.timeline, elapsed, fraction);
        spawn_wind_lookup(&self.provider, &self.wind, &frame);
        let _ = self.frames.send(frame.clone());
        frame
    }

    fn spawn_timer(&mut self) {
        if self.is_running() || lock(&self.playback).state() != PlaybackState::Playing {
            return;
        }

        let timeline = Arc::clone(&self.timeline);
        let playback = Arc::clone(&self.playback);
        let wind = Arc::clone(&self.wind);
        let provider = Arc::clone(&self.provider);
        let frames = self.frames.clone();
        let period = self.tick;

        debug!("[Playback] Timer started ({:?} per tick)", period);
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                let (elapsed, fraction, finished) = {
                    let mut playback = lock(&playback);
                    match playback.tick() {
                        Some(elapsed) => (
                            elapsed,
                            playback.fraction(),
                            playback.state() == PlaybackState::Finished,
                        ),
                        None => break,
                    }
                };

                let frame = frame_at(&timeline, elapsed, fraction);
                spawn_wind_lookup(&provider, &wind, &frame);
                if frames.send(frame).is_err() {
                    break;
                }
                if finished {
                    info!("[Playback] Reached end of voyage at {:.2}h", elapsed);
                    break;
                }
            }
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("[Playback] Timer cancelled");
        }
    }
}

impl Drop for PlaybackDriver {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{NoWind, Wind};
    use crate::segments::Segment;
    use crate::Geometry;
    use chrono::TimeZone;
    use futures::future::{BoxFuture, FutureExt};

    struct SteadyWind;

    impl WindProvider for SteadyWind {
        fn query(&self, _point: Point, _at: DateTime<Utc>) -> BoxFuture<'_, Option<Wind>> {
            async {
                Some(Wind {
                    speed_knots: 15.0,
                    direction_deg: 225.0,
                })
            }
            .boxed()
        }
    }

    fn timeline() -> Timeline {
        let segments = vec![Segment::new("a", 10.0, 10.0)];
        let geometries = vec![Geometry::new(
            "a",
            vec![Point::new(0.0, 0.0), Point::new(0.0, 1.0)],
        )];
        Timeline::new(
            &segments,
            &geometries,
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        )
    }

    fn config() -> PlannerConfig {
        PlannerConfig {
            playback_step_minutes: 15.0,
            playback_tick_ms: 50,
            ..PlannerConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_to_the_end_and_stops() {
        let (mut driver, mut frames) = PlaybackDriver::new(timeline(), &config(), Arc::new(SteadyWind));
        driver.play();

        let mut count = 0;
        while let Some(frame) = frames.recv().await {
            count += 1;
            if frame.fraction >= 1.0 {
                break;
            }
        }
        assert_eq!(count, 4);
        assert_eq!(driver.state(), PlaybackState::Finished);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!driver.is_running());
        let wind = driver.latest_wind().unwrap();
        assert_eq!(wind.point, Point::new(0.0, 1.0));
        assert_eq!(wind.wind.unwrap().speed_knots, 15.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_frame_has_a_position() {
        let segments = vec![Segment::new("a", 1.0, 10.0), Segment::new("b", 2.0, 10.0)];
        let geometries = vec![
            Geometry::new("a", vec![Point::new(0.0, 0.0), Point::new(0.0, 0.1)]),
            Geometry::new("b", vec![Point::new(0.0, 0.1), Point::new(0.0, 0.3)]),
        ];
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let timeline = Timeline::new(&segments, &geometries, start);
        let config = PlannerConfig {
            playback_step_minutes: 6.0,
            ..config()
        };
        let (mut driver, mut frames) = PlaybackDriver::new(timeline, &config, Arc::new(SteadyWind));
        driver.play();

        let mut last = None;
        while let Some(frame) = frames.recv().await {
            let done = frame.fraction >= 1.0;
            last = Some(frame);
            if done {
                break;
            }
        }
        let last = last.unwrap();
        assert_eq!(last.position, Some(Point::new(0.0, 0.3)));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(driver.latest_wind().unwrap().point, Point::new(0.0, 0.3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_cancels_timer() {
        let (mut driver, mut frames) = PlaybackDriver::new(timeline(), &config(), Arc::new(NoWind));
        driver.play();
        frames.recv().await.unwrap();
        driver.pause();
        let elapsed = driver.elapsed_hours();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!driver.is_running());
        assert_eq!(driver.state(), PlaybackState::Paused);
        assert_eq!(driver.elapsed_hours(), elapsed);

        driver.resume();
        let next = frames.recv().await.unwrap();
        assert!(next.elapsed_hours > elapsed);
    }

    #[tokio::test]
    async fn test_scrub_emits_frame() {
        let (mut driver, mut frames) = PlaybackDriver::new(timeline(), &config(), Arc::new(NoWind));
        let frame = driver.scrub(0.5);
        assert_eq!(frame.elapsed_hours, 0.5);
        let p = frame.position.unwrap();
        assert!(p.latitude > 0.0 && p.latitude < 1.0);
        assert_eq!(frames.recv().await.unwrap(), frame);
        assert_eq!(driver.state(), PlaybackState::Stopped);
    }
}

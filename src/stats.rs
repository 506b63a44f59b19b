use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::detection::DetectionResult;
use crate::util::rounded_mean;

/// Maximum number of entries kept in the gesture history
pub const HISTORY_LIMIT: usize = 50;

/// How often the session clock is recomputed while a session is active
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// One recorded detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub gesture: String,
    pub distance: Option<f64>,
    /// Session elapsed seconds at the time of the detection
    pub session_timestamp: u64,
    pub recorded_at: DateTime<Local>,
}

/// Owned copy of the current statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_detections: u64,
    pub session_time: u64,
    pub average_distance: Option<i64>,
    /// Newest first
    pub gesture_history: Vec<HistoryEntry>,
}

/// Receives statistics updates as they happen
pub trait StatsObserver {
    /// Called on every session tick with the recomputed elapsed seconds
    fn session_time(&mut self, _secs: u64) {}

    /// Called after every recorded detection
    fn stats_changed(&mut self, _snapshot: &StatsSnapshot) {}
}

#[derive(Debug, Clone, Copy, Default)]
struct Session {
    started_at: Option<Instant>,
    last_tick: Option<Instant>,
    elapsed_secs: u64,
    active: bool,
}

/// Session statistics: detection count, running average distance and a
/// bounded history, plus the session clock.
pub struct StatsStore {
    clock: Box<dyn Clock>,
    observer: Option<Box<dyn StatsObserver>>,
    session: Session,
    total_detections: u64,
    total_distance: f64,
    distance_samples: u64,
    history: VecDeque<HistoryEntry>,
}

impl StatsStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock<C: Clock>(clock: C) -> Self {
        Self {
            clock: Box::new(clock),
            observer: None,
            session: Session::default(),
            total_detections: 0,
            total_distance: 0.0,
            distance_samples: 0,
            history: VecDeque::with_capacity(HISTORY_LIMIT + 1),
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn StatsObserver>) {
        self.observer = Some(observer);
    }

    /// Reset everything and start ticking the session clock
    pub fn start_session(&mut self) {
        self.reset_state();
        let now = self.clock.now();
        self.session = Session {
            started_at: Some(now),
            last_tick: Some(now),
            elapsed_secs: 0,
            active: true,
        };
        info!("session started");
    }

    /// Stop the session clock. Counters are left as they are.
    pub fn stop_session(&mut self) {
        self.session.active = false;
        self.session.last_tick = None;
        info!(
            elapsed_secs = self.session.elapsed_secs,
            detections = self.total_detections,
            "session stopped"
        );
    }

    pub fn reset_state(&mut self) {
        self.session = Session::default();
        self.total_detections = 0;
        self.total_distance = 0.0;
        self.distance_samples = 0;
        self.history.clear();
        debug!("stats reset");
    }

    pub fn is_session_active(&self) -> bool {
        self.session.active
    }

    /// Elapsed whole seconds of the current session as of the last tick
    pub fn session_time(&self) -> u64 {
        self.session.elapsed_secs
    }

    /// Run the periodic session tick if one is due. Returns true when it ran.
    pub fn poll_tick(&mut self) -> bool {
        if !self.session.active {
            return false;
        }
        let (Some(started_at), Some(last_tick)) = (self.session.started_at, self.session.last_tick)
        else {
            return false;
        };

        let now = self.clock.now();
        if now.saturating_duration_since(last_tick) < TICK_INTERVAL {
            return false;
        }

        let elapsed = now.saturating_duration_since(started_at).as_secs();
        self.session.elapsed_secs = elapsed;
        // stay on the whole-second grid so ticks don't drift
        self.session.last_tick = Some(started_at + Duration::from_secs(elapsed));

        if let Some(observer) = self.observer.as_mut() {
            observer.session_time(elapsed);
        }
        true
    }

    /// Record a detection. Results without a gesture are ignored.
    pub fn record_detection(&mut self, detection: &DetectionResult) -> bool {
        let Some(gesture) = detection.gesture() else {
            return false;
        };

        self.total_detections += 1;

        if let Some(distance) = detection.distance.filter(|d| d.is_finite()) {
            self.total_distance += distance;
            self.distance_samples += 1;
        }

        self.history.push_front(HistoryEntry {
            gesture: gesture.to_string(),
            distance: detection.distance,
            session_timestamp: self.session.elapsed_secs,
            recorded_at: Local::now(),
        });
        self.history.truncate(HISTORY_LIMIT);

        debug!(
            gesture,
            distance = ?detection.distance,
            total = self.total_detections,
            "detection recorded"
        );

        if self.observer.is_some() {
            let snapshot = self.get_stats();
            if let Some(observer) = self.observer.as_mut() {
                observer.stats_changed(&snapshot);
            }
        }
        true
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_detections: self.total_detections,
            session_time: self.session.elapsed_secs,
            average_distance: self.average_distance(),
            gesture_history: self.history.iter().cloned().collect(),
        }
    }

    fn average_distance(&self) -> Option<i64> {
        rounded_mean(self.total_distance, self.distance_samples)
    }
}

impl Default for StatsStore {
    fn default() -> Self {
        Self::new()
    }
}

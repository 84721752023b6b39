use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tenant lifecycle states, ordered hot to cold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Active,
    Idle,
    Sleeping,
    Dormant,
}

/// Runtime lifecycle record for one tenant. Not persisted; rebuilt from
/// activity after a restart.
#[derive(Debug, Clone)]
pub struct BrainState {
    pub state: LifecycleState,
    pub last_invoke: DateTime<Utc>,
    pub invoke_count: u64,
    pub session_start: DateTime<Utc>,
    /// Per-tenant overrides; `None` falls back to the manager thresholds.
    pub idle_threshold: Option<Duration>,
    pub sleep_threshold: Option<Duration>,
    pub dormant_threshold: Option<Duration>,
    /// Recent activity timestamps for sparseness sampling, newest last.
    pub activity: Vec<DateTime<Utc>>,
}

impl BrainState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: LifecycleState::Active,
            last_invoke: now,
            invoke_count: 0,
            session_start: now,
            idle_threshold: None,
            sleep_threshold: None,
            dormant_threshold: None,
            activity: Vec::new(),
        }
    }

    /// Hard cap on retained activity samples.
    const MAX_SAMPLES: usize = 256;

    /// Append an activity sample, evicting entries older than the window.
    /// The buffer is capped so a hot tenant cannot grow it without bound.
    pub fn record(&mut self, now: DateTime<Utc>, buffer_window: Duration) {
        self.last_invoke = now;
        self.invoke_count += 1;
        self.activity.push(now);
        let horizon = now - buffer_window;
        self.activity.retain(|t| *t >= horizon);
        if self.activity.len() > Self::MAX_SAMPLES {
            let excess = self.activity.len() - Self::MAX_SAMPLES;
            self.activity.drain(..excess);
        }
    }

    /// Number of samples within the trailing window ending now.
    pub fn ops_in_window(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let horizon = now - window;
        self.activity.iter().filter(|t| **t >= horizon).count()
    }
}

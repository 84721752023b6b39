use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use qubic_core::config::LifecycleConfig;
use qubic_core::model::{BrainState, LifecycleState};

/// Callback invoked with the tenant id on a lifecycle transition.
pub type TenantCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default, Clone)]
struct Callbacks {
    on_sleep_start: Option<TenantCallback>,
    on_sleep_end: Option<TenantCallback>,
    on_wake: Option<TenantCallback>,
    on_dormant: Option<TenantCallback>,
}

/// Which callbacks a transition triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    SleepStart,
    SleepEnd,
    Wake,
    Dormant,
}

/// Per-tenant lifecycle tracking with runtime-updatable thresholds.
pub struct LifecycleManager {
    cfg: RwLock<LifecycleConfig>,
    states: DashMap<String, BrainState>,
    callbacks: RwLock<Callbacks>,
}

impl LifecycleManager {
    pub fn new(cfg: LifecycleConfig) -> Arc<Self> {
        Arc::new(Self {
            cfg: RwLock::new(cfg),
            states: DashMap::new(),
            callbacks: RwLock::new(Callbacks::default()),
        })
    }

    /// Replace the manager-wide thresholds.
    pub fn set_thresholds(&self, idle_ms: u64, sleep_ms: u64, dormant_ms: u64) {
        let mut cfg = self.cfg.write();
        cfg.idle_threshold_ms = idle_ms;
        cfg.sleep_threshold_ms = sleep_ms;
        cfg.dormant_threshold_ms = dormant_ms;
    }

    /// Override the thresholds for one tenant only.
    pub fn set_tenant_thresholds(
        &self,
        index_id: &str,
        idle_ms: u64,
        sleep_ms: u64,
        dormant_ms: u64,
    ) {
        let now = Utc::now();
        let mut entry = self
            .states
            .entry(index_id.to_string())
            .or_insert_with(|| BrainState::new(now));
        entry.idle_threshold = Some(Duration::milliseconds(idle_ms as i64));
        entry.sleep_threshold = Some(Duration::milliseconds(sleep_ms as i64));
        entry.dormant_threshold = Some(Duration::milliseconds(dormant_ms as i64));
    }

    pub fn on_sleep_start(&self, cb: TenantCallback) {
        self.callbacks.write().on_sleep_start = Some(cb);
    }

    pub fn on_sleep_end(&self, cb: TenantCallback) {
        self.callbacks.write().on_sleep_end = Some(cb);
    }

    pub fn on_wake(&self, cb: TenantCallback) {
        self.callbacks.write().on_wake = Some(cb);
    }

    pub fn on_dormant(&self, cb: TenantCallback) {
        self.callbacks.write().on_dormant = Some(cb);
    }

    /// Record one unit of tenant activity. Any activity while Idle,
    /// Sleeping, or Dormant promotes straight back to Active.
    pub fn record_activity(&self, index_id: &str) {
        let now = Utc::now();
        let buffer_window = Duration::milliseconds(self.cfg.read().buffer_window_ms as i64);
        let mut events = Vec::new();
        {
            let mut entry = self
                .states
                .entry(index_id.to_string())
                .or_insert_with(|| BrainState::new(now));
            entry.record(now, buffer_window);
            match entry.state {
                LifecycleState::Active => {}
                LifecycleState::Idle => entry.state = LifecycleState::Active,
                LifecycleState::Sleeping => {
                    entry.state = LifecycleState::Active;
                    events.push(Event::SleepEnd);
                    events.push(Event::Wake);
                }
                LifecycleState::Dormant => {
                    entry.state = LifecycleState::Active;
                    events.push(Event::Wake);
                }
            }
        }
        self.dispatch_all(index_id, &events);
    }

    /// Current state, if the tenant is tracked.
    pub fn state(&self, index_id: &str) -> Option<LifecycleState> {
        self.states.get(index_id).map(|s| s.state)
    }

    /// Full record snapshot (invoke counts, session start).
    pub fn record_of(&self, index_id: &str) -> Option<BrainState> {
        self.states.get(index_id).map(|s| s.clone())
    }

    /// Ids currently in the given state.
    pub fn tenants_in(&self, state: LifecycleState) -> Vec<String> {
        self.states
            .iter()
            .filter(|e| e.value().state == state)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Forget a tenant entirely (eviction, truncate).
    pub fn remove(&self, index_id: &str) {
        self.states.remove(index_id);
    }

    /// Evaluate the demotion rules for one tenant. Returns the resulting
    /// state when the tenant is tracked.
    pub fn check_and_transition(&self, index_id: &str) -> Option<LifecycleState> {
        let now = Utc::now();
        let cfg = self.cfg.read().clone();
        let mut events = Vec::new();
        let state = {
            let mut entry = self.states.get_mut(index_id)?;
            let idle = threshold(entry.idle_threshold, cfg.idle_threshold_ms);
            let sleep = threshold(entry.sleep_threshold, cfg.sleep_threshold_ms);
            let dormant = threshold(entry.dormant_threshold, cfg.dormant_threshold_ms);
            let quiet = now - entry.last_invoke;

            match entry.state {
                LifecycleState::Active => {
                    let sparse = entry.ops_in_window(
                        now,
                        Duration::milliseconds(cfg.sparseness_window_ms as i64),
                    ) < cfg.sparseness_min_ops;
                    if sparse && quiet > idle {
                        entry.state = LifecycleState::Idle;
                    }
                }
                LifecycleState::Idle => {
                    if quiet > sleep {
                        entry.state = LifecycleState::Sleeping;
                        events.push(Event::SleepStart);
                    }
                }
                LifecycleState::Sleeping => {
                    if quiet > dormant {
                        entry.state = LifecycleState::Dormant;
                        events.push(Event::SleepEnd);
                        events.push(Event::Dormant);
                    }
                }
                LifecycleState::Dormant => {}
            }
            entry.state
        };
        self.dispatch_all(index_id, &events);
        Some(state)
    }

    /// Run the demotion rules across every tracked tenant.
    pub fn check_all(&self) {
        let ids: Vec<String> = self.states.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.check_and_transition(&id);
        }
    }

    /// Force a tenant into Sleeping (from Active, Idle, or Dormant).
    pub fn force_sleep(&self, index_id: &str) {
        let now = Utc::now();
        let mut events = Vec::new();
        {
            let mut entry = self
                .states
                .entry(index_id.to_string())
                .or_insert_with(|| BrainState::new(now));
            if entry.state != LifecycleState::Sleeping {
                entry.state = LifecycleState::Sleeping;
                events.push(Event::SleepStart);
            }
        }
        self.dispatch_all(index_id, &events);
    }

    /// Force a tenant back to Active from any state.
    pub fn force_wake(&self, index_id: &str) {
        let now = Utc::now();
        let mut events = Vec::new();
        {
            let mut entry = self
                .states
                .entry(index_id.to_string())
                .or_insert_with(|| BrainState::new(now));
            match entry.state {
                LifecycleState::Active => {}
                LifecycleState::Idle => entry.state = LifecycleState::Active,
                LifecycleState::Sleeping => {
                    entry.state = LifecycleState::Active;
                    events.push(Event::SleepEnd);
                    events.push(Event::Wake);
                }
                LifecycleState::Dormant => {
                    entry.state = LifecycleState::Active;
                    events.push(Event::Wake);
                }
            }
            entry.last_invoke = now;
        }
        self.dispatch_all(index_id, &events);
    }

    /// Start the background monitor. The tick length re-reads config, so
    /// `set_thresholds` takes effect without a restart.
    pub fn spawn_monitor(self: &Arc<Self>, mut cancel: watch::Receiver<bool>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let tick = std::time::Duration::from_millis(
                    manager.cfg.read().check_interval_ms.max(1),
                );
                tokio::select! {
                    _ = tokio::time::sleep(tick) => manager.check_all(),
                    _ = cancel.changed() => break,
                }
            }
        })
    }

    /// Dispatch callbacks on fresh detached tasks; no manager lock is held
    /// here, and a panicking callback is contained by its task.
    fn dispatch_all(&self, index_id: &str, events: &[Event]) {
        if events.is_empty() {
            return;
        }
        let callbacks = self.callbacks.read().clone();
        for event in events {
            let cb = match event {
                Event::SleepStart => callbacks.on_sleep_start.clone(),
                Event::SleepEnd => callbacks.on_sleep_end.clone(),
                Event::Wake => callbacks.on_wake.clone(),
                Event::Dormant => callbacks.on_dormant.clone(),
            };
            let Some(cb) = cb else { continue };
            let id = index_id.to_string();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    cb(&id);
                });
            } else {
                // No runtime: invoke inline, still isolating panics.
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(&id)));
                if result.is_err() {
                    tracing::warn!("lifecycle callback panicked for {id}");
                }
            }
        }
    }
}

fn threshold(per_tenant: Option<Duration>, manager_ms: u64) -> Duration {
    per_tenant.unwrap_or_else(|| Duration::milliseconds(manager_ms as i64))
}

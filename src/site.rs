//! The core surface the front end drives: quota gating plus achievements.
//!
//! A generation request flows through [`Site::generate`]: the quota is
//! checked, the content is produced, the generation is recorded, and the
//! achievement catalog is re-evaluated against the new counters.

use chrono::Duration;
use color_eyre::Result;
use std::sync::Arc;
use tracing::info;

use crate::achievements::{
  AchievementEngine, AchievementError, Activity, Catalog, MonthDay, NotificationSink, Snapshot,
};
use crate::clock::Clock;
use crate::quota::{DailyQuotaTracker, QuotaState, UsageCounters};
use crate::store::PersistenceStore;

/// What one accepted generation changed.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
  pub counters: UsageCounters,
  /// Achievement ids newly unlocked by this generation
  pub unlocked: Vec<String>,
}

pub struct Site {
  tracker: DailyQuotaTracker,
  engine: AchievementEngine,
}

impl Site {
  pub fn new(
    catalog: Arc<Catalog>,
    store: Arc<dyn PersistenceStore>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    daily_limit: u32,
    birthday: Option<MonthDay>,
  ) -> Self {
    let tracker = DailyQuotaTracker::new(store.clone(), clock.clone(), daily_limit);
    let engine = AchievementEngine::new(catalog, store, clock, sink).with_birthday(birthday);
    Self { tracker, engine }
  }

  pub fn can_generate(&mut self) -> bool {
    self.tracker.can_generate()
  }

  pub fn quota_state(&mut self) -> QuotaState {
    self.tracker.state()
  }

  pub fn daily_limit(&self) -> u32 {
    self.tracker.daily_limit()
  }

  pub fn counters(&mut self) -> UsageCounters {
    self.tracker.counters().clone()
  }

  pub fn time_until_reset(&self) -> Duration {
    self.tracker.time_until_reset()
  }

  /// Record an accepted generation and apply every rule it may satisfy.
  ///
  /// Callers check [`can_generate`](Self::can_generate) first, or use
  /// [`generate`](Self::generate) which does.
  pub fn record_generation(&mut self) -> GenerationReport {
    let counters = self.tracker.record_generation().clone();
    self.engine.record(Activity::Generation);
    let unlocked = self.engine.evaluate_all(&counters);
    GenerationReport { counters, unlocked }
  }

  /// Produce content if today's quota allows it, then record it.
  ///
  /// Returns `Ok(None)` when the quota is exhausted. A failing producer
  /// leaves every counter untouched.
  pub fn generate<T>(
    &mut self,
    produce: impl FnOnce() -> Result<T>,
  ) -> Result<Option<(T, GenerationReport)>> {
    if !self.can_generate() {
      info!(limit = self.daily_limit(), "generation refused, quota exhausted");
      return Ok(None);
    }

    let content = produce()?;
    let report = self.record_generation();
    Ok(Some((content, report)))
  }

  /// Re-run every rule against the current counters.
  pub fn evaluate_all(&mut self) -> Vec<String> {
    let counters = self.tracker.counters().clone();
    self.engine.evaluate_all(&counters)
  }

  /// Count a user action, then re-evaluate.
  pub fn record_activity(&mut self, activity: Activity) -> Vec<String> {
    self.engine.record(activity);
    self.evaluate_all()
  }

  pub fn unlock(&mut self, id: &str) -> Result<bool, AchievementError> {
    self.engine.unlock(id)
  }

  pub fn snapshot(&self) -> Snapshot {
    self.engine.snapshot()
  }

  pub fn catalog_version(&self) -> u32 {
    self.engine.catalog().version()
  }
}

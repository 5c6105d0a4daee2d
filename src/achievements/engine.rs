//! Achievement unlock state machine.
//!
//! Unlocks are monotonic: an achievement goes from locked to unlocked once,
//! gets stamped, adds its points, is persisted and announced exactly once.
//! Everything else (re-evaluating the same signal, repeated `unlock` calls)
//! is a no-op.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::catalog::{AchievementDefinition, Catalog};
use super::rules::{Category, MonthDay, Signal};
use super::AchievementError;
use crate::clock::Clock;
use crate::quota::UsageCounters;
use crate::store::{load_json, save_json, PersistenceStore};

pub const STATE_KEY: &str = "achievement-state";

/// Receives unlock announcements. Fire-and-forget.
pub trait NotificationSink: Send + Sync {
  fn on_achievement_unlocked(&self, definition: &AchievementDefinition, unlocked_at: DateTime<Utc>);
}

/// Aggregate counters. `total_points` and `unlocked_count` are always
/// derived from the unlocked set; the rest are rule inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineStats {
  pub total_points: u64,
  pub unlocked_count: u32,
  /// Epoch milliseconds of the most recent unlock
  pub last_unlock_time: Option<i64>,
  pub theme_changes: u64,
  pub share_count: u64,
  pub stats_views: u64,
  pub combo_count: u64,
  pub upload_count: u64,
  pub current_streak: u32,
}

/// User actions the engine counts on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
  Generation,
  ThemeChange,
  Share,
  StatsView,
  Upload,
}

/// Stored shape of the engine state.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
  #[serde(default)]
  unlocked_ids: Vec<String>,
  /// Older records list ids under `unlocked`; merged with `unlockedIds`
  #[serde(default, rename = "unlocked", skip_serializing)]
  legacy_unlocked: Vec<String>,
  #[serde(default)]
  timestamps: BTreeMap<String, i64>,
  #[serde(default)]
  stats: EngineStats,
}

/// Read-only view of one definition merged with its unlock state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AchievementView {
  pub id: String,
  pub name: String,
  pub description: String,
  pub icon: String,
  pub category: Category,
  pub requirement: u64,
  pub points: u64,
  pub unlocked: bool,
  pub unlocked_at: Option<DateTime<Utc>>,
}

/// Owned copy of the whole engine state for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
  pub achievements: Vec<AchievementView>,
  pub total_points: u64,
  pub unlocked_count: u32,
  pub catalog_size: usize,
  pub stats: EngineStats,
}

impl Snapshot {
  pub fn completion_percent(&self) -> f64 {
    if self.catalog_size == 0 {
      return 0.0;
    }
    f64::from(self.unlocked_count) * 100.0 / self.catalog_size as f64
  }
}

pub struct AchievementEngine {
  catalog: Arc<Catalog>,
  /// Unlock instants, parallel to `catalog.definitions()`
  unlocked_at: Vec<Option<DateTime<Utc>>>,
  stats: EngineStats,
  store: Arc<dyn PersistenceStore>,
  clock: Arc<dyn Clock>,
  sink: Arc<dyn NotificationSink>,
  birthday: Option<MonthDay>,
  /// False after a failed load; unlocks then live in memory only
  writable: bool,
}

impl AchievementEngine {
  /// Create an engine and restore whatever state the store holds.
  pub fn new(
    catalog: Arc<Catalog>,
    store: Arc<dyn PersistenceStore>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
  ) -> Self {
    let mut engine = Self {
      unlocked_at: vec![None; catalog.len()],
      catalog,
      stats: EngineStats::default(),
      store,
      clock,
      sink,
      birthday: None,
      writable: true,
    };
    engine.load();
    engine
  }

  /// Enable the birthday achievement for the given day.
  pub fn with_birthday(mut self, birthday: Option<MonthDay>) -> Self {
    self.birthday = birthday;
    self
  }

  pub fn catalog(&self) -> &Catalog {
    &self.catalog
  }

  #[cfg(test)]
  pub fn stats(&self) -> &EngineStats {
    &self.stats
  }

  #[cfg(test)]
  pub fn is_unlocked(&self, id: &str) -> Result<bool, AchievementError> {
    let index = self.require(id)?;
    Ok(self.unlocked_at[index].is_some())
  }

  /// Unlock `id`. Returns `Ok(true)` on the locked→unlocked transition and
  /// `Ok(false)` if it was already unlocked.
  pub fn unlock(&mut self, id: &str) -> Result<bool, AchievementError> {
    let index = self.require(id)?;
    Ok(self.unlock_index(index))
  }

  /// Unlock every locked definition whose rule `signal` satisfies.
  ///
  /// Returns the ids unlocked by this call.
  pub fn evaluate(&mut self, signal: &Signal<'_>) -> Vec<String> {
    let satisfied: Vec<usize> = self
      .catalog
      .definitions()
      .iter()
      .enumerate()
      .filter(|(i, d)| self.unlocked_at[*i].is_none() && d.rule.is_satisfied_by(signal))
      .map(|(i, _)| i)
      .collect();

    let mut unlocked = Vec::with_capacity(satisfied.len());
    for index in satisfied {
      if self.unlock_index(index) {
        unlocked.push(self.catalog.definitions()[index].id.clone());
      }
    }
    unlocked
  }

  /// Re-derive every signal from the current counters and evaluate them.
  ///
  /// Meta rules run after everything else in the same pass; the
  /// "all others" rule runs last.
  pub fn evaluate_all(&mut self, usage: &UsageCounters) -> Vec<String> {
    if self.stats.current_streak != usage.current_streak {
      self.stats.current_streak = usage.current_streak;
      self.save();
    }

    let mut signals = vec![
      Signal::GenerationTotal(usage.total_generated),
      Signal::Combo(self.stats.combo_count),
      Signal::Streak(usage.current_streak),
      Signal::RecentGenerations(&usage.recent_generations),
      Signal::ThemeChanges(self.stats.theme_changes),
      Signal::StatsViews(self.stats.stats_views),
      Signal::Shares(self.stats.share_count),
      Signal::Uploads(self.stats.upload_count),
    ];
    if let Some(last) = usage.last_generation {
      signals.push(Signal::HourOfDay(last.hour()));
      signals.push(Signal::Date {
        date: last.date_naive(),
        birthday: self.birthday,
      });
    }

    let mut unlocked = Vec::new();
    for signal in &signals {
      unlocked.extend(self.evaluate(signal));
    }

    let count = Signal::UnlockedCount(self.stats.unlocked_count);
    unlocked.extend(self.evaluate(&count));

    let completion = Signal::Completion {
      unlocked: self.stats.unlocked_count,
      total: self.catalog.len(),
    };
    unlocked.extend(self.evaluate(&completion));

    if !unlocked.is_empty() {
      debug!(?unlocked, "evaluation pass unlocked achievements");
    }
    unlocked
  }

  /// Count an activity and persist the counter. Call
  /// [`evaluate_all`](Self::evaluate_all) afterwards to apply rules.
  pub fn record(&mut self, activity: Activity) {
    let stats = &mut self.stats;
    match activity {
      Activity::Generation => stats.combo_count += 1,
      Activity::ThemeChange => stats.theme_changes += 1,
      Activity::Share => stats.share_count += 1,
      Activity::StatsView => stats.stats_views += 1,
      Activity::Upload => stats.upload_count += 1,
    }
    debug!(?activity, "activity recorded");
    self.save();
  }

  pub fn snapshot(&self) -> Snapshot {
    let achievements = self
      .catalog
      .definitions()
      .iter()
      .zip(&self.unlocked_at)
      .map(|(d, at)| AchievementView {
        id: d.id.clone(),
        name: d.name.clone(),
        description: d.description.clone(),
        icon: d.icon.clone(),
        category: d.category,
        requirement: d.requirement,
        points: d.points,
        unlocked: at.is_some(),
        unlocked_at: *at,
      })
      .collect();

    Snapshot {
      achievements,
      total_points: self.stats.total_points,
      unlocked_count: self.stats.unlocked_count,
      catalog_size: self.catalog.len(),
      stats: self.stats.clone(),
    }
  }

  fn require(&self, id: &str) -> Result<usize, AchievementError> {
    self
      .catalog
      .index_of(id)
      .ok_or_else(|| AchievementError::UnknownId(id.to_string()))
  }

  fn unlock_index(&mut self, index: usize) -> bool {
    if self.unlocked_at[index].is_some() {
      return false;
    }

    let now = self.clock.now().with_timezone(&Utc);
    self.unlocked_at[index] = Some(now);

    let definition = &self.catalog.definitions()[index];
    self.stats.unlocked_count += 1;
    self.stats.total_points += definition.points;
    self.stats.last_unlock_time = Some(now.timestamp_millis());

    info!(
      id = %definition.id,
      points = definition.points,
      total_points = self.stats.total_points,
      "achievement unlocked"
    );

    self.save();
    self
      .sink
      .on_achievement_unlocked(&self.catalog.definitions()[index], now);
    true
  }

  /// Restore state, ignoring ids the catalog no longer has and
  /// recomputing derived totals from the unlocked set.
  fn load(&mut self) {
    let persisted = match load_json::<PersistedState>(self.store.as_ref(), STATE_KEY) {
      Ok(Some(persisted)) => persisted,
      Ok(None) => return,
      Err(e) => {
        warn!(error = %e, "achievement read failed, not persisting this session");
        self.writable = false;
        return;
      }
    };

    let fallback = self.clock.now().with_timezone(&Utc);
    let unique: BTreeSet<&String> = persisted
      .unlocked_ids
      .iter()
      .chain(&persisted.legacy_unlocked)
      .collect();
    for id in unique {
      let Some(index) = self.catalog.index_of(id) else {
        warn!(id = %id, "ignoring stored achievement missing from catalog");
        continue;
      };
      let at = persisted
        .timestamps
        .get(id)
        .and_then(|ms| DateTime::from_timestamp_millis(*ms))
        .unwrap_or(fallback);
      self.unlocked_at[index] = Some(at);
    }

    let mut stats = persisted.stats;
    let (count, points) = self
      .catalog
      .definitions()
      .iter()
      .zip(&self.unlocked_at)
      .filter(|(_, at)| at.is_some())
      .fold((0u32, 0u64), |(c, p), (d, _)| (c + 1, p + d.points));
    stats.unlocked_count = count;
    stats.total_points = points;
    if stats.last_unlock_time.is_none() {
      stats.last_unlock_time = self
        .unlocked_at
        .iter()
        .flatten()
        .map(|t| t.timestamp_millis())
        .max();
    }
    self.stats = stats;

    debug!(
      unlocked = self.stats.unlocked_count,
      points = self.stats.total_points,
      "achievement state restored"
    );
  }

  fn save(&self) {
    if !self.writable {
      return;
    }
    let mut state = PersistedState {
      stats: self.stats.clone(),
      ..Default::default()
    };
    for (definition, at) in self.catalog.definitions().iter().zip(&self.unlocked_at) {
      if let Some(at) = at {
        state.unlocked_ids.push(definition.id.clone());
        state
          .timestamps
          .insert(definition.id.clone(), at.timestamp_millis());
      }
    }

    if let Err(e) = save_json(self.store.as_ref(), STATE_KEY, &state) {
      warn!(error = %e, "failed to persist achievements, continuing in memory");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::{at, ManualClock};
  use crate::store::testing::{FailingStore, UnreadableStore};
  use crate::store::MemoryStore;
  use chrono::{DateTime, FixedOffset};
  use std::sync::Mutex;

  #[derive(Default)]
  struct RecordingSink {
    seen: Mutex<Vec<String>>,
  }

  impl RecordingSink {
    fn ids(&self) -> Vec<String> {
      self.seen.lock().unwrap().clone()
    }
  }

  impl NotificationSink for RecordingSink {
    fn on_achievement_unlocked(&self, definition: &AchievementDefinition, _at: DateTime<Utc>) {
      self.seen.lock().unwrap().push(definition.id.clone());
    }
  }

  const SMALL_CATALOG: &str = r#"
version: 1
achievements:
  - { id: one, name: One, points: 10, rule: { kind: generation_total, threshold: 1 } }
  - { id: three, name: Three, points: 30, rule: { kind: generation_total, threshold: 3 } }
  - { id: sharer, name: Sharer, points: 5, rule: { kind: shares, threshold: 2 } }
  - { id: themer, name: Themer, points: 7, rule: { kind: theme_changes, threshold: 1 } }
  - { id: legend, name: Legend, points: 100, rule: { kind: all_others } }
"#;

  struct Harness {
    engine: AchievementEngine,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    sink: Arc<RecordingSink>,
  }

  fn harness(catalog: Catalog) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(at("2025-06-01T12:00:00+00:00")));
    let sink = Arc::new(RecordingSink::default());
    let engine = AchievementEngine::new(
      Arc::new(catalog),
      store.clone(),
      clock.clone(),
      sink.clone(),
    );
    Harness {
      engine,
      store,
      clock,
      sink,
    }
  }

  fn small() -> Harness {
    harness(Catalog::from_yaml(SMALL_CATALOG).unwrap())
  }

  fn builtin() -> Harness {
    harness(Catalog::builtin().unwrap())
  }

  fn usage(total: u64) -> UsageCounters {
    UsageCounters {
      total_generated: total,
      ..Default::default()
    }
  }

  fn generated_at(instant: DateTime<FixedOffset>) -> UsageCounters {
    UsageCounters {
      last_generation: Some(instant),
      generated_today: 1,
      total_generated: 1,
      current_streak: 1,
      best_streak: 1,
      recent_generations: vec![instant],
    }
  }

  fn points_of_unlocked(engine: &AchievementEngine) -> u64 {
    engine
      .snapshot()
      .achievements
      .iter()
      .filter(|a| a.unlocked)
      .map(|a| a.points)
      .sum()
  }

  #[test]
  fn test_unlock_transitions_once() {
    let mut h = small();

    assert!(h.engine.unlock("three").unwrap());
    assert_eq!(h.engine.stats().total_points, 30);
    assert_eq!(h.engine.stats().unlocked_count, 1);

    for _ in 0..5 {
      assert!(!h.engine.unlock("three").unwrap());
    }
    assert_eq!(h.engine.stats().total_points, 30);
    assert_eq!(h.sink.ids(), vec!["three"]);
  }

  #[test]
  fn test_unknown_id_fails_loudly() {
    let mut h = small();
    let err = h.engine.unlock("nope").unwrap_err();
    assert!(matches!(err, AchievementError::UnknownId(id) if id == "nope"));
    assert_eq!(h.engine.stats().unlocked_count, 0);
  }

  #[test]
  fn test_points_invariant_over_unlock_sequence() {
    let mut h = builtin();
    let ids = [
      "night_owl",
      "first_generation",
      "night_owl",
      "influencer",
      "generation_5",
      "first_generation",
      "birthday_creator",
    ];
    for id in ids {
      h.engine.unlock(id).unwrap();
      assert_eq!(h.engine.stats().total_points, points_of_unlocked(&h.engine));
      let unlocked = h.engine.snapshot().achievements.iter().filter(|a| a.unlocked).count();
      assert_eq!(h.engine.stats().unlocked_count as usize, unlocked);
    }
    assert_eq!(h.engine.stats().unlocked_count, 5);
  }

  #[test]
  fn test_evaluate_matches_kind_and_threshold() {
    let mut h = small();

    let unlocked = h.engine.evaluate(&Signal::GenerationTotal(2));
    assert_eq!(unlocked, vec!["one"]);

    // Share signal with a large value must not touch generation rules
    let unlocked = h.engine.evaluate(&Signal::Shares(2));
    assert_eq!(unlocked, vec!["sharer"]);

    // Same signal twice: no double award
    assert!(h.engine.evaluate(&Signal::GenerationTotal(3)) == vec!["three"]);
    assert!(h.engine.evaluate(&Signal::GenerationTotal(3)).is_empty());
    assert_eq!(h.engine.stats().total_points, 45);
  }

  #[test]
  fn test_evaluate_all_is_idempotent() {
    let mut h = builtin();
    let counters = generated_at(at("2025-02-14T03:30:00+01:00"));

    let first = h.engine.evaluate_all(&counters);
    assert!(first.contains(&"first_generation".to_string()));
    assert!(first.contains(&"night_owl".to_string()));
    assert!(first.contains(&"valentine_creator".to_string()));

    let points = h.engine.stats().total_points;
    assert!(h.engine.evaluate_all(&counters).is_empty());
    assert_eq!(h.engine.stats().total_points, points);
    assert_eq!(h.sink.ids().len(), first.len());
  }

  #[test]
  fn test_time_of_day_uses_latest_generation() {
    let mut h = builtin();
    h.engine.evaluate_all(&generated_at(at("2025-03-03T05:15:00+00:00")));
    assert!(h.engine.is_unlocked("night_owl").unwrap());
    assert!(h.engine.is_unlocked("early_bird").unwrap());

    let mut h = builtin();
    h.engine.evaluate_all(&generated_at(at("2025-03-03T14:00:00+00:00")));
    assert!(!h.engine.is_unlocked("night_owl").unwrap());
    assert!(!h.engine.is_unlocked("early_bird").unwrap());

    // No generation yet: no time-derived unlocks
    let mut h = builtin();
    h.engine.evaluate_all(&UsageCounters::default());
    assert_eq!(h.engine.stats().unlocked_count, 0);
  }

  #[test]
  fn test_birthday_requires_configuration() {
    let mut h = builtin();
    h.engine.evaluate_all(&generated_at(at("2025-07-09T10:00:00+00:00")));
    assert!(!h.engine.is_unlocked("birthday_creator").unwrap());

    let mut h = builtin();
    h.engine = h.engine.with_birthday(Some("07-09".parse().unwrap()));
    h.engine.evaluate_all(&generated_at(at("2025-07-09T10:00:00+00:00")));
    assert!(h.engine.is_unlocked("birthday_creator").unwrap());
  }

  #[test]
  fn test_speed_window_from_recent_generations() {
    let mut h = builtin();
    let start = at("2025-03-03T14:00:00+00:00");
    let recent: Vec<_> = (0..5).map(|i| start + chrono::Duration::seconds(i * 2)).collect();
    let counters = UsageCounters {
      last_generation: recent.last().copied(),
      total_generated: 5,
      recent_generations: recent,
      ..Default::default()
    };

    h.engine.evaluate_all(&counters);
    assert!(h.engine.is_unlocked("speed_demon").unwrap());
    assert!(!h.engine.is_unlocked("rapid_fire").unwrap());
  }

  #[test]
  fn test_activities_feed_rules() {
    let mut h = small();
    h.engine.record(Activity::Share);
    assert!(h.engine.evaluate_all(&usage(0)).is_empty());

    h.engine.record(Activity::Share);
    h.engine.record(Activity::ThemeChange);
    let unlocked = h.engine.evaluate_all(&usage(0));
    assert_eq!(unlocked, vec!["themer", "sharer"]);
    assert_eq!(h.engine.stats().share_count, 2);
  }

  #[test]
  fn test_legendary_needs_all_others() {
    let mut h = small();
    h.engine.unlock("one").unwrap();
    h.engine.unlock("three").unwrap();
    h.engine.unlock("sharer").unwrap();

    // N-2 unlocked
    assert!(h.engine.evaluate_all(&usage(0)).is_empty());
    assert!(!h.engine.is_unlocked("legend").unwrap());

    // N-1 unlocked
    h.engine.unlock("themer").unwrap();
    assert_eq!(h.engine.evaluate_all(&usage(0)), vec!["legend"]);
    assert_eq!(h.engine.stats().total_points, 152);
  }

  #[test]
  fn test_legendary_in_same_pass_as_last_other() {
    let mut h = small();
    h.engine.record(Activity::Share);
    h.engine.record(Activity::Share);
    h.engine.record(Activity::ThemeChange);

    let unlocked = h.engine.evaluate_all(&usage(3));
    assert_eq!(unlocked.last().map(String::as_str), Some("legend"));
    assert_eq!(h.engine.stats().unlocked_count, 5);
  }

  #[test]
  fn test_round_trip_through_store() {
    let mut h = small();
    h.engine.unlock("one").unwrap();
    h.clock.advance(chrono::Duration::minutes(5));
    h.engine.unlock("sharer").unwrap();
    h.engine.record(Activity::StatsView);
    let before = h.engine.snapshot();

    let restored = AchievementEngine::new(
      Arc::new(Catalog::from_yaml(SMALL_CATALOG).unwrap()),
      h.store.clone(),
      h.clock.clone(),
      Arc::new(RecordingSink::default()),
    );
    assert_eq!(restored.snapshot(), before);
  }

  #[test]
  fn test_load_ignores_unknown_ids_and_recomputes_totals() {
    let h = small();
    h.store
      .set(
        STATE_KEY,
        r#"{"unlocked":["one","retired_badge","one"],"timestamps":{"one":1700000000000},
            "stats":{"totalPoints":99999,"unlockedCount":42,"shareCount":3}}"#,
      )
      .unwrap();

    let engine = AchievementEngine::new(
      Arc::new(Catalog::from_yaml(SMALL_CATALOG).unwrap()),
      h.store.clone(),
      h.clock.clone(),
      h.sink.clone(),
    );
    let stats = engine.stats();
    assert_eq!(stats.unlocked_count, 1);
    assert_eq!(stats.total_points, 10);
    assert_eq!(stats.share_count, 3);
    assert_eq!(stats.last_unlock_time, Some(1_700_000_000_000));
  }

  #[test]
  fn test_load_merges_both_id_lists() {
    let h = small();
    h.store
      .set(
        STATE_KEY,
        r#"{"unlocked":["one","sharer"],"unlockedIds":["three","one"],"timestamps":{}}"#,
      )
      .unwrap();

    let engine = AchievementEngine::new(
      Arc::new(Catalog::from_yaml(SMALL_CATALOG).unwrap()),
      h.store.clone(),
      h.clock.clone(),
      h.sink.clone(),
    );
    assert_eq!(engine.stats().unlocked_count, 3);
    assert_eq!(engine.stats().total_points, 45);
    assert!(engine.is_unlocked("sharer").unwrap());
  }

  #[test]
  fn test_corrupt_record_resets_to_defaults() {
    let h = small();
    h.store.set(STATE_KEY, "{\"unlockedIds\": 7").unwrap();

    let engine = AchievementEngine::new(
      Arc::new(Catalog::from_yaml(SMALL_CATALOG).unwrap()),
      h.store.clone(),
      h.clock.clone(),
      h.sink.clone(),
    );
    assert_eq!(engine.stats(), &EngineStats::default());
  }

  #[test]
  fn test_storage_failure_keeps_working_in_memory() {
    let clock = Arc::new(ManualClock::new(at("2025-06-01T12:00:00+00:00")));
    let sink = Arc::new(RecordingSink::default());
    let mut engine = AchievementEngine::new(
      Arc::new(Catalog::from_yaml(SMALL_CATALOG).unwrap()),
      Arc::new(FailingStore),
      clock,
      sink.clone(),
    );

    assert!(engine.unlock("one").unwrap());
    assert!(!engine.unlock("one").unwrap());
    assert_eq!(engine.stats().total_points, 10);
    assert_eq!(sink.ids(), vec!["one"]);
  }

  #[test]
  fn test_unreadable_state_is_never_overwritten() {
    let stored = r#"{"unlockedIds":["one","three"],"timestamps":{},"stats":{"shareCount":4}}"#;
    let store = Arc::new(UnreadableStore::default());
    store.inner.set(STATE_KEY, stored).unwrap();
    store.set_reads_fail(true);

    let mut engine = AchievementEngine::new(
      Arc::new(Catalog::from_yaml(SMALL_CATALOG).unwrap()),
      store.clone(),
      Arc::new(ManualClock::new(at("2025-06-01T12:00:00+00:00"))),
      Arc::new(RecordingSink::default()),
    );
    assert_eq!(engine.stats().unlocked_count, 0);
    engine.record(Activity::ThemeChange);
    assert_eq!(engine.evaluate_all(&usage(1)), vec!["one", "themer"]);

    store.set_reads_fail(false);
    assert_eq!(store.get(STATE_KEY).unwrap().as_deref(), Some(stored));
  }

  #[test]
  fn test_unlock_is_stamped_with_clock() {
    let mut h = small();
    h.engine.unlock("one").unwrap();
    let snapshot = h.engine.snapshot();
    let one = snapshot.achievements.iter().find(|a| a.id == "one").unwrap();
    assert_eq!(
      one.unlocked_at,
      Some(at("2025-06-01T12:00:00+00:00").with_timezone(&Utc))
    );
    assert!((snapshot.completion_percent() - 20.0).abs() < f64::EPSILON);
  }
}

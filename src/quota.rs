//! Daily generation quota.
//!
//! Each local calendar day starts `Available`; successful generations
//! count toward the daily limit until it is `Exhausted`. The rollover back
//! to `Available` is lazy: the first read after the date changes resets the
//! day counter. No timer is involved.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::store::{load_json, load_parsed, save_json, PersistenceStore, StoreError};

pub const KEY_LAST_GENERATION: &str = "quota-last-generation";
pub const KEY_GENERATED_TODAY: &str = "quota-generated-today";
pub const KEY_TOTAL_GENERATED: &str = "quota-total-generated";
pub const KEY_STREAK: &str = "quota-streak";
pub const KEY_BEST_STREAK: &str = "quota-best-streak";
pub const KEY_RECENT_GENERATIONS: &str = "quota-recent-generations";

/// How many generation instants are kept for burst (speed) rules
const RECENT_HISTORY_LIMIT: usize = 128;

pub const DEFAULT_DAILY_LIMIT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaState {
  Available,
  Exhausted,
}

/// Counters the quota tracker owns and the achievement engine reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageCounters {
  pub last_generation: Option<DateTime<FixedOffset>>,
  pub generated_today: u32,
  pub total_generated: u64,
  /// Consecutive calendar days with at least one generation
  pub current_streak: u32,
  pub best_streak: u32,
  /// Most recent generation instants, oldest first
  pub recent_generations: Vec<DateTime<FixedOffset>>,
}

pub struct DailyQuotaTracker {
  store: Arc<dyn PersistenceStore>,
  clock: Arc<dyn Clock>,
  daily_limit: u32,
  counters: UsageCounters,
  /// Cleared when the initial read failed, so stored counters are never
  /// overwritten with values that didn't start from them
  writable: bool,
}

impl DailyQuotaTracker {
  /// Create a tracker, loading whatever counters the store holds.
  ///
  /// Missing or corrupt values fall back to zero. If the store can't be
  /// read at all the tracker starts from zero and keeps its counters in
  /// memory for the session.
  pub fn new(store: Arc<dyn PersistenceStore>, clock: Arc<dyn Clock>, daily_limit: u32) -> Self {
    let (counters, writable) = match load_counters(store.as_ref()) {
      Ok(counters) => (counters, true),
      Err(e) => {
        warn!(error = %e, "quota read failed, not persisting this session");
        (UsageCounters::default(), false)
      }
    };
    debug!(?counters, daily_limit, writable, "quota counters loaded");

    Self {
      store,
      clock,
      daily_limit: daily_limit.max(1),
      counters,
      writable,
    }
  }

  pub fn daily_limit(&self) -> u32 {
    self.daily_limit
  }

  /// Whether another generation is allowed today.
  pub fn can_generate(&mut self) -> bool {
    self.roll_over();
    self.counters.generated_today < self.daily_limit
  }

  pub fn state(&mut self) -> QuotaState {
    if self.can_generate() {
      QuotaState::Available
    } else {
      QuotaState::Exhausted
    }
  }

  /// Current counters, after applying any pending day rollover.
  pub fn counters(&mut self) -> &UsageCounters {
    self.roll_over();
    &self.counters
  }

  /// Record one accepted generation.
  ///
  /// Callers must have checked [`can_generate`](Self::can_generate) first;
  /// the limit is not re-checked here.
  pub fn record_generation(&mut self) -> &UsageCounters {
    self.roll_over();
    let now = self.clock.now();

    let streak = match self.counters.last_generation {
      None => 1,
      Some(last) => {
        let last_day = local_date(last, &now);
        let today = now.date_naive();
        if last_day == today {
          self.counters.current_streak.max(1)
        } else if last_day.succ_opt() == Some(today) {
          self.counters.current_streak + 1
        } else {
          1
        }
      }
    };

    let counters = &mut self.counters;
    counters.last_generation = Some(now);
    counters.generated_today += 1;
    counters.total_generated += 1;
    counters.current_streak = streak;
    counters.best_streak = counters.best_streak.max(streak);
    counters.recent_generations.push(now);
    if counters.recent_generations.len() > RECENT_HISTORY_LIMIT {
      let excess = counters.recent_generations.len() - RECENT_HISTORY_LIMIT;
      counters.recent_generations.drain(..excess);
    }

    info!(
      today = counters.generated_today,
      total = counters.total_generated,
      streak = counters.current_streak,
      "generation recorded"
    );

    self.persist();
    &self.counters
  }

  /// Time left until the next local midnight, for countdown displays.
  pub fn time_until_reset(&self) -> Duration {
    let now = self.clock.now();
    let next_midnight = now
      .date_naive()
      .succ_opt()
      .map(|day| day.and_time(NaiveTime::MIN))
      .and_then(|naive| now.offset().from_local_datetime(&naive).single());

    match next_midnight {
      Some(midnight) => midnight - now,
      None => Duration::zero(),
    }
  }

  /// Reset the day counter if the last generation happened on an earlier date.
  fn roll_over(&mut self) {
    let Some(last) = self.counters.last_generation else {
      return;
    };
    if self.counters.generated_today == 0 {
      return;
    }

    let now = self.clock.now();
    if local_date(last, &now) != now.date_naive() {
      info!(
        previous = %last,
        "new calendar day, daily quota available again"
      );
      self.counters.generated_today = 0;
      self.write(KEY_GENERATED_TODAY, "0");
    }
  }

  fn persist(&self) {
    if !self.writable {
      return;
    }
    let counters = &self.counters;

    if let Some(last) = counters.last_generation {
      self.write(KEY_LAST_GENERATION, &last.to_rfc3339());
    }
    self.write(KEY_GENERATED_TODAY, &counters.generated_today.to_string());
    self.write(KEY_TOTAL_GENERATED, &counters.total_generated.to_string());
    self.write(KEY_STREAK, &counters.current_streak.to_string());
    self.write(KEY_BEST_STREAK, &counters.best_streak.to_string());

    let recent: Vec<String> = counters
      .recent_generations
      .iter()
      .map(|t| t.to_rfc3339())
      .collect();
    if let Err(e) = save_json(self.store.as_ref(), KEY_RECENT_GENERATIONS, &recent) {
      log_write_failure(KEY_RECENT_GENERATIONS, &e);
    }
  }

  fn write(&self, key: &str, value: &str) {
    if !self.writable {
      return;
    }
    if let Err(e) = self.store.set(key, value) {
      log_write_failure(key, &e);
    }
  }
}

fn log_write_failure(key: &str, error: &StoreError) {
  warn!(key, error = %error, "quota write failed, continuing in memory");
}

/// Calendar date of `instant` as seen in the offset of `reference`.
fn local_date(instant: DateTime<FixedOffset>, reference: &DateTime<FixedOffset>) -> NaiveDate {
  instant.with_timezone(reference.offset()).date_naive()
}

/// Parse a stored instant: RFC 3339 text or epoch milliseconds.
fn parse_instant(raw: &str) -> Option<DateTime<FixedOffset>> {
  let raw = raw.trim();
  if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
    return Some(instant);
  }

  raw
    .parse::<i64>()
    .ok()
    .and_then(DateTime::from_timestamp_millis)
    .map(|utc| utc.fixed_offset())
}

fn load_counters(store: &dyn PersistenceStore) -> Result<UsageCounters, StoreError> {
  let last_generation = load_parsed::<String>(store, KEY_LAST_GENERATION)?.and_then(|raw| {
    let parsed = parse_instant(&raw);
    if parsed.is_none() {
      warn!(value = %raw, "ignoring unparsable last-generation instant");
    }
    parsed
  });

  let recent_generations = load_json::<Vec<String>>(store, KEY_RECENT_GENERATIONS)?
    .unwrap_or_default()
    .iter()
    .filter_map(|raw| parse_instant(raw))
    .collect();

  Ok(UsageCounters {
    last_generation,
    generated_today: load_parsed(store, KEY_GENERATED_TODAY)?.unwrap_or(0),
    total_generated: load_parsed(store, KEY_TOTAL_GENERATED)?.unwrap_or(0),
    current_streak: load_parsed(store, KEY_STREAK)?.unwrap_or(0),
    best_streak: load_parsed(store, KEY_BEST_STREAK)?.unwrap_or(0),
    recent_generations,
  })
}

//! Rule kinds and the signals they are evaluated against.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Display/grouping tag for an achievement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
  GenerationCount,
  Streak,
  SpeedWindow,
  TimeOfDay,
  Social,
  Upload,
  SpecialDate,
  Meta,
}

impl Category {
  #[cfg(test)]
  pub const ALL: [Category; 8] = [
    Category::GenerationCount,
    Category::Streak,
    Category::SpeedWindow,
    Category::TimeOfDay,
    Category::Social,
    Category::Upload,
    Category::SpecialDate,
    Category::Meta,
  ];

  pub fn label(&self) -> &'static str {
    match self {
      Category::GenerationCount => "generation-count",
      Category::Streak => "streak",
      Category::SpeedWindow => "speed-window",
      Category::TimeOfDay => "time-of-day",
      Category::Social => "social",
      Category::Upload => "upload",
      Category::SpecialDate => "special-date",
      Category::Meta => "meta",
    }
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// Unlock condition of a single achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
  /// Lifetime generations reach the threshold
  GenerationTotal { threshold: u64 },
  /// Generations recorded by the engine itself (combo counter)
  Combo { threshold: u64 },
  /// Consecutive calendar days with a generation
  Streak { days: u32 },
  /// `count` generations inside any window of `window_secs`
  SpeedWindow { count: u32, window_secs: u64 },
  /// Latest generation happened in `[start_hour, end_hour)`
  TimeOfDay { start_hour: u32, end_hour: u32 },
  ThemeChanges { threshold: u64 },
  StatsViews { threshold: u64 },
  Shares { threshold: u64 },
  Uploads { threshold: u64 },
  /// Latest generation happened on this month/day
  SpecialDate { month: u32, day: u32 },
  /// Latest generation happened on the configured birthday
  Birthday,
  /// At least `threshold` achievements unlocked
  UnlockedCount { threshold: u32 },
  /// Every other achievement unlocked
  AllOthers,
}

impl Rule {
  pub fn category(&self) -> Category {
    match self {
      Rule::GenerationTotal { .. } | Rule::Combo { .. } => Category::GenerationCount,
      Rule::Streak { .. } => Category::Streak,
      Rule::SpeedWindow { .. } => Category::SpeedWindow,
      Rule::TimeOfDay { .. } => Category::TimeOfDay,
      Rule::ThemeChanges { .. } | Rule::StatsViews { .. } | Rule::Shares { .. } => Category::Social,
      Rule::Uploads { .. } => Category::Upload,
      Rule::SpecialDate { .. } | Rule::Birthday => Category::SpecialDate,
      Rule::UnlockedCount { .. } | Rule::AllOthers => Category::Meta,
    }
  }

  /// Numeric requirement shown to users; `catalog_size` resolves `AllOthers`.
  pub fn requirement(&self, catalog_size: usize) -> u64 {
    match *self {
      Rule::GenerationTotal { threshold }
      | Rule::Combo { threshold }
      | Rule::ThemeChanges { threshold }
      | Rule::StatsViews { threshold }
      | Rule::Shares { threshold }
      | Rule::Uploads { threshold } => threshold,
      Rule::Streak { days } => u64::from(days),
      Rule::SpeedWindow { count, .. } => u64::from(count),
      Rule::UnlockedCount { threshold } => u64::from(threshold),
      Rule::TimeOfDay { .. } | Rule::SpecialDate { .. } | Rule::Birthday => 1,
      Rule::AllOthers => catalog_size.saturating_sub(1) as u64,
    }
  }

  /// Check the rule's own parameters, returning a reason when malformed.
  pub fn validate(&self) -> Result<(), String> {
    match *self {
      Rule::GenerationTotal { threshold }
      | Rule::Combo { threshold }
      | Rule::ThemeChanges { threshold }
      | Rule::StatsViews { threshold }
      | Rule::Shares { threshold }
      | Rule::Uploads { threshold } => positive(threshold),
      Rule::Streak { days } => positive(u64::from(days)),
      Rule::UnlockedCount { threshold } => positive(u64::from(threshold)),
      Rule::SpeedWindow { count, window_secs } => {
        positive(u64::from(count))?;
        positive(window_secs)?;
        if window_secs > MAX_WINDOW_SECS {
          return Err(format!(
            "window of {}s exceeds the {}s maximum",
            window_secs, MAX_WINDOW_SECS
          ));
        }
        Ok(())
      }
      Rule::TimeOfDay {
        start_hour,
        end_hour,
      } => {
        if start_hour < end_hour && end_hour <= 24 {
          Ok(())
        } else {
          Err(format!("invalid hour range {}..{}", start_hour, end_hour))
        }
      }
      Rule::SpecialDate { month, day } => MonthDay::new(month, day).map(|_| ()),
      Rule::Birthday | Rule::AllOthers => Ok(()),
    }
  }

  /// Whether `signal` satisfies this rule. Signals of another kind never do.
  pub fn is_satisfied_by(&self, signal: &Signal<'_>) -> bool {
    match *self {
      Rule::GenerationTotal { threshold } => {
        matches!(*signal, Signal::GenerationTotal(v) if v >= threshold)
      }
      Rule::Combo { threshold } => matches!(*signal, Signal::Combo(v) if v >= threshold),
      Rule::Streak { days } => matches!(*signal, Signal::Streak(v) if v >= days),
      Rule::SpeedWindow { count, window_secs } => match *signal {
        Signal::RecentGenerations(times) => window(window_secs)
          .is_some_and(|window| busiest_window(times, window) >= count as usize),
        _ => false,
      },
      Rule::TimeOfDay {
        start_hour,
        end_hour,
      } => matches!(*signal, Signal::HourOfDay(h) if (start_hour..end_hour).contains(&h)),
      Rule::ThemeChanges { threshold } => {
        matches!(*signal, Signal::ThemeChanges(v) if v >= threshold)
      }
      Rule::StatsViews { threshold } => matches!(*signal, Signal::StatsViews(v) if v >= threshold),
      Rule::Shares { threshold } => matches!(*signal, Signal::Shares(v) if v >= threshold),
      Rule::Uploads { threshold } => matches!(*signal, Signal::Uploads(v) if v >= threshold),
      Rule::SpecialDate { month, day } => {
        matches!(*signal, Signal::Date { date, .. } if date.month() == month && date.day() == day)
      }
      Rule::Birthday => matches!(
        *signal,
        Signal::Date { date, birthday: Some(birthday) } if birthday.matches(date)
      ),
      Rule::UnlockedCount { threshold } => {
        matches!(*signal, Signal::UnlockedCount(v) if v >= threshold)
      }
      Rule::AllOthers => matches!(
        *signal,
        Signal::Completion { unlocked, total } if unlocked as usize + 1 >= total
      ),
    }
  }
}

/// Longest burst window a speed rule may use (one year)
const MAX_WINDOW_SECS: u64 = 86_400 * 365;

fn window(secs: u64) -> Option<Duration> {
  i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

fn positive(value: u64) -> Result<(), String> {
  if value > 0 {
    Ok(())
  } else {
    Err("threshold must be positive".to_string())
  }
}

/// A typed observation fed to the rule catalog.
#[derive(Debug, Clone, Copy)]
pub enum Signal<'a> {
  GenerationTotal(u64),
  Combo(u64),
  Streak(u32),
  RecentGenerations(&'a [DateTime<FixedOffset>]),
  HourOfDay(u32),
  ThemeChanges(u64),
  StatsViews(u64),
  Shares(u64),
  Uploads(u64),
  Date {
    date: NaiveDate,
    birthday: Option<MonthDay>,
  },
  UnlockedCount(u32),
  /// Unlocked achievements out of the whole catalog
  Completion {
    unlocked: u32,
    total: usize,
  },
}

/// Largest number of instants falling inside one window (inclusive).
fn busiest_window(times: &[DateTime<FixedOffset>], window: Duration) -> usize {
  let mut sorted = times.to_vec();
  sorted.sort();

  let mut best = 0;
  let mut start = 0;
  for end in 0..sorted.len() {
    while sorted[end] - sorted[start] > window {
      start += 1;
    }
    best = best.max(end - start + 1);
  }
  best
}

/// A recurring calendar day, e.g. a birthday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthDay {
  month: u32,
  day: u32,
}

impl MonthDay {
  pub fn new(month: u32, day: u32) -> Result<Self, String> {
    // Leap year so that 02-29 is accepted
    if NaiveDate::from_ymd_opt(2000, month, day).is_none() {
      return Err(format!("invalid month/day {:02}-{:02}", month, day));
    }
    Ok(Self { month, day })
  }

  pub fn matches(&self, date: NaiveDate) -> bool {
    date.month() == self.month && date.day() == self.day
  }
}

impl FromStr for MonthDay {
  type Err = String;

  /// Parse `MM-DD`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (month, day) = s
      .trim()
      .split_once('-')
      .ok_or_else(|| format!("expected MM-DD, got '{}'", s))?;
    let month = month
      .parse()
      .map_err(|_| format!("invalid month in '{}'", s))?;
    let day = day.parse().map_err(|_| format!("invalid day in '{}'", s))?;
    Self::new(month, day)
  }
}

impl fmt::Display for MonthDay {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:02}-{:02}", self.month, self.day)
  }
}

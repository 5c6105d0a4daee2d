//! Achievement catalog, rule evaluation and unlock state.

mod catalog;
mod engine;
mod rules;

pub use catalog::{AchievementDefinition, Catalog};
pub use engine::{AchievementEngine, Activity, NotificationSink, Snapshot};
pub use rules::MonthDay;

#[derive(Debug, thiserror::Error)]
pub enum AchievementError {
  /// Caller referenced an id that isn't in the catalog (a programming error)
  #[error("unknown achievement id '{0}'")]
  UnknownId(String),
  #[error("invalid achievement catalog: {0}")]
  Catalog(String),
}

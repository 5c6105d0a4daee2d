mod achievements;
mod cache;
mod clock;
mod config;
mod db;
mod logging;
mod quota;
mod site;
mod stl;
mod store;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use achievements::{AchievementDefinition, Activity, Catalog, NotificationSink};
use cache::{
  CacheController, CacheNames, CacheStorage, HttpTransport, MemoryStorage, NoopStorage, Request,
  SqliteStorage,
};
use clock::{Clock, ManualClock, SystemClock};
use config::Config;
use db::Database;
use site::Site;
use store::{MemoryStore, PersistenceStore, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "flick")]
#[command(about = "One 3D model a day, with achievements and an offline cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/flick/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Keep all state in memory for this run
  #[arg(long)]
  ephemeral: bool,

  /// Pretend the current time is this RFC 3339 instant
  #[arg(long, value_parser = parse_now)]
  now: Option<DateTime<chrono::FixedOffset>>,

  /// Override the configured daily generation limit
  #[arg(long)]
  daily_limit: Option<u32>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show today's quota and counters
  Status,
  /// Generate today's model
  Generate {
    /// Directory the STL file is written to
    #[arg(long, default_value = ".")]
    out: PathBuf,
  },
  /// List achievements
  Achievements {
    /// Include locked achievements
    #[arg(long)]
    all: bool,
  },
  /// Record a user action
  Event { kind: EventKind },
  /// Unlock an achievement by id
  Unlock { id: String },
  /// Manage the offline cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
  /// Fetch a URL or site path through the cache
  Fetch {
    target: String,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
  },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// Pre-populate the static cache
  Install,
  /// Delete outdated caches
  Activate,
  /// Delete outdated caches carrying our prefix
  Sweep,
  /// Show cache namespaces and their entries
  List,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EventKind {
  Theme,
  Share,
  StatsView,
  Upload,
}

impl From<EventKind> for Activity {
  fn from(kind: EventKind) -> Self {
    match kind {
      EventKind::Theme => Activity::ThemeChange,
      EventKind::Share => Activity::Share,
      EventKind::StatsView => Activity::StatsView,
      EventKind::Upload => Activity::Upload,
    }
  }
}

fn parse_now(raw: &str) -> Result<DateTime<chrono::FixedOffset>, String> {
  DateTime::parse_from_rfc3339(raw).map_err(|e| format!("expected an RFC 3339 instant: {}", e))
}

/// Announces unlocks on stdout.
struct ConsoleSink;

impl NotificationSink for ConsoleSink {
  fn on_achievement_unlocked(&self, definition: &AchievementDefinition, _at: DateTime<Utc>) {
    println!(
      "{} Achievement unlocked: {} (+{} points)",
      definition.icon, definition.name, definition.points
    );
  }
}

/// Storage backends for this run.
struct Backends {
  store: Arc<dyn PersistenceStore>,
  cache: Arc<dyn CacheStorage>,
}

impl Backends {
  fn open(config: &Config, ephemeral: bool, data_dir: &Path) -> Result<Self> {
    let (store, cache): (Arc<dyn PersistenceStore>, Arc<dyn CacheStorage>) = if ephemeral {
      (Arc::new(MemoryStore::new()), Arc::new(MemoryStorage::new()))
    } else {
      let db = Database::open(data_dir)?;
      (Arc::new(SqliteStore::new(&db)), Arc::new(SqliteStorage::new(&db)))
    };

    let cache = if config.cache.enabled {
      cache
    } else {
      Arc::new(NoopStorage)
    };
    Ok(Self { store, cache })
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let mut config = Config::load(args.config.as_deref())?;
  if let Some(limit) = args.daily_limit {
    config.daily_limit = limit;
    config.validate()?;
  }

  let data_dir = config.data_dir()?;
  let _log_guard = logging::init(&data_dir.join("logs"))?;
  tracing::debug!(?config, "configuration loaded");

  let clock: Arc<dyn Clock> = match args.now {
    Some(now) => Arc::new(ManualClock::new(now)),
    None => Arc::new(SystemClock),
  };
  let backends = Backends::open(&config, args.ephemeral, &data_dir)?;

  let open_site = || -> Result<Site> {
    Ok(Site::new(
      Arc::new(Catalog::builtin()?),
      backends.store.clone(),
      clock.clone(),
      Arc::new(ConsoleSink),
      config.daily_limit,
      config.birthday,
    ))
  };

  match args.command {
    Command::Status => print_status(&mut open_site()?),
    Command::Generate { out } => generate(&mut open_site()?, clock.as_ref(), &out)?,
    Command::Achievements { all } => print_achievements(&open_site()?, all),
    Command::Event { kind } => {
      let unlocked = open_site()?.record_activity(kind.into());
      if unlocked.is_empty() {
        println!("Recorded {:?}", kind);
      }
    }
    Command::Unlock { id } => {
      if !open_site()?.unlock(&id)? {
        println!("{} was already unlocked", id);
      }
    }
    Command::Cache { action } => run_cache(&config, backends.cache, action).await?,
    Command::Fetch { target, navigate } => {
      run_fetch(&config, backends.cache, &target, navigate).await?
    }
  }

  Ok(())
}

fn generate(site: &mut Site, clock: &dyn Clock, out: &Path) -> Result<()> {
  let now = clock.now();
  let generated = site.generate(|| {
    let model = stl::generate(&mut rand::thread_rng(), now);
    std::fs::create_dir_all(out)?;
    let path = out.join(&model.file_name);
    std::fs::write(&path, &model.contents)
      .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
    Ok((path, model.edge_mm))
  })?;

  let Some(((path, edge_mm), report)) = generated else {
    return Err(eyre!(
      "Daily limit of {} reached. Next model in {}",
      site.daily_limit(),
      format_duration(site.time_until_reset())
    ));
  };
  println!("Generated {} ({} mm cube)", path.display(), edge_mm);
  println!(
    "Total models: {}, streak: {} day(s)",
    report.counters.total_generated, report.counters.current_streak
  );
  Ok(())
}

fn print_status(site: &mut Site) {
  let state = site.quota_state();
  let counters = site.counters();
  println!("Quota: {:?} ({}/{} today)", state, counters.generated_today, site.daily_limit());
  println!("Total generated: {}", counters.total_generated);
  println!(
    "Streak: {} day(s), best {}",
    counters.current_streak, counters.best_streak
  );
  match counters.last_generation {
    Some(last) => println!("Last generation: {}", last.to_rfc3339()),
    None => println!("Last generation: never"),
  }
  println!("Resets in: {}", format_duration(site.time_until_reset()));
}

fn print_achievements(site: &Site, all: bool) {
  let snapshot = site.snapshot();
  println!(
    "Catalog v{}: {}/{} unlocked ({:.1}%), {} points",
    site.catalog_version(),
    snapshot.unlocked_count,
    snapshot.catalog_size,
    snapshot.completion_percent(),
    snapshot.total_points
  );
  for achievement in snapshot.achievements.iter().filter(|a| all || a.unlocked) {
    let mark = if achievement.unlocked { "x" } else { " " };
    println!(
      "[{}] {} {:<22} {:<14} {:>4}  {}",
      mark,
      achievement.icon,
      achievement.name,
      achievement.category.label(),
      achievement.points,
      achievement.description
    );
  }
}

fn controller(config: &Config, storage: Arc<dyn CacheStorage>) -> Result<CacheController> {
  let origin = url::Url::parse(&config.cache.origin)?;
  let transport = HttpTransport::new(Duration::from_secs(config.cache.request_timeout_secs))?;
  Ok(CacheController::new(
    storage,
    Arc::new(transport),
    CacheNames::new(&config.cache.prefix, &config.cache.version),
    origin,
    config.cache.static_assets.clone(),
  ))
}

async fn run_cache(config: &Config, storage: Arc<dyn CacheStorage>, action: CacheAction) -> Result<()> {
  let controller = controller(config, storage)?;
  match action {
    CacheAction::Install => {
      let report = controller.install().await;
      println!("Cached {} asset(s)", report.cached.len());
      for (asset, reason) in &report.failed {
        println!("  failed {}: {}", asset, reason);
      }
    }
    CacheAction::Activate => {
      for name in controller.activate()? {
        println!("Deleted {}", name);
      }
    }
    CacheAction::Sweep => {
      for name in controller.sweep()? {
        println!("Deleted {}", name);
      }
    }
    CacheAction::List => {
      let storage = controller.storage();
      let names = controller.names();
      for name in storage.keys()? {
        let urls = storage.urls(&name)?;
        let current = name == names.static_name || name == names.dynamic_name;
        let marker = if current { "*" } else { " " };
        println!("{} {} ({} entries)", marker, name, urls.len());
        for url in urls {
          println!("  {}", url);
        }
      }
    }
  }
  Ok(())
}

async fn run_fetch(
  config: &Config,
  storage: Arc<dyn CacheStorage>,
  target: &str,
  navigate: bool,
) -> Result<()> {
  let controller = controller(config, storage)?;
  controller.start().await?;
  let sweeper = controller.spawn_sweeper(config.cache.sweep_interval());

  let url = controller.resolve(target)?;
  let request = if navigate {
    Request::navigate(url)
  } else {
    Request::get(url)
  };
  let served = controller.handle(request).await?;
  println!(
    "{} {:?} {} bytes ({})",
    served.response.status,
    served.source,
    served.response.body.len(),
    served.response.header("content-type").unwrap_or("unknown type")
  );

  controller.settle().await;
  sweeper.abort();
  Ok(())
}

fn format_duration(duration: chrono::Duration) -> String {
  let secs = duration.num_seconds().max(0);
  format!("{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}

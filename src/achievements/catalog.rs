//! The immutable achievement catalog.
//!
//! Definitions are data, not code: the built-in catalog is a YAML document
//! compiled into the binary and validated once at load time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::rules::{Category, Rule};
use super::AchievementError;

const BUILTIN_CATALOG: &str = include_str!("catalog.yaml");

/// One achievement as defined in the catalog. Never mutated after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AchievementDefinition {
  pub id: String,
  pub name: String,
  pub description: String,
  pub icon: String,
  pub category: Category,
  /// Numeric requirement shown alongside progress
  pub requirement: u64,
  pub points: u64,
  pub rule: Rule,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
  version: u32,
  achievements: Vec<DefinitionEntry>,
}

#[derive(Debug, Deserialize)]
struct DefinitionEntry {
  id: String,
  name: String,
  #[serde(default)]
  description: String,
  #[serde(default)]
  icon: String,
  points: u64,
  rule: Rule,
}

#[derive(Debug)]
pub struct Catalog {
  version: u32,
  definitions: Vec<AchievementDefinition>,
  index: HashMap<String, usize>,
}

impl Catalog {
  /// Load the catalog shipped with the binary.
  pub fn builtin() -> Result<Self, AchievementError> {
    Self::from_yaml(BUILTIN_CATALOG)
  }

  /// Parse and validate a catalog document.
  ///
  /// Fails on duplicate ids, malformed rules, or anything other than
  /// exactly one "all others" meta rule.
  pub fn from_yaml(source: &str) -> Result<Self, AchievementError> {
    let file: CatalogFile = serde_yaml::from_str(source)
      .map_err(|e| AchievementError::Catalog(format!("failed to parse catalog: {}", e)))?;

    if file.achievements.is_empty() {
      return Err(AchievementError::Catalog("catalog is empty".into()));
    }

    let size = file.achievements.len();
    let mut index = HashMap::with_capacity(size);
    let mut definitions = Vec::with_capacity(size);

    for entry in file.achievements {
      if index.contains_key(&entry.id) {
        return Err(AchievementError::Catalog(format!(
          "duplicate achievement id '{}'",
          entry.id
        )));
      }
      entry
        .rule
        .validate()
        .map_err(|reason| AchievementError::Catalog(format!("{}: {}", entry.id, reason)))?;

      index.insert(entry.id.clone(), definitions.len());
      definitions.push(AchievementDefinition {
        category: entry.rule.category(),
        requirement: entry.rule.requirement(size),
        id: entry.id,
        name: entry.name,
        description: entry.description,
        icon: entry.icon,
        points: entry.points,
        rule: entry.rule,
      });
    }

    let completion_rules = definitions
      .iter()
      .filter(|d| d.rule == Rule::AllOthers)
      .count();
    if completion_rules != 1 {
      return Err(AchievementError::Catalog(format!(
        "expected exactly one all_others rule, found {}",
        completion_rules
      )));
    }

    Ok(Self {
      version: file.version,
      definitions,
      index,
    })
  }

  pub fn version(&self) -> u32 {
    self.version
  }

  pub fn len(&self) -> usize {
    self.definitions.len()
  }

  #[allow(dead_code)]
  pub fn get(&self, id: &str) -> Option<&AchievementDefinition> {
    self.index_of(id).map(|i| &self.definitions[i])
  }

  pub fn index_of(&self, id: &str) -> Option<usize> {
    self.index.get(id).copied()
  }

  /// Definitions in catalog order.
  pub fn definitions(&self) -> &[AchievementDefinition] {
    &self.definitions
  }

  #[allow(dead_code)]
  pub fn by_category(&self, category: Category) -> impl Iterator<Item = &AchievementDefinition> {
    self
      .definitions
      .iter()
      .filter(move |d| d.category == category)
  }
}

//! Parameter data configuration for load queues
//!
//! A [`LoaderDataConfig`] lists, per action parameter name, where the values
//! fed into that parameter come from. The agent turns every entry into a live
//! data provider when a queue is scheduled.

use crate::error::{AtsResult, LoadError};
use crate::pattern::even_load;
use crate::value::ArgValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameter name fed by username providers.
pub const USERNAME_PARAM: &str = "username";

/// How often a provider hands out a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderLevel {
    /// One value per worker for its whole life
    PerThreadStatic,
    /// Each worker walks the values on its own, starting at a shared offset
    PerThread,
    /// Every invocation takes the next value, shared across workers
    PerInvocation,
}

/// Source of usernames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsernameSource {
    List(Vec<String>),
    Range { prefix: String, start: i32, end: i32 },
}

/// Where parameter values come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataSource {
    /// Integers `start..=end`
    Range { start: i32, end: i32 },
    /// `prefix` followed by an integer in `start..=end`
    StringRange { prefix: String, start: i32, end: i32 },
    /// Explicit values, walked in order or picked at random
    List { values: Vec<ArgValue>, random: bool },
    Usernames(UsernameSource),
    /// File names found in the given folders
    FileNames {
        folders: Vec<String>,
        recursive: bool,
        full_path: bool,
    },
    /// Provider registered on the agent under `kind`
    Custom {
        kind: String,
        settings: BTreeMap<String, String>,
    },
}

impl DataSource {
    /// Short name of the provider kind.
    pub fn kind(&self) -> &str {
        match self {
            DataSource::Range { .. } => "range",
            DataSource::StringRange { .. } => "string-range",
            DataSource::List { .. } => "list",
            DataSource::Usernames(_) => "usernames",
            DataSource::FileNames { .. } => "file-names",
            DataSource::Custom { kind, .. } => kind,
        }
    }
}

/// Configuration of the values fed into one action parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDataConfig {
    parameter: String,
    level: ProviderLevel,
    source: DataSource,
}

impl ParameterDataConfig {
    pub fn new(parameter: &str, level: ProviderLevel, source: DataSource) -> Self {
        Self {
            parameter: parameter.to_string(),
            level,
            source,
        }
    }

    /// Integer range, one value per worker.
    pub fn range(parameter: &str, start: i32, end: i32) -> Self {
        Self::new(
            parameter,
            ProviderLevel::PerThreadStatic,
            DataSource::Range { start, end },
        )
    }

    /// Prefixed string range, one value per worker.
    pub fn string_range(parameter: &str, prefix: &str, start: i32, end: i32) -> Self {
        Self::new(
            parameter,
            ProviderLevel::PerThreadStatic,
            DataSource::StringRange {
                prefix: prefix.to_string(),
                start,
                end,
            },
        )
    }

    /// Values walked in order, a new one for every invocation.
    pub fn list(parameter: &str, values: Vec<ArgValue>) -> Self {
        Self::new(
            parameter,
            ProviderLevel::PerInvocation,
            DataSource::List {
                values,
                random: false,
            },
        )
    }

    pub fn usernames(names: &[&str]) -> Self {
        Self::new(
            USERNAME_PARAM,
            ProviderLevel::PerThreadStatic,
            DataSource::Usernames(UsernameSource::List(
                names.iter().map(|n| n.to_string()).collect(),
            )),
        )
    }

    pub fn file_names(parameter: &str, folder: &str, recursive: bool, full_path: bool) -> Self {
        Self::new(
            parameter,
            ProviderLevel::PerThread,
            DataSource::FileNames {
                folders: vec![folder.to_string()],
                recursive,
                full_path,
            },
        )
    }

    pub fn with_level(mut self, level: ProviderLevel) -> Self {
        self.level = level;
        self
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn level(&self) -> ProviderLevel {
        self.level
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// Number of distinct values, when known without touching the file system.
    pub fn value_count(&self) -> Option<usize> {
        match &self.source {
            DataSource::Range { start, end } | DataSource::StringRange { start, end, .. } => {
                Some(range_len(*start, *end))
            }
            DataSource::List { values, .. } => Some(values.len()),
            DataSource::Usernames(UsernameSource::List(names)) => Some(names.len()),
            DataSource::Usernames(UsernameSource::Range { start, end, .. }) => {
                Some(range_len(*start, *end))
            }
            DataSource::FileNames { .. } | DataSource::Custom { .. } => None,
        }
    }

    /// Check the configuration is usable for a queue of `thread_count` workers.
    pub fn verify(&self, thread_count: u32) -> AtsResult<()> {
        match &self.source {
            DataSource::Range { start, end }
            | DataSource::StringRange { start, end, .. }
            | DataSource::Usernames(UsernameSource::Range { start, end, .. })
                if start > end =>
            {
                return Err(self.init_error(&format!(
                    "range start {} is bigger than range end {}",
                    start, end
                )));
            }
            DataSource::FileNames { folders, .. } if folders.is_empty() => {
                return Err(self.init_error("No folders are specified"));
            }
            _ => {}
        }
        if self.value_count() == Some(0) {
            return Err(self.init_error("no values are provided"));
        }
        if let DataSource::Usernames(_) = self.source {
            let count = self.value_count().unwrap_or(0);
            if count < thread_count as usize {
                return Err(self.init_error(&format!(
                    "provided only {} different user names while the threading pattern requires {}",
                    count, thread_count
                )));
            }
        }
        Ok(())
    }

    /// Split the values across `agents` so no two agents use the same value.
    /// File and custom sources are replicated unchanged.
    pub fn distribute(&self, agents: u32) -> AtsResult<Vec<ParameterDataConfig>> {
        let count = match self.value_count() {
            Some(count) if !matches!(self.source, DataSource::Custom { .. }) => count,
            _ => return Ok(vec![self.clone(); agents as usize]),
        };
        let shares = even_load(count as u32, agents);
        if shares.iter().any(|s| *s == 0) {
            return Err(self.init_error(&format!(
                "could not distribute only {} values to {} agents, decrease the number of agents or increase the possible values",
                count, agents
            )));
        }

        let mut offset = 0usize;
        let mut parts = Vec::with_capacity(shares.len());
        for share in shares {
            let share = share as usize;
            let source = match &self.source {
                DataSource::Range { start, .. } => {
                    let (s, e) = sub_range(*start, offset, share);
                    DataSource::Range { start: s, end: e }
                }
                DataSource::StringRange { prefix, start, .. } => {
                    let (s, e) = sub_range(*start, offset, share);
                    DataSource::StringRange {
                        prefix: prefix.clone(),
                        start: s,
                        end: e,
                    }
                }
                DataSource::List { values, random } => DataSource::List {
                    values: values[offset..offset + share].to_vec(),
                    random: *random,
                },
                DataSource::Usernames(UsernameSource::List(names)) => DataSource::Usernames(
                    UsernameSource::List(names[offset..offset + share].to_vec()),
                ),
                DataSource::Usernames(UsernameSource::Range { prefix, start, .. }) => {
                    let (s, e) = sub_range(*start, offset, share);
                    DataSource::Usernames(UsernameSource::Range {
                        prefix: prefix.clone(),
                        start: s,
                        end: e,
                    })
                }
                DataSource::FileNames { .. } | DataSource::Custom { .. } => self.source.clone(),
            };
            parts.push(ParameterDataConfig {
                parameter: self.parameter.clone(),
                level: self.level,
                source,
            });
            offset += share;
        }
        Ok(parts)
    }

    fn init_error(&self, reason: &str) -> crate::error::AtsError {
        LoadError::ParameterDataProviderInitialization {
            parameter: self.parameter.clone(),
            reason: reason.to_string(),
        }
        .into()
    }
}

fn range_len(start: i32, end: i32) -> usize {
    if start > end {
        0
    } else {
        (i64::from(end) - i64::from(start) + 1) as usize
    }
}

fn sub_range(start: i32, offset: usize, share: usize) -> (i32, i32) {
    let s = i64::from(start) + offset as i64;
    let e = s + share as i64 - 1;
    (s as i32, e as i32)
}

/// All parameter data configurations of one queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoaderDataConfig {
    parameters: Vec<ParameterDataConfig>,
}

impl LoaderDataConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, config: ParameterDataConfig) -> Self {
        self.parameters.push(config);
        self
    }

    pub fn add(&mut self, config: ParameterDataConfig) {
        self.parameters.push(config);
    }

    pub fn parameters(&self) -> &[ParameterDataConfig] {
        &self.parameters
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// One configuration per agent, each parameter split with [`ParameterDataConfig::distribute`].
    pub fn distribute(&self, agents: u32) -> AtsResult<Vec<LoaderDataConfig>> {
        let mut per_agent = vec![LoaderDataConfig::new(); agents as usize];
        for config in &self.parameters {
            for (slot, part) in per_agent.iter_mut().zip(config.distribute(agents)?) {
                slot.add(part);
            }
        }
        Ok(per_agent)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AtsError;
    use proptest::prelude::*;

    #[test]
    fn test_range_distribute_splits_without_overlap() -> AtsResult<()> {
        let parts = ParameterDataConfig::range("id", 1, 10).distribute(3)?;
        let ranges: Vec<_> = parts
            .iter()
            .map(|p| match p.source() {
                DataSource::Range { start, end } => (*start, *end),
                other => panic!("unexpected source {:?}", other),
            })
            .collect();
        assert_eq!(ranges, vec![(1, 4), (5, 7), (8, 10)]);
        Ok(())
    }

    #[test]
    fn test_distribute_too_few_values_fails() {
        let err = ParameterDataConfig::usernames(&["a"]).distribute(2).unwrap_err();
        assert!(matches!(
            err,
            AtsError::Load(LoadError::ParameterDataProviderInitialization { .. })
        ));
    }

    #[test]
    fn test_file_names_replicated() -> AtsResult<()> {
        let cfg = ParameterDataConfig::file_names("file", "/tmp", true, false);
        let parts = cfg.distribute(3)?;
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p == &cfg));
        Ok(())
    }

    #[test]
    fn test_verify_usernames_against_threads() {
        let cfg = ParameterDataConfig::usernames(&["u1", "u2"]);
        assert!(cfg.verify(2).is_ok());
        assert!(cfg.verify(3).is_err());
    }

    #[test]
    fn test_verify_reversed_range() {
        assert!(ParameterDataConfig::range("id", 5, 1).verify(1).is_err());
    }

    #[test]
    fn test_loader_config_distribute_per_agent() -> AtsResult<()> {
        let cfg = LoaderDataConfig::new()
            .with(ParameterDataConfig::range("id", 0, 3))
            .with(ParameterDataConfig::list("name", vec!["a".into(), "b".into()]));
        let parts = cfg.distribute(2)?;
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.parameters().len() == 2));
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Distributed list shares cover the original values exactly once, in order.
        #[test]
        fn prop_list_distribute_partitions(len in 1usize..50, agents in 1u32..8) {
            prop_assume!(len >= agents as usize);
            let values: Vec<ArgValue> = (0..len as i32).map(ArgValue::Int).collect();
            let cfg = ParameterDataConfig::list("v", values.clone());
            let parts = cfg.distribute(agents).unwrap();
            let joined: Vec<ArgValue> = parts
                .iter()
                .flat_map(|p| match p.source() {
                    DataSource::List { values, .. } => values.clone(),
                    _ => vec![],
                })
                .collect();
            prop_assert_eq!(joined, values);
        }
    }
}

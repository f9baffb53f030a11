//! Parameter Data Providers - Values fed into action parameters per iteration
//!
//! Every [`ParameterDataConfig`] of a queue becomes one provider. Workers ask
//! each provider for the value of the current iteration and substitute it
//! into the parameter of the same name.

use ats_core::{
    ArgValue, AtsResult, DataSource, LoadError, LoaderDataConfig, ParameterDataConfig,
    ProviderLevel, UsernameSource,
};
use rand::Rng;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

// =============================================================================
// PROVIDER TRAIT
// =============================================================================

/// Source of values for one action parameter.
pub trait ParameterDataProvider: Send + Sync {
    /// Name of the parameter this provider feeds.
    fn parameter(&self) -> &str;

    /// Value for the next invocation made by `worker`.
    fn next_value(&self, worker: usize) -> ArgValue;
}

/// Builds providers for [`DataSource::Custom`] configurations of one kind.
pub trait CustomProviderFactory: Send + Sync {
    fn create(&self, config: &ParameterDataConfig) -> AtsResult<Arc<dyn ParameterDataProvider>>;
}

// =============================================================================
// INDEXED PROVIDER
// =============================================================================

/// Values addressed by position.
#[derive(Debug, Clone)]
enum ValueSource {
    /// `start + index`, optionally prefixed and turned into a string
    Numbers {
        start: i64,
        len: usize,
        prefix: Option<String>,
    },
    Values(Vec<ArgValue>),
}

impl ValueSource {
    fn len(&self) -> usize {
        match self {
            ValueSource::Numbers { len, .. } => *len,
            ValueSource::Values(values) => values.len(),
        }
    }

    fn value_at(&self, index: usize) -> ArgValue {
        match self {
            ValueSource::Numbers {
                start,
                prefix: None,
                ..
            } => ArgValue::Int((start + index as i64) as i32),
            ValueSource::Numbers {
                start,
                prefix: Some(prefix),
                ..
            } => ArgValue::Str(format!("{}{}", prefix, start + index as i64)),
            ValueSource::Values(values) => values[index].clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Cursor {
    /// Next shared position
    next: usize,
    /// Current position per worker, for per-thread levels
    workers: HashMap<usize, usize>,
}

/// Built-in provider walking a finite set of values.
pub struct IndexedDataProvider {
    parameter: String,
    level: ProviderLevel,
    values: ValueSource,
    random: bool,
    cursor: Mutex<Cursor>,
}

impl IndexedDataProvider {
    fn new(parameter: &str, level: ProviderLevel, values: ValueSource, random: bool) -> Self {
        Self {
            parameter: parameter.to_string(),
            level,
            values,
            random,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    pub fn level(&self) -> ProviderLevel {
        self.level
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    fn take_shared(&self, cursor: &mut Cursor) -> usize {
        let len = self.values.len();
        let index = if self.random {
            rand::rng().random_range(0..len)
        } else {
            cursor.next % len
        };
        cursor.next = (cursor.next + 1) % len;
        index
    }
}

impl ParameterDataProvider for IndexedDataProvider {
    fn parameter(&self) -> &str {
        &self.parameter
    }

    fn next_value(&self, worker: usize) -> ArgValue {
        let len = self.values.len();
        // the cursor holds plain counters, a panicked holder cannot corrupt it
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let index = match self.level {
            ProviderLevel::PerInvocation => self.take_shared(&mut cursor),
            ProviderLevel::PerThreadStatic => match cursor.workers.get(&worker) {
                Some(index) => *index,
                None => {
                    let index = self.take_shared(&mut cursor);
                    cursor.workers.insert(worker, index);
                    index
                }
            },
            ProviderLevel::PerThread => match cursor.workers.get(&worker).copied() {
                Some(previous) => {
                    let index = if self.random {
                        rand::rng().random_range(0..len)
                    } else {
                        (previous + 1) % len
                    };
                    cursor.workers.insert(worker, index);
                    index
                }
                None => {
                    let index = self.take_shared(&mut cursor);
                    cursor.workers.insert(worker, index);
                    index
                }
            },
        };
        drop(cursor);
        self.values.value_at(index)
    }
}

// =============================================================================
// FACTORY
// =============================================================================

/// Turns parameter data configurations into live providers.
#[derive(Default)]
pub struct DataProviderFactory {
    custom: RwLock<HashMap<String, Arc<dyn CustomProviderFactory>>>,
}

impl DataProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make custom sources of `kind` available to queues.
    pub fn register_custom(&self, kind: &str, factory: Arc<dyn CustomProviderFactory>) {
        self.custom
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind.to_string(), factory);
        tracing::info!(kind = %kind, "Registered custom parameter data provider");
    }

    /// Verify and build one provider per configured parameter.
    pub fn create_providers(
        &self,
        config: &LoaderDataConfig,
        thread_count: u32,
    ) -> AtsResult<Vec<Arc<dyn ParameterDataProvider>>> {
        config
            .parameters()
            .iter()
            .map(|parameter| {
                parameter.verify(thread_count)?;
                self.create(parameter)
            })
            .collect()
    }

    fn create(&self, config: &ParameterDataConfig) -> AtsResult<Arc<dyn ParameterDataProvider>> {
        let name = config.parameter();
        let level = config.level();
        let provider = match config.source() {
            DataSource::Range { start, .. } => IndexedDataProvider::new(
                name,
                level,
                numbers(*start, config, None),
                false,
            ),
            DataSource::StringRange { prefix, start, .. } => IndexedDataProvider::new(
                name,
                level,
                numbers(*start, config, Some(prefix)),
                false,
            ),
            DataSource::List { values, random } => IndexedDataProvider::new(
                name,
                level,
                ValueSource::Values(values.clone()),
                *random,
            ),
            DataSource::Usernames(UsernameSource::List(names)) => IndexedDataProvider::new(
                name,
                level,
                ValueSource::Values(names.iter().map(|n| ArgValue::from(n.as_str())).collect()),
                false,
            ),
            DataSource::Usernames(UsernameSource::Range { prefix, start, .. }) => {
                IndexedDataProvider::new(name, level, numbers(*start, config, Some(prefix)), false)
            }
            DataSource::FileNames {
                folders,
                recursive,
                full_path,
            } => {
                let files = scan_folders(name, folders, *recursive, *full_path)?;
                IndexedDataProvider::new(name, level, ValueSource::Values(files), false)
            }
            DataSource::Custom { kind, .. } => {
                let factory = self
                    .custom
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(kind)
                    .cloned()
                    .ok_or_else(|| LoadError::ParameterDataProviderNotSupported {
                        parameter: name.to_string(),
                        kind: kind.clone(),
                    })?;
                return factory.create(config);
            }
        };
        tracing::debug!(
            parameter = %name,
            kind = %config.source().kind(),
            values = provider.value_count(),
            "Created parameter data provider"
        );
        Ok(Arc::new(provider))
    }
}

fn numbers(start: i32, config: &ParameterDataConfig, prefix: Option<&String>) -> ValueSource {
    ValueSource::Numbers {
        start: i64::from(start),
        len: config.value_count().unwrap_or(0),
        prefix: prefix.cloned(),
    }
}

/// File names found in `folders`, sorted for a stable walk order.
fn scan_folders(
    parameter: &str,
    folders: &[String],
    recursive: bool,
    full_path: bool,
) -> AtsResult<Vec<ArgValue>> {
    let mut files = Vec::new();
    for folder in folders {
        collect_files(Path::new(folder), recursive, &mut files).map_err(|e| {
            LoadError::ParameterDataProviderInitialization {
                parameter: parameter.to_string(),
                reason: format!("could not read folder '{}': {}", folder, e),
            }
        })?;
    }
    if files.is_empty() {
        return Err(LoadError::ParameterDataProviderInitialization {
            parameter: parameter.to_string(),
            reason: format!("no files found in {:?}", folders),
        }
        .into());
    }
    files.sort();
    Ok(files
        .into_iter()
        .map(|path| {
            let shown = if full_path {
                path.to_string_lossy().into_owned()
            } else {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            };
            ArgValue::Str(shown)
        })
        .collect())
}

fn collect_files(folder: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_files(&path, recursive, out)?;
            }
        } else {
            out.push(path);
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ats_core::AtsError;
    use std::collections::BTreeMap;

    fn build(config: ParameterDataConfig) -> Arc<dyn ParameterDataProvider> {
        DataProviderFactory::new()
            .create_providers(&LoaderDataConfig::new().with(config), 1)
            .expect("valid config")
            .remove(0)
    }

    #[test]
    fn test_per_invocation_range_wraps() {
        let p = build(ParameterDataConfig::range("id", 5, 7));
        let got: Vec<_> = (0..4).map(|i| p.next_value(i % 2)).collect();
        assert_eq!(
            got,
            vec![ArgValue::Int(5), ArgValue::Int(6), ArgValue::Int(7), ArgValue::Int(5)]
        );
    }

    #[test]
    fn test_per_thread_static_keeps_value() {
        let p = build(
            ParameterDataConfig::string_range("user", "u", 1, 3)
                .with_level(ProviderLevel::PerThreadStatic),
        );
        assert_eq!(p.next_value(0), ArgValue::from("u1"));
        assert_eq!(p.next_value(1), ArgValue::from("u2"));
        assert_eq!(p.next_value(0), ArgValue::from("u1"));
        assert_eq!(p.next_value(1), ArgValue::from("u2"));
    }

    #[test]
    fn test_per_thread_walks_from_own_offset() {
        let p = build(ParameterDataConfig::range("n", 0, 9).with_level(ProviderLevel::PerThread));
        assert_eq!(p.next_value(0), ArgValue::Int(0));
        assert_eq!(p.next_value(1), ArgValue::Int(1));
        assert_eq!(p.next_value(0), ArgValue::Int(1));
        assert_eq!(p.next_value(0), ArgValue::Int(2));
        assert_eq!(p.next_value(1), ArgValue::Int(2));
    }

    #[test]
    fn test_random_list_stays_within_values() {
        let values = vec![ArgValue::from("a"), ArgValue::from("b")];
        let p = build(ParameterDataConfig::new(
            "x",
            ProviderLevel::PerInvocation,
            DataSource::List {
                values: values.clone(),
                random: true,
            },
        ));
        for _ in 0..20 {
            assert!(values.contains(&p.next_value(0)));
        }
    }

    #[test]
    fn test_unknown_custom_kind_not_supported() {
        let config = ParameterDataConfig::new(
            "x",
            ProviderLevel::PerInvocation,
            DataSource::Custom {
                kind: "ldap".to_string(),
                settings: BTreeMap::new(),
            },
        );
        let err = DataProviderFactory::new()
            .create_providers(&LoaderDataConfig::new().with(config), 1)
            .err()
            .expect("kind is not registered");
        assert!(matches!(
            err,
            AtsError::Load(LoadError::ParameterDataProviderNotSupported { .. })
        ));
    }

    struct Constant;

    impl CustomProviderFactory for Constant {
        fn create(
            &self,
            config: &ParameterDataConfig,
        ) -> AtsResult<Arc<dyn ParameterDataProvider>> {
            Ok(Arc::new(IndexedDataProvider::new(
                config.parameter(),
                config.level(),
                ValueSource::Values(vec![ArgValue::Int(42)]),
                false,
            )))
        }
    }

    #[test]
    fn test_registered_custom_kind() {
        let factory = DataProviderFactory::new();
        factory.register_custom("const", Arc::new(Constant));
        let config = ParameterDataConfig::new(
            "x",
            ProviderLevel::PerInvocation,
            DataSource::Custom {
                kind: "const".to_string(),
                settings: BTreeMap::new(),
            },
        );
        let providers = factory
            .create_providers(&LoaderDataConfig::new().with(config), 2)
            .expect("registered kind");
        assert_eq!(providers[0].next_value(1), ArgValue::Int(42));
    }

    #[test]
    fn test_file_names_scan() -> AtsResult<()> {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("b.txt"), "b").expect("write");
        fs::write(dir.path().join("a.txt"), "a").expect("write");
        fs::create_dir(dir.path().join("nested")).expect("mkdir");
        fs::write(dir.path().join("nested").join("c.txt"), "c").expect("write");
        let folder = dir.path().to_string_lossy().into_owned();

        let flat = build(ParameterDataConfig::file_names("file", &folder, false, false));
        assert_eq!(flat.next_value(0), ArgValue::from("a.txt"));
        assert_eq!(flat.next_value(0), ArgValue::from("b.txt"));
        assert_eq!(flat.next_value(0), ArgValue::from("a.txt"));

        let deep = build(ParameterDataConfig::file_names("file", &folder, true, true));
        let mut seen: Vec<String> = (0..3)
            .map(|_| deep.next_value(0).as_str().unwrap_or_default().to_string())
            .collect();
        seen.sort();
        assert!(seen[2].ends_with("c.txt"));
        Ok(())
    }

    #[test]
    fn test_empty_folder_fails_initialization() {
        let dir = tempfile::tempdir().expect("temp dir");
        let folder = dir.path().to_string_lossy().into_owned();
        let err = DataProviderFactory::new()
            .create_providers(
                &LoaderDataConfig::new()
                    .with(ParameterDataConfig::file_names("file", &folder, true, false)),
                1,
            )
            .err()
            .expect("no files");
        assert!(matches!(
            err,
            AtsError::Load(LoadError::ParameterDataProviderInitialization { .. })
        ));
    }
}

//! Component environments: backup and restore of external resources
//!
//! The resources themselves (databases, files, folders) are reached through
//! the [`EnvironmentUnit`] trait; this module only sequences the calls and
//! rolls an existing backup aside before taking a fresh one.

mod configuration;
mod handler;

pub use configuration::{ConfigurationManager, Configurator};
pub use handler::EnvironmentHandler;

use ats_core::{AtsResult, BoxError, EnvironmentError, BACKUP_TIMESTAMP_FORMAT};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// A backup/restore-capable external resource.
pub trait EnvironmentUnit: Send {
    fn backup(&mut self) -> Result<(), BoxError>;

    fn restore(&mut self) -> Result<(), BoxError>;

    /// Redirect the next backup/restore to `dir` instead of the configured folder.
    fn set_temp_backup_dir(&mut self, dir: &Path);

    fn description(&self) -> String;

    fn new_copy(&self) -> Box<dyn EnvironmentUnit>;
}

/// Named set of environment units belonging to one component.
pub struct ComponentEnvironment {
    component: String,
    name: String,
    backup_folder: PathBuf,
    units: Vec<Mutex<Box<dyn EnvironmentUnit>>>,
}

impl std::fmt::Debug for ComponentEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentEnvironment")
            .field("component", &self.component)
            .field("name", &self.name)
            .field("backup_folder", &self.backup_folder)
            .finish_non_exhaustive()
    }
}

impl ComponentEnvironment {
    pub fn new(component: &str, name: &str, backup_folder: impl Into<PathBuf>) -> Self {
        Self {
            component: component.to_string(),
            name: name.to_string(),
            backup_folder: backup_folder.into(),
            units: Vec::new(),
        }
    }

    pub fn with_unit(mut self, unit: Box<dyn EnvironmentUnit>) -> Self {
        self.units.push(Mutex::new(unit));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn backup_folder(&self) -> &Path {
        &self.backup_folder
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Restore every unit, from `folder` when given.
    pub fn restore(&self, folder: Option<&Path>) -> AtsResult<()> {
        for unit in &self.units {
            let mut unit = unit.lock()?;
            if let Some(folder) = folder {
                unit.set_temp_backup_dir(folder);
            }
            tracing::info!(
                component = %self.component,
                environment = %self.name,
                unit = %unit.description(),
                "Restoring environment unit"
            );
            unit.restore().map_err(|e| EnvironmentError::Restore {
                component: self.component.clone(),
                environment: self.name.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Back up every unit into `folder` (or the configured backup folder).
    /// A non-empty previous backup is first renamed with a timestamp suffix.
    pub fn backup(&self, folder: Option<&Path>) -> AtsResult<()> {
        let target = folder.unwrap_or(&self.backup_folder);
        self.roll_previous_backup(target)?;

        for unit in &self.units {
            let mut unit = unit.lock()?;
            if let Some(folder) = folder {
                unit.set_temp_backup_dir(folder);
            }
            tracing::info!(
                component = %self.component,
                environment = %self.name,
                unit = %unit.description(),
                "Backing up environment unit"
            );
            unit.backup().map_err(|e| self.backup_error(e.to_string()))?;
        }
        Ok(())
    }

    /// Back up unless a non-empty backup already exists.
    pub fn backup_only_if_not_already_done(&self) -> AtsResult<()> {
        let folder = &self.backup_folder;
        if folder.is_file() {
            return Err(EnvironmentError::BackupTargetIsFile {
                path: folder.display().to_string(),
            }
            .into());
        }
        if is_non_empty_dir(folder) {
            tracing::info!(
                component = %self.component,
                environment = %self.name,
                folder = %folder.display(),
                "Backup already exists, skipping initial backup"
            );
            return Ok(());
        }
        self.backup(None)
    }

    /// Copy for another caller, with copied units.
    pub fn new_copy(&self) -> Self {
        Self {
            component: self.component.clone(),
            name: self.name.clone(),
            backup_folder: self.backup_folder.clone(),
            units: self
                .units
                .iter()
                .map(|u| {
                    let unit = u.lock().unwrap_or_else(PoisonError::into_inner);
                    Mutex::new(unit.new_copy())
                })
                .collect(),
        }
    }

    fn roll_previous_backup(&self, target: &Path) -> AtsResult<()> {
        if !is_non_empty_dir(target) {
            return Ok(());
        }
        let suffix = chrono::Local::now()
            .format(BACKUP_TIMESTAMP_FORMAT)
            .to_string();
        let mut rolled = target.as_os_str().to_owned();
        rolled.push(suffix);
        let rolled = PathBuf::from(rolled);
        std::fs::rename(target, &rolled).map_err(|e| {
            self.backup_error(format!(
                "could not rename previous backup '{}' to '{}': {}",
                target.display(),
                rolled.display(),
                e
            ))
        })?;
        tracing::info!(
            from = %target.display(),
            to = %rolled.display(),
            "Renamed previous backup"
        );
        Ok(())
    }

    fn backup_error(&self, reason: String) -> EnvironmentError {
        EnvironmentError::Backup {
            component: self.component.clone(),
            environment: self.name.clone(),
            reason,
        }
    }
}

fn is_non_empty_dir(path: &Path) -> bool {
    path.is_dir()
        && std::fs::read_dir(path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ats_core::AtsError;
    use std::sync::Arc;

    /// Writes a marker file into its backup dir and records calls.
    struct FileUnit {
        dir: PathBuf,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl EnvironmentUnit for FileUnit {
        fn backup(&mut self) -> Result<(), BoxError> {
            std::fs::create_dir_all(&self.dir)?;
            std::fs::write(self.dir.join("marker"), b"x")?;
            self.log.lock().unwrap().push(format!("backup {}", self.dir.display()));
            Ok(())
        }

        fn restore(&mut self) -> Result<(), BoxError> {
            self.log.lock().unwrap().push(format!("restore {}", self.dir.display()));
            Ok(())
        }

        fn set_temp_backup_dir(&mut self, dir: &Path) {
            self.dir = dir.to_path_buf();
        }

        fn description(&self) -> String {
            "file unit".to_string()
        }

        fn new_copy(&self) -> Box<dyn EnvironmentUnit> {
            Box::new(FileUnit {
                dir: self.dir.clone(),
                log: self.log.clone(),
            })
        }
    }

    fn environment(dir: &Path) -> (ComponentEnvironment, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let env = ComponentEnvironment::new("Db", "default", dir).with_unit(Box::new(FileUnit {
            dir: dir.to_path_buf(),
            log: log.clone(),
        }));
        (env, log)
    }

    #[test]
    fn test_backup_rolls_previous_backup() -> AtsResult<()> {
        let root = tempfile::tempdir().unwrap();
        let backup_dir = root.path().join("backup");
        let (env, _log) = environment(&backup_dir);

        env.backup(None)?;
        env.backup(None)?;

        let entries: Vec<String> = std::fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e == "backup"));
        assert!(entries.iter().any(|e| e.starts_with("backup_")));
        Ok(())
    }

    #[test]
    fn test_backup_only_if_not_already_done_skips_existing() -> AtsResult<()> {
        let root = tempfile::tempdir().unwrap();
        let backup_dir = root.path().join("backup");
        let (env, log) = environment(&backup_dir);

        env.backup_only_if_not_already_done()?;
        env.backup_only_if_not_already_done()?;
        assert_eq!(log.lock().unwrap().len(), 1);
        Ok(())
    }

    #[test]
    fn test_backup_target_is_file() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("backup");
        std::fs::write(&file, b"not a dir").unwrap();
        let (env, _log) = environment(&file);
        let err = env.backup_only_if_not_already_done().unwrap_err();
        assert!(matches!(
            err,
            AtsError::Environment(EnvironmentError::BackupTargetIsFile { .. })
        ));
    }

    #[test]
    fn test_new_copy_keeps_unit_with_poisoned_lock() {
        let root = tempfile::tempdir().unwrap();
        let (env, _log) = environment(&root.path().join("backup"));
        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _held = env.units[0].lock().unwrap();
            panic!("unit failed mid-backup");
        }));
        assert!(poisoned.is_err());
        assert!(env.units[0].is_poisoned());

        let copy = env.new_copy();
        assert_eq!(copy.unit_count(), 1);
    }

    #[test]
    fn test_restore_from_custom_folder() -> AtsResult<()> {
        let root = tempfile::tempdir().unwrap();
        let (env, log) = environment(&root.path().join("backup"));
        let custom = root.path().join("custom");
        env.restore(Some(&custom))?;
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("custom"));
        Ok(())
    }
}

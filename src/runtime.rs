use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};

use crate::db::Database;
use crate::session::GuardSession;
use crate::settings::SettingsStore;

pub const DATABASE_FILE: &str = "medguard.sqlite3";
pub const SETTINGS_FILE: &str = "settings.json";
pub const BREACH_DIR: &str = "breach_images";
pub const DATASET_DIR: &str = "dataset";
pub const TRAINED_MODEL_FILE: &str = "trainer.yml";

/// Installs `env_logger` reading `RUST_LOG`, `info` otherwise. Safe to call
/// more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}

/// Everything the guard keeps on disk under one data directory.
pub struct GuardRuntime {
    data_dir: PathBuf,
    db: Database,
    settings: Arc<SettingsStore>,
}

impl GuardRuntime {
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
        fs::create_dir_all(data_dir.join(BREACH_DIR))
            .context("failed to create breach image dir")?;

        let db = Database::new(data_dir.join(DATABASE_FILE))?;

        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;
        if !settings.path().exists() {
            settings.save()?;
        }

        let runtime = Self {
            data_dir,
            db,
            settings: Arc::new(settings),
        };
        runtime.recover_interrupted_sessions().await?;

        info!("MedGuard data directory: {}", runtime.data_dir.display());
        Ok(runtime)
    }

    /// Marks sessions left `Running` by a crash as interrupted.
    async fn recover_interrupted_sessions(&self) -> Result<usize> {
        let sessions = self.db.get_incomplete_sessions().await?;
        let now = Utc::now();
        for session in &sessions {
            warn!(
                "Recovered incomplete session {}; marking as Interrupted",
                session.id
            );
            self.db.mark_session_interrupted(&session.id, now).await?;
        }
        Ok(sessions.len())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn breach_dir(&self) -> PathBuf {
        self.data_dir.join(BREACH_DIR)
    }

    pub fn guard(&self) -> GuardSession {
        GuardSession::new(self.db.clone(), Arc::clone(&self.settings), self.breach_dir())
    }
}

/// Factory reset: drops the database, breach snapshots, enrollment images and
/// trained model. Settings are kept. Must not run while a runtime is open.
pub fn reset_data(data_dir: &Path) -> Result<()> {
    let db_path = data_dir.join(DATABASE_FILE);
    for suffix in ["", "-wal", "-shm"] {
        let mut path = db_path.clone().into_os_string();
        path.push(suffix);
        remove_file_if_present(Path::new(&path))?;
    }

    for dir in [BREACH_DIR, DATASET_DIR] {
        let path = data_dir.join(dir);
        match fs::remove_dir_all(&path) {
            Ok(()) => info!("wiped {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("failed to wipe {}", path.display()))
            }
        }
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to recreate {}", path.display()))?;
    }

    remove_file_if_present(&data_dir.join(TRAINED_MODEL_FILE))?;

    info!("factory reset complete for {}", data_dir.display());
    Ok(())
}

fn remove_file_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!("deleted {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to delete {}", path.display())),
    }
}

//! Модуль для работы с временными файлами
//!
//! Каждый прогон получает собственную временную директорию, поэтому
//! параллельные прогоны по разным видео не пересекаются.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::TempDir;

use crate::error::Result;

/// Временная директория одного прогона
pub struct RunWorkspace {
    /// Идентификатор прогона
    run_id: String,
    /// Временная директория
    temp_dir: Option<TempDir>,
    /// Не удалять директорию при завершении
    keep: bool,
}

impl RunWorkspace {
    /// Создать новое рабочее пространство
    pub fn new(keep: bool) -> Result<Self> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let temp_dir = tempfile::Builder::new()
            .prefix(&format!("videodub_{}_", &run_id[..8]))
            .tempdir()?;
        debug!("Run {} uses {}", run_id, temp_dir.path().display());

        Ok(Self {
            run_id,
            temp_dir: Some(temp_dir),
            keep,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Получить путь к временной директории
    pub fn path(&self) -> &Path {
        match &self.temp_dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }

    /// Путь к файлу внутри рабочего пространства
    pub fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    /// Создать поддиректорию
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.file(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

impl Drop for RunWorkspace {
    fn drop(&mut self) {
        let Some(dir) = self.temp_dir.take() else {
            return;
        };
        if self.keep {
            let path = dir.into_path();
            info!("Temporary files kept in {}", path.display());
        } else if let Err(e) = dir.close() {
            warn!("Failed to remove temporary directory: {}", e);
        }
    }
}

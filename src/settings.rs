use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    pub prompt: String,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            prompt: "Identify the food item in this photo and describe its nutritional profile."
                .into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserSettings {
    analysis: AnalysisSettings,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            analysis: AnalysisSettings::default(),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn analysis(&self) -> AnalysisSettings {
        self.data.read().unwrap().analysis.clone()
    }

    pub fn update_analysis(&self, settings: AnalysisSettings) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            guard.analysis = settings;
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

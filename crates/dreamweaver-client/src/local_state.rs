use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use dreamweaver_types::models::{AssistantType, Gender, Language, Preferences};

/// Cosmetic settings cached on the device. The server copy wins whenever it
/// is available.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Personalization {
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub gender: Option<Gender>,
    pub assistant_voice: Option<AssistantType>,
    pub language: Option<Language>,
}

/// Per-device state that survives restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalState {
    /// Last chat the user had open. Advisory: validated against the chat
    /// list on every load.
    pub active_chat_id: Option<String>,
    #[serde(default)]
    pub personalization: Personalization,
}

impl LocalState {
    /// Overwrites personalization with the authoritative server record.
    pub fn rehydrate(&mut self, prefs: &Preferences) {
        self.personalization = Personalization {
            display_name: Some(prefs.name.clone()),
            avatar: prefs.avatar_url.clone(),
            gender: prefs.gender,
            assistant_voice: prefs.assistant_type,
            language: prefs.language,
        };
    }
}

/// JSON file holding one [`LocalState`].
#[derive(Debug, Clone)]
pub struct LocalStateStore {
    path: PathBuf,
}

impl LocalStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable state yields the default; it is only a cache.
    pub fn load(&self) -> LocalState {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return LocalState::default(),
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                return LocalState::default();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Discarding corrupt local state {}: {}", self.path.display(), e);
            LocalState::default()
        })
    }

    pub fn save(&self, state: &LocalState) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state).map_err(io::Error::other)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)
    }
}

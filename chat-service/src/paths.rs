//! Platform-aware locations for settings and on-disk stores.
//!
//! | Purpose | Linux | macOS |
//! |---------|-------|-------|
//! | Config | `~/.config/insight-chat/` | `~/Library/Application Support/insight-chat/` |
//! | Data | `~/.local/share/insight-chat/data/` | `~/Library/Application Support/insight-chat/data/` |

use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Application name used in directory paths
const APP_NAME: &str = "insight-chat";

pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .unwrap_or_else(|| fallback_base_dir().join("config"))
}

pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join(APP_NAME).join("data"))
        .unwrap_or_else(|| fallback_base_dir().join("data"))
}

pub fn default_settings_path() -> PathBuf {
    get_config_dir().join("settings.json")
}

pub fn default_data_db_path() -> PathBuf {
    get_data_dir().join("insights.db")
}

pub fn default_chat_db_path() -> PathBuf {
    get_data_dir().join("chats.db")
}

pub fn default_vector_store_path() -> PathBuf {
    get_data_dir().join("lancedb")
}

/// `~/.insight-chat/`, or `./.insight-chat/` without a home directory.
fn fallback_base_dir() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".insight-chat"))
        .unwrap_or_else(|| {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".insight-chat")
        })
}

async fn test_write_access(dir: &Path) -> bool {
    if fs::create_dir_all(dir).await.is_err() {
        return false;
    }

    let test_file = dir.join(format!(".write-test-{}", Uuid::new_v4()));
    match fs::write(&test_file, b"test").await {
        Ok(_) => {
            let _ = fs::remove_file(&test_file).await;
            true
        }
        Err(_) => false,
    }
}

/// Make sure the parent directory of a store file exists and is writable.
///
/// Falls back to `~/.insight-chat/<file name>` and then the working directory.
/// Returns the path the store should actually use.
pub async fn ensure_store_location(primary: PathBuf) -> PathBuf {
    let parent = primary
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    if test_write_access(&parent).await {
        return primary;
    }

    let file_name = primary
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "store".into());

    let home_fallback = fallback_base_dir();
    if test_write_access(&home_fallback).await {
        let path = home_fallback.join(&file_name);
        tracing::warn!(primary = ?primary, fallback = ?path, "store location not writable, using home fallback");
        return path;
    }

    let cwd_path = PathBuf::from(".").join(&file_name);
    tracing::warn!(primary = ?primary, fallback = ?cwd_path, "store location not writable, using working directory");
    cwd_path
}

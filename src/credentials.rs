use anyhow::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;

use glimpse::config::get_config_dir;
use glimpse::models::User;

/// Identity of the signed-in user, kept between runs.
#[derive(Serialize, Deserialize, Clone)]
pub struct SavedSession {
    pub user_id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl SavedSession {
    pub fn new(user_id: &str, username: &str, token: Option<&str>) -> Self {
        SavedSession {
            user_id: user_id.to_string(),
            username: username.to_string(),
            token: token.map(|t| BASE64.encode(t)),
        }
    }

    pub fn get_token(&self) -> Option<String> {
        self.token
            .as_ref()
            .and_then(|encoded| BASE64.decode(encoded).ok())
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    pub fn user(&self) -> User {
        User { id: self.user_id.clone(), username: self.username.clone() }
    }
}

fn get_session_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("session.json"))
}

pub fn save_session(session: &SavedSession) -> Result<()> {
    let path = get_session_path()?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, session)?;

    info!("Session saved for {}", session.username);
    Ok(())
}

pub fn load_session() -> Result<Option<SavedSession>> {
    let path = get_session_path()?;

    if !path.exists() {
        return Ok(None);
    }

    let path_str = path.display().to_string();
    let mut contents = String::new();
    File::open(path)?.read_to_string(&mut contents)?;

    let session: SavedSession = serde_json::from_str(&contents)?;
    info!("Loaded session for {} from {}", session.username, path_str);

    Ok(Some(session))
}

pub fn clear_session() -> Result<bool> {
    let path = get_session_path()?;
    if path.exists() {
        fs::remove_file(&path)?;
        info!("Removed saved session at {}", path.display());
        return Ok(true);
    }
    Ok(false)
}

//! Login credentials and the persisted session cookie.
//!
//! The file is a small JSON object:
//!
//! ```json
//! {
//!   "email": "reader@example.com",
//!   "password": "hunter2",
//!   "cookie": "…"
//! }
//! ```
//!
//! Keys other than these three are carried through untouched when the file
//! is rewritten.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoryGraphError};

/// Contents of the credentials file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Account email used on the sign-in form.
    pub email: String,
    /// Account password used on the sign-in form.
    pub password: String,
    /// Last known session cookie value, reused to skip the sign-in form.
    #[serde(default)]
    pub cookie: Option<String>,
    /// Unrecognised keys, preserved on save.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Credentials {
    /// Credentials with no stored cookie.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            cookie: None,
            extra: serde_json::Map::new(),
        }
    }

    /// The stored cookie, ignoring empty strings.
    pub fn session_cookie(&self) -> Option<&str> {
        self.cookie.as_deref().filter(|c| !c.is_empty())
    }

    /// Read credentials from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| StoryGraphError::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| StoryGraphError::Json(format!("{}: {e}", path.display())))
    }

    /// Write credentials back as two-space indented JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| StoryGraphError::Json(format!("{}: {e}", path.display())))?;
        std::fs::write(path, content).map_err(|e| StoryGraphError::io(path, e))?;
        tracing::debug!(?path, "saved credentials");
        Ok(())
    }
}

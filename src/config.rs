//! Sync configuration (mostly set from environment).

/// Settings for talking to the repository and authoring commits.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Remote to fetch from / push to.
    pub remote_name: String,
    /// Author identity for booked merge commits.
    pub author_name: String,
    pub author_email: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_name: "origin".to_owned(),
            author_name: "bibgit".to_owned(),
            author_email: "bibgit@localhost".to_owned(),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `BIBGIT_REMOTE`, `BIBGIT_AUTHOR`, `BIBGIT_EMAIL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(remote) = env_nonempty("BIBGIT_REMOTE") {
            config.remote_name = remote;
        }
        if let Some(author) = env_nonempty("BIBGIT_AUTHOR") {
            config.author_name = author;
        }
        if let Some(email) = env_nonempty("BIBGIT_EMAIL") {
            config.author_email = email;
        }
        config
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        tracing::warn!(key, "empty value in environment; ignoring");
        return None;
    }
    Some(trimmed.to_owned())
}

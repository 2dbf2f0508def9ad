use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Bearer token supplier. Absence of a token is never fatal: the forge is
/// queried anonymously at the lower rate limit.
#[derive(Clone, Default)]
pub struct Credentials {
    token: Option<String>,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    pub fn from_token(token: impl Into<String>) -> Self {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            Self::anonymous()
        } else {
            Self { token: Some(token) }
        }
    }

    /// Reads the first non-empty line of `path`.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let credentials = contents
                    .lines()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .map(Self::from_token)
                    .unwrap_or_else(Self::anonymous);
                if credentials.is_authenticated() {
                    info!("Loaded forge token from {}", path.display());
                } else {
                    warn!("Token file {} is empty, proceeding anonymously", path.display());
                }
                credentials
            }
            Err(e) => {
                warn!(
                    "Could not read token file {} ({}), proceeding anonymously",
                    path.display(),
                    e
                );
                Self::anonymous()
            }
        }
    }

    /// An explicit token wins over the file.
    pub fn resolve(explicit: Option<&str>, token_file: &Path) -> Self {
        match explicit.map(Self::from_token) {
            Some(credentials) if credentials.is_authenticated() => credentials,
            _ => Self::load(token_file),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub(crate) fn bearer(&self) -> Option<String> {
        self.token.as_ref().map(|token| format!("Bearer {}", token))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

//! Server credentials.
//!
//! Plain passwords are used as-is. Encrypted passwords are handed to an
//! injected [`PasswordDecryptor`]; the cipher itself lives outside this crate.

use std::fmt;

use crate::error::ConfigError;

/// Decrypts `encryptedPassword` values using the configured `encryptionKey`.
pub trait PasswordDecryptor: Send + Sync {
    fn decrypt(&self, encrypted: &str, key: &str) -> Result<String, String>;
}

/// Password source declared for a server.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credential {
    #[default]
    None,
    Plain(String),
    Encrypted { password: String, key: String },
}

impl Credential {
    pub(crate) fn from_fields(
        password: Option<&str>,
        encrypted_password: Option<&str>,
        encryption_key: Option<&str>,
    ) -> Self {
        match (password, encrypted_password) {
            (Some(p), _) if !p.is_empty() => Credential::Plain(p.to_string()),
            (_, Some(e)) if !e.is_empty() => Credential::Encrypted {
                password: e.to_string(),
                key: encryption_key.unwrap_or_default().to_string(),
            },
            _ => Credential::None,
        }
    }

    /// Produces the clear-text password, if any.
    pub fn resolve(
        &self,
        server: &str,
        decryptor: Option<&dyn PasswordDecryptor>,
    ) -> Result<Option<String>, ConfigError> {
        match self {
            Credential::None => Ok(None),
            Credential::Plain(p) => Ok(Some(p.clone())),
            Credential::Encrypted { password, key } => {
                if key.is_empty() {
                    return Err(ConfigError::Credentials {
                        server: server.to_string(),
                        message: "encryptionKey is required with encryptedPassword".to_string(),
                    });
                }
                let decryptor = decryptor.ok_or_else(|| ConfigError::Credentials {
                    server: server.to_string(),
                    message: "encryptedPassword is set but no decryptor is configured".to_string(),
                })?;
                decryptor
                    .decrypt(password, key)
                    .map(Some)
                    .map_err(|message| ConfigError::Credentials {
                        server: server.to_string(),
                        message,
                    })
            }
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::None => f.write_str("None"),
            Credential::Plain(_) => f.write_str("Plain(***)"),
            Credential::Encrypted { .. } => f.write_str("Encrypted(***)"),
        }
    }
}

//! OAuth2 authentication for the Gmail API and credentials for the model provider

use async_openai::config::OpenAIConfig;
use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::debug;

use crate::error::{GmailError, Result};

/// Gmail API scopes the pipeline needs
///
/// - gmail.modify: read messages, clear UNREAD, apply labels
/// - gmail.labels: create and update labels
/// - gmail.send: send replies
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
    "https://www.googleapis.com/auth/gmail.send",
];

pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const OPENAI_ORG_ID_VAR: &str = "OPENAI_ORG_ID";
pub const OPENAI_API_BASE_VAR: &str = "OPENAI_API_BASE";

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub = Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Initialize Gmail API hub with OAuth2 authentication
///
/// Uses the installed-app flow (a browser opens on first use) and persists
/// tokens to `token_cache_path` for automatic refresh. A token is requested
/// up front so the cache holds every scope in [`REQUIRED_SCOPES`].
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<GmailHub> {
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| GmailError::AuthError(format!("Failed to read credentials: {}", e)))?;

    if let Some(parent) = token_cache_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| GmailError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    let _token = auth
        .token(REQUIRED_SCOPES)
        .await
        .map_err(|e| GmailError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_token_file(token_cache_path).await?;
    }
    debug!("Gmail token cached at {:?}", token_cache_path);

    // HTTP/1 only; google-gmail1 behaves better with it
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| GmailError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Credential structure matching Google's OAuth2 credentials JSON format
#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub installed: InstalledApp,
}

/// Installed application credentials (desktop/CLI app)
#[derive(Debug, Serialize, Deserialize)]
pub struct InstalledApp {
    pub client_id: String,
    pub project_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
}

/// Load OAuth2 credentials from a JSON file
///
/// Used to fail early with a readable error before the OAuth flow starts.
pub async fn load_credentials(path: &Path) -> Result<Credentials> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        GmailError::ConfigError(format!("Cannot read credentials file {:?}: {}", path, e))
    })?;
    let creds = serde_json::from_str(&content)?;
    Ok(creds)
}

/// Remove the cached token so the next authentication runs the full flow
pub async fn clear_token_cache(token_cache_path: &Path) -> Result<bool> {
    if token_cache_path.exists() {
        tokio::fs::remove_file(token_cache_path).await?;
        return Ok(true);
    }
    Ok(false)
}

/// Secure token file permissions on Unix systems (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows uses ACLs; permissions are left as created
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}

/// Model-provider credentials read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub org_id: Option<String>,
    pub api_base: Option<String>,
}

impl OpenAiSettings {
    /// Read `OPENAI_API_KEY` (required), `OPENAI_ORG_ID` and `OPENAI_API_BASE`
    pub fn from_env() -> Result<Self> {
        let api_key = non_empty_var(OPENAI_API_KEY_VAR).ok_or_else(|| {
            GmailError::ConfigError(format!("{} not set", OPENAI_API_KEY_VAR))
        })?;

        Ok(Self {
            api_key,
            org_id: non_empty_var(OPENAI_ORG_ID_VAR),
            api_base: non_empty_var(OPENAI_API_BASE_VAR),
        })
    }

    pub fn into_config(self) -> OpenAIConfig {
        let mut config = OpenAIConfig::new().with_api_key(self.api_key);
        if let Some(org_id) = self.org_id {
            config = config.with_org_id(org_id);
        }
        if let Some(api_base) = self.api_base {
            config = config.with_api_base(api_base);
        }
        config
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::{NamedTempFile, TempDir};

    fn clear_openai_vars() {
        env::remove_var(OPENAI_API_KEY_VAR);
        env::remove_var(OPENAI_ORG_ID_VAR);
        env::remove_var(OPENAI_API_BASE_VAR);
    }

    #[tokio::test]
    async fn test_load_credentials() {
        let credentials_json = r#"{
            "installed": {
                "client_id": "test-client-id",
                "project_id": "test-project",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_secret": "test-secret",
                "redirect_uris": ["http://localhost:8080"]
            }
        }"#;

        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), credentials_json)
            .await
            .unwrap();

        let creds = load_credentials(temp_file.path()).await.unwrap();
        assert_eq!(creds.installed.client_id, "test-client-id");
        assert_eq!(creds.installed.client_secret, "test-secret");
    }

    #[tokio::test]
    async fn test_load_credentials_missing_file() {
        let err = load_credentials(Path::new("/nonexistent/credentials.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, GmailError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_clear_token_cache() {
        let dir = TempDir::new().unwrap();
        let token = dir.path().join("token.json");

        assert!(!clear_token_cache(&token).await.unwrap());

        tokio::fs::write(&token, "{}").await.unwrap();
        assert!(clear_token_cache(&token).await.unwrap());
        assert!(!token.exists());
    }

    #[tokio::test]
    async fn test_secure_token_file() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "test content")
            .await
            .unwrap();

        secure_token_file(temp_file.path()).await.unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = tokio::fs::metadata(temp_file.path()).await.unwrap();
            assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    #[serial]
    fn test_openai_settings_from_env() {
        clear_openai_vars();
        env::set_var(OPENAI_API_KEY_VAR, "sk-test");
        env::set_var(OPENAI_ORG_ID_VAR, "org-123");

        let settings = OpenAiSettings::from_env().unwrap();
        assert_eq!(settings.api_key, "sk-test");
        assert_eq!(settings.org_id.as_deref(), Some("org-123"));
        assert_eq!(settings.api_base, None);

        clear_openai_vars();
    }

    #[test]
    #[serial]
    fn test_openai_settings_require_key() {
        clear_openai_vars();
        env::set_var(OPENAI_API_KEY_VAR, "   ");

        let err = OpenAiSettings::from_env().unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY not set"));

        clear_openai_vars();
    }

    #[test]
    fn test_scopes_constants() {
        assert_eq!(REQUIRED_SCOPES.len(), 3);
        assert!(REQUIRED_SCOPES.contains(&"https://www.googleapis.com/auth/gmail.modify"));
        assert!(REQUIRED_SCOPES.contains(&"https://www.googleapis.com/auth/gmail.labels"));
        assert!(REQUIRED_SCOPES.contains(&"https://www.googleapis.com/auth/gmail.send"));
    }
}

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use serde_json::{json, Value};
use tracing::{debug, info};

use tokenrelay_core::auth::CredentialStore;
use tokenrelay_core::{
    ApiClient, ClientConfig, FileSessionStore, Method, PendingRequest, Session, SessionEvent,
};

pub struct Context {
    config: ClientConfig,
    store: Arc<FileSessionStore>,
    client: ApiClient,
}

impl Context {
    pub fn open(base_url: Option<String>) -> Result<Self> {
        let mut config = ClientConfig::load()?;
        if let Some(url) = base_url {
            config.base_url = url;
        }

        let store = Arc::new(
            FileSessionStore::open(config.session_path()?).context("Failed to open session file")?,
        );
        let session = Session::new(store.clone());
        let client = ApiClient::new(config.clone(), session)?;

        Ok(Self {
            config,
            store,
            client,
        })
    }

    pub async fn login(self, username: Option<String>, remember: bool) -> Result<()> {
        let username = match username.or_else(|| self.config.last_username.clone()) {
            Some(u) => u,
            None => bail!("No username given and none remembered; pass --username"),
        };

        let password = match CredentialStore::get_password(&username)? {
            Some(password) => {
                debug!(username = %username, "Using saved password");
                password
            }
            None => rpassword::prompt_password("Password: ")?,
        };

        self.client
            .login(&json!({ "username": username, "password": password }))
            .await
            .map_err(|e| anyhow::anyhow!("Login failed: {}", e))?;

        if remember {
            CredentialStore::store(&username, &password)?;
        }
        remember_username(&ClientConfig::config_path()?, &username)?;

        println!("Logged in as {}", username);
        Ok(())
    }

    pub fn logout(self, forget: bool) -> Result<()> {
        self.client.logout()?;
        if forget {
            if let Some(ref username) = self.config.last_username {
                CredentialStore::delete(username)?;
            }
        }
        println!("Logged out");
        Ok(())
    }

    pub fn status(self) -> Result<()> {
        println!("Backend:  {}", self.config.base_url);
        println!("Session:  {}", self.store.path().display());
        if self.client.is_authenticated() {
            let updated = self
                .store
                .updated_at()
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("Status:   logged in (last updated {})", updated);
        } else {
            println!("Status:   logged out");
        }
        Ok(())
    }

    pub async fn request(
        self,
        method: &str,
        path: &str,
        data: Option<&str>,
        query: &[String],
    ) -> Result<()> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("Invalid HTTP method: {}", method))?;

        let mut request = PendingRequest::new(method, path);
        if let Some(data) = data {
            let body: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
            request = request.with_body(body);
        }
        for pair in query {
            let Some((key, value)) = pair.split_once('=') else {
                bail!("Query parameter must be key=value, got {:?}", pair);
            };
            request = request.with_query(key, value);
        }

        let mut events = self.client.session().subscribe();
        let result = self.client.send::<Value>(request).await;

        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::Refreshed => info!("Session refreshed"),
                SessionEvent::Invalidated { reason, login_route } => {
                    debug!(login_route = %login_route, "Session invalidated");
                    eprintln!(
                        "Session ended ({}). Run `tokenrelay login` to sign in again.",
                        reason
                    );
                }
                _ => {}
            }
        }

        match result {
            Ok(response) => {
                println!("{}", serde_json::to_string_pretty(&response)?);
                Ok(())
            }
            Err(e) => {
                println!("{}", serde_json::to_string_pretty(&e.normalized())?);
                bail!("Request failed: {}", e)
            }
        }
    }
}

/// Record the last username in the on-disk config only, so one-off
/// `--base-url` or environment overrides are never written back.
fn remember_username(path: &Path, username: &str) -> Result<()> {
    let mut stored = ClientConfig::load_from(path)?;
    stored.last_username = Some(username.to_string());
    stored.save_to(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remember_username_keeps_stored_base_url() {
        let path = std::env::temp_dir()
            .join(format!("tokenrelay-cli-config-{}", std::process::id()))
            .join("config.json");
        ClientConfig::new("https://stored.example.com")
            .save_to(&path)
            .unwrap();

        remember_username(&path, "ada").unwrap();

        let stored = ClientConfig::load_from(&path).unwrap();
        assert_eq!(stored.base_url, "https://stored.example.com");
        assert_eq!(stored.last_username.as_deref(), Some("ada"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}

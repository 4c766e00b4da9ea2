use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use crate::config::*;
use crate::login::*;

#[derive(Default)]
pub struct UserDatabase {
    users: HashMap<String, UserEntry>,
}

impl UserDatabase {
    pub fn len(&self) -> usize {
        self.users.len()
    }
}

impl From<UserList> for UserDatabase {
    fn from(users: UserList) -> Self {
        Self { users }
    }
}

/// Users are read from a TOML file and reloaded on SIGUSR1
pub struct StaticLoginProvider {
    user_db: watch::Receiver<UserDatabase>,
}

pub async fn update_user_list(config: PathBuf, up: watch::Sender<UserDatabase>) -> Result<()> {
    let mut stream = signal(SignalKind::user_defined1())
        .context("failed to install SIGUSR1 signal handler for reload")?;

    loop {
        let ulist: UserList = match read_config(config.clone()) {
            Ok(x) => x,
            Err(e) => {
                tracing::warn!(path=%config.as_path().to_string_lossy(), error=%e, "Unable to load user list");
                stream.recv().await;
                continue;
            }
        };

        let db = UserDatabase::from(ulist);
        tracing::info!("{} users loaded", db.len());
        up.send(db)
            .context("update user db config")?;
        stream.recv().await;
        tracing::info!("Received SIGUSR1, reloading");
    }
}

impl StaticLoginProvider {
    pub async fn new(config: LoginStaticConfig) -> Result<Self> {
        let (tx, mut rx) = watch::channel(UserDatabase::default());

        tokio::spawn(async move {
            if let Err(e) = update_user_list(config.user_list, tx).await {
                tracing::error!(err=?e, "user list watcher stopped");
            }
        });
        rx.changed()
            .await
            .context("user list could not be loaded")?;

        Ok(Self { user_db: rx })
    }

    /// Build a provider on a fixed user list, without any reload
    pub fn from_user_list(users: UserList) -> Self {
        let (tx, rx) = watch::channel(UserDatabase::from(users));
        // the receiver keeps the last value once the sender is gone
        drop(tx);
        Self { user_db: rx }
    }
}

#[async_trait]
impl LoginProvider for StaticLoginProvider {
    async fn login(&self, username: &str, password: &str) -> Result<()> {
        tracing::debug!(user=%username, "login");
        let hash = {
            let user_db = self.user_db.borrow();
            match user_db.users.get(username) {
                None => bail!("User {} does not exist", username),
                Some(u) => u.password.clone(),
            }
        };

        tracing::debug!(user=%username, "verify password");
        if !verify_password(password, &hash)? {
            bail!("Wrong password");
        }

        tracing::debug!(user=%username, "logged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserList {
        let mut users = UserList::new();
        users.insert(
            "alice".into(),
            UserEntry {
                password: hash_password("hunter2").unwrap(),
            },
        );
        users
    }

    #[tokio::test]
    async fn fixed_list_login() {
        let p = StaticLoginProvider::from_user_list(alice());
        assert!(p.login("alice", "hunter2").await.is_ok());
        assert!(p.login("alice", "wrong").await.is_err());
        assert!(p.login("bob", "hunter2").await.is_err());
    }

    #[tokio::test]
    async fn loads_users_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");
        write_config(path.clone(), &alice()).unwrap();

        let p = StaticLoginProvider::new(LoginStaticConfig { user_list: path })
            .await
            .unwrap();
        assert_eq!(p.user_db.borrow().len(), 1);
        assert!(p.login("alice", "hunter2").await.is_ok());
    }
}

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::login::*;

pub const DEMO_USER: &str = "alice";
pub const DEMO_PASSWORD: &str = "hunter2";

/// A single hardcoded account, for `--dev` runs and tests
#[derive(Default)]
pub struct DemoLoginProvider;

impl DemoLoginProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LoginProvider for DemoLoginProvider {
    async fn login(&self, username: &str, password: &str) -> Result<()> {
        tracing::debug!(user=%username, "login");

        if username != DEMO_USER {
            bail!("user does not exist");
        }

        if password != DEMO_PASSWORD {
            bail!("wrong password");
        }

        Ok(())
    }
}

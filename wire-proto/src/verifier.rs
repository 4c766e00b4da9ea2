use std::sync::Arc;

use async_trait::async_trait;

use wire_sasl::engine::ServerEngine;
use wire_sasl::mechanism::{ArcVerifier, PasswordServer, Verifier};
use wire_sasl::types::Mechanism;
use wire_user::login::ArcLoginProvider;

use crate::server::EngineBuilder;

/// Lets the password engines check credentials against a login provider
pub struct LoginVerifier(pub ArcLoginProvider);

#[async_trait]
impl Verifier for LoginVerifier {
    async fn verify(&self, username: &str, password: &str) -> bool {
        match self.0.login(username, password).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(user=%username, err=%e, "login refused");
                false
            }
        }
    }
}

/// A fresh PLAIN/LOGIN engine per session, all sharing the same provider
pub fn password_engines(mechanisms: Vec<Mechanism>, login: ArcLoginProvider) -> EngineBuilder {
    let verifier: ArcVerifier = Arc::new(LoginVerifier(login));
    Arc::new(move || -> Box<dyn ServerEngine> {
        Box::new(PasswordServer::new(mechanisms.clone(), verifier.clone()))
    })
}

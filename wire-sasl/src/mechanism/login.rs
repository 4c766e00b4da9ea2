//! The obsolete but still widespread LOGIN mechanism: the server asks for
//! the username then the password, each in its own step.
//!
//! https://datatracker.ietf.org/doc/html/draft-murchison-sasl-login-00

use super::Verifier;
use crate::engine::ServerEvent;

pub const USERNAME_CHALLENGE: &[u8] = b"Username:";
pub const PASSWORD_CHALLENGE: &[u8] = b"Password:";

#[derive(Debug, Default)]
pub enum LoginServer {
    #[default]
    AwaitUsername,
    AwaitPassword {
        username: String,
    },
    Done,
}

impl LoginServer {
    pub async fn step(&mut self, verifier: &dyn Verifier, data: &[u8]) -> ServerEvent {
        match std::mem::replace(self, Self::Done) {
            Self::AwaitUsername => match std::str::from_utf8(data) {
                Ok(username) => {
                    *self = Self::AwaitPassword {
                        username: username.to_string(),
                    };
                    ServerEvent::NextStep(PASSWORD_CHALLENGE.to_vec())
                }
                Err(_) => {
                    tracing::error!("Username contains invalid UTF-8 characters");
                    ServerEvent::Authenticated(false)
                }
            },
            Self::AwaitPassword { username } => match std::str::from_utf8(data) {
                Ok(password) => {
                    let ok = verifier.verify(&username, password).await;
                    if !ok {
                        tracing::warn!(user=%username, "login failed");
                    }
                    ServerEvent::Authenticated(ok)
                }
                Err(_) => {
                    tracing::error!("Password contains invalid UTF-8 characters");
                    ServerEvent::Authenticated(false)
                }
            },
            Self::Done => {
                tracing::error!("LOGIN exchange is already over");
                ServerEvent::Authenticated(false)
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LoginClient {
    #[default]
    SendUsername,
    SendPassword,
    Done,
}

impl LoginClient {
    /// Answers are sent in order, whatever the server prompt says
    pub fn step(&mut self, authname: &str, password: &str) -> Option<Vec<u8>> {
        match *self {
            Self::SendUsername => {
                *self = Self::SendPassword;
                Some(authname.as_bytes().to_vec())
            }
            Self::SendPassword => {
                *self = Self::Done;
                Some(password.as_bytes().to_vec())
            }
            Self::Done => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanism::tests::Alice;

    #[tokio::test]
    async fn server_asks_username_then_password() {
        let mut srv = LoginServer::default();
        assert_eq!(
            srv.step(&Alice, b"alice").await,
            ServerEvent::NextStep(PASSWORD_CHALLENGE.to_vec())
        );
        assert_eq!(
            srv.step(&Alice, b"hunter2").await,
            ServerEvent::Authenticated(true)
        );
        assert_eq!(
            srv.step(&Alice, b"again").await,
            ServerEvent::Authenticated(false)
        );
    }

    #[tokio::test]
    async fn server_rejects_wrong_password() {
        let mut srv = LoginServer::default();
        srv.step(&Alice, b"alice").await;
        assert_eq!(
            srv.step(&Alice, b"nope").await,
            ServerEvent::Authenticated(false)
        );
    }

    #[test]
    fn client_answers_in_order() {
        let mut cli = LoginClient::default();
        assert_eq!(cli.step("alice", "hunter2"), Some(b"alice".to_vec()));
        assert_eq!(cli.step("alice", "hunter2"), Some(b"hunter2".to_vec()));
        assert_eq!(cli.step("alice", "hunter2"), None);
    }
}

use super::Verifier;
use crate::decode::auth_plain;

const EMPTY_AUTHZ: &[u8] = &[];

/// `authzid NUL authcid NUL passwd`, the authorization identity is left
/// empty when it is the authentication identity.
pub fn response(authzid: Option<&str>, authcid: &str, password: &str) -> Vec<u8> {
    let authzid = match authzid {
        Some(z) if z != authcid => z,
        _ => "",
    };
    let mut out = Vec::with_capacity(authzid.len() + authcid.len() + password.len() + 2);
    out.extend_from_slice(authzid.as_bytes());
    out.push(0);
    out.extend_from_slice(authcid.as_bytes());
    out.push(0);
    out.extend_from_slice(password.as_bytes());
    out
}

pub async fn verify(verifier: &dyn Verifier, data: &[u8]) -> bool {
    // Check that we can extract user's login+pass
    let (ubin, pbin) = match auth_plain(data) {
        Ok(([], (authz, user, pass))) if authz == user || authz == EMPTY_AUTHZ => (user, pass),
        Ok(_) => {
            tracing::error!("Impersonating user is not supported");
            return false;
        }
        Err(e) => {
            tracing::error!(err=?e, "Could not parse the SASL PLAIN data chunk");
            return false;
        }
    };

    // Try to convert it to UTF-8
    let (user, password) = match (std::str::from_utf8(ubin), std::str::from_utf8(pbin)) {
        (Ok(u), Ok(p)) => (u, p),
        _ => {
            tracing::error!("Username or password contain invalid UTF-8 characters");
            return false;
        }
    };

    match verifier.verify(user, password).await {
        true => true,
        false => {
            tracing::warn!(user=%user, "login failed");
            false
        }
    }
}

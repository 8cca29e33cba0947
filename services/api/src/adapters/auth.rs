//! services/api/src/adapters/auth.rs
//!
//! Bearer credential validation. The identity system issues opaque tokens of
//! the form `role:user_id:mac` where `mac` is an HMAC-SHA256 of `role:user_id`
//! under a shared secret. This adapter checks the MAC and resolves the actor.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use studysphere_core::error::{DomainError, DomainResult};
use studysphere_core::ports::AuthService;
use studysphere_core::Actor;

type HmacSha256 = Hmac<Sha256>;

pub struct TokenAuthService {
    secret: String,
}

impl TokenAuthService {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    fn mac_for(&self, role: &str, user_id: &str) -> DomainResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| DomainError::Storage(e.to_string()))?;
        mac.update(role.as_bytes());
        mac.update(b":");
        mac.update(user_id.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Builds a token for a known actor. Exercised by the integration
    /// tooling; the production issuer lives in the identity service.
    pub fn issue(&self, actor: Actor) -> DomainResult<String> {
        let (role, id) = match actor {
            Actor::Student(id) => ("student", id),
            Actor::Tutor(id) => ("tutor", id),
            Actor::Admin(id) => ("admin", id),
        };
        let id = id.to_string();
        let mac = self.mac_for(role, &id)?;
        Ok(format!("{role}:{id}:{mac}"))
    }
}

#[async_trait]
impl AuthService for TokenAuthService {
    async fn validate(&self, token: &str) -> DomainResult<Actor> {
        let mut parts = token.splitn(3, ':');
        let (Some(role), Some(id_str), Some(provided)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(DomainError::Authorization(
                "malformed credential".to_string(),
            ));
        };

        let expected = self.mac_for(role, id_str)?;
        let matches = expected.len() == provided.len()
            && expected
                .bytes()
                .zip(provided.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0;
        if !matches {
            return Err(DomainError::Authorization(
                "invalid credential".to_string(),
            ));
        }

        let user_id = Uuid::parse_str(id_str)
            .map_err(|_| DomainError::Authorization("malformed user id".to_string()))?;
        match role {
            "student" => Ok(Actor::Student(user_id)),
            "tutor" => Ok(Actor::Tutor(user_id)),
            "admin" => Ok(Actor::Admin(user_id)),
            _ => Err(DomainError::Authorization("unknown role".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_token_validates() {
        let svc = TokenAuthService::new("s3cret".to_string());
        let id = Uuid::new_v4();
        let token = svc.issue(Actor::Tutor(id)).unwrap();
        let actor = svc.validate(&token).await.unwrap();
        assert_eq!(actor, Actor::Tutor(id));
    }

    #[tokio::test]
    async fn tampered_token_rejected() {
        let svc = TokenAuthService::new("s3cret".to_string());
        let id = Uuid::new_v4();
        let token = svc.issue(Actor::Student(id)).unwrap();

        // Role swap invalidates the MAC.
        let forged = token.replacen("student", "admin", 1);
        assert!(svc.validate(&forged).await.is_err());

        // Wrong secret invalidates the MAC.
        let other = TokenAuthService::new("different".to_string());
        assert!(other.validate(&token).await.is_err());
    }

    #[tokio::test]
    async fn malformed_tokens_rejected() {
        let svc = TokenAuthService::new("s3cret".to_string());
        assert!(svc.validate("garbage").await.is_err());
        assert!(svc.validate("student:not-a-uuid:abc").await.is_err());
        assert!(svc.validate("").await.is_err());
    }
}

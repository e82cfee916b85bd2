use anyhow::Result;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Claims for the signed bearer token the gateway presents to the
/// persistence backend: HS256, role `api`, TTL bounded to <= 1h.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceClaims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
    pub iat: usize,
}

pub struct ServiceTokenIssuer {
    encoding_key: EncodingKey,
    ttl_seconds: u64,
}

impl ServiceTokenIssuer {
    pub fn new(secret: &str, ttl_seconds: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            ttl_seconds: ttl_seconds.min(3600),
        }
    }

    pub fn issue(&self) -> Result<String> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;
        let claims = ServiceClaims {
            sub: "rag-gateway".to_string(),
            role: "api".to_string(),
            iat: now,
            exp: now + self.ttl_seconds as usize,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_capped_at_one_hour() {
        let issuer = ServiceTokenIssuer::new("secret", 999_999);
        assert_eq!(issuer.ttl_seconds, 3600);
    }

    #[test]
    fn issues_a_nonempty_token() {
        let issuer = ServiceTokenIssuer::new("secret", 3600);
        let token = issuer.issue().unwrap();
        assert!(!token.is_empty());
        assert_eq!(token.matches('.').count(), 2);
    }
}

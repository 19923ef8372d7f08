use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

use crate::models::{Claims, TokenType};

/// Identity embedded in every token issued for a user.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: u64,
    pub username: String,
    pub role: u8,
    pub employee_id: Option<u64>,
}

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

fn claims_for(subject: &TokenSubject, token_type: TokenType, ttl: usize) -> Claims {
    Claims {
        user_id: subject.user_id,
        sub: subject.username.clone(),
        role: subject.role,
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
        employee_id: subject.employee_id,
    }
}

fn sign(claims: &Claims, secret: &str) -> Result<String, Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn generate_access_token(
    subject: &TokenSubject,
    secret: &str,
    ttl: usize,
) -> Result<String, Error> {
    sign(&claims_for(subject, TokenType::Access, ttl), secret)
}

/// Returns the token together with its claims so the caller can persist the `jti`.
pub fn generate_refresh_token(
    subject: &TokenSubject,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    let claims = claims_for(subject, TokenType::Refresh, ttl);
    let token = sign(&claims, secret)?;
    Ok((token, claims))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: 7,
            username: "alice".to_string(),
            role: 3,
            employee_id: Some(42),
        }
    }

    #[test]
    fn access_token_carries_identity() {
        let token = generate_access_token(&subject(), "secret", 60).unwrap();
        let claims = verify_token(&token, "secret").unwrap();

        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.role, 3);
        assert_eq!(claims.employee_id, Some(42));
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn refresh_token_returns_matching_claims() {
        let (token, issued) = generate_refresh_token(&subject(), "secret", 60).unwrap();
        let claims = verify_token(&token, "secret").unwrap();

        assert_eq!(claims.token_type, TokenType::Refresh);
        assert_eq!(claims.jti, issued.jti);
    }

    #[test]
    fn every_token_gets_a_fresh_jti() {
        let (_, a) = generate_refresh_token(&subject(), "secret", 60).unwrap();
        let (_, b) = generate_refresh_token(&subject(), "secret", 60).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_access_token(&subject(), "secret", 60).unwrap();
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = claims_for(&subject(), TokenType::Access, 0);
        // beyond the default 60s leeway
        claims.exp = now() - 3600;
        let token = sign(&claims, "secret").unwrap();
        assert!(verify_token(&token, "secret").is_err());
    }
}

use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::claims::{Capability, Claims};
use crate::{config::JwtConfig, error::DiaryError, state::AppState};

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs(cfg.ttl_minutes.max(1) as u64 * 60),
        }
    }

    /// `caps: None` grants every capability.
    pub fn sign_access(
        &self,
        patient_id: Uuid,
        caps: Option<Vec<Capability>>,
    ) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.access_ttl.as_secs() as i64);
        let claims = Claims {
            sub: patient_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            caps,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(%patient_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(patient_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from_config(&state.config.jwt)
    }
}

/// Authenticated patient with the capabilities resolved from the token.
#[derive(Debug, Clone)]
pub struct Patient {
    pub id: Uuid,
    caps: Vec<Capability>,
}

impl Patient {
    pub fn new(id: Uuid, caps: Option<Vec<Capability>>) -> Self {
        Self {
            id,
            caps: caps.unwrap_or_else(|| Capability::ALL.to_vec()),
        }
    }

    pub fn can(&self, cap: Capability) -> bool {
        self.caps.contains(&cap)
    }

    pub fn require(&self, cap: Capability) -> Result<(), DiaryError> {
        if self.can(cap) {
            Ok(())
        } else {
            warn!(patient_id = %self.id, capability = %cap, "capability missing");
            Err(DiaryError::Forbidden(format!(
                "You do not have the `{}` permission",
                cap
            )))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Patient
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = DiaryError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| DiaryError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| DiaryError::Unauthorized("Invalid Authorization header".into()))?;

        let claims = keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            DiaryError::Unauthorized("Invalid or expired token".into())
        })?;

        Ok(Patient::new(claims.sub, claims.caps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
        })
    }

    #[test]
    fn sign_and_verify_access_token() {
        let keys = keys("dev-secret", "test-issuer", "test-aud");
        let patient_id = Uuid::new_v4();
        let token = keys.sign_access(patient_id, None).expect("sign access");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, patient_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert!(claims.caps.is_none());
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = keys("same-secret", "good-iss", "good-aud");
        let bad = keys("same-secret", "bad-iss", "bad-aud");
        let token = good.sign_access(Uuid::new_v4(), None).expect("sign access");
        assert!(bad.verify(&token).is_err());
    }

    #[test]
    fn capabilities_survive_the_token() {
        let keys = keys("dev-secret", "iss", "aud");
        let token = keys
            .sign_access(Uuid::new_v4(), Some(vec![Capability::ViewMeals]))
            .unwrap();
        let claims = keys.verify(&token).unwrap();
        let patient = Patient::new(claims.sub, claims.caps);
        assert!(patient.can(Capability::ViewMeals));
        assert!(matches!(
            patient.require(Capability::DeleteMeals),
            Err(DiaryError::Forbidden(_))
        ));
    }

    #[test]
    fn missing_caps_claim_grants_everything() {
        let patient = Patient::new(Uuid::new_v4(), None);
        assert!(Capability::ALL.into_iter().all(|c| patient.can(c)));
        assert_eq!("meals:edit".parse::<Capability>(), Ok(Capability::EditMeals));
        assert!("meals:admin".parse::<Capability>().is_err());
    }
}

//! Bearer token decoding and the permissions they carry.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token format")]
    InvalidFormat,
    #[error("Invalid token encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("Invalid token payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A permission granted on a resource, or on scopes alone when `resource_id` is absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Permission {
    #[serde(rename = "rsid", default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(rename = "rsname", default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    /// Claim name to the values the claim may take for this permission to apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<BTreeMap<String, BTreeSet<String>>>,
}

impl Permission {
    pub fn new(resource_id: &str, scopes: &[&str]) -> Self {
        Self {
            resource_id: Some(resource_id.to_string()),
            scopes: scopes.iter().map(|scope| scope.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Authorization {
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

/// Decoded payload of a JWT access token or RPT.
///
/// The signature is not verified here; the token has already been
/// authenticated by the layer that supplied it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AccessToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<Authorization>,
    #[serde(flatten)]
    pub other_claims: Map<String, Value>,
}

impl AccessToken {
    pub fn decode(raw: &str) -> Result<Self, TokenError> {
        let mut parts = raw.split('.');
        let payload = match (parts.next(), parts.next()) {
            (Some(_), Some(payload)) if !payload.is_empty() => payload,
            _ => return Err(TokenError::InvalidFormat),
        };
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn permissions(&self) -> &[Permission] {
        self.authorization
            .as_ref()
            .map(|authorization| authorization.permissions.as_slice())
            .unwrap_or_default()
    }

    /// Not expired and not used before its `nbf`, at time `now` (epoch seconds).
    pub fn is_active_at(&self, now: i64) -> bool {
        let not_expired = match self.exp {
            Some(exp) if exp != 0 => now <= exp,
            _ => true,
        };
        let not_before = match self.nbf {
            Some(nbf) if nbf != 0 => now >= nbf,
            _ => true,
        };
        not_expired && not_before
    }

    /// Whether the token outlives `now` by more than `min_ttl` seconds.
    pub fn has_time_to_live(&self, min_ttl: i64, now: i64) -> bool {
        match self.exp {
            Some(exp) if exp != 0 => exp - min_ttl > now,
            _ => true,
        }
    }

    /// A copy of this token with `granted` unioned into its permissions.
    pub fn with_permissions(&self, granted: &[Permission]) -> AccessToken {
        let mut permissions = self.permissions().to_vec();
        for permission in granted {
            if !permissions.contains(permission) {
                permissions.push(permission.clone());
            }
        }
        AccessToken {
            authorization: Some(Authorization { permissions }),
            ..self.clone()
        }
    }

    /// Look up a claim by JSON pointer, e.g. `/realm_access/roles`.
    pub fn claim(&self, pointer: &str) -> Option<Value> {
        let value = serde_json::to_value(self).ok()?;
        value.pointer(pointer).cloned()
    }
}

/// Current wall-clock time in epoch seconds.
pub(crate) fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

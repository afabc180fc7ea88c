//! Storage accounts: a destination folder plus the credential used to reach it.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use serde::Serialize;

/// OAuth2 user credential with refresh support.
#[derive(Debug, Clone)]
pub struct OAuthCredential {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: DateTime<Utc>,
}

impl OAuthCredential {
    /// Checks if the token is expired (or expires within `buffer_seconds`).
    pub fn is_expired(&self, buffer_seconds: u64) -> bool {
        self.is_expired_at(Utc::now(), buffer_seconds)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer_seconds: u64) -> bool {
        let buffer = Duration::seconds(buffer_seconds.min(365 * 24 * 3600) as i64);
        self.expires_at <= now + buffer
    }

    /// Checks if the token can be refreshed.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Credential material bound to an account.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Access/refresh token pair obtained through the authorization flow.
    OAuth(OAuthCredential),
    /// Opaque service credential, sent as a bearer token as-is.
    ServiceToken(SecretString),
}

impl Credential {
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::OAuth(_) => "oauth",
            Credential::ServiceToken(_) => "service_token",
        }
    }
}

/// A registered destination. Owns zero or more jobs.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    /// Unique display name.
    pub name: String,
    /// Target folder identifier at the drive provider.
    pub folder_id: String,
    pub credential: Credential,
    pub user_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Credential-free view suitable for listings.
    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id,
            name: self.name.clone(),
            folder_id: self.folder_id.clone(),
            user_email: self.user_email.clone(),
            credential_kind: self.credential.kind(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Fields required to register an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub folder_id: String,
    pub credential: Credential,
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub id: i64,
    pub name: String,
    pub folder_id: String,
    pub user_email: Option<String>,
    pub credential_kind: &'static str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oauth(expires_at: DateTime<Utc>) -> OAuthCredential {
        OAuthCredential {
            access_token: SecretString::from("access-123"),
            refresh_token: Some(SecretString::from("refresh-456")),
            expires_at,
        }
    }

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        assert!(!oauth(now + Duration::hours(1)).is_expired_at(now, 60));
        assert!(oauth(now + Duration::seconds(30)).is_expired_at(now, 60));
        assert!(oauth(now - Duration::hours(1)).is_expired_at(now, 0));
    }

    #[test]
    fn test_can_refresh() {
        let mut cred = oauth(Utc::now());
        assert!(cred.can_refresh());
        cred.refresh_token = None;
        assert!(!cred.can_refresh());
    }

    #[test]
    fn test_summary_hides_credential() {
        let now = Utc::now();
        let account = Account {
            id: 1,
            name: "shelf".to_string(),
            folder_id: "folder-1".to_string(),
            credential: Credential::ServiceToken(SecretString::from("very-secret")),
            user_email: Some("reader@example.com".to_string()),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&account.summary()).unwrap();
        assert!(json.contains("service_token"));
        assert!(!json.contains("very-secret"));
    }
}

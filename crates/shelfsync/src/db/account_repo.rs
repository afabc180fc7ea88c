//! Account repository: CRUD operations for the `accounts` table.
//!
//! Accounts are never hard-deleted; after registration only the credential
//! columns change (on token refresh).

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use secrecy::{ExposeSecret, SecretString};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::model::{timestamp_now, Account, Credential, NewAccount, OAuthCredential};

const ACCOUNT_COLUMNS: &str = "id, name, folder_id, access_token, refresh_token, token_expiry, \
     service_token, user_email, created_at, updated_at";

/// Credential columns as stored: (access_token, refresh_token, token_expiry, service_token).
type CredentialColumns = (Option<String>, Option<String>, Option<String>, Option<String>);

fn credential_columns(credential: &Credential) -> CredentialColumns {
    match credential {
        Credential::OAuth(oauth) => (
            Some(oauth.access_token.expose_secret().to_string()),
            oauth
                .refresh_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
            Some(format_timestamp(&oauth.expires_at)),
            None,
        ),
        Credential::ServiceToken(token) => {
            (None, None, None, Some(token.expose_secret().to_string()))
        }
    }
}

fn credential_from_row(row: &Row<'_>) -> Result<Credential, rusqlite::Error> {
    let access_token: Option<String> = row.get(3)?;
    let refresh_token: Option<String> = row.get(4)?;
    let token_expiry: Option<String> = row.get(5)?;
    let service_token: Option<String> = row.get(6)?;

    if let Some(token) = service_token {
        return Ok(Credential::ServiceToken(SecretString::from(token)));
    }

    match (access_token, token_expiry) {
        (Some(access_token), Some(expiry)) => Ok(Credential::OAuth(OAuthCredential {
            access_token: SecretString::from(access_token),
            refresh_token: refresh_token.map(SecretString::from),
            expires_at: parse_timestamp(5, &expiry)?,
        })),
        _ => Err(rusqlite::Error::InvalidColumnType(
            3,
            "access_token".to_string(),
            rusqlite::types::Type::Null,
        )),
    }
}

fn account_from_row(row: &Row<'_>) -> Result<Account, rusqlite::Error> {
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        folder_id: row.get(2)?,
        credential: credential_from_row(row)?,
        user_email: row.get(7)?,
        created_at: parse_timestamp(8, &created_at)?,
        updated_at: parse_timestamp(9, &updated_at)?,
    })
}

/// Registers an account. Fails with [`DatabaseError::UniqueViolation`] when
/// the name is taken.
pub fn insert(db: &Database, account: &NewAccount) -> Result<Account, DatabaseError> {
    let now = timestamp_now();
    let (access_token, refresh_token, token_expiry, service_token) =
        credential_columns(&account.credential);

    let id = db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO accounts (name, folder_id, access_token, refresh_token, token_expiry,
             service_token, user_email, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                account.name,
                account.folder_id,
                access_token,
                refresh_token,
                token_expiry,
                service_token,
                account.user_email,
                format_timestamp(&now),
            ],
        )
        .map_err(DatabaseError::from_write)?;
        Ok(conn.last_insert_rowid())
    })?;

    Ok(Account {
        id,
        name: account.name.clone(),
        folder_id: account.folder_id.clone(),
        credential: account.credential.clone(),
        user_email: account.user_email.clone(),
        created_at: now,
        updated_at: now,
    })
}

/// Finds an account by its ID.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<Account>, DatabaseError> {
    db.with_conn(|conn| {
        let account = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
                params![id],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    })
}

/// Finds an account by its unique name.
pub fn find_by_name(db: &Database, name: &str) -> Result<Option<Account>, DatabaseError> {
    db.with_conn(|conn| {
        let account = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE name = ?1"),
                params![name],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    })
}

/// Lists all accounts in registration order.
pub fn list(db: &Database) -> Result<Vec<Account>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map([], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Replaces the credential of an account. Returns `false` when no such account exists.
pub fn update_credential(
    db: &Database,
    id: i64,
    credential: &Credential,
    now: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let (access_token, refresh_token, token_expiry, service_token) =
        credential_columns(credential);

    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE accounts SET access_token = ?2, refresh_token = ?3, token_expiry = ?4,
             service_token = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                id,
                access_token,
                refresh_token,
                token_expiry,
                service_token,
                format_timestamp(now),
            ],
        )?;
        Ok(changed == 1)
    })
}

use std::collections::HashMap;

use async_trait::async_trait;
use carepoint_shared::{Masked, Role};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Tokens returned by a successful authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthTokens {
    pub id_token: Masked<String>,
    pub access_token: Masked<String>,
    pub refresh_token: Masked<String>,
}

#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: Masked<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub specialty: Option<String>,
    pub languages: Option<String>,
    pub location: Option<String>,
}

/// Account management calls against the external identity service. All
/// calls are keyed by (lower-cased) email.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, request: &SignUpRequest) -> CoreResult<()>;

    async fn confirm_sign_up(&self, email: &str, code: &str) -> CoreResult<()>;

    async fn resend_confirmation(&self, email: &str) -> CoreResult<()>;

    async fn authenticate(&self, email: &str, password: &str) -> CoreResult<AuthTokens>;

    /// Revoke the provider-side session. Best effort from the portal's view.
    async fn sign_out(&self, email: &str) -> CoreResult<()>;

    async fn forgot_password(&self, email: &str) -> CoreResult<()>;

    async fn confirm_password_reset(&self, email: &str, code: &str, new_password: &str) -> CoreResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct IssuedClaims {
    sub: String,
    email: String,
    #[serde(rename = "cognito:groups")]
    groups: Vec<String>,
    given_name: String,
    family_name: String,
    token_use: String,
    exp: i64,
}

#[derive(Debug, Clone)]
struct MockAccount {
    subject: String,
    password: String,
    first_name: String,
    last_name: String,
    role: Role,
    confirmed: bool,
    pending_code: Option<String>,
}

/// In-process identity provider for local runs and tests. Issues HS256
/// tokens shaped like the real issuer's (`sub`, `email`, `cognito:groups`,
/// `exp`).
pub struct MockIdentityProvider {
    secret: String,
    token_ttl: Duration,
    accounts: RwLock<HashMap<String, MockAccount>>,
}

impl MockIdentityProvider {
    pub fn new(secret: &str, token_ttl_seconds: i64) -> Self {
        Self {
            secret: secret.to_string(),
            token_ttl: Duration::seconds(token_ttl_seconds),
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Confirmation or reset code last sent to `email`.
    pub async fn pending_code(&self, email: &str) -> Option<String> {
        self.accounts
            .read()
            .await
            .get(&email.to_lowercase())
            .and_then(|a| a.pending_code.clone())
    }

    fn new_code() -> String {
        format!("{:06}", Uuid::new_v4().as_u128() % 1_000_000)
    }

    fn issue(&self, email: &str, account: &MockAccount, token_use: &str) -> CoreResult<String> {
        let claims = IssuedClaims {
            sub: account.subject.clone(),
            email: email.to_string(),
            groups: vec![account.role.as_str().to_string()],
            given_name: account.first_name.clone(),
            family_name: account.last_name.clone(),
            token_use: token_use.to_string(),
            exp: (Utc::now() + self.token_ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| CoreError::IdentityError(format!("Token encoding failed: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_up(&self, request: &SignUpRequest) -> CoreResult<()> {
        let email = request.email.to_lowercase();
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&email) {
            return Err(CoreError::IdentityError("An account with the given email already exists.".to_string()));
        }

        tracing::info!("Registering {} account for {}", request.role, email);
        accounts.insert(
            email,
            MockAccount {
                subject: Uuid::new_v4().to_string(),
                password: request.password.expose().clone(),
                first_name: request.first_name.clone(),
                last_name: request.last_name.clone(),
                role: request.role,
                confirmed: false,
                pending_code: Some(Self::new_code()),
            },
        );
        Ok(())
    }

    async fn confirm_sign_up(&self, email: &str, code: &str) -> CoreResult<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&email.to_lowercase())
            .ok_or_else(|| CoreError::IdentityError("User does not exist.".to_string()))?;

        if account.pending_code.as_deref() != Some(code) {
            return Err(CoreError::IdentityError("Invalid verification code provided.".to_string()));
        }
        account.confirmed = true;
        account.pending_code = None;
        Ok(())
    }

    async fn resend_confirmation(&self, email: &str) -> CoreResult<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&email.to_lowercase())
            .ok_or_else(|| CoreError::IdentityError("User does not exist.".to_string()))?;
        if account.confirmed {
            return Err(CoreError::IdentityError("User is already confirmed.".to_string()));
        }
        account.pending_code = Some(Self::new_code());
        Ok(())
    }

    async fn authenticate(&self, email: &str, password: &str) -> CoreResult<AuthTokens> {
        let email = email.to_lowercase();
        let accounts = self.accounts.read().await;
        let account = accounts
            .get(&email)
            .filter(|a| a.password == password)
            .ok_or_else(|| CoreError::IdentityError("Incorrect username or password.".to_string()))?;

        if !account.confirmed {
            return Err(CoreError::IdentityError("User is not confirmed.".to_string()));
        }

        Ok(AuthTokens {
            id_token: self.issue(&email, account, "id")?.into(),
            access_token: self.issue(&email, account, "access")?.into(),
            refresh_token: Uuid::new_v4().to_string().into(),
        })
    }

    async fn sign_out(&self, email: &str) -> CoreResult<()> {
        tracing::debug!("Provider sign-out for {}", email);
        Ok(())
    }

    async fn forgot_password(&self, email: &str) -> CoreResult<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&email.to_lowercase())
            .ok_or_else(|| CoreError::IdentityError("User does not exist.".to_string()))?;
        account.pending_code = Some(Self::new_code());
        Ok(())
    }

    async fn confirm_password_reset(&self, email: &str, code: &str, new_password: &str) -> CoreResult<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&email.to_lowercase())
            .ok_or_else(|| CoreError::IdentityError("User does not exist.".to_string()))?;

        if account.pending_code.as_deref() != Some(code) {
            return Err(CoreError::IdentityError("Invalid verification code provided.".to_string()));
        }
        account.password = new_password.to_string();
        account.pending_code = None;
        Ok(())
    }
}

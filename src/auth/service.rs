use std::sync::Arc;

use axum::extract::FromRef;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

use super::dto::{PublicUser, TokenPair};
use super::jwt::JwtKeys;
use super::password::{hash_password, verify_password};
use super::store::{StoreError, User, UserStore};
use super::validate::{is_valid_email, is_valid_password};

/// Orchestrates registration, login, current-user lookup and token
/// refresh. Every lower-level failure is mapped to an `AppError` kind
/// before it leaves this type.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
    bcrypt_cost: u32,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(
            state.store.clone(),
            JwtKeys::from_config(&state.config.jwt),
            state.config.bcrypt_cost,
        )
    }
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, keys: JwtKeys, bcrypt_cost: u32) -> Self {
        Self {
            store,
            keys,
            bcrypt_cost,
        }
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<PublicUser, AppError> {
        if !is_valid_email(email) {
            warn!("register with invalid email");
            return Err(AppError::InvalidInput);
        }
        if !is_valid_password(password) {
            warn!("register with too short password");
            return Err(AppError::InvalidInput);
        }

        match self.store.find_by_email(email).await {
            Ok(_) => {
                warn!("register with already registered email");
                return Err(AppError::AlreadyExists);
            }
            Err(StoreError::NotFound) => {}
            Err(e) => {
                error!(error = %e, "email lookup failed");
                return Err(AppError::Internal);
            }
        }

        let password_hash =
            hash_password(password, self.bcrypt_cost).map_err(|_| AppError::Internal)?;

        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_owned(),
            password_hash,
            created_at: now,
            updated_at: now,
        };

        self.store.create(&user).await.map_err(|e| match e {
            StoreError::Duplicate => AppError::AlreadyExists,
            other => {
                error!(error = %other, "create user failed");
                AppError::Internal
            }
        })?;

        info!(user_id = %user.id, "user registered");
        Ok(PublicUser::from(user))
    }

    /// Unknown email, wrong password and a broken stored hash all come
    /// back as `Unauthorized`; a caller cannot probe which one happened.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AppError> {
        if !is_valid_email(email) {
            return Err(AppError::InvalidInput);
        }

        let user = self
            .store
            .find_by_email(email)
            .await
            .map_err(|_| AppError::Unauthorized)?;

        if !verify_password(password, &user.password_hash).unwrap_or(false) {
            warn!(user_id = %user.id, "login with wrong password");
            return Err(AppError::Unauthorized);
        }

        let pair = self.issue_pair(user.id)?;
        info!(user_id = %user.id, "user logged in");
        Ok(pair)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<PublicUser, AppError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await
            .map_err(|_| AppError::NotFound)?;
        Ok(PublicUser::from(user))
    }

    /// Rotates the pair. The old refresh token is not tracked and stays
    /// valid until its own expiry; there is no revocation list.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self
            .keys
            .verify(refresh_token)
            .map_err(|_| AppError::Unauthorized)?;

        // Subject must still exist; a deleted account cannot rotate tokens.
        self.store
            .find_by_id(claims.sub)
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let pair = self.issue_pair(claims.sub)?;
        info!(user_id = %claims.sub, "token pair refreshed");
        Ok(pair)
    }

    fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        let access_token = self.keys.sign_access(user_id).map_err(|e| {
            error!(error = %e, "jwt sign access failed");
            AppError::Internal
        })?;
        let refresh_token = self.keys.sign_refresh(user_id).map_err(|e| {
            error!(error = %e, "jwt sign refresh failed");
            AppError::Internal
        })?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}

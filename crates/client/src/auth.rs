//! Auth operations: validate input, call the API, dispatch the result.

use std::sync::Arc;

use solarcare_core::{AuthAction, Clock, ProfilePatch, Session, Store, UserProfile};
use validator::{Validate, ValidationError};

use crate::api::ApiClient;
use crate::error::ApiError;

const INVALID_PHONE: &str = "Please enter a valid 10-digit phone number";
const INVALID_OTP: &str = "Please enter the 6-digit code";
const INVALID_EMAIL: &str = "Please enter a valid email address";

fn digits_only(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("digits_only"))
    }
}

#[derive(Debug, Validate)]
struct PhoneForm {
    #[validate(length(equal = 10), custom(function = "digits_only"))]
    phone: String,
}

#[derive(Debug, Validate)]
struct OtpForm {
    #[validate(length(equal = 6), custom(function = "digits_only"))]
    otp: String,
}

#[derive(Debug, Validate)]
struct ProfileForm {
    #[validate(email)]
    email: Option<String>,
}

#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(api: ApiClient, clock: Arc<dyn Clock>) -> Self {
        Self { api, clock }
    }

    fn store(&self) -> &Store {
        self.api.base().store()
    }

    /// Request an OTP for `phone`.
    pub async fn send_otp(&self, phone: &str) -> Result<(), ApiError> {
        let phone = phone.trim();
        if (PhoneForm { phone: phone.to_string() }).validate().is_err() {
            return Err(self.reject(AuthAction::SendOtpRejected, INVALID_PHONE));
        }

        self.store().dispatch(AuthAction::SendOtpPending);
        match self.api.send_otp(phone).await {
            Ok(_) => {
                self.store().dispatch(AuthAction::SendOtpFulfilled);
                Ok(())
            }
            Err(err) => {
                self.store()
                    .dispatch(AuthAction::SendOtpRejected(err.user_message()));
                Err(err)
            }
        }
    }

    /// Exchange `otp` for a session. On success every session field is
    /// set in one dispatch.
    pub async fn verify_otp(&self, phone: &str, otp: &str) -> Result<UserProfile, ApiError> {
        let (phone, otp) = (phone.trim(), otp.trim());
        if (PhoneForm { phone: phone.to_string() }).validate().is_err() {
            return Err(self.reject(AuthAction::VerifyOtpRejected, INVALID_PHONE));
        }
        if (OtpForm { otp: otp.to_string() }).validate().is_err() {
            return Err(self.reject(AuthAction::VerifyOtpRejected, INVALID_OTP));
        }

        self.store().dispatch(AuthAction::VerifyOtpPending);
        let result = self.api.verify_otp(phone, otp).await.and_then(|response| {
            if response.token.is_empty() {
                return Err(ApiError::Decode("server returned an empty token".into()));
            }
            response
                .user
                .check_identity()
                .map_err(|e| ApiError::Decode(e.to_string()))?;
            Ok(response)
        });

        match result {
            Ok(response) => {
                let user = response.user.clone();
                self.store().dispatch(AuthAction::LoginSucceeded(Session {
                    token: response.token,
                    refresh_token: response.refresh_token,
                    user: response.user,
                    last_login_time: self.clock.now_millis(),
                }));
                tracing::info!(user_id = %user.id, "Logged in");
                Ok(user)
            }
            Err(err) => {
                self.store()
                    .dispatch(AuthAction::VerifyOtpRejected(err.user_message()));
                Err(err)
            }
        }
    }

    /// End the session. The server is told best-effort, bounded by the
    /// request timeout; the local session is cleared regardless.
    pub async fn logout(&self) {
        if self.store().token().is_some() {
            let timeout = self.api.base().config().timeout;
            match tokio::time::timeout(timeout, self.api.logout()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "Server logout failed, clearing session anyway"),
                Err(_) => tracing::debug!("Server logout timed out, clearing session anyway"),
            }
        }
        self.api.base().logout().logout_now().await;
    }

    /// Swap the refresh token for a new access token.
    pub async fn refresh_session(&self) -> Result<(), ApiError> {
        let refresh_token = self
            .store()
            .with_state(|s| s.auth.refresh_token().map(str::to_owned))
            .ok_or_else(|| ApiError::Validation("No refresh token available".into()))?;

        let response = self.api.refresh_token(&refresh_token).await?;
        self.store().dispatch(AuthAction::TokenRefreshed {
            token: response.token,
            refresh_token: response.refresh_token,
        });
        tracing::debug!("Access token refreshed");
        Ok(())
    }

    /// Update profile fields; the local profile is patched on success.
    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<UserProfile, ApiError> {
        if (ProfileForm { email: patch.email.clone() }).validate().is_err() {
            return Err(ApiError::Validation(INVALID_EMAIL.into()));
        }

        let user = self.api.update_profile(&patch).await?;
        self.store().dispatch(AuthAction::ProfileUpdated(patch));
        Ok(user)
    }

    fn reject(&self, action: fn(String) -> AuthAction, message: &str) -> ApiError {
        self.store().dispatch(action(message.to_string()));
        ApiError::Validation(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_must_be_ten_digits() {
        assert!(PhoneForm { phone: "1234567890".into() }.validate().is_ok());
        assert!(PhoneForm { phone: "123456789".into() }.validate().is_err());
        assert!(PhoneForm { phone: "12345abcde".into() }.validate().is_err());
    }

    #[test]
    fn otp_must_be_six_digits() {
        assert!(OtpForm { otp: "123456".into() }.validate().is_ok());
        assert!(OtpForm { otp: "12345".into() }.validate().is_err());
        assert!(OtpForm { otp: "12a456".into() }.validate().is_err());
    }

    #[test]
    fn email_is_optional_but_checked() {
        assert!(ProfileForm { email: None }.validate().is_ok());
        assert!(ProfileForm { email: Some("asha@example.com".into()) }.validate().is_ok());
        assert!(ProfileForm { email: Some("not-an-email".into()) }.validate().is_err());
    }
}

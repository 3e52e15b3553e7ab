use serde::{Deserialize, Serialize};
use serde_json::json;
use solarcare_core::{ProfilePatch, UserProfile};
use solarcare_storage::keys;

use crate::api::{decode, ApiClient};
use crate::error::ApiError;
use crate::query_cache::CacheTag;
use crate::request::ApiRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpResponse {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpResponse {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: UserProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl ApiClient {
    pub async fn send_otp(&self, phone: &str) -> Result<SendOtpResponse, ApiError> {
        let data = self
            .send(ApiRequest::post("/auth/send-otp", json!({ "phone": phone })))
            .await?;
        decode(data)
    }

    pub async fn verify_otp(&self, phone: &str, otp: &str) -> Result<VerifyOtpResponse, ApiError> {
        let data = self
            .send(ApiRequest::post(
                "/auth/verify-otp",
                json!({ "phone": phone, "otp": otp }),
            ))
            .await?;
        decode(data)
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshTokenResponse, ApiError> {
        let data = self
            .send(
                ApiRequest::post("/auth/refresh", json!({ "refreshToken": refresh_token }))
                    .background(),
            )
            .await?;
        decode(data)
    }

    /// Tell the server the session is over. Background: no spinner.
    /// Tell the server the session is over. The caller clears the local
    /// session, so an auth failure here does not trip the logout latch.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.send(
            ApiRequest::post("/auth/logout", json!({}))
                .background()
                .without_auth_logout(),
        )
        .await?;
        Ok(())
    }

    pub async fn get_profile(&self) -> Result<UserProfile, ApiError> {
        let data = self
            .query_persisted(
                "profile",
                keys::CACHE_PROFILE,
                ApiRequest::get("/auth/profile"),
                vec![CacheTag::Profile],
            )
            .await?;
        decode(data)
    }

    pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<UserProfile, ApiError> {
        let body = serde_json::to_value(patch).map_err(|e| ApiError::Validation(e.to_string()))?;
        let data = self
            .mutate(ApiRequest::put("/auth/profile", body), &[CacheTag::Profile])
            .await?;
        decode(data)
    }
}

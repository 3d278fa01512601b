use serde_json::json;
use shared::{
    error::ApiException,
    protocol::{ApiResponse, AuthPayload, CurrentUserPayload, LoginRequest, RegisterRequest},
};

use crate::gateway::{ApiGateway, CallOptions};

pub async fn login(gateway: &ApiGateway, request: &LoginRequest) -> ApiResponse {
    gateway
        .post(
            "/auth/login",
            json!({ "username": request.username, "password": request.password }),
        )
        .await
}

pub async fn register(gateway: &ApiGateway, request: &RegisterRequest) -> ApiResponse {
    gateway
        .post(
            "/auth/register",
            json!({
                "username": request.username,
                "email": request.email,
                "password": request.password,
            }),
        )
        .await
}

/// Identity behind the current token. Quiet: a failed check shows no toast
/// beyond the gateway's own unauthorized handling.
pub async fn current_user(gateway: &ApiGateway) -> Result<CurrentUserPayload, ApiException> {
    gateway
        .call("/auth/user", CallOptions::get().quiet())
        .await
        .into_data()
}

pub async fn logout(gateway: &ApiGateway) -> ApiResponse {
    gateway
        .call("/logout", CallOptions::post().quiet())
        .await
}

/// Decodes the `data` of a login or register answer. `Ok(None)` when the
/// backend accepted the call without issuing a token.
pub fn auth_payload(response: ApiResponse) -> Result<Option<AuthPayload>, ApiException> {
    let data = response.into_result()?;
    if data.get("token").and_then(|token| token.as_str()).is_none() {
        return Ok(None);
    }
    ApiResponse::success(Some(data)).into_data().map(Some)
}

//! Avatar upload, replacement and removal.
//!
//! Uploaded files go to the configured image host; the account only stores
//! the resulting URL. Without an image host, upload and delete answer 503.
//!
//! `/update-avatar` may point an account at any Cloudinary URL, so the remote
//! asset is only destroyed when it is the account's own upload
//! (`user_avatars/user_<account_id>`). Anything else is just unlinked.

use axum::{
    extract::{Extension, Multipart},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;
use utoipa::ToSchema;

use super::{auth::Principal, ApiError};
use crate::{
    api::images::{owned_public_id, AvatarStorage, ImageHost, CLOUDINARY_URL_PREFIX},
    store::DynStore,
};

pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;
const AVATAR_FIELD: &str = "avatar";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AvatarResponse {
    pub message: String,
    pub avatar_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateAvatarRequest {
    pub avatar_url: String,
}

/// Multipart form with a single `avatar` file field.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct AvatarUpload {
    #[schema(value_type = String, format = Binary)]
    avatar: Vec<u8>,
}

struct UploadedFile {
    bytes: Vec<u8>,
    content_type: String,
}

async fn read_avatar_field(mut multipart: Multipart) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::Validation(format!("Invalid multipart body: {err}")))?
    {
        if field.name() != Some(AVATAR_FIELD) {
            continue;
        }
        let content_type = field
            .content_type()
            .map(str::to_string)
            .filter(|ct| ct.starts_with("image/"))
            .ok_or_else(|| ApiError::Validation("Avatar must be an image".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::Validation(format!("Failed to read avatar: {err}")))?;
        if bytes.is_empty() {
            return Err(ApiError::Validation("No file uploaded".to_string()));
        }
        if bytes.len() > MAX_AVATAR_BYTES {
            return Err(ApiError::Validation(
                "Avatar must be at most 5 MiB".to_string(),
            ));
        }
        return Ok(UploadedFile {
            bytes: bytes.to_vec(),
            content_type,
        });
    }
    Err(ApiError::Validation("No file uploaded".to_string()))
}

fn require_host(avatars: &AvatarStorage) -> Result<&dyn ImageHost, ApiError> {
    avatars
        .host()
        .map(|host| &**host)
        .ok_or(ApiError::Unavailable("Avatar storage"))
}

#[utoipa::path(
    post,
    path = "/upload-avatar",
    request_body(content = AvatarUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Avatar uploaded", body = AvatarResponse),
        (status = 400, description = "Missing, oversized or non-image file", body = super::error::ErrorBody),
        (status = 401, description = "Missing or invalid token", body = super::error::ErrorBody),
        (status = 503, description = "Image host not configured", body = super::error::ErrorBody),
    ),
    tag = "avatar"
)]
#[instrument(skip_all, fields(account_id = %principal.account_id))]
pub async fn upload_avatar(
    principal: Principal,
    Extension(store): Extension<DynStore>,
    Extension(avatars): Extension<AvatarStorage>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let host = require_host(&avatars)?;
    let file = read_avatar_field(multipart).await?;

    let account = store
        .find_by_id(principal.account_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if let Some(public_id) = owned_public_id(&account.avatar_url, account.id) {
        if let Err(err) = host.delete(&public_id).await {
            warn!("Failed to delete previous avatar: {err:#}");
        }
    }

    let avatar_url = host
        .upload_avatar(account.id, file.bytes, &file.content_type)
        .await?;
    store.set_avatar_url(account.id, &avatar_url).await?;
    info!("avatar uploaded");

    Ok((
        StatusCode::OK,
        Json(AvatarResponse {
            message: "Avatar uploaded successfully".to_string(),
            avatar_url,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/update-avatar",
    request_body = UpdateAvatarRequest,
    responses(
        (status = 200, description = "Avatar URL updated", body = AvatarResponse),
        (status = 400, description = "Not a Cloudinary URL", body = super::error::ErrorBody),
        (status = 401, description = "Missing or invalid token", body = super::error::ErrorBody),
    ),
    tag = "avatar"
)]
pub async fn update_avatar(
    principal: Principal,
    Extension(store): Extension<DynStore>,
    payload: Option<Json<UpdateAvatarRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_payload());
    };
    let avatar_url = request.avatar_url.trim();
    if Url::parse(avatar_url).is_err() || !avatar_url.starts_with(CLOUDINARY_URL_PREFIX) {
        return Err(ApiError::Validation(
            "Only Cloudinary URLs are allowed".to_string(),
        ));
    }

    let account = store
        .set_avatar_url(principal.account_id, avatar_url)
        .await?;
    Ok((
        StatusCode::OK,
        Json(AvatarResponse {
            message: "Avatar updated successfully".to_string(),
            avatar_url: account.avatar_url,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/avatar",
    responses(
        (status = 200, description = "Avatar reset to the default", body = AvatarResponse),
        (status = 401, description = "Missing or invalid token", body = super::error::ErrorBody),
        (status = 503, description = "Image host not configured", body = super::error::ErrorBody),
    ),
    tag = "avatar"
)]
#[instrument(skip_all, fields(account_id = %principal.account_id))]
pub async fn delete_avatar(
    principal: Principal,
    Extension(store): Extension<DynStore>,
    Extension(avatars): Extension<AvatarStorage>,
) -> Result<impl IntoResponse, ApiError> {
    let account = store
        .find_by_id(principal.account_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if avatars.is_default(&account.avatar_url) {
        return Ok((
            StatusCode::OK,
            Json(AvatarResponse {
                message: "Avatar already removed".to_string(),
                avatar_url: avatars.default_url().to_string(),
            }),
        ));
    }

    let host = require_host(&avatars)?;
    if let Some(public_id) = owned_public_id(&account.avatar_url, account.id) {
        host.delete(&public_id).await?;
    }
    store
        .set_avatar_url(account.id, avatars.default_url())
        .await?;
    info!("avatar removed");

    Ok((
        StatusCode::OK,
        Json(AvatarResponse {
            message: "Avatar removed successfully".to_string(),
            avatar_url: avatars.default_url().to_string(),
        }),
    ))
}

//! Avatar image hosting.
//!
//! Avatars live on Cloudinary. Requests are signed with the API secret using
//! the signed-upload scheme: parameters sorted by name, joined as `k=v&k=v`,
//! the secret appended and the whole string hashed (SHA-256, which the
//! Cloudinary account must be configured to accept).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

pub const AVATAR_FOLDER: &str = "user_avatars";
pub const AVATAR_TRANSFORMATION: &str = "c_thumb,g_face,w_200,h_200,r_max";
pub const CLOUDINARY_URL_PREFIX: &str = "https://res.cloudinary.com/";
pub const DEFAULT_AVATAR_URL: &str =
    "https://res.cloudinary.com/dbynlpzwa/image/upload/t_default/v1747240081/default_n0gsmv.png";

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Upload (overwriting) the avatar for `account_id` and return its public URL.
    ///
    /// # Errors
    /// Transport or provider failures.
    async fn upload_avatar(
        &self,
        account_id: Uuid,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String>;

    /// # Errors
    /// Transport or provider failures.
    async fn delete(&self, public_id: &str) -> Result<()>;
}

/// Avatar settings handed to the handlers. `host` is `None` when no image
/// host is configured, in which case uploads and deletes are unavailable.
#[derive(Clone)]
pub struct AvatarStorage {
    host: Option<Arc<dyn ImageHost>>,
    default_url: String,
}

impl AvatarStorage {
    #[must_use]
    pub fn new(host: Option<Arc<dyn ImageHost>>, default_url: String) -> Self {
        Self { host, default_url }
    }

    #[must_use]
    pub fn host(&self) -> Option<&Arc<dyn ImageHost>> {
        self.host.as_ref()
    }

    #[must_use]
    pub fn default_url(&self) -> &str {
        &self.default_url
    }

    #[must_use]
    pub fn is_default(&self, url: &str) -> bool {
        url.is_empty() || url == self.default_url
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

pub struct CloudinaryImageHost {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: SecretString,
    api_base: String,
}

impl CloudinaryImageHost {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        cloud_name: String,
        api_key: String,
        api_secret: SecretString,
    ) -> Self {
        Self {
            client,
            cloud_name,
            api_key,
            api_secret,
            api_base: "https://api.cloudinary.com/v1_1".to_string(),
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{action}", self.api_base, self.cloud_name)
    }

    fn sign(&self, params: &[(&str, String)]) -> String {
        signature(params, self.api_secret.expose_secret())
    }
}

/// Cloudinary request signature over the given (unsigned-excluded) params.
pub(crate) fn signature(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ImageHost for CloudinaryImageHost {
    async fn upload_avatar(
        &self,
        account_id: Uuid,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let params = vec![
            ("folder", AVATAR_FOLDER.to_string()),
            ("overwrite", "true".to_string()),
            ("public_id", format!("user_{account_id}")),
            ("timestamp", Utc::now().timestamp().to_string()),
            ("transformation", AVATAR_TRANSFORMATION.to_string()),
        ];
        let signature = self.sign(&params);

        let file = Part::bytes(bytes)
            .file_name("avatar")
            .mime_str(content_type)
            .context("invalid avatar content type")?;
        let mut form = Form::new()
            .part("file", file)
            .text("api_key", self.api_key.clone())
            .text("signature", signature);
        for (key, value) in params {
            form = form.text(key, value);
        }

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .context("failed to reach Cloudinary")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Cloudinary upload failed (status={status}): {body}"));
        }
        let body: UploadResponse = response
            .json()
            .await
            .context("failed to decode Cloudinary upload response")?;
        Ok(body.secure_url)
    }

    async fn delete(&self, public_id: &str) -> Result<()> {
        let params = vec![
            ("public_id", public_id.to_string()),
            ("timestamp", Utc::now().timestamp().to_string()),
        ];
        let signature = self.sign(&params);
        let mut form: Vec<(&str, String)> = params;
        form.push(("api_key", self.api_key.clone()));
        form.push(("signature", signature));

        let body: DestroyResponse = self
            .client
            .post(self.endpoint("destroy"))
            .form(&form)
            .send()
            .await
            .context("failed to reach Cloudinary")?
            .error_for_status()
            .context("Cloudinary destroy returned an error status")?
            .json()
            .await
            .context("failed to decode Cloudinary destroy response")?;
        match body.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(anyhow!("Cloudinary destroy failed: {other}")),
        }
    }
}

/// Public id under which the avatar of `account_id` is stored.
#[must_use]
pub fn avatar_public_id(account_id: Uuid) -> String {
    format!("{AVATAR_FOLDER}/user_{account_id}")
}

/// Public id behind `url` when it is the avatar uploaded for `account_id`.
/// Any other asset, the shared default included, is `None`.
#[must_use]
pub fn owned_public_id(url: &str, account_id: Uuid) -> Option<String> {
    extract_public_id(url).filter(|public_id| *public_id == avatar_public_id(account_id))
}

/// Derive the Cloudinary public id from a delivery URL.
///
/// `https://res.cloudinary.com/<cloud>/image/upload/<transformations>/v<version>/<folder>/<id>.<ext>`
/// yields `<folder>/<id>`. Returns `None` for URLs that are not Cloudinary uploads.
#[must_use]
pub fn extract_public_id(url: &str) -> Option<String> {
    let path = url.strip_prefix(CLOUDINARY_URL_PREFIX)?;
    let (_, after_upload) = path.split_once("/upload/")?;
    let segments: Vec<&str> = after_upload.split('/').collect();
    let start = segments
        .iter()
        .position(|segment| is_version(segment))
        .map_or_else(
            || {
                segments
                    .iter()
                    .position(|segment| !is_transformation(segment))
                    .unwrap_or(segments.len())
            },
            |version| version + 1,
        );
    let rest = segments.get(start..)?;
    if rest.is_empty() {
        return None;
    }
    let joined = rest.join("/");
    let without_ext = match joined.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => joined,
    };
    if without_ext.is_empty() {
        None
    } else {
        Some(without_ext)
    }
}

fn is_version(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

fn is_transformation(segment: &str) -> bool {
    segment.contains(',')
        || segment
            .split_once('_')
            .is_some_and(|(prefix, _)| prefix.len() <= 2 && !prefix.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_public_id_handles_folder_and_version() {
        assert_eq!(
            extract_public_id(
                "https://res.cloudinary.com/demo/image/upload/v1700000000/user_avatars/user_42.jpg"
            )
            .as_deref(),
            Some("user_avatars/user_42")
        );
    }

    #[test]
    fn extract_public_id_skips_transformations() {
        assert_eq!(
            extract_public_id(
                "https://res.cloudinary.com/demo/image/upload/c_thumb,g_face,w_200,h_200,r_max/user_avatars/user_42.png"
            )
            .as_deref(),
            Some("user_avatars/user_42")
        );
        assert_eq!(
            extract_public_id(DEFAULT_AVATAR_URL).as_deref(),
            Some("default_n0gsmv")
        );
    }

    #[test]
    fn extract_public_id_rejects_foreign_urls() {
        assert_eq!(extract_public_id("https://example.com/a.png"), None);
        assert_eq!(extract_public_id(""), None);
        assert_eq!(
            extract_public_id("https://res.cloudinary.com/demo/image/upload/"),
            None
        );
    }

    #[test]
    fn only_the_accounts_own_avatar_is_owned() {
        let account_id = Uuid::new_v4();
        let own = format!(
            "https://res.cloudinary.com/demo/image/upload/v3/user_avatars/user_{account_id}.png"
        );
        assert_eq!(
            owned_public_id(&own, account_id),
            Some(avatar_public_id(account_id))
        );
        assert_eq!(owned_public_id(&own, Uuid::new_v4()), None);
        assert_eq!(
            owned_public_id(&format!("{DEFAULT_AVATAR_URL}?x"), account_id),
            None
        );
        assert_eq!(
            owned_public_id(
                "https://res.cloudinary.com/demo/image/upload/v2/user_avatars/custom.png",
                account_id
            ),
            None
        );
    }

    #[test]
    fn signature_sorts_params_and_appends_secret() {
        let params = vec![
            ("timestamp", "1315060510".to_string()),
            ("public_id", "sample_image".to_string()),
        ];
        let mut hasher = Sha256::new();
        hasher.update(b"public_id=sample_image&timestamp=1315060510abcd");
        assert_eq!(signature(&params, "abcd"), hex::encode(hasher.finalize()));
    }

    #[test]
    fn default_avatar_detection() {
        let storage = AvatarStorage::new(None, DEFAULT_AVATAR_URL.to_string());
        assert!(storage.is_default(""));
        assert!(storage.is_default(DEFAULT_AVATAR_URL));
        assert!(!storage.is_default("https://res.cloudinary.com/demo/image/upload/x.png"));
        assert!(storage.host().is_none());
    }
}

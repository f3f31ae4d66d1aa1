//! Cloudinary signed image uploads.

use std::collections::BTreeMap;

use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::instrument;

use crate::config::CloudinaryConfig;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Folder uploaded pet photos go to.
const UPLOAD_FOLDER: &str = "pawdia/uploads";

/// Errors from image upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Cloudinary rejected the upload.
    #[error("Cloudinary API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The file is not a supported image.
    #[error("unsupported file type; upload a JPEG, PNG or WebP image")]
    UnsupportedType,

    /// The file is larger than [`MAX_UPLOAD_BYTES`].
    #[error("file is too large (max {} MB)", MAX_UPLOAD_BYTES / 1024 / 1024)]
    TooLarge,

    /// The upload was empty.
    #[error("file is empty")]
    Empty,
}

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
}

impl ImageKind {
    /// Detect the format from the file's magic bytes.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(Self::Png),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            _ => None,
        }
    }

    /// MIME type.
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

/// Validate an upload and return its format.
///
/// # Errors
///
/// Returns `UploadError::Empty`, `UploadError::TooLarge` or
/// `UploadError::UnsupportedType`.
pub fn validate_image(bytes: &[u8]) -> Result<ImageKind, UploadError> {
    if bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(UploadError::TooLarge);
    }
    ImageKind::sniff(bytes).ok_or(UploadError::UnsupportedType)
}

/// A stored image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub url: String,
    pub public_id: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

/// Cloudinary upload client.
#[derive(Clone)]
pub struct CloudinaryClient {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &CloudinaryConfig) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Upload an image with a signed request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input or `UploadError::Api` if
    /// Cloudinary rejects the upload.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload(&self, bytes: Vec<u8>) -> Result<UploadedImage, UploadError> {
        let kind = validate_image(&bytes)?;
        let timestamp = chrono::Utc::now().timestamp().to_string();

        let mut params = BTreeMap::new();
        params.insert("folder", UPLOAD_FOLDER);
        params.insert("timestamp", timestamp.as_str());
        let signature = sign(&params, self.config.api_secret.expose_secret());

        let file = Part::bytes(bytes)
            .file_name(format!("upload.{}", kind.extension()))
            .mime_str(kind.mime())?;

        let form = Form::new()
            .part("file", file)
            .text("api_key", self.config.api_key.clone())
            .text("folder", UPLOAD_FOLDER)
            .text("timestamp", timestamp.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.config.cloud_name
        );
        let response = self.client.post(url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UploadError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: UploadResponse = response.json().await?;
        tracing::info!(public_id = %body.public_id, "Image uploaded");

        Ok(UploadedImage {
            url: body.secure_url,
            public_id: body.public_id,
            width: body.width,
            height: body.height,
        })
    }
}

/// Cloudinary request signature: SHA-256 over `k=v&k=v` (sorted by key)
/// followed by the API secret.
fn sign(params: &BTreeMap<&str, &str>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    hex::encode(Sha256::digest(format!("{to_sign}{api_secret}").as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_formats() {
        assert_eq!(ImageKind::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageKind::Jpeg));
        assert_eq!(
            ImageKind::sniff(b"\x89PNG\r\n\x1a\n\0\0"),
            Some(ImageKind::Png)
        );
        assert_eq!(ImageKind::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageKind::Webp));
        assert_eq!(ImageKind::sniff(b"GIF89a"), None);
        assert_eq!(ImageKind::sniff(b"%PDF-1.7"), None);
    }

    #[test]
    fn test_validate_image_limits() {
        assert!(matches!(validate_image(&[]), Err(UploadError::Empty)));
        assert!(matches!(
            validate_image(b"hello"),
            Err(UploadError::UnsupportedType)
        ));

        let mut big = vec![0xFF, 0xD8, 0xFF];
        big.resize(MAX_UPLOAD_BYTES + 1, 0);
        assert!(matches!(validate_image(&big), Err(UploadError::TooLarge)));
    }

    #[test]
    fn test_sign_sorts_params_and_appends_secret() {
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1315060510");
        params.insert("eager", "w_400,h_300,c_pad|w_260,h_200,c_crop");
        params.insert("public_id", "sample_image");

        let expected = hex::encode(Sha256::digest(
            b"eager=w_400,h_300,c_pad|w_260,h_200,c_crop&public_id=sample_image&timestamp=1315060510abcd",
        ));
        assert_eq!(sign(&params, "abcd"), expected);
    }
}

//! AI portrait generation through a Gemini-compatible `generateContent` API.
//!
//! The source photo is fetched from its (Cloudinary) URL and sent inline with
//! a style prompt. Generated images come back as base64 `inlineData` parts and
//! are returned to the caller as `data:` URLs.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::config::AiConfig;
use crate::services::cloudinary::{MAX_UPLOAD_BYTES, validate_image};

/// Longest accepted user prompt addition.
pub const MAX_PROMPT_LENGTH: usize = 500;

/// Host that serves uploaded source photos.
pub const SOURCE_HOST: &str = "res.cloudinary.com";

/// Errors from the generation API.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The generation API returned an error.
    #[error("generation API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The source image could not be used.
    #[error("invalid source image: {0}")]
    InvalidSource(String),

    /// The model answered without any image.
    #[error("no image was generated")]
    NoImages,
}

/// Portrait styles offered to customers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortraitStyle {
    Renaissance,
    Watercolor,
    OilPainting,
    PopArt,
    Cartoon,
    Royal,
}

impl PortraitStyle {
    /// All styles, in display order.
    pub const ALL: [Self; 6] = [
        Self::Renaissance,
        Self::Watercolor,
        Self::OilPainting,
        Self::PopArt,
        Self::Cartoon,
        Self::Royal,
    ];

    const fn slug(self) -> &'static str {
        match self {
            Self::Renaissance => "renaissance",
            Self::Watercolor => "watercolor",
            Self::OilPainting => "oil-painting",
            Self::PopArt => "pop-art",
            Self::Cartoon => "cartoon",
            Self::Royal => "royal",
        }
    }

    const fn base_prompt(self) -> &'static str {
        match self {
            Self::Renaissance => {
                "Transform this pet photo into a Renaissance-era oil portrait with dramatic \
                 chiaroscuro lighting, a dark background and period clothing."
            }
            Self::Watercolor => {
                "Transform this pet photo into a soft watercolor painting with loose brush \
                 strokes, gentle color bleeds and a white paper background."
            }
            Self::OilPainting => {
                "Transform this pet photo into a classic oil painting with rich texture, \
                 visible brush strokes and warm tones."
            }
            Self::PopArt => {
                "Transform this pet photo into bold pop art with flat saturated colors, thick \
                 outlines and a halftone background."
            }
            Self::Cartoon => {
                "Transform this pet photo into a friendly cartoon illustration with clean \
                 lines, bright colors and expressive eyes."
            }
            Self::Royal => {
                "Transform this pet photo into a regal portrait of royalty wearing a crown, \
                 an ermine cape and jewels, seated on a throne."
            }
        }
    }

    /// Full prompt for this style with an optional customer addition.
    #[must_use]
    pub fn prompt(self, extra: Option<&str>) -> String {
        let base = format!(
            "{} Keep the animal's breed, markings and likeness recognizable.",
            self.base_prompt()
        );
        match extra.map(str::trim).filter(|s| !s.is_empty()) {
            Some(extra) => format!("{base} Additional instructions: {extra}"),
            None => base,
        }
    }
}

impl fmt::Display for PortraitStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Error parsing an unknown style.
#[derive(Debug, Error)]
#[error("unknown style: {0}")]
pub struct UnknownStyle(String);

impl FromStr for PortraitStyle {
    type Err = UnknownStyle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        Self::ALL
            .into_iter()
            .find(|style| style.slug() == normalized)
            .ok_or_else(|| UnknownStyle(s.to_owned()))
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 2],
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: [&'static str; 2],
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(alias = "inline_data")]
    inline_data: Option<InlineData>,
}

impl GenerateResponse {
    fn into_data_urls(self) -> Vec<String> {
        self.candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.inline_data)
            .filter(|d| d.mime_type.starts_with("image/"))
            .map(|d| format!("data:{};base64,{}", d.mime_type, d.data))
            .collect()
    }
}

// =============================================================================
// Client
// =============================================================================

/// Client for the image generation API.
#[derive(Clone)]
pub struct GenerationClient {
    client: reqwest::Client,
    config: AiConfig,
    cloud_name: Option<String>,
}

impl GenerationClient {
    /// Create a new client.
    ///
    /// Source photos are only fetched from [`SOURCE_HOST`], and from the
    /// `cloud_name` account there when one is given.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &AiConfig, cloud_name: Option<&str>) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            cloud_name: cloud_name.map(str::to_owned),
        })
    }

    /// Generate portraits of the pet at `image_url` in `style`.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::InvalidSource` if the photo can't be fetched
    /// or isn't a supported image, `GenerationError::Api` on upstream errors
    /// and `GenerationError::NoImages` if nothing was produced.
    #[instrument(skip(self, extra_prompt), fields(model = %self.config.model))]
    pub async fn generate(
        &self,
        image_url: &str,
        style: PortraitStyle,
        extra_prompt: Option<&str>,
    ) -> Result<Vec<String>, GenerationError> {
        let (mime_type, data) = self.fetch_source(image_url).await?;
        let prompt = style.prompt(extra_prompt);

        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [
                    RequestPart::Text { text: &prompt },
                    RequestPart::Image {
                        inline_data: InlineData { mime_type, data },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: ["TEXT", "IMAGE"],
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Generation API returned an error");
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let images = response.json::<GenerateResponse>().await?.into_data_urls();
        if images.is_empty() {
            return Err(GenerationError::NoImages);
        }

        tracing::info!(%style, count = images.len(), "Portraits generated");
        Ok(images)
    }

    /// Check that `image_url` points at a photo this client will fetch.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::InvalidSource` for any other URL.
    pub fn check_source(&self, image_url: &str) -> Result<(), GenerationError> {
        source_url(image_url, self.cloud_name.as_deref()).map(drop)
    }

    /// Download the source photo and base64-encode it.
    async fn fetch_source(&self, image_url: &str) -> Result<(String, String), GenerationError> {
        let url = source_url(image_url, self.cloud_name.as_deref())?;

        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(GenerationError::InvalidSource(format!(
                "image download failed with status {}",
                response.status().as_u16()
            )));
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_UPLOAD_BYTES as u64)
        {
            return Err(too_large());
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        let kind = validate_image(&bytes).map_err(|e| GenerationError::InvalidSource(e.to_string()))?;

        Ok((kind.mime().to_owned(), BASE64.encode(&bytes)))
    }
}

fn too_large() -> GenerationError {
    GenerationError::InvalidSource("image is too large".to_owned())
}

/// Parse `image_url` and check that it points at an uploaded photo.
fn source_url(image_url: &str, cloud_name: Option<&str>) -> Result<url::Url, GenerationError> {
    let url = url::Url::parse(image_url)
        .map_err(|_| GenerationError::InvalidSource("imageUrl is not a valid URL".to_owned()))?;
    if url.scheme() != "https" {
        return Err(GenerationError::InvalidSource(
            "imageUrl must use https".to_owned(),
        ));
    }

    let host_ok = url.host_str() == Some(SOURCE_HOST) && url.port().is_none();
    let account_ok = cloud_name.is_none_or(|name| {
        url.path_segments()
            .and_then(|mut segments| segments.next())
            .is_some_and(|first| first == name)
    });
    if !host_ok || !account_ok || !url.username().is_empty() {
        return Err(GenerationError::InvalidSource(
            "imageUrl must be an uploaded image".to_owned(),
        ));
    }

    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_style_parsing() {
        assert_eq!("watercolor".parse::<PortraitStyle>().unwrap(), PortraitStyle::Watercolor);
        assert_eq!("Oil Painting".parse::<PortraitStyle>().unwrap(), PortraitStyle::OilPainting);
        assert_eq!("pop_art".parse::<PortraitStyle>().unwrap(), PortraitStyle::PopArt);
        assert!("cubism".parse::<PortraitStyle>().is_err());
    }

    #[test]
    fn test_style_display_round_trips() {
        for style in PortraitStyle::ALL {
            assert_eq!(style.to_string().parse::<PortraitStyle>().unwrap(), style);
        }
    }

    #[test]
    fn test_prompt_appends_extra_instructions() {
        let plain = PortraitStyle::Royal.prompt(None);
        assert!(plain.contains("crown"));
        assert!(!plain.contains("Additional instructions"));

        let blank = PortraitStyle::Royal.prompt(Some("   "));
        assert_eq!(blank, plain);

        let extra = PortraitStyle::Royal.prompt(Some("make the cape purple"));
        assert!(extra.ends_with("Additional instructions: make the cape purple"));
    }

    #[test]
    fn test_source_url_accepts_uploads() {
        let url = source_url(
            "https://res.cloudinary.com/pawdia/image/upload/v1/pawdia/uploads/rex.jpg",
            Some("pawdia"),
        )
        .unwrap();
        assert_eq!(url.host_str(), Some(SOURCE_HOST));
        assert!(source_url("https://res.cloudinary.com/demo/rex.jpg", None).is_ok());
    }

    #[test]
    fn test_source_url_rejects_other_hosts() {
        for bad in [
            "http://res.cloudinary.com/pawdia/rex.jpg",
            "https://169.254.169.254/latest/meta-data/",
            "https://localhost/rex.jpg",
            "https://res.cloudinary.com.evil.example/pawdia/rex.jpg",
            "https://res.cloudinary.com:8443/pawdia/rex.jpg",
            "https://user@res.cloudinary.com/pawdia/rex.jpg",
            "https://res.cloudinary.com/someone-else/rex.jpg",
            "not a url",
        ] {
            assert!(
                matches!(
                    source_url(bad, Some("pawdia")),
                    Err(GenerationError::InvalidSource(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_response_extracts_image_parts() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "Here is your portrait"},
                        {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}
                    ]
                }
            }]
        }"#;
        let response: GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            response.into_data_urls(),
            vec!["data:image/png;base64,iVBORw0KGgo=".to_owned()]
        );
    }

    #[test]
    fn test_response_without_candidates_is_empty() {
        let response: GenerateResponse = serde_json::from_str(r#"{"promptFeedback": {}}"#).unwrap();
        assert!(response.into_data_urls().is_empty());
    }

    #[test]
    fn test_request_serializes_inline_data() {
        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [
                    RequestPart::Text { text: "hi" },
                    RequestPart::Image {
                        inline_data: InlineData {
                            mime_type: "image/jpeg".to_owned(),
                            data: "AAAA".to_owned(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: ["TEXT", "IMAGE"],
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(
            json["contents"][0]["parts"][1]["inline_data"]["mimeType"],
            "image/jpeg"
        );
        assert_eq!(json["generationConfig"]["responseModalities"][1], "IMAGE");
    }
}

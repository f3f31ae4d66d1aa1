//! JSON request and response wrappers shared by the API handlers.

use axum::{
    Json,
    extract::FromRequest,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::AppError;

/// JSON body extractor whose rejections use the API error shape.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Successful response: `{"success": true, ...body}`.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

/// Wrap `body` as a 200 success response.
pub const fn ok<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        body,
    })
}

/// Wrap `body` as a 201 success response.
pub const fn created<T: Serialize>(body: T) -> (StatusCode, Json<Success<T>>) {
    (StatusCode::CREATED, ok(body))
}

/// Body carrying only a human-readable message.
#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

/// `{"success": true, "message": "..."}`.
pub fn message(text: impl Into<String>) -> Response {
    ok(Message {
        message: text.into(),
    })
    .into_response()
}

/// Paging query parameters.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

const fn first_page() -> u32 {
    1
}

const fn default_per_page() -> u32 {
    20
}

/// Paging metadata returned with list responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    /// Metadata for `total` rows viewed through `query`.
    #[must_use]
    pub fn new(query: PageQuery, total: i64) -> Self {
        let per_page = query.per_page.clamp(1, 100);
        let per_page_i64 = i64::from(per_page);
        Self {
            page: query.page.max(1),
            per_page,
            total,
            total_pages: (total + per_page_i64 - 1) / per_page_i64,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_success_flattens_body() {
        #[derive(Serialize)]
        struct Body {
            credits: i32,
        }
        let json = serde_json::to_value(ok(Body { credits: 4 }).0).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "credits": 4}));
    }

    #[test]
    fn test_pagination() {
        let query = PageQuery {
            page: 0,
            per_page: 500,
        };
        let p = Pagination::new(query, 250);
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, 100);
        assert_eq!(p.total_pages, 3);

        let p = Pagination::new(PageQuery { page: 2, per_page: 20 }, 0);
        assert_eq!(p.total_pages, 0);
    }
}

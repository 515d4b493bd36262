//! Cross-origin middleware driven by a named configuration profile
//!
//! The policy is data, not code: `development` allows every origin, while
//! `restricted` echoes only the configured origins. Every `OPTIONS` request
//! is answered with `204 No Content` before it reaches a route.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::config::CorsConfig;

/// Named CORS profiles
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorsProfile {
    /// Allow all origins
    #[default]
    Development,
    /// Allow only `cors.allowed_origins`
    Restricted,
}

/// Resolved CORS policy shared by the middleware
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    profile: CorsProfile,
    allowed_origins: Vec<String>,
    allowed_methods: HeaderValue,
    allowed_headers: HeaderValue,
}

impl CorsPolicy {
    pub fn from_config(config: &CorsConfig) -> Self {
        Self {
            profile: config.profile,
            allowed_origins: config.allowed_origins.clone(),
            allowed_methods: HeaderValue::from_str(&config.allowed_methods)
                .unwrap_or_else(|_| HeaderValue::from_static("POST, GET, OPTIONS")),
            allowed_headers: HeaderValue::from_str(&config.allowed_headers)
                .unwrap_or_else(|_| HeaderValue::from_static("Content-Type")),
        }
    }

    /// The `Access-Control-Allow-Origin` value for a request origin, if any
    fn allow_origin(&self, origin: Option<&HeaderValue>) -> Option<HeaderValue> {
        match self.profile {
            CorsProfile::Development => Some(HeaderValue::from_static("*")),
            CorsProfile::Restricted => {
                let origin = origin?;
                let origin_str = origin.to_str().ok()?;
                self.allowed_origins
                    .iter()
                    .any(|allowed| allowed == origin_str)
                    .then(|| origin.clone())
            }
        }
    }

    fn apply(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        if self.profile == CorsProfile::Restricted {
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
        }

        let Some(allow_origin) = self.allow_origin(origin) else {
            return;
        };

        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            self.allowed_headers.clone(),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            self.allowed_methods.clone(),
        );
    }
}

/// Apply the CORS policy and short-circuit preflight requests
pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let origin = req.headers().get(header::ORIGIN).cloned();

    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    policy.apply(origin.as_ref(), response.headers_mut());
    response
}

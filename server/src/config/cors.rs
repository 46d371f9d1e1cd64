use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

const PREFLIGHT_MAX_AGE_SECS: u64 = 86400;

pub fn create_cors_layer(configured: Option<&str>) -> CorsLayer {
    let allowed_origins = allowed_origins(configured.unwrap_or(DEFAULT_ALLOWED_ORIGINS));

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers([
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(PREFLIGHT_MAX_AGE_SECS))
}

fn parse_origins(list: &str) -> Vec<HeaderValue> {
    list.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin, error = %e, "CORS: ignoring invalid origin");
                None
            }
        })
        .collect()
}

// `allow_credentials` forbids a wildcard origin, so an empty list falls back to the dev defaults.
fn allowed_origins(list: &str) -> AllowOrigin {
    let mut origins = parse_origins(list);
    if origins.is_empty() {
        tracing::warn!("CORS: no valid origins configured, using development defaults");
        origins = parse_origins(DEFAULT_ALLOWED_ORIGINS);
    }
    tracing::info!(count = origins.len(), "CORS: allowed origins configured");
    AllowOrigin::list(origins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_configured_and_default_origins() {
        let _ = create_cors_layer(Some("https://tiket.example.com"));
        let _ = create_cors_layer(None);
    }

    #[test]
    fn invalid_and_blank_origins_are_skipped() {
        let origins = parse_origins("https://a.example.com, ,bad\norigin,https://b.example.com");
        assert_eq!(origins.len(), 2);
    }

    #[test]
    fn default_origins_parse() {
        assert_eq!(parse_origins(DEFAULT_ALLOWED_ORIGINS).len(), 2);
    }
}

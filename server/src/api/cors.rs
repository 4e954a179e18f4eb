use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use tower_http::cors;

/// Builds the CORS layer for the configured viewer origin.
///
/// The layer answers preflights for GET/POST/OPTIONS with `Content-Type`
/// allowed and credentials disabled. Exactly one origin is configured;
/// its loopback alias is accepted too, so a viewer reached via
/// `127.0.0.1` instead of `localhost` works without configuration churn.
pub fn layer(origin: &str) -> cors::CorsLayer {
    let allow = AllowedOrigins::for_origin(origin);

    cors::CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .allow_origin(cors::AllowOrigin::predicate(
            move |origin: &HeaderValue, _: &axum::http::request::Parts| {
                let Ok(origin) = origin.to_str() else {
                    return false;
                };
                allow.allows(origin)
            },
        ))
}

/// The configured origin and, when it names a loopback host, the same
/// origin under the other loopback spelling.
struct AllowedOrigins(Vec<String>);

impl AllowedOrigins {
    fn for_origin(origin: &str) -> Self {
        let mut origins = vec![origin.to_string()];
        for (from, to) in [("//localhost", "//127.0.0.1"), ("//127.0.0.1", "//localhost")] {
            let alias = origin.replace(from, to);
            if alias != origin {
                origins.push(alias);
            }
        }
        Self(origins)
    }

    fn allows(&self, origin: &str) -> bool {
        self.0.iter().any(|allowed| allowed.eq_ignore_ascii_case(origin))
    }
}

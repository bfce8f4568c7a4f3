//! CORS policy for the HTTP transport: deny cross-origin by default.
//! Requests without an `Origin` header pass; an `Origin` not on the
//! allow-list is rejected. Wildcards are honoured only when explicitly
//! listed, never implied by an empty list.

use tower_http::cors::{AllowOrigin, CorsLayer};

#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    #[must_use]
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Self { allowed_origins }
    }

    #[must_use]
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| allowed == "*" || allowed == origin)
    }

    /// Build the `tower_http` layer matching this policy. With `*`
    /// explicitly present, every origin is mirrored back; otherwise only
    /// origins on the list are.
    #[must_use]
    pub fn to_layer(&self) -> CorsLayer {
        if self.allowed_origins.iter().any(|o| o == "*") {
            return CorsLayer::new().allow_origin(AllowOrigin::any());
        }
        let origins: Vec<_> =
            self.allowed_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    }
}

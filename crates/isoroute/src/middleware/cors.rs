// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use futures_util::FutureExt;
use std::sync::Arc;

use crate::chain::{handler, BoxHandler, Flow};

/// Settings for the [`cors`] middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsOptions {
    /// Allowed origins, joined with `, `.
    pub origin: Vec<String>,
    /// Allowed methods.
    pub methods: Vec<String>,
    /// Allowed request headers.
    pub allowed_headers: Vec<String>,
    /// Headers exposed to the browser.
    pub exposed_headers: Vec<String>,
    /// Preflight cache lifetime in seconds.
    pub max_age: u32,
    /// Whether credentials are allowed.
    pub credentials: bool,
}

impl Default for CorsOptions {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            origin: list(&["*"]),
            methods: list(&["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"]),
            allowed_headers: list(&["Content-Type", "Authorization", "X-Requested-With"]),
            exposed_headers: Vec::new(),
            max_age: 600,
            credentials: true,
        }
    }
}

impl CorsOptions {
    fn headers(&self) -> [(&'static str, String); 6] {
        [
            ("access-control-allow-origin", self.origin.join(", ")),
            ("access-control-allow-methods", self.methods.join(", ")),
            ("access-control-allow-headers", self.allowed_headers.join(", ")),
            ("access-control-expose-headers", self.exposed_headers.join(", ")),
            ("access-control-max-age", self.max_age.to_string()),
            ("access-control-allow-credentials", self.credentials.to_string()),
        ]
    }
}

/// Adds the `Access-Control-*` headers to every response.
pub fn cors(options: CorsOptions) -> BoxHandler {
    let options = Arc::new(options);
    handler(move |_req, res| {
        let options = options.clone();
        async move {
            for (name, value) in options.headers() {
                res.header(name, &value)?;
            }
            Ok(Flow::Next)
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::request::Request;
    use crate::response::ResponseBuilder;
    use http::Method;

    #[tokio::test]
    async fn test_cors_defaults() {
        let chain = Chain::new().with(cors(CorsOptions::default()));
        let mut req = Request::new(Method::GET, "/");
        let mut res = ResponseBuilder::new();

        let response = chain.run(&mut req, &mut res).await.unwrap();
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
        assert_eq!(
            response.header("access-control-allow-methods"),
            Some("GET, HEAD, PUT, PATCH, POST, DELETE")
        );
        assert_eq!(response.header("access-control-max-age"), Some("600"));
        assert_eq!(response.header("access-control-allow-credentials"), Some("true"));
    }

    #[tokio::test]
    async fn test_cors_custom_origins() {
        let options = CorsOptions {
            origin: vec!["https://a.example".into(), "https://b.example".into()],
            credentials: false,
            ..CorsOptions::default()
        };
        let chain = Chain::new().with(cors(options));
        let mut req = Request::new(Method::GET, "/");
        let mut res = ResponseBuilder::new();

        let response = chain.run(&mut req, &mut res).await.unwrap();
        assert_eq!(
            response.header("access-control-allow-origin"),
            Some("https://a.example, https://b.example")
        );
        assert_eq!(response.header("access-control-allow-credentials"), Some("false"));
    }
}

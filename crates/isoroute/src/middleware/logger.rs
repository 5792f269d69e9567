// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use futures_util::FutureExt;

use crate::chain::{handler, BoxHandler, Flow};

/// Logs `METHOD path` for every request and passes it on.
pub fn logger() -> BoxHandler {
    handler(|req, _res| {
        async move {
            tracing::info!("> {} {}", req.method, req.path);
            Ok(Flow::Next)
        }
        .boxed()
    })
}

// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Client router.
//!
//! A platform-agnostic state machine driving soft navigation in the browser
//! host. It matches the current location against the serialized
//! [`Manifest`](crate::router::Manifest), seeds static payloads, asks the host
//! to fetch server-rendered levels through the data protocol and renders the
//! page nested in its layouts through a [`Renderer`].
//!
//! ```rust,ignore
//! let mut router = ClientRouter::new(manifest, MemoryHistory::new("/users/1"))?;
//! router.sync();
//! router.hydrate(&fetcher).await;
//! let node = router.render(&renderer);
//! router.apply_scroll(&mut viewport);
//! ```

pub mod history;
mod router;

pub use history::{History, Location, MemoryHistory};
pub use router::{
    ClientRouter, DataFetcher, DataRequest, Level, MatchState, Props, Renderer, ScrollEffect,
    Viewport, DEFAULT_SCROLL_OFFSET,
};

// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Ready-made middleware for [`App::middleware`](crate::App::middleware).

pub mod auth;
mod cors;
mod logger;

pub use auth::{Auth, Strategy};
pub use cors::{cors, CorsOptions};
pub use logger::logger;

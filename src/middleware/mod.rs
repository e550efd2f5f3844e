// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (authentication, security, etc.).

pub mod security;
pub mod tasks_auth;

pub use tasks_auth::require_internal_token;

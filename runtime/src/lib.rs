// Copyright 2026 Prospector Contributors
// SPDX-License-Identifier: Apache-2.0

//! Prospector runtime library: a session-driven contact harvester.
//!
//! This library crate exposes the core modules for integration testing.

#![allow(
    dead_code,
    unused_imports,
    clippy::new_without_default,
    clippy::should_implement_trait
)]

pub mod audit;
pub mod auth;
pub mod browser;
pub mod capture;
pub mod cli;
pub mod config;
pub mod events;
pub mod harvest;
pub mod poll;
pub mod store;

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the gateway CLI

pub mod config;
pub mod demo;

pub use self::config::ConfigCommand;
pub use self::demo::DemoCommand;

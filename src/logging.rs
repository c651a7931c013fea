// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Opinionated [`logforth`] setup for simulation binaries and tests.
//!
//! The library itself only emits [`log`] records and never installs a logger.
//! Binaries call [`enable_logforth`] once at startup; tests that want output
//! use [`try_enable_logforth`], which tolerates repeated initialization.

use logforth::color::LevelColor;
use logforth::filter::EnvFilter;
use logforth::{Layout, append};

/// Single-line layout: level, originating module, message.
///
/// Simulated time carries the actual meaning in this crate, so there is no
/// point in printing wall-clock timestamps.
#[derive(Clone, Copy, Debug)]
struct SimLogforthLayout;

impl Layout for SimLogforthLayout {
    fn format(
        &self,
        record: &log::Record,
        _: &[Box<dyn logforth::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let colors = LevelColor::default();
        let level = colors.colorize_record_level(false, record.level());
        let target = record.target();
        let message = record.args();
        Ok(format!("{level:>5} {target} {message}").into_bytes())
    }
}

/// Enables logforth with the minimal simulation layout.
///
/// The level filter defaults to `foehn=debug,info` and can be overridden
/// through the `RUST_LOG` environment variable.
pub fn enable_logforth() {
    let filter = EnvFilter::from_default_env_or("foehn=debug,info");
    logforth::builder()
        .dispatch(|d| {
            d.filter(filter)
                .append(append::Stderr::default().with_layout(SimLogforthLayout))
        })
        .apply();
}

/// Like [`enable_logforth`], but keeps logforth's default layout.
pub fn enable_logforth_stderr() {
    let filter = EnvFilter::from_default_env_or("foehn=debug,info");
    logforth::builder()
        .dispatch(|d| d.filter(filter).append(append::Stderr::default()))
        .apply();
}

/// Fallible variant for tests, where another test may have already installed
/// the global logger.
pub fn try_enable_logforth() {
    let filter = EnvFilter::from_default_env_or("foehn=debug,info");
    let _ = logforth::builder()
        .dispatch(|d| {
            d.filter(filter)
                .append(append::Stderr::default().with_layout(SimLogforthLayout))
        })
        .try_apply();
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! keep-notion-sync: Keep workouts into a Notion database
//!
//! This crate fetches activities from Keep, normalizes them, enriches them
//! with weather, and writes each one to Notion at most once.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;

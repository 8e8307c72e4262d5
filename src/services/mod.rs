// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - sync pipeline and external clients.

pub mod derive;
pub mod identity;
pub mod keep;
pub mod normalize;
pub mod retry;
pub mod sync;
pub mod track;
pub mod weather;

pub use identity::{IdentityResolver, Resolution};
pub use keep::{ActivitySource, Credentials, KeepClient, KeepService, Session};
pub use retry::RetryPolicy;
pub use sync::{
    aborted_line, cancel_pair, CancelHandle, CancelSignal, SyncEngine, SyncOptions, SyncSummary,
    WeatherPageOutcome,
};
pub use track::{AssetProbe, HttpAssetProbe};
pub use weather::{OpenWeatherClient, WeatherProvider, WeatherService, WEATHER_UNAVAILABLE};

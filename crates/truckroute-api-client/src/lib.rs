//! reqwest transport for the TruckRoute API.
#![cfg_attr(test, allow(clippy::expect_used, clippy::panic))]

mod auth;
mod client;
mod logs;
mod trips;

pub use client::{HttpTokenRefresher, TruckRouteClient};

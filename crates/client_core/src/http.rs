//! Read-only HTTP projections served next to the WebSocket endpoint.

use anyhow::{Context, Result};
use reqwest::Client;
use shared::{
    domain::{Booking, NewBooking},
    protocol::{BookingsResponse, HealthResponse, StatsResponse},
};

pub async fn fetch_bookings(http: &Client, server_url: &str) -> Result<BookingsResponse> {
    let server_url = server_url.trim_end_matches('/');
    http.get(format!("{server_url}/api/bookings"))
        .send()
        .await
        .with_context(|| format!("failed to reach {server_url}"))?
        .error_for_status()?
        .json()
        .await
        .context("invalid bookings response")
}

pub async fn fetch_stats(http: &Client, server_url: &str) -> Result<StatsResponse> {
    let server_url = server_url.trim_end_matches('/');
    http.get(format!("{server_url}/api/stats"))
        .send()
        .await
        .with_context(|| format!("failed to reach {server_url}"))?
        .error_for_status()?
        .json()
        .await
        .context("invalid stats response")
}

pub async fn fetch_health(http: &Client, server_url: &str) -> Result<HealthResponse> {
    let server_url = server_url.trim_end_matches('/');
    http.get(format!("{server_url}/api/health"))
        .send()
        .await
        .with_context(|| format!("failed to reach {server_url}"))?
        .error_for_status()?
        .json()
        .await
        .context("invalid health response")
}

pub async fn create_booking(http: &Client, server_url: &str, fields: &NewBooking) -> Result<Booking> {
    let server_url = server_url.trim_end_matches('/');
    http.post(format!("{server_url}/api/bookings"))
        .json(fields)
        .send()
        .await
        .with_context(|| format!("failed to reach {server_url}"))?
        .error_for_status()?
        .json()
        .await
        .context("invalid booking response")
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;

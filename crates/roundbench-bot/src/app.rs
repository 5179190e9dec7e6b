//! Application wiring.
//!
//! Builds the live venue from configuration and drives one round trip:
//! - Credential loading
//! - Signed REST client
//! - Push session settings
//! - Coordinator run and summary logging

use roundbench_rest::{ApiCredentials, SignedClient};
use tracing::info;

use crate::config::AppConfig;
use crate::coordinator::RoundTrip;
use crate::error::AppResult;
use crate::report::RunReport;
use crate::venue::{LiveVenue, Venue};

/// Main application.
pub struct Application {
    config: AppConfig,
    credentials: Option<ApiCredentials>,
}

impl Application {
    /// Create a new application. Rejects configurations that cannot run.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            credentials: None,
        })
    }

    /// Use these credentials instead of the configured sources.
    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Build the live venue. Fails before any network activity on bad
    /// credentials.
    pub fn venue(&self) -> AppResult<LiveVenue> {
        let credentials = match &self.credentials {
            Some(credentials) => credentials.clone(),
            None => ApiCredentials::load(
                &self.config.credentials.api_key,
                &self.config.credentials.api_secret,
            )?,
        };

        let client = SignedClient::with_timeout(
            &self.config.rest_url,
            credentials,
            self.config.request_timeout(),
        )?;
        Ok(LiveVenue::new(client, self.config.session_config()))
    }

    /// Run one round trip against the live venue.
    ///
    /// Errors are startup errors only. A run that starts always yields a
    /// report, failed or not.
    pub async fn run(&self) -> AppResult<RunReport> {
        let venue = self.venue()?;
        self.run_with(&venue).await
    }

    /// Run one round trip against `venue`.
    pub async fn run_with(&self, venue: &dyn Venue) -> AppResult<RunReport> {
        let place = self.config.place_action()?;
        info!(
            rest_url = %self.config.rest_url,
            ws_url = %self.config.ws_url,
            symbol = place.symbol(),
            client_order_id = %place.client_order_id(),
            "Configured round trip"
        );

        let round_trip = RoundTrip::new(venue, place, self.config.round_trip_config())?;
        let report = round_trip.run().await;

        for (phase, ns) in &report.intervals_ns {
            info!(phase = %phase, ns = %ns, "Phase latency");
        }
        Ok(report)
    }
}

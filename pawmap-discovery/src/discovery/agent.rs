//! Discovery agent
//!
//! Runs research prompts through a [`ResearchProvider`] and parses the
//! answers into candidates. A failed call never raises: the result carries
//! zero candidates and the error. City scans run categories one at a time
//! with a fixed delay between provider calls.

use pawmap_common::config::{DiscoveryConfig, ProviderConfig};
use rand::Rng;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::parser::parse_candidates;
use crate::discovery::prompt::{build_prompt, CityContext};
use crate::discovery::provider::{ProviderError, ProviderResponse, ResearchProvider};
use crate::models::CandidatePlace;

/// Bounded exponential backoff with jitter for transient provider errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based)
    ///
    /// Doubles per retry up to `max_backoff`, then picks uniformly from the
    /// upper half of that window.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let ceiling = self
            .initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff);

        let ceiling_ms = ceiling.as_millis() as u64;
        if ceiling_ms < 2 {
            return ceiling;
        }
        let jittered = rand::thread_rng().gen_range(ceiling_ms / 2..=ceiling_ms);
        Duration::from_millis(jittered)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ProviderConfig::default())
    }
}

/// One discovery call: a city and the categories to research
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryRequest {
    pub city: CityContext,
    pub categories: Vec<String>,
    pub max_results: u32,
    pub language: String,
}

/// Outcome of one discovery call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    pub city: String,
    pub categories: Vec<String>,
    pub candidates: Vec<CandidatePlace>,
    pub tokens_used: u64,
    pub duration_ms: u64,
    /// Provider attempts made, retries included
    pub attempts: u32,
    #[serde(serialize_with = "serialize_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderError>,
}

impl DiscoveryResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<ProviderError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Aggregate of a sequential city scan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CityScanReport {
    pub city: String,
    pub results: Vec<DiscoveryResult>,
    pub places_found: usize,
    pub tokens_used: u64,
    pub failed_categories: Vec<String>,
    pub duration_ms: u64,
    /// Stopped before every category ran
    pub cancelled: bool,
}

impl CityScanReport {
    fn new(city: &str) -> Self {
        Self {
            city: city.to_string(),
            results: Vec::new(),
            places_found: 0,
            tokens_used: 0,
            failed_categories: Vec::new(),
            duration_ms: 0,
            cancelled: false,
        }
    }

    fn record(&mut self, result: DiscoveryResult) {
        self.places_found += result.candidates.len();
        self.tokens_used += result.tokens_used;
        if !result.is_success() {
            self.failed_categories.extend(result.categories.iter().cloned());
        }
        self.results.push(result);
    }

    /// Every candidate found, in category order
    pub fn candidates(&self) -> impl Iterator<Item = &CandidatePlace> {
        self.results.iter().flat_map(|r| r.candidates.iter())
    }
}

/// Prompt → provider → parser
pub struct DiscoveryAgent {
    provider: Arc<dyn ResearchProvider>,
    retry: RetryPolicy,
    call_timeout: Duration,
    inter_request_delay: Duration,
}

impl DiscoveryAgent {
    pub fn new(provider: Arc<dyn ResearchProvider>) -> Self {
        Self::from_config(provider, &ProviderConfig::default(), &DiscoveryConfig::default())
    }

    pub fn from_config(
        provider: Arc<dyn ResearchProvider>,
        provider_config: &ProviderConfig,
        discovery_config: &DiscoveryConfig,
    ) -> Self {
        Self {
            provider,
            retry: RetryPolicy::from_config(provider_config),
            call_timeout: Duration::from_secs(provider_config.timeout_secs.max(1)),
            inter_request_delay: Duration::from_millis(discovery_config.inter_request_delay_ms),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_inter_request_delay(mut self, delay: Duration) -> Self {
        self.inter_request_delay = delay;
        self
    }

    /// Research one city/category set
    pub async fn discover(&self, request: &DiscoveryRequest) -> DiscoveryResult {
        let started = Instant::now();
        let prompt = build_prompt(
            &request.city,
            &request.categories,
            request.max_results,
            &request.language,
        );

        let (outcome, attempts) = self.call_with_retry(&prompt).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (candidates, tokens_used, error) = match outcome {
            Ok(response) => {
                let mut candidates = parse_candidates(&response.text);
                candidates.truncate(request.max_results.max(1) as usize);
                (candidates, response.tokens_used, None)
            }
            Err(e) => (Vec::new(), 0, Some(e)),
        };

        match &error {
            None => info!(
                city = %request.city.slug,
                categories = ?request.categories,
                found = candidates.len(),
                tokens_used,
                duration_ms,
                "Discovery call completed"
            ),
            Some(e) => warn!(
                city = %request.city.slug,
                categories = ?request.categories,
                attempts,
                error = %e,
                "Discovery call failed"
            ),
        }

        DiscoveryResult {
            city: request.city.slug.clone(),
            categories: request.categories.clone(),
            candidates,
            tokens_used,
            duration_ms,
            attempts,
            error,
        }
    }

    /// Research every category of `request` one after another
    ///
    /// A failed category is recorded and the scan moves on. `cancel` is
    /// checked before each category and during the inter-request delay.
    pub async fn scan_city(
        &self,
        request: &DiscoveryRequest,
        cancel: &CancellationToken,
    ) -> CityScanReport {
        let started = Instant::now();
        let mut report = CityScanReport::new(&request.city.slug);

        info!(
            city = %request.city.slug,
            categories = request.categories.len(),
            "Starting city scan"
        );

        for (index, category) in request.categories.iter().enumerate() {
            if index > 0 && !self.inter_request_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.inter_request_delay) => {}
                }
            }
            if cancel.is_cancelled() {
                info!(city = %request.city.slug, completed = index, "City scan cancelled");
                report.cancelled = true;
                break;
            }

            let single = DiscoveryRequest {
                categories: vec![category.clone()],
                ..request.clone()
            };
            report.record(self.discover(&single).await);
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            city = %report.city,
            places_found = report.places_found,
            tokens_used = report.tokens_used,
            failed = report.failed_categories.len(),
            "City scan finished"
        );
        report
    }

    async fn call_with_retry(&self, prompt: &str) -> (Result<ProviderResponse, ProviderError>, u32) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.call_timeout, self.provider.research(prompt)).await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.call_timeout)),
            };

            match outcome {
                Err(e) if e.is_retryable() && attempt <= self.retry.max_retries => {
                    let delay = e
                        .retry_after()
                        .unwrap_or_else(|| self.retry.backoff(attempt))
                        .min(self.retry.max_backoff.max(self.retry.initial_backoff));
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying provider call"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return (other, attempt),
            }
        }
    }
}

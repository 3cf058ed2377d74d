//! Discovery: research prompts, provider calls and tolerant parsing

pub mod agent;
pub mod parser;
pub mod prompt;
pub mod provider;

pub use agent::{CityScanReport, DiscoveryAgent, DiscoveryRequest, DiscoveryResult, RetryPolicy};
pub use parser::parse_candidates;
pub use prompt::{build_prompt, CityContext};
pub use provider::{HttpResearchProvider, ProviderError, ProviderResponse, ResearchProvider};

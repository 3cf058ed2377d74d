//! Discovery agent integration tests against a scripted provider

mod helpers;

use helpers::{memory_pool, ok_text, ScriptedProvider};
use pawmap_discovery::db::queue::{enqueue_candidates, list_items};
use pawmap_discovery::discovery::{
    CityContext, DiscoveryAgent, DiscoveryRequest, ProviderError, RetryPolicy,
};
use pawmap_discovery::models::{QueueFilter, SOURCE_LLM_RESEARCH};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TWO_CAFES: &str = r#"[
  {"name": "Le Chien Café", "category": "cafe", "address": "1 Rue de Rivoli",
   "dogFeatures": ["water_bowls", "treats"], "priceLevel": "$$", "confidence": 0.9},
  {"name": "Bark Bistro", "category": "bistro", "address": "5 Quai Voltaire", "confidence": 70},
  {"name": "", "address": "dropped"}
]"#;

fn paris() -> CityContext {
    CityContext {
        slug: "paris".to_string(),
        name: "Paris".to_string(),
        country: "France".to_string(),
        latitude: Some(48.8566),
        longitude: Some(2.3522),
        language: "fr".to_string(),
        dog_regulations: "Dogs banned from most public gardens".to_string(),
    }
}

fn request(categories: &[&str]) -> DiscoveryRequest {
    DiscoveryRequest {
        city: paris(),
        categories: categories.iter().map(|c| c.to_string()).collect(),
        max_results: 10,
        language: "fr".to_string(),
    }
}

fn fast_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

fn agent(provider: Arc<ScriptedProvider>) -> DiscoveryAgent {
    DiscoveryAgent::new(provider)
        .with_retry_policy(fast_retries(2))
        .with_inter_request_delay(Duration::ZERO)
        .with_call_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn test_fenced_and_bare_answers_parse_identically() {
    let fenced = format!("Here you go:\n```json\n{}\n```\nEnjoy!", TWO_CAFES);
    let provider = Arc::new(ScriptedProvider::new(vec![
        ok_text(TWO_CAFES, 100),
        ok_text(&fenced, 120),
    ]));
    let agent = agent(provider.clone());

    let bare = agent.discover(&request(&["cafes"])).await;
    let wrapped = agent.discover(&request(&["cafes"])).await;

    assert!(bare.is_success());
    assert_eq!(bare.candidates.len(), 2);
    assert_eq!(bare.candidates, wrapped.candidates);
    assert_eq!(bare.tokens_used, 100);

    let first = &bare.candidates[0];
    assert_eq!(first.price_level, 2);
    assert_eq!(first.confidence, 90);
    assert_eq!(first.source, SOURCE_LLM_RESEARCH);
    assert_eq!(first.dog_features.get("treats"), Some(&true));
}

#[tokio::test]
async fn test_prompt_carries_city_context() {
    let provider = Arc::new(ScriptedProvider::new(vec![ok_text("[]", 10)]));
    let result = agent(provider.clone()).discover(&request(&["parks"])).await;

    assert!(result.is_success());
    assert!(result.candidates.is_empty());

    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("dog-friendly parks in Paris, France"));
    assert!(prompts[0].contains("Dogs banned from most public gardens"));
    assert!(prompts[0].contains("up to 10"));
}

#[tokio::test]
async fn test_unparseable_answer_yields_no_candidates() {
    let provider = Arc::new(ScriptedProvider::new(vec![ok_text(
        "Sorry, I could not find any places.",
        30,
    )]));
    let result = agent(provider).discover(&request(&["hotels"])).await;

    assert!(result.is_success());
    assert!(result.candidates.is_empty());
    assert_eq!(result.tokens_used, 30);
}

#[tokio::test]
async fn test_transient_error_is_retried() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::RateLimited { retry_after: None }),
        ok_text(TWO_CAFES, 50),
    ]));
    let result = agent(provider.clone()).discover(&request(&["cafes"])).await;

    assert!(result.is_success());
    assert_eq!(result.attempts, 2);
    assert_eq!(provider.calls(), 2);
    assert_eq!(result.candidates.len(), 2);
}

#[tokio::test]
async fn test_auth_error_is_not_retried() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::Auth("invalid x-api-key".to_string())),
        ok_text(TWO_CAFES, 50),
    ]));
    let result = agent(provider.clone()).discover(&request(&["cafes"])).await;

    assert!(!result.is_success());
    assert_eq!(result.attempts, 1);
    assert_eq!(provider.calls(), 1);
    assert!(result.candidates.is_empty());
    assert!(matches!(result.error, Some(ProviderError::Auth(_))));
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::Network("reset".to_string())),
        Err(ProviderError::Api {
            status: 503,
            body: "overloaded".to_string(),
        }),
        Err(ProviderError::Network("reset".to_string())),
        ok_text(TWO_CAFES, 50),
    ]));
    let result = agent(provider.clone()).discover(&request(&["cafes"])).await;

    assert!(!result.is_success());
    assert_eq!(result.attempts, 3);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let provider = Arc::new(
        ScriptedProvider::new(vec![ok_text(TWO_CAFES, 50)]).with_delay(Duration::from_secs(5)),
    );
    let agent = DiscoveryAgent::new(provider)
        .with_retry_policy(RetryPolicy::none())
        .with_call_timeout(Duration::from_millis(20));

    let result = agent.discover(&request(&["cafes"])).await;

    assert!(matches!(result.error, Some(ProviderError::Timeout(_))));
    assert!(result.candidates.is_empty());
}

#[tokio::test]
async fn test_candidates_truncated_to_max_results() {
    let provider = Arc::new(ScriptedProvider::new(vec![ok_text(TWO_CAFES, 50)]));
    let mut req = request(&["cafes"]);
    req.max_results = 1;

    let result = agent(provider).discover(&req).await;
    assert_eq!(result.candidates.len(), 1);
    assert_eq!(result.candidates[0].name, "Le Chien Café");
}

#[tokio::test]
async fn test_scan_continues_past_failed_category() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        ok_text(TWO_CAFES, 100),
        Err(ProviderError::Auth("revoked".to_string())),
        ok_text(r#"[{"name": "Parc Monceau", "address": "35 Bd de Courcelles"}]"#, 40),
    ]));
    let report = agent(provider.clone())
        .scan_city(&request(&["cafes", "hotels", "parks"]), &CancellationToken::new())
        .await;

    assert_eq!(provider.calls(), 3);
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.failed_categories, vec!["hotels".to_string()]);
    assert_eq!(report.places_found, 3);
    assert_eq!(report.tokens_used, 140);
    assert!(!report.cancelled);

    let prompts = provider.prompts();
    assert!(prompts[0].contains("dog-friendly cafes in"));
    assert!(prompts[2].contains("dog-friendly parks in"));
}

#[tokio::test]
async fn test_cancelled_scan_stops_between_categories() {
    let provider = Arc::new(ScriptedProvider::new(vec![ok_text(TWO_CAFES, 100)]));
    let agent = agent(provider.clone()).with_inter_request_delay(Duration::from_secs(30));
    let cancel = CancellationToken::new();

    let trigger = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        agent.scan_city(&request(&["cafes", "parks", "hotels"]), &cancel),
    )
    .await
    .unwrap();
    trigger.await.unwrap();

    assert!(report.cancelled);
    assert_eq!(provider.calls(), 1);
    assert_eq!(report.results.len(), 1);
}

#[tokio::test]
async fn test_scan_output_can_be_enqueued() {
    let pool = memory_pool().await;
    let provider = Arc::new(ScriptedProvider::new(vec![ok_text(TWO_CAFES, 100)]));
    let report = agent(provider)
        .scan_city(&request(&["cafes"]), &CancellationToken::new())
        .await;

    let candidates: Vec<_> = report.candidates().cloned().collect();
    let outcome = enqueue_candidates(&pool, &report.city, &candidates)
        .await
        .unwrap();
    assert_eq!(outcome.enqueued, 2);

    let items = list_items(&pool, &QueueFilter::default()).await.unwrap();
    assert_eq!(items[0].candidate.name, "Le Chien Café");
    assert_eq!(items[1].candidate.confidence, 70);
}

//! End-to-end tests for `Orchestrator::generate` with mock providers.

mod common;

use std::sync::Arc;

use common::{ScriptedProvider, StaticSearch, completion};
use huginn::cache::Whitelist;
use huginn::context::ContextConfig;
use huginn::providers::{RetryConfig, SearchHit};
use huginn::routing::{RoutingOverrides, ids};
use huginn::translate::TranslationConfig;
use huginn::{
    ErrorKind, HuginnError, Orchestrator, Priority, RequestDescriptor, SelectionCriteria, Stage,
    TaskKind,
};

const TRANSLATION_MARKER: &str = "Translate the following text";

fn builder() -> huginn::OrchestratorBuilder {
    Orchestrator::builder()
        .translation(TranslationConfig::new().retry(RetryConfig::disabled()))
        .context(ContextConfig::new().retry(RetryConfig::disabled()))
}

// ============================================================================
// Static and volatile tiers
// ============================================================================

#[tokio::test]
async fn whitelisted_name_never_reaches_a_provider() {
    let groq = ScriptedProvider::replying("groq", "Shopping");
    let gemini = ScriptedProvider::replying("gemini", "Shopping");
    let orchestrator = builder()
        .provider(groq.clone())
        .provider(gemini.clone())
        .build()
        .unwrap();

    let request = RequestDescriptor::new("I use GCash for payments", TaskKind::Categorize)
        .priority(Priority::Fast);
    let result = orchestrator.generate(&request).await.unwrap();

    assert_eq!(result.text, "Digital Wallet");
    assert!(result.latency_ms < 50);
    assert!(result.from_whitelist);
    assert!(!result.from_cache);
    assert_eq!(result.provider_id, "whitelist");
    assert_eq!(result.estimated_cost, 0.0);
    assert_eq!(groq.call_count() + gemini.call_count(), 0);
}

#[tokio::test]
async fn empty_whitelist_sends_known_names_to_the_model() {
    let groq = ScriptedProvider::replying("groq", "Payments");
    let orchestrator = builder()
        .provider(groq.clone())
        .whitelist(Whitelist::new())
        .build()
        .unwrap();

    let request = RequestDescriptor::new("GCash", TaskKind::Categorize).priority(Priority::Fast);
    let result = orchestrator.generate(&request).await.unwrap();
    assert_eq!(result.text, "Payments");
    assert!(!result.from_whitelist);
    assert_eq!(groq.call_count(), 1);
}

#[tokio::test]
async fn repeated_request_is_served_from_cache() {
    let groq = ScriptedProvider::replying("groq", "Groceries");
    let orchestrator = builder().provider(groq.clone()).build().unwrap();

    let request = RequestDescriptor::new("weekly supermarket run", TaskKind::Categorize)
        .priority(Priority::Fast);
    let first = orchestrator.generate(&request).await.unwrap();
    assert!(!first.from_cache);
    assert!(first.estimated_cost > 0.0);

    // whitespace and case differences share a fingerprint
    let again = RequestDescriptor::new("  Weekly   SUPERMARKET run ", TaskKind::Categorize)
        .priority(Priority::Fast);
    let second = orchestrator.generate(&again).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.text, "Groceries");
    assert_eq!(second.estimated_cost, 0.0);
    assert!(second.usage.is_none());
    assert_eq!(groq.call_count(), 1);
}

#[tokio::test]
async fn different_priority_is_a_different_cache_entry() {
    let groq = ScriptedProvider::replying("groq", "Groceries");
    let gemini = ScriptedProvider::replying("gemini", "Food");
    let orchestrator = builder()
        .provider(groq.clone())
        .provider(gemini.clone())
        .build()
        .unwrap();

    let fast = RequestDescriptor::new("weekly supermarket run", TaskKind::Categorize)
        .priority(Priority::Fast);
    let balanced = fast.clone().priority(Priority::Balanced);
    assert_eq!(orchestrator.generate(&fast).await.unwrap().text, "Groceries");
    assert_eq!(orchestrator.generate(&balanced).await.unwrap().text, "Food");
    assert_eq!(groq.call_count(), 1);
    assert_eq!(gemini.call_count(), 1);
}

// ============================================================================
// Translation
// ============================================================================

#[tokio::test]
async fn non_english_input_is_translated_before_generation() {
    // gemini-2.0-flash is both the Translate/Fast and Categorize/Balanced primary
    let gemini = ScriptedProvider::new("gemini", |_, prompt| {
        if prompt.starts_with(TRANSLATION_MARKER) {
            Ok(completion("\"I bought food at the market for the kids\""))
        } else {
            Ok(completion("Food & Dining"))
        }
    });
    let orchestrator = builder().provider(gemini.clone()).build().unwrap();

    let request = RequestDescriptor::new(
        "Bumili ako ng pagkain sa palengke para sa mga bata",
        TaskKind::Categorize,
    );
    let result = orchestrator.generate(&request).await.unwrap();

    assert_eq!(result.text, "Food & Dining");
    let translation = result.translation.expect("translation info");
    assert_eq!(translation.source_language, "tl");
    assert_eq!(translation.target_language, "en");
    assert_eq!(translation.text, "I bought food at the market for the kids");

    let prompts = gemini.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].1.starts_with(TRANSLATION_MARKER));
    assert!(prompts[1].1.contains("I bought food at the market for the kids"));
    assert!(!prompts[1].1.contains("Bumili"));
}

#[tokio::test]
async fn failed_translation_degrades_but_still_answers() {
    let groq = ScriptedProvider::replying("groq", "Food");
    let gemini = ScriptedProvider::failing("gemini");
    let openai = ScriptedProvider::failing("openai");
    let orchestrator = builder()
        .provider(groq.clone())
        .provider(gemini)
        .provider(openai)
        .build()
        .unwrap();

    let request = RequestDescriptor::new(
        "Bumili ako ng pagkain sa palengke para sa mga bata",
        TaskKind::Categorize,
    )
    .priority(Priority::Fast);
    let result = orchestrator.generate(&request).await.unwrap();

    assert_eq!(result.text, "Food");
    assert!(result.translation.is_none());
    assert!(result.degraded.iter().any(|d| d.stage == Stage::Translation));
    // the original text went to the model
    assert!(groq.prompts()[0].1.contains("Bumili"));

    // degraded results are not cached
    orchestrator.generate(&request).await.unwrap();
    assert_eq!(groq.call_count(), 2);
}

#[tokio::test]
async fn english_input_skips_translation() {
    let groq = ScriptedProvider::replying("groq", "Transport");
    let orchestrator = builder().provider(groq.clone()).build().unwrap();

    let request = RequestDescriptor::new("taxi ride to the airport", TaskKind::Categorize)
        .priority(Priority::Fast);
    let result = orchestrator.generate(&request).await.unwrap();
    assert!(result.translation.is_none());
    assert!(result.degraded.is_empty());
    assert_eq!(groq.call_count(), 1);
}

// ============================================================================
// Context enrichment
// ============================================================================

#[tokio::test]
async fn search_results_are_added_to_the_prompt() {
    let groq = ScriptedProvider::replying("groq", "Utilities");
    let search = StaticSearch::with_hits(vec![SearchHit {
        title: "Acme Power".into(),
        snippet: "Electricity distributor in Metro Manila.".into(),
    }]);
    let orchestrator = builder()
        .provider(groq.clone())
        .search(search.clone())
        .build()
        .unwrap();

    let request = RequestDescriptor::new("monthly bill from Acme Power", TaskKind::Categorize)
        .priority(Priority::Fast);
    let result = orchestrator.generate(&request).await.unwrap();

    assert!(result.context_used);
    assert_eq!(search.call_count(), 1);
    let prompt = &groq.prompts()[0].1;
    assert!(prompt.starts_with("Background information:"));
    assert!(prompt.contains("Electricity distributor in Metro Manila."));
}

#[tokio::test]
async fn search_failure_is_a_degradation() {
    let groq = ScriptedProvider::replying("groq", "Utilities");
    let search = StaticSearch::failing();
    let orchestrator = builder()
        .provider(groq.clone())
        .search(search)
        .build()
        .unwrap();

    let request = RequestDescriptor::new("monthly bill from Acme Power", TaskKind::Categorize)
        .priority(Priority::Fast);
    let result = orchestrator.generate(&request).await.unwrap();
    assert_eq!(result.text, "Utilities");
    assert!(!result.context_used);
    assert_eq!(result.degraded.len(), 1);
    assert_eq!(result.degraded[0].stage, Stage::Context);
}

#[tokio::test]
async fn lowercase_input_does_not_search() {
    let groq = ScriptedProvider::replying("groq", "Food");
    let search = StaticSearch::with_hits(Vec::new());
    let orchestrator = builder()
        .provider(groq)
        .search(search.clone())
        .build()
        .unwrap();

    let request =
        RequestDescriptor::new("lunch", TaskKind::Categorize).priority(Priority::Fast);
    let result = orchestrator.generate(&request).await.unwrap();
    assert!(!result.context_used);
    assert_eq!(search.call_count(), 0);
}

// ============================================================================
// Fallback
// ============================================================================

#[tokio::test]
async fn fallback_answers_when_primary_fails() {
    let groq = ScriptedProvider::failing("groq");
    let gemini = ScriptedProvider::replying("gemini", "Groceries");
    let orchestrator = builder()
        .provider(groq.clone())
        .provider(gemini.clone())
        .build()
        .unwrap();

    let request = RequestDescriptor::new("weekly supermarket run", TaskKind::Categorize)
        .priority(Priority::Fast);
    let result = orchestrator.generate(&request).await.unwrap();

    assert!(result.used_fallback);
    assert_eq!(result.model_id, ids::GEMINI_FLASH);
    assert_eq!(result.provider_id, "gemini");
    assert_eq!(groq.call_count(), 1);
    assert_eq!(gemini.call_count(), 1);
}

#[tokio::test]
async fn both_models_failing_reports_both_errors() {
    let groq = ScriptedProvider::failing("groq");
    let gemini = ScriptedProvider::new("gemini", |_, _| Err(HuginnError::AuthenticationFailed));
    let orchestrator = builder()
        .provider(groq.clone())
        .provider(gemini.clone())
        .build()
        .unwrap();

    let request = RequestDescriptor::new("weekly supermarket run", TaskKind::Categorize)
        .priority(Priority::Fast);
    let err = orchestrator.generate(&request).await.unwrap_err();

    match &err {
        HuginnError::FallbackExhausted { primary, fallback } => {
            assert!(matches!(**primary, HuginnError::Http(_)));
            assert!(matches!(**fallback, HuginnError::AuthenticationFailed));
        }
        other => panic!("expected FallbackExhausted, got {other:?}"),
    }
    // the primary failure was transient, so the queue may retry
    assert_eq!(err.kind(), ErrorKind::TransientProvider);
    assert_eq!(groq.call_count(), 1);
    assert_eq!(gemini.call_count(), 1);
}

#[tokio::test]
async fn unregistered_primary_provider_falls_back() {
    // no groq registered: llama-3.1-8b-instant cannot be called
    let gemini = ScriptedProvider::replying("gemini", "Groceries");
    let orchestrator = builder().provider(gemini.clone()).build().unwrap();

    let request = RequestDescriptor::new("weekly supermarket run", TaskKind::Categorize)
        .priority(Priority::Fast);
    let result = orchestrator.generate(&request).await.unwrap();
    assert!(result.used_fallback);
    assert_eq!(gemini.call_count(), 1);
}

// ============================================================================
// Custom selection
// ============================================================================

#[tokio::test]
async fn custom_criteria_pick_the_best_qualifying_model() {
    let openai = ScriptedProvider::replying("openai", "Groceries");
    let orchestrator = builder().provider(openai.clone()).build().unwrap();

    let request = RequestDescriptor::new("weekly supermarket run", TaskKind::Categorize)
        .criteria(SelectionCriteria::new().max_cost(0.5).min_quality(7.7));
    let result = orchestrator.generate(&request).await.unwrap();
    assert_eq!(result.model_id, ids::GPT_4O_MINI);
    assert_eq!(openai.prompts()[0].0, ids::GPT_4O_MINI);
}

#[tokio::test]
async fn sole_qualifying_model_falls_back_to_a_different_model() {
    // only gemini-2.0-flash qualifies, and it is also the matrix fallback
    let gemini = ScriptedProvider::failing("gemini");
    let groq = ScriptedProvider::replying("groq", "Groceries");
    let orchestrator = builder()
        .provider(gemini.clone())
        .provider(groq.clone())
        .build()
        .unwrap();

    let request = RequestDescriptor::new("weekly supermarket run", TaskKind::Categorize)
        .priority(Priority::Fast)
        .criteria(SelectionCriteria::new().max_cost(0.12).min_quality(7.0));
    let result = orchestrator.generate(&request).await.unwrap();

    assert!(result.used_fallback);
    assert_eq!(result.model_id, ids::LLAMA_8B);
    assert_eq!(gemini.call_count(), 1);
    assert_eq!(groq.call_count(), 1);
}

#[tokio::test]
async fn same_model_is_never_called_twice_as_its_own_fallback() {
    let gemini = ScriptedProvider::failing("gemini");
    let orchestrator = builder()
        .provider(gemini.clone())
        .routing(
            RoutingOverrides::new()
                .model(TaskKind::Categorize, Priority::Fast, ids::GEMINI_FLASH)
                .fallback(TaskKind::Categorize, Priority::Fast, ids::GEMINI_FLASH),
        )
        .build()
        .unwrap();

    let request = RequestDescriptor::new("weekly supermarket run", TaskKind::Categorize)
        .priority(Priority::Fast);
    let err = orchestrator.generate(&request).await.unwrap_err();

    assert!(matches!(err, HuginnError::Http(_)));
    assert_eq!(gemini.call_count(), 1);
}

#[tokio::test]
async fn impossible_criteria_fail_without_calls() {
    let openai = ScriptedProvider::replying("openai", "x");
    let orchestrator = builder().provider(openai.clone()).build().unwrap();

    let request = RequestDescriptor::new("weekly supermarket run", TaskKind::Categorize)
        .criteria(SelectionCriteria::new().max_cost(0.01).min_quality(9.5));
    let err = orchestrator.generate(&request).await.unwrap_err();
    assert!(matches!(err, HuginnError::NoQualifyingModel));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(openai.call_count(), 0);
}

// ============================================================================
// Evaluation
// ============================================================================

#[tokio::test]
async fn evaluation_adds_score_and_cost() {
    let groq = ScriptedProvider::replying("groq", "Groceries");
    let openai = ScriptedProvider::replying(
        "openai",
        "Sure! {\"score\": 8.5, \"comment\": \"reasonable category\"}",
    );
    let orchestrator = builder()
        .provider(groq)
        .provider(openai.clone())
        .build()
        .unwrap();

    let plain = RequestDescriptor::new("weekly supermarket run", TaskKind::Categorize)
        .priority(Priority::Fast);
    let baseline = orchestrator.generate(&plain).await.unwrap();

    let request = RequestDescriptor::new("monthly supermarket run", TaskKind::Categorize)
        .priority(Priority::Fast)
        .enable_evaluation(true);
    let result = orchestrator.generate(&request).await.unwrap();

    let evaluation = result.evaluation.expect("evaluation");
    assert_eq!(evaluation.score, 8.5);
    assert_eq!(evaluation.comment, "reasonable category");
    assert!(result.estimated_cost > baseline.estimated_cost);
    assert_eq!(openai.call_count(), 1);
    assert_eq!(openai.prompts()[0].0, ids::GPT_4O_MINI);
}

#[tokio::test]
async fn cached_unevaluated_result_does_not_answer_an_evaluated_request() {
    let groq = ScriptedProvider::replying("groq", "Groceries");
    let openai = ScriptedProvider::replying("openai", "{\"score\": 7, \"comment\": \"fine\"}");
    let orchestrator = builder()
        .provider(groq.clone())
        .provider(openai.clone())
        .build()
        .unwrap();

    let plain = RequestDescriptor::new("weekly supermarket run", TaskKind::Categorize)
        .priority(Priority::Fast);
    orchestrator.generate(&plain).await.unwrap();

    let evaluated = plain.clone().enable_evaluation(true);
    let result = orchestrator.generate(&evaluated).await.unwrap();
    assert!(!result.from_cache);
    assert_eq!(result.evaluation.expect("evaluation").score, 7.0);
    assert_eq!(groq.call_count(), 2);
    assert_eq!(openai.call_count(), 1);

    // each variant now has its own entry
    assert!(orchestrator.generate(&plain).await.unwrap().evaluation.is_none());
    let again = orchestrator.generate(&evaluated).await.unwrap();
    assert!(again.from_cache);
    assert!(again.evaluation.is_some());
    assert_eq!(groq.call_count(), 2);
}

#[tokio::test]
async fn disabling_a_stage_bypasses_results_cached_with_it() {
    let groq = ScriptedProvider::replying("groq", "Utilities");
    let search = StaticSearch::with_hits(vec![SearchHit {
        title: "Acme Power".into(),
        snippet: "Electricity distributor.".into(),
    }]);
    let orchestrator = builder()
        .provider(groq.clone())
        .search(search.clone())
        .build()
        .unwrap();

    let request = RequestDescriptor::new("monthly bill from Acme Power", TaskKind::Categorize)
        .priority(Priority::Fast);
    assert!(orchestrator.generate(&request).await.unwrap().context_used);

    let without = request.clone().enable_context(false);
    let result = orchestrator.generate(&without).await.unwrap();
    assert!(!result.from_cache);
    assert!(!result.context_used);
    assert_eq!(search.call_count(), 1);
    assert_eq!(groq.call_count(), 2);
}

#[tokio::test]
async fn unparseable_evaluation_is_absorbed() {
    let groq = ScriptedProvider::replying("groq", "Groceries");
    let openai = ScriptedProvider::replying("openai", "looks fine to me");
    let orchestrator = builder()
        .provider(groq.clone())
        .provider(openai)
        .build()
        .unwrap();

    let request = RequestDescriptor::new("weekly supermarket run", TaskKind::Categorize)
        .priority(Priority::Fast)
        .enable_evaluation(true);
    let result = orchestrator.generate(&request).await.unwrap();

    assert_eq!(result.text, "Groceries");
    assert!(result.evaluation.is_none());
    assert!(result.degraded.iter().any(|d| d.stage == Stage::Evaluation));
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn invalid_requests_fail_before_any_call() {
    let groq = ScriptedProvider::replying("groq", "x");
    let orchestrator = builder().provider(groq.clone()).build().unwrap();

    let blank = RequestDescriptor::new("   ", TaskKind::Categorize);
    let err = orchestrator.generate(&blank).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let no_target = RequestDescriptor::new("hello", TaskKind::Translate);
    let err = orchestrator.generate(&no_target).await.unwrap_err();
    assert!(matches!(err, HuginnError::InvalidInput(_)));

    assert_eq!(groq.call_count(), 0);
}

#[tokio::test]
async fn translate_task_goes_straight_to_the_model() {
    let gemini = ScriptedProvider::replying("gemini", "Magandang umaga");
    let orchestrator = builder().provider(gemini.clone()).build().unwrap();

    let request = RequestDescriptor::new("Good morning", TaskKind::Translate)
        .priority(Priority::Fast)
        .target_language("tl");
    let result = orchestrator.generate(&request).await.unwrap();

    assert_eq!(result.text, "Magandang umaga");
    assert!(result.translation.is_none());
    assert_eq!(gemini.call_count(), 1);
    assert!(gemini.prompts()[0].1.contains("Filipino (Tagalog)"));
}

#[test]
fn build_without_providers_fails() {
    let err = Orchestrator::builder().build().unwrap_err();
    assert!(matches!(err, HuginnError::Configuration(_)));
}

#[tokio::test]
async fn orchestrator_is_shareable_across_tasks() {
    let groq = ScriptedProvider::replying("groq", "Groceries");
    let orchestrator = Arc::new(builder().provider(groq.clone()).build().unwrap());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let request =
                    RequestDescriptor::new(format!("supermarket run {i}"), TaskKind::Categorize)
                        .priority(Priority::Fast);
                orchestrator.generate(&request).await
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(groq.call_count(), 4);
}

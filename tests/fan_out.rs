//! Translation Fan-Out Integration Tests
//!
//! Tests for per-language attempt budgets, retry feedback and isolation
//! between language workflows.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use lanepress::adapters::ModelSettings;
use lanepress::core::{CallError, QualityGate, RetryPolicy, TranslationFanOut, TranslationOutcome};
use lanepress::domain::{Artifact, Decision, Language};

use common::{english_text, languages, quality, score_reply, translated_text, FakeGenerator};

const ARTICLE_WORDS: usize = 120;

fn fan_out(translator: Arc<FakeGenerator>, scorer: Arc<FakeGenerator>) -> TranslationFanOut {
    let gate = Arc::new(QualityGate::new(
        scorer.clone(),
        scorer,
        ModelSettings::default(),
        quality(),
        RetryPolicy::immediate(3),
    ));
    TranslationFanOut::new(translator, gate, "gpt-5")
}

fn source() -> Artifact {
    Artifact::primary(&Language::english(), english_text(ARTICLE_WORDS))
}

#[tokio::test]
async fn test_all_languages_translated() {
    let translator = FakeGenerator::new(|request| {
        let name = if request.prompt.contains("Arabic (Gulf)") { "Arabic (Gulf)" } else { "Spanish" };
        Ok(translated_text(name, ARTICLE_WORDS))
    });
    let scorer = FakeGenerator::new(|_| Ok(score_reply(88)));

    let source = source();
    let result = fan_out(translator.clone(), scorer).run(&source, &languages(), "forex").await;

    assert_eq!(result.success_count(), 2);
    assert_eq!(translator.calls(), 2);
    for (_, artifact, validation) in result.translated() {
        assert_eq!(validation.score, 88);
        assert_eq!(artifact.derived_from, Some(source.id));
    }
}

#[tokio::test]
async fn test_missing_script_retried_with_feedback() {
    let arabic_attempts = Arc::new(AtomicU32::new(0));
    let counter = arabic_attempts.clone();
    let translator = FakeGenerator::new(move |request| {
        if request.prompt.contains("Arabic (Gulf)") {
            // First answer comes back in English
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(english_text(ARTICLE_WORDS));
            }
            return Ok(translated_text("Arabic (Gulf)", ARTICLE_WORDS));
        }
        Ok(translated_text("Spanish", ARTICLE_WORDS))
    });
    let scorer = FakeGenerator::new(|_| Ok(score_reply(90)));

    let result = fan_out(translator.clone(), scorer).run(&source(), &languages(), "forex").await;

    let arabic = &result.languages["ar"];
    assert!(arabic.outcome.is_translated());
    assert_eq!(arabic.task.attempts(), 2);

    let first = &arabic.task.history[0];
    assert!(first.score.unwrap() < 50);
    assert!(matches!(first.decision, Some(Decision::Reject) | Some(Decision::Retry)));

    let arabic_prompts: Vec<String> = translator
        .prompts()
        .into_iter()
        .filter(|p| p.contains("Arabic (Gulf)"))
        .collect();
    assert_eq!(arabic_prompts.len(), 2);
    assert!(!arabic_prompts[0].contains("A previous attempt was rejected"));
    assert!(arabic_prompts[1].contains("A previous attempt was rejected"));
    assert!(arabic_prompts[1].contains("No Arabic script"));
}

#[tokio::test]
async fn test_failing_language_capped_and_isolated() {
    let translator = FakeGenerator::new(|request| {
        if request.prompt.contains("Arabic (Gulf)") {
            // Always far too short
            return Ok(translated_text("Arabic (Gulf)", 10));
        }
        Ok(translated_text("Spanish", ARTICLE_WORDS))
    });
    let scorer = FakeGenerator::new(|_| Ok(score_reply(90)));

    let result = fan_out(translator.clone(), scorer.clone())
        .run(&source(), &languages(), "forex")
        .await;

    assert_eq!(translator.calls_matching("Translate this", "Arabic (Gulf)"), 3);
    assert_eq!(result.success_count(), 1);

    let failed: Vec<(&str, &str)> = result.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "ar");
    assert!(failed[0].1.contains("too short"));

    // The length check rejects locally, so only Spanish reached the scorer
    assert_eq!(scorer.calls_matching("Validate this", "Arabic (Gulf)"), 0);
    assert_eq!(scorer.calls_matching("Validate this", "Spanish"), 1);
}

#[tokio::test]
async fn test_retry_band_consumes_attempts() {
    let translator = FakeGenerator::new(|request| {
        let name = if request.prompt.contains("Arabic (Gulf)") { "Arabic (Gulf)" } else { "Spanish" };
        Ok(translated_text(name, ARTICLE_WORDS))
    });
    // Spanish always lands in the retry band
    let scorer = FakeGenerator::new(|request| {
        if request.prompt.contains("Spanish") {
            Ok(score_reply(60))
        } else {
            Ok(score_reply(90))
        }
    });

    let result = fan_out(translator.clone(), scorer).run(&source(), &languages(), "forex").await;

    let spanish = &result.languages["es"];
    assert!(matches!(spanish.outcome, TranslationOutcome::Failed { .. }));
    assert_eq!(spanish.task.attempts(), 3);
    assert!(spanish
        .task
        .history
        .iter()
        .all(|a| a.decision == Some(Decision::Retry)));
    assert_eq!(translator.calls_matching("Translate this", "Spanish"), 3);
    assert!(result.languages["ar"].outcome.is_translated());
}

#[tokio::test]
async fn test_fatal_translation_error_stops_language() {
    let translator = FakeGenerator::new(|request| {
        if request.prompt.contains("Arabic (Gulf)") {
            return Err(CallError::Fatal("deployment not found".to_string()));
        }
        Ok(translated_text("Spanish", ARTICLE_WORDS))
    });
    let scorer = FakeGenerator::new(|_| Ok(score_reply(90)));

    let result = fan_out(translator.clone(), scorer).run(&source(), &languages(), "forex").await;

    let arabic = &result.languages["ar"];
    assert_eq!(arabic.task.attempts(), 1);
    assert!(arabic.task.history[0].error.is_some());
    assert_eq!(result.success_count(), 1);
}

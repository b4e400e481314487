//! Quality Gate Integration Tests
//!
//! Tests for article decisions, the improvement pass and translation checks.

mod common;

use std::sync::Arc;

use lanepress::adapters::ModelSettings;
use lanepress::core::{ArticleVerdict, CallError, QualityGate, QualitySettings, RetryPolicy};
use lanepress::domain::{Artifact, Decision, Language};

use common::{english_text, score_reply, translated_text, FakeGenerator};

fn gate(scorer: Arc<FakeGenerator>, improver: Arc<FakeGenerator>, settings: QualitySettings) -> QualityGate {
    QualityGate::new(
        scorer,
        improver,
        ModelSettings::default(),
        settings,
        RetryPolicy::immediate(3),
    )
}

fn article(words: usize) -> Artifact {
    Artifact::primary(&Language::english(), english_text(words))
}

#[tokio::test]
async fn test_high_score_accepts_without_improvement() {
    let scorer = FakeGenerator::new(|_| Ok(score_reply(85)));
    let improver = FakeGenerator::new(|_| Ok("improved".to_string()));
    let gate = gate(scorer.clone(), improver.clone(), QualitySettings::default());

    let verdict = gate.review_article(&article(100), "forex", "EUR/USD").await;

    match verdict {
        ArticleVerdict::Accepted {
            validation, improved, ..
        } => {
            assert_eq!(validation.score, 85);
            assert_eq!(validation.decision, Decision::Accept);
            assert!(!improved);
        }
        other => panic!("expected acceptance, got {:?}", other),
    }
    assert_eq!(scorer.calls(), 1);
    assert_eq!(improver.calls(), 0);
}

#[tokio::test]
async fn test_mid_score_improves_exactly_once() {
    let scorer = FakeGenerator::new(|_| Ok(score_reply(60)));
    let improver = FakeGenerator::new(|_| Ok("# Better\n\nA sharper article".to_string()));
    let gate = gate(scorer.clone(), improver.clone(), QualitySettings::default());

    let original = article(100);
    let verdict = gate.review_article(&original, "forex", "EUR/USD").await;

    match verdict {
        ArticleVerdict::Accepted {
            artifact,
            validation,
            improved,
        } => {
            assert!(improved);
            assert_eq!(artifact.text, "# Better\n\nA sharper article");
            assert_eq!(artifact.derived_from, Some(original.id));
            assert_eq!(validation.decision, Decision::Improve);
        }
        other => panic!("expected acceptance, got {:?}", other),
    }
    assert_eq!(scorer.calls(), 1);
    assert_eq!(improver.calls(), 1);
}

#[tokio::test]
async fn test_low_score_rejects() {
    let scorer = FakeGenerator::new(|_| Ok(score_reply(20)));
    let improver = FakeGenerator::new(|_| Ok("improved".to_string()));
    let gate = gate(scorer, improver.clone(), QualitySettings::default());

    let verdict = gate.review_article(&article(100), "crypto", "Bitcoin").await;

    assert!(matches!(verdict, ArticleVerdict::Rejected { ref validation } if validation.score == 20));
    assert_eq!(improver.calls(), 0);
}

#[tokio::test]
async fn test_failed_improvement_keeps_original() {
    let scorer = FakeGenerator::new(|_| Ok(score_reply(55)));
    let improver = FakeGenerator::new(|_| Err(CallError::Network("reset".to_string())));
    let gate = gate(scorer, improver.clone(), QualitySettings::default());

    let original = article(100);
    let verdict = gate.review_article(&original, "forex", "EUR/USD").await;

    match verdict {
        ArticleVerdict::Accepted {
            artifact,
            validation,
            improved,
        } => {
            assert!(!improved);
            assert_eq!(artifact.id, original.id);
            assert!(validation.caveat.is_some());
        }
        other => panic!("expected acceptance, got {:?}", other),
    }
    assert_eq!(improver.calls(), 1);
}

#[tokio::test]
async fn test_rescore_rejection_fails_article() {
    let scorer = FakeGenerator::new(|request| {
        if request.prompt.contains("Improved") {
            Ok(score_reply(30))
        } else {
            Ok(score_reply(60))
        }
    });
    let improver = FakeGenerator::new(|_| Ok("# Improved\n\nStill weak".to_string()));
    let settings = QualitySettings {
        rescore_improved: true,
        ..Default::default()
    };
    let gate = gate(scorer.clone(), improver, settings);

    let verdict = gate.review_article(&article(100), "forex", "EUR/USD").await;

    assert!(matches!(verdict, ArticleVerdict::Rejected { ref validation } if validation.score == 30));
    assert_eq!(scorer.calls(), 2);
}

#[tokio::test]
async fn test_scorer_outage_passes_with_caveat() {
    let scorer = FakeGenerator::new(|_| Ok("I cannot score this article.".to_string()));
    let improver = FakeGenerator::new(|_| Ok("improved".to_string()));
    let gate = gate(scorer, improver.clone(), QualitySettings::default());

    let result = gate.score_article(&article(100), "forex", "EUR/USD").await;

    assert_eq!(result.score, 70);
    assert_eq!(result.decision, Decision::Accept);
    assert!(result.is_fallback());
}

#[tokio::test]
async fn test_scorer_outage_rejects_when_strict() {
    let scorer = FakeGenerator::new(|_| Err(CallError::Upstream {
        status: 500,
        body: "boom".to_string(),
    }));
    let improver = FakeGenerator::new(|_| Ok("improved".to_string()));
    let settings = QualitySettings {
        pass_on_scorer_error: false,
        ..Default::default()
    };
    let gate = gate(scorer.clone(), improver, settings);

    let result = gate.score_article(&article(100), "forex", "EUR/USD").await;

    assert_eq!(result.score, 0);
    assert_eq!(result.decision, Decision::Reject);
    assert_eq!(scorer.calls(), 3);
}

#[tokio::test]
async fn test_translation_too_short_rejected_locally() {
    let scorer = FakeGenerator::new(|_| Ok(score_reply(95)));
    let improver = FakeGenerator::new(|_| Ok("improved".to_string()));
    let gate = gate(scorer.clone(), improver, QualitySettings::default());

    let source = article(100);
    let spanish = Language::spanish();
    let short = Artifact::translation(&source, &spanish, translated_text("Spanish", 40));

    let result = gate.score_translation(&source, &short, &spanish, "forex").await;

    assert_eq!(result.score, 30);
    assert_eq!(result.decision, Decision::Reject);
    assert_eq!(scorer.calls(), 0);
}

#[tokio::test]
async fn test_hard_length_boundary() {
    let source = article(100);
    let spanish = Language::spanish();

    // Exactly half the source length goes to the scorer
    let scorer = FakeGenerator::new(|_| Ok(score_reply(100)));
    let improver = FakeGenerator::new(|_| Ok("improved".to_string()));
    let gate_at = gate(scorer.clone(), improver, QualitySettings::default());
    let half = Artifact::translation(&source, &spanish, translated_text("Spanish", 50));

    let result = gate_at.score_translation(&source, &half, &spanish, "forex").await;

    // 100 - 20 (length)
    assert_eq!(result.score, 80);
    assert_eq!(result.decision, Decision::Accept);
    assert_eq!(scorer.calls(), 1);

    // One word fewer is rejected locally
    let scorer = FakeGenerator::new(|_| Ok(score_reply(100)));
    let improver = FakeGenerator::new(|_| Ok("improved".to_string()));
    let gate_below = gate(scorer.clone(), improver, QualitySettings::default());
    let short = Artifact::translation(&source, &spanish, translated_text("Spanish", 49));

    let result = gate_below.score_translation(&source, &short, &spanish, "forex").await;

    assert_eq!(result.score, 30);
    assert_eq!(result.decision, Decision::Reject);
    assert_eq!(scorer.calls(), 0);
}

#[tokio::test]
async fn test_missing_script_stays_below_retry_band() {
    let scorer = FakeGenerator::new(|_| Ok(score_reply(100)));
    let improver = FakeGenerator::new(|_| Ok("improved".to_string()));
    let gate = gate(scorer, improver, QualitySettings::default());

    let source = article(100);
    let arabic = Language::arabic_gcc();
    let latin_only = Artifact::translation(&source, &arabic, english_text(100));

    let result = gate.score_translation(&source, &latin_only, &arabic, "forex").await;

    assert_eq!(result.score, 49);
    assert_eq!(result.decision, Decision::Reject);
}

#[tokio::test]
async fn test_missing_arabic_script_penalized() {
    let scorer = FakeGenerator::new(|_| Ok(score_reply(90)));
    let improver = FakeGenerator::new(|_| Ok("improved".to_string()));
    let gate = gate(scorer, improver, QualitySettings::default());

    let source = article(100);
    let arabic = Language::arabic_gcc();
    let latin_only = Artifact::translation(&source, &arabic, english_text(100));

    let result = gate.score_translation(&source, &latin_only, &arabic, "forex").await;

    assert_eq!(result.score, 40);
    assert_eq!(result.decision, Decision::Reject);
    assert!(result.issues.iter().any(|i| i.contains("Arabic")));
}

#[tokio::test]
async fn test_length_and_placeholder_penalties_stack() {
    let scorer = FakeGenerator::new(|_| Ok(score_reply(100)));
    let improver = FakeGenerator::new(|_| Ok("improved".to_string()));
    let gate = gate(scorer, improver, QualitySettings::default());

    let source = article(100);
    let spanish = Language::spanish();
    let text = format!("{} [TODO traducir]", translated_text("Spanish", 58));
    let translation = Artifact::translation(&source, &spanish, text);

    let result = gate.score_translation(&source, &translation, &spanish, "forex").await;

    // 100 - 20 (length) - 30 (placeholder)
    assert_eq!(result.score, 50);
    assert_eq!(result.decision, Decision::Retry);
    assert_eq!(result.issues.len(), 2);
}

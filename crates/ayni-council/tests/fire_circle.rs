//! # Fire Circle Integration Tests
//!
//! End-to-end dialogues driven by scripted participants, covering the
//! aggregation rules, the failure policies and the round barrier.

use std::sync::Arc;
use std::time::Duration;

use ayni_council::{
    CouncilError, EvaluationTemplate, FailureKind, FailureMode, FireCircle, FireCircleConfig,
    Judgment, ParticipantStatus, ReplayClient, ReplayStep,
};
use ayni_reciprocity::{LayerPriority, MultiNeutrosophicPrompt, Tif};

const SUBJECT: &str = "[SYSTEM]\nYou are a helpful assistant.\n\n[USER]\nPlease summarise this article.";

fn judgment(f: f64) -> Judgment {
    Judgment::new(Tif::new(0.6, 0.2, f).unwrap(), format!("falsehood {}", f))
}

fn ok(f: f64) -> ReplayStep {
    ReplayStep::judgment(judgment(f))
}

fn observed(f: f64, tags: &[&str]) -> ReplayStep {
    ReplayStep::judgment(judgment(f).with_patterns_observed(tags.iter().copied()))
}

fn consensus(f: f64, tags: &[&str]) -> ReplayStep {
    ReplayStep::judgment(judgment(f).with_consensus_patterns(tags.iter().copied()))
}

fn circle(client: ReplayClient, config: FireCircleConfig) -> (FireCircle, Arc<ReplayClient>) {
    let client = Arc::new(client);
    let circle = FireCircle::new(client.clone(), config).unwrap();
    (circle, client)
}

// ============================================================================
// Consensus Aggregation
// ============================================================================

#[tokio::test]
async fn test_consensus_is_max_falsehood_over_every_round() {
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.1), ok(0.2), ok(0.15)])
        .with_steps("b", [ok(0.2), ok(0.25), ok(0.3)])
        .with_steps("c", [ok(0.8), ok(0.4), ok(0.35)]);
    let (circle, _) = circle(client, FireCircleConfig::new());

    let result = circle.run(SUBJECT, &["a", "b", "c"]).await.unwrap();

    assert_eq!(result.rounds_completed, 3);
    assert!((result.consensus.tif.falsehood() - 0.8).abs() < 1e-9);
    assert_eq!(result.consensus.decisive_participant, "c");
    assert_eq!(result.consensus.decisive_round, 1);
    assert!(result.consensus.reasoning.contains("round 1"));
    assert!(!result.partial);
    assert!(result.failed_models.is_empty());
}

#[tokio::test]
async fn test_zombie_judgments_excluded_from_consensus() {
    // c saw something severe in round 1, then failed: its history stays,
    // its vote does not
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.1), ok(0.2), ok(0.3)])
        .with_steps("b", [ok(0.1), ok(0.1), ok(0.1)])
        .with_steps("c", [ok(0.95), ReplayStep::error("connection reset")])
        .with_steps("d", [ok(0.2), ok(0.2), ok(0.2)]);
    let (circle, _) = circle(client, FireCircleConfig::new());

    let result = circle.run(SUBJECT, &["a", "b", "c", "d"]).await.unwrap();

    assert!((result.consensus.tif.falsehood() - 0.3).abs() < 1e-9);
    assert_eq!(
        result.statuses["c"],
        ParticipantStatus::Zombie { failed_round: 2 }
    );
    assert!(result.dialogue_history[0]
        .evaluations
        .iter()
        .any(|e| e.participant == "c" && (e.tif.falsehood() - 0.95).abs() < 1e-9));
    assert!(result.dialogue_history[2]
        .evaluations
        .iter()
        .all(|e| e.participant != "c"));
    assert!(result.partial);
}

#[tokio::test]
async fn test_prompt_layers_are_rendered_for_participants() {
    let mut prompt = MultiNeutrosophicPrompt::new();
    prompt.add_layer("Be kind.", LayerPriority::System);
    prompt.add_layer("Tell me a joke.", LayerPriority::User);

    let client = ReplayClient::new()
        .with_steps("a", [ok(0.1)])
        .with_steps("b", [ok(0.1)]);
    let (circle, client) = circle(client, FireCircleConfig::new().with_max_rounds(1));

    circle.run_prompt(&prompt, &["a", "b"]).await.unwrap();

    let calls = client.calls().await;
    assert!(calls.iter().all(|c| c.prompt_text.contains("[USER]\nTell me a joke.")));
}

#[tokio::test]
async fn test_baseline_template_drives_first_round() {
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.1), ok(0.1)])
        .with_steps("b", [ok(0.1), ok(0.1)]);
    let config = FireCircleConfig::new()
        .with_max_rounds(2)
        .with_baseline_template("relational_structure".parse::<EvaluationTemplate>().unwrap());
    let (circle, client) = circle(client, config);

    circle.run(SUBJECT, &["a", "b"]).await.unwrap();

    let calls = client.calls().await;
    assert!(calls
        .iter()
        .filter(|c| c.round == 1)
        .all(|c| c.prompt_text.contains("relational structure of a layered prompt")));
    assert!(calls
        .iter()
        .filter(|c| c.round == 2)
        .all(|c| c.prompt_text.contains("Round 1 judgments")));
}

// ============================================================================
// Empty Chair
// ============================================================================

#[tokio::test]
async fn test_empty_chair_rotates_by_round() {
    let participants = ["a", "b", "c"];
    let mut client = ReplayClient::new();
    for id in participants {
        client = client.with_steps(id, [ok(0.1), ok(0.1), ok(0.1), ok(0.1)]);
    }
    let (circle, client) = circle(client, FireCircleConfig::new().with_max_rounds(4));

    let result = circle.run(SUBJECT, &participants).await.unwrap();

    assert_eq!(result.dialogue_history[0].empty_chair, None);
    for round in 2..=4 {
        let expected = participants[(round - 1) % participants.len()];
        let history = &result.dialogue_history[round - 1];
        assert_eq!(history.empty_chair.as_deref(), Some(expected));
        assert_eq!(
            result.round_metrics[round - 1].empty_chair.as_deref(),
            Some(expected)
        );
        assert!(history
            .evaluations
            .iter()
            .all(|e| e.empty_chair == (e.participant == expected)));
    }

    let calls = client.calls().await;
    let chair_call = calls
        .iter()
        .find(|c| c.round == 2 && c.participant == "b")
        .unwrap();
    assert!(chair_call.prompt_text.contains("empty chair"));
    let ordinary_call = calls
        .iter()
        .find(|c| c.round == 2 && c.participant == "a")
        .unwrap();
    assert!(!ordinary_call.prompt_text.contains("empty chair"));
    assert!(ordinary_call.prompt_text.contains("Round 1 judgments"));
}

// ============================================================================
// Pattern Aggregation
// ============================================================================

#[tokio::test]
async fn test_pattern_agreement_threshold() {
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.1), observed(0.1, &["flattery", "urgency"])])
        .with_steps("b", [ok(0.1), observed(0.1, &["flattery"])])
        .with_steps("c", [ok(0.1), observed(0.1, &["Flattery"])])
        .with_steps("d", [ok(0.1), ok(0.1)]);
    let (circle, _) = circle(client, FireCircleConfig::new().with_max_rounds(2));

    let result = circle.run(SUBJECT, &["a", "b", "c", "d"]).await.unwrap();

    let flattery = result.pattern("flattery").unwrap();
    assert!((flattery.agreement - 0.75).abs() < 1e-9);
    assert_eq!(flattery.circle_size, 4);
    assert_eq!(flattery.first_observed_by, "a");
    assert_eq!(flattery.first_round, 2);
    assert!(result.pattern("urgency").is_none());
}

#[tokio::test]
async fn test_later_zombie_stays_in_pattern_denominator() {
    // Four active in round 2 when a and b report "x"; d fails in round 3.
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.1), observed(0.1, &["x"]), ok(0.1)])
        .with_steps("b", [ok(0.1), observed(0.1, &["x"]), ok(0.1)])
        .with_steps("c", [ok(0.1), ok(0.1), ok(0.1)])
        .with_steps("d", [ok(0.1), ok(0.1), ReplayStep::error("quota exceeded")]);
    let (circle, _) = circle(client, FireCircleConfig::new().with_pattern_agreement_threshold(0.6));

    let result = circle.run(SUBJECT, &["a", "b", "c", "d"]).await.unwrap();

    assert_eq!(result.failed_models, vec!["d"]);
    assert!(result.pattern("x").is_none());
}

#[tokio::test]
async fn test_zombie_loses_pattern_vote() {
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.1), observed(0.1, &["role_reversal"]), consensus(0.1, &["late"])])
        .with_steps("b", [ok(0.1), observed(0.1, &["role_reversal"]), consensus(0.1, &["late"])])
        .with_steps("c", [ok(0.1), ok(0.1), ok(0.1)])
        .with_steps(
            "d",
            [
                ok(0.1),
                observed(0.1, &["role_reversal"]),
                ReplayStep::error("quota exceeded"),
            ],
        );
    let (circle, _) = circle(client, FireCircleConfig::new().with_pattern_agreement_threshold(0.5));

    let result = circle.run(SUBJECT, &["a", "b", "c", "d"]).await.unwrap();

    let pattern = result.pattern("role_reversal").unwrap();
    assert_eq!(pattern.circle_size, 4);
    assert_eq!(pattern.observers, vec!["a", "b"]);
    assert!((pattern.agreement - 0.5).abs() < 1e-9);

    // First reported in round 3, after d failed.
    let late = result.pattern("late").unwrap();
    assert_eq!(late.circle_size, 3);
    assert!((late.agreement - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_round_three_reads_consensus_patterns() {
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.1), ok(0.1), consensus(0.1, &["gradual_escalation"])])
        .with_steps("b", [ok(0.1), ok(0.1), consensus(0.1, &["gradual_escalation"])]);
    let (circle, _) = circle(client, FireCircleConfig::new());

    let result = circle.run(SUBJECT, &["a", "b"]).await.unwrap();

    let pattern = result.pattern("gradual_escalation").unwrap();
    assert_eq!(pattern.first_round, 3);
    assert_eq!(pattern.agreement, 1.0);
}

#[tokio::test]
async fn test_empty_chair_influence() {
    // Round 2 chair is b. a raises "x", b raises "y"; both reach agreement.
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.1), observed(0.1, &["x"]), consensus(0.1, &["y"])])
        .with_steps("b", [ok(0.1), observed(0.1, &["y"]), consensus(0.1, &["x"])]);
    let (circle, _) = circle(client, FireCircleConfig::new());

    let result = circle.run(SUBJECT, &["a", "b"]).await.unwrap();

    assert_eq!(result.patterns.len(), 2);
    assert_eq!(result.pattern("y").unwrap().first_observed_by, "b");
    assert!((result.empty_chair_influence - 0.5).abs() < 1e-9);
}

// ============================================================================
// Failure Policies
// ============================================================================

#[tokio::test]
async fn test_strict_mode_aborts_on_single_failure() {
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.1), ReplayStep::error("503")])
        .with_steps("b", [ok(0.1), ok(0.1), ok(0.1)])
        .with_steps("c", [ok(0.1), ok(0.1), ok(0.1)]);
    let (circle, _) = circle(
        client,
        FireCircleConfig::new().with_failure_mode(FailureMode::Strict),
    );

    let err = circle.run(SUBJECT, &["a", "b", "c"]).await.unwrap_err();

    match err {
        CouncilError::ProtocolAbort {
            participant,
            round,
            kind,
            ..
        } => {
            assert_eq!(participant, "a");
            assert_eq!(round, 2);
            assert_eq!(kind, FailureKind::Api);
        }
        other => panic!("expected protocol abort, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_strict_abort_does_not_wait_for_slow_participants() {
    let client = ReplayClient::new()
        .with_steps("a", [ReplayStep::error("unauthorized")])
        .with_steps("b", [ok(0.1).delayed(Duration::from_secs(30))]);
    let (circle, _) = circle(
        client,
        FireCircleConfig::new().with_failure_mode(FailureMode::Strict),
    );

    let started = tokio::time::Instant::now();
    let err = circle.run(SUBJECT, &["a", "b"]).await.unwrap_err();

    assert!(matches!(err, CouncilError::ProtocolAbort { round: 1, .. }));
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test]
async fn test_resilient_completes_with_minimum_viable_circle() {
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.1), ok(0.2), ok(0.3)])
        .with_steps("b", [ok(0.2), ok(0.2), ok(0.2)])
        .with_steps("c", [ok(0.1), ReplayStep::error("timeout upstream")])
        .with_steps("d", [ok(0.1), ok(0.1), ReplayStep::text("I cannot evaluate this.")]);
    let (circle, _) = circle(client, FireCircleConfig::new());

    let result = circle.run(SUBJECT, &["a", "b", "c", "d"]).await.unwrap();

    assert!(result.partial);
    assert_eq!(result.rounds_completed, 3);
    assert_eq!(result.failed_models, vec!["c", "d"]);
    assert_eq!(result.active_participants(), vec!["a", "b"]);
    assert_eq!(
        result.statuses["d"],
        ParticipantStatus::Zombie { failed_round: 3 }
    );
    assert_eq!(result.failures[1].kind, FailureKind::Parse);
    assert_eq!(result.round_metrics[2].dispatched, 3);
    assert_eq!(result.round_metrics[2].failed, 1);
    assert!((result.consensus.tif.falsehood() - 0.3).abs() < 1e-9);
}

#[tokio::test]
async fn test_round_one_failure_excludes_participant() {
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.1), ok(0.1)])
        .with_steps("b", [ok(0.1), ok(0.1)])
        .with_steps("c", [ReplayStep::error("model not found")]);
    let (circle, client) = circle(client, FireCircleConfig::new().with_max_rounds(2));

    let result = circle.run(SUBJECT, &["a", "b", "c"]).await.unwrap();

    assert_eq!(
        result.statuses["c"],
        ParticipantStatus::Excluded { failed_round: 1 }
    );
    let calls = client.calls().await;
    assert!(!calls.iter().any(|c| c.participant == "c" && c.round == 2));
}

#[tokio::test]
async fn test_quorum_error_names_minimum() {
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.1), ok(0.1), ok(0.1)])
        .with_steps("b", [ok(0.1), ReplayStep::error("rate limited")])
        .with_steps("c", [ok(0.1), ReplayStep::error("rate limited")]);
    let (circle, _) = circle(client, FireCircleConfig::new());

    let err = circle.run(SUBJECT, &["a", "b", "c"]).await.unwrap_err();

    assert!(matches!(
        err,
        CouncilError::Quorum {
            active: 1,
            required: 2,
            round: 2
        }
    ));
    assert!(err.to_string().contains("minimum required is 2"));
}

#[tokio::test]
async fn test_too_few_participants_fail_before_any_call() {
    let client = ReplayClient::new().with_steps("a", [ok(0.1)]);
    let (circle, client) = circle(client, FireCircleConfig::new());

    let err = circle.run(SUBJECT, &["a"]).await.unwrap_err();

    assert!(matches!(err, CouncilError::Quorum { active: 1, round: 0, .. }));
    assert!(client.calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_as_participant_failure() {
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.1), ok(0.1)])
        .with_steps("b", [ok(0.1), ok(0.1)])
        .with_steps("c", [ok(0.1), ok(0.9).delayed(Duration::from_secs(5))]);
    let (circle, _) = circle(
        client,
        FireCircleConfig::new()
            .with_max_rounds(2)
            .with_per_call_timeout(Duration::from_secs(1)),
    );

    let result = circle.run(SUBJECT, &["a", "b", "c"]).await.unwrap();

    assert_eq!(
        result.statuses["c"],
        ParticipantStatus::Zombie { failed_round: 2 }
    );
    assert_eq!(result.failures[0].kind, FailureKind::Timeout);
    // the late 0.9 never reaches the consensus
    assert!((result.consensus.tif.falsehood() - 0.1).abs() < 1e-9);
}

// ============================================================================
// Parsing and Early Stop
// ============================================================================

#[tokio::test]
async fn test_text_replies_are_parsed() {
    let client = ReplayClient::new()
        .with_steps(
            "a",
            [ReplayStep::text(
                "```json\n{\"truth\": 0.3, \"indeterminacy\": 0.2, \"falsehood\": 0.7, \"reasoning\": \"role reversal\"}\n```",
            )],
        )
        .with_steps(
            "b",
            [ReplayStep::text("Truth: 0.5\nIndeterminacy: 0.4\nFalsehood: 0.4")],
        );
    let (circle, _) = circle(client, FireCircleConfig::new().with_max_rounds(1));

    let result = circle.run(SUBJECT, &["a", "b"]).await.unwrap();

    assert!((result.consensus.tif.falsehood() - 0.7).abs() < 1e-9);
    assert!(result.consensus.reasoning.contains("role reversal"));
}

#[tokio::test]
async fn test_early_stop_on_convergence() {
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.2), ok(0.3), ok(0.3)])
        .with_steps("b", [ok(0.6), ok(0.31), ok(0.3)]);
    let (circle, _) = circle(client, FireCircleConfig::new().with_early_stop(0.05));

    let result = circle.run(SUBJECT, &["a", "b"]).await.unwrap();

    assert_eq!(result.early_stop_round, Some(2));
    assert_eq!(result.rounds_completed, 2);
    assert!(result.round_metrics[1].convergence_stddev.unwrap() < 0.05);
}

#[tokio::test]
async fn test_convergence_recorded_without_early_stop() {
    let client = ReplayClient::new()
        .with_steps("a", [ok(0.3), ok(0.3), ok(0.3)])
        .with_steps("b", [ok(0.3), ok(0.3), ok(0.3)]);
    let (circle, _) = circle(client, FireCircleConfig::new());

    let result = circle.run(SUBJECT, &["a", "b"]).await.unwrap();

    assert_eq!(result.early_stop_round, None);
    assert_eq!(result.rounds_completed, 3);
    assert!(result
        .dialogue_history
        .iter()
        .all(|round| round.convergence_stddev == Some(0.0)));
}

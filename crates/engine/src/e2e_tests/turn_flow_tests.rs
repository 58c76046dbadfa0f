use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use storyloom_domain::{FlagValue, FrameKind, LocationId, SkillOutcome, YieldKind};

use crate::test_fixtures::{harness, harness_with_config, sample_package, ScriptedLlm};
use crate::use_cases::storyteller::StorytellerConfig;
use crate::use_cases::turn::TurnError;

fn director_json(brief: &str) -> String {
    json!({"brief": brief}).to_string()
}

#[tokio::test]
async fn empty_first_action_seeds_without_counting_a_turn() {
    let llm = Arc::new(ScriptedLlm::new(vec![], vec![]));
    let h = harness(sample_package(), llm.clone());
    let cancel = CancellationToken::new();

    let outcome = h
        .runner
        .run_turn(h.session, &h.package_id, "", &cancel)
        .await
        .expect("bootstrap turn");

    assert_eq!(outcome.state.turn_count, 0);
    assert_eq!(
        outcome.state.current_act,
        storyloom_domain::ActId::new("act-arrival")
    );
    assert_eq!(outcome.state.current_location, LocationId::new("quay"));
    assert_eq!(outcome.waiting_for, YieldKind::FreeText);

    // Establishing frames, no model calls
    let frames = h.frames.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].kind, FrameKind::Transition);
    assert_eq!(frames[1].kind, FrameKind::FullScreen);
    assert_eq!(llm.total_calls(), 0);
}

#[tokio::test]
async fn first_real_action_increments_turn_count_to_one() {
    let llm = Arc::new(ScriptedLlm::new(
        vec![director_json("Welcome the courier ashore.")],
        vec![
            ScriptedLlm::tool_step(vec![(
                "build_frame",
                json!({"kind": "dialogue", "payload": {"speaker": "Harbormaster Venn", "line": "Papers."}}),
            )]),
            ScriptedLlm::yield_step("free-text"),
        ],
    ));
    let h = harness(sample_package(), llm);
    let cancel = CancellationToken::new();

    h.runner
        .run_turn(h.session, &h.package_id, "", &cancel)
        .await
        .expect("bootstrap");
    let outcome = h
        .runner
        .run_turn(h.session, &h.package_id, "I step onto the quay", &cancel)
        .await
        .expect("first real turn");

    assert_eq!(outcome.state.turn_count, 1);
    assert_eq!(outcome.waiting_for, YieldKind::FreeText);
    assert!(h
        .frames
        .frames()
        .iter()
        .any(|f| f.kind == FrameKind::Dialogue));
}

#[tokio::test]
async fn director_mutations_apply_before_the_storyteller_runs() {
    let direction = json!({
        "brief": "Tighten the net.",
        "mutations": {
            "progression_delta": 2,
            "force_ticks": 4,
            "off_path": true,
            "complication": {"op": "set", "description": "A patrol is closing in", "max_turns": 3},
            "exhaust_encounters": ["customs-shakedown"],
        },
        "suggested_encounter": "drowned-bell"
    })
    .to_string();

    let llm = Arc::new(ScriptedLlm::new(
        vec![direction],
        vec![ScriptedLlm::yield_step("continue")],
    ));
    let h = harness(sample_package(), llm);
    let cancel = CancellationToken::new();

    let outcome = h
        .runner
        .run_turn(h.session, &h.package_id, "I slip into the crowd", &cancel)
        .await
        .expect("turn");

    let state = outcome.state;
    assert_eq!(state.global_progression, 2);
    assert_eq!(state.opposing_force.current_tick, 4);
    assert_eq!(state.opposing_force.escalation_history, vec![3]);
    assert_eq!(state.off_path_turns, 1);
    assert!(state
        .active_complication
        .as_ref()
        .is_some_and(|c| c.description.contains("patrol")));
    assert!(state
        .exhausted_encounters
        .contains(&storyloom_domain::EncounterId::new("customs-shakedown")));
}

#[tokio::test]
async fn malformed_director_output_never_fails_the_turn() {
    let llm = Arc::new(ScriptedLlm::new(
        vec!["The harbor felt wrong tonight, didn't it?".to_string()],
        vec![ScriptedLlm::yield_step("free-text")],
    ));
    let h = harness(sample_package(), llm);
    let cancel = CancellationToken::new();

    let outcome = h
        .runner
        .run_turn(h.session, &h.package_id, "I look around", &cancel)
        .await
        .expect("turn survives prose director");

    // Neutral fallback: no mutations landed
    assert_eq!(outcome.state.global_progression, 0);
    assert_eq!(outcome.state.turn_count, 1);
}

#[tokio::test]
async fn dice_roll_halts_and_the_result_token_is_banded_next_turn() {
    let llm = Arc::new(ScriptedLlm::new(
        vec![
            director_json("Call for a nerve check."),
            director_json("Honor the roll."),
        ],
        vec![
            // Turn 1: stat up, then a dice-roll frame - the loop must halt
            ScriptedLlm::tool_step(vec![
                (
                    "mutate_player_stats",
                    json!({"action": "set_stat", "stat_name": "nerve", "value": 1}),
                ),
                (
                    "build_frame",
                    json!({"kind": "dice-roll", "payload": {"formula": "2d6", "stat": "nerve"}}),
                ),
            ]),
            // Turn 2: report the banded outcome, then yield
            ScriptedLlm::tool_step(vec![(
                "build_frame",
                json!({"kind": "skill-check", "payload": {"outcome": "mixed_success"}}),
            )]),
            ScriptedLlm::yield_step("free-text"),
        ],
    ));
    let h = harness(sample_package(), llm);
    let cancel = CancellationToken::new();

    let outcome = h
        .runner
        .run_turn(h.session, &h.package_id, "I face down the officers", &cancel)
        .await
        .expect("dice turn");
    assert_eq!(outcome.waiting_for, YieldKind::DiceResult);
    let pending = outcome.state.pending_check.expect("check armed");
    assert_eq!(pending.stat, "nerve");
    assert_eq!(pending.modifier, 1);

    // The client rolled a 7; with +1 that is a mixed success (total 8)
    let outcome = h
        .runner
        .run_turn(
            h.session,
            &h.package_id,
            "[dice-result] 7 I keep my hand steady",
            &cancel,
        )
        .await
        .expect("result turn");

    assert!(outcome.state.pending_check.is_none(), "check consumed");
    assert_eq!(
        storyloom_domain::SkillCheckResolution::resolve("nerve", 7, 1).outcome,
        SkillOutcome::MixedSuccess
    );
    assert!(h
        .frames
        .frames()
        .iter()
        .any(|f| f.kind == FrameKind::SkillCheck));
}

#[tokio::test]
async fn travel_tool_moves_the_session_and_resets_counters() {
    let llm = Arc::new(ScriptedLlm::new(
        vec![director_json("Let them wander.")],
        vec![
            ScriptedLlm::tool_step(vec![(
                "travel",
                json!({"target_location_id": "tavern"}),
            )]),
            ScriptedLlm::yield_step("choice"),
        ],
    ));
    let h = harness(sample_package(), llm);
    let cancel = CancellationToken::new();

    let outcome = h
        .runner
        .run_turn(h.session, &h.package_id, "I head for the tavern", &cancel)
        .await
        .expect("turn");

    assert_eq!(outcome.state.current_location, LocationId::new("tavern"));
    assert_eq!(outcome.state.off_path_turns, 0);
    assert_eq!(outcome.state.current_beat, 0);
    assert_eq!(outcome.waiting_for, YieldKind::Choice);
}

#[tokio::test]
async fn unreachable_travel_is_recoverable_within_the_turn() {
    let llm = Arc::new(ScriptedLlm::new(
        vec![director_json("Stay grounded.")],
        vec![
            // First attempt goes somewhere illegal; the model corrects
            ScriptedLlm::tool_step(vec![(
                "travel",
                json!({"target_location_id": "lighthouse"}),
            )]),
            ScriptedLlm::tool_step(vec![(
                "travel",
                json!({"target_location_id": "tavern"}),
            )]),
            ScriptedLlm::yield_step("free-text"),
        ],
    ));
    let h = harness(sample_package(), llm);
    let cancel = CancellationToken::new();

    let outcome = h
        .runner
        .run_turn(h.session, &h.package_id, "I march to the lighthouse", &cancel)
        .await
        .expect("turn still completes");

    assert_eq!(outcome.state.current_location, LocationId::new("tavern"));
}

#[tokio::test]
async fn record_flag_lands_in_plot_state() {
    let llm = Arc::new(ScriptedLlm::new(
        vec![director_json("Remember what they saw.")],
        vec![
            ScriptedLlm::tool_step(vec![(
                "record_flag",
                json!({"flag_name": "saw_the_bell", "value": true}),
            )]),
            ScriptedLlm::yield_step("free-text"),
        ],
    ));
    let h = harness(sample_package(), llm);
    let cancel = CancellationToken::new();

    let outcome = h
        .runner
        .run_turn(h.session, &h.package_id, "I lean over the water", &cancel)
        .await
        .expect("turn");

    assert_eq!(
        outcome.state.flags.get("saw_the_bell"),
        Some(&FlagValue::Bool(true))
    );
}

#[tokio::test]
async fn step_budget_is_the_fail_safe_terminal_condition() {
    let llm = Arc::new(ScriptedLlm::new(
        vec![director_json("Anything.")],
        vec![], // the model never yields; every step is empty prose
    ));
    let h = harness_with_config(
        sample_package(),
        llm.clone(),
        StorytellerConfig {
            step_budget: 3,
            temperature: 0.9,
        },
    );
    let cancel = CancellationToken::new();

    let outcome = h
        .runner
        .run_turn(h.session, &h.package_id, "I wait", &cancel)
        .await
        .expect("turn closes anyway");

    assert_eq!(outcome.waiting_for, YieldKind::Continue);
    // One director call plus exactly step_budget storyteller steps
    assert_eq!(llm.total_calls(), 4);
}

#[tokio::test]
async fn cancelled_turns_fail_with_cancelled() {
    let llm = Arc::new(ScriptedLlm::new(vec![director_json("n/a")], vec![]));
    let h = harness(sample_package(), llm);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h
        .runner
        .run_turn(h.session, &h.package_id, "I do anything", &cancel)
        .await
        .expect_err("cancelled");
    assert!(matches!(err, TurnError::Cancelled));
}

#[tokio::test]
async fn turn_completion_signals_reach_the_sink() {
    let llm = Arc::new(ScriptedLlm::new(
        vec![director_json("Quiet beat.")],
        vec![ScriptedLlm::yield_step("choice")],
    ));
    let h = harness(sample_package(), llm);
    let cancel = CancellationToken::new();

    h.runner
        .run_turn(h.session, &h.package_id, "", &cancel)
        .await
        .expect("bootstrap");
    h.runner
        .run_turn(h.session, &h.package_id, "I listen", &cancel)
        .await
        .expect("turn");

    assert_eq!(
        h.frames.completions(),
        vec![YieldKind::FreeText, YieldKind::Choice]
    );
}

use exas::config::EngineConfig;
use exas::rules::RuleId;
use exas::service::*;
use serde_json::{json, Value};

fn service() -> ExerciseService {
	let mut config = EngineConfig::default();
	config.generator.seed = Some(11);
	ExerciseService::new(&config).unwrap()
}

fn call(service: &ExerciseService, request: Value) -> Value {
	serde_json::from_str(&service.handle_json(&request.to_string())).unwrap()
}

#[test]
fn json_round_trip() {
	let service = service();

	let created = call(&service, json!({
		"action": "newExercise",
		"difficulty": "easy",
		"startExpressionText": "A AND (B OR C)",
	}));
	assert_eq!(created["startExpressionText"], "A AND (B OR C)");
	assert_eq!(created["newState"], "in-progress");
	let id = created["sessionId"].as_str().unwrap().to_string();

	let hint = call(&service, json!({ "action": "hint", "sessionId": id }));
	assert_eq!(hint["rule"], "distribution");
	assert_eq!(hint["targetPathHint"], json!([]));
	assert_eq!(hint["targetText"], "A AND (B OR C)");

	let rejected = call(&service, json!({
		"action": "submitStep",
		"sessionId": id,
		"candidateExpressionText": "A AND B",
	}));
	assert_eq!(rejected["accepted"], false);
	assert_eq!(rejected["reasonCode"], "not-equivalent");
	assert_eq!(rejected["stepCount"], 0);

	let accepted = call(&service, json!({
		"action": "submitStep",
		"sessionId": id,
		"candidateExpressionText": "(A AND B) OR (A AND C)",
	}));
	assert_eq!(accepted["accepted"], true);
	assert_eq!(accepted["rule"], "distribution");
	assert_eq!(accepted["newState"], "solved");
	assert_eq!(accepted["stepCount"], 1);
	assert!(accepted.get("reason").is_none());

	let undone = call(&service, json!({ "action": "undo", "sessionId": id }));
	assert_eq!(undone["stepCount"], 0);
	assert_eq!(undone["newState"], "in-progress");
	assert_eq!(undone["currentExpressionText"], "A AND (B OR C)");

	let redone = call(&service, json!({ "action": "redo", "sessionId": id }));
	assert_eq!(redone["stepCount"], 1);
	let again = call(&service, json!({ "action": "redo", "sessionId": id }));
	assert_eq!(again["stepCount"], 1);
	assert!(again["note"].is_string());

	let ready = call(&service, json!({ "action": "ready", "sessionId": id }));
	assert_eq!(ready["solved"], true);
	assert_eq!(ready["inDnf"], true);

	let closed = call(&service, json!({ "action": "close", "sessionId": id }));
	assert_eq!(closed["closed"], true);
	let gone = call(&service, json!({ "action": "undo", "sessionId": id }));
	assert!(gone["error"].as_str().unwrap().contains("unknown session"));
}

#[test]
fn generated_exercise_can_be_finished_by_the_engine() {
	let service = service();
	let created = service.new_exercise(exas::Difficulty::Normal, None).unwrap();

	let derivation = service.derivation(created.session_id).unwrap();
	assert_eq!(derivation.start_expression_text, created.start_expression_text);

	let mut last = None;
	for _ in 0..EngineConfig::default().max_derivation_steps {
		let response = service.next(created.session_id).unwrap();
		assert!(response.accepted, "{:?}", response.reason);
		let solved = response.new_state == exas::SessionState::Solved;
		last = Some(response);
		if solved {
			break;
		}
	}
	assert_eq!(last.map(|response| response.new_state), Some(exas::SessionState::Solved));

	let hint = service.hint(created.session_id);
	assert!(hint.is_err());
}

#[test]
fn malformed_requests_get_errors() {
	let service = service();
	let answer = call(&service, json!({ "action": "fly" }));
	assert!(answer["error"].is_string());

	let answer = call(&service, json!({
		"action": "newExercise",
		"startExpressionText": "A AND",
	}));
	assert!(answer["error"].as_str().unwrap().contains("can't parse"));
}

#[test]
fn abandon_and_reset() {
	let service = service();
	let id = service.new_exercise(exas::Difficulty::Easy, Some("NOT (p OR q)")).unwrap().session_id;

	let step = service.submit_step(id, "NOT p AND NOT q").unwrap();
	assert_eq!(step.rule, Some(RuleId::DeMorganOr));

	let abandoned = service.abandon(id).unwrap();
	assert_eq!(abandoned.new_state, exas::SessionState::Abandoned);
	let refused = service.submit_step(id, "NOT q AND NOT p").unwrap();
	assert_eq!(refused.reason_code.as_deref(), Some("abandoned"));

	let reset = service.reset(id).unwrap();
	assert_eq!(reset.step_count, 0);
	assert_eq!(reset.new_state, exas::SessionState::InProgress);
	assert_eq!(reset.current_expression_text, "NOT (p OR q)");
}

#[test]
fn oversized_or_solved_starts_are_refused() {
	let service = service();
	let start = |text: &str| call(&service, json!({
		"action": "newExercise",
		"difficulty": "normal",
		"startExpressionText": text,
	}));

	// Двадцать переменных: таблица истинности слишком велика.
	let clauses: Vec<String> = (0..10).map(|i| format!("(a{} OR b{})", i, i)).collect();
	let answer = start(&clauses.join(" AND "));
	assert!(answer["error"].as_str().unwrap().contains("too many variables"), "{}", answer);

	// Восемь переменных, но 16 конъюнкций в ДНФ.
	let answer = start("(a OR b) AND (c OR d) AND (e OR f) AND (g OR h)");
	assert!(answer["error"].as_str().unwrap().contains("conjunctions"), "{}", answer);

	let answer = start("A OR B");
	assert!(answer["error"].as_str().unwrap().contains("already in DNF"), "{}", answer);

	let answer = start(&"(".repeat(100_000));
	assert!(answer["error"].as_str().unwrap().contains("too long"));

	assert!(service.store().is_empty());
}

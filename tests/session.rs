use std::sync::Arc;

use exas::expr::*;
use exas::generator::{Difficulty, Exercise, GenerationError};
use exas::normal_form::equivalent_to;
use exas::parsing::parse;
use exas::rules::{RuleId, RuleSet};
use exas::session::*;
use exas::store::{SessionStore, StoreError};
use exas::validator::InvalidStepReason;

fn expr(text: &str) -> Expression {
	parse(text).unwrap()
}

fn rules() -> Arc<RuleSet> {
	Arc::new(RuleSet::standard().unwrap())
}

fn session(start: &str) -> DerivationSession {
	let exercise = Exercise::new(expr(start), Difficulty::Easy).unwrap();
	DerivationSession::new(exercise, rules(), SessionSettings::default())
}

/// Три шага до ДНФ: двойное отрицание, де Морган, дистрибутивность.
const THREE_STEPS: [&str; 4] = [
	"NOT NOT (NOT (A AND B) AND C)",
	"NOT (A AND B) AND C",
	"(NOT A OR NOT B) AND C",
	"NOT A AND C OR NOT B AND C",
];

#[test]
fn distribution_solves_the_exercise() {
	let mut session = session("A AND (B OR C)");
	assert_eq!(session.state(), SessionState::InProgress);

	let step = session.submit_step(expr("(A AND B) OR (A AND C)")).unwrap();
	assert_eq!(step.rule, RuleId::Distribution);
	assert_eq!(step.position, ExprPositionOwned(vec![]));
	assert_eq!(session.state(), SessionState::Solved);
	assert_eq!(session.step_count(), 1);
}

#[test]
fn not_equivalent_step_is_rejected() {
	let mut session = session("NOT (A AND B)");
	assert_eq!(
		session.submit_step(expr("A AND B")).unwrap_err(),
		SessionError::InvalidStep(InvalidStepReason::NotEquivalent)
	);
	assert_eq!(session.step_count(), 0);
	assert_eq!(session.history_len(), 0);
	assert_eq!(session.current(), &expr("NOT (A AND B)"));
}

#[test]
fn double_negation() {
	let mut session = session("NOT (NOT A)");
	assert_eq!(
		session.submit_step(expr("NOT A")).unwrap_err(),
		SessionError::InvalidStep(InvalidStepReason::NotEquivalent)
	);
	let step = session.submit_step(expr("A")).unwrap();
	assert_eq!(step.rule, RuleId::DoubleNegation);
	assert_eq!(session.state(), SessionState::Solved);
}

#[test]
fn equivalent_but_too_far_is_rejected() {
	let mut session = session(THREE_STEPS[0]);
	assert_eq!(
		session.submit_step(expr(THREE_STEPS[2])).unwrap_err(),
		SessionError::InvalidStep(InvalidStepReason::NoRuleApplies)
	);
	assert_eq!(
		session.submit_step(expr(THREE_STEPS[0])).unwrap_err(),
		SessionError::InvalidStep(InvalidStepReason::Unchanged)
	);
}

#[test]
fn three_steps_two_undos() {
	let mut session = session(THREE_STEPS[0]);
	for text in &THREE_STEPS[1..] {
		session.submit_step(expr(text)).unwrap();
	}
	assert_eq!(session.state(), SessionState::Solved);
	assert_eq!(session.step_count(), 3);

	assert_eq!(session.undo(), Ok(2));
	assert_eq!(session.undo(), Ok(1));
	assert_eq!(session.cursor(), 1);
	assert_eq!(session.current(), &expr(THREE_STEPS[1]));
	assert_eq!(session.state(), SessionState::InProgress);
	assert_eq!(session.history_len(), 3);
	assert_eq!(session.steps().len(), 1);

	assert_eq!(session.redo(), Ok(2));
	assert_eq!(session.current(), &expr(THREE_STEPS[2]));
}

#[test]
fn new_step_drops_undone_history() {
	let mut session = session(THREE_STEPS[0]);
	session.submit_step(expr(THREE_STEPS[1])).unwrap();
	session.submit_step(expr(THREE_STEPS[2])).unwrap();
	session.undo().unwrap();
	session.undo().unwrap();

	// Другой шаг из начала: де Морган внутри вместо двойного отрицания.
	let step = session.submit_step(expr("NOT (NOT NOT (A AND B) OR NOT C)")).unwrap();
	assert_eq!(step.rule, RuleId::DeMorganAnd);
	assert_eq!(step.position, ExprPositionOwned(vec![0]));
	assert_eq!(session.history_len(), 1);
	assert_eq!(session.redo(), Err(SessionError::AtEnd));
}

#[test]
fn undo_and_redo_at_the_edges() {
	let mut session = session("NOT (A OR B)");
	assert_eq!(session.undo(), Err(SessionError::AtStart));
	assert_eq!(session.redo(), Err(SessionError::AtEnd));
	assert!(SessionError::AtStart.is_no_op());
	assert_eq!(session.step_count(), 0);
}

#[test]
fn solved_session_rejects_steps_but_allows_undo() {
	let mut session = session("NOT (A OR B)");
	session.submit_step(expr("NOT A AND NOT B")).unwrap();
	assert_eq!(session.state(), SessionState::Solved);

	assert_eq!(session.submit_step(expr("NOT B AND NOT A")).unwrap_err(), SessionError::AlreadySolved);
	assert_eq!(session.request_hint().unwrap_err(), SessionError::AlreadySolved);

	session.undo().unwrap();
	assert_eq!(session.state(), SessionState::InProgress);
	session.redo().unwrap();
	assert_eq!(session.state(), SessionState::Solved);
}

#[test]
fn different_dnf_also_solves() {
	let mut session = session("A AND (A OR B)");
	assert!(equivalent_to(session.target(), &expr("A OR A AND B")));

	// `A` не совпадает с целью, но это тоже равносильная ей ДНФ.
	let step = session.submit_step(expr("A")).unwrap();
	assert_eq!(step.rule, RuleId::Absorption);
	assert_eq!(session.state(), SessionState::Solved);
	assert_eq!(session.ready(), ReadyVerdict { solved: true, in_dnf: true });
}

#[test]
fn reset_from_any_state() {
	let mut session = session(THREE_STEPS[0]);
	for text in &THREE_STEPS[1..] {
		session.submit_step(expr(text)).unwrap();
	}
	assert_eq!(session.state(), SessionState::Solved);
	session.reset();
	assert_eq!(session.history_len(), 0);
	assert_eq!(session.cursor(), 0);
	assert_eq!(session.state(), SessionState::InProgress);
	assert_eq!(session.current(), &expr(THREE_STEPS[0]));

	session.abandon();
	assert_eq!(session.state(), SessionState::Abandoned);
	assert_eq!(session.submit_step(expr(THREE_STEPS[1])).unwrap_err(), SessionError::Abandoned);
	session.reset();
	assert_eq!(session.state(), SessionState::InProgress);
}

#[test]
fn hint_skips_the_undone_step() {
	let mut session = session(THREE_STEPS[0]);
	let hint = session.request_hint().unwrap();
	assert_eq!(hint.rule, RuleId::DoubleNegation);
	assert_eq!(hint.position, ExprPositionOwned(vec![]));
	assert_eq!(hint.result, expr(THREE_STEPS[1]));
	assert_eq!(session.step_count(), 0);

	session.submit_step(hint.result).unwrap();
	session.undo().unwrap();

	let hint = session.request_hint().unwrap();
	assert_eq!(hint.rule, RuleId::DeMorganAnd);
	assert_eq!(hint.position, ExprPositionOwned(vec![0]));
}

#[test]
fn next_step_follows_the_hint() {
	let mut session = session(THREE_STEPS[0]);
	let step = session.next_step().unwrap();
	assert_eq!(step.rule, RuleId::DoubleNegation);
	assert_eq!(session.current(), &expr(THREE_STEPS[1]));
}

#[test]
fn derivation_reaches_the_target() {
	let mut session = session(THREE_STEPS[0]);
	assert_eq!(session.ready(), ReadyVerdict { solved: false, in_dnf: false });

	let derivation = session.derivation();
	assert!(derivation.complete);
	assert_eq!(derivation.steps.len(), 3);
	assert_eq!(session.step_count(), 0);

	for application in derivation.steps {
		session.submit_step(application.result).unwrap();
	}
	assert_eq!(session.state(), SessionState::Solved);
}

#[test]
fn snapshot_restores_the_session() {
	let mut session = session(THREE_STEPS[0]);
	for text in &THREE_STEPS[1..] {
		session.submit_step(expr(text)).unwrap();
	}
	session.undo().unwrap();

	let json = serde_json::to_string(&session.snapshot()).unwrap();
	let snapshot: SessionSnapshot = serde_json::from_str(&json).unwrap();
	let restored = DerivationSession::restore(snapshot, rules(), SessionSettings::default()).unwrap();

	assert_eq!(restored.id(), session.id());
	assert_eq!(restored.cursor(), 2);
	assert_eq!(restored.history(), session.history());
	assert_eq!(restored.current(), session.current());
	assert_eq!(restored.state(), SessionState::InProgress);
}

#[test]
fn corrupted_snapshot_is_rejected() {
	let mut session = session(THREE_STEPS[0]);
	session.submit_step(expr(THREE_STEPS[1])).unwrap();
	session.submit_step(expr(THREE_STEPS[2])).unwrap();
	let snapshot = session.snapshot();

	let mut wrong_cursor = snapshot.clone();
	wrong_cursor.cursor = 5;
	assert!(matches!(
		DerivationSession::restore(wrong_cursor, rules(), SessionSettings::default()),
		Err(SnapshotError::CursorOutOfRange { cursor: 5, len: 2 })
	));

	let mut wrong_step = snapshot.clone();
	wrong_step.steps[1].to = expr("A AND B");
	assert!(matches!(
		DerivationSession::restore(wrong_step, rules(), SessionSettings::default()),
		Err(SnapshotError::InvalidStep { index: 1, reason: InvalidStepReason::NotEquivalent })
	));

	let mut broken_chain = snapshot.clone();
	broken_chain.steps.swap(0, 1);
	assert!(matches!(
		DerivationSession::restore(broken_chain, rules(), SessionSettings::default()),
		Err(SnapshotError::BrokenChain { index: 0 })
	));

	let mut wrong_target = snapshot.clone();
	wrong_target.exercise.target = expr("NOT A AND C");
	assert!(matches!(
		DerivationSession::restore(wrong_target, rules(), SessionSettings::default()),
		Err(SnapshotError::InvalidExercise(GenerationError::InvariantViolated { .. }))
	));

	let mut solved_start = snapshot.clone();
	solved_start.exercise.start = expr(THREE_STEPS[3]);
	assert!(matches!(
		DerivationSession::restore(solved_start, rules(), SessionSettings::default()),
		Err(SnapshotError::InvalidExercise(GenerationError::AlreadyInDnf(_)))
	));

	let mut future = snapshot;
	future.version = SNAPSHOT_VERSION + 1;
	assert!(matches!(
		DerivationSession::restore(future, rules(), SessionSettings::default()),
		Err(SnapshotError::UnsupportedVersion { .. })
	));
}

#[test]
fn store_saves_and_loads_sessions() {
	let store = SessionStore::new();
	let first = store.insert(session(THREE_STEPS[0])).unwrap();
	let second = store.insert(session("NOT (A OR B)")).unwrap();
	store
		.with_session(first, |session| session.submit_step(expr(THREE_STEPS[1])).map(|_| ()))
		.unwrap()
		.unwrap();

	let mut saved = Vec::new();
	store.save_to_writer(&mut saved).unwrap();

	let loaded = SessionStore::new();
	assert_eq!(loaded.load_from_reader(saved.as_slice(), &rules(), SessionSettings::default()).unwrap(), 2);
	assert_eq!(loaded.len(), 2);
	let current = loaded.with_session(first, |session| session.current().clone()).unwrap();
	assert_eq!(current, expr(THREE_STEPS[1]));
	let count = loaded.with_session(second, |session| session.step_count()).unwrap();
	assert_eq!(count, 0);

	loaded.remove(second).unwrap();
	assert!(matches!(loaded.get(second), Err(StoreError::UnknownSession(_))));
}

fn temporary_file(name: &str) -> std::path::PathBuf {
	std::env::temp_dir().join(format!("exas-{}-{}.json", name, uuid::Uuid::new_v4()))
}

#[test]
fn failed_save_keeps_the_previous_file() {
	let path = temporary_file("sessions");
	let store = SessionStore::new();
	let id = store.insert(session(THREE_STEPS[0])).unwrap();
	store.save(&path).unwrap();
	let saved = std::fs::read_to_string(&path).unwrap();

	// Паника под замком отравляет его, и снимок сессии уже не получить.
	let shared = store.get(id).unwrap();
	let _ = std::thread::spawn(move || {
		let _guard = shared.lock().unwrap();
		panic!("session lock poisoned on purpose");
	})
	.join();

	assert!(matches!(store.save(&path), Err(StoreError::Poisoned)));
	assert_eq!(std::fs::read_to_string(&path).unwrap(), saved);

	let loaded = SessionStore::new();
	assert_eq!(loaded.load(&path, &rules(), SessionSettings::default()).unwrap(), 1);
	std::fs::remove_file(&path).unwrap();
}

#[test]
fn save_into_missing_directory_fails() {
	let directory = temporary_file("missing");
	let path = directory.join("sessions.json");
	let store = SessionStore::new();
	store.insert(session(THREE_STEPS[0])).unwrap();

	assert!(matches!(store.save(&path), Err(StoreError::Io(_))));
	assert!(!directory.exists());
}

#[test]
fn sessions_are_independent_between_threads() {
	let store = Arc::new(SessionStore::new());
	let ids: Vec<SessionId> = (0..4).map(|_| store.insert(session(THREE_STEPS[0])).unwrap()).collect();

	let handles: Vec<_> = ids
		.iter()
		.copied()
		.enumerate()
		.map(|(index, id)| {
			let store = Arc::clone(&store);
			std::thread::spawn(move || {
				for text in &THREE_STEPS[1..=(index % 3) + 1] {
					store.with_session(id, |session| session.submit_step(expr(text)).map(|_| ())).unwrap().unwrap();
				}
			})
		})
		.collect();
	for handle in handles {
		handle.join().unwrap();
	}

	for (index, id) in ids.into_iter().enumerate() {
		let count = store.with_session(id, |session| session.step_count()).unwrap();
		assert_eq!(count, (index % 3) + 1);
	}
}

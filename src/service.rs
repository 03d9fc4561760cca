//! Запросы и ответы в том виде, в каком их видит клиент (JSON, поля в camelCase).

use std::borrow::Borrow;
use std::sync::{Arc, Mutex};

use itertools::Itertools;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::expr::*;
use crate::generator::{Difficulty, Exercise, ExerciseGenerator, ExerciseLimits, GenerationError};
use crate::parsing::{locate, parse_with_limits, ParseError, ParseLimits};
use crate::rules::{RuleId, RuleSet, RuleSetError};
use crate::session::{DerivationSession, SessionError, SessionId, SessionSettings, SessionState};
use crate::store::{SessionStore, StoreError};
use crate::utils::char_index::get_char_range;
use crate::utils::span::caret_line;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
	#[serde(rename_all = "camelCase")]
	NewExercise {
		#[serde(default)]
		difficulty: Difficulty,
		/// Своё начальное выражение вместо случайного.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		start_expression_text: Option<String>,
	},
	#[serde(rename_all = "camelCase")]
	SubmitStep {
		session_id: SessionId,
		candidate_expression_text: String,
	},
	#[serde(rename_all = "camelCase")]
	Undo { session_id: SessionId },
	#[serde(rename_all = "camelCase")]
	Redo { session_id: SessionId },
	#[serde(rename_all = "camelCase")]
	Hint { session_id: SessionId },
	#[serde(rename_all = "camelCase")]
	Next { session_id: SessionId },
	#[serde(rename_all = "camelCase")]
	Ready { session_id: SessionId },
	#[serde(rename_all = "camelCase")]
	Derivation { session_id: SessionId },
	#[serde(rename_all = "camelCase")]
	Reset { session_id: SessionId },
	#[serde(rename_all = "camelCase")]
	Abandon { session_id: SessionId },
	#[serde(rename_all = "camelCase")]
	Show { session_id: SessionId },
	#[serde(rename_all = "camelCase")]
	Close { session_id: SessionId },
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExerciseResponse {
	pub session_id: SessionId,
	pub difficulty: Difficulty,
	pub start_expression_text: String,
	pub new_state: SessionState,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitStepResponse {
	pub accepted: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
	/// Машиночитаемая причина отказа: `not-equivalent`, `no-rule-applies`, `parse-error` и т.д.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reason_code: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rule: Option<RuleId>,
	pub new_state: SessionState,
	pub step_count: usize,
	pub current_expression_text: String,
}

/// Ответ на undo, redo, reset, abandon и show.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResponse {
	pub new_state: SessionState,
	pub step_count: usize,
	pub current_expression_text: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HintResponse {
	pub rule: RuleId,
	pub rule_description: String,
	pub target_path_hint: ExprPositionOwned,
	/// Часть выражения, к которой применяется правило.
	pub target_text: String,
	pub expression_text: String,
	/// Строка из `^` под частью выражения, к которой применяется правило.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub target_marker: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
	pub solved: bool,
	pub in_dnf: bool,
	pub new_state: SessionState,
	pub message: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivationStepView {
	pub rule: RuleId,
	pub position: ExprPositionOwned,
	pub expression_text: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivationResponse {
	pub start_expression_text: String,
	pub steps: Vec<DerivationStepView>,
	pub complete: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedResponse {
	pub session_id: SessionId,
	pub closed: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ErrorResponse {
	pub error: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
	NewExercise(NewExerciseResponse),
	SubmitStep(SubmitStepResponse),
	Move(MoveResponse),
	Hint(HintResponse),
	Ready(ReadyResponse),
	Derivation(DerivationResponse),
	Closed(ClosedResponse),
	Error(ErrorResponse),
}

#[derive(Debug, Error)]
pub enum ServiceError {
	#[error("invalid rule set: {}", .0.iter().join("; "))]
	RuleSet(Vec<RuleSetError>),
	#[error("{0}")]
	Store(#[from] StoreError),
	#[error("can't create exercise: {0}")]
	Generation(#[from] GenerationError),
	#[error("can't parse start expression: {0}")]
	Parse(#[from] ParseError),
	#[error("{0}")]
	Session(#[from] SessionError),
	#[error("can't read request: {0}")]
	Request(#[from] serde_json::Error),
	#[error("exercise generator lock is poisoned")]
	Poisoned,
}

/// Машиночитаемое имя причины отказа.
fn reason_code(error: &SessionError) -> &'static str {
	use crate::validator::InvalidStepReason::*;
	match error {
		SessionError::InvalidStep(NoRuleApplies) => "no-rule-applies",
		SessionError::InvalidStep(NotEquivalent) => "not-equivalent",
		SessionError::InvalidStep(Unchanged) => "unchanged",
		SessionError::InvalidStep(TooManyVariables(_)) => "too-many-variables",
		SessionError::AlreadySolved => "already-solved",
		SessionError::Abandoned => "abandoned",
		SessionError::AtStart => "at-start",
		SessionError::AtEnd => "at-end",
		SessionError::NoHint => "no-hint",
	}
}

fn move_response(session: &DerivationSession, note: Option<String>) -> MoveResponse {
	MoveResponse {
		new_state: session.state(),
		step_count: session.step_count(),
		current_expression_text: session.current().to_string(),
		note,
	}
}

fn rejected(session: &DerivationSession, reason: String, code: &str) -> SubmitStepResponse {
	SubmitStepResponse {
		accepted: false,
		reason: Some(reason),
		reason_code: Some(code.to_string()),
		rule: None,
		new_state: session.state(),
		step_count: session.step_count(),
		current_expression_text: session.current().to_string(),
	}
}

fn step_response(session: &DerivationSession, result: Result<RuleId, SessionError>) -> SubmitStepResponse {
	match result {
		Ok(rule) => SubmitStepResponse {
			accepted: true,
			reason: None,
			reason_code: None,
			rule: Some(rule),
			new_state: session.state(),
			step_count: session.step_count(),
			current_expression_text: session.current().to_string(),
		},
		Err(error) => rejected(session, error.to_string(), reason_code(&error)),
	}
}

/// Всё, что нужно клиенту: создание упражнений и работа с сессиями.
pub struct ExerciseService {
	store: SessionStore,
	rules: Arc<RuleSet>,
	generator: Mutex<ExerciseGenerator>,
	settings: SessionSettings,
	parse_limits: ParseLimits,
	exercise_limits: ExerciseLimits,
}

impl ExerciseService {
	pub fn new(config: &EngineConfig) -> Result<Self, ServiceError> {
		let rules = RuleSet::standard().map_err(ServiceError::RuleSet)?.without(&config.disabled_rules);
		Ok(ExerciseService {
			store: SessionStore::new(),
			rules: Arc::new(rules),
			generator: Mutex::new(ExerciseGenerator::from_config(&config.generator)),
			settings: SessionSettings::from(config),
			parse_limits: ParseLimits::from(config),
			exercise_limits: ExerciseLimits::from(config),
		})
	}

	pub fn store(&self) -> &SessionStore {
		&self.store
	}

	pub fn rules(&self) -> &Arc<RuleSet> {
		&self.rules
	}

	pub fn settings(&self) -> SessionSettings {
		self.settings
	}

	pub fn parse_limits(&self) -> ParseLimits {
		self.parse_limits
	}

	pub fn new_exercise(&self, difficulty: Difficulty, start_text: Option<&str>) -> Result<NewExerciseResponse, ServiceError> {
		let exercise = match start_text {
			Some(text) => Exercise::with_limits(parse_with_limits(text, &self.parse_limits)?, difficulty, &self.exercise_limits)?,
			None => self.generator.lock().map_err(|_| ServiceError::Poisoned)?.generate(difficulty).map_err(|err| {
				error!("can't generate {} exercise: {}", difficulty, err);
				err
			})?,
		};
		let session = DerivationSession::new(exercise, Arc::clone(&self.rules), self.settings);
		let response = NewExerciseResponse {
			session_id: session.id(),
			difficulty,
			start_expression_text: session.current().to_string(),
			new_state: session.state(),
		};
		self.store.insert(session)?;
		Ok(response)
	}

	/// Новое случайное упражнение вместо сессии `previous`, которая закрывается.
	pub fn replace_exercise(&self, previous: SessionId, difficulty: Difficulty) -> Result<NewExerciseResponse, ServiceError> {
		let response = self.new_exercise(difficulty, None)?;
		if let Err(err) = self.store.remove(previous) {
			let _ = self.store.remove(response.session_id);
			return Err(err.into());
		}
		Ok(response)
	}

	/// Неразобранный или неверный шаг не является ошибкой запроса: он просто не принимается.
	pub fn submit_step(&self, id: SessionId, candidate_text: &str) -> Result<SubmitStepResponse, ServiceError> {
		let candidate = parse_with_limits(candidate_text, &self.parse_limits);
		Ok(self.store.with_session(id, |session| match candidate {
			Ok(candidate) => {
				let result = session.submit_step(candidate).map(|step| step.rule);
				step_response(session, result)
			},
			Err(err) => {
				debug!("session {}: can't parse candidate: {}", id, err);
				rejected(session, err.to_string(), "parse-error")
			},
		})?)
	}

	pub fn undo(&self, id: SessionId) -> Result<MoveResponse, ServiceError> {
		self.store.with_session(id, |session| {
			let note = session.undo().err();
			Self::move_result(session, note)
		})?
	}

	pub fn redo(&self, id: SessionId) -> Result<MoveResponse, ServiceError> {
		self.store.with_session(id, |session| {
			let note = session.redo().err();
			Self::move_result(session, note)
		})?
	}

	/// Пустые undo/redo не ошибка, о них сообщается в `note`.
	fn move_result(session: &DerivationSession, error: Option<SessionError>) -> Result<MoveResponse, ServiceError> {
		match error {
			None => Ok(move_response(session, None)),
			Some(error) if error.is_no_op() => Ok(move_response(session, Some(error.to_string()))),
			Some(error) => Err(error.into()),
		}
	}

	pub fn hint(&self, id: SessionId) -> Result<HintResponse, ServiceError> {
		self.store.with_session(id, |session| {
			let hint = session.request_hint()?;
			let current = session.current();
			let target_text = current
				.subterm(hint.position.borrow())
				.map(|part| part.to_string())
				.unwrap_or_default();
			let (expression_text, target_marker) = match locate(current, hint.position.borrow()) {
				Some((text, span)) => {
					let marker = get_char_range(&text, span).map(caret_line);
					(text, marker)
				},
				None => (current.to_string(), None),
			};
			Ok(HintResponse {
				rule: hint.rule,
				rule_description: hint.description,
				target_path_hint: hint.position,
				target_text,
				expression_text,
				target_marker,
			})
		})?
	}

	/// Делает шаг за студента.
	pub fn next(&self, id: SessionId) -> Result<SubmitStepResponse, ServiceError> {
		self.store.with_session(id, |session| {
			let result = session.next_step().map(|step| step.rule);
			match result {
				Err(SessionError::NoHint) => Err(ServiceError::Session(SessionError::NoHint)),
				result => Ok(step_response(session, result)),
			}
		})?
	}

	pub fn ready(&self, id: SessionId) -> Result<ReadyResponse, ServiceError> {
		Ok(self.store.with_session(id, |session| {
			let verdict = session.ready();
			let message = match (verdict.solved, verdict.in_dnf) {
				(true, _) => "the expression is in DNF, the exercise is solved",
				(false, true) => "the expression is in DNF, but it is not the expected one",
				(false, false) => "the expression is not in DNF yet",
			};
			ReadyResponse {
				solved: verdict.solved,
				in_dnf: verdict.in_dnf,
				new_state: session.state(),
				message: message.to_string(),
			}
		})?)
	}

	pub fn derivation(&self, id: SessionId) -> Result<DerivationResponse, ServiceError> {
		Ok(self.store.with_session(id, |session| {
			let derivation = session.derivation();
			if !derivation.complete {
				warn!("session {}: derivation stopped after {} steps", id, derivation.steps.len());
			}
			DerivationResponse {
				start_expression_text: session.current().to_string(),
				steps: derivation
					.steps
					.into_iter()
					.map(|application| DerivationStepView {
						rule: application.rule,
						position: application.position,
						expression_text: application.result.to_string(),
					})
					.collect(),
				complete: derivation.complete,
			}
		})?)
	}

	pub fn reset(&self, id: SessionId) -> Result<MoveResponse, ServiceError> {
		Ok(self.store.with_session(id, |session| {
			session.reset();
			move_response(session, None)
		})?)
	}

	pub fn abandon(&self, id: SessionId) -> Result<MoveResponse, ServiceError> {
		Ok(self.store.with_session(id, |session| {
			session.abandon();
			move_response(session, None)
		})?)
	}

	pub fn show(&self, id: SessionId) -> Result<MoveResponse, ServiceError> {
		Ok(self.store.with_session(id, |session| move_response(session, None))?)
	}

	pub fn close(&self, id: SessionId) -> Result<ClosedResponse, ServiceError> {
		self.store.remove(id)?;
		Ok(ClosedResponse { session_id: id, closed: true })
	}

	/// Обрабатывает запрос. Ошибки превращаются в ответ вида `{"error": ...}`.
	pub fn handle(&self, request: Request) -> Response {
		let result = match request {
			Request::NewExercise { difficulty, start_expression_text } =>
				self.new_exercise(difficulty, start_expression_text.as_deref()).map(Response::NewExercise),
			Request::SubmitStep { session_id, candidate_expression_text } =>
				self.submit_step(session_id, &candidate_expression_text).map(Response::SubmitStep),
			Request::Undo { session_id } => self.undo(session_id).map(Response::Move),
			Request::Redo { session_id } => self.redo(session_id).map(Response::Move),
			Request::Hint { session_id } => self.hint(session_id).map(Response::Hint),
			Request::Next { session_id } => self.next(session_id).map(Response::SubmitStep),
			Request::Ready { session_id } => self.ready(session_id).map(Response::Ready),
			Request::Derivation { session_id } => self.derivation(session_id).map(Response::Derivation),
			Request::Reset { session_id } => self.reset(session_id).map(Response::Move),
			Request::Abandon { session_id } => self.abandon(session_id).map(Response::Move),
			Request::Show { session_id } => self.show(session_id).map(Response::Move),
			Request::Close { session_id } => self.close(session_id).map(Response::Closed),
		};
		result.unwrap_or_else(|err| {
			debug!("request failed: {}", err);
			Response::Error(ErrorResponse { error: err.to_string() })
		})
	}

	/// Одна строка JSON на входе, одна на выходе.
	pub fn handle_json(&self, line: &str) -> String {
		let response = match serde_json::from_str::<Request>(line) {
			Ok(request) => self.handle(request),
			Err(err) => Response::Error(ErrorResponse { error: ServiceError::from(err).to_string() }),
		};
		serde_json::to_string(&response)
			.unwrap_or_else(|err| format!(r#"{{"error":"can't serialize response: {}"}}"#, err))
	}
}

//! Состояние одного упражнения: история шагов, курсор для отмены и повтора, подсказки.
//!
//! Сессия меняется только через `submit_step`, `undo`, `redo`, `reset` и `abandon`. Отменённые шаги остаются в истории, пока новый шаг не отбросит их.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::expr::*;
use crate::generator::{Exercise, GenerationError};
use crate::normal_form::{equivalent_to, is_dnf, logically_equivalent};
use crate::rules::{Application, RuleId, RuleSet};
use crate::validator::{InvalidStepReason, StepValidator};

/// Непрозрачный идентификатор сессии.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
	pub fn new() -> Self {
		SessionId(Uuid::new_v4())
	}
}

impl Default for SessionId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl FromStr for SessionId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(SessionId)
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
	InProgress,
	Solved,
	Abandoned,
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			SessionState::InProgress => "in progress",
			SessionState::Solved => "solved",
			SessionState::Abandoned => "abandoned",
		})
	}
}

/// Принятый шаг.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Step {
	pub from: Expression,
	pub to: Expression,
	pub rule: RuleId,
	pub position: ExprPositionOwned,
	pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum SessionError {
	#[error("already at the start of the derivation")]
	AtStart,
	#[error("already at the end of the derivation")]
	AtEnd,
	#[error("the exercise is already solved, go back to change the derivation")]
	AlreadySolved,
	#[error("the exercise was abandoned")]
	Abandoned,
	#[error("no rule applies to the current expression")]
	NoHint,
	#[error("{0}")]
	InvalidStep(#[from] InvalidStepReason),
}

impl SessionError {
	/// Эти ошибки только сообщают, что ничего не произошло.
	pub fn is_no_op(&self) -> bool {
		matches!(self, SessionError::AtStart | SessionError::AtEnd | SessionError::AlreadySolved)
	}
}

/// Подсказка: какое правило и где применить, и что получится.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Hint {
	pub rule: RuleId,
	pub description: String,
	pub position: ExprPositionOwned,
	pub result: Expression,
}

impl From<Application> for Hint {
	fn from(application: Application) -> Self {
		Hint {
			rule: application.rule,
			description: application.rule.description().to_string(),
			position: application.position,
			result: application.result,
		}
	}
}

/// Решение, показываемое студенту. `complete` ложно, если правила закончились или решение оказалось слишком длинным.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Derivation {
	pub steps: Vec<Application>,
	pub complete: bool,
}

/// Ответ на "готово".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReadyVerdict {
	pub solved: bool,
	pub in_dnf: bool,
}

/// Ограничения сессии, берутся из `EngineConfig`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SessionSettings {
	pub max_truth_table_variables: usize,
	pub max_derivation_steps: usize,
}

impl Default for SessionSettings {
	fn default() -> Self {
		Self::from(&EngineConfig::default())
	}
}

impl From<&EngineConfig> for SessionSettings {
	fn from(config: &EngineConfig) -> Self {
		SessionSettings {
			max_truth_table_variables: config.max_truth_table_variables,
			max_derivation_steps: config.max_derivation_steps,
		}
	}
}

pub const SNAPSHOT_VERSION: u32 = 1;

/// Сериализуемое состояние сессии. Набор правил не сохраняется.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
	pub version: u32,
	pub id: SessionId,
	pub exercise: Exercise,
	pub steps: Vec<Step>,
	pub cursor: usize,
	pub state: SessionState,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
	#[error("unsupported snapshot version {found}, supported: {supported}")]
	UnsupportedVersion {
		found: u32,
		supported: u32,
	},
	#[error("cursor {cursor} is past the end of history of {len} steps")]
	CursorOutOfRange {
		cursor: usize,
		len: usize,
	},
	#[error("step {index} does not start where the previous one ended")]
	BrokenChain {
		index: usize,
	},
	#[error("step {index} is not valid: {reason}")]
	InvalidStep {
		index: usize,
		reason: InvalidStepReason,
	},
	#[error("snapshot contains a malformed expression")]
	MalformedExpression,
	#[error("snapshot exercise is invalid: {0}")]
	InvalidExercise(#[source] GenerationError),
}

pub struct DerivationSession {
	id: SessionId,
	exercise: Exercise,
	steps: Vec<Step>,
	cursor: usize,
	state: SessionState,
	rules: Arc<RuleSet>,
	settings: SessionSettings,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl fmt::Debug for DerivationSession {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DerivationSession")
			.field("id", &self.id)
			.field("start", &self.exercise.start.to_string())
			.field("current", &self.current().to_string())
			.field("cursor", &self.cursor)
			.field("history_len", &self.steps.len())
			.field("state", &self.state)
			.finish()
	}
}

impl DerivationSession {
	pub fn new(exercise: Exercise, rules: Arc<RuleSet>, settings: SessionSettings) -> Self {
		let now = Utc::now();
		// Начало упражнения никогда не в ДНФ, так что сессия начинается нерешённой.
		let session = DerivationSession {
			id: SessionId::new(),
			exercise,
			steps: Vec::new(),
			cursor: 0,
			state: SessionState::InProgress,
			rules,
			settings,
			created_at: now,
			updated_at: now,
		};
		info!("session {} started with `{}`", session.id, session.exercise.start);
		session
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn exercise(&self) -> &Exercise {
		&self.exercise
	}

	pub fn target(&self) -> &Expression {
		&self.exercise.target
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	pub fn cursor(&self) -> usize {
		self.cursor
	}

	/// Число шагов до курсора.
	pub fn step_count(&self) -> usize {
		self.cursor
	}

	/// Число шагов в истории, включая отменённые.
	pub fn history_len(&self) -> usize {
		self.steps.len()
	}

	/// Шаги до курсора.
	pub fn steps(&self) -> &[Step] {
		&self.steps[..self.cursor]
	}

	pub fn history(&self) -> &[Step] {
		&self.steps
	}

	pub fn current(&self) -> &Expression {
		match self.cursor.checked_sub(1).and_then(|index| self.steps.get(index)) {
			Some(step) => &step.to,
			None => &self.exercise.start,
		}
	}

	fn validator(&self) -> StepValidator<'_> {
		StepValidator::new(&self.rules, self.settings.max_truth_table_variables)
	}

	/// Решено, если выражение совпадает с целью с точностью до перестановок или само является равносильной ей ДНФ.
	fn is_solution(&self, expr: &Expression) -> bool {
		equivalent_to(expr, &self.exercise.target)
			|| (is_dnf(expr)
				&& logically_equivalent(expr, &self.exercise.target, self.settings.max_truth_table_variables).unwrap_or(false))
	}

	fn recompute_state(&mut self) {
		if self.state == SessionState::Abandoned {
			return;
		}
		self.state = if self.is_solution(self.current()) {
			SessionState::Solved
		} else {
			SessionState::InProgress
		};
	}

	fn touch(&mut self) {
		self.updated_at = Utc::now();
	}

	fn ensure_in_progress(&self) -> Result<(), SessionError> {
		match self.state {
			SessionState::InProgress => Ok(()),
			SessionState::Solved => Err(SessionError::AlreadySolved),
			SessionState::Abandoned => Err(SessionError::Abandoned),
		}
	}

	/// Проверяет шаг и, если он верный, добавляет его после курсора, отбрасывая отменённые шаги.
	pub fn submit_step(&mut self, candidate: Expression) -> Result<&Step, SessionError> {
		self.ensure_in_progress()?;
		let from = self.current().clone();
		let justification = self.validator().validate(&from, &candidate).map_err(|reason| {
			debug!("session {}: `{}` rejected: {}", self.id, candidate, reason);
			reason
		})?;

		self.steps.truncate(self.cursor);
		self.steps.push(Step {
			from,
			to: candidate,
			rule: justification.rule,
			position: justification.position,
			timestamp: Utc::now(),
		});
		self.cursor = self.steps.len();
		self.recompute_state();
		self.touch();

		let step = &self.steps[self.cursor - 1];
		info!("session {}: step {} by {}, now {}", self.id, self.cursor, step.rule, self.state);
		Ok(step)
	}

	pub fn undo(&mut self) -> Result<usize, SessionError> {
		if self.state == SessionState::Abandoned {
			return Err(SessionError::Abandoned);
		}
		if self.cursor == 0 {
			return Err(SessionError::AtStart);
		}
		self.cursor -= 1;
		self.recompute_state();
		self.touch();
		debug!("session {}: undo to {}", self.id, self.cursor);
		Ok(self.cursor)
	}

	pub fn redo(&mut self) -> Result<usize, SessionError> {
		if self.state == SessionState::Abandoned {
			return Err(SessionError::Abandoned);
		}
		if self.cursor >= self.steps.len() {
			return Err(SessionError::AtEnd);
		}
		self.cursor += 1;
		self.recompute_state();
		self.touch();
		debug!("session {}: redo to {}", self.id, self.cursor);
		Ok(self.cursor)
	}

	/// Первое по порядку правил применение, которое ещё не пробовали отсюда.
	/// Пробовали, значит следующий после курсора шаг истории уже был таким, а потом его отменили. Если пробовали всё, предлагается первое.
	pub fn request_hint(&self) -> Result<Hint, SessionError> {
		self.ensure_in_progress()?;
		let current = self.current();
		let tried = self.steps.get(self.cursor).filter(|step| step.from == *current);

		let mut first = None;
		for application in self.rules.applications(current) {
			let already_tried = tried.map(|step| equivalent_to(&step.to, &application.result)).unwrap_or(false);
			if !already_tried {
				return Ok(application.into());
			}
			if first.is_none() {
				first = Some(application);
			}
		}
		first.map(Hint::from).ok_or(SessionError::NoHint)
	}

	/// Делает шаг из подсказки.
	pub fn next_step(&mut self) -> Result<&Step, SessionError> {
		let hint = self.request_hint()?;
		self.submit_step(hint.result)
	}

	/// Решение от текущего выражения, по тем же правилам, что и подсказки. Сессию не меняет.
	pub fn derivation(&self) -> Derivation {
		let mut steps: Vec<Application> = Vec::new();
		let mut current = self.current().clone();
		while !self.is_solution(&current) && steps.len() < self.settings.max_derivation_steps {
			match self.rules.first_application(&current) {
				Some(application) => {
					current = application.result.clone();
					steps.push(application);
				},
				None => break,
			}
		}
		Derivation { complete: self.is_solution(&current), steps }
	}

	pub fn ready(&self) -> ReadyVerdict {
		let current = self.current();
		ReadyVerdict {
			solved: self.is_solution(current),
			in_dnf: is_dnf(current),
		}
	}

	pub fn reset(&mut self) {
		self.steps.clear();
		self.cursor = 0;
		self.state = SessionState::InProgress;
		self.touch();
		info!("session {} reset", self.id);
	}

	pub fn abandon(&mut self) {
		self.state = SessionState::Abandoned;
		self.touch();
		info!("session {} abandoned", self.id);
	}

	pub fn snapshot(&self) -> SessionSnapshot {
		SessionSnapshot {
			version: SNAPSHOT_VERSION,
			id: self.id,
			exercise: self.exercise.clone(),
			steps: self.steps.clone(),
			cursor: self.cursor,
			state: self.state,
			created_at: self.created_at,
			updated_at: self.updated_at,
		}
	}

	/// Восстанавливает сессию, заново проверяя каждый шаг истории.
	pub fn restore(snapshot: SessionSnapshot, rules: Arc<RuleSet>, settings: SessionSettings) -> Result<Self, SnapshotError> {
		if snapshot.version != SNAPSHOT_VERSION {
			return Err(SnapshotError::UnsupportedVersion { found: snapshot.version, supported: SNAPSHOT_VERSION });
		}
		if snapshot.cursor > snapshot.steps.len() {
			return Err(SnapshotError::CursorOutOfRange { cursor: snapshot.cursor, len: snapshot.steps.len() });
		}
		snapshot
			.exercise
			.check(settings.max_truth_table_variables)
			.map_err(SnapshotError::InvalidExercise)?;
		if !snapshot.steps.iter().all(|step| step.from.is_well_formed() && step.to.is_well_formed()) {
			return Err(SnapshotError::MalformedExpression);
		}

		let validator = StepValidator::new(&rules, settings.max_truth_table_variables);
		let mut previous = &snapshot.exercise.start;
		for (index, step) in snapshot.steps.iter().enumerate() {
			if step.from != *previous {
				return Err(SnapshotError::BrokenChain { index });
			}
			validator
				.validate(&step.from, &step.to)
				.map_err(|reason| SnapshotError::InvalidStep { index, reason })?;
			previous = &step.to;
		}

		let mut session = DerivationSession {
			id: snapshot.id,
			exercise: snapshot.exercise,
			steps: snapshot.steps,
			cursor: snapshot.cursor,
			state: snapshot.state,
			rules,
			settings,
			created_at: snapshot.created_at,
			updated_at: snapshot.updated_at,
		};
		session.recompute_state();
		info!("session {} restored at step {}", session.id, session.cursor);
		Ok(session)
	}
}

pub mod binding;
pub mod config;
pub mod expr;
pub mod generator;
pub mod normal_form;
pub mod parsing;
pub mod rules;
pub mod service;
pub mod session;
pub mod store;
pub mod utils;
pub mod validator;

pub use crate::config::EngineConfig;
pub use crate::expr::Expression;
pub use crate::generator::{Difficulty, Exercise, ExerciseGenerator};
pub use crate::rules::{RuleId, RuleSet};
pub use crate::service::{ExerciseService, Request, Response};
pub use crate::session::{DerivationSession, SessionId, SessionState};
pub use crate::validator::{InvalidStepReason, StepValidator};

/// Проверяет один шаг стандартными правилами: разбирает оба выражения и ищет правило, которое переводит одно в другое.
/// Ошибка разбора выводится как сниппет с подчёркнутым местом.
pub fn check_step(from: &str, to: &str, color: bool) -> Result<validator::Justification, String> {
	use crate::parsing::parse;

	let from_expr = parse(from).map_err(|err| err.snippet(from, color))?;
	let to_expr = parse(to).map_err(|err| err.snippet(to, color))?;
	let rules = RuleSet::standard().map_err(|errs| errs.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))?;
	StepValidator::new(&rules, EngineConfig::default().max_truth_table_variables)
		.validate(&from_expr, &to_expr)
		.map_err(|reason| reason.to_string())
}

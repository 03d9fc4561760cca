use std::fmt;
use std::str::FromStr;

use log::{debug, error, warn};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{EngineConfig, GeneratorConfig};
use crate::expr::*;
use crate::normal_form::{check_variable_count, is_dnf, logically_equivalent, to_dnf_bounded, TooManyTerms, TooManyVariables, MAX_TRUTH_TABLE_VARIABLES};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Difficulty {
	Easy,
	Normal,
	Difficult,
}

impl Default for Difficulty {
	fn default() -> Self {
		Difficulty::Normal
	}
}

impl fmt::Display for Difficulty {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Difficulty::Easy => "easy",
			Difficulty::Normal => "normal",
			Difficulty::Difficult => "difficult",
		})
	}
}

#[derive(Debug, Error)]
#[error("unknown difficulty `{0}`, expected easy, normal or difficult")]
pub struct UnknownDifficulty(String);

impl FromStr for Difficulty {
	type Err = UnknownDifficulty;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"easy" => Ok(Difficulty::Easy),
			"normal" | "medium" => Ok(Difficulty::Normal),
			"difficult" | "hard" => Ok(Difficulty::Difficult),
			_ => Err(UnknownDifficulty(s.to_string())),
		}
	}
}

struct Params {
	depth: usize,
	variables: &'static [&'static str],
	connectives: &'static [Connective],
}

impl Difficulty {
	fn params(self) -> Params {
		match self {
			Difficulty::Easy => Params {
				depth: 2,
				variables: &["p", "q"],
				connectives: &[Connective::Not, Connective::And, Connective::Or],
			},
			Difficulty::Normal => Params {
				depth: 3,
				variables: &["p", "q", "r"],
				connectives: &[Connective::Not, Connective::And, Connective::Or, Connective::Implies],
			},
			Difficulty::Difficult => Params {
				depth: 4,
				variables: &["p", "q", "r", "s"],
				connectives: &[Connective::Not, Connective::And, Connective::Or, Connective::Implies, Connective::Equivalent],
			},
		}
	}
}

/// Упражнение: начальное выражение и его ДНФ.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
	pub id: Uuid,
	pub difficulty: Difficulty,
	pub start: Expression,
	pub target: Expression,
}

#[derive(Debug, Error)]
pub enum GenerationError {
	#[error("expression `{0}` is malformed")]
	Malformed(Expression),
	#[error("expression `{0}` is already in DNF")]
	AlreadyInDnf(Expression),
	#[error("normal form `{target}` of `{start}` is not an equivalent DNF")]
	InvariantViolated {
		start: Expression,
		target: Expression,
	},
	#[error("{0}")]
	TooManyVariables(#[from] TooManyVariables),
	#[error("{0}")]
	TooManyTerms(#[from] TooManyTerms),
	#[error("no {difficulty} exercise found in {attempts} attempts")]
	Exhausted {
		difficulty: Difficulty,
		attempts: usize,
	},
}

/// Ограничения на упражнение: сколько переменных в таблице истинности и конъюнкций в цели.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExerciseLimits {
	pub max_variables: usize,
	pub max_target_terms: usize,
}

impl Default for ExerciseLimits {
	fn default() -> Self {
		Self::from(&EngineConfig::default())
	}
}

impl From<&EngineConfig> for ExerciseLimits {
	fn from(config: &EngineConfig) -> Self {
		ExerciseLimits {
			max_variables: config.max_truth_table_variables,
			max_target_terms: config.generator.max_target_terms,
		}
	}
}

impl Exercise {
	/// Упражнение с заданным началом и ограничениями по умолчанию; цель вычисляется.
	pub fn new(start: Expression, difficulty: Difficulty) -> Result<Exercise, GenerationError> {
		Self::with_limits(start, difficulty, &ExerciseLimits::default())
	}

	/// Размеры проверяются до построения ДНФ: она может быть экспоненциально больше начала.
	pub fn with_limits(start: Expression, difficulty: Difficulty, limits: &ExerciseLimits) -> Result<Exercise, GenerationError> {
		check_start(&start)?;
		check_variable_count(start.variables().len(), limits.max_variables)?;
		let target = to_dnf_bounded(&start, limits.max_target_terms)?;
		let exercise = Exercise { id: Uuid::new_v4(), difficulty, start, target };
		exercise.check(limits.max_variables)?;
		Ok(exercise)
	}

	/// Начало не в ДНФ, цель в ДНФ и равносильна началу.
	pub fn check(&self, max_variables: usize) -> Result<(), GenerationError> {
		check_start(&self.start)?;
		if !self.target.is_well_formed() {
			return Err(GenerationError::Malformed(self.target.clone()));
		}
		if !is_dnf(&self.target) || !logically_equivalent(&self.start, &self.target, max_variables)? {
			error!("`{}` is not a normal form of `{}`", self.target, self.start);
			return Err(GenerationError::InvariantViolated { start: self.start.clone(), target: self.target.clone() });
		}
		Ok(())
	}
}

fn check_start(start: &Expression) -> Result<(), GenerationError> {
	if !start.is_well_formed() {
		return Err(GenerationError::Malformed(start.clone()));
	}
	if is_dnf(start) {
		return Err(GenerationError::AlreadyInDnf(start.clone()));
	}
	Ok(())
}

pub struct ExerciseGenerator<R: Rng = ChaCha8Rng> {
	rng: R,
	config: GeneratorConfig,
	limits: ExerciseLimits,
}

impl ExerciseGenerator<ChaCha8Rng> {
	pub fn from_config(config: &GeneratorConfig) -> Self {
		let rng = match config.seed {
			Some(seed) => ChaCha8Rng::seed_from_u64(seed),
			None => ChaCha8Rng::from_entropy(),
		};
		Self::new(rng, config.clone())
	}
}

impl<R: Rng> ExerciseGenerator<R> {
	pub fn new(rng: R, config: GeneratorConfig) -> Self {
		let limits = ExerciseLimits {
			max_variables: MAX_TRUTH_TABLE_VARIABLES,
			max_target_terms: config.max_target_terms,
		};
		ExerciseGenerator { rng, config, limits }
	}

	/// Случайное выражение не в ДНФ, у которого ДНФ не слишком большая.
	pub fn generate(&mut self, difficulty: Difficulty) -> Result<Exercise, GenerationError> {
		let params = difficulty.params();
		for attempt in 0..self.config.max_attempts {
			let candidate = self.random_compound(&params, params.depth);
			match Exercise::with_limits(candidate, difficulty, &self.limits) {
				Ok(exercise) => {
					debug!("generated {} exercise `{}`, target `{}`", difficulty, exercise.start, exercise.target);
					return Ok(exercise);
				},
				Err(err @ GenerationError::InvariantViolated { .. }) => return Err(err),
				Err(err) => debug!("attempt {}: {}", attempt, err),
			}
		}

		warn!("no {} exercise found in {} attempts", difficulty, self.config.max_attempts);
		Err(GenerationError::Exhausted { difficulty, attempts: self.config.max_attempts })
	}

	fn random_leaf(&mut self, params: &Params) -> Expression {
		if self.rng.gen_bool(0.05) {
			Expression::constant(self.rng.gen_bool(0.5))
		} else {
			let name = params.variables.choose(&mut self.rng).copied().unwrap_or("p");
			Expression::var(name)
		}
	}

	fn random_expression(&mut self, params: &Params, depth: usize) -> Expression {
		if depth == 0 || self.rng.gen_bool(0.3) {
			self.random_leaf(params)
		} else {
			self.random_compound(params, depth)
		}
	}

	fn random_compound(&mut self, params: &Params, depth: usize) -> Expression {
		let depth = depth.max(1);
		let connective = params.connectives.choose(&mut self.rng).copied().unwrap_or(Connective::And);
		let args = (0..connective.arity())
			.map(|_| self.random_expression(params, depth - 1))
			.collect();
		Expression::compound(connective, args)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::normal_form::dnf_size;
	use crate::parsing::parse;
	use test_log::test;

	fn seeded(seed: u64) -> ExerciseGenerator {
		ExerciseGenerator::from_config(&GeneratorConfig { seed: Some(seed), ..GeneratorConfig::default() })
	}

	#[test]
	fn same_seed_same_exercise() {
		let first = seeded(42).generate(Difficulty::Normal).unwrap();
		let second = seeded(42).generate(Difficulty::Normal).unwrap();
		assert_eq!(first.start, second.start);
		assert_eq!(first.target, second.target);
	}

	#[test]
	fn generated_exercises_are_well_formed() {
		let mut generator = seeded(1);
		for difficulty in [Difficulty::Easy, Difficulty::Normal, Difficulty::Difficult].iter() {
			for _ in 0..30 {
				let exercise = generator.generate(*difficulty).unwrap();
				assert!(exercise.start.is_well_formed());
				assert!(!is_dnf(&exercise.start), "{} is already in DNF", exercise.start);
				assert!(is_dnf(&exercise.target), "{} is not in DNF", exercise.target);
				assert!(logically_equivalent(&exercise.start, &exercise.target, 12).unwrap());
				assert!(dnf_size(&exercise.target) <= GeneratorConfig::default().max_target_terms);
			}
		}
	}

	#[test]
	fn difficulty_parses() {
		assert_eq!("Hard".parse::<Difficulty>().unwrap(), Difficulty::Difficult);
		assert_eq!("easy".parse::<Difficulty>().unwrap(), Difficulty::Easy);
		assert!("impossible".parse::<Difficulty>().is_err());
	}

	#[test]
	fn custom_exercise_target() {
		let exercise = Exercise::new(parse("A AND (B OR C)").unwrap(), Difficulty::Easy).unwrap();
		assert_eq!(exercise.target, parse("A AND B OR A AND C").unwrap());
	}

	#[test]
	fn custom_start_limits() {
		assert!(matches!(
			Exercise::new(parse("A OR B").unwrap(), Difficulty::Easy),
			Err(GenerationError::AlreadyInDnf(_))
		));

		let limits = ExerciseLimits { max_variables: 6, max_target_terms: 4 };
		let wide = parse("(a OR b) AND (c OR d) AND (e OR f) AND (g OR h)").unwrap();
		assert!(matches!(
			Exercise::with_limits(wide, Difficulty::Normal, &limits),
			Err(GenerationError::TooManyVariables(_))
		));
		let long = parse("(a OR b) AND (c OR d) AND (e OR f)").unwrap();
		assert!(matches!(
			Exercise::with_limits(long, Difficulty::Normal, &limits),
			Err(GenerationError::TooManyTerms(TooManyTerms { limit: 4 }))
		));
	}

	#[test]
	fn tampered_target_is_caught() {
		let mut exercise = Exercise::new(parse("NOT (A AND B)").unwrap(), Difficulty::Easy).unwrap();
		assert!(exercise.check(12).is_ok());
		exercise.target = parse("A AND B").unwrap();
		assert!(matches!(exercise.check(12), Err(GenerationError::InvariantViolated { .. })));
		exercise.target = parse("NOT (A OR B)").unwrap();
		assert!(matches!(exercise.check(12), Err(GenerationError::InvariantViolated { .. })));
	}

	#[test]
	fn exhausted_attempts_are_an_error() {
		// Любая ДНФ содержит хотя бы одну конъюнкцию.
		let config = GeneratorConfig { seed: Some(5), max_attempts: 4, max_target_terms: 0 };
		let error = ExerciseGenerator::from_config(&config).generate(Difficulty::Easy).unwrap_err();
		assert!(matches!(error, GenerationError::Exhausted { difficulty: Difficulty::Easy, attempts: 4 }));
	}
}

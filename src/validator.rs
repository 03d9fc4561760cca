use std::borrow::Borrow;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expr::*;
use crate::normal_form::{canonical, collect_operands, equivalent_to, logically_equivalent, rebuild_chain, TooManyVariables};
use crate::rules::{RuleId, RuleSet};

/// Почему шаг не принят.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidStepReason {
	#[error("the expression is equivalent, but no single rule application leads to it")]
	NoRuleApplies,
	#[error("the expression is not equivalent to the previous one")]
	NotEquivalent,
	#[error("the expression is the same as the previous one")]
	Unchanged,
	#[error("{0}")]
	TooManyVariables(TooManyVariables),
}

impl From<TooManyVariables> for InvalidStepReason {
	fn from(error: TooManyVariables) -> Self {
		InvalidStepReason::TooManyVariables(error)
	}
}

/// Какое правило и где обосновывает шаг.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Justification {
	pub rule: RuleId,
	pub position: ExprPositionOwned,
}

pub struct StepValidator<'a> {
	rules: &'a RuleSet,
	max_variables: usize,
}

impl<'a> StepValidator<'a> {
	pub fn new(rules: &'a RuleSet, max_variables: usize) -> Self {
		StepValidator { rules, max_variables }
	}

	/// Находит первое по порядку объявления правило, применение которого к какой-то части `from` даёт `to` с точностью до перестановок.
	pub fn validate(&self, from: &Expression, to: &Expression) -> Result<Justification, InvalidStepReason> {
		if equivalent_to(from, to) {
			return Err(InvalidStepReason::Unchanged);
		}
		if !logically_equivalent(from, to, self.max_variables)? {
			debug!("`{}` is not equivalent to `{}`", to, from);
			return Err(InvalidStepReason::NotEquivalent);
		}

		let to = canonical(to);
		let mut sources = vec![from.clone()];
		let canonical_from = canonical(from);
		if canonical_from != *from {
			sources.push(canonical_from);
		}
		sources.extend(regroupings(from));

		for rule in self.rules.rules() {
			for source in &sources {
				let found = rule
					.applications(source)
					.into_iter()
					.find(|application| canonical(&application.result) == to);
				if let Some(application) = found {
					debug!("step to `{}` justified by {} at {}", to, rule.id(), application.position);
					return Ok(Justification { rule: rule.id(), position: application.position });
				}
			}
		}

		Err(InvalidStepReason::NoRuleApplies)
	}
}

/// Варианты выражения, в которых два аргумента какой-нибудь цепочки `AND`/`OR` стоят рядом: `a OR b OR c` даёт `(a OR c) OR b` и т.д.
/// Так правило `p OR NOT p` находится и тогда, когда `p` и `NOT p` в цепочке не соседи.
fn regroupings(expr: &Expression) -> Vec<Expression> {
	let mut result = Vec::new();
	for position in expr.positions() {
		let part = match expr.subterm(position.borrow()) {
			Ok(part) => part,
			Err(_) => continue,
		};
		let connective = match part.connective() {
			Some(connective) if connective.is_associative() => connective,
			_ => continue,
		};
		// Берём только начало цепочки.
		if let Some((_, parent)) = position.0.split_last() {
			if expr.subterm(ExprPosition::from_slice(parent)).ok().and_then(Expression::connective) == Some(connective) {
				continue;
			}
		}

		let mut operands = Vec::new();
		collect_operands(part.clone(), connective, &mut operands);
		if operands.len() < 3 {
			continue;
		}

		for (i, j) in (0..operands.len()).tuple_combinations() {
			let pair = Expression::compound(connective, vec![operands[i].clone(), operands[j].clone()]);
			let rest: Vec<Expression> = operands
				.iter()
				.enumerate()
				.filter(|(index, _)| *index != i && *index != j)
				.map(|(_, operand)| operand.clone())
				.collect();
			let regrouped = match rebuild_chain(connective, rest) {
				Some(rest) => Expression::compound(connective, vec![pair, rest]),
				None => continue,
			};
			if let Ok(whole) = expr.replace(position.borrow(), regrouped) {
				result.push(whole);
			}
		}
	}
	result
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parsing::parse;
	use test_log::test;

	fn validate(from: &str, to: &str) -> Result<Justification, InvalidStepReason> {
		let rules = RuleSet::standard().unwrap();
		StepValidator::new(&rules, 12).validate(&parse(from).unwrap(), &parse(to).unwrap())
	}

	#[test]
	fn distribution_is_found() {
		let justification = validate("A AND (B OR C)", "(A AND B) OR (A AND C)").unwrap();
		assert_eq!(justification.rule, RuleId::Distribution);
		assert_eq!(justification.position, ExprPositionOwned(vec![]));
	}

	#[test]
	fn reordered_result_is_accepted() {
		let justification = validate("A AND (B OR C)", "(C AND A) OR (B AND A)").unwrap();
		assert_eq!(justification.rule, RuleId::Distribution);
	}

	#[test]
	fn inner_step_records_position() {
		let justification = validate("A OR NOT (B AND C)", "A OR NOT B OR NOT C").unwrap();
		assert_eq!(justification.rule, RuleId::DeMorganAnd);
		assert_eq!(justification.position, ExprPositionOwned(vec![1]));
	}

	#[test]
	fn reasons_are_distinguished() {
		assert_eq!(validate("NOT (A AND B)", "A AND B"), Err(InvalidStepReason::NotEquivalent));
		assert_eq!(validate("NOT NOT A", "NOT A"), Err(InvalidStepReason::NotEquivalent));
		assert_eq!(validate("A AND B", "B AND A"), Err(InvalidStepReason::Unchanged));
		// Два шага сразу: снять двойное отрицание и применить де Моргана.
		assert_eq!(validate("NOT NOT NOT (A AND B)", "NOT A OR NOT B"), Err(InvalidStepReason::NoRuleApplies));
	}

	#[test]
	fn first_rule_in_declaration_order_wins() {
		// Подходит и `idempotency`, но `true-conjunction` объявлено раньше.
		let justification = validate("TRUE AND TRUE", "TRUE").unwrap();
		assert_eq!(justification.rule, RuleId::TrueConjunction);
	}

	#[test]
	fn pair_inside_chain_is_found() {
		let justification = validate("A OR B OR NOT A", "TRUE OR B").unwrap();
		assert_eq!(justification.rule, RuleId::ComplementDisjunction);

		let justification = validate("A AND B AND (C OR D)", "A AND B AND C OR A AND B AND D").unwrap();
		assert_eq!(justification.rule, RuleId::Distribution);
	}

	#[test]
	fn truth_table_limit_is_reported() {
		let rules = RuleSet::standard().unwrap();
		let result = StepValidator::new(&rules, 2)
			.validate(&parse("A AND B AND C").unwrap(), &parse("A AND B").unwrap());
		assert_eq!(result, Err(InvalidStepReason::TooManyVariables(TooManyVariables { count: 3, limit: 2 })));
	}
}

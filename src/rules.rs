use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::binding::{Formula, FormulaError};
use crate::expr::*;
use crate::normal_form::{logically_equivalent, MAX_TRUTH_TABLE_VARIABLES};

/// Имя правила. Порядок объявления совпадает с порядком, в котором правила предлагаются в подсказках.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleId {
	ConstantNegation,
	TrueConjunction,
	FalseConjunction,
	TrueDisjunction,
	FalseDisjunction,
	ComplementConjunction,
	ComplementDisjunction,
	DoubleNegation,
	ImplicationElimination,
	EquivalenceElimination,
	DeMorganAnd,
	DeMorganOr,
	Idempotency,
	Absorption,
	Distribution,
}

impl RuleId {
	pub const ALL: [RuleId; 15] = [
		RuleId::ConstantNegation,
		RuleId::TrueConjunction,
		RuleId::FalseConjunction,
		RuleId::TrueDisjunction,
		RuleId::FalseDisjunction,
		RuleId::ComplementConjunction,
		RuleId::ComplementDisjunction,
		RuleId::DoubleNegation,
		RuleId::ImplicationElimination,
		RuleId::EquivalenceElimination,
		RuleId::DeMorganAnd,
		RuleId::DeMorganOr,
		RuleId::Idempotency,
		RuleId::Absorption,
		RuleId::Distribution,
	];

	pub fn name(self) -> &'static str {
		match self {
			RuleId::ConstantNegation => "constant-negation",
			RuleId::TrueConjunction => "true-conjunction",
			RuleId::FalseConjunction => "false-conjunction",
			RuleId::TrueDisjunction => "true-disjunction",
			RuleId::FalseDisjunction => "false-disjunction",
			RuleId::ComplementConjunction => "complement-conjunction",
			RuleId::ComplementDisjunction => "complement-disjunction",
			RuleId::DoubleNegation => "double-negation",
			RuleId::ImplicationElimination => "implication-elimination",
			RuleId::EquivalenceElimination => "equivalence-elimination",
			RuleId::DeMorganAnd => "de-morgan-and",
			RuleId::DeMorganOr => "de-morgan-or",
			RuleId::Idempotency => "idempotency",
			RuleId::Absorption => "absorption",
			RuleId::Distribution => "distribution",
		}
	}

	/// Текст, который показывается студенту в подсказке.
	pub fn description(self) -> &'static str {
		match self {
			RuleId::ConstantNegation => "Negate a constant: NOT TRUE is FALSE, NOT FALSE is TRUE",
			RuleId::TrueConjunction => "TRUE is neutral for AND: p AND TRUE is p",
			RuleId::FalseConjunction => "FALSE absorbs AND: p AND FALSE is FALSE",
			RuleId::TrueDisjunction => "TRUE absorbs OR: p OR TRUE is TRUE",
			RuleId::FalseDisjunction => "FALSE is neutral for OR: p OR FALSE is p",
			RuleId::ComplementConjunction => "Complement: p AND NOT p is FALSE",
			RuleId::ComplementDisjunction => "Complement: p OR NOT p is TRUE",
			RuleId::DoubleNegation => "Double negation: NOT NOT p is p",
			RuleId::ImplicationElimination => "Eliminate implication: p -> q is NOT p OR q",
			RuleId::EquivalenceElimination => "Eliminate equivalence: p <-> q is (p AND q) OR (NOT p AND NOT q)",
			RuleId::DeMorganAnd => "De Morgan: NOT (p AND q) is NOT p OR NOT q",
			RuleId::DeMorganOr => "De Morgan: NOT (p OR q) is NOT p AND NOT q",
			RuleId::Idempotency => "Idempotency: p AND p is p, p OR p is p",
			RuleId::Absorption => "Absorption: p AND (p OR q) is p, p OR (p AND q) is p",
			RuleId::Distribution => "Distribute AND over OR: p AND (q OR r) is (p AND q) OR (p AND r)",
		}
	}
}

impl fmt::Display for RuleId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

#[derive(Debug, Error)]
#[error("unknown rule `{0}`")]
pub struct UnknownRule(String);

impl FromStr for RuleId {
	type Err = UnknownRule;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		RuleId::ALL
			.iter()
			.copied()
			.find(|id| id.name() == s)
			.ok_or_else(|| UnknownRule(s.to_string()))
	}
}

/// Формулы встроенных правил, в порядке приоритета подсказок.
pub const STANDARD_RULES: &[(RuleId, &[&str])] = &[
	(RuleId::ConstantNegation, &["NOT TRUE ==> FALSE", "NOT FALSE ==> TRUE"]),
	(RuleId::TrueConjunction, &["p AND TRUE ==> p", "TRUE AND p ==> p"]),
	(RuleId::FalseConjunction, &["p AND FALSE ==> FALSE", "FALSE AND p ==> FALSE"]),
	(RuleId::TrueDisjunction, &["p OR TRUE ==> TRUE", "TRUE OR p ==> TRUE"]),
	(RuleId::FalseDisjunction, &["p OR FALSE ==> p", "FALSE OR p ==> p"]),
	(RuleId::ComplementConjunction, &["p AND NOT p ==> FALSE", "NOT p AND p ==> FALSE"]),
	(RuleId::ComplementDisjunction, &["p OR NOT p ==> TRUE", "NOT p OR p ==> TRUE"]),
	(RuleId::DoubleNegation, &["NOT NOT p ==> p"]),
	(RuleId::ImplicationElimination, &["p -> q ==> NOT p OR q"]),
	(RuleId::EquivalenceElimination, &["p <-> q ==> p AND q OR NOT p AND NOT q"]),
	(RuleId::DeMorganAnd, &["NOT (p AND q) ==> NOT p OR NOT q"]),
	(RuleId::DeMorganOr, &["NOT (p OR q) ==> NOT p AND NOT q"]),
	(RuleId::Idempotency, &["p AND p ==> p", "p OR p ==> p"]),
	(RuleId::Absorption, &[
		"p AND (p OR q) ==> p",
		"(p OR q) AND p ==> p",
		"p OR p AND q ==> p",
		"p AND q OR p ==> p",
	]),
	(RuleId::Distribution, &[
		"p AND (q OR r) ==> p AND q OR p AND r",
		"(q OR r) AND p ==> q AND p OR r AND p",
	]),
];

/// Одно применение правила: где и что получилось.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Application {
	pub rule: RuleId,
	pub position: ExprPositionOwned,
	pub result: Expression,
}

/// Правило переписывания: несколько формул под одним именем.
#[derive(Clone, Debug)]
pub struct Rule {
	id: RuleId,
	formulas: Vec<Formula>,
}

impl Rule {
	pub fn id(&self) -> RuleId {
		self.id
	}

	/// Применимо ли правило к корню выражения.
	pub fn matches(&self, expr: &Expression) -> bool {
		self.formulas.iter().any(|formula| formula.rewrite(expr).is_some())
	}

	/// Применить правило к корню выражения; берётся первая подходящая формула.
	pub fn apply(&self, expr: &Expression) -> Option<Expression> {
		self.formulas.iter().find_map(|formula| formula.rewrite(expr))
	}

	/// Применить правило к части выражения по положению `position`.
	pub fn apply_at(&self, expr: &Expression, position: &ExprPosition) -> Result<Option<Expression>, PositionError> {
		let part = expr.subterm(position)?;
		match self.apply(part) {
			Some(rewritten) => expr.replace(position, rewritten).map(Some),
			None => Ok(None),
		}
	}

	/// Применимо ли правило хоть к какой-нибудь части выражения.
	pub fn matches_anywhere(&self, expr: &Expression) -> bool {
		self.matches(expr) || expr.args().iter().any(|arg| self.matches_anywhere(arg))
	}

	/// Все применения правила: положения в прямом порядке обхода, внутри положения формулы по порядку.
	pub fn applications(&self, expr: &Expression) -> Vec<Application> {
		let mut result = Vec::new();
		for position in expr.positions() {
			let part = match expr.subterm(position.borrow()) {
				Ok(part) => part,
				Err(_) => continue,
			};
			for formula in &self.formulas {
				let rewritten = match formula.rewrite(part) {
					Some(rewritten) => rewritten,
					None => continue,
				};
				if let Ok(whole) = expr.replace(position.borrow(), rewritten) {
					trace!("{} applies at {}: {}", self.id, position, whole);
					let application = Application { rule: self.id, position: position.clone(), result: whole };
					if !result.contains(&application) {
						result.push(application);
					}
				}
			}
		}
		result
	}
}

#[derive(Debug, Error)]
pub enum RuleSetError {
	#[error("rule `{rule}`, formula `{formula}`: {error}")]
	Formula {
		rule: RuleId,
		formula: String,
		#[source]
		error: FormulaError,
	},
	#[error("rule `{rule}`, formula `{formula}` changes the meaning of an expression")]
	Unsound {
		rule: RuleId,
		formula: String,
	},
	#[error("rule `{0}` is defined twice")]
	Duplicate(RuleId),
}

/// Набор правил в порядке объявления.
#[derive(Clone, Debug)]
pub struct RuleSet {
	rules: Vec<Rule>,
}

impl RuleSet {
	/// Разбирает формулы правил и проверяет по таблице истинности, что каждая формула не меняет смысла выражения.
	pub fn from_definitions(definitions: &[(RuleId, &[&str])]) -> Result<RuleSet, Vec<RuleSetError>> {
		let mut errors = Vec::new();
		let mut seen = BTreeSet::new();
		let mut rules = Vec::new();

		for (id, texts) in definitions {
			if !seen.insert(*id) {
				errors.push(RuleSetError::Duplicate(*id));
				continue;
			}

			let mut formulas = Vec::new();
			for text in texts.iter() {
				let formula = match Formula::parse(text) {
					Ok(formula) => formula,
					Err(error) => {
						errors.push(RuleSetError::Formula { rule: *id, formula: text.to_string(), error });
						continue;
					},
				};
				match logically_equivalent(&formula.left, &formula.right, MAX_TRUTH_TABLE_VARIABLES) {
					Ok(true) => formulas.push(formula),
					_ => errors.push(RuleSetError::Unsound { rule: *id, formula: text.to_string() }),
				}
			}
			rules.push(Rule { id: *id, formulas });
		}

		if errors.is_empty() {
			debug!("rule set with {} rules", rules.len());
			Ok(RuleSet { rules })
		} else {
			Err(errors)
		}
	}

	pub fn standard() -> Result<RuleSet, Vec<RuleSetError>> {
		Self::from_definitions(STANDARD_RULES)
	}

	/// Копия набора без указанных правил.
	pub fn without(&self, disabled: &[RuleId]) -> RuleSet {
		RuleSet {
			rules: self.rules.iter().filter(|rule| !disabled.contains(&rule.id)).cloned().collect(),
		}
	}

	pub fn rules(&self) -> &[Rule] {
		&self.rules
	}

	pub fn get(&self, id: RuleId) -> Option<&Rule> {
		self.rules.iter().find(|rule| rule.id == id)
	}

	/// Правила, применимые хоть к какой-то части выражения, в порядке объявления.
	pub fn applicable_rules<'a>(&'a self, expr: &Expression) -> Vec<&'a Rule> {
		self.rules.iter().filter(|rule| rule.matches_anywhere(expr)).collect()
	}

	/// Все применения всех правил, в порядке объявления правил.
	pub fn applications<'a>(&'a self, expr: &'a Expression) -> impl Iterator<Item = Application> + 'a {
		self.rules.iter().flat_map(move |rule| rule.applications(expr))
	}

	pub fn first_application(&self, expr: &Expression) -> Option<Application> {
		self.applications(expr).next()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parsing::parse;
	use test_log::test;

	fn expr(text: &str) -> Expression {
		parse(text).unwrap()
	}

	#[test]
	fn standard_rules_are_sound() {
		let rules = RuleSet::standard().unwrap();
		assert_eq!(rules.rules().len(), RuleId::ALL.len());
		let ids: Vec<RuleId> = rules.rules().iter().map(Rule::id).collect();
		assert_eq!(ids, RuleId::ALL.to_vec());
	}

	#[test]
	fn unsound_formula_is_rejected() {
		let errors = RuleSet::from_definitions(&[(RuleId::Absorption, &["p AND q ==> p"])]).unwrap_err();
		assert!(matches!(errors.as_slice(), [RuleSetError::Unsound { rule: RuleId::Absorption, .. }]));
	}

	#[test]
	fn unbound_pattern_is_rejected() {
		let errors = RuleSet::from_definitions(&[(RuleId::Idempotency, &["p ==> p AND (q OR NOT q)"])]).unwrap_err();
		assert!(matches!(errors.as_slice(), [RuleSetError::Formula { .. }]));
	}

	#[test]
	fn duplicate_rule_is_rejected() {
		let errors = RuleSet::from_definitions(&[
			(RuleId::DoubleNegation, &["NOT NOT p ==> p"]),
			(RuleId::DoubleNegation, &["NOT NOT p ==> p"]),
		]).unwrap_err();
		assert!(matches!(errors.as_slice(), [RuleSetError::Duplicate(RuleId::DoubleNegation)]));
	}

	#[test]
	fn distribution_at_root() {
		let rules = RuleSet::standard().unwrap();
		let rule = rules.get(RuleId::Distribution).unwrap();
		assert_eq!(rule.apply(&expr("A AND (B OR C)")), Some(expr("A AND B OR A AND C")));
		assert_eq!(rule.apply(&expr("(B OR C) AND A")), Some(expr("B AND A OR C AND A")));
		assert_eq!(rule.apply(&expr("A AND B")), None);
	}

	#[test]
	fn apply_at_inner_position() {
		let rules = RuleSet::standard().unwrap();
		let rule = rules.get(RuleId::DoubleNegation).unwrap();
		let start = expr("A OR NOT NOT B");
		assert_eq!(rule.apply_at(&start, ExprPosition::from_slice(&[1])).unwrap(), Some(expr("A OR B")));
		assert_eq!(rule.apply_at(&start, ExprPosition::from_slice(&[0])).unwrap(), None);
		assert!(rule.apply_at(&start, ExprPosition::from_slice(&[5])).is_err());
	}

	#[test]
	fn applicable_rules_keep_declaration_order() {
		let rules = RuleSet::standard().unwrap();
		let ids: Vec<RuleId> = rules
			.applicable_rules(&expr("NOT NOT (A AND (B OR C))"))
			.into_iter()
			.map(Rule::id)
			.collect();
		assert_eq!(ids, vec![RuleId::DoubleNegation, RuleId::DeMorganAnd, RuleId::Distribution]);
	}

	#[test]
	fn repeated_pattern_binds_up_to_reordering() {
		let rules = RuleSet::standard().unwrap();
		let rule = rules.get(RuleId::Idempotency).unwrap();
		assert_eq!(rule.apply(&expr("(A OR B) AND (B OR A)")), Some(expr("A OR B")));
	}

	#[test]
	fn without_removes_rules() {
		let rules = RuleSet::standard().unwrap().without(&[RuleId::Distribution]);
		assert!(rules.get(RuleId::Distribution).is_none());
		assert!(rules.first_application(&expr("A AND (B OR C)")).is_none());
	}

	#[test]
	fn rule_names_round_trip() {
		for id in RuleId::ALL.iter() {
			assert_eq!(id.name().parse::<RuleId>().unwrap(), *id);
		}
		assert!("commutativity".parse::<RuleId>().is_err());
	}
}

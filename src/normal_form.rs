//! Канонический вид выражений, проверка равносильности и приведение к ДНФ.
//!
//! Здесь нет правил переписывания: ДНФ строится напрямую, поэтому цель упражнения не зависит от того, какие правила доступны студенту.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expr::*;

/// Таблицу истинности на большее число переменных не строим.
pub const MAX_TRUTH_TABLE_VARIABLES: usize = 24;

/// Ограничение на размер таблицы истинности.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error, Serialize, Deserialize)]
#[error("too many variables to compare by truth table: {count}, limit is {limit}")]
pub struct TooManyVariables {
	pub count: usize,
	pub limit: usize,
}

pub(crate) fn collect_operands(expr: Expression, connective: Connective, result: &mut Vec<Expression>) {
	match expr.0 {
		ExpressionMeta::Compound { connective: inner, args } if inner == connective => {
			for arg in args {
				collect_operands(arg, connective, result);
			}
		},
		other => result.push(Expression(other)),
	}
}

/// Собирает аргументы обратно в цепочку `a ∘ (b ∘ (c ∘ ...))`.
pub(crate) fn rebuild_chain(connective: Connective, operands: Vec<Expression>) -> Option<Expression> {
	operands
		.into_iter()
		.rev()
		.fold1(|right, left| Expression::compound(connective, vec![left, right]))
}

/// Канонический вид: цепочки `AND`/`OR` выпрямляются и сортируются, аргументы `<->` сортируются.
pub fn canonical(expr: &Expression) -> Expression {
	use ExpressionMeta::*;

	match &expr.0 {
		Variable { .. } | Constant { .. } => expr.clone(),
		Compound { connective, args } => {
			let args: Vec<Expression> = args.iter().map(canonical).collect();
			if args.len() != connective.arity() {
				return Expression::compound(*connective, args);
			}

			if connective.is_associative() {
				let mut operands = Vec::new();
				for arg in args {
					collect_operands(arg, *connective, &mut operands);
				}
				operands.sort();
				rebuild_chain(*connective, operands)
					.unwrap_or_else(|| Expression::compound(*connective, Vec::new()))
			} else if connective.is_commutative() {
				Expression::compound(*connective, args.into_iter().sorted().collect())
			} else {
				Expression::compound(*connective, args)
			}
		},
	}
}

/// Структурное равенство с точностью до порядка аргументов `AND`, `OR` и `<->` и расстановки скобок в цепочках `AND`/`OR`.
pub fn equivalent_to(a: &Expression, b: &Expression) -> bool {
	a == b || canonical(a) == canonical(b)
}

/// Проверяет, что переменных не больше `limit` (и не больше `MAX_TRUTH_TABLE_VARIABLES`).
pub fn check_variable_count(count: usize, limit: usize) -> Result<(), TooManyVariables> {
	let limit = limit.min(MAX_TRUTH_TABLE_VARIABLES);
	if count > limit {
		Err(TooManyVariables { count, limit })
	} else {
		Ok(())
	}
}

/// Равносильность по таблице истинности. Строка таблицы это битовая маска: `i`-й бит задаёт `i`-ю переменную по алфавиту.
pub fn logically_equivalent(a: &Expression, b: &Expression, limit: usize) -> Result<bool, TooManyVariables> {
	let variables: Vec<&str> = a.variables().into_iter().chain(b.variables()).sorted().dedup().collect();
	check_variable_count(variables.len(), limit)?;

	for row in 0u64..(1u64 << variables.len()) {
		let value_of = |name: &str| {
			variables
				.binary_search(&name)
				.map(|index| row & (1 << index) != 0)
				.unwrap_or(false)
		};
		if a.evaluate(&value_of) != b.evaluate(&value_of) {
			return Ok(false);
		}
	}
	Ok(true)
}

/// ДНФ оказалась больше допустимого.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error, Serialize, Deserialize)]
#[error("normal form has more than {limit} conjunctions")]
pub struct TooManyTerms {
	pub limit: usize,
}

/// Литерал ДНФ: имя переменной и знак.
type Literal = (String, bool);

/// Дизъюнкт из конъюнкций литералов. Пустая конъюнкция это `TRUE`, пустой дизъюнкт это `FALSE`.
type Terms = Vec<Vec<Literal>>;

fn dnf_terms(expr: &Expression, positive: bool, limit: usize) -> Result<Terms, TooManyTerms> {
	use ExpressionMeta::*;

	let terms = |expr: &Expression, positive: bool| dnf_terms(expr, positive, limit);
	match &expr.0 {
		Variable { name } => Ok(vec![vec![(name.clone(), positive)]]),
		Constant { value } => Ok(if *value == positive { vec![vec![]] } else { vec![] }),
		Compound { connective, args } => match (connective, args.as_slice()) {
			(Connective::Not, [arg]) => terms(arg, !positive),
			(Connective::And, [left, right]) if positive => conjunction(terms(left, true)?, terms(right, true)?, limit),
			(Connective::And, [left, right]) => disjunction(terms(left, false)?, terms(right, false)?, limit),
			(Connective::Or, [left, right]) if positive => disjunction(terms(left, true)?, terms(right, true)?, limit),
			(Connective::Or, [left, right]) => conjunction(terms(left, false)?, terms(right, false)?, limit),
			(Connective::Implies, [left, right]) if positive => disjunction(terms(left, false)?, terms(right, true)?, limit),
			(Connective::Implies, [left, right]) => conjunction(terms(left, true)?, terms(right, false)?, limit),
			(Connective::Equivalent, [left, right]) => {
				// (l AND r) OR (NOT l AND NOT r), при отрицании (l AND NOT r) OR (NOT l AND r)
				let both = conjunction(terms(left, true)?, terms(right, positive)?, limit)?;
				let neither = conjunction(terms(left, false)?, terms(right, !positive)?, limit)?;
				disjunction(both, neither, limit)
			},
			_ => Ok(Vec::new()),
		},
	}
}

/// Промежуточные наборы конъюнкций тоже упрощаются, так что ограничение проверяется на каждом шаге.
fn bounded(terms: Terms, limit: usize) -> Result<Terms, TooManyTerms> {
	let terms = simplify_terms(terms);
	if terms.len() > limit {
		Err(TooManyTerms { limit })
	} else {
		Ok(terms)
	}
}

fn disjunction(mut left: Terms, right: Terms, limit: usize) -> Result<Terms, TooManyTerms> {
	left.extend(right);
	bounded(left, limit)
}

fn conjunction(left: Terms, right: Terms, limit: usize) -> Result<Terms, TooManyTerms> {
	let product = left
		.iter()
		.cartesian_product(right.iter())
		.map(|(a, b)| a.iter().chain(b.iter()).cloned().collect())
		.collect();
	bounded(product, limit)
}

/// Убирает повторы литералов, противоречивые конъюнкции и повторы конъюнкций.
fn simplify_terms(terms: Terms) -> Terms {
	terms
		.into_iter()
		.map(|term| term.into_iter().sorted().dedup().collect::<Vec<_>>())
		.filter(|term: &Vec<Literal>| !term.iter().tuple_windows().any(|(a, b)| a.0 == b.0 && a.1 != b.1))
		.sorted()
		.dedup()
		.collect()
}

fn literal_expression((name, positive): Literal) -> Expression {
	if positive {
		Expression::var(name)
	} else {
		Expression::not(Expression::var(name))
	}
}

/// Приводит выражение к ДНФ, результат в каноническом виде.
pub fn to_dnf(expr: &Expression) -> Expression {
	// Без ограничения ошибки не бывает.
	terms_to_expression(dnf_terms(expr, true, usize::MAX).unwrap_or_default())
}

/// То же, что `to_dnf`, но останавливается, как только конъюнкций становится больше `limit`.
pub fn to_dnf_bounded(expr: &Expression, limit: usize) -> Result<Expression, TooManyTerms> {
	let result = terms_to_expression(dnf_terms(expr, true, limit)?);
	if dnf_size(&result) > limit {
		return Err(TooManyTerms { limit });
	}
	Ok(result)
}

fn terms_to_expression(terms: Terms) -> Expression {
	let terms = simplify_terms(terms);
	if terms.iter().any(Vec::is_empty) {
		return Expression::constant(true);
	}

	let conjunctions: Vec<Expression> = terms
		.into_iter()
		.filter_map(|term| rebuild_chain(Connective::And, term.into_iter().map(literal_expression).collect()))
		.collect();
	let result = rebuild_chain(Connective::Or, conjunctions).unwrap_or_else(|| Expression::constant(false));
	canonical(&result)
}

/// Количество конъюнкций в ДНФ.
pub fn dnf_size(expr: &Expression) -> usize {
	let mut operands = Vec::new();
	collect_operands(expr.clone(), Connective::Or, &mut operands);
	operands.len()
}

fn is_conjunction_of_literals(expr: &Expression) -> bool {
	match (expr.connective(), expr.args()) {
		(Some(Connective::And), [left, right]) => is_conjunction_of_literals(left) && is_conjunction_of_literals(right),
		_ => expr.is_literal(),
	}
}

fn is_disjunction_of_conjunctions(expr: &Expression) -> bool {
	match (expr.connective(), expr.args()) {
		(Some(Connective::Or), [left, right]) => is_disjunction_of_conjunctions(left) && is_disjunction_of_conjunctions(right),
		_ => is_conjunction_of_literals(expr),
	}
}

/// Выражение в ДНФ: одна константа или дизъюнкция конъюнкций литералов.
pub fn is_dnf(expr: &Expression) -> bool {
	matches!(expr.0, ExpressionMeta::Constant { .. }) || is_disjunction_of_conjunctions(expr)
}

use std::ops::Range;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::expr::*;
use crate::utils::char_index::{get_char_range, CharIndex};
use crate::utils::span::error_snippet;

/// Выражение, в котором для каждой части запомнено её положение в исходной строке.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExpressionParsing {
	pub span: Range<usize>,
	pub node: ExpressionMeta<ExpressionParsing>,
}

impl GetInnerExpression for ExpressionParsing {
	fn get_inner_expression(self) -> ExpressionMeta<Self> { self.node }
	fn get_inner_expression_ref(&self) -> &ExpressionMeta<Self> { &self.node }
	fn get_inner_expression_mut(&mut self) -> &mut ExpressionMeta<Self> { &mut self.node }
}

/// Слова, которые нельзя использовать как имена переменных.
const KEYWORDS: &[&str] = &["NOT", "AND", "OR", "TRUE", "FALSE", "T", "F"];

fn binary(connective: Connective, span: Range<usize>, left: ExpressionParsing, right: Option<ExpressionParsing>) -> ExpressionParsing {
	match right {
		Some(right) => ExpressionParsing {
			span,
			node: ExpressionMeta::Compound { connective, args: vec![left, right] },
		},
		None => left,
	}
}

// Все бинарные связки правоассоциативны, поэтому `a AND b AND c` это `a AND (b AND c)`.
peg::parser!(
	pub grammar parser() for str {
		pub rule expression() -> ExpressionParsing
			= _ e:equivalence() _ { e }

		pub rule rewrite() -> (ExpressionParsing, ExpressionParsing)
			= _ left:equivalence() _ "==>" _ right:equivalence() _ { (left, right) }

		rule equivalence() -> ExpressionParsing
			= start:position!()
			  l:implication()
			  r:(_ equivalent_symbol() _ p:equivalence() { p })?
			  end:position!()
			{ binary(Connective::Equivalent, start..end, l, r) }

		rule implication() -> ExpressionParsing
			= start:position!()
			  l:disjunction()
			  r:(_ implies_symbol() _ p:implication() { p })?
			  end:position!()
			{ binary(Connective::Implies, start..end, l, r) }

		rule disjunction() -> ExpressionParsing
			= start:position!()
			  l:conjunction()
			  r:(_ or_symbol() _ p:disjunction() { p })?
			  end:position!()
			{ binary(Connective::Or, start..end, l, r) }

		rule conjunction() -> ExpressionParsing
			= start:position!()
			  l:negation()
			  r:(_ and_symbol() _ p:conjunction() { p })?
			  end:position!()
			{ binary(Connective::And, start..end, l, r) }

		rule negation() -> ExpressionParsing
			= start:position!() not_symbol() _ arg:negation() end:position!() {
				ExpressionParsing {
					span: start..end,
					node: ExpressionMeta::Compound { connective: Connective::Not, args: vec![arg] }
				}
			}
			/ atom()

		rule atom() -> ExpressionParsing
			= "(" _ v:equivalence() _ ")" { v }
			/ constant()
			/ variable()

		rule constant() -> ExpressionParsing
			= start:position!()
			  value:(
				("TRUE" / "T") !ident_char() { true }
				/ ("FALSE" / "F") !ident_char() { false }
			  )
			  end:position!()
			{
				ExpressionParsing {
					span: start..end,
					node: ExpressionMeta::Constant { value }
				}
			}

		rule variable() -> ExpressionParsing
			= start:position!() name:identifier() end:position!() {
				ExpressionParsing {
					span: start..end,
					node: ExpressionMeta::Variable { name }
				}
			}

		rule not_symbol() = "NOT" !ident_char() / "~" / "!" / "¬"
		rule and_symbol() = "AND" !ident_char() / "&&" / "&" / "/\\" / "∧"
		rule or_symbol() = "OR" !ident_char() / "||" / "|" / "\\/" / "∨"
		rule implies_symbol() = "->" / "=>" / "→"
		rule equivalent_symbol() = "<->" / "<=>" / "↔"

		rule identifier() -> String
			= n:$(['a'..='z' | 'A'..='Z' | '_'] ident_char()*) {?
				if KEYWORDS.contains(&n) {
					Err("variable name")
				} else {
					Ok(String::from(n))
				}
			}

		rule ident_char() = ['a'..='z' | 'A'..='Z' | '_' | '0'..='9']

		rule _() = quiet!{[' ' | '\n' | '\t' | '\r']*}
	}
);

/// Ошибка разбора выражения, введённого студентом.
#[derive(Clone, Debug, Eq, PartialEq, Error, Serialize, Deserialize)]
pub enum ParseError {
	#[error("unexpected token at line {line}, column {column}, expected one of: {}", .expected.join(", "))]
	UnexpectedToken {
		line: usize,
		column: usize,
		/// Смещение в байтах.
		offset: usize,
		expected: Vec<String>,
	},
	#[error("expression is too long: {len} bytes, limit is {limit}")]
	TooLong {
		len: usize,
		limit: usize,
	},
	#[error("expression is nested too deeply at byte {offset}, limit is {limit} levels")]
	TooDeep {
		offset: usize,
		limit: usize,
	},
}

impl From<peg::error::ParseError<peg::str::LineCol>> for ParseError {
	fn from(err: peg::error::ParseError<peg::str::LineCol>) -> Self {
		ParseError::UnexpectedToken {
			line: err.location.line,
			column: err.location.column,
			offset: err.location.offset,
			expected: err.expected
				.tokens()
				.map(String::from)
				.sorted()
				.dedup()
				.collect(),
		}
	}
}

impl ParseError {
	/// Ошибка вместе с исходной строкой, где подчёркнуто место ошибки.
	pub fn snippet(&self, input: &str, color: bool) -> String {
		let (offset, note) = match self {
			ParseError::UnexpectedToken { offset, expected, .. } =>
				(*offset, format!("expected one of: {}", expected.join(", "))),
			ParseError::TooDeep { offset, limit } =>
				(*offset, format!("at most {} levels of parentheses and negations are allowed", limit)),
			// Слишком длинный ввод целиком не показываем.
			ParseError::TooLong { .. } => return self.to_string(),
		};
		let title = match self {
			ParseError::TooDeep { .. } => "nested too deeply",
			_ => "unexpected token",
		};
		let range = get_char_range(input, offset..offset).unwrap_or(CharIndex(0)..CharIndex(0));
		error_snippet(title, &note, input, range, color)
	}
}

/// Ограничения на ввод. Разбор рекурсивный, так что без них глубокая вложенность переполняет стек.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParseLimits {
	pub max_len: usize,
	pub max_depth: usize,
}

impl Default for ParseLimits {
	fn default() -> Self {
		Self::from(&EngineConfig::default())
	}
}

impl From<&EngineConfig> for ParseLimits {
	fn from(config: &EngineConfig) -> Self {
		ParseLimits {
			max_len: config.max_expression_len,
			max_depth: config.max_nesting_depth,
		}
	}
}

fn is_word_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '_'
}

/// Смещение, на котором вложенность скобок и идущих подряд отрицаний впервые превышает `limit`.
/// Оценка сверху: отрицание перед скобкой считается вместе с ней.
fn too_deep_at(text: &str, limit: usize) -> Option<usize> {
	let mut parens = 0usize;
	let mut negations = 0usize;
	let mut word_start = None;
	for (offset, c) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
		if is_word_char(c) {
			word_start.get_or_insert(offset);
			continue;
		}
		if let Some(start) = word_start.take() {
			if &text[start..offset] == "NOT" {
				negations += 1;
			} else {
				negations = 0;
			}
			if parens + negations > limit {
				return Some(start);
			}
		}
		match c {
			'(' => parens += 1,
			')' => {
				parens = parens.saturating_sub(1);
				negations = 0;
			},
			'~' | '!' | '¬' => negations += 1,
			c if c.is_whitespace() => {},
			_ => negations = 0,
		}
		if parens + negations > limit {
			return Some(offset);
		}
	}
	None
}

pub fn parse_with_limits(text: &str, limits: &ParseLimits) -> Result<Expression, ParseError> {
	if text.len() > limits.max_len {
		return Err(ParseError::TooLong { len: text.len(), limit: limits.max_len });
	}
	if let Some(offset) = too_deep_at(text, limits.max_depth) {
		return Err(ParseError::TooDeep { offset, limit: limits.max_depth });
	}
	parser::expression(text)
		.map(clear_parsing_info)
		.map_err(ParseError::from)
}

pub fn parse(text: &str) -> Result<Expression, ParseError> {
	parse_with_limits(text, &ParseLimits::default())
}

/// Разбор формулы правила вида `left ==> right`.
pub fn parse_rewrite(text: &str) -> Result<(Expression, Expression), ParseError> {
	parser::rewrite(text)
		.map(|(left, right)| (clear_parsing_info(left), clear_parsing_info(right)))
		.map_err(ParseError::from)
}

pub fn clear_parsing_info(expr: ExpressionParsing) -> Expression {
	use ExpressionMeta::*;

	Expression(
		match expr.node {
			Compound { connective, args } =>
				Compound { connective, args: args.into_iter().map(clear_parsing_info).collect() },
			Variable { name } =>
				Variable { name },
			Constant { value } =>
				Constant { value },
		}
	)
}

/// Убирает информацию о положениях, но возвращает для каждого положения в выражении диапазон в исходной строке.
pub fn process_expression_parsing(expr: ExpressionParsing) -> (Expression, Vec<(ExprPositionOwned, Range<usize>)>) {
	fn process(
		expr: ExpressionMeta<ExpressionParsing>,
		current_position: &mut Vec<usize>,
		storage: &mut Vec<(ExprPositionOwned, Range<usize>)>
	) -> Expression {
		use ExpressionMeta::*;

		Expression(
			match expr {
				Compound { connective, args } => {
					let args = args.into_iter().enumerate().map(|(pos, arg)| {
						current_position.push(pos);
						let ExpressionParsing { span, node } = arg;
						storage.push((ExprPositionOwned(current_position.clone()), span));
						let result = process(node, current_position, storage);
						current_position.pop();
						result
					}).collect();
					Compound { connective, args }
				},
				Variable { name } =>
					Variable { name },
				Constant { value } =>
					Constant { value },
			}
		)
	}

	let mut storage = Vec::new();
	let mut current_position = Vec::new();
	let ExpressionParsing { span, node } = expr;
	storage.push((ExprPositionOwned(current_position.clone()), span));
	(process(node, &mut current_position, &mut storage), storage)
}

/// Выводит выражение в текст с минимально необходимыми скобками; `parse(&render(e)) == Ok(e)`.
pub fn render(expr: &Expression) -> String {
	let mut result = String::new();
	render_into(expr, &mut result);
	result
}

fn precedence_of(expr: &Expression) -> u8 {
	expr.connective().map(Connective::precedence).unwrap_or(u8::MAX)
}

fn render_child(expr: &Expression, parenthesize: bool, result: &mut String) {
	if parenthesize {
		result.push('(');
		render_into(expr, result);
		result.push(')');
	} else {
		render_into(expr, result);
	}
}

fn render_into(expr: &Expression, result: &mut String) {
	use ExpressionMeta::*;

	match &expr.0 {
		Variable { name } => result.push_str(name),
		Constant { value } => result.push_str(if *value { "TRUE" } else { "FALSE" }),
		Compound { connective, args } => match (connective, args.as_slice()) {
			(Connective::Not, [arg]) => {
				result.push_str("NOT ");
				render_child(arg, precedence_of(arg) < Connective::Not.precedence(), result);
			},
			(_, [left, right]) => {
				let own = connective.precedence();
				render_child(left, precedence_of(left) <= own, result);
				result.push(' ');
				result.push_str(connective.symbol());
				result.push(' ');
				render_child(right, precedence_of(right) < own, result);
			},
			// Некорректное выражение всё равно нужно как-то показать.
			_ => {
				result.push_str(connective.symbol());
				result.push('(');
				result.push_str(&args.iter().map(render).join(", "));
				result.push(')');
			},
		},
	}
}

/// Находит диапазон части выражения в его текстовом виде.
pub fn locate(expr: &Expression, position: &ExprPosition) -> Option<(String, Range<usize>)> {
	let text = render(expr);
	let parsed = parser::expression(&text).ok()?;
	let (_, positions) = process_expression_parsing(parsed);
	let span = positions
		.into_iter()
		.find(|(found, _)| found.0.as_slice() == &position.0)?
		.1;
	Some((text, span))
}

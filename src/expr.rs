use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::apply::*;

/// Логическая связка вместе со своей арностью.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Connective {
	Not,
	And,
	Or,
	Implies,
	Equivalent,
}

impl Connective {
	pub fn arity(self) -> usize {
		match self {
			Connective::Not => 1,
			Connective::And | Connective::Or | Connective::Implies | Connective::Equivalent => 2,
		}
	}

	/// Для таких связок порядок аргументов не важен при сравнении выражений.
	pub fn is_commutative(self) -> bool {
		matches!(self, Connective::And | Connective::Or | Connective::Equivalent)
	}

	/// Для таких связок вложенные цепочки `a AND (b AND c)` считаются одним списком аргументов.
	pub fn is_associative(self) -> bool {
		matches!(self, Connective::And | Connective::Or)
	}

	pub fn symbol(self) -> &'static str {
		match self {
			Connective::Not => "NOT",
			Connective::And => "AND",
			Connective::Or => "OR",
			Connective::Implies => "->",
			Connective::Equivalent => "<->",
		}
	}

	/// Чем больше, тем сильнее связывает.
	pub(crate) fn precedence(self) -> u8 {
		match self {
			Connective::Equivalent => 1,
			Connective::Implies => 2,
			Connective::Or => 3,
			Connective::And => 4,
			Connective::Not => 5,
		}
	}
}

/// Обобщённое выражение. Обобщённость нужна для того, чтобы при парсинге хранить положения частей выражения, а в остальном коде работать с обычным выражением.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ExpressionMeta<Arg> {
	/// Пропозициональная переменная. В выражении выглядит как: `A`, `p`, `x1`.
	Variable {
		name: String
	},

	/// Константа. В выражении выглядит как: `TRUE`, `FALSE`, `T`, `F`.
	Constant {
		value: bool
	},

	/// Связка с аргументами. В выражении выглядит как: `NOT a`, `a AND b`, `a -> b`.
	Compound {
		connective: Connective,
		args: Vec<Arg>,
	},
}

/// Ввиду обобщённости `ExpressionMeta`, нужно как-то получать его обратно когда обращаешься к `args`, поэтому сделан такой трейт.
pub trait GetInnerExpression: Sized {
	fn get_inner_expression(self) -> ExpressionMeta<Self>;
	fn get_inner_expression_ref(&self) -> &ExpressionMeta<Self>;
	fn get_inner_expression_mut(&mut self) -> &mut ExpressionMeta<Self>;
}

/// Выражение без дополнительной информации. Сериализуется в виде текста.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Expression(pub ExpressionMeta<Expression>);

impl GetInnerExpression for Expression {
	fn get_inner_expression(self) -> ExpressionMeta<Self> { self.0 }
	fn get_inner_expression_ref(&self) -> &ExpressionMeta<Self> { &self.0 }
	fn get_inner_expression_mut(&mut self) -> &mut ExpressionMeta<Self> { &mut self.0 }
}

impl Expression {
	pub fn var(name: impl Into<String>) -> Self {
		ExpressionMeta::Variable { name: name.into() }.apply(Expression)
	}

	pub fn constant(value: bool) -> Self {
		ExpressionMeta::Constant { value }.apply(Expression)
	}

	pub fn compound(connective: Connective, args: Vec<Expression>) -> Self {
		ExpressionMeta::Compound { connective, args }.apply(Expression)
	}

	pub fn not(arg: Expression) -> Self {
		Self::compound(Connective::Not, vec![arg])
	}

	pub fn and(left: Expression, right: Expression) -> Self {
		Self::compound(Connective::And, vec![left, right])
	}

	pub fn or(left: Expression, right: Expression) -> Self {
		Self::compound(Connective::Or, vec![left, right])
	}

	pub fn implies(left: Expression, right: Expression) -> Self {
		Self::compound(Connective::Implies, vec![left, right])
	}

	pub fn equivalent(left: Expression, right: Expression) -> Self {
		Self::compound(Connective::Equivalent, vec![left, right])
	}

	/// Связка в корне выражения, если это не лист.
	pub fn connective(&self) -> Option<Connective> {
		match &self.0 {
			ExpressionMeta::Compound { connective, .. } => Some(*connective),
			_ => None,
		}
	}

	pub fn args(&self) -> &[Expression] {
		match &self.0 {
			ExpressionMeta::Compound { args, .. } => args,
			_ => &[],
		}
	}

	/// Каждая связка имеет ровно столько аргументов, сколько требует её арность.
	pub fn is_well_formed(&self) -> bool {
		match &self.0 {
			ExpressionMeta::Compound { connective, args } =>
				args.len() == connective.arity() && args.iter().all(Expression::is_well_formed),
			ExpressionMeta::Variable { name } => !name.is_empty(),
			ExpressionMeta::Constant { .. } => true,
		}
	}

	/// Переменная или отрицание переменной.
	pub fn is_literal(&self) -> bool {
		match &self.0 {
			ExpressionMeta::Variable { .. } => true,
			ExpressionMeta::Compound { connective: Connective::Not, args } =>
				matches!(args.as_slice(), [Expression(ExpressionMeta::Variable { .. })]),
			_ => false,
		}
	}

	pub fn variables(&self) -> BTreeSet<&str> {
		fn collect<'a>(expr: &'a Expression, result: &mut BTreeSet<&'a str>) {
			match &expr.0 {
				ExpressionMeta::Variable { name } => { result.insert(name); },
				ExpressionMeta::Constant { .. } => {},
				ExpressionMeta::Compound { args, .. } => args.iter().for_each(|arg| collect(arg, result)),
			}
		}

		let mut result = BTreeSet::new();
		collect(self, &mut result);
		result
	}

	/// Значение выражения, когда значения переменных даёт `value_of`.
	pub fn evaluate<F: Fn(&str) -> bool>(&self, value_of: &F) -> bool {
		use ExpressionMeta::*;

		match &self.0 {
			Variable { name } => value_of(name.as_str()),
			Constant { value } => *value,
			Compound { connective, args } => {
				let value = |index: usize| args.get(index).map(|arg| arg.evaluate(value_of)).unwrap_or(false);
				match connective {
					Connective::Not => !value(0),
					Connective::And => value(0) && value(1),
					Connective::Or => value(0) || value(1),
					Connective::Implies => !value(0) || value(1),
					Connective::Equivalent => value(0) == value(1),
				}
			},
		}
	}

	/// Все положения в выражении, в прямом порядке обхода: сначала корень, потом аргументы слева направо.
	pub fn positions(&self) -> Vec<ExprPositionOwned> {
		fn walk(expr: &Expression, current: &mut Vec<usize>, result: &mut Vec<ExprPositionOwned>) {
			result.push(ExprPositionOwned(current.clone()));
			for (index, arg) in expr.args().iter().enumerate() {
				current.push(index);
				walk(arg, current, result);
				current.pop();
			}
		}

		let mut result = Vec::new();
		walk(self, &mut Vec::new(), &mut result);
		result
	}

	pub fn subterm(&self, position: &ExprPosition) -> Result<&Expression, PositionError> {
		self.subterm_inner(position, 0)
	}

	fn subterm_inner(&self, position: &ExprPosition, deep: usize) -> Result<&Expression, PositionError> {
		match &position.0 {
			[start, tail @ ..] => self
				.args()
				.get(*start)
				.ok_or(PositionError(deep))?
				.subterm_inner(ExprPosition::from_slice(tail), deep + 1),
			[] => Ok(self),
		}
	}

	/// Возвращает копию выражения, в которой часть по положению `position` заменена на `with`.
	pub fn replace(&self, position: &ExprPosition, with: Expression) -> Result<Expression, PositionError> {
		let mut result = self.clone();
		*result.0.get_mut(position)? = with.0;
		Ok(result)
	}
}

/// Положение в выражении: индексы аргументов от корня.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ExprPositionOwned(pub Vec<usize>);

/// Положение в выражении для передачи в функции. Аналог `[usize]`.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct ExprPosition(pub [usize]);

impl ExprPosition {
	/// Создать ссылку на `ExprPosition` из слайса на `usize`.
	pub fn from_slice(slice: &[usize]) -> &Self {
		unsafe { &*(slice as *const [usize] as *const ExprPosition) }
	}
}

impl Borrow<ExprPosition> for ExprPositionOwned {
	fn borrow(&self) -> &ExprPosition {
		ExprPosition::from_slice(self.0.borrow())
	}
}

impl fmt::Display for ExprPositionOwned {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}]", itertools::join(&self.0, ", "))
	}
}

/// Показывает в каком положении в массиве `ExprPosition` не было найдено то что нужно.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Copy)]
pub struct PositionError(pub usize);

impl fmt::Display for PositionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "no subterm at depth {}", self.0)
	}
}

impl std::error::Error for PositionError {}

impl<Arg: GetInnerExpression> ExpressionMeta<Arg> {
	fn get_mut_inner<'a>(&'a mut self, position: &ExprPosition, deep: usize) -> Result<&'a mut Self, PositionError> {
		use ExpressionMeta::*;

		match &position.0 {
			[start, tail @ ..] => {
				match self {
					Compound { connective: _, args } => args
						.get_mut(*start)
						.ok_or(PositionError(deep))?
						.get_inner_expression_mut()
						.get_mut_inner(ExprPosition::from_slice(tail), deep+1),

					Variable { .. } |
					Constant { .. } => Err(PositionError(deep)),
				}
			},
			[] => Ok(self),
		}
	}

	/// Получить изменяемую ссылку на внутреннюю часть выражения.
	pub fn get_mut<'a>(&'a mut self, position: &ExprPosition) -> Result<&'a mut Self, PositionError> {
		self.get_mut_inner(position, 0)
	}
}

impl fmt::Display for Expression {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&crate::parsing::render(self))
	}
}

impl From<Expression> for String {
	fn from(expr: Expression) -> String {
		expr.to_string()
	}
}

impl TryFrom<String> for Expression {
	type Error = crate::parsing::ParseError;

	fn try_from(text: String) -> Result<Self, Self::Error> {
		crate::parsing::parse(&text)
	}
}

impl std::str::FromStr for Expression {
	type Err = crate::parsing::ParseError;

	fn from_str(text: &str) -> Result<Self, Self::Err> {
		crate::parsing::parse(text)
	}
}

use std::collections::BTreeMap;

use log::trace;
use thiserror::Error;

use crate::expr::*;
use crate::normal_form::equivalent_to;
use crate::parsing::{parse_rewrite, ParseError};
use crate::utils::apply::*;

/// `left ==> right`. Все переменные в формуле являются паттернами: `p` матчится с любым подвыражением.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Formula {
	pub left: Expression,
	pub right: Expression,
}

#[derive(Debug, Error)]
pub enum FormulaError {
	#[error("cannot parse formula: {0}")]
	Parse(#[from] ParseError),
	#[error("pattern `{0}` is used on the right side, but never bound on the left side")]
	UnboundPattern(String),
}

impl Formula {
	/// Проверяет, что все паттерны правой части будут найдены при сопоставлении левой.
	pub fn new(left: Expression, right: Expression) -> Result<Formula, FormulaError> {
		let bound = left.variables();
		if let Some(unbound) = right.variables().into_iter().find(|name| !bound.contains(name)) {
			return Err(FormulaError::UnboundPattern(unbound.to_string()));
		}
		Ok(Formula { left, right })
	}

	pub fn parse(text: &str) -> Result<Formula, FormulaError> {
		let (left, right) = parse_rewrite(text)?;
		Formula::new(left, right)
	}

	/// Применить формулу к корню выражения.
	pub fn rewrite(&self, expr: &Expression) -> Option<Expression> {
		let mut bindings = BindingStorage::default();
		find_bindings(expr, &self.left, &mut bindings)?;
		apply_bindings(&self.right, &bindings)
	}
}

/// `pattern -> value`, позволяет производить замену с имени паттерна на выражение.
#[derive(Clone, Debug)]
pub struct Binding {
	pattern_name: String,
	to_value: Expression,
}

impl Binding {
	pub fn new(pattern_name: String, to_value: Expression) -> Binding {
		Binding {
			pattern_name,
			to_value,
		}
	}
}

#[derive(Default, Debug, Clone)]
pub struct BindingStorage(BTreeMap<String, Expression>);

impl BindingStorage {
	/// Добавляет биндинг в хранилище. Если он уже существует, то проверяет что они совпадают с точностью до перестановки аргументов. Если это не так, возвращает None.
	pub fn add(&mut self, binding: Binding) -> Option<()> {
		use std::collections::btree_map::Entry::*;

		match self.0.entry(binding.pattern_name) {
			Vacant(vacant) => {
				vacant.insert(binding.to_value);
				Some(())
			},
			Occupied(occupied) => {
				if equivalent_to(occupied.get(), &binding.to_value) {
					Some(())
				} else {
					None
				}
			},
		}
	}

	pub fn get(&self, pattern_name: &str) -> Option<&Expression> {
		self.0.get(pattern_name)
	}
}

/// Сопоставляет выражение `expr` с паттерном `by`, записывая найденные значения паттернов в `binding_storage`.
pub fn find_bindings(
	expr: &Expression,
	by: &Expression,
	binding_storage: &mut BindingStorage,
) -> Option<()> {
	use ExpressionMeta::*;

	match &by.0 {
		Variable { name } => {
			binding_storage.add(Binding::new(name.to_string(), expr.clone()))
		},
		Compound { connective, args } => {
			match &expr.0 {
				Compound { connective: connective_expr, args: args_expr }
					if connective == connective_expr && args.len() == args_expr.len()
				=> {
					for (arg_expr, arg_by) in args_expr.iter().zip(args.iter()) {
						find_bindings(arg_expr, arg_by, binding_storage)?;
					}
					Some(())
				},
				_ => None,
			}
		},
		Constant { value } => {
			match &expr.0 {
				Constant { value: expr_value } if value == expr_value => Some(()),
				_ => None,
			}
		},
	}
}

/// Подставляет значения паттернов. `None`, если какой-то паттерн не был найден.
pub fn apply_bindings(
	pattern: &Expression,
	binding_storage: &BindingStorage,
) -> Option<Expression> {
	use ExpressionMeta::*;

	match &pattern.0 {
		Variable { name } => {
			let found = binding_storage.get(name);
			if found.is_none() {
				trace!("pattern `{}` has no binding", name);
			}
			found.cloned()
		},
		Compound { connective, args } => {
			Compound {
				connective: *connective,
				args: args
					.iter()
					.map(|arg| apply_bindings(arg, binding_storage))
					.collect::<Option<Vec<_>>>()?,
			}
			.apply(Expression)
			.apply(Some)
		},
		Constant { value } => Constant { value: *value }.apply(Expression).apply(Some),
	}
}

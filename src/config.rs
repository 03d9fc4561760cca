use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::RuleId;

/// Настройки движка. Все поля необязательны, в файле можно указать только то, что отличается от значений по умолчанию.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
	/// Более длинный текст выражения не разбирается.
	pub max_expression_len: usize,
	/// Сколько уровней скобок и отрицаний допускается во вводе.
	pub max_nesting_depth: usize,
	/// Больше переменных в таблице истинности не проверяется, шаг отклоняется.
	pub max_truth_table_variables: usize,
	/// Ограничение на длину показываемого решения.
	pub max_derivation_steps: usize,
	/// Правила, которые не предлагаются в подсказках и не принимаются как обоснование шага.
	pub disabled_rules: Vec<RuleId>,
	pub generator: GeneratorConfig,
}

impl Default for EngineConfig {
	fn default() -> Self {
		EngineConfig {
			max_expression_len: 1000,
			max_nesting_depth: 48,
			max_truth_table_variables: 12,
			max_derivation_steps: 64,
			disabled_rules: Vec::new(),
			generator: GeneratorConfig::default(),
		}
	}
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
	/// Без зерна генератор инициализируется случайно.
	pub seed: Option<u64>,
	pub max_attempts: usize,
	/// Упражнения, у которых в ДНФ больше конъюнкций, перегенерируются.
	pub max_target_terms: usize,
}

impl Default for GeneratorConfig {
	fn default() -> Self {
		GeneratorConfig {
			seed: None,
			max_attempts: 64,
			max_target_terms: 8,
		}
	}
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("can't read config `{path}`: {source}")]
	Io {
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("can't parse config `{path}`: {source}")]
	Parse {
		path: PathBuf,
		source: serde_json::Error,
	},
	#[error("invalid config: {0}")]
	Invalid(String),
}

impl EngineConfig {
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let text = fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
		let config: EngineConfig = serde_json::from_str(&text)
			.map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_expression_len == 0 || self.max_nesting_depth == 0 {
			return Err(ConfigError::Invalid("max_expression_len and max_nesting_depth must be positive".to_string()));
		}
		if self.max_truth_table_variables == 0 {
			return Err(ConfigError::Invalid("max_truth_table_variables must be positive".to_string()));
		}
		if self.generator.max_attempts == 0 {
			return Err(ConfigError::Invalid("generator.max_attempts must be positive".to_string()));
		}
		if self.generator.max_target_terms == 0 {
			return Err(ConfigError::Invalid("generator.max_target_terms must be positive".to_string()));
		}
		Ok(())
	}
}

//! Loader for configurations split across several files.
//!
//! The main file may name other files in `include`; their top-level sections
//! are merged into the main document. A section may appear in only one file.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Loads a main configuration file together with its includes.
pub struct ConfigLoader {
	/// Directory relative include paths are resolved against.
	base_path: PathBuf,
	/// Canonical paths already read, for cycle detection.
	visited: HashSet<PathBuf>,
	/// Top-level section name to the file that defined it.
	section_origins: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			visited: HashSet::new(),
			section_origins: HashMap::new(),
		}
	}

	/// Reads `config_path`, merges its includes and parses the result.
	///
	/// The merged document goes through the same env expansion and
	/// validation as a single-file configuration.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let main_path = self.resolve_path(config_path)?;
		let main_content = self.read_file(&main_path).await?;
		let mut document: toml::Value = toml::from_str(&main_content)?;

		let includes = Self::take_includes(&mut document)?;
		if includes.is_empty() {
			return main_content.parse();
		}

		self.record_sections(&document, &main_path)?;
		for include in includes {
			let include_path = self.resolve_path(&include)?;
			let content = self.read_file(&include_path).await?;
			let included: toml::Value = toml::from_str(&content)?;
			self.record_sections(&included, &include_path)?;
			merge_tables(&mut document, included);
		}

		let merged = toml::to_string(&document).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		merged.parse()
	}

	/// Reads a file once, expanding environment references.
	async fn read_file(&mut self, path: &Path) -> Result<String, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;

		if !self.visited.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		resolve_env_vars(&content)
	}

	/// Removes the `include` directive and returns the paths it named.
	///
	/// Accepts a single string or an array of strings.
	fn take_includes(document: &mut toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
		let Some(include) = document.as_table_mut().and_then(|t| t.remove("include")) else {
			return Ok(Vec::new());
		};

		match include {
			toml::Value::String(path) => Ok(vec![PathBuf::from(path)]),
			toml::Value::Array(items) => items
				.into_iter()
				.map(|item| match item {
					toml::Value::String(path) => Ok(PathBuf::from(path)),
					_ => Err(ConfigError::Validation(
						"Include array must contain only strings".into(),
					)),
				})
				.collect(),
			_ => Err(ConfigError::Validation(
				"Include must be a string or array of strings".into(),
			)),
		}
	}

	/// Claims every top-level section of `document` for `source`.
	fn record_sections(
		&mut self,
		document: &toml::Value,
		source: &Path,
	) -> Result<(), ConfigError> {
		let Some(table) = document.as_table() else {
			return Ok(());
		};
		for key in table.keys() {
			if let Some(existing) = self.section_origins.get(key) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}. \
					Each top-level section must be unique across all configuration files.",
					key,
					existing.display(),
					source.display()
				)));
			}
			self.section_origins
				.insert(key.clone(), source.to_path_buf());
		}
		Ok(())
	}

	/// Resolves a path against the base path and checks it exists.
	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

/// Copies the top-level entries of `source` into `target`.
fn merge_tables(target: &mut toml::Value, source: toml::Value) {
	if let (Some(target), toml::Value::Table(source)) = (target.as_table_mut(), source) {
		target.extend(source);
	}
}

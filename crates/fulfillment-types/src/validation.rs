//! Validation of backend configuration tables.
//!
//! Each backend implementation describes the TOML table it accepts as a
//! [`Schema`] of required and optional [`Field`]s and validates its own
//! configuration before the factory builds it.

use thiserror::Error;

/// Errors reported while validating a configuration table.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
	#[error("Failed to deserialize config: {0}")]
	DeserializationError(String),
}

/// Expected type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// Array whose elements all have the inner type.
	Array(Box<FieldType>),
	/// Nested table validated by its own schema.
	Table(Schema),
}

/// Extra check run after the type check passes.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field of a schema.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Attaches a custom check, e.g. a URL scheme test.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		check_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of a configuration table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates `config`, which must be a table.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

fn mismatch(field: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn check_type(field: &str, value: &toml::Value, expected: &FieldType) -> Result<(), ValidationError> {
	match expected {
		FieldType::String => {
			if !value.is_str() {
				return Err(mismatch(field, "string", value));
			}
		},
		FieldType::Boolean => {
			if !value.is_bool() {
				return Err(mismatch(field, "boolean", value));
			}
		},
		FieldType::Integer { min, max } => {
			let n = value
				.as_integer()
				.ok_or_else(|| mismatch(field, "integer", value))?;
			if let Some(min) = min.filter(|min| n < *min) {
				return Err(ValidationError::InvalidValue {
					field: field.to_string(),
					message: format!("Value {} is less than minimum {}", n, min),
				});
			}
			if let Some(max) = max.filter(|max| n > *max) {
				return Err(ValidationError::InvalidValue {
					field: field.to_string(),
					message: format!("Value {} is greater than maximum {}", n, max),
				});
			}
		},
		FieldType::Array(inner) => {
			let items = value
				.as_array()
				.ok_or_else(|| mismatch(field, "array", value))?;
			for (i, item) in items.iter().enumerate() {
				check_type(&format!("{}[{}]", field, i), item, inner)?;
			}
		},
		FieldType::Table(schema) => {
			schema.validate(value).map_err(|e| prefix_field(field, e))?;
		},
	}

	Ok(())
}

fn prefix_field(parent: &str, error: ValidationError) -> ValidationError {
	match error {
		ValidationError::MissingField(f) => ValidationError::MissingField(format!("{}.{}", parent, f)),
		ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
			field: format!("{}.{}", parent, field),
			message,
		},
		ValidationError::TypeMismatch {
			field,
			expected,
			actual,
		} => ValidationError::TypeMismatch {
			field: format!("{}.{}", parent, field),
			expected,
			actual,
		},
		other => other,
	}
}

/// Implemented by backends to validate their configuration table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

/// Checks that a string field holds an http(s) URL.
pub fn http_url(value: &toml::Value) -> Result<(), String> {
	match value.as_str() {
		Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
		Some(url) => Err(format!("'{}' is not an http(s) URL", url)),
		None => Err("expected a string".to_string()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn webhook_schema() -> Schema {
		Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(http_url)],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(60),
				},
			)],
		)
	}

	#[test]
	fn test_missing_required_field() {
		let config: toml::Value = toml::from_str("timeout_seconds = 5").unwrap();
		let err = webhook_schema().validate(&config).unwrap_err();
		assert!(matches!(err, ValidationError::MissingField(f) if f == "url"));
	}

	#[test]
	fn test_custom_validator_and_bounds() {
		let config: toml::Value = toml::from_str("url = \"ftp://x\"").unwrap();
		assert!(matches!(
			webhook_schema().validate(&config),
			Err(ValidationError::InvalidValue { .. })
		));

		let config: toml::Value =
			toml::from_str("url = \"https://x\"\ntimeout_seconds = 600").unwrap();
		assert!(webhook_schema().validate(&config).is_err());

		let config: toml::Value =
			toml::from_str("url = \"https://x\"\ntimeout_seconds = 5").unwrap();
		assert!(webhook_schema().validate(&config).is_ok());
	}

	#[test]
	fn test_nested_field_names() {
		let schema = Schema::new(
			vec![Field::new(
				"retry",
				FieldType::Table(Schema::new(
					vec![Field::new("attempts", FieldType::Integer { min: None, max: None })],
					vec![],
				)),
			)],
			vec![],
		);
		let config: toml::Value = toml::from_str("[retry]\nattempts = \"three\"").unwrap();
		match schema.validate(&config) {
			Err(ValidationError::TypeMismatch { field, .. }) => assert_eq!(field, "retry.attempts"),
			other => panic!("unexpected result: {:?}", other),
		}
	}
}

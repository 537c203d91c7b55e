//! String formatting for logs and human-facing codes.

/// Truncates an identifier for log output.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((cut, _)) => format!("{}..", &id[..cut]),
		None => id.to_string(),
	}
}

/// Derives a short human-facing order code from an opaque id.
///
/// Takes the first six ASCII alphanumeric characters, upper-cased.
pub fn short_code(id: &str) -> String {
	id.chars()
		.filter(|c| c.is_ascii_alphanumeric())
		.take(6)
		.collect::<String>()
		.to_uppercase()
}

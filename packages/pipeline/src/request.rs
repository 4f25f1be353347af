//! Validated pipeline input.

use thiserror::Error;

/// Longest accepted use description, in characters.
pub const MAX_USE_TEXT_CHARS: usize = 2000;

/// Longest accepted address or municipality, in characters.
pub const MAX_ADDRESS_CHARS: usize = 300;

/// Input rejected before the pipeline starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// A required field is empty or whitespace.
    #[error("{field} must not be empty")]
    Empty {
        /// Field name.
        field: &'static str,
    },

    /// A field exceeds its length limit.
    #[error("{field} exceeds {max} characters")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Limit in characters.
        max: usize,
    },
}

/// An address plus a use description, trimmed and checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRequest {
    address: String,
    municipality: String,
    use_description: String,
}

impl ValidationRequest {
    /// Validates and trims the inputs.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] if any field is empty or too long.
    pub fn new(
        address: &str,
        municipality: &str,
        use_description: &str,
    ) -> Result<Self, InputError> {
        Ok(Self {
            address: checked("address", address, MAX_ADDRESS_CHARS)?,
            municipality: checked("municipality", municipality, MAX_ADDRESS_CHARS)?,
            use_description: checked("use description", use_description, MAX_USE_TEXT_CHARS)?,
        })
    }

    /// Street address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Municipality.
    #[must_use]
    pub fn municipality(&self) -> &str {
        &self.municipality
    }

    /// Free-text use description.
    #[must_use]
    pub fn use_description(&self) -> &str {
        &self.use_description
    }
}

fn checked(field: &'static str, value: &str, max: usize) -> Result<String, InputError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InputError::Empty { field });
    }
    if value.chars().count() > max {
        return Err(InputError::TooLong { field, max });
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_fields() {
        let request =
            ValidationRequest::new("  Calle Luna 123 ", "San Juan", " una residencia ").unwrap();
        assert_eq!(request.address(), "Calle Luna 123");
        assert_eq!(request.use_description(), "una residencia");
    }

    #[test]
    fn rejects_blank_fields() {
        assert_eq!(
            ValidationRequest::new("   ", "San Juan", "casa"),
            Err(InputError::Empty { field: "address" })
        );
        assert_eq!(
            ValidationRequest::new("Calle Luna 123", "San Juan", "\n"),
            Err(InputError::Empty {
                field: "use description"
            })
        );
    }

    #[test]
    fn rejects_oversized_description() {
        let text = "a".repeat(MAX_USE_TEXT_CHARS + 1);
        assert!(matches!(
            ValidationRequest::new("Calle Luna 123", "San Juan", &text),
            Err(InputError::TooLong { .. })
        ));
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Text instruction submitted for evaluation. Identity is the text itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Directive(String);

impl Directive {
    /// Validates and wraps directive text. Blank text is rejected.
    pub fn new(text: impl Into<String>) -> Result<Self, PipelineError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "directive text must not be empty".into(),
            ));
        }
        Ok(Self(text))
    }

    /// Borrowed directive text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of characters (not bytes) in the directive.
    #[must_use]
    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }
}

impl TryFrom<String> for Directive {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Directive> for String {
    fn from(value: Directive) -> Self {
        value.0
    }
}

impl AsRef<str> for Directive {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

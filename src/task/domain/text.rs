//! Validated free-text values carried by tasks.

use super::{TaskDomainError, TaskTransition};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trimmed, non-empty task description of at most
/// [`TaskDescription::MAX_CHARS`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskDescription(String);

impl TaskDescription {
    /// Maximum description length, counted in characters after trimming.
    pub const MAX_CHARS: usize = 2000;

    /// Creates a validated description.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyDescription`] when the value is empty
    /// after trimming, or [`TaskDomainError::DescriptionTooLong`] when it
    /// exceeds [`Self::MAX_CHARS`].
    pub fn new(value: impl AsRef<str>) -> Result<Self, TaskDomainError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TaskDomainError::EmptyDescription);
        }
        let length = trimmed.chars().count();
        if length > Self::MAX_CHARS {
            return Err(TaskDomainError::DescriptionTooLong {
                length,
                max: Self::MAX_CHARS,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the description as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskDescription {
    type Error = TaskDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskDescription> for String {
    fn from(value: TaskDescription) -> Self {
        value.0
    }
}

impl AsRef<str> for TaskDescription {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for TaskDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trimmed, non-empty reason attached to a cancel or defer transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reason(String);

impl Reason {
    /// Creates a validated reason for the given transition.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyReason`] when the value is empty
    /// after trimming.
    pub fn new(
        value: impl AsRef<str>,
        transition: TaskTransition,
    ) -> Result<Self, TaskDomainError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TaskDomainError::EmptyReason(transition));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the reason as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Reason {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! Parameter type model.
//!
//! A command parameter is one of a closed set of [`ParameterType`]s. Each
//! carries a name and description bound by the platform's limits, and the
//! string and integer kinds may additionally carry a fixed list of choices.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DefinitionError, DefinitionResult};

/// Maximum length of a command, group, subcommand or parameter name.
pub const MAX_NAME_LEN: usize = 32;

/// Maximum length of any description.
pub const MAX_DESCRIPTION_LEN: usize = 100;

/// Maximum number of parameters on a single command.
pub const MAX_PARAMETERS: usize = 25;

// ─── ParameterType ────────────────────────────────────────────────────────────

/// The kind of value a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Mentionable,
}

impl ParameterType {
    /// Returns the lowercase type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::User => "user",
            Self::Channel => "channel",
            Self::Role => "role",
            Self::Mentionable => "mentionable",
        }
    }

    /// Whether parameters of this kind may declare fixed choices.
    pub fn supports_choices(&self) -> bool {
        matches!(self, Self::String | Self::Integer)
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Choices ──────────────────────────────────────────────────────────────────

/// The value a choice resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChoiceValue {
    String(String),
    Integer(i64),
}

impl ChoiceValue {
    fn matches(&self, kind: ParameterType) -> bool {
        matches!(
            (self, kind),
            (Self::String(_), ParameterType::String) | (Self::Integer(_), ParameterType::Integer)
        )
    }
}

/// A labelled, fixed value offered to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub label: String,
    pub value: ChoiceValue,
}

impl Choice {
    /// A string-valued choice.
    pub fn string(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: ChoiceValue::String(value.into()),
        }
    }

    /// An integer-valued choice.
    pub fn integer(label: impl Into<String>, value: i64) -> Self {
        Self {
            label: label.into(),
            value: ChoiceValue::Integer(value),
        }
    }
}

// ─── Parameter ────────────────────────────────────────────────────────────────

/// A validated command parameter.
///
/// Constructed only through [`Parameter::new`], so every instance satisfies
/// the naming, description and choice rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    kind: ParameterType,
    name: String,
    description: String,
    choices: Vec<Choice>,
}

impl Parameter {
    /// Creates a parameter without choices.
    pub fn new(
        kind: ParameterType,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> DefinitionResult<Self> {
        let name = name.into();
        let description = description.into();
        validate_name("parameter", &name)?;
        validate_description(&name, &description)?;
        Ok(Self {
            kind,
            name,
            description,
            choices: Vec::new(),
        })
    }

    /// Attaches fixed choices.
    ///
    /// Only string and integer parameters accept choices, and every choice
    /// value must match the parameter's type.
    pub fn with_choices(mut self, choices: Vec<Choice>) -> DefinitionResult<Self> {
        if choices.is_empty() {
            return Ok(self);
        }
        if !self.kind.supports_choices() {
            return Err(DefinitionError::ChoicesNotAllowed { kind: self.kind });
        }
        for choice in &choices {
            validate_description(&choice.label, &choice.label)?;
            if !choice.value.matches(self.kind) {
                return Err(DefinitionError::ChoiceTypeMismatch {
                    label: choice.label.clone(),
                    kind: self.kind,
                });
            }
        }
        self.choices = choices;
        Ok(self)
    }

    pub fn kind(&self) -> ParameterType {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }
}

// ─── Validation helpers ───────────────────────────────────────────────────────

/// Checks a command, group, subcommand or parameter name.
///
/// Names are 1-32 characters drawn from `[A-Za-z0-9_-]`.
pub fn validate_name(what: &'static str, name: &str) -> DefinitionResult<()> {
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(DefinitionError::NameLength {
            what,
            name: name.to_string(),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(DefinitionError::NameCharset {
            what,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Checks that a description is 1-100 characters long.
pub fn validate_description(owner: &str, description: &str) -> DefinitionResult<()> {
    let len = description.chars().count();
    if len == 0 || len > MAX_DESCRIPTION_LEN {
        return Err(DefinitionError::DescriptionLength {
            owner: owner.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_rules() {
        assert!(validate_name("command", "ping").is_ok());
        assert!(validate_name("command", "set_volume-2").is_ok());
        assert!(matches!(
            validate_name("command", ""),
            Err(DefinitionError::NameLength { .. })
        ));
        assert!(matches!(
            validate_name("command", &"x".repeat(33)),
            Err(DefinitionError::NameLength { .. })
        ));
        assert!(validate_name("command", &"x".repeat(32)).is_ok());
        assert!(matches!(
            validate_name("command", "two words"),
            Err(DefinitionError::NameCharset { .. })
        ));
    }

    #[test]
    fn test_description_rules() {
        assert!(Parameter::new(ParameterType::String, "query", "").is_err());
        assert!(Parameter::new(ParameterType::String, "query", "x".repeat(101)).is_err());
        assert!(Parameter::new(ParameterType::String, "query", "x".repeat(100)).is_ok());
    }

    #[test]
    fn test_choices_only_on_string_and_integer() {
        let string = Parameter::new(ParameterType::String, "unit", "Unit")
            .unwrap()
            .with_choices(vec![Choice::string("Metres", "m")])
            .unwrap();
        assert_eq!(string.choices().len(), 1);

        let integer = Parameter::new(ParameterType::Integer, "count", "Count")
            .unwrap()
            .with_choices(vec![Choice::integer("One", 1)]);
        assert!(integer.is_ok());

        let boolean = Parameter::new(ParameterType::Boolean, "flag", "Flag")
            .unwrap()
            .with_choices(vec![Choice::string("Yes", "yes")]);
        assert_eq!(
            boolean.unwrap_err(),
            DefinitionError::ChoicesNotAllowed {
                kind: ParameterType::Boolean
            }
        );
    }

    #[test]
    fn test_choice_value_must_match_kind() {
        let result = Parameter::new(ParameterType::Integer, "count", "Count")
            .unwrap()
            .with_choices(vec![Choice::string("One", "1")]);
        assert!(matches!(
            result,
            Err(DefinitionError::ChoiceTypeMismatch { .. })
        ));
    }
}

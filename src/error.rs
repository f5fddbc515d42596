//! クレート共通のエラー型

use thiserror::Error;

/// mvp-assistant全体のエラー型
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown stat field: {0}")]
    UnknownField(String),
}

pub type AssistantResult<T> = Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use crate::session::StatField;

    #[test]
    fn test_error_display() {
        let error = AssistantError::UnknownField("yards".to_string());
        assert_eq!(error.to_string(), "Unknown stat field: yards");

        let error = AssistantError::InvalidInput("usage: set <field> <value>".to_string());
        assert_eq!(error.to_string(), "Invalid input: usage: set <field> <value>");
    }

    #[test]
    fn test_unknown_field_from_parse() {
        let result: AssistantResult<StatField> = StatField::from_str(" touchdowns ");
        assert!(matches!(
            result,
            Err(AssistantError::UnknownField(name)) if name == "touchdowns"
        ));
    }
}

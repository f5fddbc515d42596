pub mod api;
pub mod config_manager;
pub mod error;
pub mod history;
pub mod session;
pub mod utils;

// Re-export the main error types for convenience
pub use api::FetchError;
pub use error::{AssistantError, AssistantResult};

// Re-export the HTTP client and service contract
pub use api::{HttpPredictionClient, PredictionApi, StatLine};

// Re-export session state machines
pub use session::{
    AssistantSession, ChatSession, PredictionForm, PredictionStore, SendOutcome, StateChange,
    SubmitOutcome, ValidationPolicy,
};

pub use history::HistoricalTable;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        // Test that the main modules are accessible
        assert!(std::any::type_name::<HttpPredictionClient>().contains("HttpPredictionClient"));
        assert!(std::any::type_name::<AssistantSession>().contains("AssistantSession"));
    }

    #[test]
    fn test_error_types_re_exported() {
        let _fetch_error = FetchError::Timeout { endpoint: "/predict" };
        let _assistant_error = AssistantError::InvalidInput("test".to_string());
        let _result: AssistantResult<()> = Ok(());
    }
}

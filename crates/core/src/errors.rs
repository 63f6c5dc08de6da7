use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown intent label `{0}`")]
    UnknownIntent(String),
    #[error("knowledge base entry `{id}` is invalid: {reason}")]
    InvalidKnowledgeEntry { id: String, reason: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("message processing failure: {0}")]
    Processing(String),
}

/// What a customer is allowed to see when a message cannot be answered.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Internal { .. } => {
                "I apologize, but I'm experiencing technical difficulties. Please try again in a moment."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    /// Every failure that reaches the customer is reported as internal; the
    /// detail stays in the message for logs.
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        InterfaceError::Internal { message: self.to_string(), correlation_id: correlation_id.into() }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn domain_error_still_gets_the_technical_difficulties_message() {
        let interface = ApplicationError::from(DomainError::InvalidKnowledgeEntry {
            id: "Policy3.1".to_owned(),
            reason: "answer is blank".to_owned(),
        })
        .into_interface("msg-1");

        assert!(matches!(
            interface,
            InterfaceError::Internal {
                ref correlation_id,
                ..
            } if correlation_id == "msg-1"
        ));
        assert_eq!(interface.correlation_id(), "msg-1");
        assert!(interface.user_message().contains("technical difficulties"));
        assert!(interface.to_string().contains("answer is blank"));
    }

    #[test]
    fn processing_error_maps_to_technical_difficulties_message() {
        let interface =
            ApplicationError::Processing("prompt assembly failed".to_owned()).into_interface("msg-3");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert!(interface.user_message().contains("technical difficulties"));
        assert!(interface.to_string().contains("prompt assembly failed"));
    }
}

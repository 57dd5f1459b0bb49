use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("generation failed: {0}")] GenerationFailure(String),
    #[error("malformed payload: {0}")] MalformedPayload(String),
    #[error("response did not match the expected {feature} shape: {detail}")]
    InvalidResponseShape { feature: &'static str, detail: String },
    #[error("insufficient credits: {cost} required, action refused")]
    InsufficientEntitlement { cost: u64 },
    #[error("operation {id} did not finish after {attempts} status checks")]
    OperationTimeout { id: String, attempts: u32 },
    #[error("operation cancelled")] Cancelled,
    #[error("config error: {0}")] Config(String),
    #[error("storage error: {0}")] Storage(String),
}

pub type ShopResult<T> = Result<T, ShopError>;

impl From<reqwest::Error> for ShopError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ShopError::GenerationFailure(format!("backend timed out: {err}"))
        } else {
            ShopError::GenerationFailure(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ShopError {
    fn from(err: serde_json::Error) -> Self {
        ShopError::MalformedPayload(err.to_string())
    }
}

impl From<std::io::Error> for ShopError {
    fn from(err: std::io::Error) -> Self {
        ShopError::Storage(err.to_string())
    }
}

impl ShopError {
    /// Message shown to the user at the feature boundary.
    pub fn user_notice(&self) -> String {
        match self {
            ShopError::GenerationFailure(_) => {
                "The AI service could not complete this request. Please try again.".into()
            }
            ShopError::MalformedPayload(_) | ShopError::InvalidResponseShape { .. } => {
                "The AI returned a result we could not read. Please try again.".into()
            }
            ShopError::InsufficientEntitlement { cost } => format!(
                "You need {cost} credits for this action. Run `shopsage topup` to add credits."
            ),
            ShopError::OperationTimeout { .. } => {
                "Generation is taking too long and was stopped. Please try again later.".into()
            }
            ShopError::Cancelled => "Cancelled.".into(),
            ShopError::Config(msg) => format!("Configuration problem: {msg}"),
            ShopError::Storage(msg) => format!("Could not save: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_entitlement_points_to_topup() {
        let err = ShopError::InsufficientEntitlement { cost: 20 };
        assert!(err.to_string().contains("20"));
        assert!(err.user_notice().contains("topup"));
    }

    #[test]
    fn json_errors_become_malformed_payload() {
        let err: ShopError = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err().into();
        assert!(matches!(err, ShopError::MalformedPayload(_)));
    }
}

use thiserror::Error;

/// Why an engine action was rejected. State is unchanged whenever one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("insufficient funds: need {needed}, have {available:.2}")]
    InsufficientFunds { needed: u64, available: f64 },

    #[error("{worker} is at capacity ({cap})")]
    AtCapacity { worker: String, cap: u32 },

    #[error("locked until milestone {milestone} is purchased")]
    Locked { milestone: u8 },

    #[error("milestone {0} already purchased")]
    AlreadyPurchased(u8),

    #[error("unknown milestone level {0}")]
    UnknownMilestone(u8),

    #[error("unknown worker type '{0}'")]
    UnknownWorker(String),

    #[error("unknown upgrade '{0}'")]
    UnknownUpgrade(String),
}

impl ActionError {
    /// Caller bugs, as opposed to ordinary gameplay refusals.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            ActionError::UnknownMilestone(_)
                | ActionError::UnknownWorker(_)
                | ActionError::UnknownUpgrade(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("storage unavailable")]
    StorageUnavailable,

    #[error("storage write failed: {0}")]
    Write(String),

    #[error("storage read failed: {0}")]
    Read(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid save document: {0}")]
    Invalid(String),

    #[error("save version {saved} is older than minimum compatible {min}")]
    TooOld { saved: u32, min: u32 },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

use thiserror::Error;

// Validation and Conflict are caller-visible outcomes; Busy and Store are
// infrastructure trouble.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Validation(String),

    #[error("insufficient stock for \"{title}\": requested {requested}, available {available}")]
    Conflict {
        title: String,
        requested: i64,
        available: i64,
    },

    #[error("store busy during {op}, please retry")]
    Busy { op: String },

    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),
}

impl ToolError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn class(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict { .. } => "conflict",
            Self::Busy { .. } => "busy",
            Self::Store(_) => "store",
        }
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("model call failed: {0}")]
    Model(anyhow::Error),

    #[error("model returned an unusable plan")]
    Unparseable { raw: String },
}

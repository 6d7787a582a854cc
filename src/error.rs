//! Error taxonomy for action resolution and the session around it.
//!
//! - [`ResolutionError`]: the model's answer was unusable. Recoverable: the
//!   resolver turns it into feedback and asks again.
//! - [`AgentError`]: anything that escapes the resolver or the session step.

use thiserror::Error;

use crate::action::{Literal, Operation, ParamKind};
use crate::config::ConfigError;
use crate::crawler::CrawlError;
use crate::grammar::ParseError;
use crate::model::ModelError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("No code blocks found, please include a code block in your response")]
    NoCodeBlock,

    #[error("Could not parse the code block: {0}")]
    Parse(#[from] ParseError),

    #[error("No function called")]
    NoFunctionCalled,

    #[error("No id specified for {0}()")]
    MissingId(Operation),

    #[error("click() called but id {0} is not clickable")]
    NotClickable(Literal),

    #[error("type() called but id {0} is not inputable")]
    NotInputable(Literal),

    #[error("Function type() expected 3 arguments, got {0}")]
    ArityMismatch(usize),

    #[error("{operation}() got an unexpected keyword argument '{name}'")]
    UnexpectedArgument { operation: Operation, name: String },

    #[error("{operation}() argument '{name}' must be {}, got {found}", .expected.name())]
    InvalidArgument {
        operation: Operation,
        name: &'static str,
        expected: ParamKind,
        found: Literal,
    },
}

impl ResolutionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolutionError::NoCodeBlock => "NoCodeBlock",
            ResolutionError::Parse(_) => "ParseError",
            ResolutionError::NoFunctionCalled => "NoFunctionCalled",
            ResolutionError::MissingId(_) => "MissingId",
            ResolutionError::NotClickable(_) => "NotClickable",
            ResolutionError::NotInputable(_) => "NotInputable",
            ResolutionError::ArityMismatch(_) => "ArityMismatch",
            ResolutionError::UnexpectedArgument { .. } => "UnexpectedArgument",
            ResolutionError::InvalidArgument { .. } => "InvalidArgument",
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Max retries exceeded! Gave up after {attempts} attempts, last error: {last}")]
    ResolutionExhausted {
        attempts: usize,
        last: ResolutionError,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Crawl(#[from] CrawlError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// The page was still loading. Crawling again after a pause should work.
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Crawl(e) if e.is_transient())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unsettled_pages_are_transient() {
        assert!(AgentError::Crawl(CrawlError::NotReady("loading".into())).is_transient());
        assert!(!AgentError::Crawl(CrawlError::Browser("tab crashed".into())).is_transient());
        assert!(!AgentError::Crawl(CrawlError::UnknownNode(7)).is_transient());
        assert!(!AgentError::Model(ModelError::Stream("eof".into())).is_transient());
    }
}

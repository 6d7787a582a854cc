//! Drive a browser toward a natural-language objective, one model-chosen
//! action at a time.
//!
//! The crate owns the action-resolution protocol: render the page for the
//! model ([`prompt`]), then turn the model's free-form answer into exactly one
//! validated [`Action`] or a terminal failure ([`resolver`]). Browser control
//! and text generation sit behind the [`Crawler`] and [`ModelService`] traits.

pub mod action;
pub mod artifacts;
pub mod config;
pub mod crawler;
pub mod error;
pub mod grammar;
pub mod model;
pub mod page;
pub mod prompt;
pub mod resolver;
pub mod transcript;

pub use action::{Action, Literal, Operation, StepOutcome};
pub use artifacts::ArtifactSink;
pub use config::AgentConfig;
pub use crawler::{CrawlError, Crawler, ScrollDirection};
pub use error::{AgentError, ResolutionError};
pub use model::{FragmentReceiver, GenerationParams, ModelError, ModelService};
pub use page::{Node, NodeId, PageIndex};
pub use prompt::PromptBuilder;
pub use resolver::{ActionResolver, ResolutionObserver};
pub use transcript::{ChatMessage, Role, Transcript};

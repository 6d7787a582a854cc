//! Turns a free-form model response into one validated [`Action`].
//!
//! Each attempt runs `AwaitResponse -> Parse -> Validate`. A failure in parse
//! or validation moves to `RetryFeedback`, which appends the error to the
//! transcript as a user message and asks again. Once `max_retries` attempts
//! have failed the resolver stops in `Exhausted` and reports
//! [`AgentError::ResolutionExhausted`]. Model-service errors are not retried
//! here; they propagate to the caller.

use regex::Regex;
use std::fmt::Write;
use std::sync::{Arc, OnceLock};

use crate::action::{Action, Literal, Operation};
use crate::artifacts::ArtifactSink;
use crate::config::MAX_RETRIES;
use crate::error::{AgentError, ResolutionError};
use crate::grammar::{Call, parse_call};
use crate::model::{GenerationParams, ModelService};
use crate::page::{NodeId, PageIndex};
use crate::transcript::Transcript;

/// Hooks for surfacing resolution progress to an operator as it happens.
pub trait ResolutionObserver: Send + Sync {
    fn on_fragment(&self, _fragment: &str) {}

    fn on_response_end(&self) {}

    fn on_feedback(&self, _error: &ResolutionError, _detail: &str) {}
}

#[derive(Debug)]
enum State {
    AwaitResponse,
    Parse { response: String },
    Validate { code: String, call: Option<Call> },
    RetryFeedback {
        error: ResolutionError,
        code: Option<String>,
    },
    Success(Action),
    Exhausted(ResolutionError),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::AwaitResponse => "await_response",
            State::Parse { .. } => "parse",
            State::Validate { .. } => "validate",
            State::RetryFeedback { .. } => "retry_feedback",
            State::Success(_) => "success",
            State::Exhausted(_) => "exhausted",
        }
    }
}

pub struct ActionResolver<M> {
    model: M,
    params: GenerationParams,
    max_retries: usize,
    artifacts: Option<ArtifactSink>,
    observer: Option<Arc<dyn ResolutionObserver>>,
}

impl<M: ModelService> ActionResolver<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            params: GenerationParams::default(),
            max_retries: MAX_RETRIES,
            artifacts: None,
            observer: None,
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_artifacts(mut self, sink: ArtifactSink) -> Self {
        self.artifacts = Some(sink);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ResolutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Ask the model for the next action against `index`.
    ///
    /// The transcript must already end with this step's user message. Every
    /// response and every correction is appended to it.
    pub async fn resolve(
        &self,
        transcript: &mut Transcript,
        index: &PageIndex,
    ) -> Result<Action, AgentError> {
        let mut retries = 0;
        let mut state = State::AwaitResponse;

        loop {
            tracing::debug!(state = state.name(), retries, "resolver state");
            state = match state {
                State::AwaitResponse => State::Parse {
                    response: self.await_response(transcript).await?,
                },
                State::Parse { response } => match extract_last_code_block(&response) {
                    None => State::RetryFeedback {
                        error: ResolutionError::NoCodeBlock,
                        code: None,
                    },
                    Some(code) => match parse_call(code) {
                        Ok(call) => State::Validate {
                            code: code.to_string(),
                            call,
                        },
                        Err(e) => State::RetryFeedback {
                            error: e.into(),
                            code: Some(code.to_string()),
                        },
                    },
                },
                State::Validate { code, call } => match validate(call, index) {
                    Ok(action) => State::Success(action),
                    Err(error) => State::RetryFeedback {
                        error,
                        code: Some(code),
                    },
                },
                State::RetryFeedback { error, code } => {
                    retries += 1;
                    let detail = diagnostic(&error, code.as_deref(), retries, self.max_retries);
                    tracing::warn!(
                        kind = error.kind(),
                        attempt = retries,
                        max_retries = self.max_retries,
                        "feeding error back to the model: {error}"
                    );
                    if let Some(observer) = &self.observer {
                        observer.on_feedback(&error, &detail);
                    }
                    transcript.push_user(feedback_message(&error, &detail));
                    self.persist(transcript);

                    if retries >= self.max_retries {
                        State::Exhausted(error)
                    } else {
                        State::AwaitResponse
                    }
                }
                State::Success(action) => {
                    tracing::info!(
                        operation = %action.operation(),
                        action = ?action,
                        attempts = retries + 1,
                        "resolved action"
                    );
                    return Ok(action);
                }
                State::Exhausted(last) => {
                    tracing::error!(attempts = retries, "action resolution exhausted");
                    return Err(AgentError::ResolutionExhausted {
                        attempts: retries,
                        last,
                    });
                }
            };
        }
    }

    async fn await_response(&self, transcript: &mut Transcript) -> Result<String, AgentError> {
        let mut fragments = self.model.stream(transcript, &self.params).await?;

        let mut response = String::new();
        while let Some(fragment) = fragments.recv().await {
            let fragment = fragment?;
            if let Some(observer) = &self.observer {
                observer.on_fragment(&fragment);
            }
            response.push_str(&fragment);
        }
        if let Some(observer) = &self.observer {
            observer.on_response_end();
        }

        tracing::debug!(chars = response.len(), "model response complete");
        transcript.push_assistant(response.clone());
        self.persist(transcript);
        Ok(response)
    }

    fn persist(&self, transcript: &Transcript) {
        if let Some(sink) = &self.artifacts {
            sink.write_transcript(transcript);
        }
    }
}

fn code_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_+\-]*[ \t]*\r?\n(.*?)\r?\n[ \t]*```")
            .expect("code block pattern is valid")
    })
}

/// Body of the last fenced code block in `text`, if any.
pub fn extract_last_code_block(text: &str) -> Option<&str> {
    code_block_pattern()
        .captures_iter(text)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Check a parsed call against the grammar and the current page.
pub fn validate(call: Option<Call>, index: &PageIndex) -> Result<Action, ResolutionError> {
    let call = call.ok_or(ResolutionError::NoFunctionCalled)?;

    let action = match call.operation {
        // Undeclared keywords are ignored everywhere except type().
        Operation::GoBack => Action::GoBack,
        Operation::ScrollUp => Action::ScrollUp,
        Operation::ScrollDown => Action::ScrollDown,
        Operation::SetObjectiveComplete => Action::SetObjectiveComplete,
        Operation::Click => Action::Click {
            id: bound_id(&call, index)?,
        },
        Operation::Type => {
            let id = bound_id(&call, index)?;
            if call.args.len() != 3 {
                return Err(ResolutionError::ArityMismatch(call.args.len()));
            }
            check_arguments(&call)?;
            let (Some(Literal::Str(text)), Some(Literal::Bool(submit))) =
                (call.arg("text"), call.arg("submit"))
            else {
                return Err(ResolutionError::ArityMismatch(call.args.len()));
            };
            Action::Type {
                id,
                text: text.clone(),
                submit: *submit,
            }
        }
    };
    Ok(action)
}

/// Resolve the `id` argument of `click`/`type` against the matching set.
fn bound_id(call: &Call, index: &PageIndex) -> Result<NodeId, ResolutionError> {
    let raw = call
        .arg("id")
        .ok_or(ResolutionError::MissingId(call.operation))?;
    let id = match raw {
        Literal::Int(v) => NodeId::try_from(*v).ok(),
        _ => None,
    };

    match call.operation {
        Operation::Type => id
            .filter(|id| index.is_inputable(*id))
            .ok_or_else(|| ResolutionError::NotInputable(raw.clone())),
        _ => id
            .filter(|id| index.is_clickable(*id))
            .ok_or_else(|| ResolutionError::NotClickable(raw.clone())),
    }
}

/// Every argument must be in the signature and carry the declared type.
fn check_arguments(call: &Call) -> Result<(), ResolutionError> {
    let params = call.operation.params();
    for (name, value) in &call.args {
        let Some(&(param, kind)) = params.iter().find(|entry| entry.0 == name.as_str()) else {
            return Err(ResolutionError::UnexpectedArgument {
                operation: call.operation,
                name: name.clone(),
            });
        };
        if value.kind() != kind {
            return Err(ResolutionError::InvalidArgument {
                operation: call.operation,
                name: param,
                expected: kind,
                found: value.clone(),
            });
        }
    }
    Ok(())
}

fn diagnostic(error: &ResolutionError, code: Option<&str>, attempt: usize, max: usize) -> String {
    let mut out = format!("attempt {attempt} of {max}\n");
    match code {
        Some(code) => {
            out.push_str("code block:\n");
            for line in code.lines() {
                let _ = writeln!(out, "    {line}");
            }
        }
        None => out.push_str("code block: <none>\n"),
    }
    let _ = writeln!(out, "{}: {error}", error.kind());
    if let Some(source) = std::error::Error::source(error) {
        let _ = writeln!(out, "caused by: {source:?}");
    }
    out
}

fn feedback_message(error: &ResolutionError, detail: &str) -> String {
    format!(
        "{error}\n\nI got an error running your code. Here is the full error message:\n{detail}\nCan you fix the error and try again?"
    )
}

use std::collections::BTreeMap;
use std::fmt;

use crate::crawler::{CrawlError, Crawler, ScrollDirection};
use crate::page::{NodeId, PageIndex};

/// The closed set of operations the model may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GoBack,
    ScrollUp,
    ScrollDown,
    Click,
    Type,
    SetObjectiveComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Str,
    Bool,
}

impl ParamKind {
    pub fn name(self) -> &'static str {
        match self {
            ParamKind::Int => "int",
            ParamKind::Str => "str",
            ParamKind::Bool => "bool",
        }
    }
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::GoBack,
        Operation::ScrollUp,
        Operation::ScrollDown,
        Operation::Click,
        Operation::Type,
        Operation::SetObjectiveComplete,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::GoBack => "go_back",
            Operation::ScrollUp => "scroll_up",
            Operation::ScrollDown => "scroll_down",
            Operation::Click => "click",
            Operation::Type => "type",
            Operation::SetObjectiveComplete => "set_objective_complete",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Keyword parameters in declaration order.
    pub fn params(self) -> &'static [(&'static str, ParamKind)] {
        match self {
            Operation::Click => &[("id", ParamKind::Int)],
            Operation::Type => &[
                ("id", ParamKind::Int),
                ("text", ParamKind::Str),
                ("submit", ParamKind::Bool),
            ],
            Operation::GoBack
            | Operation::ScrollUp
            | Operation::ScrollDown
            | Operation::SetObjectiveComplete => &[],
        }
    }

    /// Typed signature, e.g. `type(id: int, text: str, submit: bool)`.
    pub fn signature(self) -> String {
        let params: Vec<String> = self
            .params()
            .iter()
            .map(|(name, kind)| format!("{name}: {}", kind.name()))
            .collect();
        format!("{}({})", self.name(), params.join(", "))
    }

    /// Call template shown in the output format, e.g. `click(id=...)`.
    pub fn template(self) -> String {
        let params: Vec<String> = self
            .params()
            .iter()
            .map(|(name, _)| format!("{name}=..."))
            .collect();
        format!("{}({})", self.name(), params.join(", "))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A literal argument value from a parsed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl Literal {
    pub fn kind(&self) -> ParamKind {
        match self {
            Literal::Int(_) => ParamKind::Int,
            Literal::Str(_) => ParamKind::Str,
            Literal::Bool(_) => ParamKind::Bool,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Str(v) => write!(f, "{v:?}"),
            Literal::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// A validated action, bound against the page index it was checked on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    GoBack,
    ScrollUp,
    ScrollDown,
    Click { id: NodeId },
    Type { id: NodeId, text: String, submit: bool },
    SetObjectiveComplete,
}

/// What the session loop should do after an action ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    ObjectiveComplete,
}

impl Action {
    pub fn operation(&self) -> Operation {
        match self {
            Action::GoBack => Operation::GoBack,
            Action::ScrollUp => Operation::ScrollUp,
            Action::ScrollDown => Operation::ScrollDown,
            Action::Click { .. } => Operation::Click,
            Action::Type { .. } => Operation::Type,
            Action::SetObjectiveComplete => Operation::SetObjectiveComplete,
        }
    }

    /// The keyword arguments the action was resolved with.
    pub fn params(&self) -> BTreeMap<&'static str, Literal> {
        let mut params = BTreeMap::new();
        match self {
            Action::Click { id } => {
                params.insert("id", Literal::Int(i64::from(*id)));
            }
            Action::Type { id, text, submit } => {
                params.insert("id", Literal::Int(i64::from(*id)));
                params.insert("text", Literal::Str(text.clone()));
                params.insert("submit", Literal::Bool(*submit));
            }
            Action::GoBack
            | Action::ScrollUp
            | Action::ScrollDown
            | Action::SetObjectiveComplete => {}
        }
        params
    }

    /// Operator-facing description of what running the action will do.
    pub fn describe(&self, index: &PageIndex) -> String {
        let node_text = |id: &NodeId| {
            index
                .node(*id)
                .map(|n| n.text.clone())
                .unwrap_or_else(|| format!("<missing node {id}>"))
        };
        match self {
            Action::Type { id, text, submit } => {
                let verb = if *submit { "Type and submit" } else { "Type" };
                format!("{verb} '{text}' into:\n{}\n", node_text(id))
            }
            Action::Click { id } => format!("Click:\n{}\n", node_text(id)),
            Action::ScrollUp => "Scroll up\n".to_string(),
            Action::ScrollDown => "Scroll down\n".to_string(),
            Action::GoBack => "Go back\n".to_string(),
            Action::SetObjectiveComplete => "Objective complete!!".to_string(),
        }
    }

    /// Hand the action to the crawler.
    pub fn apply<C: Crawler + ?Sized>(
        &self,
        crawler: &mut C,
        index: &PageIndex,
    ) -> Result<StepOutcome, CrawlError> {
        match self {
            Action::GoBack => crawler.go_back()?,
            Action::ScrollUp => crawler.scroll(ScrollDirection::Up)?,
            Action::ScrollDown => crawler.scroll(ScrollDirection::Down)?,
            Action::Click { id } => {
                let node = index.clickable(*id).ok_or(CrawlError::UnknownNode(*id))?;
                crawler.click(node)?;
            }
            Action::Type { id, text, submit } => {
                let node = index.inputable(*id).ok_or(CrawlError::UnknownNode(*id))?;
                crawler.type_text(node, text, *submit)?;
            }
            Action::SetObjectiveComplete => return Ok(StepOutcome::ObjectiveComplete),
        }
        Ok(StepOutcome::Continue)
    }
}

use std::fmt::Write;

use crate::action::Operation;
use crate::artifacts::ArtifactSink;
use crate::page::PageIndex;
use crate::transcript::Transcript;

/// Renders page state and task state into transcript entries.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    objective: String,
    persona: String,
    artifacts: Option<ArtifactSink>,
}

impl PromptBuilder {
    pub fn new(objective: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            persona: persona.into(),
            artifacts: None,
        }
    }

    pub fn with_artifacts(mut self, sink: ArtifactSink) -> Self {
        self.artifacts = Some(sink);
        self
    }

    pub fn objective(&self) -> &str {
        &self.objective
    }

    /// Takes effect for system messages built from now on. A transcript that
    /// already has one keeps it.
    pub fn set_objective(&mut self, objective: impl Into<String>) {
        self.objective = objective.into();
    }

    /// Seed the transcript on first use, then append this step's page.
    ///
    /// Returns the rendered page index.
    pub fn prepare(&self, index: &PageIndex, transcript: &mut Transcript) -> String {
        let rendered = render_page_index(index);
        if let Some(sink) = &self.artifacts {
            sink.write_page_index(&rendered);
        }

        if transcript.is_empty() {
            transcript.push_system(self.system_message());
        }
        transcript.push_user(user_message(&rendered));

        tracing::debug!(
            nodes = index.len(),
            messages = transcript.len(),
            "prepared transcript for step"
        );
        rendered
    }

    pub fn system_message(&self) -> String {
        format!(
            "Your objective is: \"{objective}\"\n\
             Your user persona is: \"{persona}\", make sure your reflections match your persona's personality\n\
             You are given a browser where you can either go back a page, scroll up/down, click, or type into <node> elements on the page.\n\
             If you believe you have accomplished your objective, call the set_objective_complete() function to finish your task.\n\
             You can only click on nodes with clickable=true, or type into nodes with inputable=true.\n\
             You can only call one function at a time, and always output a single one-line code block\n\
             Output in the following format:\n\
             {format}\n\
             Do not repeat the questions in the output, only the headings and numbers.",
            objective = self.objective,
            persona = self.persona,
            format = output_format(),
        )
    }
}

/// Wrap every node in a `<node>` tag carrying its id and capability flags.
///
/// Ids ascend; an id in both sets renders once with both flags set.
pub fn render_page_index(index: &PageIndex) -> String {
    let mut out = String::new();
    for id in index.ids() {
        let Some(node) = index.node(id) else {
            continue;
        };
        let _ = writeln!(
            out,
            "<node id={id} clickable={} inputable={}>",
            index.is_clickable(id),
            index.is_inputable(id)
        );
        let _ = writeln!(out, "{}", node.render(2));
        out.push_str("</node>\n");
    }
    out
}

/// The reflection / plan / code template the model must answer in.
pub fn output_format() -> String {
    let mut out = String::from(
        "## Reflection\n\
         1. Did your last action get you closer to your objective? If this is your first action, just put \"N/A\".\n\
         2. Why or why not? If this is your first action, just put \"N/A\".\n\
         \n\
         ## Plan\n\
         1. What is your new plan based on your reflection?\n\
         2. What will your first step be given the current HTML? Which node will you interact with? What function will you call?\n\
         \n\
         ## Code\n\
         Call ONE of the following functions:\n",
    );
    let calls: Vec<String> = Operation::ALL
        .iter()
        .map(|op| format!("```\n{}\n```\n", op.template()))
        .collect();
    out.push_str(&calls.join("OR\n"));
    out
}

pub fn operation_list() -> String {
    Operation::ALL
        .iter()
        .map(|op| op.signature())
        .collect::<Vec<_>>()
        .join("\n")
}

fn user_message(rendered: &str) -> String {
    format!(
        "Here are nodes that you can click on and/or type into:\n\n{rendered}\n\n\
         Answer the reflection questions, then call one of the available functions. The available functions are:\n\n\
         {ops}\n\n\
         Note that when using the type() function, you must also specify whether to submit the form after typing (i.e. pressing enter).",
        ops = operation_list(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Node;
    use crate::transcript::Role;

    fn page() -> PageIndex {
        let mut index = PageIndex::new();
        index.insert_clickable(Node::new(7, "<a>Sign in</a>"));
        index.insert_inputable(Node::new(3, "<input name=\"q\">"));
        index.insert_clickable(Node::new(3, "<input name=\"q\">"));
        index.insert_inputable(Node::new(12, "<textarea>\nnotes\n</textarea>"));
        index
    }

    #[test]
    fn test_renders_one_entry_per_id_in_ascending_order() {
        let rendered = render_page_index(&page());
        assert_eq!(
            rendered,
            "<node id=3 clickable=true inputable=true>\n  <input name=\"q\">\n</node>\n\
             <node id=7 clickable=true inputable=false>\n  <a>Sign in</a>\n</node>\n\
             <node id=12 clickable=false inputable=true>\n  <textarea>\n  notes\n  </textarea>\n</node>\n"
        );
        assert_eq!(rendered.matches("<node ").count(), 3);
    }

    #[test]
    fn test_empty_index_renders_nothing() {
        assert_eq!(render_page_index(&PageIndex::new()), "");
    }

    #[test]
    fn test_system_message_only_on_first_step() {
        let builder = PromptBuilder::new("find the docs", "a hurried developer");
        let mut transcript = Transcript::new();

        builder.prepare(&page(), &mut transcript);
        assert_eq!(transcript.len(), 2);
        let system = &transcript.messages()[0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains("Your objective is: \"find the docs\""));
        assert!(system.content.contains("Your user persona is: \"a hurried developer\""));
        assert!(system.content.contains("```\ntype(id=..., text=..., submit=...)\n```\nOR\n"));
        assert!(system.content.contains("```\nset_objective_complete()\n```\n"));
        assert!(!system.content.contains("set_objective_complete()\n```\nOR"));

        builder.prepare(&page(), &mut transcript);
        assert_eq!(transcript.len(), 3);
        assert!(transcript.messages()[1..].iter().all(|m| m.role == Role::User));
    }

    #[test]
    fn test_user_message_lists_operations_and_submit_reminder() {
        let builder = PromptBuilder::new("o", "p");
        let mut transcript = Transcript::new();
        let rendered = builder.prepare(&page(), &mut transcript);

        let user = &transcript.messages()[1].content;
        assert!(user.contains(&rendered));
        assert!(user.contains("type(id: int, text: str, submit: bool)"));
        assert!(user.contains("click(id: int)\ntype("));
        assert!(user.contains("specify whether to submit"));
    }

    #[test]
    fn test_prepare_persists_rendered_index() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = ArtifactSink::new(tmp.path()).unwrap();
        let builder = PromptBuilder::new("o", "p").with_artifacts(sink.clone());

        let rendered = builder.prepare(&page(), &mut Transcript::new());
        assert_eq!(
            std::fs::read_to_string(sink.page_index_path()).unwrap(),
            rendered
        );
    }
}

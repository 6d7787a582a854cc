use anyhow::{Result, bail};
use std::io::{BufRead, Write};
use tokio::sync::mpsc;

use uxpilot::{NodeId, ResolutionError, ResolutionObserver};

pub const OVERRIDE_MENU: &str = "\nChoose a command:\n\
(g) go to url\n(b) go back\n(u) scroll up\n(d) scroll down\n(c) click\n(t) type\n\
(h) view help again\n(o) change objective\n\n> ";

/// One entry of the manual override menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    GoToUrl,
    GoBack,
    ScrollUp,
    ScrollDown,
    Click,
    Type,
    Help,
    ChangeObjective,
    Unknown,
}

pub fn parse_menu_choice(input: &str) -> MenuChoice {
    match input.trim().to_lowercase().as_str() {
        "g" => MenuChoice::GoToUrl,
        "b" => MenuChoice::GoBack,
        "u" => MenuChoice::ScrollUp,
        "d" => MenuChoice::ScrollDown,
        "c" => MenuChoice::Click,
        "t" => MenuChoice::Type,
        "h" => MenuChoice::Help,
        "o" => MenuChoice::ChangeObjective,
        _ => MenuChoice::Unknown,
    }
}

/// Empty input or `y` means run it.
pub fn is_confirmation(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "" | "y")
}

pub fn parse_node_id(input: &str) -> Option<NodeId> {
    input.trim().parse().ok()
}

/// Line-oriented operator console on stdin/stdout.
///
/// Stdin is read on a detached thread, so a pending prompt can be dropped
/// and the runtime can shut down without waiting for the operator.
pub struct Console {
    lines: mpsc::Receiver<String>,
}

impl Console {
    pub fn new() -> Self {
        Self::from_lines(spawn_stdin_reader())
    }

    pub fn from_lines(lines: mpsc::Receiver<String>) -> Self {
        Self { lines }
    }

    pub async fn prompt(&mut self, question: &str) -> Result<String> {
        print!("{question}");
        std::io::stdout().flush()?;
        match self.lines.recv().await {
            Some(line) => Ok(line.trim().to_string()),
            None => bail!("stdin closed"),
        }
    }

    pub async fn confirm_run(&mut self) -> Result<bool> {
        let answer = self.prompt("Run command? (Y/n):").await?;
        Ok(is_confirmation(&answer))
    }

    pub async fn menu_choice(&mut self) -> Result<MenuChoice> {
        let answer = self.prompt(OVERRIDE_MENU).await?;
        Ok(parse_menu_choice(&answer))
    }
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Streams model output and resolver feedback straight to the terminal.
pub struct ConsoleObserver;

impl ResolutionObserver for ConsoleObserver {
    fn on_fragment(&self, fragment: &str) {
        print!("{fragment}");
        let _ = std::io::stdout().flush();
    }

    fn on_response_end(&self) {
        println!();
    }

    fn on_feedback(&self, error: &ResolutionError, detail: &str) {
        println!("Got error, feeding back to the model:\n {error}\n{detail}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_confirmation_defaults_to_yes() {
        assert!(is_confirmation(""));
        assert!(is_confirmation(" Y "));
        assert!(!is_confirmation("n"));
        assert!(!is_confirmation("yes please"));
    }

    #[test]
    fn test_menu_choices() {
        assert_eq!(parse_menu_choice("g"), MenuChoice::GoToUrl);
        assert_eq!(parse_menu_choice("T"), MenuChoice::Type);
        assert_eq!(parse_menu_choice(" o\n"), MenuChoice::ChangeObjective);
        assert_eq!(parse_menu_choice("x"), MenuChoice::Unknown);
    }

    #[tokio::test]
    async fn test_pending_prompt_can_be_abandoned() {
        let (tx, rx) = mpsc::channel(1);
        let mut console = Console::from_lines(rx);

        let pending =
            tokio::time::timeout(Duration::from_millis(50), console.prompt("Run command?")).await;
        assert!(pending.is_err());

        tx.send(" n ".to_string()).await.unwrap();
        assert!(!console.confirm_run().await.unwrap());

        drop(tx);
        assert!(console.prompt("URL:").await.is_err());
    }

    #[test]
    fn test_node_id_parsing() {
        assert_eq!(parse_node_id(" 12 "), Some(12));
        assert_eq!(parse_node_id("-1"), None);
        assert_eq!(parse_node_id("twelve"), None);
    }
}

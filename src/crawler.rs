use thiserror::Error;

use crate::page::{Node, NodeId, PageIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    /// The page has not settled yet. Back off and crawl again.
    #[error("page not ready: {0}")]
    NotReady(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("node {0} is not on the current page")]
    UnknownNode(NodeId),
}

impl CrawlError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CrawlError::NotReady(_))
    }
}

/// The browser side of a session.
///
/// Every call blocks until the browser has acted on it. Only `crawl` hands
/// anything back; the rest are fire-and-forget apart from error reporting.
pub trait Crawler {
    fn navigate(&mut self, url: &str) -> Result<(), CrawlError>;

    fn crawl(&mut self) -> Result<PageIndex, CrawlError>;

    fn go_back(&mut self) -> Result<(), CrawlError>;

    fn scroll(&mut self, direction: ScrollDirection) -> Result<(), CrawlError>;

    fn click(&mut self, node: &Node) -> Result<(), CrawlError>;

    fn type_text(&mut self, node: &Node, text: &str, submit: bool) -> Result<(), CrawlError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Crawler double that records every call and serves a fixed page.
    #[derive(Debug, Default)]
    pub struct RecordingCrawler {
        pub page: PageIndex,
        pub calls: Vec<String>,
    }

    impl Crawler for RecordingCrawler {
        fn navigate(&mut self, url: &str) -> Result<(), CrawlError> {
            self.calls.push(format!("navigate {url}"));
            Ok(())
        }

        fn crawl(&mut self) -> Result<PageIndex, CrawlError> {
            self.calls.push("crawl".to_string());
            Ok(self.page.clone())
        }

        fn go_back(&mut self) -> Result<(), CrawlError> {
            self.calls.push("go_back".to_string());
            Ok(())
        }

        fn scroll(&mut self, direction: ScrollDirection) -> Result<(), CrawlError> {
            self.calls.push(format!("scroll {}", direction.as_str()));
            Ok(())
        }

        fn click(&mut self, node: &Node) -> Result<(), CrawlError> {
            self.calls.push(format!("click {}", node.id));
            Ok(())
        }

        fn type_text(&mut self, node: &Node, text: &str, submit: bool) -> Result<(), CrawlError> {
            self.calls.push(format!("type {} {text:?} {submit}", node.id));
            Ok(())
        }
    }
}

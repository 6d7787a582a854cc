use anyhow::{Result, anyhow};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use crate::dom;
use uxpilot::{CrawlError, Crawler, Node, PageIndex, ScrollDirection};

const DEBUG_ENDPOINT: &str = "http://127.0.0.1:9222";

/// Persistent browser session. Created once, reused for every step.
pub struct BrowserSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn launch(headless: bool) -> Result<Self> {
        // Attach mode: reuse a Chrome started with --remote-debugging-port=9222.
        tracing::info!(endpoint = DEBUG_ENDPOINT, "attempting to attach to existing Chrome");
        if let Ok(browser) = Browser::connect(DEBUG_ENDPOINT.to_string()) {
            let existing = {
                let tabs = browser
                    .get_tabs()
                    .lock()
                    .map_err(|_| anyhow!("browser tab list lock poisoned"))?;
                tabs.first().cloned()
            };
            let tab = match existing {
                Some(tab) => {
                    tracing::info!("attached to existing Chrome, using its first tab");
                    tab
                }
                None => browser.new_tab()?,
            };
            return Ok(Self {
                _browser: browser,
                tab,
            });
        }

        tracing::info!(headless, "could not attach, launching Chrome");
        let options = LaunchOptions {
            headless,
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
            ],
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };
        let browser =
            Browser::new(options).map_err(|e| anyhow!("Browser launch failed: {e:#}"))?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;

        tracing::info!("Chrome ready");
        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    fn settle(&self, millis: u64) {
        std::thread::sleep(Duration::from_millis(millis));
    }
}

fn browser_err(e: anyhow::Error) -> CrawlError {
    CrawlError::Browser(format!("{e:#}"))
}

impl Crawler for BrowserSession {
    fn navigate(&mut self, url: &str) -> Result<(), CrawlError> {
        tracing::info!(url, "navigating");
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(browser_err)?;
        Ok(())
    }

    fn crawl(&mut self) -> Result<PageIndex, CrawlError> {
        dom::crawl_page(&self.tab)
    }

    fn go_back(&mut self) -> Result<(), CrawlError> {
        self.tab
            .evaluate("window.history.back()", false)
            .map_err(browser_err)?;
        self.settle(1500);
        Ok(())
    }

    fn scroll(&mut self, direction: ScrollDirection) -> Result<(), CrawlError> {
        self.tab
            .evaluate(dom::scroll_script(direction), false)
            .map_err(browser_err)?;
        self.settle(500);
        Ok(())
    }

    fn click(&mut self, node: &Node) -> Result<(), CrawlError> {
        let element = self
            .tab
            .find_element(&dom::selector(node.id))
            .map_err(|_| CrawlError::UnknownNode(node.id))?;
        element.click().map_err(browser_err)?;
        self.settle(1000);
        Ok(())
    }

    fn type_text(&mut self, node: &Node, text: &str, submit: bool) -> Result<(), CrawlError> {
        let element = self
            .tab
            .find_element(&dom::selector(node.id))
            .map_err(|_| CrawlError::UnknownNode(node.id))?;
        element.click().map_err(browser_err)?;
        self.tab
            .evaluate(&dom::clear_script(node.id), false)
            .map_err(browser_err)?;
        self.tab.type_str(text).map_err(browser_err)?;
        if submit {
            self.tab.press_key("Enter").map_err(browser_err)?;
            self.settle(1000);
        }
        Ok(())
    }
}

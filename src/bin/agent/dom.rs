use headless_chrome::Tab;
use serde::Deserialize;
use std::sync::Arc;

use uxpilot::{CrawlError, Node, NodeId, PageIndex, ScrollDirection};

/// Attribute the crawl script stamps on every interactive element it reports.
pub const NODE_ATTR: &str = "data-uxp-id";

/// JavaScript injected into the page to list its interactive elements.
///
/// The script:
///   1. Reports `ready: false` until the document has finished loading.
///   2. Visits visible, enabled links, buttons, form controls, summaries,
///      role=button/link, onclick and contenteditable elements.
///   3. Gives each a numeric `data-uxp-id` once; ids stay put for the life of
///      the document so a node keeps its id across crawls.
///   4. Flags text-entry controls as inputable and everything else (plus
///      single-line inputs) as clickable.
const CRAWL_JS: &str = r#"
(() => {
  if (document.readyState !== 'complete' || !document.body) {
    return JSON.stringify({ ready: false, nodes: [] });
  }
  const KEEP = ['type', 'name', 'placeholder', 'aria-label', 'title', 'alt', 'href', 'role', 'value'];
  const TEXT_INPUTS = new Set(['', 'text', 'search', 'email', 'url', 'tel', 'password', 'number', 'date']);
  const SELECTOR = 'a, button, input, textarea, select, summary, [role=button], [role=link], [onclick], [contenteditable]';
  window.__uxpNext = window.__uxpNext || 0;

  function isVisible(el) {
    const r = el.getBoundingClientRect();
    if (r.width === 0 && r.height === 0) return false;
    const s = getComputedStyle(el);
    return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0';
  }

  const nodes = [];
  for (const el of document.querySelectorAll(SELECTOR)) {
    if (el.disabled || !isVisible(el)) continue;
    const tag = el.tagName.toLowerCase();
    const type = (el.getAttribute('type') || '').toLowerCase();
    if (tag === 'input' && type === 'hidden') continue;

    const inputable = tag === 'textarea' || el.isContentEditable || (tag === 'input' && TEXT_INPUTS.has(type));
    const clickable = !inputable || tag === 'input';

    if (!el.hasAttribute('data-uxp-id')) {
      el.setAttribute('data-uxp-id', String(window.__uxpNext++));
    }
    const attrs = [];
    for (const k of KEEP) {
      const v = el.getAttribute(k);
      if (v) attrs.push([k, v.slice(0, 80)]);
    }
    const text = tag === 'input' ? '' : (el.innerText || '').trim().replace(/\s+/g, ' ').slice(0, 100);
    nodes.push({ id: Number(el.getAttribute('data-uxp-id')), tag, text, attrs, clickable, inputable });
  }
  return JSON.stringify({ ready: true, nodes });
})()
"#;

#[derive(Debug, Deserialize)]
struct Snapshot {
    ready: bool,
    nodes: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    id: NodeId,
    tag: String,
    text: String,
    attrs: Vec<(String, String)>,
    clickable: bool,
    inputable: bool,
}

impl RawNode {
    /// HTML-like rendering the model reads, e.g. `<a href="/docs">Docs</a>`.
    fn render(&self) -> String {
        let mut open = format!("<{}", self.tag);
        for (key, value) in &self.attrs {
            open.push_str(&format!(" {key}=\"{}\"", value.replace('"', "&quot;")));
        }
        open.push('>');
        if self.tag == "input" {
            open
        } else {
            format!("{open}{}</{}>", self.text, self.tag)
        }
    }
}

/// CSS selector for the element behind `id`.
pub fn selector(id: NodeId) -> String {
    format!("[{NODE_ATTR}=\"{id}\"]")
}

pub fn scroll_script(direction: ScrollDirection) -> &'static str {
    match direction {
        ScrollDirection::Up => "window.scrollBy(0, -window.innerHeight * 0.75)",
        ScrollDirection::Down => "window.scrollBy(0, window.innerHeight * 0.75)",
    }
}

/// Script that empties the value of the element behind `id`.
pub fn clear_script(id: NodeId) -> String {
    format!(
        "(() => {{ const el = document.querySelector('{}'); if (!el) return; \
         if (el.isContentEditable) {{ el.textContent = ''; }} else {{ el.value = ''; }} }})()",
        selector(id).replace('\'', "\\'")
    )
}

/// Crawl the current page into a fresh page index.
pub fn crawl_page(tab: &Arc<Tab>) -> Result<PageIndex, CrawlError> {
    let result = tab
        .evaluate(CRAWL_JS, false)
        .map_err(|e| CrawlError::NotReady(format!("{e:#}")))?;
    let raw = result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .ok_or_else(|| CrawlError::NotReady("crawl script returned nothing".to_string()))?;
    parse_snapshot(&raw)
}

fn parse_snapshot(raw: &str) -> Result<PageIndex, CrawlError> {
    let snapshot: Snapshot = serde_json::from_str(raw)
        .map_err(|e| CrawlError::Browser(format!("bad crawl snapshot: {e}")))?;
    if !snapshot.ready {
        return Err(CrawlError::NotReady("document still loading".to_string()));
    }

    let mut index = PageIndex::new();
    for raw_node in &snapshot.nodes {
        let node = Node::new(raw_node.id, raw_node.render());
        if raw_node.clickable {
            index.insert_clickable(node.clone());
        }
        if raw_node.inputable {
            index.insert_inputable(node);
        }
    }
    tracing::debug!(nodes = index.len(), "crawled page");
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_builds_overlapping_sets() {
        let raw = r#"{"ready":true,"nodes":[
            {"id":0,"tag":"a","text":"Docs","attrs":[["href","/docs"]],"clickable":true,"inputable":false},
            {"id":1,"tag":"input","text":"","attrs":[["type","search"],["name","q"]],"clickable":true,"inputable":true},
            {"id":2,"tag":"textarea","text":"","attrs":[],"clickable":false,"inputable":true}
        ]}"#;
        let index = parse_snapshot(raw).unwrap();

        assert_eq!(index.len(), 3);
        assert!(index.is_clickable(1) && index.is_inputable(1));
        assert!(!index.is_clickable(2));
        assert_eq!(
            index.node(0).map(|n| n.text.as_str()),
            Some("<a href=\"/docs\">Docs</a>")
        );
        assert_eq!(
            index.node(1).map(|n| n.text.as_str()),
            Some("<input type=\"search\" name=\"q\">")
        );
    }

    #[test]
    fn test_loading_document_is_transient() {
        let err = parse_snapshot(r#"{"ready":false,"nodes":[]}"#).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_selector_and_escaping() {
        assert_eq!(selector(42), "[data-uxp-id=\"42\"]");
        let raw = RawNode {
            id: 1,
            tag: "button".to_string(),
            text: "Go".to_string(),
            attrs: vec![("aria-label".to_string(), "say \"hi\"".to_string())],
            clickable: true,
            inputable: false,
        };
        assert_eq!(raw.render(), "<button aria-label=\"say &quot;hi&quot;\">Go</button>");
    }
}

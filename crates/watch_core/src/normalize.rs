//! Raw page content to canonical text.
//!
//! The canonical form is one block per line. Inside a block, whitespace runs
//! are collapsed to a single space. Block order follows the document.

use std::collections::HashSet;

use ego_tree::iter::Edge;
use ego_tree::NodeRef;
use regex::Regex;
use scraper::node::{Element, Node};
use scraper::{Html, Selector};

use crate::decode::{decode_body, media_type, DecodeError};

/// Noise removed from every block unless the configuration replaces the list.
pub const DEFAULT_NOISE_PATTERNS: &[&str] = &[
    // ISO-8601 timestamps
    r"\b\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:?\d{2})?",
    // clock times
    r"(?i)\b\d{1,2}:\d{2}(?::\d{2})?(?:\s?[ap]m)?\b",
    // relative ages
    r"(?i)\b\d+\s+(?:seconds?|minutes?|hours?|days?)\s+ago\b",
    // session and csrf tokens: `name=value`, or `name: value` with a token-shaped value
    r"(?i)\b(?:session(?:id)?|sid|token|csrf|nonce)\s*(?:=\s*[\w\-.~%]+|:\s*[\w\-.~%]{16,})",
    // long hex ids
    r"\b[0-9a-fA-F]{24,}\b",
    // live counters
    r"(?i)\b\d[\d,.]*\s+(?:views?|visitors?|people\s+(?:online|viewing|watching))\b",
];

const SKIPPED_ELEMENTS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "iframe", "object", "canvas",
];

const BOILERPLATE_ELEMENTS: &[&str] = &["nav", "footer", "header"];

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "br", "caption", "dd", "details",
    "dialog", "div", "dl", "dt", "fieldset", "figcaption", "figure", "form", "h1", "h2", "h3",
    "h4", "h5", "h6", "hr", "li", "main", "ol", "p", "pre", "section", "summary", "table",
    "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedInputError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("unsupported content type {0}")]
    UnsupportedContentType(String),
    #[error("invalid extraction selector {selector:?}: {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("extraction selector {0:?} matched nothing")]
    SelectorMatchedNothing(String),
}

/// Compiled volatile-noise patterns.
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    patterns: Vec<Regex>,
}

impl NoiseFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Default patterns followed by `extra`.
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> Result<Self, regex::Error> {
        let mut filter = Self::default();
        for pattern in extra {
            filter.patterns.push(Regex::new(pattern.as_ref())?);
        }
        Ok(filter)
    }

    pub fn none() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Remove every match from `block` and re-collapse whitespace.
    pub fn scrub(&self, block: &str) -> String {
        let mut text = block.to_string();
        for pattern in &self.patterns {
            if pattern.is_match(&text) {
                text = pattern.replace_all(&text, " ").into_owned();
            }
        }
        collapse_whitespace(&text)
    }
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_NOISE_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    noise: NoiseFilter,
    strip_boilerplate: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(NoiseFilter::default(), true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    Html,
    Plain,
}

impl Normalizer {
    pub fn new(noise: NoiseFilter, strip_boilerplate: bool) -> Self {
        Self {
            noise,
            strip_boilerplate,
        }
    }

    /// Decode, strip markup and noise. `extraction` only applies to HTML.
    pub fn normalize(
        &self,
        raw: &[u8],
        content_type: Option<&str>,
        extraction: Option<&str>,
    ) -> Result<String, MalformedInputError> {
        let decoded = decode_body(raw, content_type)?;
        let blocks = match content_kind(content_type, &decoded.text)? {
            ContentKind::Html => self.html_blocks(&decoded.text, extraction)?,
            ContentKind::Plain => plain_blocks(&decoded.text),
        };
        Ok(self.join_blocks(blocks))
    }

    /// Normalize text that is already plain (one block per line).
    pub fn normalize_text(&self, text: &str) -> String {
        self.join_blocks(plain_blocks(text))
    }

    fn join_blocks(&self, blocks: Vec<String>) -> String {
        blocks
            .iter()
            .map(|block| self.noise.scrub(block))
            .filter(|block| !block.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn html_blocks(
        &self,
        html: &str,
        extraction: Option<&str>,
    ) -> Result<Vec<String>, MalformedInputError> {
        let doc = Html::parse_document(html);
        let mut writer = BlockWriter::default();

        match extraction {
            Some(raw) => {
                let selector = parse_selector(raw)?;
                let matched: Vec<_> = doc.select(&selector).collect();
                if matched.is_empty() {
                    return Err(MalformedInputError::SelectorMatchedNothing(raw.to_string()));
                }
                let ids: HashSet<_> = matched.iter().map(|el| el.id()).collect();
                for el in matched {
                    // Nested matches are rendered once, as part of their outermost match.
                    if el.ancestors().any(|a| ids.contains(&a.id())) {
                        continue;
                    }
                    self.render(*el, &mut writer);
                    writer.break_block();
                }
            }
            None => self.render(*doc.root_element(), &mut writer),
        }

        Ok(writer.finish())
    }

    fn render(&self, root: NodeRef<'_, Node>, writer: &mut BlockWriter) {
        let mut skipping = None;
        for edge in root.traverse() {
            match edge {
                Edge::Open(node) => {
                    if skipping.is_some() {
                        continue;
                    }
                    match node.value() {
                        Node::Text(text) => writer.push_text(text),
                        Node::Element(el) => {
                            if node.id() != root.id() && self.is_skipped(el) {
                                skipping = Some(node.id());
                            } else if is_block(el) {
                                writer.break_block();
                            }
                        }
                        _ => {}
                    }
                }
                Edge::Close(node) => {
                    if let Some(id) = skipping {
                        if id == node.id() {
                            skipping = None;
                        }
                        continue;
                    }
                    if let Node::Element(el) = node.value() {
                        if is_block(el) {
                            writer.break_block();
                        }
                    }
                }
            }
        }
    }

    fn is_skipped(&self, el: &Element) -> bool {
        let name = el.name();
        if SKIPPED_ELEMENTS.contains(&name) || el.attr("hidden").is_some() {
            return true;
        }
        if !self.strip_boilerplate {
            return false;
        }
        if BOILERPLATE_ELEMENTS.contains(&name) || el.attr("role") == Some("navigation") {
            return true;
        }
        let mentions_cookie = |value: &str| value.to_ascii_lowercase().contains("cookie");
        el.id().is_some_and(mentions_cookie) || el.classes().any(mentions_cookie)
    }
}

/// Check that an extraction rule parses as a CSS selector.
pub fn validate_selector(selector: &str) -> Result<(), MalformedInputError> {
    parse_selector(selector).map(|_| ())
}

fn parse_selector(raw: &str) -> Result<Selector, MalformedInputError> {
    Selector::parse(raw).map_err(|err| MalformedInputError::InvalidSelector {
        selector: raw.to_string(),
        message: err.to_string(),
    })
}

fn is_block(el: &Element) -> bool {
    BLOCK_ELEMENTS.contains(&el.name())
}

fn content_kind(content_type: Option<&str>, text: &str) -> Result<ContentKind, MalformedInputError> {
    match content_type.map(media_type).as_deref() {
        Some("text/html") | Some("application/xhtml+xml") => Ok(ContentKind::Html),
        Some("text/plain") => Ok(ContentKind::Plain),
        Some(other) => Err(MalformedInputError::UnsupportedContentType(other.to_string())),
        None if text.trim_start().starts_with('<') => Ok(ContentKind::Html),
        None => Ok(ContentKind::Plain),
    }
}

fn plain_blocks(text: &str) -> Vec<String> {
    text.lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Accumulates inline text into blocks with collapsed whitespace.
#[derive(Default)]
struct BlockWriter {
    blocks: Vec<String>,
    current: String,
    pending_space: bool,
}

impl BlockWriter {
    fn push_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                self.pending_space = !self.current.is_empty();
            } else {
                if self.pending_space {
                    self.current.push(' ');
                    self.pending_space = false;
                }
                self.current.push(ch);
            }
        }
    }

    fn break_block(&mut self) {
        self.pending_space = false;
        let block = std::mem::take(&mut self.current);
        if !block.is_empty() {
            self.blocks.push(block);
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.break_block();
        self.blocks
    }
}

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::fetch::Page;
use crate::models::{Control, ImageContext, ImageRecord, Landmark, LinkInfo};

// ── Constants ────────────────────────────────────────────────────────────────

pub const DEFAULT_CONTEXT_CHARS: usize = 100;
pub const DEFAULT_CONTEXT_NODES: usize = 64;

/// Text under these elements is never page content.
const NON_CONTENT_TAGS: &[&str] = &[
    "head", "title", "script", "style", "code", "pre", "noscript", "template",
];

/// A context walk never leaves the image's nearest sectioning element.
const SECTIONING_TAGS: &[&str] = &[
    "article", "section", "main", "header", "footer", "nav", "aside",
];

const CONTENT_REGION_TAGS: &[&str] = &["article", "main", "section"];

const LAZY_SRC_ATTRS: &[&str] = &[
    "data-original",
    "data-largest",
    "data-large",
    "data-medium",
    "data-small",
    "data-smallest",
];

// ── Lazy statics ─────────────────────────────────────────────────────────────

static CODE_LIKE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[{}]|//|/\*|\*/|<script|<style|@media|function\(|\bvar |\blet |\bconst |\.css|\.js|window\.|document\.",
    )
    .unwrap()
});

static MARKUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[A-Za-z!]").unwrap());

static BASE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("base[href]").unwrap());

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("response is not HTML (content type {0:?})")]
    NotHtml(String),
    #[error("response body contains no markup")]
    NoMarkup,
    #[error("invalid base URL {0}")]
    InvalidBaseUrl(String),
}

// ── Context window ───────────────────────────────────────────────────────────

/// Bounds on how much surrounding text is gathered on each side of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    /// Stop once this many characters of text have been gathered.
    pub max_chars: usize,
    /// Stop after examining this many text nodes.
    pub max_nodes: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_CONTEXT_CHARS,
            max_nodes: DEFAULT_CONTEXT_NODES,
        }
    }
}

// ── Document flow ────────────────────────────────────────────────────────────

/// Content text and images, flattened in document order.
enum Flow<'a> {
    Text {
        text: String,
        section: Option<ElementRef<'a>>,
    },
    Image(ElementRef<'a>),
}

// ── Public API ───────────────────────────────────────────────────────────────

pub fn extract_page(page: &Page, window: &ContextWindow) -> Result<Vec<ImageRecord>, ParseError> {
    if let Some(content_type) = page.content_type.as_deref() {
        if !content_type.contains("text/html") && !content_type.contains("application/xhtml") {
            return Err(ParseError::NotHtml(content_type.to_string()));
        }
    }
    extract_images(&page.body, page.url.as_str(), window)
}

/// Every `<img>` with a usable source, in document order.
pub fn extract_images(
    html: &str,
    base_url: &str,
    window: &ContextWindow,
) -> Result<Vec<ImageRecord>, ParseError> {
    if !MARKUP_RE.is_match(html) {
        return Err(ParseError::NoMarkup);
    }
    let page_url = Url::parse(base_url)
        .map_err(|e| ParseError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;

    let document = Html::parse_document(html);
    let base = document_base(&document, &page_url);
    let flow = document_flow(&document);

    let mut images = Vec::new();
    for (idx, item) in flow.iter().enumerate() {
        let Flow::Image(img) = item else {
            continue;
        };
        let Some(src) = resolve_img_src(*img, &base) else {
            tracing::debug!("skipping <img> without a usable source");
            continue;
        };
        images.push(build_record(*img, src, &flow, idx, &base, window));
    }
    Ok(images)
}

// ── Flow construction ────────────────────────────────────────────────────────

fn document_flow(document: &Html) -> Vec<Flow<'_>> {
    let mut flow = Vec::new();
    for node in document.root_element().descendants() {
        match node.value() {
            Node::Text(text) => {
                let Some(parent) = node.parent().and_then(ElementRef::wrap) else {
                    continue;
                };
                let raw = &*text.text;
                if !is_content_text(parent, raw) {
                    continue;
                }
                flow.push(Flow::Text {
                    text: normalize_text(raw),
                    section: nearest_section(parent),
                });
            }
            Node::Element(el) if el.name() == "img" => {
                if let Some(img) = ElementRef::wrap(node) {
                    flow.push(Flow::Image(img));
                }
            }
            _ => {}
        }
    }
    flow
}

fn is_content_text(parent: ElementRef<'_>, raw: &str) -> bool {
    let text = raw.trim();
    if text.is_empty() {
        return false;
    }
    if self_and_ancestors(parent).any(|el| NON_CONTENT_TAGS.contains(&el.value().name())) {
        return false;
    }
    !CODE_LIKE_RE.is_match(text)
}

// ── Record construction ──────────────────────────────────────────────────────

fn build_record(
    img: ElementRef<'_>,
    src: String,
    flow: &[Flow<'_>],
    idx: usize,
    base_url: &Url,
    window: &ContextWindow,
) -> ImageRecord {
    let v = img.value();

    let existing_alt = v.attr("alt").map(|s| s.trim().to_string());
    let title = v
        .attr("title")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let anchor = find_ancestor(img, "a");
    let control = if anchor.is_some() {
        Some(Control::Link)
    } else if find_ancestor(img, "button").is_some()
        || ancestors(img).any(|el| el.value().attr("role") == Some("button"))
    {
        Some(Control::Button)
    } else {
        None
    };

    let link = anchor.map(|a| LinkInfo {
        text: normalize_text(&collect_text(a)),
        url: a
            .value()
            .attr("href")
            .map(|h| {
                base_url
                    .join(h.trim())
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| h.to_string())
            })
            .unwrap_or_default(),
    });

    let caption = find_ancestor(img, "figure")
        .and_then(|fig| find_first_tag(fig, "figcaption"))
        .map(|fc| normalize_text(&collect_text(fc)))
        .filter(|s| !s.is_empty());

    let landmark = Landmark {
        in_header: find_ancestor(img, "header").is_some(),
        in_navigation: find_ancestor(img, "nav").is_some(),
        in_content: ancestors(img).any(|el| CONTENT_REGION_TAGS.contains(&el.value().name())),
    };

    let marked_decorative = v
        .attr("role")
        .map(|r| matches!(r.trim().to_lowercase().as_str(), "presentation" | "none"))
        .unwrap_or(false)
        || v.attr("aria-hidden").map(|a| a.trim().eq_ignore_ascii_case("true")) == Some(true);

    ImageRecord {
        src,
        existing_alt,
        title,
        caption,
        link,
        control,
        landmark,
        marked_decorative,
        context: surrounding_text(flow, idx, window),
    }
}

fn surrounding_text(flow: &[Flow<'_>], idx: usize, window: &ContextWindow) -> ImageContext {
    let section = match &flow[idx] {
        Flow::Image(img) => nearest_section(*img),
        Flow::Text { section, .. } => *section,
    };

    let mut before = gather(flow[..idx].iter().rev(), section, window);
    before.reverse();
    let after = gather(flow[idx + 1..].iter(), section, window);

    ImageContext {
        before: before.join(" "),
        after: after.join(" "),
    }
}

fn gather<'f, 'a: 'f>(
    items: impl Iterator<Item = &'f Flow<'a>>,
    section: Option<ElementRef<'a>>,
    window: &ContextWindow,
) -> Vec<&'f str> {
    let mut parts: Vec<&str> = Vec::new();
    let mut len = 0usize;

    let texts = items.filter_map(|item| match item {
        Flow::Text { text, section } => Some((text.as_str(), *section)),
        Flow::Image(_) => None,
    });

    for (text, text_section) in texts.take(window.max_nodes) {
        if len >= window.max_chars || text_section != section {
            break;
        }
        if !parts.is_empty() {
            len += 1;
        }
        len += text.chars().count();
        parts.push(text);
    }
    parts
}

// ── Image helpers ────────────────────────────────────────────────────────────

fn document_base(document: &Html, page_url: &Url) -> Url {
    document
        .select(&BASE_SEL)
        .next()
        .and_then(|b| b.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

fn resolve_img_src(el: ElementRef<'_>, base_url: &Url) -> Option<String> {
    let v = el.value();
    let non_empty = |name: &str| v.attr(name).map(str::trim).filter(|s| !s.is_empty());

    // Priority: data-src → src → data-original|largest|…|smallest → srcset.
    let src: Option<String> = non_empty("data-src")
        .or_else(|| non_empty("src"))
        .or_else(|| LAZY_SRC_ATTRS.iter().find_map(|a| non_empty(*a)))
        .map(str::to_string)
        .or_else(|| {
            non_empty("srcset")
                .or_else(|| non_empty("data-srcset"))
                .and_then(best_src_from_srcset)
        });

    let src = src?;
    base_url.join(&src).ok().map(|u| u.to_string())
}

/// Widest (or densest) candidate; ties keep the later entry.
fn best_src_from_srcset(srcset: &str) -> Option<String> {
    let mut best: Option<(f64, &str)> = None;

    for part in srcset.split(',') {
        let mut pieces = part.split_whitespace();
        let Some(url) = pieces.next() else {
            continue;
        };
        let score = pieces
            .next()
            .and_then(|desc| desc.strip_suffix('w').or_else(|| desc.strip_suffix('x')))
            .and_then(|n| n.parse::<f64>().ok())
            .unwrap_or(0.0);
        if best.map_or(true, |(s, _)| score >= s) {
            best = Some((score, url));
        }
    }

    best.map(|(_, url)| url.to_string())
}

// ── DOM utility helpers ──────────────────────────────────────────────────────

/// Recursively collect all text from an element and its descendants.
fn collect_text(el: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => parts.push((&*text.text).to_string()),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    parts.push(collect_text(child_el));
                }
            }
            _ => {}
        }
    }
    parts.join("")
}

/// Collapse whitespace and trim.
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn ancestors<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.ancestors().filter_map(ElementRef::wrap)
}

fn self_and_ancestors<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    std::iter::once(el).chain(ancestors(el))
}

fn find_ancestor<'a>(el: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    ancestors(el).find(|a| a.value().name() == tag)
}

fn nearest_section<'a>(el: ElementRef<'a>) -> Option<ElementRef<'a>> {
    self_and_ancestors(el).find(|a| SECTIONING_TAGS.contains(&a.value().name()))
}

/// Depth-first search for the first element with the given tag name.
fn find_first_tag<'a>(el: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if child_el.value().name() == tag {
                return Some(child_el);
            }
            if let Some(found) = find_first_tag(child_el, tag) {
                return Some(found);
            }
        }
    }
    None
}

//! Content extraction: one parsed HTML document in, an ordered set of
//! comparable content units out. No comparison happens here.

use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// Tags whose subtree is never content.
const IGNORED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "svg", "head", "title", "meta", "link",
    "base",
];

/// Elements that open a new text block. Inline elements merge into the
/// enclosing block.
const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "body",
    "caption",
    "dd",
    "details",
    "div",
    "dl",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "summary",
    "table",
    "td",
    "th",
    "tr",
    "ul",
];

const BANNER_MARKERS: &[&str] = &["cookie", "consent", "gdpr"];
const BANNER_KEYWORDS: &[&str] = &["cookie", "consent", "privacy", "accept", "reject"];

/// An internal link as a comparable unit: two links are equal only if both
/// the resolved target path and the anchor text match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct InternalLink {
    /// Resolved target path (plus query when present) on the page's host
    pub href: String,
    pub anchor_text: String,
}

/// Structured content extracted from one HTML document. Immutable once
/// produced; every collection preserves document order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    /// Normalized block-level text units, whitespace collapsed
    pub text_blocks: Vec<String>,
    /// H1-H6 texts in document order
    pub headings: Vec<String>,
    pub internal_links: Vec<InternalLink>,
    /// Whitespace-delimited tokens across all text blocks (heading text
    /// forms its own block, so heading words count exactly once)
    pub word_count: usize,
}

impl ExtractionResult {
    pub fn heading_count(&self) -> usize {
        self.headings.len()
    }

    pub fn internal_link_count(&self) -> usize {
        self.internal_links.len()
    }
}

/// Extracts comparable content units from HTML.
///
/// Pure transformation: no network, no comparison. Unparseable input
/// degrades to whatever the tree builder recovers rather than failing.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    strip_consent_banners: bool,
}

impl ContentExtractor {
    pub fn new(strip_consent_banners: bool) -> Self {
        Self {
            strip_consent_banners,
        }
    }

    /// Extract text blocks, headings and internal links from `html`.
    /// Relative link targets resolve against `base_url` (the fetch's final
    /// URL); a link is internal when its resolved host and port match.
    pub fn extract(&self, html: &str, base_url: &Url) -> ExtractionResult {
        let document = Html::parse_document(html);
        let root = Self::body_element(&document);

        let mut text_blocks = Vec::new();
        let mut current = String::new();
        self.collect_blocks(root, &mut text_blocks, &mut current);
        Self::flush_block(&mut current, &mut text_blocks);

        let headings = self.extract_headings(&document);
        let internal_links = self.extract_internal_links(&document, base_url);

        let word_count = text_blocks
            .iter()
            .map(|b| b.split_whitespace().count())
            .sum();

        log::debug!(
            "[EXTRACT] {} blocks, {} headings, {} internal links, {} words",
            text_blocks.len(),
            headings.len(),
            internal_links.len(),
            word_count
        );

        ExtractionResult {
            text_blocks,
            headings,
            internal_links,
            word_count,
        }
    }

    fn body_element(document: &Html) -> ElementRef<'_> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("body").unwrap());
        document
            .select(selector)
            .next()
            .unwrap_or_else(|| document.root_element())
    }

    fn collect_blocks(&self, el: ElementRef<'_>, blocks: &mut Vec<String>, current: &mut String) {
        for child in el.children() {
            if let Some(text) = child.value().as_text() {
                current.push_str(text);
            } else if let Some(child_el) = ElementRef::wrap(child) {
                if self.is_excluded_element(child_el) {
                    continue;
                }
                if BLOCK_TAGS.contains(&child_el.value().name()) {
                    Self::flush_block(current, blocks);
                    self.collect_blocks(child_el, blocks, current);
                    Self::flush_block(current, blocks);
                } else {
                    self.collect_blocks(child_el, blocks, current);
                }
            }
        }
    }

    fn flush_block(current: &mut String, blocks: &mut Vec<String>) {
        let normalized = normalize_whitespace(current);
        if !normalized.is_empty() {
            blocks.push(normalized);
        }
        current.clear();
    }

    fn extract_headings(&self, document: &Html) -> Vec<String> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("h1, h2, h3, h4, h5, h6").unwrap());

        document
            .select(selector)
            .filter(|el| !self.in_excluded_subtree(*el))
            .filter_map(|el| {
                let text = normalize_whitespace(&el.text().collect::<String>());
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            })
            .collect()
    }

    fn extract_internal_links(&self, document: &Html, base_url: &Url) -> Vec<InternalLink> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("a[href]").unwrap());

        let mut links = Vec::new();
        for element in document.select(selector) {
            if self.in_excluded_subtree(element) {
                continue;
            }

            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if href.is_empty()
                || href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
            {
                continue;
            }

            let Ok(resolved) = base_url.join(href) else {
                continue;
            };
            let is_internal = resolved.host_str() == base_url.host_str()
                && resolved.port() == base_url.port();
            if !is_internal {
                continue;
            }

            let Some(anchor_text) = Self::anchor_text(element) else {
                continue;
            };

            let mut target = resolved.path().to_string();
            if let Some(query) = resolved.query() {
                target.push('?');
                target.push_str(query);
            }

            links.push(InternalLink {
                href: target,
                anchor_text,
            });
        }
        links
    }

    /// Visible/accessible text for an anchor, with fallbacks:
    /// aria-label, title, then contained img alt.
    fn anchor_text(element: ElementRef<'_>) -> Option<String> {
        static IMG_SELECTOR: OnceLock<Selector> = OnceLock::new();
        let img_selector = IMG_SELECTOR.get_or_init(|| Selector::parse("img").unwrap());

        let mut text = normalize_whitespace(&element.text().collect::<String>());
        if text.is_empty() {
            if let Some(attr) = element
                .value()
                .attr("aria-label")
                .or_else(|| element.value().attr("title"))
            {
                text = normalize_whitespace(attr);
            }
        }
        if text.is_empty() {
            for img in element.select(img_selector) {
                if let Some(alt) = img.value().attr("alt") {
                    let alt = normalize_whitespace(alt);
                    if !alt.is_empty() {
                        text = alt;
                        break;
                    }
                }
            }
        }

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn is_excluded_element(&self, el: ElementRef<'_>) -> bool {
        IGNORED_TAGS.contains(&el.value().name())
            || Self::is_hidden(el)
            || (self.strip_consent_banners && Self::is_consent_banner(el))
    }

    /// Whether the element or any ancestor is excluded from content.
    fn in_excluded_subtree(&self, el: ElementRef<'_>) -> bool {
        std::iter::once(el)
            .chain(el.ancestors().filter_map(ElementRef::wrap))
            .any(|a| self.is_excluded_element(a))
    }

    fn is_hidden(el: ElementRef<'_>) -> bool {
        let element = el.value();
        if element.attr("hidden").is_some() {
            return true;
        }
        if element.attr("aria-hidden") == Some("true") {
            return true;
        }
        if element.classes().any(|c| c == "hidden") {
            return true;
        }
        if let Some(style) = element.attr("style") {
            let style = style.to_lowercase().replace(char::is_whitespace, "");
            if style.contains("display:none") || style.contains("visibility:hidden") {
                return true;
            }
        }
        false
    }

    /// Best-effort consent banner identification: id/class mentions a
    /// banner marker AND the subtree text mentions a consent keyword.
    fn is_consent_banner(el: ElementRef<'_>) -> bool {
        let element = el.value();
        let id = element.attr("id").unwrap_or("").to_lowercase();
        let class = element.attr("class").unwrap_or("").to_lowercase();
        let marked = BANNER_MARKERS
            .iter()
            .any(|m| id.contains(m) || class.contains(m));
        if !marked {
            return false;
        }

        let text = el.text().collect::<String>().to_lowercase();
        BANNER_KEYWORDS.iter().any(|k| text.contains(k))
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new(true)
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> ExtractionResult {
        let base = Url::parse("https://example.com/page").unwrap();
        ContentExtractor::new(true).extract(html, &base)
    }

    #[test]
    fn extracts_text_blocks_in_document_order() {
        let html = r#"
            <html><body>
                <p>First   paragraph</p>
                <div>Second <b>bold</b> block</div>
                <p>Third</p>
            </body></html>
        "#;
        let result = extract(html);

        assert_eq!(
            result.text_blocks,
            vec!["First paragraph", "Second bold block", "Third"]
        );
        assert_eq!(result.word_count, 6);
    }

    #[test]
    fn discards_empty_and_whitespace_only_blocks() {
        let html = "<html><body><p>   </p><p></p><p>Real</p></body></html>";
        let result = extract(html);

        assert_eq!(result.text_blocks, vec!["Real"]);
    }

    #[test]
    fn excludes_script_style_and_noscript_content() {
        let html = r#"
            <html><body>
                <p>Visible</p>
                <script>var x = "never";</script>
                <style>.a { color: red; }</style>
                <noscript>Enable JS</noscript>
            </body></html>
        "#;
        let result = extract(html);

        assert_eq!(result.text_blocks, vec!["Visible"]);
        assert_eq!(result.word_count, 1);
    }

    #[test]
    fn excludes_hidden_elements() {
        let html = r#"
            <html><body>
                <p>Shown</p>
                <p style="display: none">Styled away</p>
                <p style="visibility:hidden">Invisible</p>
                <div hidden><p>Attribute hidden</p></div>
                <p aria-hidden="true">Aria hidden</p>
            </body></html>
        "#;
        let result = extract(html);

        assert_eq!(result.text_blocks, vec!["Shown"]);
    }

    #[test]
    fn strips_consent_banners_when_enabled() {
        let html = r#"
            <html><body>
                <div id="cookie-banner">We use cookies. <a href="/x">Accept</a></div>
                <p>Content</p>
            </body></html>
        "#;
        let result = extract(html);
        assert_eq!(result.text_blocks, vec!["Content"]);
        assert!(result.internal_links.is_empty());

        let base = Url::parse("https://example.com/page").unwrap();
        let kept = ContentExtractor::new(false).extract(html, &base);
        assert_eq!(kept.text_blocks.len(), 2);
        assert_eq!(kept.internal_links.len(), 1);
    }

    #[test]
    fn keeps_marker_named_elements_without_consent_text() {
        // id mentions "cookie" but nothing in the text does: not a banner
        let html = r#"<html><body><div id="cookie-recipes">Baking ideas</div></body></html>"#;
        let result = extract(html);

        assert_eq!(result.text_blocks, vec!["Baking ideas"]);
    }

    #[test]
    fn extracts_headings_in_document_order() {
        let html = r#"
            <html><body>
                <h1>Main Title</h1>
                <p>Text</p>
                <h2>Section</h2>
                <div><h3>Nested</h3></div>
                <h2></h2>
            </body></html>
        "#;
        let result = extract(html);

        assert_eq!(result.headings, vec!["Main Title", "Section", "Nested"]);
    }

    #[test]
    fn heading_words_count_once_toward_word_count() {
        let html = "<html><body><h1>Big Title</h1><p>Hello world</p></body></html>";
        let result = extract(html);

        assert_eq!(result.word_count, 4);
        assert!(result.text_blocks.contains(&"Big Title".to_string()));
        assert_eq!(result.headings, vec!["Big Title"]);
    }

    #[test]
    fn extracts_internal_links_with_resolved_paths() {
        let html = r#"
            <html><body>
                <a href="/about">About Us</a>
                <a href="contact">Contact</a>
                <a href="https://example.com/pricing">Pricing</a>
                <a href="https://other.com/external">External</a>
                <a href="/search?q=rust">Search</a>
            </body></html>
        "#;
        let result = extract(html);

        assert_eq!(
            result.internal_links,
            vec![
                InternalLink {
                    href: "/about".into(),
                    anchor_text: "About Us".into()
                },
                InternalLink {
                    href: "/contact".into(),
                    anchor_text: "Contact".into()
                },
                InternalLink {
                    href: "/pricing".into(),
                    anchor_text: "Pricing".into()
                },
                InternalLink {
                    href: "/search?q=rust".into(),
                    anchor_text: "Search".into()
                },
            ]
        );
    }

    #[test]
    fn skips_non_navigational_links() {
        let html = r##"
            <html><body>
                <a href="#section">Fragment</a>
                <a href="javascript:void(0)">JS</a>
                <a href="mailto:a@b.com">Mail</a>
                <a href="tel:+123">Call</a>
                <a href="">Empty</a>
                <a href="/ok">Ok</a>
            </body></html>
        "##;
        let result = extract(html);

        assert_eq!(result.internal_links.len(), 1);
        assert_eq!(result.internal_links[0].href, "/ok");
    }

    #[test]
    fn anchor_text_falls_back_to_aria_label_and_img_alt() {
        let html = r#"
            <html><body>
                <a href="/a" aria-label="Labelled"></a>
                <a href="/b"><img src="logo.png" alt="Logo home"></a>
                <a href="/c"></a>
            </body></html>
        "#;
        let result = extract(html);

        assert_eq!(
            result.internal_links,
            vec![
                InternalLink {
                    href: "/a".into(),
                    anchor_text: "Labelled".into()
                },
                InternalLink {
                    href: "/b".into(),
                    anchor_text: "Logo home".into()
                },
            ]
        );
    }

    #[test]
    fn extraction_is_idempotent() {
        let html = r#"
            <html><body>
                <h1>Title</h1>
                <p>Some <em>styled</em> content here</p>
                <a href="/about">About</a>
            </body></html>
        "#;
        let first = extract(html);
        let second = extract(html);

        assert_eq!(first, second);
    }

    #[test]
    fn degrades_gracefully_on_malformed_html() {
        let result = extract("<p>Unclosed <div>nested <b>mess");

        // tree builder recovery still yields the text, never a failure
        assert!(result.word_count > 0);
    }

    #[test]
    fn empty_document_yields_empty_result() {
        let result = extract("");

        assert!(result.text_blocks.is_empty());
        assert!(result.headings.is_empty());
        assert!(result.internal_links.is_empty());
        assert_eq!(result.word_count, 0);
    }
}

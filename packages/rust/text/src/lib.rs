//! Storage-format to plain-text extraction.
//!
//! Wiki pages arrive as storage-format markup (XHTML plus `ac:`/`ri:` macro
//! elements). The summarizer only needs the words, so this crate drops the
//! non-content elements and flattens everything else to text. No whitespace
//! normalization or other cleanup is applied.

use std::borrow::Cow;

use scraper::{ElementRef, Html, Node};
use tracing::{debug, instrument};

/// Elements whose whole subtree is removed before flattening.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style"];

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// Flatten storage-format markup to plain text.
///
/// Text nodes are concatenated in document order; `script` and `style`
/// subtrees contribute nothing. Entities are decoded by the parser, and
/// `CDATA` sections (code and plain-text macro bodies) count as text.
#[instrument(skip_all, fields(markup_len = markup.len()))]
pub fn extract_text(markup: &str) -> String {
    let markup = unwrap_cdata(markup);
    let fragment = Html::parse_fragment(&markup);
    let mut text = String::with_capacity(markup.len() / 2);
    collect_text(fragment.root_element(), &mut text);
    debug!(text_len = text.len(), "extracted plain text");
    text
}

/// Replace each `<![CDATA[...]]>` section with its escaped contents.
///
/// The HTML parser would otherwise read the section as a comment. An
/// unterminated section runs to the end of the markup.
fn unwrap_cdata(markup: &str) -> Cow<'_, str> {
    if !markup.contains(CDATA_OPEN) {
        return Cow::Borrowed(markup);
    }

    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    while let Some(start) = rest.find(CDATA_OPEN) {
        out.push_str(&rest[..start]);
        let body = &rest[start + CDATA_OPEN.len()..];
        let (inner, after) = match body.find(CDATA_CLOSE) {
            Some(end) => (&body[..end], &body[end + CDATA_CLOSE.len()..]),
            None => (body, ""),
        };
        for c in inner.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                c => out.push(c),
            }
        }
        rest = after;
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(t) => out.push_str(&t.text),
            Node::Element(el) if SKIPPED_ELEMENTS.contains(&el.name()) => {}
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

use scraper::{ElementRef, Html, Node};

/// Elements whose text never renders.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Visible text of an HTML document, text nodes trimmed and joined by single spaces.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    visible_text(document.root_element(), " ")
}

/// Text of `el` with `sep` between the trimmed, non-empty text nodes.
pub fn visible_text(el: ElementRef<'_>, sep: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in el.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN_TAGS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let t = text.trim();
        if !t.is_empty() {
            parts.push(t);
        }
    }
    parts.join(sep)
}

/// Best-effort text out of raw PDF bytes: every byte read as a Latin-1 code point.
///
/// Not a PDF decoder. Uncompressed text streams come through legibly and the
/// field patterns tolerate the surrounding noise.
pub fn pdf_bytes_to_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

// ── Tests ──

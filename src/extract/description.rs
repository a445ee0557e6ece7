use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};

static CONTAINER: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.description__text.description__text--rich")
        .expect("static CSS selector is valid")
});

/// Toggle labels rendered inside the container.
const TOGGLE_LABELS: [&str; 2] = ["Show more", "Show less"];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "ul", "ol", "section", "article", "h1", "h2", "h3", "h4", "h5", "h6", "br",
    "button", "tr", "table",
];

fn render(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                match element.name() {
                    "script" | "style" | "noscript" | "template" => {}
                    "li" => {
                        out.push_str("\n- ");
                        render(child_el, out);
                        out.push('\n');
                    }
                    name if BLOCK_TAGS.contains(&name) => {
                        out.push('\n');
                        render(child_el, out);
                        out.push('\n');
                    }
                    // inline elements keep their text in place
                    _ => render(child_el, out),
                }
            }
            _ => {}
        }
    }
}

/// Strip toggle labels, trim each line, squeeze runs of spaces and drop blank lines.
fn normalize(raw: &str) -> String {
    let mut text = raw.to_string();
    for label in TOGGLE_LABELS {
        text = text.replace(label, "");
    }
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty() && line != "-")
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract the description text from a detail page.
///
/// Returns `None` when the page has no description container. List items are
/// rendered as `- item` lines.
pub fn parse_description(doc: &Html) -> Option<String> {
    let container = doc.select(&CONTAINER).next()?;
    let mut raw = String::new();
    render(container, &mut raw);
    Some(normalize(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn describe(inner: &str) -> Option<String> {
        let html = format!(
            r#"<html><body><div class="description__text description__text--rich">{}</div></body></html>"#,
            inner
        );
        parse_description(&Html::parse_document(&html))
    }

    #[test]
    fn test_list_items_prefixed() {
        let text = describe(
            "<p>We need:</p><ul><li>Rust</li><li><strong>Tokio</strong> experience</li></ul>",
        )
        .unwrap();
        assert_eq!(text, "We need:\n- Rust\n- Tokio experience");
    }

    #[test]
    fn test_toggle_labels_and_scripts_removed() {
        let text = describe(
            r#"<section><span>Build <a href="/x">services</a>.</span></section>
               <script>var x = 1;</script>
               <button>Show more</button><button>Show less</button>"#,
        )
        .unwrap();
        assert_eq!(text, "Build services.");
    }

    #[test]
    fn test_missing_container_is_none() {
        let doc = Html::parse_document("<html><body><div class='other'>x</div></body></html>");
        assert_eq!(parse_description(&doc), None);
    }

    #[test]
    fn test_empty_container_is_empty_string() {
        assert_eq!(describe("   ").as_deref(), Some(""));
    }
}

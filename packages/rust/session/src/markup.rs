//! Small helpers over `scraper` shared by the session and the models.

use scraper::{ElementRef, Html, Selector};

use storygraph_shared::{Result, StoryGraphError};

/// Compile a CSS selector, reporting bad input as a parse error.
pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| StoryGraphError::parse(format!("invalid selector {css:?}: {e:?}")))
}

/// First element in `doc` matching `css`.
pub fn select_first<'a>(doc: &'a Html, css: &str) -> Result<Option<ElementRef<'a>>> {
    Ok(doc.select(&selector(css)?).next())
}

/// Outermost element of a document built with [`Html::parse_fragment`].
pub fn fragment_root(doc: &Html) -> Option<ElementRef<'_>> {
    doc.root_element().children().find_map(ElementRef::wrap)
}

/// Direct element children of `el`.
pub fn child_elements<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.children().filter_map(ElementRef::wrap)
}

/// All text beneath `el`, concatenated.
pub fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect()
}

/// Outer HTML of the page's `<main>` element.
pub fn main_html(doc: &Html) -> Result<String> {
    select_first(doc, "main")?
        .map(|main| main.html())
        .ok_or_else(|| StoryGraphError::parse("page has no <main> element"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_root_is_outer_element() {
        let doc = Html::parse_fragment(r#"<div class="pane"><span>a</span><p>b</p></div>"#);
        let root = fragment_root(&doc).expect("root");
        assert_eq!(root.value().name(), "div");
        let names: Vec<_> = child_elements(root).map(|c| c.value().name()).collect();
        assert_eq!(names, ["span", "p"]);
    }

    #[test]
    fn main_html_missing_is_parse_error() {
        let doc = Html::parse_document("<html><body><p>nothing</p></body></html>");
        assert!(main_html(&doc).is_err());

        let doc = Html::parse_document("<html><body><main><h1>Hi</h1></main></body></html>");
        assert_eq!(main_html(&doc).unwrap(), "<main><h1>Hi</h1></main>");
    }

    #[test]
    fn bad_selector_is_reported() {
        assert!(selector("div[").is_err());
    }
}

use scraper::{ElementRef, Html, Selector};

pub fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn element_text(el: ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// Raw concatenated text, for label matching where spacing is irrelevant.
pub fn raw_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

pub fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

pub fn first_element<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = selector(css)?;
    doc.select(&selector).next()
}

pub fn first_within<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = selector(css)?;
    scope.select(&selector).next()
}

/// Normalised text of the first match under `scope`, empty when absent.
pub fn text_within(scope: ElementRef<'_>, css: &str) -> String {
    first_within(scope, css)
        .map(element_text)
        .unwrap_or_default()
}

/// First non-blank text node following `el` among its siblings.
pub fn text_after(el: ElementRef<'_>) -> Option<String> {
    el.next_siblings()
        .filter_map(|node| node.value().as_text().map(|text| normalize_text(text)))
        .find(|text| !text.is_empty())
}

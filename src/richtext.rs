//! Rich text fields are stored as Markdown and rendered to HTML on read.

use pulldown_cmark::{BrokenLink, CowStr, LinkType, Options, Parser};

use crate::model::ValidateError;
use crate::page::Html;

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_SMART_PUNCTUATION
}

pub fn render(source: &str) -> Html {
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, Parser::new_ext(source, options()));
    Html(html)
}

/// Reference-style links whose label has no definition, in order of appearance.
///
/// Bare brackets such as `[sic]` or `xs[0]` are shortcut references and stay plain
/// text, so only `[text][label]` and `[label][]` are reported.
pub fn unknown_links(source: &str) -> Vec<String> {
    let mut labels = Vec::new();

    let parser = Parser::new_with_broken_link_callback(
        source,
        options(),
        Some(|BrokenLink { link_type, reference, .. }| match link_type {
            LinkType::Shortcut => None,
            _ => {
                labels.push(reference.to_string());
                Some((reference, CowStr::Borrowed("")))
            }
        }),
    );
    parser.for_each(drop);

    labels
}

pub fn validate(field: &str, source: &str, errors: &mut Vec<ValidateError>) {
    for label in unknown_links(source) {
        errors.push(ValidateError::UnknownLink {
            field: field.to_string(),
            label,
        });
    }
}

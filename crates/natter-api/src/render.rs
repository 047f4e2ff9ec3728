use comrak::{Options, markdown_to_html};

/// Render a message source to HTML. Raw HTML in the source is dropped
/// rather than passed through, and bare URLs become links.
pub fn render(source: &str) -> String {
    let mut options = Options::default();
    options.extension.autolink = true;
    options.extension.strikethrough = true;
    options.render.unsafe_ = false;
    markdown_to_html(source, &options)
}

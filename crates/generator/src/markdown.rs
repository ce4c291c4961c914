use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, html};
use sitekit_core::config::MarkdownOptions;

const FRONT_MATTER_START: &str = "+++\n";
const FRONT_MATTER_END: &str = "\n+++\n";

/// HTML-escape a string for use inside an attribute
///
/// Escapes: & < > " '
pub(crate) fn html_escape(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#x27;".to_string(),
            _ => c.to_string(),
        })
        .collect()
}

/// Split `+++` delimited TOML front matter from the markdown body.
pub fn split_front_matter(input: &str) -> (Option<&str>, &str) {
    let normalized = input.strip_prefix('\u{feff}').unwrap_or(input);
    let Some(rest) = normalized.strip_prefix(FRONT_MATTER_START) else {
        return (None, normalized);
    };

    // An empty block closes immediately.
    if let Some(body) = rest.strip_prefix(FRONT_MATTER_START) {
        return (Some(""), body);
    }

    match rest.split_once(FRONT_MATTER_END) {
        Some((front, body)) => (Some(front), body),
        None => match rest.strip_suffix("\n+++") {
            Some(front) => (Some(front), ""),
            None => (None, normalized),
        },
    }
}

/// Render markdown to HTML with the configured typography options.
pub fn render_markdown(input: &str, options: &MarkdownOptions) -> String {
    let mut flags = Options::empty();
    flags.insert(Options::ENABLE_TABLES);
    flags.insert(Options::ENABLE_STRIKETHROUGH);
    flags.insert(Options::ENABLE_FOOTNOTES);
    if options.smartypants {
        flags.insert(Options::ENABLE_SMART_PUNCTUATION);
    }

    let events = Parser::new_ext(input, flags).map(|event| match event {
        Event::SoftBreak if options.breaks => Event::HardBreak,
        Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => code_block_start(&info, options),
        other => other,
    });

    let mut out = String::new();
    html::push_html(&mut out, events);
    out
}

/// The html writer closes code blocks itself, only the opening tag is ours.
fn code_block_start<'a>(info: &str, options: &MarkdownOptions) -> Event<'a> {
    let lang = info.split_whitespace().next().unwrap_or_default();
    let html = if lang.is_empty() {
        "<pre><code>".to_string()
    } else {
        format!(
            "<pre><code class=\"{}{}\">",
            html_escape(&options.lang_prefix),
            html_escape(lang)
        )
    };
    Event::Html(CowStr::from(html))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> MarkdownOptions {
        MarkdownOptions::default()
    }

    #[test]
    fn test_breaks_preserve_single_newlines() {
        let html = render_markdown("one\ntwo", &options());
        assert_eq!(html, "<p>one<br />\ntwo</p>\n");

        let plain = MarkdownOptions {
            breaks: false,
            ..options()
        };
        assert_eq!(render_markdown("one\ntwo", &plain), "<p>one\ntwo</p>\n");
    }

    #[test]
    fn test_smartypants() {
        let html = render_markdown("\"quoted\" -- dash", &options());
        assert!(html.contains('“'));
        assert!(html.contains('–'));

        let plain = MarkdownOptions {
            smartypants: false,
            ..options()
        };
        assert!(!render_markdown("\"quoted\"", &plain).contains('“'));
    }

    #[test]
    fn test_code_block_lang_prefix() {
        let html = render_markdown("```rust\nlet x = 1 < 2;\n```\n", &options());
        assert_eq!(
            html,
            "<pre><code class=\"language-rust\">let x = 1 &lt; 2;\n</code></pre>\n"
        );

        let custom = MarkdownOptions {
            lang_prefix: "lang-".to_string(),
            ..options()
        };
        let html = render_markdown("```js\nx\n```\n", &custom);
        assert!(html.starts_with("<pre><code class=\"lang-js\">"));
    }

    #[test]
    fn test_code_block_without_lang() {
        let html = render_markdown("```\nplain\n```\n", &options());
        assert_eq!(html, "<pre><code>plain\n</code></pre>\n");
    }

    #[test]
    fn test_lists() {
        let html = render_markdown("- a\n- b\n\n1. one\n2. two\n", &options());
        assert!(html.contains("<ul>"));
        assert!(html.contains("<ol>"));
    }

    #[test]
    fn test_split_front_matter() {
        let (front, body) = split_front_matter("+++\ntitle = \"Hi\"\n+++\n# Body\n");
        assert_eq!(front, Some("title = \"Hi\""));
        assert_eq!(body, "# Body\n");

        let (front, body) = split_front_matter("# No front matter\n");
        assert_eq!(front, None);
        assert_eq!(body, "# No front matter\n");
    }

    #[test]
    fn test_split_front_matter_unterminated() {
        let input = "+++\ntitle = \"Hi\"\n# Body\n";
        assert_eq!(split_front_matter(input), (None, input));
    }

    #[test]
    fn test_split_front_matter_without_body() {
        let (front, body) = split_front_matter("+++\ntitle = \"Hi\"\n+++");
        assert_eq!(front, Some("title = \"Hi\""));
        assert_eq!(body, "");
    }
}

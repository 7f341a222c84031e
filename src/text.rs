// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use scraper::{ElementRef, Html};

/// Elements whose content is never shown
const HIDDEN_ELEMENTS: &[&str] = &["img", "script", "style", "head", "title"];

/// Elements rendered on a line of their own
const LINE_ELEMENTS: &[&str] = &["div", "li", "tr", "ul", "ol", "table"];

/// Elements set off by a blank line
const PARAGRAPH_ELEMENTS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote"];

/// Render an HTML description as plain text.
///
/// Source newlines are dropped (HTML whitespace is not significant), images
/// and scripts vanish, block-level elements become line breaks and entities
/// are decoded by the HTML parser.
pub fn html_to_plain(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    render(fragment.root_element(), &mut out);
    tidy_lines(&out)
}

fn render(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.extend(text.chars().map(|c| if c == '\r' || c == '\n' { ' ' } else { c }));
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            // Comments, doctypes and processing instructions
            continue;
        };

        let name = child.value().name();
        if HIDDEN_ELEMENTS.contains(&name) {
            continue;
        }
        if name == "br" {
            out.push('\n');
        } else if PARAGRAPH_ELEMENTS.contains(&name) {
            end_paragraph(out);
            render(child, out);
            end_paragraph(out);
        } else if LINE_ELEMENTS.contains(&name) {
            end_line(out);
            render(child, out);
            end_line(out);
        } else {
            render(child, out);
        }
    }
}

fn end_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn end_paragraph(out: &mut String) {
    end_line(out);
    if !out.is_empty() && !out.ends_with("\n\n") {
        out.push('\n');
    }
}

/// Collapse runs of spaces and blank lines
fn tidy_lines(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();

    let mut out = String::new();
    let mut blank_run = 0;
    for line in lines.iter().skip_while(|l| l.is_empty()) {
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        blank_run = 0;
    }
    out
}

/// Shorten `text` to at most `max_chars` characters, adding an ellipsis
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_decodes_entities() {
        assert_eq!(
            html_to_plain("<p>Fish &amp; <b>Chips</b></p>"),
            "Fish & Chips"
        );
    }

    #[test]
    fn removes_images() {
        assert_eq!(
            html_to_plain(r#"Before<img src="https://x/a.png" alt="a"/>After"#),
            "BeforeAfter"
        );
    }

    #[test]
    fn source_newlines_are_not_line_breaks() {
        assert_eq!(html_to_plain("one\ntwo"), "one two");
    }

    #[test]
    fn block_tags_become_line_breaks() {
        assert_eq!(
            html_to_plain("<p>First</p><p>Second</p>line<br/>break"),
            "First\n\nSecond\n\nline\nbreak"
        );
    }

    #[test]
    fn list_items_get_their_own_lines() {
        assert_eq!(
            html_to_plain("Topics:<ul><li>One</li><li>Two</li></ul>Thanks"),
            "Topics:\nOne\nTwo\nThanks"
        );
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(html_to_plain("Hi<!-- a > b -->there"), "Hithere");
    }

    #[test]
    fn quoted_angle_bracket_in_attribute_is_not_a_tag_end() {
        assert_eq!(html_to_plain(r#"<a title="x>y" href="/e1">link</a>"#), "link");
    }

    #[test]
    fn style_and_script_bodies_are_hidden() {
        assert_eq!(
            html_to_plain("<style>p{color:red}</style>Body<script>alert(1)</script>"),
            "Body"
        );
    }

    #[test]
    fn non_breaking_spaces_collapse() {
        assert_eq!(html_to_plain("A&nbsp;&nbsp; B"), "A B");
    }

    #[test]
    fn unterminated_tag_is_kept() {
        assert_eq!(html_to_plain("a < b"), "a < b");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Grüße aus Köln", 8), "Grüße...");
    }
}

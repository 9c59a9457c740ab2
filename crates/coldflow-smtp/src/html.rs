// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plain-text to HTML conversion for the multipart/alternative body.

/// Convert a plain text email body to a minimal HTML rendition.
///
/// Escapes HTML metacharacters, turns blank-line-separated blocks into
/// paragraphs and single newlines into `<br>`.
pub fn text_to_html(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    let body = escaped.replace("\n\n", "</p><p>").replace('\n', "<br>");
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n    <meta charset=\"utf-8\">\n    <style>\n        \
         body {{ font-family: Arial, sans-serif; font-size: 14px; line-height: 1.6; color: #333; }}\n        \
         p {{ margin: 0 0 1em 0; }}\n    </style>\n</head>\n<body>\n    <p>{body}</p>\n</body>\n</html>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_metacharacters() {
        let html = text_to_html("a < b & b > c");
        assert!(html.contains("a &lt; b &amp; b &gt; c"));
    }

    #[test]
    fn paragraphs_and_line_breaks() {
        let html = text_to_html("first para\n\nsecond para\nwith break");
        assert!(html.contains("first para</p><p>second para<br>with break"));
    }

    #[test]
    fn wraps_in_html_document() {
        let html = text_to_html("hello");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<p>hello</p>"));
    }
}

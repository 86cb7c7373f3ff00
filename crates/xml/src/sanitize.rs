//! Minimal HTML cleanup before XML parsing.
//!
//! Upstream `text/html` responses are made well-formed enough to parse
//! as XML: doctype, comments and script/style blocks are removed, void
//! elements are self-closed and stray ampersands escaped. This covers
//! machine-generated HTML fragments; a deployment can install a real
//! sanitizer at the block layer if it consumes arbitrary pages.

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Strip non-XML constructs and return a parseable approximation.
pub fn sanitize_html(input: &str) -> String {
    let without_blocks = strip_blocks(input);
    let mut out = String::with_capacity(without_blocks.len());
    let bytes = without_blocks.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => {
                let Some(end) = without_blocks[i..].find('>') else {
                    break;
                };
                let tag = &without_blocks[i..=i + end];
                out.push_str(&close_void(tag));
                i += end + 1;
            }
            b'&' => {
                if is_entity_start(&without_blocks[i..]) {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
                i += 1;
            }
            _ => {
                let c = without_blocks[i..].chars().next().unwrap_or('\u{fffd}');
                out.push(c);
                i += c.len_utf8();
            }
        }
    }
    out.trim().to_owned()
}

fn strip_blocks(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    loop {
        let lower = rest.to_ascii_lowercase();
        let next = ["<!--", "<!doctype", "<script", "<style", "<?"]
            .iter()
            .filter_map(|marker| lower.find(marker).map(|pos| (pos, *marker)))
            .min();
        let Some((pos, marker)) = next else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let tail_lower = &lower[pos..];
        let skip = match marker {
            "<!--" => tail_lower.find("-->").map(|p| p + 3),
            "<script" => tail_lower.find("</script>").map(|p| p + "</script>".len()),
            "<style" => tail_lower.find("</style>").map(|p| p + "</style>".len()),
            _ => tail_lower.find('>').map(|p| p + 1),
        };
        match skip {
            Some(skip) => rest = &tail[skip..],
            None => return out,
        }
    }
}

fn close_void(tag: &str) -> String {
    let inner = tag.trim_start_matches('<').trim_end_matches('>');
    let name = inner
        .split([' ', '\t', '\n', '/'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    if VOID_ELEMENTS.contains(&name.as_str()) && !inner.ends_with('/') {
        format!("<{inner}/>")
    } else {
        tag.to_owned()
    }
}

fn is_entity_start(text: &str) -> bool {
    let rest = &text[1..];
    if let Some(stripped) = rest.strip_prefix('#') {
        return stripped
            .chars()
            .take_while(|c| *c != ';')
            .all(|c| c.is_ascii_alphanumeric())
            && stripped.contains(';');
    }
    match rest.find(';') {
        Some(pos) if pos > 0 && pos <= 10 => rest[..pos].chars().all(|c| c.is_ascii_alphanumeric()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_doctype_comments_scripts() {
        let html = "<!DOCTYPE html><!-- c --><html><script>var x = '<b>';</script><body>hi</body></html>";
        assert_eq!(sanitize_html(html), "<html><body>hi</body></html>");
    }

    #[test]
    fn closes_void_elements() {
        assert_eq!(sanitize_html("<p>a<br>b</p>"), "<p>a<br/>b</p>");
        assert_eq!(sanitize_html("<img src=\"x\">"), "<img src=\"x\"/>");
    }

    #[test]
    fn escapes_stray_ampersands() {
        assert_eq!(sanitize_html("<p>a & b &amp; c</p>"), "<p>a &amp; b &amp; c</p>");
        assert_eq!(sanitize_html("<p>&#169;</p>"), "<p>&#169;</p>");
    }
}

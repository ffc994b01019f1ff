//! Lightweight HTML inspection for response assertions

/// Inner text of the first `<tag>` element, with nested markup removed.
pub fn element_text(html: &str, tag: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = find_open_tag(&lower, tag)?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find(&format!("</{}", tag))?;
    Some(strip_tags(&html[start..end]).trim().to_string())
}

/// Value of `attr` on the first `<tag>` element.
pub fn first_attr(html: &str, tag: &str, attr: &str) -> Option<String> {
    attr_values(html, tag, attr).into_iter().next()
}

/// Values of `attr` on every `<tag>` element, in document order.
pub fn attr_values(html: &str, tag: &str, attr: &str) -> Vec<String> {
    let lower = html.to_ascii_lowercase();
    let needle = format!("{}=\"", attr);
    let mut values = Vec::new();
    let mut offset = 0;

    while let Some(open) = find_open_tag(&lower[offset..], tag) {
        let tag_start = offset + open;
        let Some(len) = lower[tag_start..].find('>') else { break };
        let tag_text = &html[tag_start..tag_start + len];
        let tag_lower = &lower[tag_start..tag_start + len];

        if let Some(pos) = tag_lower.find(&needle) {
            let value_start = pos + needle.len();
            if let Some(value_len) = tag_text[value_start..].find('"') {
                values.push(tag_text[value_start..value_start + value_len].to_string());
            }
        }
        offset = tag_start + len;
    }

    values
}

/// Occurrences of `word` in text content only, ignoring markup and attributes.
pub fn count_in_text(html: &str, word: &str) -> usize {
    strip_tags(html).matches(word).count()
}

/// Assert a rewritten page has no "Yale" left in its text.
pub fn assert_no_yale_in_text(html: &str) {
    let remaining = count_in_text(html, "Yale");
    assert_eq!(remaining, 0, "found {} \"Yale\" left in text:\n{}", remaining, html);
}

fn find_open_tag(lower: &str, tag: &str) -> Option<usize> {
    let needle = format!("<{}", tag);
    let mut offset = 0;
    while let Some(pos) = lower[offset..].find(&needle) {
        let at = offset + pos;
        let next = lower[at + needle.len()..].chars().next();
        if matches!(next, Some(c) if c == '>' || c.is_ascii_whitespace()) {
            return Some(at);
        }
        offset = at + needle.len();
    }
    None
}

fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

//! Case-preserving "Yale" → "Fale" substitution over HTML text nodes.
//!
//! Markup is copied through untouched: tags (and therefore every attribute
//! value, including `href`s pointing at yale.edu), comments, declarations and
//! the raw bodies of `<script>` and `<style>`. Only the text between tags is
//! rewritten.

/// Replacement pairs applied to text. All pairs have equal length, so they
/// never overlap and can be applied in sequence.
const REPLACEMENTS: [(&str, &str); 3] = [("Yale", "Fale"), ("YALE", "FALE"), ("yale", "fale")];

/// Elements whose content is raw text rather than markup.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// Rewrites every text node of `html`.
pub fn rewrite_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(lt) = rest.find('<') {
        let (text, markup) = rest.split_at(lt);
        out.push_str(&rewrite_text(text));
        let consumed = copy_markup(markup, &mut out);
        rest = &markup[consumed..];
    }
    out.push_str(&rewrite_text(rest));

    out
}

/// Applies the substitution to a run of plain text.
pub fn rewrite_text(text: &str) -> String {
    REPLACEMENTS
        .iter()
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to))
}

/// Returns the trimmed text of the first `<title>` element.
pub fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    Some(html[start..end].trim().to_string())
}

/// Copies the construct starting at `markup` (which begins with `<`) into
/// `out` and returns the number of bytes consumed.
fn copy_markup(markup: &str, out: &mut String) -> usize {
    if let Some(body) = markup.strip_prefix("<!--") {
        let end = body.find("-->").map_or(markup.len(), |i| 4 + i + 3);
        out.push_str(&markup[..end]);
        return end;
    }

    let opens_tag = markup[1..]
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'));
    if !opens_tag {
        // A bare '<' inside text, e.g. "a < b".
        out.push('<');
        return 1;
    }

    let end = tag_end(markup);
    let tag = &markup[..end];
    out.push_str(tag);

    match raw_text_element(tag) {
        Some(name) => {
            let body = &markup[end..];
            let close = find_ignore_ascii_case(body, &format!("</{name}")).unwrap_or(body.len());
            out.push_str(&body[..close]);
            end + close
        }
        None => end,
    }
}

/// Byte offset just past the `>` closing the tag at the start of `markup`.
/// Quoted attribute values may contain `>`; a quote only opens a value when it
/// directly follows `=` (whitespace aside), so `title=Yale's` stays unquoted.
fn tag_end(markup: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut after_eq = false;
    for (i, c) in markup.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if after_eq => quote = Some(c),
            (None, '>') => return i + 1,
            _ => {}
        }
        if !c.is_ascii_whitespace() {
            after_eq = quote.is_none() && c == '=';
        }
    }
    markup.len()
}

fn raw_text_element(tag: &str) -> Option<&'static str> {
    if tag.ends_with("/>") {
        return None;
    }
    let name = tag[1..]
        .split(|c: char| c.is_ascii_whitespace() || c == '>' || c == '/')
        .next()?;
    RAW_TEXT_ELEMENTS
        .iter()
        .copied()
        .find(|raw| raw.eq_ignore_ascii_case(name))
}

/// ASCII lowercasing keeps byte offsets, so positions map back onto `haystack`.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

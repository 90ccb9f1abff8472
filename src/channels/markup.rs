//! Chat markup (`*bold*`, `_italic_`, `~strike~`, `•` bullets) to HTML for
//! the web surface.

use std::sync::LazyLock;

use regex::Regex;

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b_([^_\n]+)_\b").unwrap());
static STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~([^~\n]+)~").unwrap());
static BREAK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(<br>){3,}").unwrap());

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn to_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let html = escape_html(text);
    let html = BOLD.replace_all(&html, "<strong>$1</strong>");
    let html = ITALIC.replace_all(&html, "<em>$1</em>");
    let html = STRIKE.replace_all(&html, "<del>$1</del>");

    let mut lines = Vec::new();
    let mut in_list = false;
    for line in html.lines().map(str::trim) {
        let bullet = line
            .strip_prefix('•')
            .or_else(|| line.strip_prefix("- "));
        match bullet {
            Some(item) => {
                if !in_list {
                    lines.push("<ul>".to_string());
                    in_list = true;
                }
                lines.push(format!("<li>{}</li>", item.trim()));
            }
            None => {
                if in_list {
                    lines.push("</ul>".to_string());
                    in_list = false;
                }
                lines.push(line.to_string());
            }
        }
    }
    if in_list {
        lines.push("</ul>".to_string());
    }

    let joined = lines.join("<br>");
    BREAK_RUNS.replace_all(&joined, "<br><br>").into_owned()
}

use std::sync::OnceLock;

use regex::Regex;

/// Key used to order movie listings: lowercased, leading article and
/// punctuation stripped, trailing " (YYYY)" removed.
pub fn make_sort_name(name: &str) -> String {
    let mut title = name.trim().to_lowercase();

    for prefix in &["the ", "a ", "an "] {
        if let Some(rest) = title.strip_prefix(prefix) {
            title = rest.trim_start().to_string();
            break;
        }
    }

    title = title
        .trim_start_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .to_string();

    remove_year_suffix(&title)
}

fn remove_year_suffix(name: &str) -> String {
    static YEAR_SUFFIX: OnceLock<Regex> = OnceLock::new();
    let re = YEAR_SUFFIX.get_or_init(|| Regex::new(r"\s*\(\d{4}\)\s*$").expect("valid regex"));
    re.replace(name, "").trim().to_string()
}

use regex::Regex;
use std::sync::LazyLock;

/// Script tags that carry the choice data as JSON, in order of preference
const DATA_SCRIPT_IDS: [&str; 2] = ["webpack-subscriber-hub-data", "webpack-monthly-product-data"];

static SCRIPT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script\b[^>]*\bid\s*=\s*["']([^"']+)["'][^>]*>(.*?)</script>"#)
        .expect("script pattern is valid")
});

/// Extracts the JSON payload embedded in a membership page.
///
/// Returns `None` when none of the known data scripts is present or all are empty.
pub fn extract_choice_data(html: &str) -> Option<&str> {
    let scripts: Vec<(&str, &str)> = SCRIPT_TAG
        .captures_iter(html)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str().trim())))
        .filter(|(_, body)| !body.is_empty())
        .collect();

    DATA_SCRIPT_IDS.iter().find_map(|wanted| {
        scripts
            .iter()
            .find(|(id, _)| id == wanted)
            .map(|(_, body)| *body)
    })
}

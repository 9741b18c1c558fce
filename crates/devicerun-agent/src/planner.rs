//! Prompt planner: maps a natural language prompt onto one task.
//!
//! Rules are checked in order and the first match wins. Anything unrecognised
//! falls back to a browser search.

use devicerun_core::task::{MAX_REPEAT, MIN_REPEAT};
use devicerun_core::TaskSpec;
use tracing::debug;

const DEFAULT_QUERY: &str = "qualgent test";
const DEFAULT_SCROLL_COUNT: u32 = 2;
const MAX_QUERY_CHARS: usize = 100;
const MAX_URL_CHARS: usize = 2048;
const MAX_TEXT_CHARS: usize = 200;

/// Plan a task from a prompt.
pub fn plan(prompt: &str) -> TaskSpec {
    let spec = plan_inner(prompt);
    debug!(prompt = %prompt, task = %spec.name, "Planned task");
    spec
}

fn plan_inner(prompt: &str) -> TaskSpec {
    let p = prompt.to_lowercase();

    if p.contains("search") || p.contains("browse") || p.contains("google") {
        let query = p
            .split("search for ")
            .nth(1)
            .map(str::trim)
            .unwrap_or(DEFAULT_QUERY);
        return TaskSpec::new("browser_search")
            .with_param("query", truncate(query, MAX_QUERY_CHARS));
    }
    if p.contains("open settings") {
        return TaskSpec::new("open_settings");
    }
    if p.contains("scroll") {
        let count = p
            .split_whitespace()
            .find(|tok| tok.chars().all(|c| c.is_ascii_digit()))
            .map(|tok| {
                tok.parse::<u64>()
                    .map(|n| n.clamp(u64::from(MIN_REPEAT), u64::from(MAX_REPEAT)) as u32)
                    .unwrap_or(MAX_REPEAT)
            })
            .unwrap_or(DEFAULT_SCROLL_COUNT);
        return TaskSpec::new("scroll")
            .with_param("direction", "down")
            .with_param("count", count);
    }
    if p.contains("screenshot") {
        return TaskSpec::new("screenshot").with_param("filename", "shot_1.png");
    }

    if p.starts_with("open app ") {
        let rest = third_field(prompt);
        let (package, activity) = rest.split_once('/').unwrap_or((rest, ""));
        let mut spec = TaskSpec::new("open_app").with_param("package", package.trim());
        if !activity.trim().is_empty() {
            spec = spec.with_param("activity", activity.trim());
        }
        return spec;
    }
    if p.starts_with("open url ") {
        let url = third_field(prompt);
        return TaskSpec::new("open_url").with_param("url", truncate(url, MAX_URL_CHARS));
    }

    if let Some([x, y]) = numbers_after(&p, "tap") {
        return TaskSpec::new("tap").with_param("x", x).with_param("y", y);
    }
    if let Some([x1, y1, x2, y2]) = numbers_after(&p, "swipe") {
        return TaskSpec::new("swipe")
            .with_param("x1", x1)
            .with_param("y1", y1)
            .with_param("x2", x2)
            .with_param("y2", y2);
    }

    if p.starts_with("type ") {
        let text = prompt.split_once(' ').map(|(_, rest)| rest).unwrap_or_default();
        return TaskSpec::new("type_text").with_param("text", truncate(text, MAX_TEXT_CHARS));
    }

    if p.contains("go home") || p.trim() == "home" {
        return TaskSpec::new("nav_home");
    }
    if p.contains("back") {
        return TaskSpec::new("nav_back");
    }
    if p.contains("recents") {
        return TaskSpec::new("nav_recents");
    }
    if p.contains("notifications") {
        return TaskSpec::new("open_notifications");
    }

    if p.contains("wifi on") || p.contains("enable wifi") {
        return TaskSpec::new("wifi").with_param("enabled", true);
    }
    if p.contains("wifi off") || p.contains("disable wifi") {
        return TaskSpec::new("wifi").with_param("enabled", false);
    }

    TaskSpec::new("browser_search").with_param("query", DEFAULT_QUERY)
}

/// Everything after the second space, trimmed, with the prompt's casing.
fn third_field(prompt: &str) -> &str {
    prompt.splitn(3, ' ').nth(2).unwrap_or_default().trim()
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Find `keyword` followed by `N` whitespace separated 2-4 digit numbers.
///
/// The last occurrence of the keyword that matches wins. The final number may
/// run on; only its first four digits count.
fn numbers_after<const N: usize>(text: &str, keyword: &str) -> Option<[u32; N]> {
    let starts: Vec<usize> = text.match_indices(keyword).map(|(i, _)| i).collect();
    starts
        .into_iter()
        .rev()
        .find_map(|start| take_numbers::<N>(&text[start + keyword.len()..]))
}

fn take_numbers<const N: usize>(mut rest: &str) -> Option<[u32; N]> {
    let mut out = [0u32; N];
    for (i, slot) in out.iter_mut().enumerate() {
        let trimmed = rest.trim_start();
        if trimmed.len() == rest.len() {
            return None;
        }
        let digits = trimmed.bytes().take_while(u8::is_ascii_digit).count();
        let last = i + 1 == N;
        if digits < 2 || (!last && digits > 4) {
            return None;
        }
        let take = digits.min(4);
        *slot = trimmed[..take].parse().ok()?;
        rest = &trimmed[take..];
    }
    Some(out)
}

//! Renders a qualified candidate into a Telegram HTML message body.

use chrono::{DateTime, Utc};
use fpn_core::{flag_for_country, humanize_since, ActorRecord, CandidateRecord};

pub const MAX_MESSAGE_CHARS: usize = 4096;
const SEPARATOR_WIDTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFormatter {
    pub project_url_base: String,
    pub user_url_base: String,
    pub max_chars: usize,
}

impl NotificationFormatter {
    /// Total: every candidate/actor pair renders to some message no longer than `max_chars`.
    pub fn render(&self, candidate: &CandidateRecord, actor: &ActorRecord, now: DateTime<Utc>) -> String {
        let sign = escape_html(&candidate.currency.sign);
        let project_url = escape_html(&candidate.public_url(&self.project_url_base));
        let user_url = escape_html(&actor.profile_url(&self.user_url_base));

        let employer = match actor.country.as_deref().and_then(flag_for_country) {
            Some(flag) => format!(
                "<a href=\"{user_url}\">{}</a> {flag}",
                escape_html(&actor.username)
            ),
            None => format!("<a href=\"{user_url}\">{}</a>", escape_html(&actor.username)),
        };

        let skills = candidate
            .skill_names()
            .map(escape_html)
            .collect::<Vec<_>>()
            .join(", ");

        let text = [
            format!(
                "<b>Title</b>: <a href=\"{project_url}\">{}</a> ({})",
                escape_html(&candidate.title),
                humanize_since(candidate.submitted_at, now)
            ),
            format!(
                "<b>Budget</b>: {sign}{}-{sign}{} ({})",
                candidate.budget.minimum,
                candidate.budget.maximum,
                escape_html(&candidate.currency.code)
            ),
            format!(
                "<b>Bids</b>: {} (Average: {sign}{:.2})",
                candidate.bid_stats.bid_count, candidate.bid_stats.bid_avg
            ),
            format!("<b>Skills</b>: {skills}"),
            format!(
                "<b>Employer</b>: {employer} (Rating: {:.2}, Created: {})",
                actor.reputation,
                humanize_since(actor.registered_at, now)
            ),
            format!(
                "{}\n\n{}",
                "-".repeat(SEPARATOR_WIDTH),
                escape_html(&candidate.description)
            ),
        ]
        .join("\n\n");

        truncate_chars(text, self.max_chars)
    }
}

/// Keep the first `max` chars. May cut inside the description; that is accepted.
///
/// The cut runs on already-escaped text, so it can land inside an entity and leave
/// a dangling `&am` at the end. Telegram's HTML parser may reject such a message,
/// which leaves the candidate unnotified and retried every cycle. Accepted: it needs
/// a description long enough to hit the limit with an `&`, `<` or `>` at the cut.
pub fn truncate_chars(mut text: String, max: usize) -> String {
    if let Some((byte_idx, _)) = text.char_indices().nth(max) {
        text.truncate(byte_idx);
    }
    text
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor, at, candidate};
    use chrono::Duration;

    fn formatter() -> NotificationFormatter {
        NotificationFormatter {
            project_url_base: "https://freelancer.com/projects".into(),
            user_url_base: "https://freelancer.com/u".into(),
            max_chars: MAX_MESSAGE_CHARS,
        }
    }

    #[test]
    fn renders_every_section_in_order() {
        let mut c = candidate(7, 100, "USD", &["Python", "Web Scraping"]);
        c.title = "Scraper".into();
        c.seo_url = "python/scraper".into();
        c.budget.minimum = 250.0;
        c.budget.maximum = 750.0;
        c.bid_stats.bid_count = 4;
        c.bid_stats.bid_avg = 612.456;
        c.description = "Plain description".into();
        c.submitted_at = at(1_000_000);
        let mut a = actor(100, true, false);
        a.username = "acme".into();
        a.country = Some("United States".into());
        a.reputation = 4.8765;
        a.registered_at = at(1_000_000) - Duration::days(400);
        let now = at(1_000_000) + Duration::hours(3);

        let text = formatter().render(&c, &a, now);
        let expected = [
            "<b>Title</b>: <a href=\"https://freelancer.com/projects/python/scraper\">Scraper</a> (3 hours ago)",
            "<b>Budget</b>: $250-$750 (USD)",
            "<b>Bids</b>: 4 (Average: $612.46)",
            "<b>Skills</b>: Python, Web Scraping",
            "<b>Employer</b>: <a href=\"https://freelancer.com/u/acme\">acme</a> 🇺🇸 (Rating: 4.88, Created: a year ago)",
            "--------------------------------------------------\n\nPlain description",
        ]
        .join("\n\n");
        assert_eq!(text, expected);
    }

    #[test]
    fn feed_text_is_escaped_and_unknown_country_has_no_flag() {
        let mut c = candidate(7, 100, "USD", &["C++ & Rust"]);
        c.title = "<script>".into();
        c.description = "a < b && c > d".into();
        let mut a = actor(100, true, false);
        a.country = None;

        let text = formatter().render(&c, &a, Utc::now());
        assert!(text.contains("&lt;script&gt;"));
        assert!(text.contains("C++ &amp; Rust"));
        assert!(text.ends_with("a &lt; b &amp;&amp; c &gt; d"));
        assert!(text.contains("</a> (Rating:"));
    }

    #[test]
    fn long_messages_are_cut_to_exactly_the_limit() {
        let mut c = candidate(7, 100, "USD", &["A"]);
        c.description = "ж".repeat(10_000);
        let a = actor(100, true, false);
        let now = Utc::now();

        let text = formatter().render(&c, &a, now);
        assert_eq!(text.chars().count(), MAX_MESSAGE_CHARS);

        let mut short = c.clone();
        short.description = String::new();
        let header = formatter().render(&short, &a, now);
        assert!(text.starts_with(&header));
    }

    #[test]
    fn short_messages_are_untouched() {
        assert_eq!(truncate_chars("abc".into(), 3), "abc");
        assert_eq!(truncate_chars("abcd".into(), 3), "abc");
        assert_eq!(truncate_chars(String::new(), 3), "");
    }
}

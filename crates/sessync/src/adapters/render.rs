//! Message bodies shared by the adapters.

use super::SessionUpdate;

const FOOTER: &str = "Updated via sessync";
const MAX_LISTED_FILES: usize = 10;

fn category_names(update: &SessionUpdate) -> Vec<&'static str> {
    update
        .categories
        .iter()
        .map(|c| c.category.as_str())
        .collect()
}

fn listed_files(update: &SessionUpdate) -> (Vec<&str>, usize) {
    let files: Vec<&str> = update.references.files.iter().map(String::as_str).collect();
    let total = files.len();
    (files.into_iter().take(MAX_LISTED_FILES).collect(), total)
}

/// `"{prefix} - 2026-03-14 09:30:00 UTC"`
pub fn title(prefix: &str, update: &SessionUpdate) -> String {
    format!(
        "{prefix} - {}",
        update.summary.timestamp().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Plain text, for issue comments and note pages.
pub fn plain_text(update: &SessionUpdate) -> String {
    let mut text = format!("Session Summary: {}", update.summary.raw_text().trim());

    if !update.references.work_items.is_empty() {
        text.push_str(&format!(
            "\n\nWork items: {}",
            update.references.work_items.join(", ")
        ));
    }

    let categories = category_names(update);
    if !categories.is_empty() {
        text.push_str(&format!("\n\nCategories: {}", categories.join(", ")));
    }

    let (files, total) = listed_files(update);
    if total > 0 {
        text.push_str(&format!("\n\nFiles modified: {total} ({})", files.join(", ")));
        if total > files.len() {
            text.push_str(", ...");
        }
    }

    text.push_str(&format!("\n\n---\n{FOOTER}"));
    text
}

/// GitHub-flavoured Markdown.
pub fn markdown(update: &SessionUpdate) -> String {
    let mut text = format!(
        "## Session Update - {}\n\n**Summary:** {}\n\n",
        update.summary.timestamp().format("%Y-%m-%d %H:%M UTC"),
        update.summary.raw_text().trim()
    );

    let categories = category_names(update);
    if !categories.is_empty() {
        text.push_str(&format!("**Categories:** {}\n\n", categories.join(", ")));
    }

    let (files, total) = listed_files(update);
    if total > 0 {
        text.push_str(&format!("**Files Modified:** {total}\n"));
        for file in &files {
            text.push_str(&format!("- `{file}`\n"));
        }
        text.push('\n');
    }

    text.push_str(&format!("---\n*{FOOTER}*"));
    text
}

/// One-message chat notification (Slack mrkdwn).
pub fn chat(update: &SessionUpdate) -> String {
    let mut text = format!(
        "*{}* session update: {}",
        update.project,
        update.summary.raw_text().trim()
    );
    if !update.references.work_items.is_empty() {
        text.push_str(&format!(
            "\nWork items: {}",
            update.references.work_items.join(", ")
        ));
    }
    let (_, total) = listed_files(update);
    if total > 0 {
        text.push_str(&format!("\nFiles modified: {total}"));
    }
    text
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Confluence storage format (XHTML).
pub fn storage_html(update: &SessionUpdate) -> String {
    let mut html = format!(
        "<h2>Session Update - {}</h2><p><strong>Summary:</strong> {}</p>",
        update.summary.timestamp().format("%Y-%m-%d %H:%M UTC"),
        escape_html(update.summary.raw_text().trim())
    );

    let categories = category_names(update);
    if !categories.is_empty() {
        html.push_str(&format!(
            "<p><strong>Categories:</strong> {}</p>",
            categories.join(", ")
        ));
    }

    if !update.references.work_items.is_empty() {
        html.push_str("<p><strong>Work Items:</strong></p><ul>");
        for item in &update.references.work_items {
            html.push_str(&format!("<li>{}</li>", escape_html(item)));
        }
        html.push_str("</ul>");
    }

    let (files, total) = listed_files(update);
    if total > 0 {
        html.push_str("<p><strong>Files Changed:</strong></p><ul>");
        for file in files {
            html.push_str(&format!("<li><code>{}</code></li>", escape_html(file)));
        }
        html.push_str("</ul>");
    }

    html.push_str(&format!("<p><em>{FOOTER}</em></p>"));
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sessync_core::extract::{categorize, extract, ExtractionPatterns};
    use sessync_core::SessionSummary;

    fn update(text: &str) -> SessionUpdate {
        let ts = chrono::Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        SessionUpdate {
            project: "Atlas".to_string(),
            summary: SessionSummary::at(text, ts),
            references: extract(text, &ExtractionPatterns::defaults()),
            categories: categorize(text),
        }
    }

    #[test]
    fn plain_text_lists_references() {
        let text = plain_text(&update("Fixed ATL-7 crash in src/tiles.rs"));
        assert!(text.starts_with("Session Summary: Fixed ATL-7 crash in src/tiles.rs"));
        assert!(text.contains("Work items: ATL-7"));
        assert!(text.contains("Categories: bugfix"));
        assert!(text.contains("Files modified: 1 (src/tiles.rs)"));
        assert!(text.ends_with("Updated via sessync"));
    }

    #[test]
    fn storage_html_escapes_summary() {
        let html = storage_html(&update("Fixed <script> handling & ATL-1"));
        assert!(html.contains("Fixed &lt;script&gt; handling &amp; ATL-1"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn title_uses_summary_timestamp() {
        assert_eq!(
            title("Session Update", &update("x")),
            "Session Update - 2026-03-14 09:30:00 UTC"
        );
    }
}

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::models::Article;
use crate::newsletter::Newsletter;
use crate::ranking::Tier;

const NO_SUMMARY: &str = "No newsletter summary available.";

const STYLE: &str = r#"
.item-card { margin-bottom: 1rem; border: 1px solid var(--pico-muted-border-color); border-radius: 0.5rem; }
.long-item { padding: 1.5rem; box-shadow: 0 4px 6px rgba(0, 0, 0, 0.1); }
.long-item h3 { font-size: 1.5rem; margin-bottom: 1rem; }
.short-item { padding: 1rem; }
.short-item h3 { font-size: 1.2rem; margin-bottom: 0.5rem; }
.link-item { padding: 0.5rem; border: none; background: none; }
.link-item h3 { font-size: 1rem; margin-bottom: 0; }
.long-summary, .short-summary, .read-more { display: none; }
.long-item .long-summary, .short-item .short-summary,
.long-item .read-more, .short-item .read-more { display: block; }
.newsletter-summary { background-color: #f0f4f8; border: 1px solid #d1d5db; border-radius: 0.5rem; padding: 1rem; margin-bottom: 2rem; }
.sortable { list-style-type: none; padding: 0; }
.sortable li { list-style-type: none; cursor: grab; }
.votes { display: flex; gap: 0.5rem; }
.votes button { padding: 0.1rem 0.6rem; font-size: 0.8rem; }
.download-btn { display: inline-block; padding: 0.5rem 1.2rem; background-color: #4F46E5; color: white; text-decoration: none; border-radius: 0.5rem; }
.download-btn:hover { background-color: #4338CA; }
.header-row { display: flex; justify-content: space-between; align-items: center; margin-bottom: 1.5rem; }
.last-updated { margin: 0; }
"#;

const SCRIPTS: &str = r#"<script src="https://unpkg.com/htmx.org@1.9.12"></script>
<script src="https://cdn.jsdelivr.net/npm/sortablejs@1.15.2/Sortable.min.js"></script>
<script>
htmx.onLoad(function (content) {
  content.querySelectorAll(".sortable").forEach(function (el) {
    new Sortable(el, { animation: 150 });
  });
});
</script>"#;

pub(crate) fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Only http(s) links make it into an `href`.
fn safe_href(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        escape_html(url)
    } else {
        "#".to_string()
    }
}

fn paragraphs(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", escape_html(p)))
        .collect()
}

fn story_card(out: &mut String, tier: Tier, article: &Article) {
    let href = safe_href(&article.url);
    let title = escape_html(&article.title);
    let _ = write!(
        out,
        r##"<li><article class="item-card {class}">
<h3><a href="{href}" target="_blank" rel="noopener">{title}</a></h3>
<p class="long-summary">{long}</p>
<p class="short-summary">{short}</p>
<footer>
<a class="secondary read-more" href="{href}" target="_blank" rel="noopener">Read more</a>
<div class="votes">
<button type="button" class="outline" hx-post="/vote/{id}/up" hx-target="#story-container" hx-swap="innerHTML" title="Move up">&#9650;</button>
<button type="button" class="outline" hx-post="/vote/{id}/down" hx-target="#story-container" hx-swap="innerHTML" title="Move down">&#9660;</button>
</div>
</footer>
<input type="hidden" name="id" value="{id}">
</article></li>
"##,
        class = tier.css_class(),
        href = href,
        title = title,
        long = escape_html(article.long_summary_text()),
        short = escape_html(article.short_summary_text()),
        id = article.id,
    );
}

/// The sortable list body; also the fragment returned after a vote or reorder.
pub fn story_list(articles: &[(Tier, &Article)]) -> String {
    let mut out = String::new();
    for (tier, article) in articles {
        story_card(&mut out, *tier, article);
    }
    out
}

pub fn index_page(
    articles: &[(Tier, &Article)],
    last_update: Option<DateTime<Utc>>,
    summary: Option<&str>,
) -> String {
    let last_updated = last_update
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "Never".to_string());

    format!(
        r##"<!DOCTYPE html>
<html lang="en" data-theme="light">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Bedtime Reading</title>
<link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/@picocss/pico@2/css/pico.min.css">
<style>{style}</style>
{scripts}
</head>
<body>
<main class="container">
<h1>Bedtime Reading</h1>
<div class="header-row">
<p class="last-updated">Last updated on: {last_updated}</p>
<a class="download-btn" href="/download-newsletter">Download Newsletter</a>
</div>
<div class="newsletter-summary">{summary}</div>
<form id="story-container" class="sortable" hx-post="/reorder" hx-trigger="end" hx-target="#story-container" hx-swap="innerHTML">
{stories}</form>
</main>
</body>
</html>
"##,
        style = STYLE,
        scripts = SCRIPTS,
        last_updated = last_updated,
        summary = paragraphs(summary.unwrap_or(NO_SUMMARY)),
        stories = story_list(articles),
    )
}

/// Self-contained newsletter with no scripts, suitable for email.
pub fn newsletter_document(newsletter: &Newsletter) -> String {
    let mut featured = String::new();
    let mut quick = String::new();
    let mut also = String::new();

    for (tier, article) in newsletter.tiers() {
        let href = safe_href(&article.url);
        let title = escape_html(&article.title);
        match tier {
            Tier::Long => {
                let _ = write!(
                    featured,
                    "<h3><a href=\"{href}\">{title}</a></h3>\n{}\n",
                    paragraphs(article.long_summary_text())
                );
            }
            Tier::Short => {
                let _ = writeln!(
                    quick,
                    "<li><strong><a href=\"{href}\">{title}</a></strong>: {}</li>",
                    escape_html(article.short_summary_text())
                );
            }
            Tier::Link => {
                let _ = writeln!(also, "<li><a href=\"{href}\">{title}</a></li>");
            }
        }
    }

    let date = newsletter.date.format("%Y-%m-%d");
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Bedtime Reading {date}</title>
<style>
body {{ font-family: Georgia, serif; max-width: 46rem; margin: 2rem auto; padding: 0 1rem; line-height: 1.55; color: #1f2933; }}
h2 {{ border-bottom: 2px solid #d1d5db; padding-bottom: 0.4rem; margin-top: 2rem; }}
.intro {{ font-style: italic; color: #52606d; }}
.newsletter-summary {{ background-color: #f0f4f8; border: 1px solid #d1d5db; border-radius: 0.5rem; padding: 1rem; }}
ul {{ padding-left: 1.2rem; }}
</style>
</head>
<body>
<h1>Bedtime Reading</h1>
<p class="intro">{intro}</p>
<div class="newsletter-summary">{summary}</div>
<h2>Featured Articles</h2>
{featured}<h2>Quick Reads</h2>
<ul>
{quick}</ul>
<h2>Also Worth Checking</h2>
<ul>
{also}</ul>
</body>
</html>
"#,
        date = date,
        intro = escape_html(&newsletter.intro()),
        summary = paragraphs(newsletter.summary.as_deref().unwrap_or(NO_SUMMARY)),
        featured = featured,
        quick = quick,
        also = also,
    )
}

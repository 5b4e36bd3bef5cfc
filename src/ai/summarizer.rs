use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Article, ArticleSummary};

use super::{Summarize, SummaryContext};

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ARTICLE_MODEL: &str = "claude-3-5-haiku-20241022";
const NEWSLETTER_MODEL: &str = "claude-3-5-sonnet-20241022";

const ARTICLE_CONTENT_CHARS: usize = 1500;
const EXAMPLE_SUMMARY_CHARS: usize = 100;
const NEWSLETTER_INPUT_CHARS: usize = 3000;

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

pub struct Summarizer {
    client: Client,
    api_key: String,
}

impl Summarizer {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, api_key })
    }

    async fn complete(&self, model: &str, system: Option<&str>, prompt: String) -> Result<String> {
        let request = MessageRequest {
            model: model.to_string(),
            max_tokens: 1000,
            temperature: 0.0,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
            system: system.map(str::to_string),
        };

        let response = self
            .client
            .post(CLAUDE_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AppError::ClaudeApi(format!("API error: {}", error_text)));
        }

        let message_response: MessageResponse = response.json().await?;

        let text = message_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        Ok(text)
    }
}

#[async_trait]
impl Summarize for Summarizer {
    async fn summarize_article(
        &self,
        title: &str,
        url: &str,
        content: &str,
        context: &SummaryContext,
    ) -> Result<ArticleSummary> {
        let prompt = article_prompt(title, url, content, context);
        let system = "You summarise articles for a weekly reading list and reply with JSON only.";
        let reply = self.complete(ARTICLE_MODEL, Some(system), prompt).await?;
        parse_article_summary(&reply)
    }

    async fn summarize_newsletter(&self, articles: &[Article]) -> Result<String> {
        let reply = self
            .complete(NEWSLETTER_MODEL, None, newsletter_prompt(articles))
            .await?;
        Ok(strip_summary_tags(&reply))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub(crate) fn article_prompt(
    title: &str,
    url: &str,
    content: &str,
    context: &SummaryContext,
) -> String {
    let mut prompt = format!(
        "Analyze the following article and provide a summary in JSON format.\n\n\
         Title: {title}\nURL: {url}\n\nContent:\n{}\n",
        truncate(content, ARTICLE_CONTENT_CHARS)
    );

    if !context.examples.is_empty() {
        prompt.push_str("\nHere are some recent articles and their interest scores for reference:\n");
        for example in &context.examples {
            let _ = write!(
                prompt,
                "\nTitle: {}\nScore: {}\nSummary: {}...\n",
                example.title,
                example.interest_score,
                truncate(&example.short_summary, EXAMPLE_SUMMARY_CHARS)
            );
        }
    }

    if !context.preferences.is_empty() {
        prompt.push_str("\nHere are some examples of article comparisons:\n");
        for preference in &context.preferences {
            let _ = write!(
                prompt,
                "\nPreferred article:\nTitle: {}\n{}...\n\nOver this article:\nTitle: {}\n{}...\n",
                preference.winner_title,
                truncate(&preference.winner_summary, EXAMPLE_SUMMARY_CHARS),
                preference.loser_title,
                truncate(&preference.loser_summary, EXAMPLE_SUMMARY_CHARS)
            );
        }
    }

    prompt.push_str(
        r#"
Base the interest score on London-based AI engineers who are technically savvy and want to focus on exciting AI developments. Keep it consistent with the example scores above.

For the summaries:
- short_summary: 2-3 sentences capturing the main points and key insights
- long_summary: 5-6 sentences covering context, key findings and implications

Reply with JSON in exactly this shape:
{
  "interest_score": <0-100>,
  "short_summary": "<2-3 sentence summary>",
  "long_summary": "<5-6 sentence summary>"
}"#,
    );
    prompt
}

pub(crate) fn newsletter_prompt(articles: &[Article]) -> String {
    let mut listing = String::new();
    for article in articles {
        let _ = write!(
            listing,
            "Title: {}\nURL: {}\nSummary: {}\n\n",
            article.title,
            article.url,
            article.long_summary_text()
        );
    }

    format!(
        r#"You are writing the opening summary for this week's reading newsletter.
<articles>
{}
</articles>

Pick the 3-5 most important and interesting articles and condense their key points into 7-10 lines.
Be factual but make it exciting; professional yet approachable, enthusiastic without being promotional.
Do not start with phrases like "In this newsletter"; dive straight into the content and refer to "this week".

Put your summary inside <summary> tags."#,
        truncate(&listing, NEWSLETTER_INPUT_CHARS)
    )
}

/// Pulls the JSON object out of a model reply, tolerating prose or code
/// fences around it.
pub fn parse_article_summary(reply: &str) -> Result<ArticleSummary> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(AppError::ClaudeApi(format!(
                "reply contained no JSON object: {}",
                truncate(reply, 200)
            )))
        }
    };

    let summary: ArticleSummary = serde_json::from_str(json)
        .map_err(|e| AppError::ClaudeApi(format!("malformed summary JSON: {e}")))?;

    if !summary.interest_score.is_finite()
        || summary.short_summary.trim().is_empty()
        || summary.long_summary.trim().is_empty()
    {
        return Err(AppError::ClaudeApi("summary JSON had empty fields".to_string()));
    }
    Ok(summary)
}

fn strip_summary_tags(reply: &str) -> String {
    reply
        .replace("<summary>", "")
        .replace("</summary>", "")
        .trim()
        .to_string()
}

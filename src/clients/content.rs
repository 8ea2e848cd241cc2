//! Listing copy generation through a chat-completions endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ContentGenerator, ContentRequest, ListingContent};
use crate::config::Config;

/// eBay rejects titles longer than this
pub const MAX_TITLE_CHARS: usize = 80;

const SYSTEM_PROMPT: &str = "You write eBay listings for a UK LEGO reseller. \
Reply with a JSON object containing \"title\" (max 80 characters, include the set number) \
and \"description\" (HTML, mention condition and what is included).";

#[derive(Clone)]
pub struct ContentClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ContentClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.content_api_url.clone(),
            api_key: config.content_api_key.clone(),
            model: config.content_model.clone(),
        }
    }
}

fn user_prompt(request: &ContentRequest) -> String {
    let mut prompt = format!(
        "Set number: {}\nName: {}\nCondition: {}\n",
        request.set_number.as_deref().unwrap_or("unknown"),
        request.item_name.as_deref().unwrap_or("unknown"),
        request.condition
    );
    if let Some(notes) = &request.notes {
        prompt.push_str(&format!("Seller notes: {}\n", notes));
    }
    prompt
}

/// Parse the model's JSON reply and clamp the title to eBay's limit
fn parse_content(raw: &str) -> Result<ListingContent, ContentError> {
    #[derive(Deserialize)]
    struct Reply {
        title: String,
        description: String,
    }
    let reply: Reply = serde_json::from_str(raw.trim()).map_err(|_| ContentError::Malformed)?;
    let title = reply.title.trim();
    if title.is_empty() || reply.description.trim().is_empty() {
        return Err(ContentError::Malformed);
    }
    Ok(ListingContent {
        title: title.chars().take(MAX_TITLE_CHARS).collect(),
        description: reply.description,
    })
}

#[async_trait]
impl ContentGenerator for ContentClient {
    async fn generate(&self, request: &ContentRequest) -> Result<ListingContent, ContentError> {
        let body = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt(request) }
            ]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ContentError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ContentError::Api {
                status: status.as_u16(),
                body,
            });
        }

        #[derive(Deserialize)]
        struct Completion {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
        }

        let completion: Completion = response.json().await.map_err(ContentError::Request)?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ContentError::Malformed)?;
        parse_content(&content)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    #[error("Content API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Content API returned an unusable listing")]
    Malformed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::config_for;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ContentRequest {
        ContentRequest {
            set_number: Some("10294".into()),
            item_name: Some("Titanic".into()),
            condition: "New".into(),
            notes: None,
        }
    }

    #[test]
    fn long_titles_are_clamped() {
        let raw = format!(
            r#"{{"title": "{}", "description": "<p>ok</p>"}}"#,
            "x".repeat(120)
        );
        let content = parse_content(&raw).unwrap();
        assert_eq!(content.title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn empty_fields_are_rejected() {
        assert!(parse_content(r#"{"title": " ", "description": "d"}"#).is_err());
        assert!(parse_content("not json").is_err());
    }

    #[tokio::test]
    async fn generates_from_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer content-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": "{\"title\": \"LEGO 10294 Titanic - New & Sealed\", \"description\": \"<p>Brand new</p>\"}"
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ContentClient::new(&config_for(&server.uri()));
        let content = client.generate(&request()).await.unwrap();
        assert_eq!(content.title, "LEGO 10294 Titanic - New & Sealed");
    }
}

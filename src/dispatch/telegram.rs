use serde::Deserialize;
use serde_json::json;

use super::DispatchError;
use crate::config::TelegramConfig;
use crate::engine::AlertRecord;

const TELEGRAM_API: &str = "https://api.telegram.org";

pub fn render_message(record: &AlertRecord, priority_score: f64) -> String {
    let tier = if record.score as f64 >= priority_score {
        "PRIO"
    } else {
        "ACT"
    };
    let link = record.link.clone().unwrap_or_else(|| {
        format!(
            "https://dexscreener.com/{}/{}",
            record.network,
            record.pair_address.as_deref().unwrap_or_default()
        )
    });
    format!(
        "ALERT ({tier}) {}\n\
         Price: ${:.6} | Liquidity: ${:.0}\n\
         Score: {} | Reasons: {}\n\
         DexScreener: {link}",
        record.display_name(),
        record.price_usd,
        record.liquidity_usd,
        record.score,
        record.reasons,
    )
}

#[derive(Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Deserialize)]
struct Update {
    message: Option<ChatEnvelope>,
    channel_post: Option<ChatEnvelope>,
}

#[derive(Deserialize)]
struct ChatEnvelope {
    chat: Chat,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
}

pub struct TelegramNotifier {
    http: reqwest::Client,
    api_base: String,
    enabled: bool,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            api_base: TELEGRAM_API.into(),
            enabled: config.enabled,
            bot_token: config.bot_token.clone().filter(|t| !t.is_empty()),
            chat_id: config.chat_id.clone().filter(|c| !c.is_empty()),
        }
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_chat_id(mut self, chat_id: String) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    pub fn is_ready(&self) -> bool {
        self.enabled && self.bot_token.is_some() && self.chat_id.is_some()
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    /// Posts `text` to the configured chat. When Telegram is disabled or
    /// incomplete the text is logged instead and `Ok(false)` returned.
    pub async fn send(&self, text: &str) -> Result<bool, DispatchError> {
        let (Some(token), Some(chat_id), true) = (&self.bot_token, &self.chat_id, self.enabled) else {
            tracing::info!("{text}");
            return Ok(false);
        };

        let url = format!("{}/bot{token}/sendMessage", self.api_base);
        let resp = self
            .http
            .post(&url)
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "disable_web_page_preview": true,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                sink: "telegram",
                status: status.as_u16(),
                body,
            });
        }
        Ok(true)
    }

    /// Chat of the most recent message or channel post the bot has seen.
    pub async fn discover_chat_id(&self) -> Result<Option<String>, DispatchError> {
        let Some(token) = &self.bot_token else {
            return Err(DispatchError::NotConfigured("telegram bot_token"));
        };
        let url = format!("{}/bot{token}/getUpdates", self.api_base);
        let updates: UpdatesResponse = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(updates.result.last().and_then(|u| {
            u.message
                .as_ref()
                .or(u.channel_post.as_ref())
                .map(|m| m.chat.id.to_string())
        }))
    }
}

use super::DispatchError;
use crate::config::SupabaseConfig;
use crate::engine::AlertRecord;

/// Inserts alert rows through the Supabase REST endpoint.
pub struct SupabaseSink {
    http: reqwest::Client,
    endpoint: String,
    key: String,
}

impl SupabaseSink {
    /// `None` when disabled or missing its url or key.
    pub fn from_config(config: &SupabaseConfig, http: reqwest::Client) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let (Some(url), Some(key)) = (
            config.url.as_deref().filter(|u| !u.is_empty()),
            config.anon_key.as_deref().filter(|k| !k.is_empty()),
        ) else {
            tracing::warn!("Supabase enabled but url or anon_key missing, sink disabled");
            return None;
        };
        Some(Self {
            http,
            endpoint: format!("{}/rest/v1/{}", url.trim_end_matches('/'), config.table_alerts),
            key: key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn insert(&self, record: &AlertRecord) -> Result<(), DispatchError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Prefer", "return=representation")
            .json(record)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                sink: "supabase",
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::post,
    };
    use serde_json::Value;

    use crate::dispatch::store::tests::record;
    use crate::feed::dexscreener::tests::serve;

    type Seen = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

    fn config(url: &str) -> SupabaseConfig {
        SupabaseConfig {
            enabled: true,
            url: Some(url.to_string()),
            anon_key: Some("anon-key".into()),
            table_alerts: "alerts".into(),
        }
    }

    #[test]
    fn incomplete_config_disables_sink() {
        let http = reqwest::Client::new();
        let mut cfg = config("https://x.supabase.co");
        assert_eq!(
            SupabaseSink::from_config(&cfg, http.clone()).unwrap().endpoint(),
            "https://x.supabase.co/rest/v1/alerts"
        );

        cfg.anon_key = None;
        assert!(SupabaseSink::from_config(&cfg, http.clone()).is_none());

        let disabled = SupabaseConfig {
            enabled: false,
            ..config("https://x.supabase.co")
        };
        assert!(SupabaseSink::from_config(&disabled, http).is_none());
    }

    #[tokio::test]
    async fn posts_record_with_auth_headers() {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route(
                "/rest/v1/alerts",
                post(
                    |State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| async move {
                        seen.lock().unwrap().push((headers, body.clone()));
                        (StatusCode::CREATED, Json(Value::Array(vec![body])))
                    },
                ),
            )
            .with_state(Arc::clone(&seen));
        let base = serve(app).await;

        let sink = SupabaseSink::from_config(&config(&base), reqwest::Client::new()).unwrap();
        sink.insert(&record(1_700_000_000, "bsc", 64)).await.unwrap();

        let seen = seen.lock().unwrap();
        let (headers, body) = &seen[0];
        assert_eq!(headers["apikey"], "anon-key");
        assert_eq!(headers["authorization"], "Bearer anon-key");
        assert_eq!(headers["prefer"], "return=representation");
        assert_eq!(body["ts"], 1_700_000_000);
        assert_eq!(body["score"], 64);
        assert_eq!(body["network"], "bsc");
    }

    #[tokio::test]
    async fn rejection_surfaces_status() {
        let app = Router::new().route(
            "/rest/v1/alerts",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base = serve(app).await;
        let sink = SupabaseSink::from_config(&config(&base), reqwest::Client::new()).unwrap();
        let err = sink.insert(&record(1, "bsc", 1)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { status: 401, .. }));
    }
}

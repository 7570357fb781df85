//! Durable counter storage in the provider's per-user custom data.

use async_trait::async_trait;
use puzzlequota_auth::{AuthError, CustomDataClient};
use serde_json::{Map, Value};

/// Authoritative, slow storage for a subject's counter.
#[async_trait]
pub trait DurableCounter: Send + Sync {
    /// Loads the stored counter, or `None` if the subject has none.
    async fn load(&self, subject_id: &str) -> Result<Option<u64>, AuthError>;

    /// Stores `count` without touching the subject's other fields.
    async fn store(&self, subject_id: &str, count: u64) -> Result<(), AuthError>;
}

/// [`DurableCounter`] over a single custom-data field.
#[derive(Clone)]
pub struct CustomDataCounter {
    client: CustomDataClient,
    field: String,
}

impl CustomDataCounter {
    pub fn new(client: CustomDataClient, field: impl Into<String>) -> Self {
        Self {
            client,
            field: field.into(),
        }
    }
}

#[async_trait]
impl DurableCounter for CustomDataCounter {
    async fn load(&self, subject_id: &str) -> Result<Option<u64>, AuthError> {
        let data = self.client.fetch(subject_id).await?;
        Ok(data.get(&self.field).and_then(count_from_value))
    }

    async fn store(&self, subject_id: &str, count: u64) -> Result<(), AuthError> {
        let mut fields = Map::new();
        fields.insert(self.field.clone(), Value::from(count));
        self.client.patch(subject_id, fields).await
    }
}

/// Interprets a stored counter value.
///
/// Non-numbers are absent, negatives clamp to zero, fractions truncate.
pub fn count_from_value(value: &Value) -> Option<u64> {
    let Value::Number(n) = value else {
        return None;
    };

    if let Some(v) = n.as_u64() {
        return Some(v);
    }
    if n.as_i64().is_some() {
        // Only negative integers reach here.
        return Some(0);
    }
    n.as_f64().map(|f| if f <= 0.0 { 0 } else { f as u64 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use puzzlequota_auth::{ManagementCredential, ManagementTokenProvider};
    use serde_json::json;
    use std::sync::Arc;
    use url::Url;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticTokens;

    #[async_trait]
    impl ManagementTokenProvider for StaticTokens {
        async fn acquire(&self) -> Result<ManagementCredential, AuthError> {
            Ok(ManagementCredential {
                access_token: "mgmt".to_string(),
                expires_in: None,
            })
        }
    }

    fn counter(server: &MockServer) -> CustomDataCounter {
        let client = CustomDataClient::new(
            reqwest::Client::new(),
            Url::parse(&server.uri()).unwrap(),
            Arc::new(StaticTokens),
        );
        CustomDataCounter::new(client, "puzzleCount")
    }

    #[test]
    fn test_count_from_value() {
        assert_eq!(count_from_value(&json!(5)), Some(5));
        assert_eq!(count_from_value(&json!(0)), Some(0));
        assert_eq!(count_from_value(&json!(-3)), Some(0));
        assert_eq!(count_from_value(&json!(2.9)), Some(2));
        assert_eq!(count_from_value(&json!(-0.5)), Some(0));
        assert_eq!(count_from_value(&json!("5")), None);
        assert_eq!(count_from_value(&json!(null)), None);
        assert_eq!(count_from_value(&json!({ "n": 1 })), None);
    }

    #[tokio::test]
    async fn test_load_reads_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/u1/custom-data"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "puzzleCount": 4, "theme": "dark" })),
            )
            .mount(&server)
            .await;

        assert_eq!(counter(&server).load("u1").await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_load_without_field_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/u1/custom-data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "theme": "dark" })))
            .mount(&server)
            .await;

        assert_eq!(counter(&server).load("u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_patches_only_counter_field() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/users/u1/custom-data"))
            .and(body_json(json!({ "customData": { "puzzleCount": 9 } })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        counter(&server).store("u1", 9).await.unwrap();
    }
}

//! Hotel offer search against the Amadeus self-service API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::http::{check_status, create_http_client, send_error};
use super::{CollaboratorError, HotelSearchProvider, OfferQuery};

const SERVICE: &str = "hotel search";

/// Tokens are refreshed this long before the server says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    1799
}

#[derive(Deserialize)]
struct OffersResponse {
    #[serde(default)]
    data: Vec<Value>,
}

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

/// Client-credential authenticated hotel offer search.
pub struct AmadeusHotelSearch {
    client: Client,
    base_url: String,
    client_id: SecretString,
    client_secret: SecretString,
    token: Mutex<Option<CachedToken>>,
}

impl AmadeusHotelSearch {
    pub fn new(
        base_url: &str,
        client_id: SecretString,
        client_secret: SecretString,
    ) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: create_http_client(SERVICE, concat!("sowpilot/", env!("CARGO_PKG_VERSION")))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    fn offers_url(&self) -> String {
        format!("{}/v2/shopping/hotel-offers", self.base_url)
    }

    async fn access_token(&self) -> Result<SecretString, CollaboratorError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.token.clone());
            }
        }

        log::debug!("Requesting hotel search access token");
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.expose_secret()),
            ("client_secret", self.client_secret.expose_secret()),
        ];
        let response = self
            .client
            .post(format!("{}/v1/security/oauth2/token", self.base_url))
            .form(&params)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        let token: TokenResponse = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse {
                service: SERVICE,
                reason: format!("Failed to parse token response: {}", e),
            })?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        let secret = SecretString::from(token.access_token);
        *cached = Some(CachedToken {
            token: secret.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(secret)
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }
}

impl std::fmt::Debug for AmadeusHotelSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmadeusHotelSearch")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HotelSearchProvider for AmadeusHotelSearch {
    async fn search_offers(&self, query: &OfferQuery) -> Result<Vec<Value>, CollaboratorError> {
        let token = self.access_token().await?;
        let check_in = query.check_in.format("%Y-%m-%d").to_string();
        let check_out = query.check_out.format("%Y-%m-%d").to_string();
        let adults = query.adults.max(1).to_string();

        let response = self
            .client
            .get(self.offers_url())
            .bearer_auth(token.expose_secret())
            .query(&[
                ("cityCode", query.city_code.as_str()),
                ("checkInDate", check_in.as_str()),
                ("checkOutDate", check_out.as_str()),
                ("adults", adults.as_str()),
            ])
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;

        let response = match check_status(SERVICE, response).await {
            Ok(response) => response,
            Err(e) => {
                if matches!(e, CollaboratorError::Rejected { status: 401, .. }) {
                    self.forget_token().await;
                }
                return Err(e);
            }
        };
        let offers: OffersResponse =
            response
                .json()
                .await
                .map_err(|e| CollaboratorError::InvalidResponse {
                    service: SERVICE,
                    reason: e.to_string(),
                })?;

        log::debug!(
            "Hotel search returned {} offer(s) for {}",
            offers.data.len(),
            query.city_code
        );
        Ok(offers.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_offers_response_tolerates_missing_data() {
        let parsed: OffersResponse = serde_json::from_value(json!({"meta": {}})).unwrap();
        assert!(parsed.data.is_empty());

        let parsed: OffersResponse =
            serde_json::from_value(json!({"data": [{"hotel": {"name": "Hyatt"}}]})).unwrap();
        assert_eq!(parsed.data.len(), 1);
    }

    #[test]
    fn test_token_response_default_expiry() {
        let token: TokenResponse =
            serde_json::from_value(json!({"access_token": "abc", "token_type": "Bearer"}))
                .unwrap();
        assert_eq!(token.expires_in, 1799);
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let search = AmadeusHotelSearch::new(
            "http://127.0.0.1:9/",
            SecretString::from("id"),
            SecretString::from("secret"),
        )
        .unwrap();
        assert_eq!(
            search.offers_url(),
            "http://127.0.0.1:9/v2/shopping/hotel-offers"
        );

        *search.token.lock().await = Some(CachedToken {
            token: SecretString::from("cached"),
            expires_at: Instant::now() + Duration::from_secs(600),
        });
        assert_eq!(search.access_token().await.unwrap().expose_secret(), "cached");

        search.forget_token().await;
        assert!(search.access_token().await.unwrap_err().is_transient());
    }
}

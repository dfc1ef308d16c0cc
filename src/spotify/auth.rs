//! Client-credentials authentication against the accounts service.

use super::error::ExtractError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Holds the application credentials and knows how to build a token request.
#[derive(Clone)]
pub struct AccessTokenClient {
    client_id: String,
    client_secret: String,
    token_url: String,
}

impl std::fmt::Debug for AccessTokenClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url)
            .finish()
    }
}

impl AccessTokenClient {
    pub const GRANT_FORM: &'static [(&'static str, &'static str)] =
        &[("grant_type", "client_credentials")];

    pub fn new(client_id: &str, client_secret: &str, token_url: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token_url: token_url.to_string(),
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// `base64(client_id:client_secret)` for the Basic authorization header.
    pub fn basic_credentials(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret))
    }

    /// Extract the bearer token from a successful token response body.
    pub fn parse_token(&self, body: &str) -> Result<String, ExtractError> {
        let response: TokenResponse =
            serde_json::from_str(body).map_err(|source| ExtractError::Decode {
                url: self.token_url.clone(),
                source,
            })?;
        if response.access_token.is_empty() {
            return Err(ExtractError::Authentication(
                "token endpoint returned an empty access token".to_string(),
            ));
        }
        Ok(response.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_credentials_encoding() {
        let client = AccessTokenClient::new("id", "secret", "http://token");
        // base64("id:secret")
        assert_eq!(client.basic_credentials(), "aWQ6c2VjcmV0");
    }

    #[test]
    fn test_parse_token() {
        let client = AccessTokenClient::new("id", "secret", "http://token");
        let token = client
            .parse_token(r#"{"access_token":"abc","token_type":"Bearer","expires_in":3600}"#)
            .unwrap();
        assert_eq!(token, "abc");

        assert!(matches!(
            client.parse_token(r#"{"access_token":""}"#),
            Err(ExtractError::Authentication(_))
        ));
        assert!(matches!(
            client.parse_token("not json"),
            Err(ExtractError::Decode { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let client = AccessTokenClient::new("id", "super-secret", "http://token");
        let debug = format!("{:?}", client);
        assert!(!debug.contains("super-secret"));
    }
}

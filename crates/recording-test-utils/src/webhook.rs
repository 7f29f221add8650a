//! Signed webhook requests, as a Talk backend sends them.

use recording_server::auth::{
    calculate_checksum, BACKEND_HEADER, CHECKSUM_HEADER, RANDOM_HEADER,
};
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::json;

/// Signs and sends room requests for one backend.
pub struct WebhookSigner {
    backend: String,
    secret: String,
    client: reqwest::Client,
}

impl WebhookSigner {
    pub fn new(backend: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            secret: secret.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Authentication headers for `body`, with a fresh random value.
    pub fn headers(&self, body: &str) -> Vec<(&'static str, String)> {
        let random = random_hex();
        let checksum = calculate_checksum(&self.secret, random.as_bytes(), body.as_bytes());

        vec![
            (BACKEND_HEADER, self.backend.clone()),
            (RANDOM_HEADER, random),
            (CHECKSUM_HEADER, checksum),
        ]
    }

    /// A signed POST of `body` to `url`, ready to be tweaked or sent.
    pub fn request(&self, url: &str, body: &str) -> reqwest::RequestBuilder {
        self.headers(body).into_iter().fold(
            self.client
                .post(url)
                .header("content-type", "application/json")
                .body(body.to_string()),
            |request, (name, value)| request.header(name, value),
        )
    }

    /// Send a signed POST of `body` to `url`.
    pub async fn post(&self, url: &str, body: &str) -> reqwest::Result<reqwest::Response> {
        self.request(url, body).send().await
    }
}

/// 32 random hex characters.
pub fn random_hex() -> String {
    let mut bytes = [0u8; 16];
    SystemRandom::new()
        .fill(&mut bytes)
        .expect("system random should be available");
    hex::encode(bytes)
}

/// Body of a start request in the default recording mode.
pub fn start_request(owner: &str, actor_type: &str, actor_id: &str) -> String {
    json!({
        "type": "start",
        "start": {
            "owner": owner,
            "actor": { "type": actor_type, "id": actor_id },
        },
    })
    .to_string()
}

/// Body of a start request with an explicit recording status.
pub fn start_request_with_status(owner: &str, status: i64) -> String {
    json!({
        "type": "start",
        "start": {
            "owner": owner,
            "actor": { "type": "users", "id": owner },
            "status": status,
        },
    })
    .to_string()
}

/// Body of a stop request, with the actor when given.
pub fn stop_request(actor: Option<(&str, &str)>) -> String {
    let stop = match actor {
        Some((actor_type, actor_id)) => json!({ "actor": { "type": actor_type, "id": actor_id } }),
        None => json!({}),
    };

    json!({ "type": "stop", "stop": stop }).to_string()
}

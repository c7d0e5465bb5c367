//! Authenticated request/response client tools use to reach the
//! in-container runtime started by `Deployment::start()`.

use serde::{de::DeserializeOwned, Serialize};

use teamcore_foundation::{Error, Result};

/// Thin wrapper over `reqwest` carrying the base URL and bearer token
/// issued to this instance's container. One client per deployment.
#[derive(Debug, Clone)]
pub struct RuntimeClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl RuntimeClient {
    pub fn new(host: &str, port: u16, token: impl Into<String>) -> Self {
        Self {
            base_url: format!("http://{host}:{port}"),
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// `GET {base_url}/alive`, used by the liveness probe.
    pub async fn alive(&self) -> Result<bool> {
        let resp = self
            .http
            .get(format!("{}/alive", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(resp.status().is_success())
    }

    /// Call an arbitrary runtime endpoint with a JSON body and decode
    /// the JSON response. Used by tools executing inside the sandbox.
    pub async fn call<Req: Serialize + ?Sized, Resp: DeserializeOwned>(&self, path: &str, body: &Req) -> Result<Resp> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::Http(format!("runtime call to {path} failed: {}", resp.status())));
        }
        resp.json::<Resp>().await.map_err(|e| Error::Http(e.to_string()))
    }
}

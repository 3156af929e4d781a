//! HTTP mocking utilities using wiremock.

use serde::Serialize;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// HTTP mock server wrapper with convenience methods
pub struct TestHttpServer {
    server: MockServer,
}

impl TestHttpServer {
    /// Start a new mock server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Get URL for a specific path
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    /// Access the underlying MockServer
    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// Respond to `verb` requests on `endpoint` with `response`.
    pub async fn respond(&self, verb: &str, endpoint: &str, response: ResponseTemplate) {
        Mock::given(method(verb))
            .and(path(endpoint))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Register a GET endpoint that returns JSON
    pub async fn get_json<T: Serialize>(&self, endpoint: &str, body: &T) {
        self.respond("GET", endpoint, responses::json(200, body)).await;
    }

    /// Register a GET endpoint that returns XML
    pub async fn get_xml(&self, endpoint: &str, body: &str) {
        self.respond("GET", endpoint, responses::xml(body)).await;
    }

    /// Redirect any request on `from` to `location`.
    pub async fn redirect(&self, from: &str, status: u16, location: &str) {
        Mock::given(path(from))
            .respond_with(responses::redirect(status, location))
            .mount(&self.server)
            .await;
    }

    /// Register an endpoint with simulated latency
    pub async fn with_latency<T: Serialize>(&self, endpoint: &str, body: &T, latency: Duration) {
        Mock::given(path(endpoint))
            .respond_with(responses::json(200, body).set_delay(latency))
            .mount(&self.server)
            .await;
    }

    /// Register a sequence of responses, each served once, in order.
    pub async fn sequence(&self, endpoint: &str, responses: Vec<ResponseTemplate>) {
        for (i, response) in responses.into_iter().enumerate() {
            Mock::given(path(endpoint))
                .respond_with(response)
                .up_to_n_times(1)
                .with_priority(1 + i as u8)
                .mount(&self.server)
                .await;
        }
    }

    /// Assert `endpoint` was hit exactly `times` times.
    pub async fn verify_received(&self, endpoint: &str, times: usize) {
        let count = self.requests_to(endpoint).await.len();
        assert_eq!(
            count, times,
            "Expected {} requests to {}, got {}",
            times, endpoint, count
        );
    }

    /// Get all received requests
    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Requests received on `endpoint`, oldest first.
    pub async fn requests_to(&self, endpoint: &str) -> Vec<Request> {
        self.received_requests()
            .await
            .into_iter()
            .filter(|r| r.url.path() == endpoint)
            .collect()
    }

    /// The most recent request on `endpoint`.
    pub async fn last_request(&self, endpoint: &str) -> Option<Request> {
        self.requests_to(endpoint).await.pop()
    }

    /// Clear mounted mocks and recorded requests
    pub async fn reset(&self) {
        self.server.reset().await;
    }
}

/// Common response templates
pub mod responses {
    use super::*;

    pub fn ok() -> ResponseTemplate {
        ResponseTemplate::new(200)
    }

    pub fn created() -> ResponseTemplate {
        ResponseTemplate::new(201)
    }

    pub fn json<T: Serialize>(status: u16, body: &T) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_json(body)
    }

    pub fn xml(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/xml")
    }

    pub fn text(status: u16, body: &str) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_raw(body.as_bytes().to_vec(), "text/plain")
    }

    pub fn redirect(status: u16, location: &str) -> ResponseTemplate {
        ResponseTemplate::new(status).insert_header("Location", location)
    }

    pub fn not_found() -> ResponseTemplate {
        ResponseTemplate::new(404).set_body_json(serde_json::json!({ "error": "Not found" }))
    }

    pub fn server_error() -> ResponseTemplate {
        ResponseTemplate::new(500)
            .set_body_json(serde_json::json!({ "error": "Internal server error" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_redirects() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_json_and_verify() {
        let server = TestHttpServer::start().await;
        server.get_json("/items", &json!({"count": 2})).await;

        let body: serde_json::Value = reqwest::get(server.url_for("/items"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body, json!({"count": 2}));
        server.verify_received("/items", 1).await;
    }

    #[tokio::test]
    async fn test_redirect_template() {
        let server = TestHttpServer::start().await;
        server.redirect("/old", 301, "/new").await;

        let response = no_redirects().get(server.url_for("/old")).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 301);
        assert_eq!(response.headers()["location"], "/new");
    }

    #[tokio::test]
    async fn test_sequence_serves_in_order() {
        let server = TestHttpServer::start().await;
        server
            .sequence("/flaky", vec![responses::server_error(), responses::text(200, "fine")])
            .await;

        let client = no_redirects();
        let first = client.get(server.url_for("/flaky")).send().await.unwrap();
        let second = client.get(server.url_for("/flaky")).send().await.unwrap();

        assert_eq!(first.status().as_u16(), 500);
        assert_eq!(second.text().await.unwrap(), "fine");
        assert_eq!(server.requests_to("/flaky").await.len(), 2);
    }
}

//! One-shot request functions.
//!
//! Each call binds a fresh [`Client`] to the URL's origin, sends one request
//! and releases the connection.

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::client::Client;
use crate::error::Result;
use crate::options::RequestOptions;
use crate::response::Response;
use crate::transport::Method;

/// GET `url`.
pub async fn get(url: &str, options: &RequestOptions) -> Result<Response> {
    let client = Client::init(url, options)?;
    client.get(url, options).await
}

/// POST `data` to `url`.
pub async fn post(url: &str, data: &Value, options: &RequestOptions) -> Result<Response> {
    send(Method::Post, url, data, options).await
}

/// PUT `data` to `url`.
pub async fn put(url: &str, data: &Value, options: &RequestOptions) -> Result<Response> {
    send(Method::Put, url, data, options).await
}

/// PATCH `data` to `url`.
pub async fn patch(url: &str, data: &Value, options: &RequestOptions) -> Result<Response> {
    send(Method::Patch, url, data, options).await
}

/// DELETE `url`, sending `data` as the body.
pub async fn delete(url: &str, data: &Value, options: &RequestOptions) -> Result<Response> {
    send(Method::Delete, url, data, options).await
}

/// Send a request with a method given by name (`"get"`, `"POST"`, ...).
pub async fn request(
    method: &str,
    url: &str,
    data: &Value,
    options: &RequestOptions,
) -> Result<Response> {
    let method: Method = method.parse()?;
    send(method, url, data, options).await
}

async fn send(
    method: Method,
    url: &str,
    data: &Value,
    options: &RequestOptions,
) -> Result<Response> {
    let client = Client::init(url, options)?;
    client.request(method, url, data, options).await
}

/// Run `scope` against a client with an open connection to `uri`.
///
/// The connection is released when the scope returns, fails, or panics.
///
/// ```no_run
/// # async fn run() -> courier::Result<()> {
/// use courier::RequestOptions;
///
/// let options = RequestOptions::default();
/// let (first, second) = courier::open("https://api.example.com", &options, |client| {
///     Box::pin(async move {
///         let first = client.get("/a", &RequestOptions::default()).await?;
///         let second = client.get("/b", &RequestOptions::default()).await?;
///         Ok((first.status(), second.status()))
///     })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn open<T, F>(uri: &str, options: &RequestOptions, scope: F) -> Result<T>
where
    F: for<'c> FnOnce(&'c Client) -> BoxFuture<'c, Result<T>>,
{
    let client = Client::init(uri, options)?;
    client.open()?;
    let outcome = scope(&client).await;
    client.close();
    outcome
}

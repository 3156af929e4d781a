//! HTTP client with origin-bound clients, redirect following, retries,
//! connection pooling and content-type driven body decoding.
//!
//! The one-shot functions at the crate root cover most uses:
//!
//! ```no_run
//! # async fn run() -> courier::Result<()> {
//! use courier::RequestOptions;
//! use serde_json::json;
//!
//! let options = RequestOptions::new().follow(true);
//! let response = courier::get("https://api.example.com/items?page=2", &options).await?;
//! if let Some(data) = response.data() {
//!     println!("{}", data.to_value());
//! }
//!
//! let data = json!({"name": "widget"});
//! courier::post("https://api.example.com/items", &data, &RequestOptions::new().json(true)).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod facade;
pub mod options;
pub mod pool;
pub mod response;
pub mod transport;
pub mod uri;
pub mod wrapper;

pub use client::{Client, ClientBuilder};
pub use codec::{ContentKind, Data, Lookup, Node};
pub use config::ClientConfig;
pub use error::{Error, Result, TransportError};
pub use facade::{delete, get, open, patch, post, put, request};
pub use options::{Follow, RequestOptions};
pub use pool::ConnectionPool;
pub use response::Response;
pub use transport::{
    ConnectionSettings, Connector, Method, ReqwestConnector, ReqwestTransport, Transport,
    WireRequest, WireResponse,
};
pub use wrapper::{ApiClient, ResponseHook};

//! Test setup helpers.

use std::io;
use std::net::TcpListener;

/// Initialize tracing and log the start of `name`.
pub fn test_case<F, R>(name: &str, test_fn: F) -> R
where
    F: FnOnce() -> R,
{
    crate::init();
    tracing::info!("Starting test: {}", name);
    let start = std::time::Instant::now();

    let result = test_fn();

    tracing::info!("Test {} completed in {:?}", name, start.elapsed());
    result
}

/// Async variant of [`test_case`].
pub async fn async_test_case<F, Fut, R>(name: &str, test_fn: F) -> R
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = R>,
{
    crate::init();
    tracing::info!("Starting async test: {}", name);
    let start = std::time::Instant::now();

    let result = test_fn().await;

    tracing::info!("Async test {} completed in {:?}", name, start.elapsed());
    result
}

/// A local port with nothing listening on it.
///
/// Connecting to `http://127.0.0.1:{port}` is refused.
pub fn closed_port() -> io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_port_refuses_connections() {
        let port = closed_port().unwrap();
        assert!(std::net::TcpStream::connect(("127.0.0.1", port)).is_err());
    }

    #[tokio::test]
    async fn test_case_wrappers_return_results() {
        let value = async_test_case("answer", || async { 42 }).await;
        assert_eq!(value, 42);
        assert_eq!(test_case("sync", || "ok"), "ok");
    }
}

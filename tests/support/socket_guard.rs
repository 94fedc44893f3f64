//! Skips wiremock-based tests where localhost sockets cannot be bound.
//!
//! Sandboxed CI runners sometimes deny `bind`. By default such tests print a
//! notice and return early; `PTHARVEST_REQUIRE_SOCKET_TESTS=1` makes it a failure.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "PTHARVEST_REQUIRE_SOCKET_TESTS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipPolicy {
    Skip,
    Fail,
}

fn policy() -> SkipPolicy {
    match std::env::var(REQUIRE_ENV).map(|value| value.trim().to_ascii_lowercase()) {
        Ok(value) if matches!(value.as_str(), "1" | "true" | "yes") => SkipPolicy::Fail,
        _ => SkipPolicy::Skip,
    }
}

fn loopback_available() -> bool {
    TcpListener::bind(("127.0.0.1", 0)).is_ok()
}

/// Starts a mock server, or returns `None` when loopback sockets are unavailable.
///
/// # Panics
///
/// Panics instead of skipping when `PTHARVEST_REQUIRE_SOCKET_TESTS` is set.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if loopback_available() {
        return Some(MockServer::start().await);
    }
    match policy() {
        SkipPolicy::Fail => panic!("cannot bind a loopback socket and {REQUIRE_ENV} is set"),
        SkipPolicy::Skip => {
            eprintln!(
                "[socket-bound-test] cannot bind a loopback socket; \
                 skipping (set {REQUIRE_ENV}=1 to fail)"
            );
            None
        }
    }
}

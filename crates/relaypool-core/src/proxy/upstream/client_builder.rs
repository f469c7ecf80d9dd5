use std::time::Duration;

/// Build the shared upstream HTTP client.
///
/// No total timeout: streamed responses may run for minutes. Silence is
/// bounded per read by the relay body instead. Only the configured proxy is
/// used; `HTTP(S)_PROXY` from the environment is ignored.
pub fn build_http_client(
    upstream_proxy: Option<&str>,
    connect_timeout_secs: u64,
) -> Result<reqwest::Client, String> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs.max(1)))
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_nodelay(true);

    if let Some(url) = upstream_proxy.map(str::trim).filter(|u| !u.is_empty()) {
        let proxy =
            reqwest::Proxy::all(url).map_err(|e| format!("Invalid upstream proxy url: {}", e))?;
        builder = builder.proxy(proxy);
    } else {
        builder = builder.no_proxy();
    }

    builder.build().map_err(|e| format!("Failed to build HTTP client: {}", e))
}

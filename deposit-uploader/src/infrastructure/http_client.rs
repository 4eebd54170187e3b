use std::time::Duration;

use crate::config::HttpConfig;

/// Client shared by every request, to the repository and to signed part targets alike.
///
/// Request timeouts are applied per call by the upload services, only connecting is bounded here.
/// Credentials are added per request since signed targets must not receive them.
pub fn build_http_client(http: &HttpConfig) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(http.user_agent.as_str())
        .connect_timeout(Duration::from_secs(http.connect_timeout))
        .build()?)
}

#![allow(dead_code)]

use autocredit::client::{ClientSettings, RequestClient, JSON_ACCEPT};
use autocredit::config::Config;
use autocredit::utils::RetryPolicy;
use std::time::Duration;

pub mod test_helpers {
    use super::*;

    /// Configuration pointing both APIs at a mock server, with fast retries
    pub fn create_test_config(server_url: &str) -> Config {
        let mut config = Config::default();
        config.api_urls.github_api = server_url.to_string();
        config.api_urls.pypi_api = format!("{}/pypi", server_url);
        config.crediting.max_retries = 2;
        config.crediting.base_delay_ms = 1;
        config.crediting.request_timeout_secs = 5;
        config.crediting.identifier_deadline_secs = 10;
        config
    }

    pub fn create_test_client(max_retries: u32, base_delay: Duration, token: Option<&str>) -> RequestClient {
        RequestClient::new(ClientSettings {
            accept: JSON_ACCEPT.to_string(),
            token: token.map(str::to_string),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::new(max_retries, base_delay),
        })
        .expect("client builds")
    }

    pub fn setup_test_logger() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("autocredit=debug")
            .with_test_writer()
            .try_init();
    }
}

use std::time::Duration;

use reqwest::{Client, Error};

const USER_AGENT: &str = concat!("voicebridge/", env!("CARGO_PKG_VERSION"));

pub struct HttpClient;

impl HttpClient {
  /// Client for source probing; `timeout` bounds each request.
  pub fn new(timeout: Duration) -> Result<Client, Error> {
    Client::builder()
      .user_agent(USER_AGENT)
      .timeout(timeout)
      .connect_timeout(Duration::from_secs(5))
      .build()
  }
}

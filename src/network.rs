// Internet reachability check run before the emulator is touched
use std::time::Duration;
use tokio::time::sleep;

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

#[allow(async_fn_in_trait)]
pub trait ConnectivityProbe {
    async fn is_online(&self) -> bool;
}

/// Sends `HEAD` requests to well-known sites; any 2xx/3xx answer counts as online.
pub struct HttpProbe {
    urls: Vec<String>,
    timeout: Duration,
    rounds: u32,
    round_pause: Duration,
}

impl HttpProbe {
    pub fn new(urls: Vec<String>, timeout: Duration, rounds: u32) -> Self {
        Self {
            urls,
            timeout,
            rounds,
            round_pause: Duration::from_secs(1),
        }
    }

    async fn head_ok(client: &reqwest::Client, url: &str) -> bool {
        match client.head(url).send().await {
            Ok(response) => {
                let status = response.status();
                log::debug!("🌐 HEAD {url} -> {status}");
                status.is_success() || status.is_redirection()
            }
            Err(e) => {
                log::debug!("🌐 HEAD {url} failed: {e}");
                false
            }
        }
    }
}

impl ConnectivityProbe for HttpProbe {
    async fn is_online(&self) -> bool {
        let client = match reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                log::error!("❌ Failed to create HTTP client: {e}");
                return false;
            }
        };

        for round in 1..=self.rounds {
            for url in &self.urls {
                if Self::head_ok(&client, url).await {
                    log::info!("🌐 Network is reachable ({url})");
                    return true;
                }
            }
            if round < self.rounds {
                sleep(self.round_pause).await;
            }
        }
        log::error!("❌ Network unreachable after {} rounds", self.rounds);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `status_line` to every request on a local port.
    async fn serve(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn success_status_is_online() {
        let url = serve("204 No Content").await;
        let probe = HttpProbe::new(vec![url], Duration::from_secs(2), 1);
        assert!(probe.is_online().await);
    }

    #[tokio::test]
    async fn server_error_is_offline() {
        let url = serve("503 Service Unavailable").await;
        let probe = HttpProbe::new(vec![url], Duration::from_secs(2), 1);
        assert!(!probe.is_online().await);
    }

    #[tokio::test]
    async fn falls_through_to_next_url() {
        let good = serve("200 OK").await;
        let probe = HttpProbe::new(
            vec!["http://127.0.0.1:1/".to_string(), good],
            Duration::from_secs(2),
            1,
        );
        assert!(probe.is_online().await);
    }
}

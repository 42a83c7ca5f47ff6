//! Readiness probe for the application under test

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::wait::{wait_for, Check, WaitOutcome, WaitPolicy};

/// Wait until `base_url` answers with anything other than a server error.
///
/// Connection refusals are expected while the target starts and are not
/// logged. Redirects and 4xx responses count as ready: the login page may
/// well sit behind one.
pub async fn wait_until_ready(
    base_url: &str,
    policy: WaitPolicy,
    cancel: &CancellationToken,
) -> HarnessResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let mut attempts = 0usize;

    let outcome = wait_for(policy, cancel, || {
        attempts += 1;
        probe(client.get(base_url).send(), base_url, attempts == 1)
    })
    .await?;

    match outcome {
        WaitOutcome::Satisfied(()) => {
            info!("Target is ready at {}", base_url);
            Ok(())
        }
        WaitOutcome::TimedOut { observed, .. } => {
            warn!("Last probe of {}: {}", base_url, observed);
            Err(HarnessError::TargetUnreachable {
                url: base_url.to_string(),
                attempts,
            })
        }
    }
}

async fn probe(
    request: impl Future<Output = reqwest::Result<reqwest::Response>>,
    base_url: &str,
    first: bool,
) -> HarnessResult<Check<()>> {
    let observed = match request.await {
        Ok(resp) if !resp.status().is_server_error() => return Ok(Check::Satisfied(())),
        Ok(resp) => {
            warn!("Target returned {}", resp.status());
            resp.status().to_string()
        }
        Err(e) => {
            if first {
                info!("Waiting for {} to come up...", base_url);
            }
            if !e.is_connect() {
                warn!("Readiness probe error: {}", e);
            }
            e.to_string()
        }
    };
    Ok(Check::Unsatisfied { observed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer every connection with a fixed status line
    async fn serve(status: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        format!("http://{}", addr)
    }

    fn policy() -> WaitPolicy {
        WaitPolicy::new(Duration::from_millis(600), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_ready_target() {
        let url = serve("200 OK").await;
        wait_until_ready(&url, policy(), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_redirect_counts_as_ready() {
        let url = serve("302 Found").await;
        wait_until_ready(&url, policy(), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_unreachable() {
        let url = serve("503 Service Unavailable").await;
        let err = wait_until_ready(&url, policy(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            HarnessError::TargetUnreachable { attempts, .. } => assert!(attempts > 1),
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = wait_until_ready(&url, policy(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::TargetUnreachable { .. }));
    }
}

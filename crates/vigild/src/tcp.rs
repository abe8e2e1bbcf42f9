//! TCP connect probe.

use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpStream;
use vigil_health::{HealthProbe, ProbeFuture, ProbeOutcome};

/// Healthy when a TCP connection to `address` opens within `timeout`.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl HealthProbe for TcpProbe {
    fn check(&self) -> ProbeFuture {
        let address = self.address.clone();
        let timeout = self.timeout;
        Box::pin(async move {
            match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
                Ok(stream) => {
                    stream.with_context(|| format!("connect to {address}"))?;
                    Ok(ProbeOutcome::Healthy)
                }
                Err(_) => Ok(ProbeOutcome::unhealthy(format!(
                    "connect to {address} timed out after {}ms",
                    timeout.as_millis()
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_port_is_healthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let probe = TcpProbe::new(address, Duration::from_secs(1));
        assert_eq!(probe.check().await.unwrap(), ProbeOutcome::Healthy);
    }

    #[tokio::test]
    async fn closed_port_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let probe = TcpProbe::new(address.clone(), Duration::from_secs(1));
        let err = probe.check().await.unwrap_err();
        assert!(err.to_string().contains(&address));
    }
}

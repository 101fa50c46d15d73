use super::VerifiedArtifact;
use crate::error::ArtifactError;
use crate::gateway::http_client::build_download_client;
use futures_util::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::AsyncWriteExt;

/// Streams artifacts to the download directory, enforcing a size guardrail
/// and an optional SHA-256 pin.
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: Client,
    download_dir: PathBuf,
}

/// Removes the partially written file unless the download is kept.
struct PartialDownload {
    path: PathBuf,
    keep: bool,
}

impl Drop for PartialDownload {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl ArtifactFetcher {
    pub fn new(client: Client, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            download_dir: download_dir.into(),
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(
            build_download_client(
                config.artifacts.connect_timeout_secs,
                config.artifacts.read_timeout_secs,
            ),
            config.download_dir(),
        )
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Download `url`, reject it when it exceeds `max_bytes`, and compare
    /// its digest with `expected_sha256` (case-insensitive; empty or absent
    /// means no pin). No file is left behind on any failure.
    pub async fn fetch_and_verify(
        &self,
        url: &str,
        expected_sha256: Option<&str>,
        kind: &str,
        max_bytes: u64,
    ) -> Result<VerifiedArtifact, ArtifactError> {
        let parsed = url::Url::parse(url).map_err(|_| ArtifactError::InvalidUrl {
            url: url.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ArtifactError::InvalidUrl {
                url: url.to_string(),
            });
        }

        let started = Instant::now();
        let response = self
            .client
            .get(parsed)
            .header("Cache-Control", "no-cache")
            .send()
            .await
            .map_err(|e| ArtifactError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArtifactError::DownloadFailed {
                status: status.as_u16(),
            });
        }
        if let Some(declared) = response.content_length()
            && declared > max_bytes
        {
            return Err(ArtifactError::FileTooLarge {
                bytes: declared,
                limit: max_bytes,
            });
        }

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let mut partial = PartialDownload {
            path: self
                .download_dir
                .join(format!("{}.part", uuid::Uuid::new_v4())),
            keep: false,
        };
        let mut file = tokio::fs::File::create(&partial.path).await?;
        let mut hasher = Sha256::new();
        let mut total: u64 = 0;

        let mut byte_stream = response.bytes_stream();
        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = chunk_result.map_err(|e| ArtifactError::Transport(e.to_string()))?;
            total += chunk.len() as u64;
            if total > max_bytes {
                return Err(ArtifactError::FileTooLarge {
                    bytes: total,
                    limit: max_bytes,
                });
            }
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let actual = hex::encode(hasher.finalize());
        let expected = expected_sha256
            .map(str::trim)
            .filter(|digest| !digest.is_empty());
        if let Some(expected) = expected
            && !expected.eq_ignore_ascii_case(&actual)
        {
            return Err(ArtifactError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
                bytes: total,
            });
        }

        partial.keep = true;
        let download_duration = started.elapsed();
        tracing::info!(
            url,
            bytes = total,
            sha256 = actual.as_str(),
            elapsed_ms = u64::try_from(download_duration.as_millis()).unwrap_or(u64::MAX),
            "artifact downloaded"
        );
        Ok(VerifiedArtifact {
            source_url: url.to_string(),
            kind: kind.to_string(),
            expected_sha256: expected.map(str::to_string),
            actual_sha256: actual,
            byte_length: total,
            local_path: partial.path.clone(),
            download_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).map_or(true, |mut entries| entries.next().is_none())
    }

    async fn serve(server: &MockServer, route: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn verified_download_keeps_file() {
        let server = MockServer::start().await;
        let body = b"apk-bytes".to_vec();
        serve(&server, "/app.apk", body.clone()).await;
        let tmp = TempDir::new().unwrap();
        let fetcher = ArtifactFetcher::new(Client::new(), tmp.path());

        let digest = sha256_hex(&body);
        let artifact = fetcher
            .fetch_and_verify(&format!("{}/app.apk", server.uri()), Some(&digest), "apk", 1024)
            .await
            .unwrap();

        assert_eq!(artifact.byte_length, body.len() as u64);
        assert_eq!(artifact.actual_sha256, digest);
        assert_eq!(std::fs::read(&artifact.local_path).unwrap(), body);
    }

    #[tokio::test]
    async fn non_success_status_is_download_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.apk"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let tmp = TempDir::new().unwrap();
        let fetcher = ArtifactFetcher::new(Client::new(), tmp.path());

        let err = fetcher
            .fetch_and_verify(&format!("{}/missing.apk", server.uri()), None, "apk", 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::DownloadFailed { status: 404 }));
        assert!(dir_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_without_leftovers() {
        let server = MockServer::start().await;
        serve(&server, "/big.apk", vec![7u8; 101]).await;
        let tmp = TempDir::new().unwrap();
        let fetcher = ArtifactFetcher::new(Client::new(), tmp.path());

        let err = fetcher
            .fetch_and_verify(&format!("{}/big.apk", server.uri()), None, "apk", 100)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ArtifactError::FileTooLarge { limit: 100, .. }
        ));
        assert!(dir_is_empty(tmp.path()));
    }

    /// Serves `body` once over a bare socket, closing the connection to mark
    /// the end of the body instead of sending a length.
    async fn serve_unsized(body: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n";
            let _ = socket.write_all(head).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/stream.apk")
    }

    #[tokio::test]
    async fn unsized_body_is_capped_while_streaming() {
        let url = serve_unsized(vec![3u8; 4096]).await;
        let tmp = TempDir::new().unwrap();
        let fetcher = ArtifactFetcher::new(Client::new(), tmp.path());

        let err = fetcher
            .fetch_and_verify(&url, None, "apk", 100)
            .await
            .unwrap_err();
        match err {
            ArtifactError::FileTooLarge { bytes, limit } => {
                assert_eq!(limit, 100);
                assert!(bytes > 100);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(dir_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn unsized_body_within_limit_is_kept() {
        let body = b"streamed without length".to_vec();
        let url = serve_unsized(body.clone()).await;
        let tmp = TempDir::new().unwrap();
        let fetcher = ArtifactFetcher::new(Client::new(), tmp.path());

        let artifact = fetcher
            .fetch_and_verify(&url, Some(&sha256_hex(&body)), "apk", 1024)
            .await
            .unwrap();
        assert_eq!(artifact.byte_length, body.len() as u64);
    }

    #[tokio::test]
    async fn digest_comparison_ignores_case() {
        let server = MockServer::start().await;
        let body = b"payload".to_vec();
        serve(&server, "/a.apk", body.clone()).await;
        let tmp = TempDir::new().unwrap();
        let fetcher = ArtifactFetcher::new(Client::new(), tmp.path());

        let upper = sha256_hex(&body).to_uppercase();
        let artifact = fetcher
            .fetch_and_verify(&format!("{}/a.apk", server.uri()), Some(&upper), "apk", 1024)
            .await
            .unwrap();
        assert_eq!(artifact.actual_sha256, sha256_hex(&body));
    }

    #[tokio::test]
    async fn digest_mismatch_reports_both_and_cleans_up() {
        let server = MockServer::start().await;
        let body = b"payload".to_vec();
        serve(&server, "/a.apk", body.clone()).await;
        let tmp = TempDir::new().unwrap();
        let fetcher = ArtifactFetcher::new(Client::new(), tmp.path());

        let wrong = "0".repeat(64);
        let err = fetcher
            .fetch_and_verify(&format!("{}/a.apk", server.uri()), Some(&wrong), "apk", 1024)
            .await
            .unwrap_err();
        match err {
            ArtifactError::ChecksumMismatch {
                expected,
                actual,
                bytes,
            } => {
                assert_eq!(expected, wrong);
                assert_eq!(actual, sha256_hex(&body));
                assert_eq!(bytes, body.len() as u64);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(dir_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn empty_expected_digest_skips_check() {
        let server = MockServer::start().await;
        serve(&server, "/a.apk", b"x".to_vec()).await;
        let tmp = TempDir::new().unwrap();
        let fetcher = ArtifactFetcher::new(Client::new(), tmp.path());

        let artifact = fetcher
            .fetch_and_verify(&format!("{}/a.apk", server.uri()), Some("  "), "apk", 1024)
            .await
            .unwrap();
        assert!(artifact.expected_sha256.is_none());
    }

    #[tokio::test]
    async fn non_http_scheme_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let fetcher = ArtifactFetcher::new(Client::new(), tmp.path());
        let err = fetcher
            .fetch_and_verify("file:///etc/passwd", None, "apk", 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidUrl { .. }));
    }
}

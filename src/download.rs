//! Blocking artifact downloads with progress reporting.
//!
//! The engine performs every download through the [`Downloader`]
//! capability so bottle, source, and patch acquisition are mockable.
//! Progress is reported through a plain observer callback rather than a
//! wrapping reader, so it can be tested without a live stream.
//!
//! GHCR-hosted bottles require a bearer token; anonymous tokens are
//! fetched on demand and refreshed up to two extra times when a request
//! comes back 401/403. No other request retries automatically. The
//! wire level sits behind the [`Transport`] seam so the retry policy is
//! testable without a live server.

use crate::error::{KegError, Result};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const GHCR_AUTH_RETRIES: usize = 2;

/// Download progress callback, invoked as bytes arrive.
pub trait ProgressObserver {
    fn on_progress(&self, bytes_read: u64, total: Option<u64>);
}

/// Observer that ignores progress. Used for quiet paths and tests.
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn on_progress(&self, _bytes_read: u64, _total: Option<u64>) {}
}

pub trait Downloader {
    /// Fetch `url` into `dest`, creating parent directories as needed.
    /// A partially-written file is removed on failure.
    fn fetch(&self, url: &str, dest: &Path, observer: &dyn ProgressObserver) -> Result<()>;
}

/// What the download loop needs from one HTTP exchange.
pub(crate) struct RawResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: Box<dyn Read>,
}

/// Wire-level operations behind [`HttpDownloader`].
pub(crate) trait Transport {
    fn get(&self, url: &str, bearer: Option<&str>) -> Result<RawResponse>;

    /// Anonymous pull token for a GHCR repository.
    fn ghcr_token(&self, repository: &str) -> Result<String>;
}

struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("keg/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str, bearer: Option<&str>) -> Result<RawResponse> {
        let mut request = self.client.get(url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().map_err(|e| KegError::Network {
            operation: format!("downloading {url}"),
            reason: e.to_string(),
        })?;
        Ok(RawResponse {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }

    fn ghcr_token(&self, repository: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct TokenResponse {
            token: String,
        }

        let token_url = format!(
            "https://ghcr.io/token?service=ghcr.io&scope=repository:{repository}:pull"
        );
        debug!("refreshing GHCR token for {repository}");
        let response: TokenResponse = self
            .client
            .get(&token_url)
            .send()
            .map_err(|e| KegError::Network {
                operation: "fetching GHCR token".to_string(),
                reason: e.to_string(),
            })?
            .json()
            .map_err(|e| KegError::Network {
                operation: "parsing GHCR token".to_string(),
                reason: e.to_string(),
            })?;
        Ok(response.token)
    }
}

/// Production downloader over a shared blocking HTTP client.
pub struct HttpDownloader {
    transport: Box<dyn Transport>,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            transport: Box::new(ReqwestTransport::new()?),
        })
    }

    #[cfg(test)]
    fn with_transport(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl Downloader for HttpDownloader {
    fn fetch(&self, url: &str, dest: &Path, observer: &dyn ProgressObserver) -> Result<()> {
        let repository = ghcr_repository(url);
        let mut token = match &repository {
            Some(repo) => Some(self.transport.ghcr_token(repo)?),
            None => None,
        };

        let mut attempts_left = if repository.is_some() {
            GHCR_AUTH_RETRIES
        } else {
            0
        };
        let response = loop {
            let response = self.transport.get(url, token.as_deref())?;
            if (200..300).contains(&response.status) {
                break response;
            }
            let code = response.status;
            if let Some(repo) = &repository {
                if (code == 401 || code == 403) && attempts_left > 0 {
                    attempts_left -= 1;
                    debug!("GHCR returned {code}, refreshing token ({attempts_left} retries left)");
                    token = Some(self.transport.ghcr_token(repo)?);
                    continue;
                }
            }
            return Err(KegError::Download {
                url: url.to_string(),
                status: Some(code),
                reason: format!("server responded {code}"),
            });
        };

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        match copy_with_progress(response, dest, observer) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = fs::remove_file(dest);
                Err(e)
            }
        }
    }
}

fn copy_with_progress(
    mut response: RawResponse,
    dest: &Path,
    observer: &dyn ProgressObserver,
) -> Result<()> {
    let total = response.content_length;
    let mut file = File::create(dest)?;
    let mut buffer = vec![0u8; 64 * 1024];
    let mut downloaded: u64 = 0;

    loop {
        let n = response.body.read(&mut buffer).map_err(|e| KegError::Network {
            operation: "reading response body".to_string(),
            reason: e.to_string(),
        })?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n])?;
        downloaded += n as u64;
        observer.on_progress(downloaded, total);
    }

    file.flush()?;
    Ok(())
}

/// `https://ghcr.io/v2/homebrew/core/wget/blobs/sha256:...` →
/// `homebrew/core/wget`.
fn ghcr_repository(url: &str) -> Option<String> {
    let path = url.split("ghcr.io/v2/").nth(1)?;
    let repository = path.split("/blobs/").next()?;
    if repository.is_empty() {
        None
    } else {
        Some(repository.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Cursor;
    use std::rc::Rc;

    const BLOB_URL: &str = "https://ghcr.io/v2/homebrew/core/wget/blobs/sha256:aabb";

    #[derive(Default)]
    struct Calls {
        gets: Cell<usize>,
        tokens: Cell<usize>,
    }

    /// Replays a fixed status sequence, one entry per request; the last
    /// entry repeats if the loop asks for more.
    struct ScriptedTransport {
        statuses: Vec<u16>,
        calls: Rc<Calls>,
    }

    impl Transport for ScriptedTransport {
        fn get(&self, _url: &str, bearer: Option<&str>) -> Result<RawResponse> {
            // every request must carry the most recently issued token
            let expected = format!("token-{}", self.calls.tokens.get());
            assert_eq!(bearer, Some(expected.as_str()));
            let index = self.calls.gets.get();
            self.calls.gets.set(index + 1);
            let status = *self.statuses.get(index).or(self.statuses.last()).unwrap();
            Ok(RawResponse {
                status,
                content_length: Some(2),
                body: Box::new(Cursor::new(b"ok".to_vec())),
            })
        }

        fn ghcr_token(&self, repository: &str) -> Result<String> {
            assert_eq!(repository, "homebrew/core/wget");
            self.calls.tokens.set(self.calls.tokens.get() + 1);
            Ok(format!("token-{}", self.calls.tokens.get()))
        }
    }

    fn scripted(statuses: Vec<u16>) -> (HttpDownloader, Rc<Calls>) {
        let calls = Rc::new(Calls::default());
        let downloader = HttpDownloader::with_transport(Box::new(ScriptedTransport {
            statuses,
            calls: calls.clone(),
        }));
        (downloader, calls)
    }

    #[test]
    fn ghcr_repository_extraction() {
        assert_eq!(
            ghcr_repository("https://ghcr.io/v2/homebrew/core/wget/blobs/sha256:aabb").as_deref(),
            Some("homebrew/core/wget")
        );
        assert_eq!(ghcr_repository("https://example.com/file.tar.gz"), None);
    }

    #[test]
    fn unauthorized_ghcr_refreshes_token_twice_then_fails() {
        let (downloader, calls) = scripted(vec![401]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("bottle.tar.gz");

        let err = downloader.fetch(BLOB_URL, &dest, &NullObserver).unwrap_err();
        match err {
            KegError::Download { status, .. } => assert_eq!(status, Some(401)),
            other => panic!("expected a download error, got {other:?}"),
        }
        // initial token plus exactly two refreshes, one request per token
        assert_eq!(calls.tokens.get(), 3);
        assert_eq!(calls.gets.get(), 3);
        assert!(!dest.exists());
    }

    #[test]
    fn ghcr_recovers_when_a_refreshed_token_works() {
        let (downloader, calls) = scripted(vec![403, 200]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("bottle.tar.gz");

        downloader.fetch(BLOB_URL, &dest, &NullObserver).unwrap();
        assert_eq!(calls.tokens.get(), 2);
        assert_eq!(calls.gets.get(), 2);
        assert_eq!(std::fs::read(&dest).unwrap(), b"ok");
    }

    #[test]
    fn non_ghcr_urls_never_fetch_tokens_or_retry() {
        struct PlainTransport {
            calls: Rc<Calls>,
        }
        impl Transport for PlainTransport {
            fn get(&self, _url: &str, bearer: Option<&str>) -> Result<RawResponse> {
                assert!(bearer.is_none());
                self.calls.gets.set(self.calls.gets.get() + 1);
                Ok(RawResponse {
                    status: 404,
                    content_length: None,
                    body: Box::new(Cursor::new(Vec::new())),
                })
            }
            fn ghcr_token(&self, _repository: &str) -> Result<String> {
                unreachable!("token fetch for a non-GHCR URL");
            }
        }

        let calls = Rc::new(Calls::default());
        let downloader = HttpDownloader::with_transport(Box::new(PlainTransport {
            calls: calls.clone(),
        }));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("src.tar.gz");

        let err = downloader
            .fetch("https://example.com/src.tar.gz", &dest, &NullObserver)
            .unwrap_err();
        assert!(matches!(err, KegError::Download { status: Some(404), .. }));
        assert_eq!(calls.gets.get(), 1);
    }
}

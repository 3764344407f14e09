/// CV render client: the only place that talks to the external PDF renderer.
///
/// The renderer receives the validated CV form as JSON and answers with a PDF.
use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

const MAX_RETRIES: u32 = 3;
const PDF_MAGIC: &[u8] = b"%PDF";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("renderer error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("renderer returned something that is not a PDF")]
    NotPdf,

    #[error("renderer unavailable after {retries} retries")]
    Exhausted { retries: u32 },
}

#[derive(Clone)]
pub struct CvRenderClient {
    client: Client,
    url: String,
    base_delay: Duration,
}

impl CvRenderClient {
    pub fn new(url: String) -> Result<Self, RenderError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(60)).build()?,
            url,
            base_delay: Duration::from_millis(500),
        })
    }

    #[cfg(test)]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Posts `form` to the renderer and returns the PDF bytes.
    /// Retries on 429 and 5xx with exponential backoff.
    pub async fn render<T: Serialize + ?Sized>(&self, form: &T) -> Result<Bytes, RenderError> {
        let mut last_error: Option<RenderError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = self.base_delay * (1 << (attempt - 1));
                warn!(
                    "CV render attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.post(&self.url).json(form).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(RenderError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("CV renderer returned {}: {}", status, body);
                last_error = Some(RenderError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(RenderError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let pdf = response.bytes().await?;
            if !pdf.starts_with(PDF_MAGIC) {
                return Err(RenderError::NotPdf);
            }

            debug!("CV rendered: {} bytes", pdf.len());
            return Ok(pdf);
        }

        Err(last_error.unwrap_or(RenderError::Exhausted {
            retries: MAX_RETRIES,
        }))
    }
}

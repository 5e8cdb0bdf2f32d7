//! Client for the PSP core API, the source of truth for invoices.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::PspCoreConfig;
use crate::error::PspError;
use crate::models::Invoice;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything that can produce an invoice snapshot by id.
///
/// The poller and the HTTP handlers only depend on this, so tests can swap
/// in scripted sources.
pub trait InvoiceSource: Send + Sync + 'static {
    fn fetch_invoice(
        &self,
        invoice_id: &str,
    ) -> impl Future<Output = Result<Invoice, PspError>> + Send;
}

/// `{ok, invoice}` envelope around a single invoice.
#[derive(Debug, Deserialize)]
struct InvoiceResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    invoice: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// `{ok, invoices}` envelope around a page.
#[derive(Debug, Deserialize)]
struct InvoicePageResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    invoices: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageRequest {
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct PspClient {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl PspClient {
    pub fn new(config: &PspCoreConfig) -> Result<Self, PspError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PspError::Network(e.to_string()))?;
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| PspError::Network(format!("invalid PSP core URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(PspError::Network(format!(
                "invalid PSP core URL: {}",
                config.base_url
            )));
        }

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Base URL with `segments` appended; each segment is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejected cannot-be-a-base URLs, so path segments are available.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: Url,
        query: Option<&PageRequest>,
    ) -> Result<T, PspError> {
        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(query) = query {
            request = request.query(query);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PspError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            #[derive(Deserialize)]
            struct ErrorResponse {
                error: Option<String>,
            }

            let message = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| format!("Request failed: {}", status));
            return Err(PspError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PspError::Malformed(e.to_string()))
    }

    pub async fn get_invoice(&self, invoice_id: &str) -> Result<Invoice, PspError> {
        let url = self.endpoint(&["invoices", invoice_id]);
        let body: InvoiceResponse = self.get_json(url, None).await?;

        if !body.ok {
            return Err(PspError::NotOk(
                body.error.unwrap_or_else(|| "invoice fetch failed".to_string()),
            ));
        }

        let invoice = body
            .invoice
            .ok_or_else(|| PspError::Malformed("response has no invoice".into()))?;
        Invoice::from_value(invoice)
    }

    /// One page of invoices. Records that fail normalization are skipped with
    /// a warning rather than failing the whole page.
    pub async fn list_invoices(&self, page: PageRequest) -> Result<Vec<Invoice>, PspError> {
        let url = self.endpoint(&["invoices"]);
        let body: InvoicePageResponse = self.get_json(url, Some(&page)).await?;

        if !body.ok {
            return Err(PspError::NotOk(
                body.error.unwrap_or_else(|| "invoice list failed".to_string()),
            ));
        }

        let invoices = body
            .invoices
            .ok_or_else(|| PspError::Malformed("response has no invoices".into()))?;

        Ok(invoices
            .into_iter()
            .filter_map(|raw| match Invoice::from_value(raw) {
                Ok(inv) => Some(inv),
                Err(e) => {
                    tracing::warn!("Skipping invoice in page: {}", e);
                    None
                }
            })
            .collect())
    }
}

impl InvoiceSource for PspClient {
    async fn fetch_invoice(&self, invoice_id: &str) -> Result<Invoice, PspError> {
        self.get_invoice(invoice_id).await
    }
}

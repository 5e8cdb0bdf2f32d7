use axum::{Json, extract::State};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::extractors::{Path, Query};
use crate::filter::{InvoiceFilter, filter_invoices};
use crate::invoice_state::{self, DerivedState};
use crate::models::Invoice;
use crate::pagination::PaginationQuery;
use crate::poller::is_terminal;
use crate::psp::InvoiceSource;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetailResponse {
    pub ok: bool,
    pub invoice: Invoice,
    pub state: DerivedState,
    pub aml_label: &'static str,
    pub terminal: bool,
}

/// One list row: the invoice plus its badges.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRow {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub state: DerivedState,
    pub aml_label: &'static str,
}

impl From<&Invoice> for InvoiceRow {
    fn from(invoice: &Invoice) -> Self {
        Self {
            invoice: invoice.clone(),
            state: invoice_state::derive(invoice),
            aml_label: invoice_state::aml_display_label(invoice),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceListResponse {
    pub ok: bool,
    pub count: usize,
    pub invoices: Vec<InvoiceRow>,
}

/// `GET /api/invoices/{id}`
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceDetailResponse>> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::BadRequest("invoice id is required".into()));
    }

    let invoice = state.psp.fetch_invoice(id).await?;

    Ok(Json(InvoiceDetailResponse {
        ok: true,
        state: invoice_state::derive(&invoice),
        aml_label: invoice_state::aml_display_label(&invoice),
        terminal: is_terminal(&invoice),
        invoice,
    }))
}

/// `GET /api/invoices?limit&offset&<filter>`
///
/// Fetches one page from the PSP core and filters it here, so `count` is the
/// number of matches within that page.
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(page): Query<PaginationQuery>,
    Query(filter): Query<InvoiceFilter>,
) -> Result<Json<InvoiceListResponse>> {
    let invoices = state.psp.list_invoices(page.page()).await?;

    let rows: Vec<InvoiceRow> = filter_invoices(&invoices, &filter)
        .into_iter()
        .map(InvoiceRow::from)
        .collect();

    Ok(Json(InvoiceListResponse {
        ok: true,
        count: rows.len(),
        invoices: rows,
    }))
}

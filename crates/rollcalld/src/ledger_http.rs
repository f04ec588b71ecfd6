//! HTTP client for the attendance ledger service.

use chrono::{DateTime, Utc};
use rollcall_core::ledger::{AttendanceEvent, Ledger, LedgerError, LedgerReceipt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::runtime::Handle;

const USER_AGENT: &str = concat!("rollcalld/", env!("CARGO_PKG_VERSION"));
const ATTENDANCE_PATH: &str = "/attendance/face-recognition";
const HEALTH_PATH: &str = "/health";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkRequest<'a> {
    session_id: Option<&'a str>,
    student_id: &'a str,
    confidence: f32,
    source: &'a str,
    department: &'a str,
    year: &'a str,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkResponse {
    marked_at: DateTime<Utc>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Ledger backed by `POST {base}/attendance/face-recognition`.
///
/// `record` blocks the calling thread on the runtime handle, so it must be
/// called from a blocking-pool thread, never from inside an async task.
pub struct HttpLedger {
    client: reqwest::Client,
    base_url: String,
    runtime: Handle,
}

impl HttpLedger {
    pub fn new(base_url: &str, timeout: Duration, runtime: Handle) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            runtime,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_mark(&self, event: &AttendanceEvent) -> Result<LedgerReceipt, LedgerError> {
        let url = format!("{}{ATTENDANCE_PATH}", self.base_url);
        let body = MarkRequest {
            session_id: event.context.session_id.as_deref(),
            student_id: &event.identity_id,
            confidence: event.confidence,
            source: &event.source,
            department: &event.context.session.department,
            year: &event.context.session.year,
            timestamp: event.timestamp.to_rfc3339(),
        };

        tracing::debug!(url = %url, identity = %event.identity_id, "posting attendance");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("reading response: {e}")))?;
        interpret_response(status, &text)
    }
}

impl Ledger for HttpLedger {
    fn record(&self, event: &AttendanceEvent) -> Result<LedgerReceipt, LedgerError> {
        let result = self.runtime.block_on(self.post_mark(event));
        match &result {
            Ok(receipt) => tracing::info!(
                identity = %event.identity_id,
                marked_at = %receipt.marked_at,
                "ledger accepted attendance"
            ),
            Err(e) => tracing::warn!(identity = %event.identity_id, error = %e, "ledger call failed"),
        }
        result
    }

    fn health(&self) -> Result<(), LedgerError> {
        let url = format!("{}{HEALTH_PATH}", self.base_url);
        self.runtime.block_on(async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(LedgerError::Unavailable(format!("health check returned {status}")))
            }
        })
    }
}

/// Map a ledger HTTP answer onto a receipt or a typed failure.
fn interpret_response(status: u16, body: &str) -> Result<LedgerReceipt, LedgerError> {
    match status {
        200..=299 => {
            let parsed: MarkResponse = serde_json::from_str(body).map_err(|e| {
                LedgerError::Unavailable(format!("unreadable ledger response: {e}"))
            })?;
            Ok(LedgerReceipt {
                marked_at: parsed.marked_at,
                message: parsed.message,
            })
        }
        400..=499 => {
            let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
            let reason = parsed
                .and_then(|b| b.error.or(b.message))
                .unwrap_or_else(|| format!("HTTP {status}"));
            Err(LedgerError::Rejected {
                status: Some(status),
                reason,
            })
        }
        _ => Err(LedgerError::Unavailable(format!("ledger returned HTTP {status}"))),
    }
}

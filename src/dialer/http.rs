//! HTTP(S) probe: drives libcurl directly inside a blocking task so the
//! phase timings (namelookup/connect/appconnect/starttransfer) come from
//! the same request that produces the status code and body.

use std::time::Instant;

use curl::easy::Easy;

use crate::error::DialerError;
use crate::types::{Response, StatusType, Target, TimingBreakdown};

const MAX_BODY_BYTES: usize = 1024;

pub async fn probe(target: &Target) -> Result<Response, DialerError> {
    let start = Instant::now();
    let method = target.method.clone().unwrap_or_else(|| "GET".to_string());
    let headers: Vec<(String, String)> = target
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let url = target.url.clone();
    let timeout = target.timeout;
    let method_for_blocking = method.clone();
    let headers_for_blocking = headers.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        run_curl(&url, &method_for_blocking, &headers_for_blocking, timeout)
    })
    .await
    .map_err(|e| DialerError::Other(format!("probe task join failed: {e}")))??;

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = target.predicate(outcome.status, Some(&outcome.body));

    Ok(Response {
        timestamp: chrono::Utc::now().timestamp(),
        duration_ms,
        code: outcome.status,
        body: Some(outcome.body),
        ok: true,
        bytes: outcome.bytes,
        status,
        status_type: StatusType::Unknown,
        timing: Some(outcome.timing),
        ssl_expires_at: outcome.ssl_expires_at,
        is_aggregated: false,
        uptime_fraction: if status { 1.0 } else { 0.0 },
        count: 1,
    })
}

struct CurlOutcome {
    status: u16,
    bytes: u64,
    body: Vec<u8>,
    timing: TimingBreakdown,
    ssl_expires_at: Option<i64>,
}

fn run_curl(
    url: &str,
    method: &str,
    headers: &[(String, String)],
    timeout: std::time::Duration,
) -> Result<CurlOutcome, DialerError> {
    let mut handle = Easy::new();
    handle
        .url(url)
        .map_err(|e| DialerError::Other(format!("invalid url: {e}")))?;
    if method.eq_ignore_ascii_case("head") {
        handle.nobody(true).ok();
    } else if !method.eq_ignore_ascii_case("get") {
        handle
            .custom_request(method)
            .map_err(|e| DialerError::Other(e.to_string()))?;
    }
    handle
        .timeout(timeout)
        .map_err(|e| DialerError::Other(e.to_string()))?;
    handle.follow_location(true).ok();

    let mut header_list = curl::easy::List::new();
    for (k, v) in headers {
        header_list
            .append(&format!("{k}: {v}"))
            .map_err(|e| DialerError::Other(e.to_string()))?;
    }
    handle
        .http_headers(header_list)
        .map_err(|e| DialerError::Other(e.to_string()))?;

    let mut body = Vec::new();
    {
        let mut transfer = handle.transfer();
        transfer
            .write_function(|data| {
                if body.len() < MAX_BODY_BYTES {
                    let take = (MAX_BODY_BYTES - body.len()).min(data.len());
                    body.extend_from_slice(&data[..take]);
                }
                Ok(data.len())
            })
            .map_err(|e| DialerError::Other(e.to_string()))?;
        transfer.perform().map_err(classify_curl_error)?;
    }

    let status = handle
        .response_code()
        .map_err(|e| DialerError::Other(e.to_string()))? as u16;
    let bytes = handle.download_size().unwrap_or(0.0).max(0.0) as u64;

    let namelookup = handle.namelookup_time().unwrap_or_default().as_secs_f64();
    let connect = handle.connect_time().unwrap_or_default().as_secs_f64();
    let appconnect = handle.appconnect_time().unwrap_or_default().as_secs_f64();
    let starttransfer = handle.starttransfer_time().unwrap_or_default().as_secs_f64();

    let timing = TimingBreakdown {
        dns_ms: Some((namelookup * 1000.0) as u64),
        connect_ms: Some(((connect - namelookup).max(0.0) * 1000.0) as u64),
        tls_ms: if appconnect > connect {
            Some(((appconnect - connect) * 1000.0) as u64)
        } else {
            None
        },
        ttfb_ms: Some(((starttransfer - appconnect.max(connect)).max(0.0) * 1000.0) as u64),
    };

    Ok(CurlOutcome {
        status,
        bytes,
        body,
        timing,
        ssl_expires_at: None,
    })
}

fn classify_curl_error(e: curl::Error) -> DialerError {
    if e.is_operation_timedout() {
        DialerError::Timeout(std::time::Duration::default())
    } else if e.is_couldnt_connect() || e.is_couldnt_resolve_host() {
        DialerError::Dial(e.to_string())
    } else if e.is_recv_error() || e.is_got_nothing() {
        DialerError::Read(e.to_string())
    } else {
        DialerError::Other(e.to_string())
    }
}

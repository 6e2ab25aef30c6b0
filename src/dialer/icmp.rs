//! ICMP echo probe: one ping, timed by round-trip time.

use std::net::ToSocketAddrs;
use std::time::Instant;

use surge_ping::{Client, Config, PingIdentifier, PingSequence};

use crate::error::DialerError;
use crate::types::{Response, StatusType, Target};

pub async fn probe(target: &Target) -> Result<Response, DialerError> {
    let host = target
        .url
        .split(':')
        .next()
        .unwrap_or(&target.url)
        .to_string();
    let addr = format!("{host}:0")
        .to_socket_addrs()
        .map_err(|e| DialerError::Dial(e.to_string()))?
        .next()
        .ok_or_else(|| DialerError::Dial(format!("could not resolve {host}")))?
        .ip();

    let client = Client::new(&Config::default()).map_err(|e| DialerError::Other(e.to_string()))?;
    let mut pinger = client
        .pinger(addr, PingIdentifier(rand_identifier()))
        .await;
    pinger.timeout(target.timeout);

    let start = Instant::now();
    let payload = [0u8; 56];
    let (packets_received, rtt) = match pinger.ping(PingSequence(0), &payload).await {
        Ok((_reply, duration)) => (1u32, duration),
        Err(_) => (0u32, start.elapsed()),
    };

    let ok = packets_received > 0;
    let code: u16 = if ok { 200 } else { 400 };
    let status = target.predicate(code, None);

    Ok(Response {
        timestamp: chrono::Utc::now().timestamp(),
        duration_ms: rtt.as_millis() as u64,
        code,
        body: None,
        ok,
        bytes: 0,
        status,
        status_type: StatusType::Unknown,
        timing: None,
        ssl_expires_at: None,
        is_aggregated: false,
        uptime_fraction: if status { 1.0 } else { 0.0 },
        count: 1,
    })
}

fn rand_identifier() -> u16 {
    use std::time::{SystemTime, UNIX_EPOCH};
    (SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() & 0xffff) as u16
}

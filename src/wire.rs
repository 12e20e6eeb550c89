//! Newline-delimited JSON protocol: one request object per line in, one
//! response object per line out.
//!
//! ```text
//! {"op":"book","guest":"alice","unit":"101","check_in":"2024-03-01","nights":5}
//! {"op":"extend","guest":"alice","unit":"101","additional_nights":2}
//! {"op":"list","unit":"101"}
//! ```

use std::sync::Arc;

use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{error, warn};
use ulid::Ulid;

use crate::engine::{EngineError, ReservationService, ReservationStore};
use crate::limits::MAX_LINE_LEN;
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Book {
        guest: String,
        unit: String,
        check_in: String,
        nights: i64,
    },
    Extend {
        guest: String,
        unit: String,
        additional_nights: i64,
    },
    List {
        #[serde(default)]
        guest: Option<String>,
        #[serde(default)]
        unit: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Rejected,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPayload {
    pub id: Ulid,
    pub guest: String,
    pub unit: String,
    pub check_in: NaiveDate,
    pub nights: u32,
    pub check_out: Option<NaiveDate>,
}

impl From<Reservation> for ReservationPayload {
    fn from(r: Reservation) -> Self {
        let check_out = r.check_out();
        Self {
            id: r.id,
            guest: r.guest,
            unit: r.unit,
            check_in: r.check_in,
            nights: r.nights,
            check_out,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<ReservationPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservations: Option<Vec<ReservationPayload>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn empty(status: Status) -> Self {
        Self {
            status,
            reservation: None,
            reservations: None,
            reason: None,
            error: None,
        }
    }

    pub fn reservation(r: Reservation) -> Self {
        Self {
            reservation: Some(r.into()),
            ..Self::empty(Status::Ok)
        }
    }

    pub fn reservations(rs: Vec<Reservation>) -> Self {
        Self {
            reservations: Some(rs.into_iter().map(Into::into).collect()),
            ..Self::empty(Status::Ok)
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            error: Some(msg.into()),
            ..Self::empty(Status::Error)
        }
    }

    /// Rejections carry the reason verbatim; anything else is a system error.
    pub fn from_engine_error(e: &EngineError) -> Self {
        match e {
            EngineError::Rejected(r) => Self {
                reason: Some(r.reason().to_string()),
                ..Self::empty(Status::Rejected)
            },
            other => Self::error(other.to_string()),
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| EngineError::InvalidInput("check_in must be a YYYY-MM-DD date"))
}

fn parse_nights(n: i64) -> Result<u32, EngineError> {
    if n < 1 {
        return Err(EngineError::InvalidInput("nights must be at least 1"));
    }
    u32::try_from(n).map_err(|_| EngineError::LimitExceeded("stay too long"))
}

async fn execute<S: ReservationStore>(
    service: &ReservationService<S>,
    req: Request,
) -> Result<Response, EngineError> {
    match req {
        Request::Book {
            guest,
            unit,
            check_in,
            nights,
        } => {
            let check_in = parse_date(&check_in)?;
            let nights = parse_nights(nights)?;
            let r = service.create_booking(&guest, &unit, check_in, nights).await?;
            Ok(Response::reservation(r))
        }
        Request::Extend {
            guest,
            unit,
            additional_nights,
        } => {
            let additional = parse_nights(additional_nights)?;
            let r = service.extend_booking(&guest, &unit, additional).await?;
            Ok(Response::reservation(r))
        }
        Request::List { guest, unit } => {
            let rs = service
                .list_reservations(&ReservationFilter { guest, unit })
                .await?;
            Ok(Response::reservations(rs))
        }
    }
}

/// Decode one request line, run it, and build the response line's value.
pub async fn handle_line<S: ReservationStore>(service: &ReservationService<S>, line: &str) -> Response {
    let req: Request = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => {
            warn!("malformed request: {e}");
            metrics::counter!(crate::observability::REQUESTS_TOTAL, "op" => "unknown", "status" => "error")
                .increment(1);
            return Response::error(format!("malformed request: {e}"));
        }
    };

    let op = crate::observability::op_label(&req);
    let started = std::time::Instant::now();
    let result = execute(service, req).await;
    metrics::histogram!(crate::observability::REQUEST_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());

    let (status, response) = match result {
        Ok(resp) => ("ok", resp),
        Err(EngineError::Rejected(r)) => {
            metrics::counter!(crate::observability::REJECTIONS_TOTAL, "op" => op, "reason" => r.label())
                .increment(1);
            ("rejected", Response::from_engine_error(&EngineError::Rejected(r)))
        }
        Err(e @ (EngineError::InvalidInput(_) | EngineError::LimitExceeded(_))) => {
            warn!("{op} refused: {e}");
            ("error", Response::from_engine_error(&e))
        }
        Err(e) => {
            error!("{op} failed: {e}");
            ("error", Response::from_engine_error(&e))
        }
    };
    metrics::counter!(crate::observability::REQUESTS_TOTAL, "op" => op, "status" => status).increment(1);
    response
}

/// Serve one client until it disconnects or sends an oversize line.
pub async fn process_connection<S>(
    socket: TcpStream,
    service: Arc<ReservationService<S>>,
) -> Result<(), LinesCodecError>
where
    S: ReservationStore + 'static,
{
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));

    while let Some(frame) = framed.next().await {
        let line = match frame {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                let resp = Response::error(format!("request line exceeds {MAX_LINE_LEN} bytes"));
                framed.send(encode(&resp)).await?;
                return Err(LinesCodecError::MaxLineLengthExceeded);
            }
            Err(e) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }
        let resp = handle_line(&service, &line).await;
        framed.send(encode(&resp)).await?;
    }
    Ok(())
}

fn encode(resp: &Response) -> String {
    // A Response is plain strings, dates and ids; serialization can't fail.
    serde_json::to_string(resp)
        .unwrap_or_else(|e| format!(r#"{{"status":"error","error":"encode failed: {e}"}}"#))
}

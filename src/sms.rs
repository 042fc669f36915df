//! SMS arrival lookups (`ETA <stop_id>`), answered as TwiML.

use crate::eta::EtaConfig;
use crate::gtfs::ReferenceData;
use crate::query::stop_etas;
use crate::vehicles::VehicleStateTable;

pub const USAGE: &str = "Usage: ETA <stop_id>";
pub const NO_ACTIVE_BUSES: &str = "No active buses.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsCommand {
    Eta { stop_id: String },
    Unknown,
}

impl SmsCommand {
    /// `ETA <stop_id>`, keyword in any case. The stop id keeps its case.
    pub fn parse(body: &str) -> Self {
        let mut parts = body.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(keyword), Some(stop_id)) if keyword.eq_ignore_ascii_case("eta") => Self::Eta {
                stop_id: stop_id.to_string(),
            },
            _ => Self::Unknown,
        }
    }
}

/// Plain-text reply for an inbound message.
pub fn reply_text(
    body: &str,
    reference: &ReferenceData,
    vehicles: &VehicleStateTable,
    now_ms: i64,
    config: &EtaConfig,
) -> String {
    let SmsCommand::Eta { stop_id } = SmsCommand::parse(body) else {
        return USAGE.to_string();
    };

    match stop_etas(reference, vehicles, &stop_id, None, now_ms, config) {
        Ok(board) => match board.etas.first() {
            Some(best) => format!(
                "Bus {} ETA to stop {}: {} min",
                best.vehicle_id, board.stop.name, best.eta_minutes
            ),
            None => NO_ACTIVE_BUSES.to_string(),
        },
        Err(_) => USAGE.to_string(),
    }
}

/// Wraps `message` in a TwiML messaging response.
pub fn twiml_message(message: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        escape_xml(message)
    )
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

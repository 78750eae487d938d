//! Train ticket tools.
//!
//! `query_tickets` always answers with several trains, which is why it is
//! the default selection tool: the user picks one before the reasoner sees
//! the result.

use async_trait::async_trait;
use serde::Serialize;
use waypoint_core::error::ToolError;
use waypoint_core::tool::{Tool, ToolResult};

use crate::{required_str, stable_hash};

#[derive(Serialize)]
struct Train {
    train_no: String,
    name: String,
    description: String,
    from_station: String,
    to_station: String,
    date: String,
    departure: String,
    arrival: String,
    seats_left: u32,
    price: u32,
}

fn validate_date(date: &str) -> Result<(), ToolError> {
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| ToolError::InvalidArguments(format!("'date' must be YYYY-MM-DD, got '{date}'")))
}

fn mock_trains(from: &str, to: &str, date: &str) -> Vec<Train> {
    let hash = stable_hash(&format!("{from}|{to}|{date}"));
    let prefixes = ["G", "D", "K"];
    (0..3u32)
        .map(|i| {
            let prefix = prefixes[i as usize];
            let number = 100 + (hash / (i + 1)) % 900;
            let dep_h = 6 + (hash / (i + 3)) % 14;
            let duration_h = 2 + i * 2 + hash % 3;
            let train_no = format!("{prefix}{number}");
            let departure = format!("{dep_h:02}:{:02}", (hash / (i + 5)) % 60);
            let arrival = format!("{:02}:{:02}", (dep_h + duration_h) % 24, (hash / (i + 7)) % 60);
            let price = 80 + (hash / (i + 11)) % 400 / (i + 1);
            let seats_left = (hash / (i + 13)) % 50;
            Train {
                name: format!("{train_no} {from} → {to} {departure}-{arrival}"),
                description: format!("{seats_left} seats left, {price} CNY"),
                train_no,
                from_station: from.to_string(),
                to_station: to.to_string(),
                date: date.to_string(),
                departure,
                arrival,
                seats_left,
                price,
            }
        })
        .collect()
}

// ── query_tickets ─────────────────────────────────────────────────────────

pub struct QueryTicketsTool;

#[async_trait]
impl Tool for QueryTicketsTool {
    fn name(&self) -> &str {
        "query_tickets"
    }

    fn description(&self) -> &str {
        "Query train tickets between two stations on a date. Returns the available trains."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "from_station": { "type": "string", "description": "Departure station" },
                "to_station": { "type": "string", "description": "Arrival station" },
                "date": { "type": "string", "description": "Travel date, YYYY-MM-DD" }
            },
            "required": ["from_station", "to_station", "date"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let from = required_str(&arguments, "from_station")?;
        let to = required_str(&arguments, "to_station")?;
        let date = required_str(&arguments, "date")?;
        validate_date(date)?;

        if from.eq_ignore_ascii_case(to) {
            return Ok(ToolResult::failed(
                "Departure and arrival stations must differ",
            ));
        }

        Ok(ToolResult::json(serde_json::json!({
            "trains": mock_trains(from, to, date),
        })))
    }
}

// ── book_ticket ───────────────────────────────────────────────────────────

pub struct BookTicketTool;

#[async_trait]
impl Tool for BookTicketTool {
    fn name(&self) -> &str {
        "book_ticket"
    }

    fn description(&self) -> &str {
        "Book a seat on a specific train. Irreversible once confirmed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "train_no": { "type": "string", "description": "Train number, e.g. G123" },
                "date": { "type": "string", "description": "Travel date, YYYY-MM-DD" },
                "seat_class": {
                    "type": "string",
                    "enum": ["first", "second"],
                    "default": "second"
                }
            },
            "required": ["train_no", "date"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let train_no = required_str(&arguments, "train_no")?;
        let date = required_str(&arguments, "date")?;
        validate_date(date)?;
        let seat_class = arguments["seat_class"].as_str().unwrap_or("second");

        let hash = stable_hash(&format!("{train_no}|{date}|{seat_class}"));
        tracing::info!(train_no, date, seat_class, "Ticket booked");
        Ok(ToolResult::json(serde_json::json!({
            "order_id": format!("ord_{hash:08x}"),
            "train_no": train_no,
            "date": date,
            "seat_class": seat_class,
            "seat": format!("{:02}{}", 1 + hash % 18, ["A", "B", "C", "D", "F"][(hash / 18) as usize % 5]),
            "status": "booked",
        })))
    }
}

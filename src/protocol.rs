//! Socket message formats
//!
//! Inbound frames are short colon separated commands:
//!
//! - `MS:<betAmount>` place a wager
//! - `FC:<matchId>:<roundId>:<eventId>` cut a fruit
//! - `ME:<matchId>` cash out
//!
//! Outbound frames are JSON objects `{"event": ..., "data": ...}`.

use crate::game::types::{BalanceInfo, Round, WagerView};
use crate::money;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    /// `amount` is `None` when the frame carried no usable amount
    PlaceBet { amount: Option<Decimal> },
    Commit {
        match_id: String,
        round_id: String,
        event_id: Option<u32>,
    },
    End { match_id: String },
}

impl ClientCommand {
    /// Returns `None` for frames that are not game commands
    pub fn parse(frame: &str) -> Option<Self> {
        let frame = frame.trim();
        let (prefix, rest) = frame.split_once(':').unwrap_or((frame, ""));

        match prefix {
            "MS" => Some(ClientCommand::PlaceBet {
                amount: money::parse_amount(rest),
            }),
            "FC" => {
                let mut parts = rest.splitn(3, ':');
                let match_id = parts.next().unwrap_or_default().to_string();
                let round_id = parts.next().unwrap_or_default().to_string();
                let event_id = parts.next().and_then(|raw| raw.trim().parse().ok());
                Some(ClientCommand::Commit {
                    match_id,
                    round_id,
                    event_id,
                })
            }
            "ME" => Some(ClientCommand::End {
                match_id: rest.to_string(),
            }),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::PlaceBet { .. } => "place",
            ClientCommand::Commit { .. } => "commit",
            ClientCommand::End { .. } => "end",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    Round(Round),
    Bet(WagerView),
    FruitSlice(WagerView),
    MatchEnd(WagerView),
    Info(BalanceInfo),
    BetError(String),
    Logout(String),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Round(_) => "round",
            ServerEvent::Bet(_) => "bet",
            ServerEvent::FruitSlice(_) => "fruitSlice",
            ServerEvent::MatchEnd(_) => "matchEnd",
            ServerEvent::Info(_) => "info",
            ServerEvent::BetError(_) => "betError",
            ServerEvent::Logout(_) => "logout",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BrainsError;
use crate::types::{Address, Amount, PositionId, Timestamp};

// ── Round ────────────────────────────────────────────────────────────────────

/// Acquisition round a stake was bought in. Selects the withdrawal schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Round {
    Public,
    PreSale,
    Seed,
    StrategicOrPrivate,
    Founder,
}

impl Round {
    pub const ALL: [Round; 5] = [
        Round::Public,
        Round::PreSale,
        Round::Seed,
        Round::StrategicOrPrivate,
        Round::Founder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Round::Public => "public",
            Round::PreSale => "pre_sale",
            Round::Seed => "seed",
            Round::StrategicOrPrivate => "strategic_or_private",
            Round::Founder => "founder",
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Round {
    type Err = BrainsError;

    /// Accepts the snake_case names plus a few operator-friendly aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "public" => Ok(Round::Public),
            "pre_sale" | "presale" => Ok(Round::PreSale),
            "seed" => Ok(Round::Seed),
            "strategic_or_private" | "strategic" | "private" => Ok(Round::StrategicOrPrivate),
            "founder" => Ok(Round::Founder),
            other => Err(BrainsError::InvalidConfig(format!("unknown round: {other}"))),
        }
    }
}

// ── PositionKind ─────────────────────────────────────────────────────────────

/// Which registry a position lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionKind {
    /// The single per-address position holding stake below the threshold.
    Accumulator,
    /// A fixed-size, transferable position minted at the threshold.
    Chunk,
}

impl fmt::Display for PositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionKind::Accumulator => f.pad("accumulator"),
            PositionKind::Chunk => f.pad("chunk"),
        }
    }
}

// ── StakePosition ────────────────────────────────────────────────────────────

/// One durable stake record. Shared by both registries.
///
/// `start_time` is fixed at creation. Transfers change only `owner`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePosition {
    pub id: PositionId,
    pub owner: Address,
    pub amount: Amount,
    pub round: Round,
    pub start_time: Timestamp,
}

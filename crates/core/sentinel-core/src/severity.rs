//! Severity classification and per-space risk rollup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Categorical risk of a detection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Identity, financial and health identifiers
    High,
    /// Direct contact details and precise locations
    Medium,
    /// Names, dates and other weak identifiers
    Low,
}

impl Severity {
    /// Weight used in the risk rollup
    pub fn weight(&self) -> u64 {
        match self {
            Severity::High => 10,
            Severity::Medium => 5,
            Severity::Low => 2,
        }
    }
}

/// Aggregated risk level of a space, derived from detection counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    /// No detections
    Aucun,
    /// Weighted score 1 to 4
    Faible,
    /// Weighted score 5 to 20
    Moyen,
    /// Weighted score 21 to 49
    Eleve,
    /// Weighted score 50 and above
    Critique,
}

impl RiskLevel {
    /// Display label
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Aucun => "Aucun",
            RiskLevel::Faible => "Faible",
            RiskLevel::Moyen => "Moyen",
            RiskLevel::Eleve => "Élevé",
            RiskLevel::Critique => "Critique",
        }
    }
}

fn known_severity(pii_type: &str) -> Option<Severity> {
    match pii_type.trim().to_ascii_uppercase().as_str() {
        "SSN" | "SOCIAL_SECURITY_NUMBER" | "NIR" | "CREDIT_CARD" | "CARD_NUMBER" | "IBAN"
        | "BANK_ACCOUNT" | "PASSPORT" | "ID_CARD" | "DRIVER_LICENSE" | "MEDICAL"
        | "HEALTH_INSURANCE" | "PASSWORD" | "API_KEY" | "SECRET" => Some(Severity::High),
        "EMAIL" | "EMAIL_ADDRESS" | "PHONE" | "PHONE_NUMBER" | "ADDRESS" | "LOCATION"
        | "DATE_OF_BIRTH" | "IP_ADDRESS" => Some(Severity::Medium),
        "PERSON" | "NAME" | "DATE" | "URL" | "ORGANIZATION" | "NATIONALITY" => {
            Some(Severity::Low)
        }
        _ => None,
    }
}

/// Severity of a detection type; unknown types default to `Low`
pub fn severity_of(pii_type: &str) -> Severity {
    known_severity(pii_type).unwrap_or(Severity::Low)
}

/// Weight of a detection type in the risk rollup; unknown types weigh 1
pub fn weight_of(pii_type: &str) -> u64 {
    known_severity(pii_type).map(|s| s.weight()).unwrap_or(1)
}

/// Roll per-type detection counts up into a space risk level
pub fn risk_of(counts: &HashMap<String, u64>) -> RiskLevel {
    let score: u64 = counts
        .iter()
        .map(|(pii_type, count)| weight_of(pii_type) * count)
        .sum();

    match score {
        0 => RiskLevel::Aucun,
        1..=4 => RiskLevel::Faible,
        5..=20 => RiskLevel::Moyen,
        21..=49 => RiskLevel::Eleve,
        _ => RiskLevel::Critique,
    }
}

use crate::models::{Record, RiskLevel};

pub const HIGH_AVERAGE_CUTOFF: f64 = 45.0;
pub const HIGH_ATTENDANCE_CUTOFF: f64 = 50.0;
pub const MEDIUM_AVERAGE_CUTOFF: f64 = 60.0;
pub const MEDIUM_ATTENDANCE_CUTOFF: f64 = 65.0;

pub fn fallback_risk(record: &Record) -> RiskLevel {
    classify(record.average(), record.attendance)
}

pub fn classify(average: f64, attendance: f64) -> RiskLevel {
    if average < HIGH_AVERAGE_CUTOFF || attendance < HIGH_ATTENDANCE_CUTOFF {
        RiskLevel::High
    } else if average < MEDIUM_AVERAGE_CUTOFF || attendance < MEDIUM_ATTENDANCE_CUTOFF {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Reads a risk label case-insensitively; anything unrecognised counts as low.
pub fn parse_risk(label: &str) -> RiskLevel {
    match label.trim().to_uppercase().as_str() {
        "HIGH" => RiskLevel::High,
        "MEDIUM" => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

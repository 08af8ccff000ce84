use super::*;
use chrono::NaiveDate;

#[test]
fn severity_round_trips_through_display() {
    for severity in Severity::ALL {
        assert_eq!(severity.to_string().parse::<Severity>(), Ok(severity));
    }
}

#[test]
fn severity_parse_is_case_insensitive() {
    assert_eq!("critical".parse::<Severity>(), Ok(Severity::Critical));
    assert_eq!(" Warning ".parse::<Severity>(), Ok(Severity::Warning));
    assert!("fatal".parse::<Severity>().is_err());
}

#[test]
fn severity_normalize_defaults_to_info() {
    assert_eq!(Severity::normalize("HIGH"), Severity::High);
    assert_eq!(Severity::normalize(""), Severity::Info);
    assert_eq!(Severity::normalize("debug"), Severity::Info);
}

#[test]
fn severity_rank_orders_both_label_families() {
    assert_eq!(Severity::Critical.rank(), 4);
    assert_eq!(Severity::High.rank(), Severity::Error.rank());
    assert_eq!(Severity::Medium.rank(), Severity::Warning.rank());
    assert_eq!(Severity::Low.rank(), Severity::Info.rank());
    assert!(Severity::Warning.rank() < Severity::Error.rank());
}

#[test]
fn severity_serializes_uppercase() {
    let json = serde_json::to_string(&Severity::Critical).expect("should serialize severity");
    assert_eq!(json, "\"CRITICAL\"");
}

#[test]
fn timestamp_utc_formatting() {
    let entry = LogEntry {
        log_id: "log_000001".to_string(),
        file_id: "file_abcd1234".to_string(),
        timestamp: NaiveDate::from_ymd_opt(2025, 1, 15)
            .and_then(|d| d.and_hms_opt(8, 30, 5))
            .expect("valid timestamp"),
        source: "UNIT-007".to_string(),
        severity: Severity::Warning,
        message: "pressure drop detected".to_string(),
    };

    assert_eq!(entry.timestamp_utc(), "2025-01-15T08:30:05Z");
}

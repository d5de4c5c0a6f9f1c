use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::db::Store;
use crate::models::{Record, RiskLevel};
use crate::risk;

pub const FAILING_MARK: f64 = 40.0;

pub fn summarize_by_risk(records: &[&Record]) -> BTreeMap<RiskLevel, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(risk::fallback_risk(record)).or_insert(0) += 1;
    }
    counts
}

pub fn build_report(store: &Store, generated_on: NaiveDate) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Records Report");
    let _ = writeln!(
        output,
        "Generated on {} for {} students (local heuristic, no AI calls)",
        generated_on,
        store.len()
    );
    let _ = writeln!(output);

    let Some(records) = store.list_sorted_by_roll() else {
        let _ = writeln!(output, "No student records available.");
        return output;
    };

    let _ = writeln!(output, "## Risk Mix");
    let counts = summarize_by_risk(&records);
    for level in [RiskLevel::High, RiskLevel::Medium, RiskLevel::Low] {
        let _ = writeln!(
            output,
            "- {}: {} students",
            level,
            counts.get(&level).copied().unwrap_or(0)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Roster");
    let _ = writeln!(
        output,
        "| Roll | Name | Average | Attendance | Below {FAILING_MARK:.0} | Risk |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|");
    for record in records.iter() {
        let _ = writeln!(
            output,
            "| {} | {} | {:.2} | {:.2}% | {} | {} |",
            record.roll,
            record.name,
            record.average(),
            record.attendance,
            record.count_below(FAILING_MARK),
            risk::fallback_risk(record)
        );
    }

    let mut by_attendance = records.clone();
    by_attendance.sort_by(|a, b| a.attendance.total_cmp(&b.attendance));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Lowest Attendance");
    for record in by_attendance.iter().take(5) {
        let _ = writeln!(
            output,
            "- {} (roll {}): {:.2}%",
            record.name, record.roll, record.attendance
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(records: &[(&str, i32, f64, f64)]) -> Store {
        let mut store = Store::new();
        for (name, roll, mark, attendance) in records {
            store
                .add(Record::new(name, *roll, [*mark; 5], *attendance))
                .unwrap();
        }
        store
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()
    }

    #[test]
    fn empty_store_reports_no_records() {
        let report = build_report(&Store::new(), date());
        assert!(report.contains("Generated on 2026-02-02 for 0 students"));
        assert!(report.contains("No student records available."));
        assert!(!report.contains("## Roster"));
    }

    #[test]
    fn roster_is_ordered_by_roll_with_risk_mix() {
        let store = store_with(&[
            ("Jules", 3, 30.0, 40.0),
            ("Avery", 1, 90.0, 95.0),
            ("Kiara", 2, 55.0, 70.0),
        ]);
        let report = build_report(&store, date());

        assert!(report.contains("- HIGH: 1 students"));
        assert!(report.contains("- MEDIUM: 1 students"));
        assert!(report.contains("- LOW: 1 students"));

        let avery = report.find("| 1 | Avery |").unwrap();
        let kiara = report.find("| 2 | Kiara |").unwrap();
        let jules = report.find("| 3 | Jules |").unwrap();
        assert!(avery < kiara && kiara < jules);
        assert!(report.contains("| 3 | Jules | 30.00 | 40.00% | 5 | HIGH |"));
    }

    #[test]
    fn lowest_attendance_lists_worst_first() {
        let store = store_with(&[("Avery", 1, 90.0, 95.0), ("Jules", 2, 90.0, 41.5)]);
        let report = build_report(&store, date());
        let section = report.split("## Lowest Attendance").nth(1).unwrap();
        assert!(section.trim_start().starts_with("- Jules (roll 2): 41.50%"));
    }
}

use std::fmt;

use crate::error::StoreError;

pub const NUM_SUBJECTS: usize = 5;
pub const NAME_LEN: usize = 100;

pub const SUBJECTS: [&str; NUM_SUBJECTS] = [
    "Mathematics",
    "Physics",
    "Chemistry",
    "ComputerScience",
    "English",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub roll: i32,
    pub marks: [f64; NUM_SUBJECTS],
    pub attendance: f64,
}

impl Record {
    pub fn new(name: &str, roll: i32, marks: [f64; NUM_SUBJECTS], attendance: f64) -> Self {
        Self {
            name: truncate_name(name).to_string(),
            roll,
            marks,
            attendance,
        }
    }

    pub fn average(&self) -> f64 {
        self.marks.iter().sum::<f64>() / NUM_SUBJECTS as f64
    }

    pub fn count_below(&self, threshold: f64) -> usize {
        self.marks.iter().filter(|mark| **mark < threshold).count()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--------------------------------------------------")?;
        writeln!(f, "Name       : {}", self.name)?;
        writeln!(f, "Roll No.   : {}", self.roll)?;
        writeln!(f, "Attendance : {:.2}%", self.attendance)?;
        for (subject, mark) in SUBJECTS.iter().zip(self.marks.iter()) {
            writeln!(f, "{subject:<14} : {mark:.2}")?;
        }
        writeln!(f, "Average    : {:.2}", self.average())?;
        write!(f, "--------------------------------------------------")
    }
}

/// Field changes for an existing record. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub name: Option<String>,
    pub marks: Option<[f64; NUM_SUBJECTS]>,
    pub attendance: Option<f64>,
}

/// Longest prefix of `name` that fits the persisted name field with its
/// terminator. A NUL ends the name, as it does on disk.
pub fn truncate_name(name: &str) -> &str {
    let name = name.split('\0').next().unwrap_or_default();
    let limit = NAME_LEN - 1;
    if name.len() <= limit {
        return name;
    }
    let mut end = limit;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn in_percent_range(value: f64) -> bool {
    (0.0..=100.0).contains(&value)
}

pub fn validate_marks_and_attendance(
    marks: &[f64; NUM_SUBJECTS],
    attendance: f64,
) -> Result<(), StoreError> {
    if !in_percent_range(attendance) {
        return Err(StoreError::Validation(format!(
            "attendance {attendance} is outside 0-100"
        )));
    }
    for (subject, mark) in SUBJECTS.iter().zip(marks.iter()) {
        if !in_percent_range(*mark) {
            return Err(StoreError::Validation(format!(
                "{subject} mark {mark} is outside 0-100"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentSource {
    Service,
    LocalFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentResult {
    pub risk: RiskLevel,
    pub career: String,
    pub explanation: String,
    pub source: AssessmentSource,
}

impl AssessmentResult {
    pub fn is_fallback(&self) -> bool {
        self.source == AssessmentSource::LocalFallback
    }
}

impl fmt::Display for AssessmentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let career = if self.career.is_empty() {
            "Unknown"
        } else {
            &self.career
        };
        let explanation = if self.explanation.is_empty() {
            "None"
        } else {
            &self.explanation
        };
        writeln!(f, "Risk Level      : {}", self.risk)?;
        writeln!(f, "Suggested field : {career}")?;
        write!(f, "Explanation     : {explanation}")
    }
}

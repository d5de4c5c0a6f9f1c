use std::io::Write;

use crate::assess::AssessmentClient;
use crate::db::{Persisted, Session};
use crate::error::StoreError;
use crate::models::{validate_marks_and_attendance, Record, RecordUpdate, NUM_SUBJECTS, SUBJECTS};
use crate::prompt::Prompter;

const MENU_ITEMS: [&str; 7] = [
    "Add Student",
    "Update Student",
    "Delete Student",
    "Search Student",
    "List all Students",
    "AI Analysis for Student (Risk + Career Suggestion)",
    "Exit",
];

enum Flow {
    Continue,
    Exit,
}

/// Interactive loop over an open session. Prompts go through `prompter`,
/// results are written to `output`. End of input behaves like choosing Exit.
pub struct Menu<'a, P, W> {
    session: Session,
    client: &'a AssessmentClient,
    prompter: P,
    output: W,
}

impl<'a, P: Prompter, W: Write> Menu<'a, P, W> {
    pub fn new(session: Session, client: &'a AssessmentClient, prompter: P, output: W) -> Self {
        Self {
            session,
            client,
            prompter,
            output,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            writeln!(self.output)?;
            writeln!(self.output, "=== Student Record Management System ===")?;
            self.output.flush()?;
            let Some(choice) = self.prompter.select("Enter choice", &MENU_ITEMS)? else {
                break;
            };
            let flow = match choice {
                0 => self.add_student()?,
                1 => self.update_student()?,
                2 => self.delete_student()?,
                3 => self.search_student()?,
                4 => self.list_all()?,
                5 => self.analyze_student().await?,
                _ => Flow::Exit,
            };
            if let Flow::Exit = flow {
                break;
            }
        }

        let Menu {
            session,
            mut output,
            ..
        } = self;
        if let Err(err) = session.close() {
            writeln!(output, "Warning: failed to save database on exit: {err}")?;
        }
        writeln!(output, "Exiting. Goodbye!")?;
        Ok(())
    }

    fn report_saved(&mut self, persisted: Persisted, message: &str) -> anyhow::Result<()> {
        if let Some(warning) = persisted.warning() {
            writeln!(self.output, "{warning}")?;
        }
        writeln!(self.output, "{message}")?;
        Ok(())
    }

    fn add_student(&mut self) -> anyhow::Result<Flow> {
        let Some(roll) = self.prompter.int("Enter roll number")? else {
            return Ok(Flow::Exit);
        };
        let Some(name) = self.prompter.text("Enter name", false)? else {
            return Ok(Flow::Exit);
        };
        let mut marks = [0.0; NUM_SUBJECTS];
        for (subject, mark) in SUBJECTS.iter().zip(marks.iter_mut()) {
            let text = format!("Enter marks for {subject} (0-100)");
            let Some(value) = self.prompter.percent(&text)? else {
                return Ok(Flow::Exit);
            };
            *mark = value;
        }
        let Some(attendance) = self.prompter.percent("Enter attendance percentage (0-100)")? else {
            return Ok(Flow::Exit);
        };

        if let Err(err) = validate_marks_and_attendance(&marks, attendance) {
            writeln!(self.output, "Invalid marks/attendance values ({err}). Aborting add.")?;
            return Ok(Flow::Continue);
        }

        match self
            .session
            .add(Record::new(&name, roll, marks, attendance))
        {
            Ok(persisted) => self.report_saved(persisted, "Student added successfully.")?,
            Err(StoreError::DuplicateKey(roll)) => writeln!(
                self.output,
                "Failed to add student: roll number {roll} already exists."
            )?,
            Err(err) => writeln!(self.output, "Failed to add student: {err}")?,
        }
        Ok(Flow::Continue)
    }

    fn update_student(&mut self) -> anyhow::Result<Flow> {
        let Some(roll) = self.prompter.int("Enter roll number to update")? else {
            return Ok(Flow::Exit);
        };
        let Some(current) = self.session.store().search_by_roll(roll).cloned() else {
            writeln!(self.output, "Student with roll {roll} not found.")?;
            return Ok(Flow::Continue);
        };
        writeln!(self.output, "Current record:")?;
        writeln!(self.output, "{current}")?;

        let Some(name) = self
            .prompter
            .text("Enter new name (leave blank to keep current)", true)?
        else {
            return Ok(Flow::Exit);
        };
        let mut marks = current.marks;
        for (subject, mark) in SUBJECTS.iter().zip(marks.iter_mut()) {
            let text = format!("Enter new marks for {subject} (or blank to keep {mark:.2})");
            let Some(value) = self.prompter.percent_or_keep(&text, *mark)? else {
                return Ok(Flow::Exit);
            };
            *mark = value;
        }
        let text = format!(
            "Enter new attendance (or blank to keep {:.2})",
            current.attendance
        );
        let Some(attendance) = self.prompter.percent_or_keep(&text, current.attendance)? else {
            return Ok(Flow::Exit);
        };

        if let Err(err) = validate_marks_and_attendance(&marks, attendance) {
            writeln!(self.output, "Invalid marks/attendance values ({err}). Aborting update.")?;
            return Ok(Flow::Continue);
        }

        let changes = RecordUpdate {
            name: (!name.is_empty()).then_some(name),
            marks: (marks != current.marks).then_some(marks),
            attendance: (attendance != current.attendance).then_some(attendance),
        };
        match self.session.update(roll, changes) {
            Ok(persisted) => self.report_saved(persisted, "Student updated successfully.")?,
            Err(err) => writeln!(self.output, "Failed to update student: {err}")?,
        }
        Ok(Flow::Continue)
    }

    fn delete_student(&mut self) -> anyhow::Result<Flow> {
        let Some(roll) = self.prompter.int("Enter roll number to delete")? else {
            return Ok(Flow::Exit);
        };
        match self.session.delete(roll) {
            Ok(persisted) => self.report_saved(persisted, "Student deleted.")?,
            Err(_) => writeln!(self.output, "Student with roll {roll} not found.")?,
        }
        Ok(Flow::Continue)
    }

    fn search_student(&mut self) -> anyhow::Result<Flow> {
        let Some(option) = self.prompter.select("Search by", &["Roll", "Name"])? else {
            return Ok(Flow::Exit);
        };
        let found = if option == 0 {
            let Some(roll) = self.prompter.int("Enter roll")? else {
                return Ok(Flow::Exit);
            };
            self.session.store().search_by_roll(roll).cloned()
        } else {
            let Some(name) = self.prompter.text("Enter exact name", true)? else {
                return Ok(Flow::Exit);
            };
            self.session.store().search_by_name(&name).cloned()
        };
        match found {
            Some(record) => writeln!(self.output, "{record}")?,
            None => writeln!(self.output, "Not found.")?,
        }
        Ok(Flow::Continue)
    }

    fn list_all(&mut self) -> anyhow::Result<Flow> {
        match self.session.store().list_sorted_by_roll() {
            Some(records) => {
                for record in records {
                    writeln!(self.output, "{record}")?;
                }
            }
            None => writeln!(self.output, "No student records available.")?,
        }
        Ok(Flow::Continue)
    }

    async fn analyze_student(&mut self) -> anyhow::Result<Flow> {
        let Some(roll) = self.prompter.int("Enter roll number for AI analysis")? else {
            return Ok(Flow::Exit);
        };
        let Some(record) = self.session.store().search_by_roll(roll).cloned() else {
            writeln!(self.output, "Student not found.")?;
            return Ok(Flow::Continue);
        };
        let result = self.client.assess(&record).await;
        writeln!(
            self.output,
            "AI Analysis for {} (Roll {}):",
            record.name, record.roll
        )?;
        writeln!(self.output, "{result}")?;
        Ok(Flow::Continue)
    }
}

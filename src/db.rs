use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::models::{
    truncate_name, validate_marks_and_attendance, Record, RecordUpdate, NAME_LEN, NUM_SUBJECTS,
};

/// Bytes per persisted record: name, roll, marks, attendance. Little-endian, no padding.
pub const RECORD_SIZE: usize = NAME_LEN + 4 + NUM_SUBJECTS * 8 + 8;

const ROLL_OFFSET: usize = NAME_LEN;
const MARKS_OFFSET: usize = ROLL_OFFSET + 4;
const ATTENDANCE_OFFSET: usize = MARKS_OFFSET + NUM_SUBJECTS * 8;

pub fn encode_record(record: &Record) -> [u8; RECORD_SIZE] {
    let mut buf = [0u8; RECORD_SIZE];
    let name = truncate_name(&record.name).as_bytes();
    buf[..name.len()].copy_from_slice(name);
    buf[ROLL_OFFSET..MARKS_OFFSET].copy_from_slice(&record.roll.to_le_bytes());
    for (i, mark) in record.marks.iter().enumerate() {
        let start = MARKS_OFFSET + i * 8;
        buf[start..start + 8].copy_from_slice(&mark.to_le_bytes());
    }
    buf[ATTENDANCE_OFFSET..].copy_from_slice(&record.attendance.to_le_bytes());
    buf
}

pub fn decode_record(buf: &[u8; RECORD_SIZE]) -> Record {
    let name_field = &buf[..NAME_LEN];
    let name_end = name_field.iter().position(|b| *b == 0).unwrap_or(NAME_LEN);
    let name = String::from_utf8_lossy(&name_field[..name_end]).into_owned();

    let mut roll = [0u8; 4];
    roll.copy_from_slice(&buf[ROLL_OFFSET..MARKS_OFFSET]);

    let mut marks = [0.0; NUM_SUBJECTS];
    for (i, mark) in marks.iter_mut().enumerate() {
        *mark = read_f64(buf, MARKS_OFFSET + i * 8);
    }

    Record {
        name,
        roll: i32::from_le_bytes(roll),
        marks,
        attendance: read_f64(buf, ATTENDANCE_OFFSET),
    }
}

fn read_f64(buf: &[u8], start: usize) -> f64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[start..start + 8]);
    f64::from_le_bytes(bytes)
}

/// Fills `buf` as far as the reader allows; returns the byte count read.
fn read_chunk(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    record: Record,
}

/// In-memory student index keyed by roll number.
///
/// Insertion order is tracked separately from the key order: `save` writes
/// records oldest first and `load` replays them in file order.
#[derive(Debug, Default)]
pub struct Store {
    records: BTreeMap<i32, Entry>,
    next_seq: u64,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        let mut entries: Vec<&Entry> = self.records.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| &entry.record)
    }

    /// Replaces the current content with the records stored at `path`.
    ///
    /// A missing file yields an empty store. A trailing partial record is dropped.
    pub fn load(&mut self, path: &Path) -> Result<usize, StoreError> {
        self.records.clear();
        self.next_seq = 0;

        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no database file yet, starting empty");
                return Ok(0);
            }
            Err(err) => return Err(StoreError::persistence(path, err)),
        };

        let mut reader = BufReader::new(file);
        let mut buf = [0u8; RECORD_SIZE];
        loop {
            let read = read_chunk(&mut reader, &mut buf)
                .map_err(|err| StoreError::persistence(path, err))?;
            if read == 0 {
                break;
            }
            if read < RECORD_SIZE {
                warn!(
                    path = %path.display(),
                    trailing_bytes = read,
                    "ignoring truncated record at end of file"
                );
                break;
            }
            let record = decode_record(&buf);
            if self.records.contains_key(&record.roll) {
                warn!(roll = record.roll, "duplicate roll in database file, keeping first");
                continue;
            }
            self.insert(record);
        }

        info!(path = %path.display(), count = self.len(), "loaded student records");
        Ok(self.len())
    }

    /// Overwrites `path` with every record, oldest first.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let file = File::create(path).map_err(|err| StoreError::persistence(path, err))?;
        let mut writer = BufWriter::new(file);
        for record in self.iter() {
            writer
                .write_all(&encode_record(record))
                .map_err(|err| StoreError::persistence(path, err))?;
        }
        writer
            .flush()
            .map_err(|err| StoreError::persistence(path, err))?;
        info!(path = %path.display(), count = self.len(), "saved student records");
        Ok(())
    }

    fn insert(&mut self, mut record: Record) {
        record.name.truncate(truncate_name(&record.name).len());
        let seq = self.next_seq;
        self.next_seq += 1;
        self.records.insert(record.roll, Entry { seq, record });
    }

    pub fn add(&mut self, record: Record) -> Result<(), StoreError> {
        if self.records.contains_key(&record.roll) {
            return Err(StoreError::DuplicateKey(record.roll));
        }
        self.insert(record);
        Ok(())
    }

    pub fn delete(&mut self, roll: i32) -> Result<Record, StoreError> {
        self.records
            .remove(&roll)
            .map(|entry| entry.record)
            .ok_or(StoreError::NotFound(roll))
    }

    /// Applies `changes` to the record with `roll`. Ranges are not re-validated here.
    pub fn update(&mut self, roll: i32, changes: RecordUpdate) -> Result<&Record, StoreError> {
        let entry = self
            .records
            .get_mut(&roll)
            .ok_or(StoreError::NotFound(roll))?;
        let record = &mut entry.record;
        if let Some(name) = changes.name {
            record.name = truncate_name(&name).to_string();
        }
        if let Some(marks) = changes.marks {
            record.marks = marks;
        }
        if let Some(attendance) = changes.attendance {
            record.attendance = attendance;
        }
        Ok(&*record)
    }

    pub fn get(&self, roll: i32) -> Result<&Record, StoreError> {
        self.search_by_roll(roll).ok_or(StoreError::NotFound(roll))
    }

    pub fn get_by_name(&self, name: &str) -> Result<&Record, StoreError> {
        self.search_by_name(name)
            .ok_or_else(|| StoreError::NameNotFound(name.to_string()))
    }

    pub fn search_by_roll(&self, roll: i32) -> Option<&Record> {
        self.records.get(&roll).map(|entry| &entry.record)
    }

    /// Exact, case-sensitive match. When several records share the name the
    /// most recently inserted one wins.
    pub fn search_by_name(&self, name: &str) -> Option<&Record> {
        self.records
            .values()
            .filter(|entry| entry.record.name == name)
            .max_by_key(|entry| entry.seq)
            .map(|entry| &entry.record)
    }

    /// Snapshot ordered by roll, or `None` when there is nothing to show.
    pub fn list_sorted_by_roll(&self) -> Option<Vec<&Record>> {
        if self.is_empty() {
            return None;
        }
        Some(self.records.values().map(|entry| &entry.record).collect())
    }
}

/// Outcome of the save that follows every successful mutation.
#[must_use]
#[derive(Debug)]
pub enum Persisted {
    Saved,
    Failed(StoreError),
}

impl Persisted {
    pub fn warning(&self) -> Option<String> {
        match self {
            Persisted::Saved => None,
            Persisted::Failed(err) => Some(format!("Warning: failed to save database: {err}")),
        }
    }
}

/// An open database file and the store loaded from it.
#[derive(Debug)]
pub struct Session {
    store: Store,
    path: PathBuf,
}

impl Session {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut store = Store::new();
        store.load(&path)?;
        Ok(Self { store, path })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn save(&self) -> Result<(), StoreError> {
        self.store.save(&self.path)
    }

    fn persist(&self) -> Persisted {
        match self.save() {
            Ok(()) => Persisted::Saved,
            Err(err) => {
                warn!(error = %err, "mutation kept in memory but not saved");
                Persisted::Failed(err)
            }
        }
    }

    pub fn add(&mut self, record: Record) -> Result<Persisted, StoreError> {
        self.store.add(record)?;
        Ok(self.persist())
    }

    pub fn update(&mut self, roll: i32, changes: RecordUpdate) -> Result<Persisted, StoreError> {
        self.store.update(roll, changes)?;
        Ok(self.persist())
    }

    pub fn delete(&mut self, roll: i32) -> Result<Persisted, StoreError> {
        self.store.delete(roll)?;
        Ok(self.persist())
    }

    /// Saves on clean shutdown and releases the store.
    pub fn close(self) -> Result<(), StoreError> {
        self.save()
    }
}

pub fn seed(session: &mut Session) -> anyhow::Result<usize> {
    let students = vec![
        ("Alice", 101, [95.0, 90.0, 88.0, 96.0, 80.0], 92.0),
        ("Bob", 102, [48.0, 50.0, 45.0, 30.0, 92.0], 88.0),
        ("Carol", 103, [72.0, 68.0, 65.0, 70.0, 85.0], 90.0),
    ];

    let mut inserted = 0usize;
    for (name, roll, marks, attendance) in students {
        match session.store.add(Record::new(name, roll, marks, attendance)) {
            Ok(()) => inserted += 1,
            Err(StoreError::DuplicateKey(_)) => continue,
            Err(err) => return Err(err.into()),
        }
    }

    session.save().context("failed to save seeded records")?;
    Ok(inserted)
}

pub fn import_csv(session: &mut Session, csv_path: &Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        roll: i32,
        name: String,
        mathematics: f64,
        physics: f64,
        chemistry: f64,
        computer_science: f64,
        english: f64,
        attendance: f64,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut rows = Vec::new();
    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed row at line {line}"))?;
        let marks = [
            row.mathematics,
            row.physics,
            row.chemistry,
            row.computer_science,
            row.english,
        ];
        validate_marks_and_attendance(&marks, row.attendance)
            .with_context(|| format!("invalid row at line {line}"))?;
        rows.push((line, Record::new(&row.name, row.roll, marks, row.attendance)));
    }

    // Nothing reaches the store until the whole file has parsed and validated.
    let mut inserted = 0usize;
    for (line, record) in rows {
        match session.store.add(record) {
            Ok(()) => inserted += 1,
            Err(StoreError::DuplicateKey(roll)) => {
                warn!(roll, line, "skipping duplicate roll from csv");
            }
            Err(err) => return Err(err.into()),
        }
    }

    session.save().context("failed to save imported records")?;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(roll: i32, name: &str) -> Record {
        Record::new(name, roll, [80.0, 75.5, 60.25, 90.0, 55.0], 88.5)
    }

    #[test]
    fn record_layout_is_fixed_width() {
        assert_eq!(RECORD_SIZE, 152);
        let bytes = encode_record(&sample(7, "Avery Lee"));
        assert_eq!(&bytes[..9], b"Avery Lee");
        assert!(bytes[9..NAME_LEN].iter().all(|b| *b == 0));
        assert_eq!(&bytes[ROLL_OFFSET..MARKS_OFFSET], &7i32.to_le_bytes());
        assert_eq!(decode_record(&bytes), sample(7, "Avery Lee"));
    }

    #[test]
    fn duplicate_add_fails_and_leaves_store_unchanged() {
        let mut store = Store::new();
        store.add(sample(1, "A")).unwrap();
        let err = store.add(sample(1, "B")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(1)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.search_by_roll(1).unwrap().name, "A");
    }

    #[test]
    fn add_delete_scenario_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::new();
        assert_eq!(store.load(&dir.path().join("absent.dat")).unwrap(), 0);
        assert!(store.is_empty());

        store
            .add(Record::new("A", 1, [80.0; NUM_SUBJECTS], 90.0))
            .unwrap();
        assert!(matches!(
            store.add(Record::new("A", 1, [80.0; NUM_SUBJECTS], 90.0)),
            Err(StoreError::DuplicateKey(1))
        ));
        assert_eq!(store.delete(1).unwrap().roll, 1);
        assert!(matches!(store.delete(1), Err(StoreError::NotFound(1))));
    }

    #[test]
    fn save_then_load_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.dat");

        let mut store = Store::new();
        store.add(sample(30, "Jules Moreno")).unwrap();
        store.add(sample(10, "Avery Lee")).unwrap();
        store.add(sample(20, "Kiara Patel")).unwrap();
        store.save(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * RECORD_SIZE as u64);

        let mut loaded = Store::new();
        assert_eq!(loaded.load(&path).unwrap(), 3);
        for record in store.iter() {
            assert_eq!(loaded.search_by_roll(record.roll), Some(record));
        }
        let order: Vec<i32> = loaded.iter().map(|record| record.roll).collect();
        assert_eq!(order, vec![30, 10, 20]);
    }

    #[test]
    fn names_round_trip_field_for_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.dat");

        let mut store = Store::new();
        store.add(Record::new("A\0B", 1, [50.0; NUM_SUBJECTS], 60.0)).unwrap();
        store
            .add(Record {
                name: "x".repeat(150),
                roll: 2,
                marks: [70.0; NUM_SUBJECTS],
                attendance: 80.0,
            })
            .unwrap();
        assert_eq!(store.search_by_roll(1).unwrap().name, "A");
        assert_eq!(store.search_by_roll(2).unwrap().name.len(), NAME_LEN - 1);
        store.save(&path).unwrap();

        let mut loaded = Store::new();
        loaded.load(&path).unwrap();
        for record in store.iter() {
            assert_eq!(loaded.search_by_roll(record.roll), Some(record));
        }
    }

    #[test]
    fn load_replaces_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.dat");
        let mut saved = Store::new();
        saved.add(sample(5, "Saved")).unwrap();
        saved.save(&path).unwrap();

        let mut store = Store::new();
        store.add(sample(9, "Unsaved")).unwrap();
        store.load(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.search_by_roll(9).is_none());
    }

    #[test]
    fn truncated_trailing_record_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.dat");
        let mut bytes = encode_record(&sample(1, "Whole")).to_vec();
        bytes.extend_from_slice(&encode_record(&sample(2, "Partial"))[..40]);
        std::fs::write(&path, bytes).unwrap();

        let mut store = Store::new();
        assert_eq!(store.load(&path).unwrap(), 1);
        assert_eq!(store.search_by_roll(1).unwrap().name, "Whole");
        assert!(store.search_by_roll(2).is_none());
    }

    #[test]
    fn load_from_directory_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Store::new().load(dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::Persistence { .. }));
    }

    #[test]
    fn update_applies_only_given_fields() {
        let mut store = Store::new();
        store.add(sample(4, "Before")).unwrap();

        let updated = store
            .update(
                4,
                RecordUpdate {
                    attendance: Some(61.0),
                    ..RecordUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Before");
        assert_eq!(updated.marks, sample(4, "Before").marks);
        assert_eq!(updated.attendance, 61.0);

        store
            .update(
                4,
                RecordUpdate {
                    name: Some("After".to_string()),
                    marks: Some([1.0, 2.0, 3.0, 4.0, 5.0]),
                    attendance: None,
                },
            )
            .unwrap();
        let record = store.search_by_roll(4).unwrap();
        assert_eq!(record.name, "After");
        assert_eq!(record.marks, [1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(record.attendance, 61.0);
    }

    #[test]
    fn update_missing_roll_leaves_records_untouched() {
        let mut store = Store::new();
        store.add(sample(1, "One")).unwrap();
        let err = store
            .update(
                2,
                RecordUpdate {
                    attendance: Some(10.0),
                    ..RecordUpdate::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(2)));
        assert_eq!(store.search_by_roll(1), Some(&sample(1, "One")));
    }

    #[test]
    fn name_search_is_exact_and_prefers_latest_insert() {
        let mut store = Store::new();
        store.add(sample(50, "Sam")).unwrap();
        store.add(sample(3, "Sam")).unwrap();
        store.add(sample(7, "sam")).unwrap();

        assert_eq!(store.search_by_name("Sam").unwrap().roll, 3);
        assert_eq!(store.search_by_name("sam").unwrap().roll, 7);
        assert!(store.search_by_name("Sa").is_none());
    }

    #[test]
    fn lookups_report_misses_as_errors() {
        let mut store = Store::new();
        store.add(sample(12, "Kiara Patel")).unwrap();

        assert_eq!(store.get(12).unwrap().name, "Kiara Patel");
        assert_eq!(store.get_by_name("Kiara Patel").unwrap().roll, 12);
        assert!(matches!(store.get(13), Err(StoreError::NotFound(13))));
        assert!(matches!(
            store.get_by_name("kiara patel"),
            Err(StoreError::NameNotFound(name)) if name == "kiara patel"
        ));
    }

    #[test]
    fn sorted_listing_is_ascending_and_complete() {
        let mut store = Store::new();
        assert!(store.list_sorted_by_roll().is_none());

        for roll in [42, -3, 17, 8, 100] {
            store.add(sample(roll, "Student")).unwrap();
        }
        let listed = store.list_sorted_by_roll().unwrap();
        assert_eq!(listed.len(), store.len());
        assert!(listed.windows(2).all(|pair| pair[0].roll <= pair[1].roll));
        let order: Vec<i32> = store.iter().map(|record| record.roll).collect();
        assert_eq!(order, vec![42, -3, 17, 8, 100]);
    }

    #[test]
    fn delete_missing_roll_does_not_touch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.dat");
        let mut session = Session::open(&path).unwrap();
        assert!(matches!(session.add(sample(1, "One")).unwrap(), Persisted::Saved));
        let before = std::fs::read(&path).unwrap();

        assert!(matches!(session.delete(99), Err(StoreError::NotFound(99))));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn session_saves_after_each_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.dat");
        let mut session = Session::open(&path).unwrap();

        let _ = session.add(sample(1, "One")).unwrap();
        let _ = session.add(sample(2, "Two")).unwrap();
        let _ = session.delete(1).unwrap();
        let _ = session
            .update(
                2,
                RecordUpdate {
                    name: Some("Renamed".to_string()),
                    ..RecordUpdate::default()
                },
            )
            .unwrap();

        let reopened = Session::open(&path).unwrap();
        assert_eq!(reopened.store().len(), 1);
        assert_eq!(reopened.store().search_by_roll(2).unwrap().name, "Renamed");
    }

    #[test]
    fn failed_save_keeps_mutation_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("students.dat");
        let mut session = Session::open(&path).unwrap();

        let outcome = session.add(sample(1, "One")).unwrap();
        assert!(outcome.warning().is_some());
        assert!(matches!(outcome, Persisted::Failed(StoreError::Persistence { .. })));
        assert_eq!(session.store().len(), 1);
    }

    #[test]
    fn seed_skips_existing_rolls() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::open(dir.path().join("students.dat")).unwrap();
        let _ = session.add(sample(101, "Existing")).unwrap();

        assert_eq!(seed(&mut session).unwrap(), 2);
        assert_eq!(session.store().search_by_roll(101).unwrap().name, "Existing");
        assert_eq!(seed(&mut session).unwrap(), 0);
    }

    #[test]
    fn csv_import_inserts_new_rolls() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("students.csv");
        std::fs::write(
            &csv_path,
            "roll,name,mathematics,physics,chemistry,computer_science,english,attendance\n\
             1,Avery Lee,90,85,80,95,70,93\n\
             2,Jules Moreno,40,45,50,35,60,55\n\
             1,Avery Again,10,10,10,10,10,10\n",
        )
        .unwrap();

        let db_path = dir.path().join("students.dat");
        let mut session = Session::open(&db_path).unwrap();
        assert_eq!(import_csv(&mut session, &csv_path).unwrap(), 2);
        assert_eq!(session.store().search_by_roll(1).unwrap().name, "Avery Lee");

        let reopened = Session::open(&db_path).unwrap();
        assert_eq!(reopened.store().len(), 2);
    }

    #[test]
    fn csv_import_rejects_out_of_range_rows() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("students.csv");
        std::fs::write(
            &csv_path,
            "roll,name,mathematics,physics,chemistry,computer_science,english,attendance\n\
             1,Avery Lee,90,85,80,95,70,93\n\
             2,Jules Moreno,40,45,50,35,60,130\n",
        )
        .unwrap();

        let db_path = dir.path().join("students.dat");
        let mut session = Session::open(&db_path).unwrap();
        let err = import_csv(&mut session, &csv_path).unwrap_err();
        assert!(err.to_string().contains("line 3"));
        assert!(session.store().is_empty());
        assert!(!db_path.exists());
    }
}

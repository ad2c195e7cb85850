//! Bounded telemetry history with JSONL and CSV export.

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use csv::{Writer, WriterBuilder};
use serde_json::{Map, Value};

use super::NeatError;
use crate::schema::TelemetryEntry;

/// Streaming consumer invoked for every recorded entry.
pub type TelemetrySink = Box<dyn FnMut(&TelemetryEntry) + Send>;

/// Top-level keys exported as a single JSON-encoded CSV cell.
const JSON_CELLS: [&str; 7] = [
    "ops",
    "objectives",
    "speciesAlloc",
    "objAges",
    "objEvents",
    "objImportance",
    "fronts",
];

/// Ring buffer of the most recent telemetry entries.
pub struct TelemetryRecorder {
    entries: VecDeque<TelemetryEntry>,
    capacity: usize,
    sink: Option<TelemetrySink>,
}

impl fmt::Debug for TelemetryRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryRecorder")
            .field("entries", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl TelemetryRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            sink: None,
        }
    }

    pub fn set_sink(&mut self, sink: Option<TelemetrySink>) {
        self.sink = sink;
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn record(&mut self, entry: TelemetryEntry) {
        if let Some(sink) = self.sink.as_mut() {
            sink(&entry);
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &TelemetryEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&TelemetryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// One JSON object per line.
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Header plus one row per entry. Nested records flatten to dotted keys;
    /// list and map fields are JSON-encoded cells.
    pub fn to_csv(&self) -> Result<String, NeatError> {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());
        self.write_rows(&mut writer)?;
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        String::from_utf8(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }

    pub fn write_jsonl(&self, path: impl AsRef<Path>) -> io::Result<()> {
        fs::write(path, self.to_jsonl()?)
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), NeatError> {
        let mut writer = WriterBuilder::new().from_path(path)?;
        self.write_rows(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn write_rows<W: io::Write>(&self, writer: &mut Writer<W>) -> Result<(), NeatError> {
        let rows: Vec<Vec<(String, String)>> = self
            .entries
            .iter()
            .map(|entry| {
                let mut row = Vec::new();
                if let Value::Object(map) = serde_json::to_value(entry)? {
                    flatten("", &map, &mut row)?;
                }
                Ok(row)
            })
            .collect::<Result<_, serde_json::Error>>()?;

        // Columns appear in first-seen order; optional sections may be
        // missing from early rows.
        let mut header: Vec<String> = Vec::new();
        for row in &rows {
            for (key, _) in row {
                if !header.contains(key) {
                    header.push(key.clone());
                }
            }
        }

        writer.write_record(&header)?;
        for row in &rows {
            writer.write_record(header.iter().map(|key| {
                row.iter()
                    .find(|(k, _)| k == key)
                    .map_or("", |(_, v)| v.as_str())
            }))?;
        }
        Ok(())
    }
}

fn flatten(
    prefix: &str,
    map: &Map<String, Value>,
    row: &mut Vec<(String, String)>,
) -> Result<(), serde_json::Error> {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            _ if prefix.is_empty() && JSON_CELLS.contains(&key.as_str()) => {
                row.push((name, serde_json::to_string(value)?));
            }
            Value::Object(inner) => flatten(&name, inner, row)?,
            Value::Null => row.push((name, String::new())),
            Value::String(s) => row.push((name, s.clone())),
            other => row.push((name, other.to_string())),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::schema::{ComplexityStats, DiversityStats, LineageStats, OperatorStat};

    fn entry(generation: usize) -> TelemetryEntry {
        TelemetryEntry {
            generation,
            best: generation as f64,
            species: 2,
            threshold: 3.0,
            epsilon: 0.0,
            diversity: DiversityStats::default(),
            ops: vec![OperatorStat {
                name: "ADD_NODE".into(),
                success: 1.0,
                attempts: 2.0,
            }],
            objectives: vec!["fitness".into()],
            species_alloc: Vec::new(),
            obj_ages: Default::default(),
            obj_events: Vec::new(),
            obj_importance: Default::default(),
            fronts: None,
            hypervolume: None,
            phase: None,
            lineage: LineageStats::default(),
            complexity: Some(ComplexityStats {
                mean_nodes: 4.0,
                ..Default::default()
            }),
            perf: None,
        }
    }

    #[test]
    fn test_ring_buffer_bounded() {
        let mut recorder = TelemetryRecorder::new(3);
        for g in 0..5 {
            recorder.record(entry(g));
        }
        let gens: Vec<usize> = recorder.entries().map(|e| e.generation).collect();
        assert_eq!(gens, vec![2, 3, 4]);
        assert_eq!(recorder.latest().map(|e| e.generation), Some(4));
    }

    #[test]
    fn test_sink_sees_every_entry() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let mut recorder = TelemetryRecorder::new(1);
        recorder.set_sink(Some(Box::new(move |e: &TelemetryEntry| {
            log.lock().unwrap().push(e.generation);
        })));
        for g in 0..3 {
            recorder.record(entry(g));
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_jsonl_lines_parse() {
        let mut recorder = TelemetryRecorder::new(10);
        recorder.record(entry(0));
        recorder.record(entry(1));
        let text = recorder.to_jsonl().unwrap();
        let parsed: Vec<TelemetryEntry> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(parsed, vec![entry(0), entry(1)]);
    }

    #[test]
    fn test_csv_flattening() {
        let mut recorder = TelemetryRecorder::new(10);
        recorder.record(entry(7));
        let text = recorder.to_csv().unwrap();
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert!(header.iter().any(|h| h == "complexity.meanNodes"));
        assert!(header.iter().any(|h| h == "diversity.meanCompat"));
        assert!(header.iter().any(|h| h == "diversity.speciesTurnover"));
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.len(), header.len());
        let cell = |name: &str| {
            let column = header.iter().position(|h| h == name).unwrap();
            row[column].to_string()
        };
        assert_eq!(cell("generation"), "7");
        assert_eq!(cell("complexity.meanNodes"), "4.0");
        let ops: Vec<OperatorStat> = serde_json::from_str(&cell("ops")).unwrap();
        assert_eq!(ops[0].name, "ADD_NODE");
    }

    #[test]
    fn test_file_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = TelemetryRecorder::new(10);
        recorder.record(entry(0));
        let jsonl = dir.path().join("telemetry.jsonl");
        let csv = dir.path().join("telemetry.csv");
        recorder.write_jsonl(&jsonl).unwrap();
        recorder.write_csv(&csv).unwrap();
        assert_eq!(fs::read_to_string(&jsonl).unwrap().lines().count(), 1);
        assert_eq!(fs::read_to_string(&csv).unwrap().lines().count(), 2);
    }
}

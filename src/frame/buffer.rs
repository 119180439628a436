//! Columnar streaming buffer with bounded retention
//!
//! The buffer ingests schema+data packets, keeps every value column the same
//! length, and trims history to a `(max_length, max_delta)` retention window
//! after every mutation. It knows nothing about subscribers or transport:
//! the channel multiplexer owns exactly one buffer and serializes per-view
//! projections out of it.

use super::field::{parse_label_key, Field, FieldFilter, FieldSchema, FieldType};
use super::packet::{BufferOptions, FrameAction, FrameSchema, Packet, PacketInfo, PushMode};
use super::serialize::SerializedFrame;
use crate::{Error, Result};
use serde_json::Value;
use tracing::debug;

/// In-memory, mutable, append/replace columnar table.
#[derive(Debug, Clone)]
pub struct StreamingBuffer {
    /// Value-bearing fields, in the buffer's wide layout
    fields: Vec<Field>,
    /// The raw input schema, as established by the last structural packet
    schema_fields: Vec<FieldSchema>,
    options: BufferOptions,
    push_mode: PushMode,
    /// Distinct label-group keys in first-seen order; group `i` owns the
    /// fixed-size field block starting at `1 + i * templates`
    label_keys: Vec<String>,
    packet_info: PacketInfo,
}

impl StreamingBuffer {
    /// Creates an empty buffer with the given retention options.
    pub fn new(options: BufferOptions) -> Self {
        Self {
            fields: Vec::new(),
            schema_fields: Vec::new(),
            options,
            push_mode: PushMode::Wide,
            label_keys: Vec::new(),
            packet_info: PacketInfo::default(),
        }
    }

    /// Creates a buffer from an initial packet.
    pub fn from_packet(packet: &Packet, options: BufferOptions) -> Result<Self> {
        let mut buffer = Self::new(options);
        buffer.ingest(packet)?;
        Ok(buffer)
    }

    /// Number of retained rows; every field's value array has this length.
    pub fn len(&self) -> usize {
        self.fields.first().map(|f| f.values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn schema_fields(&self) -> &[FieldSchema] {
        &self.schema_fields
    }

    pub fn options(&self) -> BufferOptions {
        self.options
    }

    pub fn push_mode(&self) -> PushMode {
        self.push_mode
    }

    pub fn label_keys(&self) -> &[String] {
        &self.label_keys
    }

    /// Info about the most recent ingest.
    pub fn packet_info(&self) -> PacketInfo {
        self.packet_info
    }

    /// True once any packet (or value push) has been ingested.
    pub fn has_received(&self) -> bool {
        self.packet_info.number > 0
    }

    /// Ingests one schema+data packet.
    ///
    /// A value-array count mismatch against the established field count is
    /// fatal for the packet: the error is returned and buffer state stays
    /// frozen at the last good values.
    pub fn ingest(&mut self, packet: &Packet) -> Result<PacketInfo> {
        let mut schema_changed = false;
        if let Some(schema) = &packet.schema {
            schema_changed = self.apply_schema(schema);
        }

        let fields_before = self.fields.len();
        let (action, rows) = match &packet.data {
            Some(data) => self.ingest_values(&data.values)?,
            None => (FrameAction::Append, 0),
        };
        // a new label group grows the wide layout; downstream consumers must
        // resynchronize with a full frame, not a ragged delta
        let layout_grew = self.fields.len() != fields_before;

        self.packet_info = PacketInfo {
            number: self.packet_info.number + 1,
            action,
            last_rows: rows,
            schema_changed: schema_changed || layout_grew,
        };
        self.trim();
        Ok(self.packet_info)
    }

    /// Appends or replaces values without any schema reconciliation.
    ///
    /// Used for incremental delta packets under an already-established
    /// schema; the same trimming rule applies afterwards.
    pub fn push_values(&mut self, values: Vec<Vec<Value>>) -> Result<PacketInfo> {
        let fields_before = self.fields.len();
        let (action, rows) = self.ingest_values(&values)?;
        self.packet_info = PacketInfo {
            number: self.packet_info.number + 1,
            action,
            last_rows: rows,
            schema_changed: self.fields.len() != fields_before,
        };
        self.trim();
        Ok(self.packet_info)
    }

    /// Columns contributed by the most recent ingest, clamped to what
    /// retention still holds. Used by the multiplexer to build deltas.
    pub fn values_from_last_packet(&self) -> Vec<Vec<Value>> {
        let len = self.len();
        let take = self.packet_info.last_rows.min(len);
        self.fields
            .iter()
            .map(|f| f.values[len - take..].to_vec())
            .collect()
    }

    /// Produces a deep-copied, transport-safe snapshot of current state.
    ///
    /// Fields are filtered by `filter` and rows re-trimmed under `retention`
    /// when given, so a view can request a smaller window than the ingest
    /// buffer keeps (down to `max_length: 0` for an empty error frame).
    pub fn serialize(
        &self,
        filter: Option<&FieldFilter>,
        retention: Option<BufferOptions>,
    ) -> SerializedFrame {
        let options = retention.unwrap_or(self.options);
        let drop = compute_drop(&self.fields, &options);
        let mut fields: Vec<Field> = self
            .fields
            .iter()
            .filter(|f| filter.map_or(true, |flt| flt.matches(&f.schema)))
            .cloned()
            .collect();
        for field in &mut fields {
            field.values.drain(..drop.min(field.values.len()));
        }
        SerializedFrame {
            fields,
            schema_fields: self.schema_fields.clone(),
            push_mode: self.push_mode,
            length: self.len().saturating_sub(drop),
            packet_info: self.packet_info,
            options,
            label_keys: self.label_keys.clone(),
        }
    }

    /// Reconstructs a buffer from a serialized frame, honoring the frame's
    /// own retention options.
    pub fn deserialize(frame: SerializedFrame) -> Result<Self> {
        Self::deserialize_with(frame, None)
    }

    /// Reconstructs a buffer from a serialized frame under a local retention
    /// policy, re-applying the trim in case the payload exceeds it (policies
    /// may differ across process boundaries).
    pub fn deserialize_with(
        frame: SerializedFrame,
        local_options: Option<BufferOptions>,
    ) -> Result<Self> {
        for field in &frame.fields {
            if field.values.len() != frame.length {
                return Err(Error::Serialization(format!(
                    "field '{}' has {} values, frame length is {}",
                    field.name(),
                    field.values.len(),
                    frame.length
                )));
            }
        }
        let options = local_options.unwrap_or(frame.options);
        let mut buffer = Self {
            fields: frame.fields,
            schema_fields: frame.schema_fields,
            options,
            push_mode: frame.push_mode,
            label_keys: frame.label_keys,
            packet_info: frame.packet_info,
        };
        buffer.trim();
        Ok(buffer)
    }

    /// Grows the retention window; retention never shrinks.
    ///
    /// `max_length` takes the larger of the two. `max_delta` takes the
    /// larger, except that a finite request always wins over the unbounded
    /// default, which lets late subscribers with larger windows unlock more
    /// history without losing rows retained for earlier subscribers.
    pub fn resize(&mut self, requested: &BufferOptions) {
        if requested.max_length > self.options.max_length {
            self.options.max_length = requested.max_length;
        }
        if requested.max_delta.is_finite() {
            if self.options.max_delta.is_infinite() {
                self.options.max_delta = requested.max_delta;
            } else if requested.max_delta > self.options.max_delta {
                self.options.max_delta = requested.max_delta;
            }
        }
    }

    fn ingest_values(&mut self, values: &[Vec<Value>]) -> Result<(FrameAction, usize)> {
        if self.schema_fields.is_empty() {
            return Err(Error::InvalidSchema(
                "data arrived before any schema".to_string(),
            ));
        }
        if values.len() != self.schema_fields.len() {
            return Err(Error::ValueCountMismatch {
                expected: self.schema_fields.len(),
                got: values.len(),
            });
        }

        let rows = values.iter().map(Vec::len).max().unwrap_or(0);
        let mut columns: Vec<Vec<Value>> = values
            .iter()
            .map(|col| {
                let mut col = col.clone();
                col.resize(rows, Value::Null);
                col
            })
            .collect();

        if self.push_mode == PushMode::LabelExpansion {
            columns = self.expand_labels(&columns);
        }
        if columns.len() != self.fields.len() {
            return Err(Error::ValueCountMismatch {
                expected: self.fields.len(),
                got: columns.len(),
            });
        }

        let replace = self.options.action == FrameAction::Replace || self.is_empty();
        if replace {
            for (field, column) in self.fields.iter_mut().zip(columns) {
                field.values = column;
            }
            Ok((FrameAction::Replace, rows))
        } else {
            for (field, column) in self.fields.iter_mut().zip(columns) {
                field.values.extend(column);
            }
            Ok((FrameAction::Append, rows))
        }
    }

    /// Returns true when the schema changed structurally.
    fn apply_schema(&mut self, schema: &FrameSchema) -> bool {
        let compatible = !self.schema_fields.is_empty()
            && self.schema_fields.len() == schema.fields.len()
            && self
                .schema_fields
                .iter()
                .zip(&schema.fields)
                .all(|(a, b)| a.matches(b));

        if compatible {
            // soft update: only labels/config metadata refreshed
            for (current, incoming) in self.schema_fields.iter_mut().zip(&schema.fields) {
                current.labels = incoming.labels.clone();
                current.config = incoming.config.clone();
            }
            if self.push_mode == PushMode::Wide {
                for (field, incoming) in self.fields.iter_mut().zip(&schema.fields) {
                    field.schema.labels = incoming.labels.clone();
                    field.schema.config = incoming.config.clone();
                }
            }
            return false;
        }

        let mode = detect_push_mode(schema);
        debug!(
            fields = schema.fields.len(),
            mode = ?mode,
            "structural schema change"
        );
        self.schema_fields = schema.fields.clone();
        self.push_mode = mode;

        match mode {
            PushMode::Wide => {
                let len = self.len();
                let mut old: Vec<Option<Field>> = std::mem::take(&mut self.fields)
                    .into_iter()
                    .map(Some)
                    .collect();
                self.fields = schema
                    .fields
                    .iter()
                    .map(|fs| {
                        let matched = old
                            .iter_mut()
                            .find(|slot| slot.as_ref().is_some_and(|f| f.schema.matches(fs)))
                            .and_then(Option::take);
                        match matched {
                            Some(prev) => Field {
                                schema: fs.clone(),
                                values: prev.values,
                            },
                            None => Field::backfilled(fs.clone(), len),
                        }
                    })
                    .collect();
                self.label_keys.clear();
            }
            PushMode::LabelExpansion => {
                // group fields are rebuilt from scratch; only the shared
                // time field survives (empty) until data arrives
                self.label_keys.clear();
                self.fields = vec![Field::from_schema(schema.fields[1].clone())];
            }
        }
        true
    }

    /// Transforms vertical label+value records into the aligned wide table:
    /// one output row per record, with other groups' cells undefined.
    fn expand_labels(&mut self, columns: &[Vec<Value>]) -> Vec<Vec<Value>> {
        let templates = self.schema_fields.len().saturating_sub(2);
        let rows = columns.first().map(Vec::len).unwrap_or(0);

        // register unseen groups first so back-fill covers historical rows only
        for r in 0..rows {
            let key = label_cell_key(&columns[0][r]);
            if !self.label_keys.iter().any(|k| k == &key) {
                self.add_label_group(&key, templates);
            }
        }

        let width = 1 + self.label_keys.len() * templates;
        let mut out = vec![Vec::with_capacity(rows); width];
        for r in 0..rows {
            let key = label_cell_key(&columns[0][r]);
            let group = self.label_keys.iter().position(|k| k == &key).unwrap_or(0);
            out[0].push(columns[1][r].clone());
            for gi in 0..self.label_keys.len() {
                for t in 0..templates {
                    let cell = if gi == group {
                        columns[2 + t][r].clone()
                    } else {
                        Value::Null
                    };
                    out[1 + gi * templates + t].push(cell);
                }
            }
        }
        out
    }

    fn add_label_group(&mut self, key: &str, templates: usize) {
        let len = self.len();
        let labels = parse_label_key(key);
        for t in 0..templates {
            let mut schema = self.schema_fields[2 + t].clone();
            schema.labels = if labels.is_empty() {
                None
            } else {
                Some(labels.clone())
            };
            self.fields.push(Field::backfilled(schema, len));
        }
        self.label_keys.push(key.to_string());
        debug!(key, groups = self.label_keys.len(), "new label group");
    }

    fn trim(&mut self) -> usize {
        let drop = compute_drop(&self.fields, &self.options);
        if drop > 0 {
            for field in &mut self.fields {
                field.values.drain(..drop.min(field.values.len()));
            }
        }
        drop
    }
}

/// Number of leading rows to discard under the given retention options.
///
/// Row-count and delta trims combine by taking the larger drop. The delta
/// trim keeps the first index whose time lies inside the window; a row
/// sitting exactly on the window edge is kept.
fn compute_drop(fields: &[Field], options: &BufferOptions) -> usize {
    let len = fields.first().map(|f| f.values.len()).unwrap_or(0);
    if len == 0 {
        return 0;
    }
    let mut drop = len.saturating_sub(options.max_length);
    if options.max_delta.is_finite() {
        if let Some(time) = fields.iter().find(|f| f.field_type() == FieldType::Time) {
            if let Some(last) = time.values[len - 1].as_f64() {
                let target = last - options.max_delta;
                let inside = time
                    .values
                    .partition_point(|v| v.as_f64().map_or(true, |t| t < target));
                drop = drop.max(inside.min(len - 1));
            }
        }
    }
    drop
}

fn detect_push_mode(schema: &FrameSchema) -> PushMode {
    match (schema.fields.first(), schema.fields.get(1)) {
        (Some(first), Some(second))
            if first.field_type == FieldType::String
                && first.name.eq_ignore_ascii_case("labels")
                && second.field_type == FieldType::Time =>
        {
            PushMode::LabelExpansion
        }
        _ => PushMode::Wide,
    }
}

fn label_cell_key(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

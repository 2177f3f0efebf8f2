//! StreamLookup: enriches the main stream from an in-memory table.
//!
//! The table is filled from the info hop named by `lookup_stage`. Main rows
//! that arrive before the info stream completes are buffered, then every main
//! row is emitted in arrival order with the looked-up values appended. Rows
//! without a match get the configured defaults, or nulls.
//!
//! Duplicate keys in the reference stream keep the last row seen.

use crate::pipeline::channel::{InputSet, StageOutputs};
use crate::pipeline::error::{PipelineError, PipelineResult, StageResultExt};
use crate::pipeline::stage::{InputSchemas, StageIo, Transform};
use crate::row::{Row, RowKey, RowType, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupKey {
    /// Field in the main stream.
    pub stream_field: String,
    /// Field in the reference stream.
    pub lookup_field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupValue {
    /// Field in the reference stream to copy.
    pub field: String,
    /// Output name; defaults to `field`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename: Option<String>,
    /// Text parsed into the field's type, used when no row matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl LookupValue {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rename: None,
            default: None,
        }
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.rename = Some(name.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamLookupConfig {
    /// Upstream stage whose rows fill the lookup table.
    pub lookup_stage: String,
    #[serde(default)]
    pub keys: Vec<LookupKey>,
    #[serde(default)]
    pub values: Vec<LookupValue>,
    /// Store table entries serialized instead of as live values.
    #[serde(default)]
    pub memory_preservation: bool,
}

/// Key to looked-up values. The compact form stores each entry as an exact
/// boxed slice, dropping the spare capacity a growing `Vec` may carry.
enum LookupTable {
    Plain(HashMap<RowKey, Vec<Value>>),
    Compact(HashMap<RowKey, Box<[Value]>>),
}

impl LookupTable {
    fn new(compact: bool) -> Self {
        if compact {
            LookupTable::Compact(HashMap::new())
        } else {
            LookupTable::Plain(HashMap::new())
        }
    }

    fn len(&self) -> usize {
        match self {
            LookupTable::Plain(map) => map.len(),
            LookupTable::Compact(map) => map.len(),
        }
    }

    fn insert(&mut self, key: RowKey, values: Vec<Value>) {
        match self {
            LookupTable::Plain(map) => {
                map.insert(key, values);
            }
            LookupTable::Compact(map) => {
                map.insert(key, values.into_boxed_slice());
            }
        }
    }

    fn get(&self, key: &RowKey) -> Option<&[Value]> {
        match self {
            LookupTable::Plain(map) => map.get(key).map(Vec::as_slice),
            LookupTable::Compact(map) => map.get(key).map(|values| &values[..]),
        }
    }
}

pub struct StreamLookup {
    name: String,
    config: StreamLookupConfig,
    stream_keys: Vec<usize>,
    lookup_keys: Vec<usize>,
    value_indices: Vec<usize>,
    defaults: Vec<Value>,
    table: LookupTable,
}

impl StreamLookup {
    pub fn new(name: &str, config: StreamLookupConfig) -> Self {
        let table = LookupTable::new(config.memory_preservation);
        Self {
            name: name.to_string(),
            config,
            stream_keys: Vec::new(),
            lookup_keys: Vec::new(),
            value_indices: Vec::new(),
            defaults: Vec::new(),
            table,
        }
    }

    fn load(&mut self, row: &Row) -> PipelineResult<()> {
        let key = RowKey::from_row(row, &self.lookup_keys);
        let values = self
            .value_indices
            .iter()
            .map(|&i| row.value(i).clone())
            .collect();
        self.table.insert(key, values);
        Ok(())
    }

    fn emit(&self, row: Row, outputs: &mut StageOutputs) -> PipelineResult<()> {
        let key = RowKey::from_row(&row, &self.stream_keys);
        let extra = match self.table.get(&key) {
            Some(values) => values.to_vec(),
            None => self.defaults.clone(),
        };
        outputs.put(row.extend(extra))
    }
}

impl Transform for StreamLookup {
    fn prepare(&mut self, inputs: &InputSchemas) -> PipelineResult<RowType> {
        let main = inputs.single_main(&self.name)?;
        let info = inputs.info_from(&self.config.lookup_stage).ok_or_else(|| {
            PipelineError::configuration(
                &self.name,
                format!("no info hop from '{}'", self.config.lookup_stage),
            )
        })?;
        if self.config.keys.is_empty() {
            return Err(PipelineError::configuration(&self.name, "no lookup keys"));
        }

        self.stream_keys.clear();
        self.lookup_keys.clear();
        for key in &self.config.keys {
            let s = main.require(&key.stream_field).config_err(&self.name)?;
            let l = info.require(&key.lookup_field).config_err(&self.name)?;
            let (sf, lf) = (&main.fields()[s], &info.fields()[l]);
            if sf.value_type != lf.value_type {
                return Err(PipelineError::configuration(
                    &self.name,
                    format!(
                        "key '{}' is {} but lookup field '{}' is {}",
                        sf.name, sf.value_type, lf.name, lf.value_type
                    ),
                ));
            }
            self.stream_keys.push(s);
            self.lookup_keys.push(l);
        }

        let mut appended = Vec::with_capacity(self.config.values.len());
        self.value_indices.clear();
        self.defaults.clear();
        for value in &self.config.values {
            let index = info.require(&value.field).config_err(&self.name)?;
            let field = &info.fields()[index];
            let default = match &value.default {
                Some(text) => field.parse(text).config_err(&self.name)?,
                None => Value::Null,
            };
            self.value_indices.push(index);
            self.defaults.push(default);
            appended.push(field.renamed(value.rename.clone().unwrap_or_else(|| value.field.clone())));
        }

        main.append_all(appended).config_err(&self.name)
    }

    fn execute(&mut self, io: &mut StageIo) -> PipelineResult<()> {
        let info = io.take_info(&self.config.lookup_stage).ok_or_else(|| {
            PipelineError::configuration(
                &self.name,
                format!("no info hop from '{}'", self.config.lookup_stage),
            )
        })?;

        // Index 0 is the reference stream, the rest are main inputs.
        let mut receivers = vec![info];
        receivers.extend(io.take_main());
        let mut inputs = InputSet::new(receivers);

        let mut pending: Vec<Row> = Vec::new();
        let mut loaded = false;

        while let Some((index, row)) = inputs.take_any()? {
            if index == 0 {
                self.load(&row)?;
                continue;
            }
            if !inputs.is_finished(0) {
                pending.push(row);
                continue;
            }
            if !loaded {
                loaded = true;
                tracing::debug!(
                    "Stream lookup '{}' loaded {} keys, releasing {} buffered rows",
                    self.name,
                    self.table.len(),
                    pending.len()
                );
                for buffered in pending.drain(..) {
                    self.emit(buffered, &mut io.outputs)?;
                }
            }
            self.emit(row, &mut io.outputs)?;
        }

        for buffered in pending.drain(..) {
            self.emit(buffered, &mut io.outputs)?;
        }
        Ok(())
    }
}

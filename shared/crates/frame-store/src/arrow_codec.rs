//! Arrow IPC stream encoding of training frames.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BinaryArray, BinaryBuilder, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;

use crate::record::TrainingRecord;
use crate::FrameStoreError;

/// The columnar frame schema. `best_seed` is the only nullable column.
pub fn frame_schema() -> SchemaRef {
    let mut fields = vec![
        Field::new("source_file", DataType::Utf8, false),
        Field::new("chunk_id", DataType::Int32, false),
        Field::new("window_start", DataType::Int32, false),
        Field::new("window_end", DataType::Int32, false),
        Field::new("context_length", DataType::Int32, false),
    ];
    for lane in 0..12 {
        fields.push(Field::new(format!("asic_slot_{lane}"), DataType::Int32, false));
    }
    fields.push(Field::new("target_token_id", DataType::Int32, false));
    fields.push(Field::new("best_seed", DataType::Binary, true));
    Arc::new(Schema::new(fields))
}

fn int32_column<'a>(
    batch: &'a RecordBatch,
    index: usize,
) -> Result<&'a Int32Array, FrameStoreError> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<Int32Array>()
        .ok_or_else(|| {
            FrameStoreError::SchemaMismatch(format!("column {index} is not Int32"))
        })
}

/// Read every record from an Arrow IPC stream file, in file order.
pub fn read_arrow_records(path: &Path) -> Result<Vec<TrainingRecord>, FrameStoreError> {
    let file = File::open(path)?;
    let reader = StreamReader::try_new(BufReader::new(file), None)?;
    let mut records = Vec::new();

    for batch in reader {
        let batch = batch?;
        let source_file = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                FrameStoreError::SchemaMismatch("source_file column is not Utf8".to_string())
            })?;
        let chunk_id = int32_column(&batch, 1)?;
        let window_start = int32_column(&batch, 2)?;
        let window_end = int32_column(&batch, 3)?;
        let context_length = int32_column(&batch, 4)?;
        let mut slot_columns = Vec::with_capacity(12);
        for lane in 0..12 {
            slot_columns.push(int32_column(&batch, 5 + lane)?);
        }
        let target_token_id = int32_column(&batch, 17)?;
        let best_seed = batch
            .column(18)
            .as_any()
            .downcast_ref::<BinaryArray>()
            .ok_or_else(|| {
                FrameStoreError::SchemaMismatch("best_seed column is not Binary".to_string())
            })?;

        for row in 0..batch.num_rows() {
            let mut slots = [0i32; 12];
            for (lane, column) in slot_columns.iter().enumerate() {
                slots[lane] = column.value(row);
            }
            let seed = if best_seed.is_null(row) {
                None
            } else {
                let bytes = best_seed.value(row);
                if bytes.is_empty() {
                    None
                } else {
                    Some(bytes.to_vec())
                }
            };
            records.push(
                TrainingRecord {
                    source_file: source_file.value(row).to_string(),
                    chunk_id: chunk_id.value(row),
                    window_start: window_start.value(row),
                    window_end: window_end.value(row),
                    context_length: context_length.value(row),
                    slots,
                    target_token_id: target_token_id.value(row),
                    token_sequence: Vec::new(),
                    best_seed: seed,
                }
                .normalize(),
            );
        }
    }
    Ok(records)
}

/// Serialize the full record list and replace `path` atomically.
pub fn write_arrow_records(
    path: &Path,
    records: &[TrainingRecord],
) -> Result<(), FrameStoreError> {
    let schema = frame_schema();

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(19);
    arrays.push(Arc::new(StringArray::from_iter_values(
        records.iter().map(|r| r.source_file.as_str()),
    )));
    arrays.push(Arc::new(Int32Array::from_iter_values(
        records.iter().map(|r| r.chunk_id),
    )));
    arrays.push(Arc::new(Int32Array::from_iter_values(
        records.iter().map(|r| r.window_start),
    )));
    arrays.push(Arc::new(Int32Array::from_iter_values(
        records.iter().map(|r| r.window_end),
    )));
    arrays.push(Arc::new(Int32Array::from_iter_values(
        records.iter().map(|r| r.context_length),
    )));
    for lane in 0..12 {
        arrays.push(Arc::new(Int32Array::from_iter_values(
            records.iter().map(move |r| r.slots[lane]),
        )));
    }
    arrays.push(Arc::new(Int32Array::from_iter_values(
        records.iter().map(|r| r.target_token_id),
    )));
    let mut seed_builder = BinaryBuilder::new();
    for record in records {
        match &record.best_seed {
            Some(seed) => seed_builder.append_value(seed),
            None => seed_builder.append_null(),
        }
    }
    arrays.push(Arc::new(seed_builder.finish()));

    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let tmp = path.with_extension("arrow.tmp");
    {
        let file = File::create(&tmp)?;
        let mut writer = StreamWriter::try_new(file, schema.as_ref())?;
        writer.write(&batch)?;
        writer.finish()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(target: i32, seed: Option<Vec<u8>>) -> TrainingRecord {
        TrainingRecord {
            source_file: format!("doc_{target}.pdf"),
            chunk_id: target,
            window_start: 0,
            window_end: 64,
            context_length: 64,
            slots: [target; 12],
            target_token_id: target,
            token_sequence: vec![target],
            best_seed: seed,
        }
    }

    #[test]
    fn test_schema_shape() {
        let schema = frame_schema();
        assert_eq!(schema.fields().len(), 19);
        assert_eq!(schema.field(0).name(), "source_file");
        assert_eq!(schema.field(5).name(), "asic_slot_0");
        assert_eq!(schema.field(16).name(), "asic_slot_11");
        assert_eq!(schema.field(17).name(), "target_token_id");
        let seed = schema.field(18);
        assert_eq!(seed.name(), "best_seed");
        assert_eq!(seed.data_type(), &DataType::Binary);
        assert!(seed.is_nullable());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.arrow");
        let records = vec![record(10, None), record(20, Some(vec![0xAA, 0xBB]))];

        write_arrow_records(&path, &records).unwrap();
        let back = read_arrow_records(&path).unwrap();

        assert_eq!(back.len(), 2);
        assert_eq!(back[0].target_token_id, 10);
        assert_eq!(back[0].best_seed, None);
        assert_eq!(back[0].token_sequence, vec![10]);
        assert_eq!(back[1].best_seed, Some(vec![0xAA, 0xBB]));
        assert_eq!(back[1].slots, [20; 12]);
    }

    #[test]
    fn test_replace_is_atomic_over_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.arrow");
        write_arrow_records(&path, &[record(1, None)]).unwrap();
        write_arrow_records(&path, &[record(2, None)]).unwrap();

        let back = read_arrow_records(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].target_token_id, 2);
        assert!(!path.with_extension("arrow.tmp").exists());
    }
}

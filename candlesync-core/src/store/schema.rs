use polars::prelude::*;

/// Partition column. Lives in the directory name, not inside the files.
pub const PARTITION_COLUMN: &str = "date";

/// Column order of the stored dataset, partition column first.
pub const DATASET_COLUMNS: [&str; 9] = [
    "date", "symbol", "open", "high", "low", "close", "volume", "datetime", "timestamp",
];

/// Expected schema for stored candle data
pub struct CandleSchema;

impl CandleSchema {
    /// Schema of one partition file (every column except `date`).
    pub fn file_schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("symbol".into(), DataType::String),
            Field::new("open".into(), DataType::Float64),
            Field::new("high".into(), DataType::Float64),
            Field::new("low".into(), DataType::Float64),
            Field::new("close".into(), DataType::Float64),
            Field::new("volume".into(), DataType::UInt64),
            Field::new("datetime".into(), DataType::Datetime(TimeUnit::Milliseconds, None)),
            Field::new("timestamp".into(), DataType::Int64),
        ])
    }

    /// Schema of the dataset as a reader with partition discovery sees it.
    pub fn dataset_schema() -> Schema {
        let mut fields = vec![Field::new(PARTITION_COLUMN.into(), DataType::Date)];
        fields.extend(Self::file_schema().iter_fields());
        Schema::from_iter(fields)
    }

    /// Validate a partition file's DataFrame against the file schema
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::file_schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}

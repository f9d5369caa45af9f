use std::io::Write;

use super::writer::{MarshalError, MarshalWriter};
use crate::types::GemMetadata;

/// Keys of each record, in the order Bundler's server emits them.
const RECORD_KEYS: usize = 4;

/// Encode `records` as one complete dependency API response and return the
/// underlying writer.
pub fn write_dependencies<W: Write>(
    mut writer: MarshalWriter<W>,
    records: &[GemMetadata],
) -> Result<W, MarshalError> {
    writer.start_array(records.len())?;
    for record in records {
        writer.start_hash(RECORD_KEYS)?;

        writer.symbol("name")?;
        writer.wrapped_string(&record.name)?;
        writer.symbol("number")?;
        writer.wrapped_string(&record.number)?;
        writer.symbol("platform")?;
        writer.wrapped_string(&record.platform)?;

        writer.symbol("dependencies")?;
        writer.start_array(record.dependencies.len())?;
        for dependency in &record.dependencies {
            writer.start_array(2)?;
            writer.wrapped_string(dependency.name())?;
            writer.wrapped_string(dependency.requirement())?;
            writer.end_array()?;
        }
        writer.end_array()?;

        writer.end_hash()?;
    }
    writer.end_array()?;
    writer.finish()
}

/// Encode `records` into a fresh buffer.
pub fn encode_dependencies(records: &[GemMetadata]) -> Result<Vec<u8>, MarshalError> {
    write_dependencies(MarshalWriter::new(Vec::new()), records)
}

//! Versioned model files.
//!
//! A file holds the envelope line `tessera-model <version>` followed by
//! exactly one classifier section.

use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;

use tessera_data::{ModelReader, ModelWriter};
use tracing::{info, instrument};

use crate::classifier::Classifier;
use crate::registry::ModelRegistry;
use crate::ModelError;

/// Current model file format version.
pub const FORMAT_VERSION: u32 = 1;

const MAGIC: &str = "tessera-model";

/// Write the envelope and `model` to `sink`.
///
/// # Errors
///
/// Returns [`ModelError::NotTrained`] for untrained models, or stream errors.
pub fn write_model(model: &dyn Classifier, sink: &mut dyn Write) -> Result<(), ModelError> {
    let mut writer = ModelWriter::new(sink);
    writer.text(&format!("{MAGIC} {FORMAT_VERSION}"))?;
    model.save(&mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Read an envelope and one classifier from `source`.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`ModelError::IncompatibleModelVersion`] | the envelope line is missing or names another version |
/// | [`ModelError::UnknownModelTag`] | a section tag is not registered |
/// | [`ModelError::Stream`] | truncated, malformed or trailing content |
pub fn read_model(source: &mut dyn BufRead) -> Result<Box<dyn Classifier>, ModelError> {
    let mut reader = ModelReader::new(source);
    let envelope = reader.next_line("format envelope")?;
    let expected = format!("{MAGIC} {FORMAT_VERSION}");
    if envelope.trim() != expected {
        return Err(ModelError::IncompatibleModelVersion {
            expected: FORMAT_VERSION,
            found: envelope,
        });
    }
    let model = ModelRegistry::global().open(&mut reader)?;
    reader.expect_end()?;
    Ok(model)
}

/// Save `model` to `path`.
///
/// The file is only written once the whole model has been serialized.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`ModelError::WriteModel`] | the file cannot be written |
/// | Other model errors | From serialization |
#[instrument(skip_all, fields(tag = model.tag(), path = %path.display()))]
pub fn save_model(model: &dyn Classifier, path: &Path) -> Result<(), ModelError> {
    let mut buf = Vec::new();
    write_model(model, &mut buf)?;
    fs::write(path, &buf).map_err(|source| ModelError::WriteModel {
        path: path.to_path_buf(),
        source,
    })?;
    info!(bytes = buf.len(), "model saved");
    Ok(())
}

/// Load a model from `path`.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`ModelError::ReadModel`] | the file cannot be read |
/// | Other model errors | See [`read_model`] |
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_model(path: &Path) -> Result<Box<dyn Classifier>, ModelError> {
    let bytes = fs::read(path).map_err(|source| ModelError::ReadModel {
        path: path.to_path_buf(),
        source,
    })?;
    let model = read_model(&mut bytes.as_slice())?;
    info!(tag = model.tag(), "model loaded");
    Ok(model)
}

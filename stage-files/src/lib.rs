use crate::typedefs::LayerDocument;
use quick_xml::de::Deserializer;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

pub mod compose;
pub mod typedefs;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("The document is violating the expected format, because: {reason}")]
    FormatError { reason: String },

    #[error("Invalid prim name \"{name}\" below {parent}")]
    InvalidPrimName { name: String, parent: String },

    /// A layer stack without a single layer, i.e. no base document and no overrides.
    #[error("Source contains no layers")]
    EmptySource,

    #[error(transparent)]
    XmlError(#[from] quick_xml::DeError),

    /// Represents all other cases of `std::io::Error`.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

pub fn deserialize_layer<T: BufRead>(read: T) -> Result<LayerDocument, StageError> {
    let mut deserializer = Deserializer::from_reader(read);
    Ok(LayerDocument::deserialize(&mut deserializer)?)
}

pub fn parse_layer(text: &str) -> Result<LayerDocument, StageError> {
    let mut deserializer = Deserializer::from_str(text);
    Ok(LayerDocument::deserialize(&mut deserializer)?)
}

pub fn read_layer_file<P: AsRef<Path>>(path: P) -> Result<LayerDocument, StageError> {
    let file = File::open(path.as_ref())?;
    log::trace!("Reading layer {}", path.as_ref().display());
    deserialize_layer(BufReader::new(file))
}

pub mod tshark;

use async_trait::async_trait;
use std::path::Path;

use crate::error::ExtractionError;

pub use self::tshark::TsharkDissector;

/// Forces a protocol decoder onto traffic matching `selector`,
/// e.g. `sctp.port==38412` decoded as `ngap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeHint {
    pub selector: String,
    pub protocol: String,
}

impl DecodeHint {
    pub fn new(selector: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            protocol: protocol.into(),
        }
    }
}

/// NGAP over its registered SCTP port and PFCP over its UDP port.
pub fn default_decode_hints() -> Vec<DecodeHint> {
    vec![DecodeHint::new("sctp.port==38412", "ngap"), DecodeHint::new("udp.port==8805", "pfcp")]
}

#[derive(Debug, Clone)]
pub struct DissectQuery {
    pub display_filter: Option<String>,
    pub decode_as: Vec<DecodeHint>,
    /// Matching packets to read before stopping.
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerView {
    name: String,
    fields: Vec<(String, Option<String>)>,
}

impl LayerView {
    pub fn new(name: impl Into<String>, fields: Vec<(String, Option<String>)>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every field the dissector exposed, with `None` where no textual value exists.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    pub number: u64,
    pub time: String,
    pub length: u64,
    pub summary: String,
    layers: Vec<LayerView>,
}

impl DecodedPacket {
    pub fn new(number: u64, time: String, length: u64, summary: String, layers: Vec<LayerView>) -> Self {
        Self {
            number,
            time,
            length,
            summary,
            layers,
        }
    }

    pub fn layers(&self) -> &[LayerView] {
        &self.layers
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.iter().any(|layer| layer.name == name)
    }
}

#[async_trait]
pub trait Dissector: Send + Sync {
    /// Counts packets in file order, stopping once `ceiling` is reached.
    async fn count_packets(&self, path: &Path, ceiling: usize) -> Result<usize, ExtractionError>;

    async fn dissect(
        &self,
        path: &Path,
        query: &DissectQuery
    ) -> Result<Vec<DecodedPacket>, ExtractionError>;
}

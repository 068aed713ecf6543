pub mod summary;

use log::{ info, warn };
use serde::{ Deserialize, Serialize };
use std::collections::BTreeMap;
use std::path::{ Path, PathBuf };
use std::sync::Arc;
use std::time::Duration;

use crate::dissector::{ DecodeHint, DecodedPacket, DissectQuery, Dissector };
use crate::error::ExtractionError;
use crate::worker::run_with_timeout;

pub use self::summary::CaptureSummary;

/// Arguments of an `analyze_pcap` tool call as sent by the model.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToolInvocation {
    pub display_filter: String,
    #[serde(default)]
    pub field_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketFields {
    pub number: String,
    pub time: String,
    pub summary: String,
    pub matching_fields: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub packets_found: usize,
    pub filter_used: String,
    pub patterns_searched: Option<Vec<String>>,
    pub results: Vec<PacketFields>,
}

/// Keeps the fields whose name contains one of `patterns` (case-insensitive),
/// or every field when no patterns are given. Packets left without fields are
/// dropped; fields without a textual value are skipped.
pub fn select_fields(packets: Vec<DecodedPacket>, patterns: Option<&[String]>) -> Vec<PacketFields> {
    let patterns: Vec<String> = patterns
        .unwrap_or_default()
        .iter()
        .map(|p| p.to_lowercase())
        .collect();

    packets
        .into_iter()
        .filter_map(|packet| {
            let mut matching_fields: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
            for layer in packet.layers() {
                for (name, value) in layer.fields() {
                    let Some(value) = value else {
                        continue;
                    };
                    let lowered = name.to_lowercase();
                    if !patterns.is_empty() && !patterns.iter().any(|p| lowered.contains(p.as_str())) {
                        continue;
                    }
                    matching_fields
                        .entry(layer.name().to_string())
                        .or_default()
                        .insert(name.to_string(), value.to_string());
                }
            }
            if matching_fields.is_empty() {
                return None;
            }
            Some(PacketFields {
                number: packet.number.to_string(),
                time: packet.time.clone(),
                summary: packet.summary.clone(),
                matching_fields,
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct FieldExtractor {
    dissector: Arc<dyn Dissector>,
    decode_as: Vec<DecodeHint>,
    default_limit: usize,
    max_limit: usize,
}

impl FieldExtractor {
    pub fn new(
        dissector: Arc<dyn Dissector>,
        decode_as: Vec<DecodeHint>,
        default_limit: usize,
        max_limit: usize
    ) -> Self {
        Self {
            dissector,
            decode_as,
            default_limit,
            max_limit,
        }
    }

    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_limit).min(self.max_limit)
    }

    async fn dissect_in_worker(
        &self,
        operation: &'static str,
        path: &Path,
        query: DissectQuery,
        timeout: Duration
    ) -> Result<Vec<DecodedPacket>, ExtractionError> {
        let dissector = Arc::clone(&self.dissector);
        let path: PathBuf = path.to_path_buf();
        run_with_timeout(operation, timeout, async move {
            dissector.dissect(&path, &query).await
        }).await
    }

    /// Packets readable on upload. A capture the dissector refuses to read
    /// counts as zero; launch failures and timeouts are still errors.
    pub async fn count_packets(
        &self,
        path: &Path,
        ceiling: usize,
        timeout: Duration
    ) -> Result<usize, ExtractionError> {
        let dissector = Arc::clone(&self.dissector);
        let owned = path.to_path_buf();
        let counted = run_with_timeout("packet counting", timeout, async move {
            dissector.count_packets(&owned, ceiling).await
        }).await;
        match counted {
            Err(ExtractionError::Dissector(detail)) => {
                warn!("No readable packets in {}: {}", path.display(), detail);
                Ok(0)
            }
            other => other,
        }
    }

    pub async fn extract(
        &self,
        path: &Path,
        invocation: &ToolInvocation,
        timeout: Duration
    ) -> Result<ExtractionResult, ExtractionError> {
        let limit = self.effective_limit(invocation.limit);
        let query = DissectQuery {
            display_filter: Some(invocation.display_filter.clone()),
            decode_as: self.decode_as.clone(),
            limit,
        };
        let packets = self.dissect_in_worker("field extraction", path, query, timeout).await?;
        let examined = packets.len();
        let results = select_fields(packets, invocation.field_patterns.as_deref());
        info!(
            "Extraction '{}' kept {} of {} packets (limit {})",
            invocation.display_filter,
            results.len(),
            examined,
            limit
        );

        Ok(ExtractionResult {
            packets_found: results.len(),
            filter_used: invocation.display_filter.clone(),
            patterns_searched: invocation.field_patterns.clone(),
            results,
        })
    }

    pub async fn summarize(
        &self,
        path: &Path,
        sample_limit: usize,
        timeout: Duration
    ) -> Result<CaptureSummary, ExtractionError> {
        let query = DissectQuery {
            display_filter: Some(summary::SUMMARY_FILTER.to_string()),
            decode_as: self.decode_as.clone(),
            limit: sample_limit,
        };
        let packets = self.dissect_in_worker("capture summary", path, query, timeout).await?;
        Ok(CaptureSummary::from_packets(&packets))
    }
}

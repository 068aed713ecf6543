use serde::Serialize;

use crate::dissector::DecodedPacket;

pub const SUMMARY_FILTER: &str = "ngap || nas-5gs || nas-eps || sctp || pfcp || gtp";
const NAS_LAYERS: [&str; 3] = ["nas-5gs", "nas_5gs", "nas-eps"];
const PDU_SESSION_MARKERS: [&str; 2] = ["pdu", "qos"];

/// Condensed view of a capture sent ahead of any tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureSummary {
    pub total_packets: usize,
    pub ngap_packets: usize,
    pub nas_packets: usize,
    pub pdu_session_related: usize,
}

impl CaptureSummary {
    pub fn from_packets(packets: &[DecodedPacket]) -> Self {
        let mut summary = CaptureSummary {
            total_packets: packets.len(),
            ..Default::default()
        };
        for packet in packets {
            let ngap_layers: Vec<_> = packet
                .layers()
                .iter()
                .filter(|layer| layer.name() == "ngap")
                .collect();
            if !ngap_layers.is_empty() {
                summary.ngap_packets += 1;
                let pdu_related = ngap_layers.iter().any(|layer| {
                    layer.fields().any(|(name, _)| {
                        let name = name.to_lowercase();
                        PDU_SESSION_MARKERS.iter().any(|marker| name.contains(marker))
                    })
                });
                if pdu_related {
                    summary.pdu_session_related += 1;
                }
            }
            if NAS_LAYERS.iter().any(|name| packet.has_layer(name)) {
                summary.nas_packets += 1;
            }
        }
        summary
    }

    /// Text appended to the first user turn when a capture is attached.
    pub fn render_context(&self, filename: &str, sample_limit: usize, hint: &str) -> String {
        let mut context = format!("\n\nPCAP file loaded: {}\n", filename);
        context.push_str("Initial scan found:\n");
        context.push_str(
            &format!("- Total packets: {} (first {} analyzed)\n", self.total_packets, sample_limit)
        );
        context.push_str(&format!("- NGAP packets: {}\n", self.ngap_packets));
        context.push_str(&format!("- NAS packets: {}\n", self.nas_packets));
        context.push_str(&format!("- PDU Session related: {}\n\n", self.pdu_session_related));
        context.push_str(hint);
        context.push('\n');
        context
    }
}

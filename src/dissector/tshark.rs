use async_trait::async_trait;
use log::{ debug, info };
use serde_json::{ Map, Value };
use std::path::Path;
use std::process::Stdio;
use tokio::io::{ AsyncBufReadExt, AsyncReadExt, BufReader };
use tokio::process::Command;

use super::{ DecodedPacket, DissectQuery, Dissector, LayerView };
use crate::error::ExtractionError;

/// Drives the `tshark` binary and reads its Elasticsearch (EK) JSON output,
/// one packet per line.
#[derive(Debug, Clone)]
pub struct TsharkDissector {
    binary: String,
}

impl TsharkDissector {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    /// Feeds stdout lines to `on_line` until it returns `false` or output ends.
    /// Stopping early kills the process; a non-zero exit otherwise is a
    /// whole-capture failure carrying tshark's stderr.
    async fn run_streaming<F>(&self, args: &[String], mut on_line: F) -> Result<(), ExtractionError>
        where F: FnMut(&str) -> bool + Send
    {
        debug!("Running {} {}", self.binary, args.join(" "));
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExtractionError::Launch {
                binary: self.binary.clone(),
                source,
            })?;

        let stdout = child.stdout
            .take()
            .ok_or_else(|| ExtractionError::Output("stdout was not captured".into()))?;
        let mut stderr = child.stderr
            .take()
            .ok_or_else(|| ExtractionError::Output("stderr was not captured".into()))?;
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut stopped_early = false;
        while
            let Some(line) = lines
                .next_line().await
                .map_err(|e| ExtractionError::Output(e.to_string()))?
        {
            if !on_line(&line) {
                stopped_early = true;
                break;
            }
        }

        if stopped_early {
            drop(lines);
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Ok(());
        }

        let status = child.wait().await.map_err(|e| ExtractionError::Output(e.to_string()))?;
        let stderr_text = stderr_task.await.unwrap_or_default();
        if !status.success() {
            let detail = stderr_text.trim();
            return Err(
                ExtractionError::Dissector(
                    if detail.is_empty() {
                        format!("tshark exited with {}", status)
                    } else {
                        detail.to_string()
                    }
                )
            );
        }
        Ok(())
    }
}

pub fn dissect_args(path: &Path, query: &DissectQuery) -> Vec<String> {
    let mut args = vec![
        "-r".to_string(),
        path.display().to_string(),
        "-n".to_string(),
        "-T".to_string(),
        "ek".to_string()
    ];
    for hint in &query.decode_as {
        args.push("-d".to_string());
        args.push(format!("{},{}", hint.selector, hint.protocol));
    }
    if let Some(filter) = query.display_filter.as_deref().filter(|f| !f.trim().is_empty()) {
        args.push("-Y".to_string());
        args.push(filter.to_string());
    }
    args
}

fn coerce_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(coerce_value).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(","))
            }
        }
        Value::Object(_) => Some(value.to_string()),
    }
}

fn field_name<'a>(layer: &str, key: &'a str) -> &'a str {
    let underscored = layer.replace('-', "_");
    [layer, underscored.as_str()]
        .iter()
        .find_map(|prefix| key.strip_prefix(*prefix).and_then(|rest| rest.strip_prefix('_')))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(key)
}

fn layer_view(name: &str, body: &Map<String, Value>) -> LayerView {
    let fields = body
        .iter()
        .map(|(key, value)| (field_name(name, key).to_string(), coerce_value(value)))
        .collect();
    LayerView::new(name, fields)
}

/// Parses one EK line. Index lines and anything unparsable yield `None`.
pub fn parse_ek_line(line: &str) -> Option<DecodedPacket> {
    let value: Value = serde_json::from_str(line).ok()?;
    let layers = value.get("layers")?.as_object()?;
    let frame = layers.get("frame").and_then(Value::as_object);
    let frame_field = |name: &str| {
        frame.and_then(|f| f.get(name)).and_then(coerce_value)
    };

    let number = frame_field("frame_frame_number")
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);
    let length = frame_field("frame_frame_len")
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);
    let time = frame_field("frame_frame_time")
        .or_else(|| value.get("timestamp").and_then(coerce_value))
        .unwrap_or_default();
    let protocols = frame_field("frame_frame_protocols").unwrap_or_default();

    let mut views = Vec::new();
    for (name, body) in layers {
        if name == "frame" {
            continue;
        }
        match body {
            Value::Object(map) => views.push(layer_view(name, map)),
            Value::Array(items) => {
                for item in items {
                    if let Value::Object(map) = item {
                        views.push(layer_view(name, map));
                    }
                }
            }
            _ => {}
        }
    }

    let summary = format!("Frame {}: {} bytes, {}", number, length, protocols);
    Some(DecodedPacket::new(number, time, length, summary, views))
}

#[async_trait]
impl Dissector for TsharkDissector {
    async fn count_packets(&self, path: &Path, ceiling: usize) -> Result<usize, ExtractionError> {
        if ceiling == 0 {
            return Ok(0);
        }
        let args = vec![
            "-r".to_string(),
            path.display().to_string(),
            "-n".to_string(),
            "-T".to_string(),
            "fields".to_string(),
            "-e".to_string(),
            "frame.number".to_string()
        ];
        let mut count = 0usize;
        self.run_streaming(&args, |line| {
            if !line.trim().is_empty() {
                count += 1;
            }
            count < ceiling
        }).await?;
        info!("Counted {} packets in {}", count, path.display());
        Ok(count)
    }

    async fn dissect(
        &self,
        path: &Path,
        query: &DissectQuery
    ) -> Result<Vec<DecodedPacket>, ExtractionError> {
        if query.limit == 0 {
            return Ok(Vec::new());
        }
        let args = dissect_args(path, query);
        let limit = query.limit;
        let mut packets = Vec::new();
        self.run_streaming(&args, |line| {
            if let Some(packet) = parse_ek_line(line) {
                packets.push(packet);
            }
            packets.len() < limit
        }).await?;
        Ok(packets)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dissector::default_decode_hints;
    use std::path::PathBuf;

    const NGAP_LINE: &str = r#"{"timestamp":"1690000000123","layers":{"frame":{"frame_frame_number":"4","frame_frame_time":"Jul 22, 2023 04:26:40.123000000 UTC","frame_frame_len":"142","frame_frame_protocols":"eth:ethertype:ip:sctp:ngap:nas-5gs"},"sctp":{"sctp_sctp_srcport":"38412","sctp_sctp_checksum":null},"ngap":[{"ngap_ngap_procedureCode":"29","ngap_ngap_qosFlowIdentifier":["1","2"]},{"ngap_ngap_procedureCode":"15"}],"nas-5gs":{"nas_5gs_nas_5gs_mm_message_type":"0x41"}}}"#;

    #[test]
    fn parses_packet_metadata_and_layers() {
        let packet = parse_ek_line(NGAP_LINE).unwrap();
        assert_eq!(packet.number, 4);
        assert_eq!(packet.length, 142);
        assert!(packet.time.starts_with("Jul 22, 2023"));
        assert_eq!(packet.summary, "Frame 4: 142 bytes, eth:ethertype:ip:sctp:ngap:nas-5gs");

        let names: Vec<&str> = packet.layers().iter().map(|l| l.name()).collect();
        assert_eq!(names, vec!["sctp", "ngap", "ngap", "nas-5gs"]);
        assert!(packet.has_layer("nas-5gs"));
        assert!(!packet.has_layer("frame"));
    }

    #[test]
    fn coerces_field_values_to_text() {
        let packet = parse_ek_line(NGAP_LINE).unwrap();
        let ngap = &packet.layers()[1];
        let fields: Vec<(&str, Option<&str>)> = ngap.fields().collect();
        assert_eq!(
            fields,
            vec![("ngap_procedureCode", Some("29")), ("ngap_qosFlowIdentifier", Some("1,2"))]
        );

        let sctp = &packet.layers()[0];
        let checksum = sctp.fields().find(|(name, _)| *name == "sctp_checksum").unwrap();
        assert_eq!(checksum.1, None);

        let nas = &packet.layers()[3];
        assert_eq!(nas.fields().next().unwrap().0, "nas_5gs_mm_message_type");
    }

    #[test]
    fn skips_index_and_garbage_lines() {
        assert!(parse_ek_line(r#"{"index":{"_index":"packets-2023-07-22","_type":"doc"}}"#).is_none());
        assert!(parse_ek_line("not json").is_none());
        assert!(parse_ek_line("").is_none());
    }

    #[test]
    fn builds_filter_and_decode_arguments() {
        let query = DissectQuery {
            display_filter: Some("ngap".into()),
            decode_as: default_decode_hints(),
            limit: 10,
        };
        let args = dissect_args(&PathBuf::from("/tmp/a.pcap"), &query);
        assert_eq!(
            args,
            vec![
                "-r",
                "/tmp/a.pcap",
                "-n",
                "-T",
                "ek",
                "-d",
                "sctp.port==38412,ngap",
                "-d",
                "udp.port==8805,pfcp",
                "-Y",
                "ngap"
            ]
        );
    }

    #[test]
    fn blank_filters_are_not_passed() {
        let query = DissectQuery {
            display_filter: Some("  ".into()),
            decode_as: Vec::new(),
            limit: 1,
        };
        let args = dissect_args(&PathBuf::from("x.pcap"), &query);
        assert!(!args.contains(&"-Y".to_string()));
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_error() {
        let dissector = TsharkDissector::new("/nonexistent/tshark-binary");
        let err = dissector.count_packets(Path::new("x.pcap"), 10).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Launch { .. }));
    }

    /// Writes an executable shell script standing in for tshark.
    #[cfg(unix)]
    pub(crate) fn stand_in(dir: &Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn ek_packet(number: u64) -> String {
        format!(
            r#"{{"timestamp":"1690000000{number:03}","layers":{{"frame":{{"frame_frame_number":"{number}","frame_frame_len":"96","frame_frame_protocols":"eth:ip:sctp:ngap"}},"ngap":{{"ngap_ngap_procedureCode":"{number}"}}}}}}"#
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dissect_reads_ek_lines_and_stops_at_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut output = String::new();
        for number in 1..=6 {
            output.push_str(r#"{"index":{"_index":"packets-2023-07-22","_type":"doc"}}"#);
            output.push('\n');
            output.push_str(&ek_packet(number));
            output.push('\n');
        }
        let fixture = dir.path().join("ek.jsonl");
        std::fs::write(&fixture, output).unwrap();
        let args_file = dir.path().join("args.txt");
        let binary = stand_in(
            dir.path(),
            "tshark",
            &format!("printf '%s\\n' \"$@\" > '{}'\ncat '{}'", args_file.display(), fixture.display())
        );

        let query = DissectQuery {
            display_filter: Some("ngap".into()),
            decode_as: default_decode_hints(),
            limit: 3,
        };
        let packets = TsharkDissector::new(binary)
            .dissect(Path::new("capture.pcap"), &query).await
            .unwrap();

        let numbers: Vec<u64> = packets.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(packets[2].has_layer("ngap"));
        assert_eq!(packets[2].summary, "Frame 3: 96 bytes, eth:ip:sctp:ngap");

        let args = std::fs::read_to_string(&args_file).unwrap();
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(args, dissect_args(Path::new("capture.pcap"), &query));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn count_stops_at_the_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let binary = stand_in(
            dir.path(),
            "tshark",
            "i=1\nwhile [ $i -le 25 ]; do echo $i; i=$((i+1)); done"
        );
        let dissector = TsharkDissector::new(binary);

        assert_eq!(dissector.count_packets(Path::new("a.pcap"), 10).await.unwrap(), 10);
        assert_eq!(dissector.count_packets(Path::new("a.pcap"), 100).await.unwrap(), 25);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let binary = stand_in(
            dir.path(),
            "tshark",
            "echo 'tshark: \"ngap ==\" is not a valid display filter' >&2\nexit 4"
        );
        let query = DissectQuery {
            display_filter: Some("ngap ==".into()),
            decode_as: Vec::new(),
            limit: 10,
        };
        let err = TsharkDissector::new(binary)
            .dissect(Path::new("a.pcap"), &query).await
            .unwrap_err();
        match err {
            ExtractionError::Dissector(detail) =>
                assert_eq!(detail, "tshark: \"ngap ==\" is not a valid display filter"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_failures_report_the_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let binary = stand_in(dir.path(), "tshark", "exit 2");
        let err = TsharkDissector::new(binary)
            .count_packets(Path::new("a.pcap"), 10).await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Dissector(ref d) if d.starts_with("tshark exited with")));
    }
}

//! Decoder-app instance records
//!
//! Each in-use slice gets one decoder-app instance, named after the slice
//! (`Slice-A` for index 0). The coordinator generates a per-instance INI
//! file before spawning so the child binds the right CAT port and reports
//! telemetry back to us.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Default UDP port the decoder app sends telemetry to
pub const DEFAULT_TELEMETRY_PORT: u16 = 2237;

/// Letter suffix for a slice index (`0 -> 'A'`)
pub fn instance_letter(index: usize) -> char {
    (b'A' + (index as u8 % 26)) as char
}

/// Instance id for a slice index (`0 -> "Slice-A"`)
pub fn instance_id_for_slice(index: usize) -> String {
    format!("Slice-{}", instance_letter(index))
}

/// Bookkeeping for one running decoder-app instance
#[derive(Debug, Clone)]
pub struct DecoderInstance {
    /// Opaque id, also the `--rig-name` of the child
    pub instance_id: String,
    /// Slice the instance serves
    pub slice_index: usize,
    /// UDP port the child sends telemetry to
    pub telemetry_port: u16,
    /// TCP port of the CAT listener the child connects to
    pub cat_port: u16,
    /// Spawned and not yet observed dead
    pub running: bool,
    /// Milliseconds-since-epoch of the last heartbeat, 0 before the first
    pub last_heartbeat_ms: u64,
}

impl DecoderInstance {
    /// New record for a slice about to be bound
    ///
    /// A zero base port means "let the OS pick"; the listener reports the
    /// real port back once bound.
    pub fn new(slice_index: usize, cat_base_port: u16) -> Self {
        let cat_port = if cat_base_port == 0 {
            0
        } else {
            cat_base_port + slice_index as u16
        };
        Self {
            instance_id: instance_id_for_slice(slice_index),
            slice_index,
            telemetry_port: DEFAULT_TELEMETRY_PORT,
            cat_port,
            running: false,
            last_heartbeat_ms: 0,
        }
    }
}

/// Parameters for the generated INI
#[derive(Debug, Clone)]
pub struct IniParams {
    /// Rig name the instance runs under
    pub rig_name: String,
    /// CAT port the instance should dial
    pub cat_port: u16,
    /// Telemetry destination port
    pub udp_port: u16,
    /// Operator callsign
    pub callsign: String,
    /// Operator grid
    pub grid: String,
    /// DAX channel feeding this instance
    pub dax_channel: u8,
}

impl IniParams {
    /// Parameters for an instance under the given config
    pub fn for_instance(config: &Config, instance: &DecoderInstance, dax_channel: u8) -> Self {
        Self {
            rig_name: instance.instance_id.clone(),
            cat_port: instance.cat_port,
            udp_port: instance.telemetry_port,
            callsign: config.station.callsign.clone(),
            grid: config.station.grid.clone(),
            dax_channel,
        }
    }
}

/// Directory holding the per-instance INI for a rig name
pub fn ini_path(base_dir: &Path, rig_name: &str) -> PathBuf {
    base_dir.join(format!("WSJT-X - {rig_name}.ini"))
}

/// Write (or overwrite) the per-instance INI
///
/// The decoder app merges this with its own defaults on startup; only the
/// keys that bind it to this control plane are pinned here.
pub fn write_instance_ini(path: &Path, params: &IniParams) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;

    writeln!(file, "[Configuration]")?;
    writeln!(file, "Rig=Kenwood TS-2000")?;
    writeln!(file, "CATNetworkPort=127.0.0.1:{}", params.cat_port)?;
    writeln!(file, "PTTMethod=CAT")?;
    writeln!(file, "SplitMode=Rig")?;
    writeln!(file, "UDPServerPort={}", params.udp_port)?;
    writeln!(file, "UDPServer=127.0.0.1")?;
    writeln!(file, "AcceptUDPRequests=true")?;
    writeln!(file, "MyCall={}", params.callsign)?;
    writeln!(file, "MyGrid={}", params.grid)?;
    writeln!(file, "SoundInName=DAX Audio RX {}", params.dax_channel)?;
    writeln!(file, "SoundOutName=DAX Audio TX")?;
    writeln!(file)?;
    writeln!(file, "[Widegraph]")?;
    writeln!(file, "BinsPerPixel=4")?;
    writeln!(file, "StartFreq=200")?;
    writeln!(file, "WaterfallAvg=2")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_follow_slice_letters() {
        assert_eq!(instance_id_for_slice(0), "Slice-A");
        assert_eq!(instance_id_for_slice(1), "Slice-B");
        assert_eq!(instance_id_for_slice(7), "Slice-H");
    }

    #[test]
    fn cat_port_offsets_by_index() {
        let inst = DecoderInstance::new(2, 7809);
        assert_eq!(inst.instance_id, "Slice-C");
        assert_eq!(inst.cat_port, 7811);
        assert_eq!(inst.telemetry_port, DEFAULT_TELEMETRY_PORT);
        assert!(!inst.running);
    }

    #[test]
    fn ini_contains_binding_keys() {
        let dir = std::env::temp_dir().join("slicelink-ini-test");
        let path = ini_path(&dir, "Slice-A");
        let params = IniParams {
            rig_name: "Slice-A".into(),
            cat_port: 7809,
            udp_port: 2237,
            callsign: "W1ABC".into(),
            grid: "FN20".into(),
            dax_channel: 1,
        };
        write_instance_ini(&path, &params).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[Configuration]"));
        assert!(text.contains("CATNetworkPort=127.0.0.1:7809"));
        assert!(text.contains("UDPServerPort=2237"));
        assert!(text.contains("AcceptUDPRequests=true"));
        assert!(text.contains("SoundInName=DAX Audio RX 1"));
        assert!(text.contains("MyCall=W1ABC"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}

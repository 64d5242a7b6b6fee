// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use avrlab_core::controller::{LabController, LabState};
use avrlab_core::snapshot::CpuSnapshot;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

pub const SUMMARY_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub schema_version: String,
    pub board: String,
    pub target: String,
    pub firmware: String,
    pub firmware_sha256: String,
    pub state: LabState,
    pub instructions: u64,
    pub frames: u64,
    pub decode_errors: u64,
    pub instructions_per_second: f64,
    pub cpu: Option<CpuSnapshot>,
    pub serial_output: String,
    pub notices: Vec<String>,
}

impl RunSummary {
    pub fn collect(lab: &LabController, firmware: &Path, firmware_sha256: String) -> Self {
        let metrics = lab.metrics();
        Self {
            schema_version: SUMMARY_SCHEMA_VERSION.to_string(),
            board: lab.board().name.clone(),
            target: lab.board().target.to_string(),
            firmware: firmware.display().to_string(),
            firmware_sha256,
            state: lab.state(),
            instructions: metrics.get_instructions(),
            frames: metrics.get_frames(),
            decode_errors: metrics.get_decode_errors(),
            instructions_per_second: metrics.get_ips(),
            cpu: lab.snapshot(),
            serial_output: lab.serial().output(),
            notices: lab.notices().to_vec(),
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create summary directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to encode run summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run summary {:?}", path))
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

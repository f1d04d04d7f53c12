// ap-reboot - reboot access points in tagged Meraki networks
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! The reboot run: tagged networks, their access points, one paced reboot
//! call per device.

use crate::client::ResponseData;
use crate::model::{Device, Network};
use crate::pacing::{Clock, Pacer};
use crate::response;
use anyhow::Result;
use tracing::{debug, info, warn};

pub const DEFAULT_TAG: &str = "ap_reboot";
pub const DEFAULT_MODEL_MATCH: &str = "MR";

/// Dashboard operations the run depends on.
pub trait Dashboard {
    fn networks(&self, org_id: &str) -> Result<Vec<Network>>;
    fn devices(&self, network_id: &str) -> Result<Vec<Device>>;
    fn reboot(&self, network_id: &str, serial: &str) -> Result<ResponseData>;
    fn update_tags(&self, network_id: &str, tags: &[String]) -> Result<ResponseData>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Simulate,
    Commit,
}

impl Mode {
    /// Only the literal `commit` commits; anything else simulates.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            Some("commit") => Mode::Commit,
            _ => Mode::Simulate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Simulate => "simulate",
            Mode::Commit => "commit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub tag: String,
    pub model_match: String,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            tag: DEFAULT_TAG.to_string(),
            model_match: DEFAULT_MODEL_MATCH.to_string(),
        }
    }
}

impl Selection {
    pub fn network(&self, network: &Network) -> bool {
        network.has_tag(&self.tag)
    }

    pub fn device(&self, device: &Device) -> bool {
        device.model_contains(&self.model_match)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub networks_seen: usize,
    pub networks_selected: usize,
    pub devices_selected: usize,
    pub rebooted: usize,
    pub failed: usize,
    pub tags_removed: usize,
}

pub struct Orchestrator<'a, D: Dashboard, C: Clock> {
    dashboard: &'a D,
    pacer: Pacer<C>,
    mode: Mode,
    selection: Selection,
    remove_tag: bool,
    suppress_print: bool,
}

impl<'a, D: Dashboard, C: Clock> Orchestrator<'a, D, C> {
    pub fn new(dashboard: &'a D, pacer: Pacer<C>, mode: Mode, selection: Selection) -> Self {
        Self {
            dashboard,
            pacer,
            mode,
            selection,
            remove_tag: true,
            suppress_print: false,
        }
    }

    pub fn remove_tag(mut self, enabled: bool) -> Self {
        self.remove_tag = enabled;
        self
    }

    pub fn suppress_print(mut self, enabled: bool) -> Self {
        self.suppress_print = enabled;
        self
    }

    /// Walks every network of `org_id`. Listing failures abort the run;
    /// per-device reboot failures are reported and skipped.
    pub fn run(&mut self, org_id: &str) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        info!(
            org_id,
            mode = self.mode.as_str(),
            tag = %self.selection.tag,
            interval_ms = self.pacer.interval().as_millis() as u64,
            "starting reboot run"
        );

        let networks = self.dashboard.networks(org_id)?;
        summary.networks_seen = networks.len();

        for network in &networks {
            if !self.selection.network(network) {
                debug!(network = %network.id, "skipping untagged network");
                continue;
            }
            summary.networks_selected += 1;
            self.process_network(network, &mut summary)?;
        }

        info!(
            networks_seen = summary.networks_seen,
            networks = summary.networks_selected,
            devices = summary.devices_selected,
            rebooted = summary.rebooted,
            failed = summary.failed,
            tags_removed = summary.tags_removed,
            "reboot run finished"
        );
        Ok(summary)
    }

    fn process_network(&mut self, network: &Network, summary: &mut RunSummary) -> Result<()> {
        info!(network = %network.id, name = network.label(), "processing network");
        let devices = self.dashboard.devices(&network.id)?;
        let mut all_ok = true;

        for device in &devices {
            if !self.selection.device(device) {
                continue;
            }
            summary.devices_selected += 1;

            match self.mode {
                Mode::Simulate => info!("Would reboot {}", device.serial),
                Mode::Commit => {
                    if self.reboot(network, device) {
                        summary.rebooted += 1;
                    } else {
                        summary.failed += 1;
                        all_ok = false;
                    }
                }
            }
        }

        if self.mode == Mode::Commit && self.remove_tag && all_ok && self.untag(network) {
            summary.tags_removed += 1;
        }
        Ok(())
    }

    fn reboot(&mut self, network: &Network, device: &Device) -> bool {
        info!(
            name = device.name.as_deref().unwrap_or_default(),
            "Rebooting {}",
            device.serial
        );
        self.pacer.wait();
        match self.dashboard.reboot(&network.id, &device.serial) {
            Ok(resp) => response::handle(resp, "Device", self.suppress_print).is_success(),
            Err(err) => {
                warn!(serial = %device.serial, "reboot request failed: {err:#}");
                false
            }
        }
    }

    fn untag(&self, network: &Network) -> bool {
        let remaining = network.tags_without(&self.selection.tag);
        info!(network = %network.id, "removing tag {}", self.selection.tag);
        match self.dashboard.update_tags(&network.id, &remaining) {
            Ok(resp) => response::handle(resp, "Network", self.suppress_print).is_success(),
            Err(err) => {
                warn!(network = %network.id, "tag update failed: {err:#}");
                false
            }
        }
    }
}

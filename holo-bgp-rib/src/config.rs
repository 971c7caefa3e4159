//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use holo_utils::bgp::AfiSafi;
use holo_utils::policy::DefaultPolicyType;
use serde::{Deserialize, Serialize};

use crate::entry::SelectionCxt;
use crate::error::{ConfigError, Error};

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RibConfig {
    pub local_as: u32,
    pub router_id: Ipv4Addr,
    // Cluster identifier used for route reflection. Defaults to the
    // router-id.
    pub cluster_id: Option<Ipv4Addr>,
    // Delay used to coalesce bursts of updates before running the
    // decision process.
    pub decision_delay_ms: u64,
    // Number of shards of each routing table.
    pub table_shards: usize,
    pub default_import_policy: DefaultPolicyType,
    pub default_export_policy: DefaultPolicyType,
    pub afi_safi: AfiSafiCfgs,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AfiSafiCfgs {
    pub ipv4_unicast: AfiSafiCfg,
    pub ipv6_unicast: AfiSafiCfg,
    pub l3vpn_ipv4_unicast: AfiSafiCfg,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AfiSafiCfg {
    pub path_selection: PathSelectionMode,
    // Maximum number of candidate paths per destination.
    pub max_candidates: usize,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathSelectionMode {
    // Single best path.
    #[default]
    Best,
    // Best path followed by every other candidate (Add-Path).
    AllPaths,
    // Up to N best paths (Add-Path).
    NPaths(u32),
}

// ===== impl RibConfig =====

impl RibConfig {
    pub const DFLT_DECISION_DELAY_MS: u64 = 100;
    pub const DFLT_TABLE_SHARDS: usize = 16;

    // Loads the configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<RibConfig, Error> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path).map_err(|error| {
            let path = path.display().to_string();
            Error::ConfigError(ConfigError::Io(path, error))
        })?;
        RibConfig::parse(&config_str)
    }

    // Parses and validates a TOML configuration.
    pub fn parse(config_str: &str) -> Result<RibConfig, Error> {
        let config: RibConfig = toml::from_str(config_str)
            .map_err(|error| Error::ConfigError(ConfigError::Parse(error)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.local_as == 0 {
            return Err(invalid("local_as", "must be non-zero"));
        }
        if self.router_id.is_unspecified() {
            return Err(invalid("router_id", "must be set"));
        }
        if self.table_shards == 0 {
            return Err(invalid("table_shards", "must be non-zero"));
        }
        for afi_safi in AfiSafi::ALL {
            let cfg = self.afi_safi.get(afi_safi);
            if cfg.max_candidates == 0 {
                return Err(invalid("max_candidates", "must be non-zero"));
            }
            if cfg.path_selection == PathSelectionMode::NPaths(0) {
                return Err(invalid(
                    "path_selection",
                    "n-paths must be non-zero",
                ));
            }
        }
        Ok(())
    }

    // Cluster identifier advertised when reflecting routes.
    pub fn cluster_id(&self) -> Ipv4Addr {
        self.cluster_id.unwrap_or(self.router_id)
    }

    pub fn decision_delay(&self) -> Duration {
        Duration::from_millis(self.decision_delay_ms)
    }

    pub fn selection_cxt(&self, afi_safi: AfiSafi) -> SelectionCxt {
        let cfg = self.afi_safi.get(afi_safi);
        SelectionCxt::new(
            self.local_as,
            cfg.path_selection,
            cfg.max_candidates,
        )
    }
}

impl Default for RibConfig {
    fn default() -> RibConfig {
        RibConfig {
            local_as: 0,
            router_id: Ipv4Addr::UNSPECIFIED,
            cluster_id: None,
            decision_delay_ms: RibConfig::DFLT_DECISION_DELAY_MS,
            table_shards: RibConfig::DFLT_TABLE_SHARDS,
            default_import_policy: DefaultPolicyType::AcceptRoute,
            default_export_policy: DefaultPolicyType::AcceptRoute,
            afi_safi: Default::default(),
        }
    }
}

// ===== impl AfiSafiCfgs =====

impl AfiSafiCfgs {
    pub fn get(&self, afi_safi: AfiSafi) -> &AfiSafiCfg {
        match afi_safi {
            AfiSafi::Ipv4Unicast => &self.ipv4_unicast,
            AfiSafi::Ipv6Unicast => &self.ipv6_unicast,
            AfiSafi::L3VpnIpv4Unicast => &self.l3vpn_ipv4_unicast,
        }
    }
}

// ===== impl AfiSafiCfg =====

impl AfiSafiCfg {
    pub const DFLT_MAX_CANDIDATES: usize = 4096;
}

impl Default for AfiSafiCfg {
    fn default() -> AfiSafiCfg {
        AfiSafiCfg {
            path_selection: PathSelectionMode::Best,
            max_candidates: AfiSafiCfg::DFLT_MAX_CANDIDATES,
        }
    }
}

// ===== helper functions =====

fn invalid(field: &'static str, reason: &'static str) -> Error {
    Error::ConfigError(ConfigError::Invalid(field, reason))
}

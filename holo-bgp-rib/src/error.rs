//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use holo_utils::bgp::AfiSafi;
use tracing::{error, warn, warn_span};

use crate::peer::PeerId;

// RIB errors.
#[derive(Debug)]
pub enum Error {
    // Peer lifecycle
    PeerNotRegistered(PeerId),
    PeerAlreadyRegistered(PeerId),
    TableNotSupported(PeerId, AfiSafi),
    // Route processing
    CandidateLimit(PeerId, usize),
    PeerChannelClosed(PeerId),
    // Other
    ConfigError(ConfigError),
}

// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    Io(String, std::io::Error),
    Parse(toml::de::Error),
    Invalid(&'static str, &'static str),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::PeerNotRegistered(peer_id)
            | Error::PeerAlreadyRegistered(peer_id)
            | Error::PeerChannelClosed(peer_id) => {
                warn_span!("peer", %peer_id).in_scope(|| {
                    warn!("{}", self);
                });
            }
            Error::TableNotSupported(peer_id, afi_safi) => {
                warn_span!("peer", %peer_id).in_scope(|| {
                    warn!(%afi_safi, "{}", self);
                });
            }
            Error::CandidateLimit(peer_id, limit) => {
                warn_span!("peer", %peer_id).in_scope(|| {
                    warn!(%limit, "{}", self);
                });
            }
            Error::ConfigError(error) => {
                error!(error = %with_source(error), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::PeerNotRegistered(..) => {
                write!(f, "update from unregistered peer ignored")
            }
            Error::PeerAlreadyRegistered(..) => {
                write!(f, "peer already registered")
            }
            Error::TableNotSupported(..) => {
                write!(f, "update for unsupported table ignored")
            }
            Error::CandidateLimit(..) => {
                write!(f, "candidate limit reached, path dropped")
            }
            Error::PeerChannelClosed(..) => {
                write!(f, "peer output channel closed")
            }
            Error::ConfigError(..) => {
                write!(f, "invalid configuration")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ConfigError(error) => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(error: ConfigError) -> Error {
        Error::ConfigError(error)
    }
}

// ===== impl ConfigError =====

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, ..) => {
                write!(f, "failed to read {path}")
            }
            ConfigError::Parse(..) => {
                write!(f, "failed to parse configuration")
            }
            ConfigError::Invalid(field, reason) => {
                write!(f, "{field}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(_, error) => Some(error),
            ConfigError::Parse(error) => Some(error),
            ConfigError::Invalid(..) => None,
        }
    }
}

// ===== global functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}

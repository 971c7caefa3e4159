//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod adj_rib_out;
pub mod af;
pub mod attribute;
pub mod config;
pub mod debug;
pub mod entry;
pub mod error;
pub mod events;
pub mod filter;
pub mod peer;
pub mod policy;
pub mod rib;
pub mod selection;
pub mod table;
pub mod tasks;
pub mod tracker;

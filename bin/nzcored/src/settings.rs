/* This file is part of nzcore.
 *
 * Copyright (C) 2024-2026 NewZone Project Contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use serde::Deserialize;
use structopt::StructOpt;
use structopt_toml::StructOptToml;
use url::Url;

pub const CONFIG_FILE: &str = "nzcored_config.toml";
pub const CONFIG_FILE_CONTENTS: &str = include_str!("../nzcored_config.toml");

#[derive(Clone, Debug, Deserialize, StructOpt, StructOptToml)]
#[serde(default)]
#[structopt(name = "nzcored", about = "NewZone peer-to-peer node daemon")]
pub struct Args {
    #[structopt(short, long)]
    /// Configuration file to use
    pub config: Option<String>,

    #[structopt(long, default_value = "~/.local/share/nzcore/env")]
    /// Directory holding the master key, seed, identity keys, and trust store
    pub env_dir: String,

    #[structopt(long, default_value = "0.0.0.0")]
    /// Address to bind the p2p listener on
    pub bind_address: String,

    #[structopt(long, default_value = "9988")]
    /// Port to bind the p2p listener on
    pub bind_port: u16,

    #[structopt(long)]
    /// Bootstrap peer addresses, e.g. tcp://203.0.113.7:9988 (repeatable flag)
    pub seeds: Vec<Url>,

    #[structopt(subcommand)]
    /// Sub command to execute
    pub command: Option<Subcmd>,

    #[structopt(short, parse(from_occurrences))]
    /// Increase verbosity (-vvv supported)
    pub verbose: u8,
}

#[derive(Clone, Debug, Deserialize, StructOpt)]
pub enum Subcmd {
    /// Initialize env/ with a password and an optional mnemonic, then exit
    Init {
        #[structopt(long)]
        /// Use this mnemonic instead of generating a fresh one
        mnemonic: Option<String>,
    },
}

// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use anyhow::Result;
use clap::{Parser, Subcommand};
use sqfs_manifest::{
    Manifest, MatchSummary, Session, collect_file_inodes, match_blocks,
};
use std::path::{Path, PathBuf};
use tabled::builder::Builder;
use tabled::settings::object::Column;
use tabled::settings::{Alignment, Style};
use tracing_subscriber::EnvFilter;

/// Inspect the data blocks of a SquashFS image.
#[derive(Parser)]
struct Opt {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Show a summary of the super block.
    Info {
        /// Path of a SquashFS image.
        image: PathBuf,
    },

    /// List the data blocks and fragment blocks with their SHA-256.
    Blocks {
        /// Path of a SquashFS image.
        image: PathBuf,
    },

    /// List gaps and overlaps between data blocks.
    Diagnostics {
        /// Path of a SquashFS image.
        image: PathBuf,
    },

    /// Count the blocks of the new image that are stored in the old one.
    Compare {
        /// Path of the old image.
        old: PathBuf,

        /// Path of the new image.
        new: PathBuf,
    },
}

fn info_to_string(session: &Session) -> Result<String> {
    let sb = session.superblock();
    let files = collect_file_inodes(session.root())?.len();
    let options = session
        .compressor_options()
        .map_or_else(|| "none".to_string(), |opts| format!("{opts:?}"));

    let rows = [
        ("Block size:", sb.block_size().to_string()),
        (
            "Compressor:",
            format!("{} ({})", sb.compressor(), sb.compressor().id()),
        ),
        ("Compressor options:", options),
        ("Inodes:", sb.inode_count().to_string()),
        ("Regular files:", files.to_string()),
        ("Fragments:", sb.fragment_count().to_string()),
        ("Bytes used:", sb.bytes_used().to_string()),
        ("Inode table:", format!("{:#x}", sb.inode_table_start())),
        ("Directory table:", format!("{:#x}", sb.directory_table_start())),
        ("Flags:", format!("{:?}", sb.flags())),
    ];

    let mut builder = Builder::new();
    for (label, value) in rows {
        builder.push_record([label.to_string(), value]);
    }

    Ok(builder.build().with(Style::empty()).to_string())
}

fn blocks_to_string(manifest: &Manifest) -> String {
    let mut builder = Builder::new();
    builder.push_record(["Offset:", "Size:", "SHA-256:"]);
    for entry in manifest.entries() {
        builder.push_record([
            format!("{:#x}", entry.offset()),
            entry.size().to_string(),
            entry.hash_hex(),
        ]);
    }

    builder
        .build()
        .modify(Column::from(1), Alignment::right())
        .with(Style::empty())
        .to_string()
}

fn diagnostics_to_string(manifest: &Manifest) -> String {
    if manifest.diagnostics().is_empty() {
        return "no gaps or overlaps".to_string();
    }
    manifest
        .diagnostics()
        .iter()
        .map(|diag| diag.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn compare_to_string(summary: &MatchSummary) -> String {
    let mut builder = Builder::new();
    builder.push_record(["", "Blocks:", "Bytes:"]);
    builder.push_record([
        "Reused:".to_string(),
        summary.reused_blocks.to_string(),
        summary.reused_bytes.to_string(),
    ]);
    builder.push_record([
        "New:".to_string(),
        summary.new_blocks.to_string(),
        summary.new_bytes.to_string(),
    ]);

    builder
        .build()
        .modify(Column::from(1), Alignment::right())
        .modify(Column::from(2), Alignment::right())
        .with(Style::empty())
        .to_string()
}

fn load_manifest(image: &Path) -> Result<Manifest> {
    Ok(Session::open(image)?.manifest()?)
}

fn run(opt: &Opt) -> Result<()> {
    match &opt.action {
        Action::Info { image } => {
            let session = Session::open(image)?;
            println!("{}", info_to_string(&session)?);
        }
        Action::Blocks { image } => {
            println!("{}", blocks_to_string(&load_manifest(image)?));
        }
        Action::Diagnostics { image } => {
            println!("{}", diagnostics_to_string(&load_manifest(image)?));
        }
        Action::Compare { old, new } => {
            let old = load_manifest(old)?;
            let new = load_manifest(new)?;
            let matches = match_blocks(old.entries(), new.entries());
            println!(
                "{}",
                compare_to_string(&MatchSummary::from_matches(&matches))
            );
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let opt = Opt::parse();
    run(&opt)
}

//! Command handlers

use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::{debug, info};

use cascview_crypto::ContentKey;
use cascview_formats::Tag;
use cascview_storage::{CancellationToken, CascStorage};

use crate::cli::{Cli, Command};

/// Open the storage described by `cli` and run its command
pub fn run(cli: &Cli) -> Result<()> {
    let config = cli.storage_config()?;
    let progress = |percent: u8, status: Option<&str>| match status {
        Some(status) => info!("[{percent:>3}%] {status}"),
        None => debug!("[{percent:>3}%]"),
    };
    let mut storage = CascStorage::open_with(config, &progress, &CancellationToken::new())
        .context("failed to open storage")?;

    if let Some(listfile) = &cli.listfile {
        let stats = storage
            .load_listfile(listfile)
            .with_context(|| format!("failed to load listfile {}", listfile.display()))?;
        info!(
            "Listfile: {} named, {} by file data id, {} unknown",
            stats.named, stats.aliased, stats.unknown
        );
    }

    let mut out = io::stdout().lock();
    match &cli.command {
        Command::Info => info_cmd(&storage, &mut out),
        Command::Ls { prefix, long } => ls(&storage, prefix.as_deref(), *long, &mut out),
        Command::Cat { path } => {
            let data = storage
                .open_by_name(path)
                .with_context(|| format!("failed to read {path}"))?;
            out.write_all(&data)?;
            Ok(())
        }
        Command::Extract { target, dest } => {
            let written = match ContentKey::from_hex(target) {
                Ok(ckey) if !storage.file_exists(target) => storage.extract_to(&ckey, dest),
                _ => storage.extract_by_name(target, dest),
            }
            .with_context(|| format!("failed to extract {target}"))?;
            info!("Wrote {written} bytes to {}", dest.display());
            Ok(())
        }
        Command::Tags { tag } => tags(&storage, tag.as_deref(), &mut out),
    }?;

    storage.close();
    Ok(())
}

fn info_cmd(storage: &CascStorage, out: &mut impl Write) -> Result<()> {
    let build = storage.build();
    let stats = storage.stats();
    writeln!(out, "Product:        {}", build.product)?;
    writeln!(out, "Version:        {}", build.version.as_deref().unwrap_or("-"))?;
    writeln!(out, "Build name:     {}", build.build_name.as_deref().unwrap_or("-"))?;
    writeln!(out, "Build config:   {}", build.build_key)?;
    writeln!(out, "CDN config:     {}", build.cdn_key)?;
    let (locale, content) = storage.root().flags();
    writeln!(out, "Selection:      {locale} / {content}")?;
    writeln!(out)?;
    writeln!(
        out,
        "Local index:    {} keys in {} files",
        stats.local_index_keys, stats.local_index_files
    )?;
    writeln!(
        out,
        "CDN indices:    {} keys in {} archives",
        stats.cdn_index_keys, stats.cdn_archives
    )?;
    writeln!(
        out,
        "Encoding:       {} content keys ({} lossy)",
        stats.encoding_entries, stats.encoding_lossy
    )?;
    writeln!(
        out,
        "Root:           {} hashes, {} entries",
        stats.root_hashes, stats.root_entries
    )?;
    writeln!(
        out,
        "Tree:           {} files, {} named",
        stats.tree_files, stats.named_files
    )?;
    writeln!(out, "Install:        {} entries", stats.install_entries)?;
    writeln!(out, "Download:       {} entries", stats.download_entries)?;
    Ok(())
}

fn ls(storage: &CascStorage, prefix: Option<&str>, long: bool, out: &mut impl Write) -> Result<()> {
    let folder = match prefix {
        Some(prefix) => storage
            .tree()
            .find_folder(prefix)
            .with_context(|| format!("no folder {prefix}"))?,
        None => storage.tree(),
    };

    let names = storage.names();
    let mut files: Vec<_> = folder
        .walk_files()
        .into_iter()
        .map(|file| (file.path(names), file))
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));

    for (path, file) in files {
        if long {
            writeln!(out, "{} {:>9} {path}", file.content_key(), file.file_data_id())?;
        } else {
            writeln!(out, "{path}")?;
        }
    }
    Ok(())
}

fn tags(storage: &CascStorage, tag: Option<&str>, out: &mut impl Write) -> Result<()> {
    if let Some(tag) = tag {
        for entry in storage.install_entries(tag) {
            writeln!(out, "install  {} {:>10} {}", entry.content_key, entry.size, entry.name)?;
        }
        for entry in storage.download_entries(tag) {
            writeln!(out, "download {} {:>10}", entry.encoding_key, entry.size)?;
        }
        return Ok(());
    }

    let mut print = |manifest: &str, tags: &[Tag], entries: usize| -> io::Result<()> {
        for tag in tags {
            let count = tag.indices(entries).count();
            writeln!(out, "{manifest:<8} {:<16} {:<14} {count}", tag.name, format!("{:?}", tag.tag_type))?;
        }
        Ok(())
    };
    if let Some(install) = storage.install_manifest() {
        print("install", &install.tags, install.entries.len())?;
    }
    if let Some(download) = storage.download_manifest() {
        print("download", &download.tags, download.entries.len())?;
    }
    Ok(())
}

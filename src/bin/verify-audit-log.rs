use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, Command};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info};

use integrity_ledger::anchor::audit_local_anchors;
use integrity_ledger::audit::verify::{detect_sequence_gaps, find_tampered_entries};
use integrity_ledger::audit::{verify_chain, LedgerEntry, LedgerStore, Verdict};
use integrity_ledger::database::Database;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("verify-audit-log")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Verify integrity ledger hash chain offline")
        .arg(
            Arg::new("database")
                .short('d')
                .long("database")
                .value_name("URL")
                .help("SQLite database URL, e.g. sqlite://ledger.db")
                .required(true),
        )
        .arg(
            Arg::new("anchors")
                .short('a')
                .long("anchors")
                .value_name("PATH")
                .help("Local anchor file to cross-check against the chain"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose output"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose")
                .help("Suppress output except errors"),
        )
        .get_matches();

    let database_url = matches
        .get_one::<String>("database")
        .ok_or_else(|| anyhow!("--database is required"))?;
    let anchors = matches.get_one::<String>("anchors");
    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    let level = if quiet {
        tracing::Level::ERROR
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(e) = verify_ledger(database_url, anchors.map(String::as_str), verbose).await {
        error!("Audit ledger verification failed: {}", e);
        std::process::exit(1);
    }

    if !quiet {
        println!("✓ Audit ledger verification completed successfully");
    }

    Ok(())
}

async fn verify_ledger(database_url: &str, anchors: Option<&str>, verbose: bool) -> Result<()> {
    info!("Verifying audit ledger: {}", database_url);

    let database = Database::connect_existing(database_url).await?;
    let store = LedgerStore::new(database.clone());
    let chain = store.read_chain().await?;
    let all = store.read_all().await?;
    database.close().await;

    if verbose {
        println!(
            "Loaded {} chain entries ({} forensic)",
            chain.len(),
            all.len() - chain.len()
        );
    }

    match verify_chain(&chain) {
        Verdict::Valid { checked_count } => {
            if verbose {
                println!("✓ Hash chain integrity verified ({} entries)", checked_count);
            }
        }
        broken @ Verdict::Broken { .. } => {
            let tampered = find_tampered_entries(&chain);
            if !tampered.is_empty() {
                eprintln!("Entries failing their own fingerprint: {:?}", tampered);
            }
            return Err(anyhow!(broken.summary()));
        }
    }

    if let Some(path) = anchors {
        let audit = audit_local_anchors(Path::new(path), &chain).await?;
        if !audit.is_clean() {
            for missing in &audit.missing {
                eprintln!(
                    "Anchored head {} (line {}, {}) no longer exists in the chain",
                    missing.record.head_fingerprint, missing.line, missing.record.timestamp
                );
            }
            return Err(anyhow!(
                "{} of {} anchored heads are missing from the chain",
                audit.missing.len(),
                audit.checked
            ));
        }
        if verbose {
            println!("✓ All {} anchored heads found in the chain", audit.checked);
        }
    }

    if verbose {
        print_summary(&chain, &all);
    }

    Ok(())
}

fn print_summary(chain: &[LedgerEntry], all: &[LedgerEntry]) {
    let (first, last) = match (chain.first(), chain.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            println!("\nLedger is empty");
            return;
        }
    };

    println!("\nAudit Ledger Summary:");
    println!("  Chain entries: {}", chain.len());
    println!("  First entry: {}", first.timestamp);
    println!("  Last entry: {}", last.timestamp);
    println!("  Head fingerprint: {}", last.fingerprint.as_deref().unwrap_or("none"));

    let gaps = detect_sequence_gaps(all);
    if !gaps.is_empty() {
        println!("⚠ Found {} sequence gaps:", gaps.len());
        for gap in gaps {
            println!("  after #{} next is #{}", gap.after_sequence, gap.next_sequence);
        }
    }

    let out_of_order = chain
        .windows(2)
        .filter(|pair| pair[1].timestamp < pair[0].timestamp)
        .count();
    if out_of_order > 0 {
        println!("⚠ {} entries carry a timestamp older than their predecessor", out_of_order);
    }

    let mut actions = BTreeMap::new();
    for entry in all {
        *actions.entry(entry.action.as_str()).or_insert(0usize) += 1;
    }
    println!("\nAction distribution:");
    for (action, count) in actions {
        println!("  {}: {}", action, count);
    }
}

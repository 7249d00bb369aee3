//! # CLI - ShelfDB Interactive Shell
//!
//! A REPL over a ShelfDB store. Reads commands from stdin, runs them against
//! the store and prints results to stdout; logs go to stderr. Works
//! interactively or with commands piped through stdin.
//!
//! ## Commands
//!
//! ```text
//! INSERT {json}           Store a document, print its id
//! GET id                  Print a document (or "(nil)")
//! FIND field value        Ids whose integer field equals value
//! RANGE field lo hi       Ids with lo <= field < hi
//! INDEX field             Whole index on field, in order
//! FLUSH                   Merge pending index entries
//! STATS                   Print store counters as JSON
//! EXIT / QUIT             Close the store and stop
//! ```
//!
//! ## Configuration
//!
//! ```text
//! SHELF_ROOT             Store directory            (default: "./shelf")
//! SHELF_LOCK_TIMEOUT_MS  Lock wait, 0 = forever     (default: 5000)
//! SHELF_WAL_SYNC         fsync every WAL append     (default: "true")
//! SHELF_AUTO_FLUSH       Flush at N pending entries (default: 0 = never)
//! RUST_LOG               Log filter                 (default: "warn")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ SHELF_ROOT=/tmp/shelf cargo run -p cli
//! ShelfDB started (root=/tmp/shelf, next_id=0, pending=0)
//! > INSERT {"name": "ada", "age": 36}
//! 0
//! > FLUSH
//! OK (1 entries)
//! > FIND age 36
//! 0
//! (1 ids)
//! > EXIT
//! bye
//! ```

use anyhow::{bail, Context, Result};
use config::StoreConfig;
use pending::{DocId, Document};
use std::io::{self, BufRead, Write};
use store::Store;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// What the loop should do after a command.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let config = StoreConfig::from_env();
    let store = Store::open(config.clone())
        .with_context(|| format!("failed to open store at {}", config.root.display()))?;
    info!(root = %config.root.display(), "shell ready");

    println!(
        "ShelfDB started (root={}, next_id={}, pending={})",
        config.root.display(),
        store.allocator().watermark(),
        store.pending_len()
    );
    println!("Commands: INSERT {{json}} | GET id | FIND field value | RANGE field lo hi");
    println!("          INDEX field | FLUSH | STATS | EXIT");

    let stdin = io::stdin();
    let stdout = io::stdout();
    run(store, stdin.lock(), stdout.lock())
}

/// Runs commands from `input` until EXIT or end of input, then closes the
/// store.
fn run<R: BufRead, W: Write>(mut store: Store, input: R, mut out: W) -> Result<()> {
    write!(out, "> ")?;
    out.flush()?;

    for line in input.lines() {
        let line = line?;
        let flow = execute(&mut store, line.trim(), &mut out)?;
        if flow == Flow::Exit {
            break;
        }
        write!(out, "> ")?;
        out.flush()?;
    }

    store.close()
}

/// Runs one command line. Command failures are printed as `ERR ...`; only
/// failures to write the output are returned.
fn execute<W: Write>(store: &mut Store, line: &str, out: &mut W) -> Result<Flow> {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };
    if cmd.is_empty() {
        return Ok(Flow::Continue);
    }

    let result = match cmd.to_uppercase().as_str() {
        "INSERT" => insert(store, rest, out),
        "GET" => get(store, rest, out),
        "FIND" => find(store, rest, out),
        "RANGE" => range(store, rest, out),
        "INDEX" => index(store, rest, out),
        "FLUSH" => flush(store, out),
        "STATS" => stats(store, out),
        "EXIT" | "QUIT" => {
            writeln!(out, "bye")?;
            return Ok(Flow::Exit);
        }
        other => {
            writeln!(out, "unknown command: {}", other)?;
            return Ok(Flow::Continue);
        }
    };

    if let Err(e) = result {
        writeln!(out, "ERR {:#}", e)?;
    }
    Ok(Flow::Continue)
}

fn insert<W: Write>(store: &mut Store, rest: &str, out: &mut W) -> Result<()> {
    if rest.is_empty() {
        bail!("usage: INSERT {{json object}}");
    }
    let doc: Document = serde_json::from_str(rest).context("expected a JSON object")?;
    let id = store.insert(doc)?;
    writeln!(out, "{}", id)?;
    Ok(())
}

fn get<W: Write>(store: &Store, rest: &str, out: &mut W) -> Result<()> {
    let id: DocId = rest.parse().context("usage: GET id")?;
    match store.get(id)? {
        Some(doc) => writeln!(out, "{}", serde_json::to_string(&doc)?)?,
        None => writeln!(out, "(nil)")?,
    }
    Ok(())
}

fn find<W: Write>(store: &Store, rest: &str, out: &mut W) -> Result<()> {
    let [field, value] = args::<2>(rest, "usage: FIND field value")?;
    let value: i64 = value.parse().context("value must be an integer")?;
    print_ids(out, &store.find(field, value)?)
}

fn range<W: Write>(store: &Store, rest: &str, out: &mut W) -> Result<()> {
    let [field, lo, hi] = args::<3>(rest, "usage: RANGE field lo hi")?;
    let lo: i64 = lo.parse().context("lo must be an integer")?;
    let hi: i64 = hi.parse().context("hi must be an integer")?;
    print_ids(out, &store.range(field, lo..hi)?)
}

fn index<W: Write>(store: &Store, rest: &str, out: &mut W) -> Result<()> {
    let [field] = args::<1>(rest, "usage: INDEX field")?;
    print_ids(out, &store.index_ids(field)?)
}

fn flush<W: Write>(store: &mut Store, out: &mut W) -> Result<()> {
    let n = store.flush().context("flush failed")?;
    writeln!(out, "OK ({} entries)", n)?;
    Ok(())
}

fn stats<W: Write>(store: &Store, out: &mut W) -> Result<()> {
    let stats = store.stats()?;
    writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
    Ok(())
}

/// Splits `rest` into exactly `N` whitespace-separated arguments.
fn args<'a, const N: usize>(rest: &'a str, usage: &str) -> Result<[&'a str; N]> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    match <[&str; N]>::try_from(parts) {
        Ok(args) => Ok(args),
        Err(_) => bail!("{}", usage),
    }
}

fn print_ids<W: Write>(out: &mut W, ids: &[DocId]) -> Result<()> {
    if ids.is_empty() {
        writeln!(out, "(empty)")?;
        return Ok(());
    }
    let line: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    writeln!(out, "{}", line.join(" "))?;
    writeln!(out, "({} ids)", ids.len())?;
    Ok(())
}

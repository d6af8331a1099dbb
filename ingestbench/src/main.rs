//! The `ingestbench` command line tool.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    ingestbench::cli::execute()
}

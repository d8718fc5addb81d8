use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use bptdb::common::{EngineConfig, DEFAULT_BUFFER_POOL_SIZE, DEFAULT_DB_PATH, DEFAULT_LRUK_K};
use bptdb::engine::Engine;
use bptdb::protocol::Dispatcher;

#[derive(Parser, Debug)]
#[command(
    name = "bptdb",
    about = "Disk-resident B+Tree key-value store driven over stdin/stdout"
)]
struct Args {
    /// Store file, created if missing
    #[arg(long, default_value = DEFAULT_DB_PATH)]
    db: PathBuf,
    /// Number of pages held in the buffer pool
    #[arg(long, default_value_t = DEFAULT_BUFFER_POOL_SIZE)]
    pool_size: usize,
    /// K of the LRU-K replacement policy
    #[arg(long, default_value_t = DEFAULT_LRUK_K)]
    lru_k: usize,
    /// Log engine activity to stderr
    #[arg(long)]
    verbose: bool,
    /// Print the record count and key bounds of the store, then exit
    #[arg(long, conflicts_with = "join")]
    info: bool,
    /// Join the store with another store file on equal keys, then exit
    #[arg(long, value_name = "OTHER_DB", requires = "join_output")]
    join: Option<PathBuf>,
    /// Where the join writes its `key,value,key,value` lines
    #[arg(long, value_name = "PATH", requires = "join")]
    join_output: Option<PathBuf>,
}

impl Args {
    fn engine_config(&self, db: PathBuf) -> EngineConfig {
        EngineConfig::new(db)
            .with_pool_size(self.pool_size)
            .with_lru_k(self.lru_k)
    }
}

fn print_info(engine: &Engine) -> bptdb::Result<()> {
    let info = engine.table_info()?;
    let mut stdout = io::stdout().lock();
    match info.key_range() {
        Some((min, max)) => writeln!(
            stdout,
            "records {}, min {}, max {}.",
            info.records, min, max
        )?,
        None => writeln!(stdout, "records 0.")?,
    }
    stdout.flush()?;
    Ok(())
}

fn run_join(
    engine: &Engine,
    other_db: PathBuf,
    output: PathBuf,
    args: &Args,
) -> bptdb::Result<()> {
    let other = Engine::open(&args.engine_config(other_db))?;
    let mut writer = BufWriter::new(File::create(&output)?);
    engine.join(&other, &mut writer)?;
    other.close()
}

fn run(args: Args) -> bptdb::Result<()> {
    let mut engine = Engine::open(&args.engine_config(args.db.clone()))?;

    if args.info {
        print_info(&engine)?;
        return engine.close();
    }
    if let (Some(other_db), Some(output)) = (args.join.clone(), args.join_output.clone()) {
        run_join(&engine, other_db, output, &args)?;
        return engine.close();
    }

    let outcome = {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut dispatcher = Dispatcher::new(
            &mut engine,
            stdin.lock(),
            BufWriter::new(stdout.lock()),
            io::stderr(),
        );
        dispatcher.run()?
    };

    info!("stopping on {:?}", outcome);
    engine.close()
}

fn main() -> ExitCode {
    let args = Args::parse();
    if args.verbose {
        log_init::init();
    }

    if args.pool_size < 8 || args.lru_k == 0 {
        eprintln!("--pool-size must be at least 8 and --lru-k at least 1");
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {}", e);
            eprintln!("bptdb: {}", e);
            ExitCode::FAILURE
        }
    }
}

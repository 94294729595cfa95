use std::path::{Path, PathBuf};
use std::process;

use argh::FromArgs;
use log::{error, info};
use rayon::prelude::*;

use semcooc::aggregate::BpeAggregator;
use semcooc::config::{PipelineConfig, DEFAULT_BATCH_SIZE, DEFAULT_MAX_PIECES};
use semcooc::convert::{bin_to_txt, txt_to_bin};
use semcooc::dump::{count_dump, DumpFormat};
use semcooc::error::{require_input, CoocError, Result};
use semcooc::merge::merge_shard_dir;
use semcooc::pieces::PieceTable;
use semcooc::reweight::Reweighting;
use semcooc::table::CooccurrenceTable;
use semcooc::vocab::Vocab;


#[derive(FromArgs)]
/// build GloVe co-occurrence tables from language model signal dumps
struct SemCooc {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Count(Count),
    Merge(Merge),
    Aggregate(Aggregate),
    TxtToBin(TxtToBin),
    BinToTxt(BinToTxt),
}

#[derive(FromArgs)]
/// count one co-occurrence shard per dump file
#[argh(subcommand, name = "count")]
struct Count {
    /// dump format, mlm or san
    #[argh(option)]
    format: DumpFormat,

    /// number of ranked candidates, and positional distance for san dumps
    #[argh(option, default = "5")]
    window_size: usize,

    /// weight candidates by score over the top score
    #[argh(switch)]
    divide: bool,

    /// weight candidates by reciprocal rank
    #[argh(switch)]
    reciprocal: bool,

    /// directory for the shard tables
    #[argh(positional)]
    output: PathBuf,

    /// dump files
    #[argh(positional)]
    input: Vec<PathBuf>,
}

#[derive(FromArgs)]
/// sum every shard table of a directory into one
#[argh(subcommand, name = "merge")]
struct Merge {
    /// directory of shard tables
    #[argh(positional)]
    shard_dir: PathBuf,

    /// merged table
    #[argh(positional)]
    output: PathBuf,
}

#[derive(FromArgs)]
/// lift a sub-word table to whole words
#[argh(subcommand, name = "aggregate")]
struct Aggregate {
    /// word vocabulary
    #[argh(option)]
    vocab: PathBuf,

    /// word to pieces table
    #[argh(option)]
    pieces: PathBuf,

    /// candidate word pairs with counts
    #[argh(option)]
    word_pairs: PathBuf,

    /// multiplier for words made of several pieces
    #[argh(option, default = "1.0")]
    scale: f64,

    /// merged sub-word table
    #[argh(positional)]
    input: PathBuf,

    /// word table
    #[argh(positional)]
    output: PathBuf,
}

#[derive(FromArgs)]
/// convert a text table to binary records
#[argh(subcommand, name = "txt2bin")]
struct TxtToBin {
    /// word vocabulary
    #[argh(option)]
    vocab: PathBuf,

    /// text table
    #[argh(positional)]
    input: PathBuf,

    /// binary table
    #[argh(positional)]
    output: PathBuf,
}

#[derive(FromArgs)]
/// convert binary records to a text table
#[argh(subcommand, name = "bin2txt")]
struct BinToTxt {
    /// word vocabulary
    #[argh(option)]
    vocab: PathBuf,

    /// binary table
    #[argh(positional)]
    input: PathBuf,

    /// text table
    #[argh(positional)]
    output: PathBuf,
}

fn shard_output(out_dir: &Path, dump: &Path) -> Result<PathBuf> {
    let name = dump
        .file_name()
        .ok_or_else(|| CoocError::Config(format!("{} is not a file", dump.display())))?;
    let mut name = name.to_os_string();
    name.push(".coo");
    Ok(out_dir.join(name))
}

fn count(args: Count) -> Result<()> {
    let reweighting = Reweighting::from_flags(args.divide, args.reciprocal)?;
    let config = PipelineConfig::new(
        args.window_size,
        reweighting,
        rayon::current_num_threads(),
        1.0,
        DEFAULT_BATCH_SIZE,
        DEFAULT_MAX_PIECES,
    )?;
    if args.input.is_empty() {
        return Err(CoocError::Config("need at least one dump file".into()));
    }
    for path in args.input.iter() {
        require_input(path)?;
    }
    std::fs::create_dir_all(&args.output).map_err(|e| CoocError::io(&args.output, e))?;
    info!("Counting {} shards, window {}, {}", args.input.len(), config.window_size, config.reweighting);

    let timer = howlong::ProcessCPUTimer::new();
    args.input.par_iter().try_for_each(|dump| -> Result<()> {
        let out_path = shard_output(&args.output, dump)?;
        let (table, _stats) = count_dump(dump, args.format, config.window_size, config.reweighting)?;
        table.write_text(&out_path)
    })?;
    info!("Counted all shards {}", timer.elapsed());
    Ok(())
}

fn aggregate(args: Aggregate) -> Result<()> {
    let vocab = Vocab::load(&args.vocab)?;
    let pieces = PieceTable::load(&args.pieces)?;
    let mut aggregator = BpeAggregator::new(&pieces, args.scale)?;
    require_input(&args.word_pairs)?;
    let sub = CooccurrenceTable::read_text(&args.input)?;
    let (words, stats) = aggregator.aggregate(&vocab, &args.word_pairs, &sub)?;
    info!("{:?}", stats);
    words.write_text(&args.output)
}

fn run(args: SemCooc) -> Result<()> {
    match args.command {
        Command::Count(args) => count(args),
        Command::Merge(args) => merge_shard_dir(&args.shard_dir, &args.output).map(|_| ()),
        Command::Aggregate(args) => aggregate(args),
        Command::TxtToBin(args) => {
            let vocab = Vocab::load(&args.vocab)?;
            txt_to_bin(&vocab, &args.input, &args.output).map(|_| ())
        },
        Command::BinToTxt(args) => {
            let vocab = Vocab::load(&args.vocab)?;
            bin_to_txt(&vocab, &args.input, &args.output).map(|_| ())
        },
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: SemCooc = argh::from_env();
    if let Err(err) = run(args) {
        error!("{}", err);
        process::exit(1);
    }
}

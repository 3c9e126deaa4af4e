use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use pfordelta::config::Settings;
use pfordelta::BlockReader;
use pfordelta::BlockSink;
use pfordelta::BlockSource;
use pfordelta::BlockWriter;
use pfordelta::CompressedBlock;
use pfordelta::PForDelta;
use pfordelta::SkipIndexReader;
use pfordelta::SkipIndexWriter;
use pfordelta::StreamSink;
use pfordelta::StreamSource;
use pfordelta::WidthPolicy;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("codec error: {0}")]
    Codec(#[from] pfordelta::Error),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid input value '{token}': {source}")]
    InvalidValue {
        token: String,
        source: std::num::ParseIntError,
    },
    #[error("index file describes {0} elements, too many for this platform")]
    TooManyElements(u64),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogOutputFormat {
    Json,
    Pretty,
}

/// Command line arguments for the pfordelta tool.
#[derive(Debug, Parser)]
#[clap(name = "pfordelta", version)]
struct CliArgs {
    /// Optional path to the configuration file. If not provided, defaults
    /// and `PFORDELTA_` environment variables are used.
    #[clap(short = 'c', long, global = true, required = false)]
    config: Option<PathBuf>,

    #[clap(short = 'o', long = "output-format", global = true, default_value = "pretty")]
    output_format: Option<LogOutputFormat>,

    #[clap(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Compress whitespace separated integers into a block stream and a
    /// skip index
    Encode(EncodeArgs),
    /// Print the integers of a block stream, optionally starting at an
    /// element found through the skip index
    Decode(DecodeArgs),
    /// Print the layout of every block in a stream
    Inspect(InspectArgs),
}

#[derive(Debug, Args)]
struct EncodeArgs {
    /// Text file with the values; standard input when omitted.
    #[clap(long)]
    input: Option<PathBuf>,
    /// Where to write the block stream.
    #[clap(long)]
    stream: PathBuf,
    /// Where to write the skip index.
    #[clap(long)]
    index: PathBuf,
}

#[derive(Debug, Args)]
struct DecodeArgs {
    /// The block stream.
    #[clap(long)]
    stream: PathBuf,
    /// The skip index written together with the stream.
    #[clap(long)]
    index: PathBuf,
    /// Position of the first element to print.
    #[clap(long, default_value_t = 0)]
    from: u64,
}

#[derive(Debug, Args)]
struct InspectArgs {
    /// The block stream.
    #[clap(long)]
    stream: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let pretty = matches!(args.output_format, Some(LogOutputFormat::Pretty));
    pfordelta::logging::setup_logging(pfordelta::logging::DEFAULT_DIRECTIVES, pretty);

    let settings = Settings::new(args.config)?;
    tracing::debug!(
        block_size = settings.codec.block_size,
        width_policy = %settings.codec.width_policy,
        mark_interval = settings.index.mark_interval.get(),
        "loaded settings"
    );

    let result = match args.command {
        CliCommand::Encode(args) => encode(&settings, &args),
        CliCommand::Decode(args) => decode(&settings, &args),
        CliCommand::Inspect(args) => inspect(&settings, &args),
    };
    if let Err(error) = &result {
        tracing::error!(%error, "command failed");
    }
    Ok(result?)
}

#[tracing::instrument(skip_all)]
fn encode(settings: &Settings, args: &EncodeArgs) -> Result<(), Error> {
    let mut text = String::new();
    match &args.input {
        Some(path) => File::open(path)?.read_to_string(&mut text)?,
        None => std::io::stdin().read_to_string(&mut text)?,
    };
    let values = text
        .split_whitespace()
        .map(|token| {
            token.parse::<u32>().map_err(|source| Error::InvalidValue {
                token: token.to_string(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let codec = settings.codec()?;
    let interval = settings.index.mark_interval.get();

    let stream = StreamSink::new(BufWriter::new(File::create(&args.stream)?));
    let mut writer = BlockWriter::new(stream, codec)?;

    let mut index = StreamSink::new(BufWriter::new(File::create(&args.index)?));
    index.write_var_uint(values.len() as u64)?;
    index.write_var_uint(interval as u64)?;
    let mut index_writer = SkipIndexWriter::new();

    for (i, &value) in values.iter().enumerate() {
        if i % interval == 0 {
            index_writer.write(&mut index, writer.mark(), i == 0)?;
        }
        writer.write(value)?;
    }

    let blocks = writer.blocks_written();
    let stream_bytes = writer.close()?.offset();
    index.close()?;

    tracing::info!(
        values = values.len(),
        blocks,
        stream_bytes,
        index_bytes = index.offset(),
        "encoded stream"
    );
    Ok(())
}

#[tracing::instrument(skip_all)]
fn decode(settings: &Settings, args: &DecodeArgs) -> Result<(), Error> {
    let mut index = StreamSource::new(BufReader::new(File::open(&args.index)?))?;
    let count = index.read_var_uint()?;
    let interval = index.read_var_uint()?.max(1);
    if args.from >= count {
        return Ok(());
    }

    let mut reader = open_stream(&args.stream, settings.codec.width_policy)?;

    // Jump to the last mark at or before `from`, then walk the rest.
    let target = args.from / interval;
    let mut index_reader = SkipIndexReader::new();
    let mut mark = index_reader.read(&mut index, true)?;
    for _ in 0..target {
        mark = index_reader.read(&mut index, false)?;
    }
    reader.seek(mark)?;
    for _ in target * interval..args.from {
        reader.next_value()?;
    }

    let remaining = usize::try_from(count - args.from).map_err(|_| Error::TooManyElements(count))?;
    let mut out = BufWriter::new(std::io::stdout().lock());
    for _ in 0..remaining {
        writeln!(out, "{}", reader.next_value()?)?;
    }
    out.flush()?;

    tracing::debug!(from = args.from, %mark, printed = remaining, "decoded stream");
    Ok(())
}

#[tracing::instrument(skip_all)]
fn inspect(settings: &Settings, args: &InspectArgs) -> Result<(), Error> {
    let mut reader = open_stream(&args.stream, settings.codec.width_policy)?;
    let block_size = reader.block_size();
    let stream_len = std::fs::metadata(&args.stream)?.len();

    let mut out = BufWriter::new(std::io::stdout().lock());
    writeln!(out, "block_size={block_size} stream_bytes={stream_len}")?;

    let mut offset = pfordelta::leb128::Leb128::encoded_len(block_size as u64) as u64;
    let mut blocks = 0u64;
    while offset < stream_len {
        let frame = reader.read_frame_at(offset)?;
        let words = frame.len() as u64;
        let block = CompressedBlock::from_words(frame, block_size).map_err(|err| err.at_offset(offset))?;
        writeln!(
            out,
            "offset={offset} width={} exceptions={} words={words}",
            block.width(),
            block.exceptions().len(),
        )?;
        offset += 4 * (words + 1);
        blocks += 1;
    }
    writeln!(out, "blocks={blocks}")?;
    out.flush()?;
    Ok(())
}

/// Opens a block stream with a codec sized by the stream's own header.
fn open_stream(
    path: &Path,
    policy: WidthPolicy,
) -> Result<BlockReader<StreamSource<BufReader<File>>, PForDelta>, Error> {
    let mut source = StreamSource::new(BufReader::new(File::open(path)?))?;
    let block_size = source.read_var_uint()?;
    source.seek(0)?;

    let codec = PForDelta::new(pfordelta::codec::check_block_size(block_size)?, policy)?;
    Ok(BlockReader::open(source, codec)?)
}

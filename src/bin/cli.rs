use clap::{Args, Parser, Subcommand};
use hardened_bloom_rs::{
    Decomposition, EncodingFilter, FilterConfig, FilterKind, HardeningConfig,
    HardeningConfigBuilder, HardeningPipeline, MergeMode, RecordEncoder,
    convert_to_libsvm, record_lines,
};
use std::{
    fs::File,
    io::{self, BufReader, BufWriter},
    path::PathBuf,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log every merge group and skipped record
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct FilterArgs {
    /// Filter type: unkeyed-bloom, keyed-bloom, count-min, keyed-count-min
    #[arg(short = 't', long = "filter-type", default_value = "unkeyed-bloom")]
    kind: FilterKind,

    /// Bits per Bloom filter or counters per sketch row
    #[arg(short = 'm', long, default_value = "1024")]
    size: usize,

    /// Hash functions (Bloom) or rows (Count-Min)
    #[arg(short = 'k', long = "hash-num", default_value = "3")]
    num_hashes: usize,

    /// Secret key for the keyed filter types
    #[arg(short = 'e', long = "key", env = "HBF_SECRET_KEY")]
    secret_key: Option<String>,
}

impl FilterArgs {
    fn to_config(&self) -> FilterConfig {
        FilterConfig {
            kind: self.kind,
            size: self.size,
            num_hashes: self.num_hashes,
            secret_key: self.secret_key.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Encode `<label>\t<text>` lines into serialized filters
    Encode {
        /// Records, one per line
        input: PathBuf,

        /// Destination for serialized filters
        output: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        /// Token decomposition
        #[arg(
            short = 'd',
            long,
            default_value = "words",
            value_parser = ["words", "ngrams"]
        )]
        decomposition: String,

        /// Characters per n-gram (ngrams decomposition only)
        #[arg(short = 'n', long, default_value = "2")]
        ngram_len: usize,

        /// Write the token to position mapping to this file
        #[arg(long)]
        mapping_file: Option<PathBuf>,
    },

    /// Merge and add noise to serialized filters
    Harden {
        /// Serialized filters
        input: PathBuf,

        /// Destination for hardened filters (overwritten)
        output: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        /// Target fill level in percent (0 <= noise <= 100)
        #[arg(short, long, default_value = "0")]
        noise_level: f64,

        /// Number of filters merged into one (1 disables merging)
        #[arg(short = 'l', long, default_value = "1")]
        merging_level: usize,

        /// 'train' merges only records with the same label, 'test' ignores labels
        #[arg(long = "mode", default_value = "test")]
        merging_mode: MergeMode,

        /// Records buffered per write, rounded up to a multiple of the
        /// merging level
        #[arg(short = 's', long, default_value = "100")]
        chunk_size: usize,

        /// Seed for merge partitioning and noise; random when omitted
        #[arg(long)]
        seed: Option<u64>,

        /// JSON hardening profile; cannot be combined with the filter and
        /// hardening flags, except for the key and the seed
        #[arg(
            long,
            conflicts_with_all = [
                "kind",
                "size",
                "num_hashes",
                "noise_level",
                "merging_level",
                "merging_mode",
                "chunk_size",
            ]
        )]
        config: Option<PathBuf>,
    },

    /// Convert serialized filters to LIBSVM format
    Convert {
        input: PathBuf,
        output: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Print label, size and fill level of each serialized filter
    Info {
        input: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Encode {
            input,
            output,
            filter,
            decomposition,
            ngram_len,
            mapping_file,
        } => {
            let decomposition = match decomposition.as_str() {
                "ngrams" => Decomposition::Ngrams(ngram_len),
                _ => Decomposition::Words,
            };
            let mut encoder = RecordEncoder::new(filter.to_config())?
                .with_decomposition(decomposition)?;
            if mapping_file.is_some() {
                encoder = encoder.with_default_mapping();
            }
            let reader = BufReader::new(File::open(&input)?);
            let writer = BufWriter::new(File::create(&output)?);
            let report = encoder.encode_stream(reader, writer)?;
            println!(
                "Encoded {} records into {} ({} failed)",
                report.encoded,
                output.display(),
                report.failed
            );

            if let (Some(path), Some(mapping)) =
                (mapping_file, encoder.into_mapping())
            {
                mapping.write_to(BufWriter::new(File::create(&path)?))?;
                println!("Wrote {} tokens to {}", mapping.len(), path.display());
            }
        }
        Commands::Harden {
            input,
            output,
            filter,
            noise_level,
            merging_level,
            merging_mode,
            chunk_size,
            seed,
            config,
        } => {
            let mut config = match config {
                Some(path) => {
                    let mut profile = HardeningConfig::from_file(path)?;
                    if profile.filter.secret_key.is_none() {
                        profile.filter.secret_key = filter.secret_key;
                    }
                    profile
                }
                None => HardeningConfigBuilder::default()
                    .filter(filter.to_config())
                    .anonymity_level(merging_level)
                    .chunk_size(chunk_size)
                    .noise_level(noise_level)
                    .merge_mode(merging_mode)
                    .build()?,
            };
            if let Some(seed) = seed {
                config.seed = Some(seed);
            }
            let seed = *config.seed.get_or_insert_with(rand::random);
            info!(seed, "Hardening with seed");

            let mut pipeline = HardeningPipeline::seeded(config)?;
            let report = pipeline.run_files(&input, &output)?;
            println!("Hardening report:");
            println!("  Lines read: {}", report.lines_read);
            println!("  Malformed (skipped): {}", report.malformed);
            println!("  Unlabeled (dropped): {}", report.unlabeled_dropped);
            println!("  Chunks: {}", report.chunks);
            println!("  Filters written: {}", report.filters_written);
            println!("  Incomplete chunk leftovers: {}", report.leftover);
        }
        Commands::Convert {
            input,
            output,
            filter,
        } => {
            let config = filter.to_config();
            config.validate()?;
            let reader = BufReader::new(File::open(&input)?);
            let writer = BufWriter::new(File::create(&output)?);
            let written = convert_to_libsvm(&config, reader, writer)?;
            println!("Converted {written} records to {}", output.display());
        }
        Commands::Info { input, filter } => {
            let config = filter.to_config();
            config.validate()?;
            let reader = BufReader::new(File::open(&input)?);
            for (idx, line) in record_lines(reader).enumerate() {
                match line.and_then(|line| config.decode_line(&line)) {
                    Ok(f) => println!(
                        "{:>6}  label {:>2}  size {:>8}  fill {:>6.2}%  sha256 {}",
                        idx + 1,
                        f.label(),
                        f.size(),
                        f.fill_level(),
                        f.digest()
                    ),
                    Err(e) if e.is_recoverable() => {
                        println!("{:>6}  {e}", idx + 1)
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    Ok(())
}

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use xbag::table::{self, TableFormat};
use xbag::{
    BagNormalization, BagPipeline, CodebookStore, GenerationMethod, PipelineConfig, Windowing,
};
use xbag_core::{ActivityFilter, AssignmentConfig};

/// Crossmodal bag-of-words feature encoder
#[derive(Parser, Debug)]
#[command(name = "xbag")]
#[command(about = "Encode frame-level features as bags of words", long_about = None)]
struct Args {
    /// Semicolon-separated input frames: name[;time];features...[;label]
    #[arg(short, long)]
    input: PathBuf,

    /// Output bag table
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON pipeline configuration; command-line options override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Second input column is a timestamp
    #[arg(long)]
    time: bool,

    /// Last input column is a label
    #[arg(long)]
    label: bool,

    /// Comma-separated feature class per feature column (0 = text)
    #[arg(long, value_delimiter = ',')]
    classes: Option<Vec<u32>>,

    /// Window size in seconds; enables windowing
    #[arg(long, requires = "hop")]
    window: Option<f32>,

    /// Window hop in seconds
    #[arg(long, requires = "window")]
    hop: Option<f32>,

    /// Codebook size per numeric feature class
    #[arg(long)]
    size: Option<usize>,

    /// Codebook generation method
    #[arg(long)]
    method: Option<GenerationMethod>,

    #[arg(long)]
    seed: Option<u64>,

    /// Number of training frames (0 = all)
    #[arg(long)]
    num_training: Option<usize>,

    /// Balance training frames over the nominal labels
    #[arg(long)]
    supervised: bool,

    /// Merge codewords correlated above this threshold
    #[arg(long)]
    reduce: Option<f32>,

    /// Number of assignments per frame
    #[arg(short = 'a', long)]
    assignments: Option<usize>,

    /// Gaussian soft-assignment sigma
    #[arg(long)]
    gaussian: Option<f32>,

    /// Ignore assignments farther than this distance
    #[arg(long)]
    off: Option<f32>,

    /// Energy column and threshold of the activity filter, e.g. 0:0.5
    #[arg(long)]
    energy: Option<String>,

    #[arg(long)]
    standardize_input: bool,

    #[arg(long)]
    normalize_input: bool,

    /// Logarithmic term weighting
    #[arg(long)]
    log: bool,

    /// Inverse document frequency weighting
    #[arg(long)]
    idf: bool,

    /// Bag normalization: 1 = frame count, 2 = term frequency, 3 = unit length
    #[arg(long)]
    norm: Option<u8>,

    #[arg(long)]
    standardize_output: bool,

    #[arg(long)]
    normalize_output: bool,

    /// Encode with a stored codebook instead of fitting one
    #[arg(long)]
    load: Option<PathBuf>,

    /// Store the fitted codebook
    #[arg(long)]
    save: Option<PathBuf>,

    /// Write the per-frame codeword indices
    #[arg(long)]
    word_index: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config: PipelineConfig = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => PipelineConfig::default(),
        };

        if let (Some(size), Some(hop)) = (self.window, self.hop) {
            config.windowing = Some(Windowing::new(size, hop));
        }
        if let Some(energy) = &self.energy {
            let (column, threshold) = energy
                .split_once(':')
                .context("energy filter must be <column>:<threshold>")?;
            config.activity = Some(ActivityFilter {
                column: column.parse().context("invalid energy column")?,
                threshold: threshold.parse().context("invalid energy threshold")?,
            });
        }

        let numeric = &mut config.numeric;
        if let Some(size) = self.size {
            numeric.size = size;
        }
        if let Some(method) = self.method {
            numeric.method = method;
        }
        if let Some(seed) = self.seed {
            numeric.random_seed = seed;
        }
        if let Some(num_training) = self.num_training {
            numeric.num_training = num_training;
        }
        if self.supervised {
            numeric.supervised = true;
        }
        if let Some(threshold) = self.reduce {
            numeric.reduce_threshold = Some(threshold);
        }
        let assignment: &mut AssignmentConfig = &mut numeric.assignment;
        if let Some(a) = self.assignments {
            assignment.num_assignments = a;
        }
        if self.gaussian.is_some() {
            assignment.gaussian_sigma = self.gaussian;
        }
        if self.off.is_some() {
            assignment.off_threshold = self.off;
        }

        config.standardize_input |= self.standardize_input;
        config.normalize_input |= self.normalize_input;
        config.log_weighting |= self.log;
        config.idf_weighting |= self.idf;
        if let Some(code) = self.norm {
            config.normalization = BagNormalization::from_code(code)?;
        }
        config.standardize_output |= self.standardize_output;
        config.normalize_output |= self.normalize_output;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting xbag v{}", env!("CARGO_PKG_VERSION"));
    let config = args.pipeline_config()?;

    let format = TableFormat {
        has_time: args.time,
        has_label: args.label,
        classes: args.classes.clone(),
    };
    let (frames, layout) = table::read_frames(&args.input, &format)?;
    info!("Read {} frames from {:?}", frames.len(), args.input);

    let pipeline = BagPipeline::new(config, layout)?;
    let output = match &args.load {
        Some(path) => {
            let codebook = CodebookStore::new(path).load()?;
            pipeline.encode(&codebook, &frames)?
        }
        None => {
            let (codebook, output) = pipeline.fit(&frames)?;
            if let Some(path) = &args.save {
                CodebookStore::new(path).save(&codebook)?;
            }
            output
        }
    };
    info!(
        "Encoded {} instances, bag width {}",
        output.bag.len(),
        output.bag.first().map_or(0, Vec::len)
    );

    let bag = table::format_bag(&output);
    match &args.output {
        Some(path) => table::write_text(path, &bag)?,
        None => print!("{}", bag),
    }
    if let Some(path) = &args.word_index {
        table::write_text(path, &table::format_assignments(&output))?;
    }
    Ok(())
}

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use neumf_rs::dataset::Interactions;
use neumf_rs::train::grid::{search, ParamGrid};
use neumf_rs::train::metrics::ranking_scores;
use neumf_rs::train::{fit, save_assets, TrainConfig};

#[derive(Parser, Debug)]
#[command(name = "neumf-train")]
#[command(about = "Train a NeuMF recommendation model from interaction data", long_about = None)]
struct Args {
    /// CSV of user,item,rating,timestamp interactions
    data: PathBuf,

    /// Directory to write the model assets into
    #[arg(short, long, default_value = "assets")]
    output: PathBuf,

    #[arg(long, default_value_t = 100)]
    epochs: usize,

    #[arg(long, default_value_t = 128)]
    batch_size: usize,

    /// Number of latent factors in the GMF branch
    #[arg(long, default_value_t = 8)]
    factors: usize,

    #[arg(long, default_value_t = 5e-3)]
    learning_rate: f32,

    /// Negative samples per positive interaction
    #[arg(long, default_value_t = 4)]
    negatives: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Field delimiter of the data file
    #[arg(long, default_value = ",")]
    delimiter: String,

    /// Treat the first line of the data file as a header
    #[arg(long)]
    header: bool,

    /// Chronological train fraction; 0 disables the held-out split
    #[arg(long, default_value_t = 0.8)]
    split: f64,

    /// Run an exhaustive hyperparameter grid search first
    #[arg(long)]
    hpo: bool,

    /// Ranking cutoff for MAP/NDCG evaluation
    #[arg(long, default_value_t = 10)]
    eval_k: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "neumf_rs=info,neumf_train=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let delimiter = match args.delimiter.as_bytes() {
        [b] => *b,
        _ => bail!("delimiter must be a single byte, got {:?}", args.delimiter),
    };
    if !(0.0..1.0).contains(&args.split) {
        bail!("split must be in [0, 1), got {}", args.split);
    }

    info!("Loading interactions from {}", args.data.display());
    let data = Interactions::from_csv(&args.data, delimiter, args.header)
        .context("failed to load interaction data")?;
    info!(
        users = data.n_users(),
        items = data.n_items(),
        interactions = data.records.len(),
        "Dataset loaded"
    );

    let base = TrainConfig {
        factors: args.factors,
        epochs: args.epochs,
        batch_size: args.batch_size,
        learning_rate: args.learning_rate,
        n_negatives: args.negatives,
        seed: args.seed,
        ..TrainConfig::default()
    };

    let (config, network) = if args.hpo {
        info!("Running hyperparameter optimization");
        let split = if args.split > 0.0 { args.split } else { 0.8 };
        let (results, best) = search(&data, &base, &ParamGrid::default(), split, args.eval_k)
            .context("grid search failed")?;
        let config = results[best].config.clone();
        info!("Retraining best parameters on the full dataset");
        let network = fit(&data, &data.records, &config);
        (config, network)
    } else if args.split > 0.0 {
        let (train, test) = data.chrono_split(args.split);
        info!(train = train.len(), test = test.len(), "Chronological split");
        let network = fit(&data, &train, &base);
        if !test.is_empty() {
            let scores = ranking_scores(&network, &train, &test, data.n_items(), args.eval_k);
            info!(
                k = args.eval_k,
                map = scores.map,
                ndcg = scores.ndcg,
                users = scores.n_users,
                "Held-out ranking quality"
            );
        }
        (base, network)
    } else {
        let network = fit(&data, &data.records, &base);
        (base, network)
    };

    save_assets(&data, &config, network, &args.output)
        .context("failed to write model assets")?;
    info!("Model assets written to {}", args.output.display());

    Ok(())
}

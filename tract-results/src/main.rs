//! Runs the fiber clustering on a fiber file or on synthetic bundles and
//! writes reports, or inspects a stored dendrogram.

use std::{
    io::BufReader,
    path::{Path, PathBuf},
    time::Instant,
};

use clap::{Parser, Subcommand};
use log::info;
use num_format::ToFormattedString;
use serde::Serialize;

use tract_clam::{
    utils, ClusteringCriteria, ClusteringReport, DetTractClustering, DistanceTable, Fiber, FiberDataset, FiberMetric,
    HierarchicalTree,
};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// What to do.
    #[command(subcommand)]
    command: Command,
}

/// The subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Clusters fibers and writes a JSON report and a CSV of assignments.
    Cluster {
        /// JSON file holding an array of fibers, each an array of [x, y, z]
        /// points. Synthetic bundles are generated if omitted.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Number of synthetic bundles.
        #[arg(long, default_value_t = 8)]
        bundles: usize,

        /// Fibers per synthetic bundle.
        #[arg(long, default_value_t = 25)]
        fibers_per_bundle: usize,

        /// Points per synthetic fiber.
        #[arg(long, default_value_t = 30)]
        points_per_fiber: usize,

        /// Maximum offset of a synthetic fiber from its bundle axis.
        #[arg(long, default_value_t = 1.5)]
        spread: f64,

        /// Seed for the synthetic bundles.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Point pairs closer than this do not add to fiber distances.
        #[arg(long, default_value_t = 0.)]
        proximity: f64,

        /// Clusters closer than this are merged.
        #[arg(long, default_value_t = 6.5)]
        max_distance: f64,

        /// Smaller clusters are discarded.
        #[arg(long, default_value_t = 10)]
        min_cluster_size: usize,

        /// The fiber metric, "dlt" or "dst".
        #[arg(long, default_value = "dlt")]
        metric: String,

        /// Precompute all pair distances in parallel.
        #[arg(long)]
        parallel: bool,

        /// Keep the distance table next to the input file for later runs.
        #[arg(long)]
        lookup: bool,

        /// Also write the merge history as a dendrogram text file.
        #[arg(long)]
        dendrogram: bool,

        /// Directory for the reports.
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Prints the biggest clusters of a dendrogram text file.
    Tree {
        /// The dendrogram file.
        #[arg(long)]
        input: PathBuf,

        /// The node to split up; every top node if omitted.
        #[arg(long)]
        node: Option<usize>,

        /// How many clusters to print.
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
}

/// The JSON report of a clustering run.
#[derive(Serialize, Debug)]
struct Report {
    /// Where the fibers came from.
    source: String,
    /// Wall time of the run in seconds.
    elapsed: f64,
    /// The clustering statistics.
    clustering: ClusteringReport,
}

fn main() -> Result<(), String> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!("{args:?}");

    match args.command {
        Command::Cluster {
            input,
            bundles,
            fibers_per_bundle,
            points_per_fiber,
            spread,
            seed,
            proximity,
            max_distance,
            min_cluster_size,
            metric,
            parallel,
            lookup,
            dendrogram,
            output_dir,
        } => {
            let metric = FiberMetric::from_name(&metric).ok_or_else(|| format!("Unknown metric {metric}."))?;
            let criteria = ClusteringCriteria::new()
                .with_proximity(proximity)
                .with_max_distance(max_distance)
                .with_min_cluster_size(min_cluster_size)
                .with_metric(metric)
                .with_parallel_precompute(parallel);

            let (fibers, source) = match &input {
                Some(path) => (read_fibers(path)?, path.display().to_string()),
                None => {
                    let (fibers, _) = utils::bundles(bundles, fibers_per_bundle, points_per_fiber, spread, seed);
                    (fibers, format!("synthetic-{bundles}x{fibers_per_bundle}-{seed}"))
                }
            };

            let mut engine = DetTractClustering::new(criteria);
            if let (true, Some(path)) = (lookup, &input) {
                engine = engine.with_lookup_file(DistanceTable::lookup_file_name(path, proximity));
            }

            cluster(&fibers, &mut engine, &source, &output_dir, dendrogram)
        }
        Command::Tree { input, node, count } => print_tree(&input, node, count),
    }
}

/// Reads fibers from a JSON array of point arrays.
fn read_fibers(path: &Path) -> Result<FiberDataset, String> {
    let file = std::fs::File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let raw: Vec<Vec<[f64; 3]>> = serde_json::from_reader(BufReader::new(file)).map_err(|e| e.to_string())?;

    let fibers = raw.into_iter().map(Fiber::new).collect::<FiberDataset>();
    info!("Read {} fibers from {}.", fibers.len().to_formatted_string(&num_format::Locale::en), path.display());

    Ok(fibers.with_file_name(&path.display().to_string()))
}

/// Clusters the fibers and writes the reports to `output_dir`.
fn cluster(
    fibers: &FiberDataset,
    engine: &mut DetTractClustering,
    source: &str,
    output_dir: &Path,
    dendrogram: bool,
) -> Result<(), String> {
    if !output_dir.exists() {
        std::fs::create_dir_all(output_dir).map_err(|e| e.to_string())?;
    }

    let start = Instant::now();
    let mut clustering = engine.cluster(fibers);
    let elapsed = start.elapsed().as_secs_f64();
    clustering.paint();

    info!(
        "Clustered {} fibers into {} clusters in {elapsed:.3e} seconds.",
        fibers.len().to_formatted_string(&num_format::Locale::en),
        clustering.len()
    );

    let report = Report {
        source: source.to_string(),
        elapsed,
        clustering: clustering.report(),
    };
    let report_path = output_dir.join("clustering.json");
    let report_file = std::fs::File::create(&report_path).map_err(|e| e.to_string())?;
    serde_json::to_writer_pretty(report_file, &report).map_err(|e| e.to_string())?;
    info!("Wrote {}.", report_path.display());

    let csv_path = output_dir.join("assignments.csv");
    let mut writer = csv::Writer::from_path(&csv_path).map_err(|e| e.to_string())?;
    writer.write_record(["fiber", "cluster"]).map_err(|e| e.to_string())?;
    for (i, assignment) in clustering.assignments().into_iter().enumerate() {
        let cluster = assignment.map(|c| c.to_string()).unwrap_or_default();
        writer.write_record([i.to_string(), cluster]).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())?;
    info!("Wrote {}.", csv_path.display());

    if dendrogram {
        let tree = HierarchicalTree::from_merges(fibers.len(), clustering.merges()).map_err(|e| e.to_string())?;
        let tree_path = output_dir.join("dendrogram.txt");
        let tree_file = std::fs::File::create(&tree_path).map_err(|e| e.to_string())?;
        tree.write_ascii(std::io::BufWriter::new(tree_file)).map_err(|e| e.to_string())?;
        info!("Wrote {} with {} nodes.", tree_path.display(), tree.cluster_count());
    }

    Ok(())
}

/// Prints the `count` biggest clusters below `node`.
fn print_tree(path: &Path, node: Option<usize>, count: usize) -> Result<(), String> {
    let file = std::fs::File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let tree = HierarchicalTree::from_ascii(BufReader::new(file)).map_err(|e| e.to_string())?;
    info!(
        "Read {} leaves and {} merged nodes, {} levels deep.",
        tree.leaf_count().to_formatted_string(&num_format::Locale::en),
        (tree.cluster_count() - tree.leaf_count()).to_formatted_string(&num_format::Locale::en),
        tree.max_level()
    );

    let starts = node.map_or_else(|| tree.tops(), |n| vec![n]);
    if starts.is_empty() {
        return Err("The dendrogram is empty.".to_string());
    }

    for start in starts {
        for id in tree.find_x_biggest_clusters(start, count).map_err(|e| e.to_string())? {
            let size = tree.size(id).map_err(|e| e.to_string())?;
            let level = tree.level(id).map_err(|e| e.to_string())?;
            let distance = tree.custom_data(id).map_err(|e| e.to_string())?;
            println!("cluster {id}: {size} fibers, level {level}, merged at {distance}");
        }
    }

    Ok(())
}

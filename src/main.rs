//! Neuroevo CLI - Evolve XOR networks from a JSON configuration.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use neuroevo::{Genome, Neat, NeatConfig, Network};

const XOR: [([f64; 2], f64); 4] = [
    ([0.0, 0.0], 0.0),
    ([0.0, 1.0], 1.0),
    ([1.0, 0.0], 1.0),
    ([1.0, 1.0], 0.0),
];

fn xor_fitness(net: &Network) -> f64 {
    let error: f64 = XOR
        .iter()
        .map(|(input, expected)| (net.activate(input)[0] - expected).powi(2))
        .sum();
    4.0 - error
}

struct Options {
    config: Option<PathBuf>,
    generations: usize,
    target: f64,
    jsonl: Option<PathBuf>,
    csv: Option<PathBuf>,
    state: Option<PathBuf>,
}

fn usage(program: &str) {
    eprintln!("Usage: {} [config.json] [generations] [options]", program);
    eprintln!();
    eprintln!("Evolve networks that solve XOR.");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.json          Engine configuration (default: built-in 2x1 config)");
    eprintln!("  generations          Maximum generations (default: 300)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --target <f>         Stop once the best fitness reaches f (default: 3.9)");
    eprintln!("  --jsonl <path>       Write telemetry as JSON lines");
    eprintln!("  --csv <path>         Write telemetry as CSV");
    eprintln!("  --state <path>       Write the final engine state");
    eprintln!("  --example            Print an example configuration");
}

fn parse_args(args: &[String]) -> Option<Options> {
    let mut options = Options {
        config: None,
        generations: 300,
        target: 3.9,
        jsonl: None,
        csv: None,
        state: None,
    };
    let mut positional = 0;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--target" => options.target = iter.next()?.parse().ok()?,
            "--jsonl" => options.jsonl = Some(PathBuf::from(iter.next()?)),
            "--csv" => options.csv = Some(PathBuf::from(iter.next()?)),
            "--state" => options.state = Some(PathBuf::from(iter.next()?)),
            flag if flag.starts_with("--") => return None,
            value => {
                match positional {
                    0 => options.config = Some(PathBuf::from(value)),
                    1 => options.generations = value.parse().ok()?,
                    _ => return None,
                }
                positional += 1;
            }
        }
    }
    Some(options)
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.get(1).is_some_and(|a| a == "--example") {
        print_example_config();
        return;
    }

    let Some(options) = parse_args(&args) else {
        usage(&args[0]);
        std::process::exit(1);
    };

    // Load configuration
    let config = match &options.config {
        Some(path) => {
            let config_str = fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Error reading config file: {}", e);
                std::process::exit(1);
            });
            serde_json::from_str::<NeatConfig>(&config_str).unwrap_or_else(|e| {
                eprintln!("Error parsing config: {}", e);
                std::process::exit(1);
            })
        }
        None => NeatConfig::new(2, 1),
    };

    if config.input != 2 || config.output != 1 {
        eprintln!(
            "XOR needs 2 inputs and 1 output, config has {}x{}",
            config.input, config.output
        );
        std::process::exit(1);
    }

    println!("Neuroevo XOR");
    println!("============");
    println!("Population: {}", config.population.size);
    println!("Speciation: {}", config.speciation.enabled);
    println!("Multi-objective: {}", config.multi_objective.enabled);
    println!("Generations: {}", options.generations);
    println!();

    let mut neat = Neat::<Network>::new(config, xor_fitness).unwrap_or_else(|e| {
        eprintln!("Error creating engine: {}", e);
        std::process::exit(1);
    });

    println!("Running evolution...");
    let start = Instant::now();
    let every = (options.generations / 10).max(1);
    let summary = neat
        .run_with_callback(options.generations, Some(options.target), |progress| {
            if (progress.generation + 1) % every == 0 {
                println!(
                    "  Generation {}/{}: best={:.4}, species={}, threshold={:.3}",
                    progress.generation + 1,
                    options.generations,
                    progress.best,
                    progress.species,
                    progress.threshold
                );
            }
        })
        .unwrap_or_else(|e| {
            eprintln!("Error during evolution: {}", e);
            std::process::exit(1);
        });
    let elapsed = start.elapsed();

    println!();
    println!("Stopped: {:?} after {} generations", summary.stop_reason, summary.generations);
    println!("Best fitness: {:.4}", summary.best.fitness());
    println!(
        "Best network: {} nodes, {} connections",
        summary.best.genome.node_count(),
        summary.best.genome.connection_count()
    );
    for (input, expected) in XOR {
        println!(
            "  {:?} -> {:.3} (expected {})",
            input,
            summary.best.genome.activate(&input)[0],
            expected
        );
    }
    println!(
        "Time: {:.2}s ({:.1} generations/s)",
        elapsed.as_secs_f32(),
        summary.generations as f32 / elapsed.as_secs_f32()
    );

    if let Some(path) = &options.jsonl
        && let Err(e) = neat.telemetry().write_jsonl(path)
    {
        eprintln!("Error writing telemetry: {}", e);
    }
    if let Some(path) = &options.csv
        && let Err(e) = neat.telemetry().write_csv(path)
    {
        eprintln!("Error writing telemetry: {}", e);
    }
    if let Some(path) = &options.state
        && let Err(e) = neat.save_state(path)
    {
        eprintln!("Error writing state: {}", e);
    }
}

fn print_example_config() {
    let config = NeatConfig::new(2, 1);

    println!("Example configuration (config.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing config: {}", e),
    }
}

//! Batch generator for the cogsim prior-predictive simulator.
//!
//! Examples:
//!   cogsim-gen variants
//!   cogsim-gen --variant rlwm --batch-size 64 --batches 10 --seed 1 generate
//!   cogsim-gen --config gen.json --out ./batches generate
//!   cogsim-gen inspect ./batches/batch_00000.csa
//!
//! Settings are layered: JSON config, then `COGSIM_SEED` / `COGSIM_THREADS` /
//! `COGSIM_OUT`, then command-line flags.

mod error;
mod paths;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use cogsim::batch::{Batch, LengthPolicy};
use cogsim::config::GeneratorConfig;
use cogsim::prng::Prng;
use cogsim::variant::TaskVariant;
use rand::RngCore;
use tracing::{error, info};

use crate::error::{CliError, CliResult};

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Generate,
    Variants,
    Inspect(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Options {
    config: Option<PathBuf>,
    variant: Option<String>,
    batch_size: Option<usize>,
    batches: Option<usize>,
    seed: Option<u64>,
    truncate: bool,
    out: Option<String>,
    command: Option<Command>,
}

fn usage() -> ! {
    eprintln!("cogsim-gen (prior-predictive batch generator)");
    eprintln!("Usage: cogsim-gen [options] <command> [args]\n");
    eprintln!("Commands:");
    eprintln!("  generate                    Simulate batches and write archives");
    eprintln!("  variants                    List built-in task variants");
    eprintln!("  inspect <file>              Print the arrays of an archive");
    eprintln!("\nOptions:");
    eprintln!("  --config <file.json>        Generator config (GeneratorConfig JSON)");
    eprintln!("  --variant <name>            Task variant (see `variants`)");
    eprintln!("  --batch-size <n>            Subjects per batch");
    eprintln!("  --batches <n>               Number of batches");
    eprintln!("  --seed <n>                  Master seed (default: from the OS)");
    eprintln!("  --truncate                  Cut subjects to the shortest instead of padding");
    eprintln!("  --out <dir>                 Output directory");
    eprintln!("\nEnvironment: COGSIM_SEED, COGSIM_THREADS, COGSIM_OUT");
    process::exit(1);
}

fn parse_num<T: std::str::FromStr>(flag: &str, value: Option<String>) -> CliResult<T> {
    let value = value.ok_or_else(|| CliError::Usage(format!("{flag} needs a value")))?;
    value
        .parse()
        .map_err(|_| CliError::Usage(format!("{flag}: invalid number '{value}'")))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> CliResult<Options> {
    let mut opts = Options::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| CliError::Usage("--config needs a file".into()))?;
                opts.config = Some(PathBuf::from(path));
            }
            "--variant" => {
                opts.variant = Some(
                    args.next()
                        .ok_or_else(|| CliError::Usage("--variant needs a name".into()))?,
                );
            }
            "--batch-size" => opts.batch_size = Some(parse_num("--batch-size", args.next())?),
            "--batches" => opts.batches = Some(parse_num("--batches", args.next())?),
            "--seed" => opts.seed = Some(parse_num("--seed", args.next())?),
            "--truncate" => opts.truncate = true,
            "--out" => {
                opts.out = Some(
                    args.next()
                        .ok_or_else(|| CliError::Usage("--out needs a directory".into()))?,
                );
            }
            "generate" => opts.command = Some(Command::Generate),
            "variants" => opts.command = Some(Command::Variants),
            "inspect" => {
                let path = args
                    .next()
                    .ok_or_else(|| CliError::Usage("inspect needs an archive path".into()))?;
                opts.command = Some(Command::Inspect(PathBuf::from(path)));
            }
            other => return Err(CliError::Usage(format!("unknown argument '{other}'"))),
        }
    }
    Ok(opts)
}

fn apply_env(cfg: &mut GeneratorConfig, var: impl Fn(&str) -> Option<String>) -> CliResult<()> {
    if let Some(v) = var("COGSIM_SEED") {
        cfg.seed = Some(parse_num("COGSIM_SEED", Some(v))?);
    }
    if let Some(v) = var("COGSIM_THREADS") {
        cfg.threads = Some(parse_num("COGSIM_THREADS", Some(v))?);
    }
    if let Some(v) = var("COGSIM_OUT") {
        cfg.output_dir = Some(v);
    }
    Ok(())
}

fn apply_flags(cfg: &mut GeneratorConfig, opts: &Options) {
    if let Some(v) = &opts.variant {
        cfg.variant = v.clone();
    }
    if let Some(n) = opts.batch_size {
        cfg.batch_size = n;
    }
    if let Some(n) = opts.batches {
        cfg.num_batches = n;
    }
    if let Some(s) = opts.seed {
        cfg.seed = Some(s);
    }
    if opts.truncate {
        cfg.length_policy = LengthPolicy::Truncate;
    }
    if let Some(out) = &opts.out {
        cfg.output_dir = Some(out.clone());
    }
}

fn load_config(opts: &Options) -> CliResult<GeneratorConfig> {
    let mut cfg = match &opts.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| CliError::io(format!("failed to read {}", path.display()), e))?;
            serde_json::from_str(&text)?
        }
        None => GeneratorConfig::default(),
    };
    apply_env(&mut cfg, |k| std::env::var(k).ok())?;
    apply_flags(&mut cfg, opts);
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(feature = "parallel")]
fn init_threads(cfg: &GeneratorConfig) -> CliResult<()> {
    if let Some(n) = cfg.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .map_err(|e| CliError::Usage(format!("failed to size the worker pool: {e}")))?;
        info!("Worker pool: {} threads", n);
    }
    Ok(())
}

#[cfg(not(feature = "parallel"))]
fn init_threads(cfg: &GeneratorConfig) -> CliResult<()> {
    if cfg.threads.is_some() {
        tracing::warn!("COGSIM_THREADS ignored: built without the `parallel` feature");
    }
    Ok(())
}

fn generate(cfg: &GeneratorConfig) -> CliResult<()> {
    init_threads(cfg)?;
    let variant = cfg.variant()?;
    let supplier = cogsim_tasks::supplier_for(&cfg.variant)?;
    let out_dir = match &cfg.output_dir {
        Some(dir) => PathBuf::from(dir),
        None => paths::default_output_dir()?,
    };
    paths::ensure_dir(&out_dir)?;

    let master_seed = cfg.seed.unwrap_or_else(|| Prng::from_entropy().next_u64());
    info!(
        "Generating {} x {} subjects of {} (seed {})",
        cfg.num_batches, cfg.batch_size, variant.name, master_seed
    );

    let orch = cfg.orchestrator();
    for k in 0..cfg.num_batches {
        let batch = orch.simulate_batch(
            &variant,
            supplier.as_ref(),
            GeneratorConfig::batch_seed(master_seed, k),
        )?;
        let path = paths::batch_file(&out_dir, k);
        let file = File::create(&path)
            .map_err(|e| CliError::io(format!("failed to create {}", path.display()), e))?;
        let mut w = BufWriter::new(file);
        batch.save_to(&mut w)?;
        w.flush()
            .map_err(|e| CliError::io(format!("failed to write {}", path.display()), e))?;
        info!("✓ {} ({} trials)", path.display(), batch.num_steps);
    }
    Ok(())
}

fn list_variants() -> CliResult<()> {
    for name in TaskVariant::builtin_names() {
        let v = TaskVariant::by_name(name)?;
        println!(
            "{:<26} θ = [{}], η: {}, shared: {}",
            v.name,
            v.param_names.join(", "),
            v.hyper_prior.len(),
            v.shared_len()
        );
    }
    Ok(())
}

fn inspect(path: &Path) -> CliResult<()> {
    let file = File::open(path)
        .map_err(|e| CliError::io(format!("failed to open {}", path.display()), e))?;
    let batch = Batch::load_from(&mut BufReader::new(file))?;
    println!("variant:   {}", batch.variant);
    println!("subjects:  {}", batch.batch_size());
    println!("num_steps: {}", batch.num_steps);
    for name in Batch::FIELD_NAMES {
        match batch.field(name) {
            Some(a) => println!("{name:<18} {:?}", a.shape),
            None => println!("{name:<18} -"),
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt::init();

    let opts = match parse_args(std::env::args().skip(1)) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{e}\n");
            usage();
        }
    };
    let Some(command) = opts.command.clone() else {
        usage();
    };

    let result = match command {
        Command::Variants => list_variants(),
        Command::Inspect(path) => inspect(&path),
        Command::Generate => load_config(&opts).and_then(|cfg| generate(&cfg)),
    };
    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn flags_and_command_parse() {
        let opts = parse_args(args(
            "--variant paired_choice --batch-size 8 --batches 3 --seed 5 --truncate generate",
        ))
        .unwrap();
        assert_eq!(opts.variant.as_deref(), Some("paired_choice"));
        assert_eq!(opts.batch_size, Some(8));
        assert_eq!(opts.batches, Some(3));
        assert_eq!(opts.seed, Some(5));
        assert!(opts.truncate);
        assert_eq!(opts.command, Some(Command::Generate));

        let opts = parse_args(args("inspect a.csa")).unwrap();
        assert_eq!(opts.command, Some(Command::Inspect(PathBuf::from("a.csa"))));
    }

    #[test]
    fn bad_arguments_are_usage_errors() {
        assert!(matches!(
            parse_args(args("--batch-size x generate")),
            Err(CliError::Usage(_))
        ));
        assert!(parse_args(args("--seed")).is_err());
        assert!(parse_args(args("frobnicate")).is_err());
    }

    #[test]
    fn flags_override_env_which_overrides_config() {
        let mut cfg = GeneratorConfig {
            seed: Some(1),
            ..Default::default()
        };
        apply_env(&mut cfg, |k| match k {
            "COGSIM_SEED" => Some("2".into()),
            "COGSIM_OUT" => Some("/tmp/env".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.seed, Some(2));
        assert_eq!(cfg.output_dir.as_deref(), Some("/tmp/env"));

        let opts = parse_args(args("--seed 3 --out /tmp/flag generate")).unwrap();
        apply_flags(&mut cfg, &opts);
        assert_eq!(cfg.seed, Some(3));
        assert_eq!(cfg.output_dir.as_deref(), Some("/tmp/flag"));
        assert_eq!(cfg.length_policy, LengthPolicy::Pad);

        assert!(apply_env(&mut cfg, |k| (k == "COGSIM_THREADS").then(|| "many".into())).is_err());
    }
}

/// Elevation preparation entry point
use dsm_preprocessing::engine::Engines;
use dsm_preprocessing::{Diagnostics, ManifestGenerator, RegistrationPreprocessor, load_config};
use std::env;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <config.json>", args[0]);
        std::process::exit(1);
    }

    let config = load_config(Path::new(&args[1]))?;
    let output_dir = config.output_dir();

    let preprocessor = RegistrationPreprocessor::new(config, Engines::native(true))?;
    let mut diag = Diagnostics::new();
    let pair = preprocessor.run(&mut diag)?;

    ManifestGenerator::new(&output_dir).write(&pair, &diag)?;

    Ok(())
}

use std::io;
use std::process;

use respiflow::cli::{self, CliError, USAGE};
use respiflow::RespiConfig;

fn main() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = RespiConfig::from_env().map_err(CliError::from)
                                      .and_then(|config| cli::run(&args, &config, &mut io::stdout().lock()));
    match code {
        Ok(code) => process::exit(code),
        Err(e @ CliError::Usage(_)) => {
            eprintln!("{e}\n{USAGE}");
            process::exit(e.exit_code());
        }
        Err(e) => {
            eprintln!("{e}");
            process::exit(e.exit_code());
        }
    }
}

use clap::{Parser, Subcommand};
use codegen::CodegenArgs;
use log::debug;

#[derive(Parser, Debug)]
#[clap(name = "statesync", author, version, about = "State sync tooling")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate TypeScript client code from a protocol schema
    Codegen(CodegenArgs),
}

#[tokio::main]
async fn main() {
    env_logger::init();

    // usage errors exit with 1 like every other failure; help and version do not
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    match cli.command {
        Command::Codegen(args) => match codegen::generate(&args).await {
            Ok(written) => {
                debug!("Generated {} files", written.len());
                for path in written {
                    println!("{}", path.display());
                }
            }
            Err(e) => {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        },
    }
}

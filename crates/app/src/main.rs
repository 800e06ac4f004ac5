// CLI modules
mod cli;
mod process;
mod state;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Add, Cat, Init, Ls, Version};

command_enum! {
    (Add, Add),
    (Cat, Cat),
    (Init, Init),
    (Ls, Ls),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let ctx = cli::op::OpContext::new(args.config_path);
    let log_level = match ctx.config().log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    process::init_logging(log_level);
    process::cancel_on_interrupt(ctx.cancel.clone());

    match args.command.execute(&ctx).await {
        Ok(output) => {
            // `cat` to stdout has nothing to add after the archive
            let output = output.to_string();
            if !output.is_empty() {
                println!("{}", output);
            }
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

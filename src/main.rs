use clap::Parser;
use ironroast::args::Cli;
use ironroast::commands;
use ironroast::context::install_interrupt_handler;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let ctx = cli.context();
    ctx.init_logging();
    install_interrupt_handler(ctx.cancel_flag().clone());

    match commands::run(&cli.command, &ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::debug!("{:?}", e);
            eprintln!("[!] {}", e);
            ExitCode::FAILURE
        }
    }
}

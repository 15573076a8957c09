use super::{
    Cli,
    commands::{Command, ConfigCommand},
};
use crate::{
    Result,
    config::Config,
    handlers::{
        check::handle_check,
        config_handler,
        harvest::{RunOptions, handle_run},
    },
    output,
};

pub async fn dispatch(cli: Cli, config: Config) -> Result<i32> {
    match cli.command {
        Command::Run {
            ref profile,
            output: ref output_path,
            ref categories,
            ..
        } => {
            config.validate()?;
            let opts = RunOptions {
                profile: profile.clone(),
                output: output_path.clone(),
                categories: categories.clone(),
            };
            let summary = handle_run(&config, &opts).await?;
            output::print_output(&summary, cli.json, config.output.json_pretty)?;
            Ok(if summary.all_completed() { 0 } else { 1 })
        }
        Command::Check { ref profile } => {
            let result = handle_check(&config, profile)?;
            output::print_output(&result, cli.json, config.output.json_pretty)?;
            Ok(0)
        }
        Command::Config { ref subcommand } => {
            handle_config_command(subcommand, &cli, &config)?;
            Ok(0)
        }
    }
}

fn handle_config_command(subcommand: &ConfigCommand, cli: &Cli, config: &Config) -> Result<()> {
    match subcommand {
        ConfigCommand::Init => {
            let result = config_handler::handle_config_init()?;
            output::print_output(&result, cli.json, true)
        }
        ConfigCommand::Show => {
            let result = config_handler::handle_config_show(config);
            output::print_output(&result, cli.json, true)
        }
        ConfigCommand::Path => {
            let result = config_handler::handle_config_path()?;
            output::print_output(&result, cli.json, true)
        }
    }
}

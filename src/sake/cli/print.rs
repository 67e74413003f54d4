use crate::interlude::*;

use crate::config::Config;

#[derive(clap::Subcommand, Debug)]
pub enum PrintCommands {
    /// Print the path of the store file
    StorePath,
    /// Print the currently resolved configuration
    Config,
}

impl PrintCommands {
    pub fn action(self, config: &Config) -> Res<()> {
        match self {
            PrintCommands::StorePath => {
                println!("{}", config.store_path()?.display());
            }
            PrintCommands::Config => {
                let conf_json = serde_json::to_string_pretty(config)?;
                println!("{conf_json}");
            }
        }
        Ok(())
    }
}

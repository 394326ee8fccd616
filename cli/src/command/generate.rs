use anyhow::{Context, Result};
use clap::Args;

use boxlib::{ConfigOverrides, UnitConfigBuilder};

#[derive(Debug, Args)]
pub struct Generate {
    #[arg(help = "Service name, used for the description and file name")]
    name: String,
    #[arg(help = "Directory the program lives in; ~/ expands to your home directory")]
    base_dir: String,
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        help = "Command to run, relative to the base directory"
    )]
    command: Vec<String>,

    #[arg(long = "type", value_name = "TYPE", help = "Service type [default: simple]")]
    service_type: Option<String>,
    #[arg(long, help = "User to run as [default: root]")]
    user: Option<String>,
    #[arg(long, help = "Group to run as [default: root]")]
    group: Option<String>,
    #[arg(long, value_name = "N", help = "Open file limit [default: 4096]")]
    limit_nofile: Option<u64>,
    #[arg(long, value_name = "POLICY", help = "Restart policy [default: always]")]
    restart: Option<String>,
    #[arg(long, value_name = "DELAY", help = "Delay before restarting [default: 5s]")]
    restart_sec: Option<String>,
}

impl Generate {
    pub fn run(&self) -> Result<()> {
        let overrides = ConfigOverrides {
            service_type: self.service_type.clone(),
            user: self.user.clone(),
            group: self.group.clone(),
            limit_nofile: self.limit_nofile,
            restart: self.restart.clone(),
            restart_sec: self.restart_sec.clone(),
        };
        let config = UnitConfigBuilder::new(&self.name, &self.base_dir, self.command.join(" "))
            .overrides(overrides)
            .build()
            .with_context(|| format!("Failed to build unit for '{}'", self.name))?;

        print!("{config}");
        eprintln!("{} is the suggested file path.", config.save_path.display());
        Ok(())
    }
}

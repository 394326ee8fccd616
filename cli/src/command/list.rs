use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tabled::{
    settings::{Padding, Style},
    Table, Tabled,
};

use boxlib::{ServiceLister, ServiceRecord, Systemctl};

#[derive(Debug, Args)]
pub struct List {
    #[arg(short, long, default_value = "", help = "Only show services whose name contains this")]
    pub name: String,
    #[arg(long, env = "BOXMAN_SYSTEMCTL", default_value = "systemctl", help = "systemctl binary to query")]
    pub systemctl: String,
    #[arg(
        long,
        env = "BOXMAN_LIST_TIMEOUT",
        default_value_t = 10,
        value_name = "SECS",
        help = "Kill the listing if it is still running after this many seconds"
    )]
    pub list_timeout: u64,
}

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Active")]
    active_state: String,
    #[tabled(rename = "Sub")]
    sub_state: String,
    #[tabled(rename = "Load")]
    load_state: String,
    #[tabled(rename = "Path")]
    path: String,
}

impl From<ServiceRecord> for ServiceRow {
    fn from(service: ServiceRecord) -> Self {
        Self {
            name: service.name,
            unit: service.unit,
            active_state: service.active_state,
            sub_state: service.sub_state,
            load_state: service.load_state,
            path: service.path,
        }
    }
}

impl List {
    pub fn run(&self) -> Result<()> {
        let mut services = Systemctl::new(&self.systemctl)
            .timeout(Duration::from_secs(self.list_timeout))
            .list(&self.name)
            .context("Failed to list services")?;
        if services.is_empty() {
            eprintln!("No services found.");
            return Ok(());
        }
        services.sort_by(|a, b| a.name.cmp(&b.name));

        let rows: Vec<ServiceRow> = services.into_iter().map(ServiceRow::from).collect();

        // Piped output gets bare tab-separated rows
        if atty::isnt(atty::Stream::Stdout) {
            for row in &rows {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    row.name, row.unit, row.active_state, row.sub_state, row.load_state, row.path
                );
            }
        } else {
            let mut table = Table::new(rows);
            table.with(Style::blank()).with(Padding::zero());
            println!("{table}");
        }
        Ok(())
    }
}

use std::io::{self, Write};

use serde::Serialize;

use crate::fetch::FetchOutcome;
use crate::gateway::HealthStatus;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchOutcome) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_health(result: &HealthStatus) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

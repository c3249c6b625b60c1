//! Parses the `Ns`/`Nms`/`Nm` duration shorthand used in service health-check
//! configuration (§4.6): "Durations accept Ns/Nms/Nm suffixes and bare
//! numbers (seconds)."

use anyhow::{anyhow, Result};
use std::time::Duration;

pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if let Some(num) = s.strip_suffix("ms") {
        let millis: u64 = num.trim().parse()?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(num) = s.strip_suffix('s') {
        let secs: f64 = num.trim().parse()?;
        return Ok(Duration::from_secs_f64(secs));
    }
    if let Some(num) = s.strip_suffix('m') {
        let mins: f64 = num.trim().parse()?;
        return Ok(Duration::from_secs_f64(mins * 60.0));
    }
    let bare: f64 = s
        .parse()
        .map_err(|_| anyhow!("cannot parse duration {input:?}"))?;
    Ok(Duration::from_secs_f64(bare))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixes() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_duration("soon").is_err());
    }
}

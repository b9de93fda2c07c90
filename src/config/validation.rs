use crate::area::LatLng;
use crate::config::types::{
    AreaConfig, Config, CrawlerConfig, FetcherConfig, OutputConfig, SeedConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_area_config(&config.area)?;
    validate_seed_config(&config.seed)?;
    validate_output_config(&config.output)?;
    validate_fetcher_config(&config.fetcher)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.backup_interval < 1 {
        return Err(ConfigError::Validation(
            "backup-interval must be at least 1 second".to_string(),
        ));
    }

    if config.report_interval < 1 {
        return Err(ConfigError::Validation(
            "report-interval must be at least 1 second".to_string(),
        ));
    }

    Ok(())
}

/// Validates the area shape and its dimensions
fn validate_area_config(area: &AreaConfig) -> Result<(), ConfigError> {
    match area {
        AreaConfig::Circle { origin, radius } => {
            validate_coordinate("area origin", origin)?;
            validate_extent("radius", *radius)?;
        }
        AreaConfig::Box {
            origin,
            width,
            height,
        } => {
            validate_coordinate("area origin", origin)?;
            validate_extent("width", *width)?;
            if let Some(height) = height {
                validate_extent("height", *height)?;
            }
        }
        AreaConfig::GpsBox {
            top_left,
            bottom_right,
        } => {
            validate_coordinate("top-left corner", top_left)?;
            validate_coordinate("bottom-right corner", bottom_right)?;

            if top_left.lat <= bottom_right.lat || top_left.lng >= bottom_right.lng {
                return Err(ConfigError::Validation(format!(
                    "gps-box top-left ({}) must be north-west of bottom-right ({})",
                    top_left, bottom_right
                )));
            }
        }
    }

    Ok(())
}

/// Validates that exactly one way of locating the seed is given
fn validate_seed_config(seed: &SeedConfig) -> Result<(), ConfigError> {
    match (&seed.pano_id, &seed.location) {
        (Some(_), Some(_)) => Err(ConfigError::Validation(
            "seed must give either pano-id or location, not both".to_string(),
        )),
        (None, None) => Err(ConfigError::Validation(
            "seed must give a pano-id or a location".to_string(),
        )),
        (Some(id), None) if id.trim().is_empty() => Err(ConfigError::Validation(
            "seed pano-id cannot be empty".to_string(),
        )),
        (None, Some(location)) => validate_coordinate("seed location", location),
        _ => Ok(()),
    }
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    if config.label.is_empty() {
        return Err(ConfigError::Validation(
            "output label cannot be empty".to_string(),
        ));
    }

    // The label becomes a directory name
    if !config
        .label
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "output label must contain only alphanumeric characters, hyphens and underscores, got '{}'",
            config.label
        )));
    }

    Ok(())
}

/// Validates fetcher configuration
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("metadata-url", &config.metadata_url),
        ("timemachine-url", &config.timemachine_url),
        ("locate-url", &config.locate_url),
    ] {
        Url::parse(value)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", name, e)))?;
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout-secs must be at least 1 second".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_coordinate(what: &str, point: &LatLng) -> Result<(), ConfigError> {
    if !point.is_valid() {
        return Err(ConfigError::InvalidCoordinate(format!(
            "{} ({}) is outside WGS84 bounds",
            what, point
        )));
    }
    Ok(())
}

fn validate_extent(what: &str, meters: f64) -> Result<(), ConfigError> {
    if !meters.is_finite() || meters <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be a positive number of meters, got {}",
            what, meters
        )));
    }
    Ok(())
}

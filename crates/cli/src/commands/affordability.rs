use hearth_core::config::{EngineConfig, LoadOptions};
use hearth_core::financial::estimate_affordability;

use super::CommandResult;

pub fn run(price: i64) -> CommandResult {
    if price <= 0 {
        return CommandResult::failure(
            "affordability",
            "bad_price",
            format!("price must be positive, got {price}"),
            2,
        );
    }

    let config = match EngineConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("affordability", "config", error.to_string(), 2)
        }
    };

    CommandResult::output(estimate_affordability(price, &config.finance), "affordability")
}

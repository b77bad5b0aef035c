use serde::Serialize;

use hearth_core::config::{EngineConfig, LoadOptions};

use super::CommandResult;

#[derive(Debug, Serialize)]
struct RedactedConfig {
    llm_model: String,
    llm_api_key: &'static str,
    llm_timeout_secs: u64,
    matcher_result_limit: usize,
    matcher_timeout_secs: u64,
    crm_enabled: bool,
    retry_max_retries: u32,
    retry_initial_backoff_ms: u64,
    retry_jitter_factor: f64,
    qualify_threshold: f64,
    hot_threshold: f64,
    reply_soft_limit: usize,
    reply_hard_limit: usize,
    log_level: String,
}

pub fn run() -> CommandResult {
    let config = match EngineConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("config", "config", error.to_string(), 2),
    };

    let redacted = RedactedConfig {
        llm_model: config.llm.model.clone(),
        llm_api_key: if config.llm.api_key.is_some() { "<set>" } else { "<unset>" },
        llm_timeout_secs: config.llm.timeout_secs,
        matcher_result_limit: config.matcher.result_limit,
        matcher_timeout_secs: config.matcher.timeout_secs,
        crm_enabled: config.crm.enabled,
        retry_max_retries: config.retry.max_retries,
        retry_initial_backoff_ms: config.retry.initial_backoff_ms,
        retry_jitter_factor: config.retry.jitter_factor,
        qualify_threshold: config.qualification.qualify_threshold,
        hot_threshold: config.qualification.hot_threshold,
        reply_soft_limit: config.qualification.reply_soft_limit,
        reply_hard_limit: config.qualification.reply_hard_limit,
        log_level: config.logging.level.clone(),
    };

    CommandResult::output(redacted, "config")
}

#[cfg(test)]
mod tests {
    use super::run;

    #[test]
    fn config_output_never_leaks_the_api_key() {
        std::env::set_var("HEARTH_LLM_API_KEY", "super-secret-value");
        let result = run();
        std::env::remove_var("HEARTH_LLM_API_KEY");

        assert_eq!(result.exit_code, 0);
        assert!(!result.output.contains("super-secret-value"));
        assert!(result.output.contains("<set>"));
    }
}

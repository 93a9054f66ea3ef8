use serde::{Deserialize, Serialize};
use std::{env, fs};

/// Payout policy block, passed through verbatim on the stats payload so
/// the frontend can render fees and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutsInfo {
    pub pool_fee: f64,
    pub dev_fee: f64,
    pub payment_threshold_min: i64,
}

impl Default for PayoutsInfo {
    fn default() -> Self {
        Self {
            pool_fee: 0.9,
            dev_fee: 0.1,
            payment_threshold_min: 100_000_000_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub log_file: Option<String>,
    pub secondary: bool,
    pub coin_name: String,
    pub coin_symbol: String,
    pub difficulty_target: i64,
    pub explorer_url: String,
    pub price_api_key: String,
    pub currencies: Vec<String>,
    pub request_timeout_secs: u64,
    pub pool_idle_timeout_secs: u64,
    pub block_cache: usize,
    pub block_page: usize,
    pub payment_cache: usize,
    pub payment_page: usize,
    pub ledger_page: usize,
    pub top_miners: usize,
    pub payouts: PayoutsInfo,
}

#[derive(Debug, Default, Deserialize)]
struct ApidConfig {
    #[serde(default)]
    general: GeneralConfig,
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    coin: CoinConfig,
    #[serde(default)]
    market: MarketConfig,
    #[serde(default)]
    http_client: HttpClientConfig,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    payouts: PayoutsInfo,
}

#[derive(Debug, Deserialize)]
struct GeneralConfig {
    secondary: Option<bool>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            secondary: Some(false),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StoreConfig {
    db_path: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: Some(".devenv/state/apid/pool.db".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CoinConfig {
    name: Option<String>,
    symbol: Option<String>,
    difficulty_target: Option<i64>,
    explorer_url: Option<String>,
}

impl Default for CoinConfig {
    fn default() -> Self {
        Self {
            name: Some("monero".to_string()),
            symbol: Some("XMR".to_string()),
            difficulty_target: Some(120),
            explorer_url: Some("https://explorer.example.com".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MarketConfig {
    crypto_compare_api_key: Option<String>,
    currencies: Option<Vec<String>>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            crypto_compare_api_key: Some(String::new()),
            currencies: Some(
                ["BTC", "USD", "CAD", "AUD", "EUR", "GBP", "RUB", "JPY", "CNY"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HttpClientConfig {
    pool_idle_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            pool_idle_timeout_secs: Some(300),
            request_timeout_secs: Some(60),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CacheConfig {
    block_cache: Option<usize>,
    block_page: Option<usize>,
    payment_cache: Option<usize>,
    payment_page: Option<usize>,
    ledger_page: Option<usize>,
    top_miners: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            block_cache: Some(300),
            block_page: Some(15),
            payment_cache: Some(300),
            payment_page: Some(15),
            ledger_page: Some(15),
            top_miners: Some(10),
        }
    }
}

impl Config {
    pub fn from_args() -> Result<Self, Box<dyn std::error::Error>> {
        let args: Vec<String> = env::args().collect();

        // Extract log file if provided (for tracing setup in main)
        let log_file = args
            .iter()
            .position(|arg| arg == "-f" || arg == "--log-file")
            .and_then(|i| args.get(i + 1))
            .cloned();

        let config_path = args
            .iter()
            .position(|arg| arg == "--config" || arg == "-c")
            .and_then(|i| args.get(i + 1))
            .map(|s| s.as_str())
            .ok_or("Missing required argument: --config")?;

        let config_str = fs::read_to_string(config_path).unwrap_or_default();
        let file_config: ApidConfig = if config_str.is_empty() {
            ApidConfig::default()
        } else {
            toml::from_str(&config_str)?
        };

        let db_path = args
            .iter()
            .position(|arg| arg == "--db-path")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .or(file_config.store.db_path)
            .ok_or("Missing required config: store.db_path")?;

        let defaults_coin = CoinConfig::default();
        let defaults_market = MarketConfig::default();
        let defaults_cache = CacheConfig::default();

        Ok(Config {
            db_path,
            log_file,
            secondary: file_config.general.secondary.unwrap_or(false),
            coin_name: file_config
                .coin
                .name
                .or(defaults_coin.name)
                .unwrap_or_default(),
            coin_symbol: file_config
                .coin
                .symbol
                .or(defaults_coin.symbol)
                .unwrap_or_default(),
            difficulty_target: file_config
                .coin
                .difficulty_target
                .or(defaults_coin.difficulty_target)
                .unwrap_or(120),
            explorer_url: file_config
                .coin
                .explorer_url
                .or(defaults_coin.explorer_url)
                .unwrap_or_default(),
            price_api_key: file_config
                .market
                .crypto_compare_api_key
                .or(defaults_market.crypto_compare_api_key)
                .unwrap_or_default(),
            currencies: file_config
                .market
                .currencies
                .or(defaults_market.currencies)
                .unwrap_or_default(),
            request_timeout_secs: file_config.http_client.request_timeout_secs.unwrap_or(60),
            pool_idle_timeout_secs: file_config
                .http_client
                .pool_idle_timeout_secs
                .unwrap_or(300),
            block_cache: file_config
                .cache
                .block_cache
                .or(defaults_cache.block_cache)
                .unwrap_or(300),
            block_page: file_config
                .cache
                .block_page
                .or(defaults_cache.block_page)
                .unwrap_or(15),
            payment_cache: file_config
                .cache
                .payment_cache
                .or(defaults_cache.payment_cache)
                .unwrap_or(300),
            payment_page: file_config
                .cache
                .payment_page
                .or(defaults_cache.payment_page)
                .unwrap_or(15),
            ledger_page: file_config
                .cache
                .ledger_page
                .or(defaults_cache.ledger_page)
                .unwrap_or(15),
            top_miners: file_config
                .cache
                .top_miners
                .or(defaults_cache.top_miners)
                .unwrap_or(10),
            payouts: file_config.payouts,
        })
    }

    /// Baseline config for tests; no file or CLI involved.
    pub fn for_tests(db_path: String) -> Self {
        Self {
            db_path,
            log_file: None,
            secondary: false,
            coin_name: "monero".to_string(),
            coin_symbol: "XMR".to_string(),
            difficulty_target: 120,
            explorer_url: "http://127.0.0.1:1".to_string(),
            price_api_key: String::new(),
            currencies: vec!["BTC".to_string(), "USD".to_string()],
            request_timeout_secs: 1,
            pool_idle_timeout_secs: 1,
            block_cache: 300,
            block_page: 15,
            payment_cache: 300,
            payment_page: 15,
            ledger_page: 15,
            top_miners: 10,
            payouts: PayoutsInfo::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_deserialization() {
        let toml_str = r#"
            [general]
            secondary = true

            [store]
            db_path = "/var/lib/apid/pool.db"

            [coin]
            name = "monero"
            symbol = "XMR"
            difficulty_target = 120
            explorer_url = "https://xmrchain.net"

            [market]
            crypto_compare_api_key = "k"
            currencies = ["BTC", "USD"]

            [cache]
            block_cache = 150
            block_page = 10

            [payouts]
            pool_fee = 0.5
            dev_fee = 0.1
            payment_threshold_min = 1000
        "#;
        let config: ApidConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.secondary, Some(true));
        assert_eq!(config.store.db_path, Some("/var/lib/apid/pool.db".to_string()));
        assert_eq!(config.coin.difficulty_target, Some(120));
        assert_eq!(config.cache.block_cache, Some(150));
        assert_eq!(config.payouts.pool_fee, 0.5);
        // Unset sections keep their defaults.
        assert_eq!(config.http_client.request_timeout_secs, Some(60));
    }

    #[test]
    fn test_empty_sections_use_defaults() {
        let config: ApidConfig = toml::from_str("").unwrap();
        assert_eq!(config.cache.block_cache, Some(300));
        assert_eq!(config.cache.block_page, Some(15));
        assert_eq!(config.market.currencies.unwrap().len(), 9);
    }
}

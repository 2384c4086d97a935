//! Workflow configuration.
//!
//! Loaded from TOML (or JSON when the file ends in `.json`). Every optional
//! setting has its default declared next to the field.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level workflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    /// Ledger gateway connection
    pub network: NetworkConfig,

    /// Pinning service credentials
    #[serde(default)]
    pub pinata: PinataConfig,

    /// Class (collection) settings
    pub class: ClassConfig,

    /// Per-beneficiary instance settings
    pub instance: InstanceConfig,
}

/// Ledger gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Base URL of the signing gateway
    pub url: String,

    /// API key (can also be set via `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default = "default_ledger_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Decimal places of the native token
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_ledger_api_key_env() -> String {
    "LEDGER_API_KEY".to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_decimals() -> u32 {
    12
}

/// Pinata credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinataConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub secret_key: Option<String>,

    #[serde(default = "default_pinata_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_pinata_secret_key_env")]
    pub secret_key_env: String,

    /// Pinning API base URL
    #[serde(default = "default_pinata_url")]
    pub url: String,
}

fn default_pinata_api_key_env() -> String {
    "PINATA_API_KEY".to_string()
}

fn default_pinata_secret_key_env() -> String {
    "PINATA_SECRET_KEY".to_string()
}

fn default_pinata_url() -> String {
    "https://api.pinata.cloud".to_string()
}

impl Default for PinataConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            secret_key: None,
            api_key_env: default_pinata_api_key_env(),
            secret_key_env: default_pinata_secret_key_env(),
            url: default_pinata_url(),
        }
    }
}

/// Class settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassConfig {
    /// Class id on the ledger
    pub id: String,

    /// Class-level metadata (optional; the operator is asked to confirm
    /// proceeding without it)
    #[serde(default)]
    pub metadata: Option<ClassMetadataConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMetadataConfig {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub image_file: Option<PathBuf>,

    #[serde(default)]
    pub video_file: Option<PathBuf>,
}

/// Instance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
    /// Beneficiary table
    pub data: DataConfig,

    /// Rows per ledger batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Amount sent to every beneficiary address (token units, not base units)
    #[serde(default)]
    pub initial_fund: Option<FundAmount>,

    /// Per-instance metadata; when absent the pinning and metadata steps
    /// are skipped
    #[serde(default)]
    pub metadata: Option<InstanceMetadataConfig>,
}

fn default_batch_size() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataConfig {
    /// Input CSV with one row per beneficiary
    pub csv_file: PathBuf,

    /// First record to process
    #[serde(default)]
    pub offset: usize,

    /// Number of records to process (default: all remaining)
    #[serde(default)]
    pub count: Option<usize>,

    /// Final output CSV
    #[serde(default)]
    pub output_csv_file: Option<PathBuf>,
}

impl DataConfig {
    /// Output path, defaulting to `<stem>-output.csv` beside the input.
    pub fn output_path(&self) -> PathBuf {
        if let Some(path) = &self.output_csv_file {
            return path.clone();
        }
        let stem = self
            .csv_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data".to_string());
        self.csv_file.with_file_name(format!("{stem}-output.csv"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMetadataConfig {
    /// Name template
    pub name: String,

    /// Description template
    #[serde(default)]
    pub description: Option<String>,

    /// Folder holding the per-row images
    pub image_folder: PathBuf,

    /// Image file name template; `{}` is the record number, `{{column}}` a
    /// value from the row
    #[serde(default = "default_file_name_template")]
    pub file_name_template: String,

    /// Optional video file name template, resolved in `image_folder`
    #[serde(default)]
    pub video_file_name_template: Option<String>,
}

fn default_file_name_template() -> String {
    "{}.png".to_string()
}

/// A token amount written either as a string or a number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FundAmount {
    Text(String),
    Number(f64),
}

impl FundAmount {
    /// Convert to base units with the given number of decimals.
    pub fn to_base_units(&self, decimals: u32) -> Result<u128, ConfigError> {
        let text = match self {
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => n.to_string(),
        };
        parse_amount(&text, decimals)
    }
}

/// Parse a decimal amount such as `"1.25"` into base units.
pub fn parse_amount(text: &str, decimals: u32) -> Result<u128, ConfigError> {
    let invalid = || ConfigError::InvalidAmount(text.to_string());

    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > decimals as usize {
        return Err(ConfigError::TooPrecise {
            amount: text.to_string(),
            decimals,
        });
    }

    let scale = 10u128.checked_pow(decimals).ok_or_else(invalid)?;
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let frac_units: u128 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = decimals as usize);
        padded.parse().map_err(|_| invalid())?
    };

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(invalid)
}

impl WorkflowConfig {
    /// Load configuration from a TOML or JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config: Self = if is_json {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_owned(),
                message: e.to_string(),
            })?
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_owned(),
                message: e.to_string(),
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.class.id.trim().is_empty() {
            return Err(ConfigError::Missing("class.id".to_string()));
        }
        if self.instance.data.csv_file.as_os_str().is_empty() {
            return Err(ConfigError::Missing("instance.data.csvFile".to_string()));
        }
        if self.instance.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "instance.batchSize".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(fund) = &self.instance.initial_fund {
            fund.to_base_units(self.network.decimals)?;
        }
        Ok(())
    }

    /// Initial fund in base units; `None` when not configured or zero.
    pub fn initial_fund_units(&self) -> Result<Option<u128>, ConfigError> {
        match &self.instance.initial_fund {
            None => Ok(None),
            Some(fund) => {
                let units = fund.to_base_units(self.network.decimals)?;
                Ok((units > 0).then_some(units))
            }
        }
    }

    /// Resolve the ledger gateway API key from config or environment.
    pub fn resolve_ledger_api_key(&self) -> Option<String> {
        if let Some(key) = &self.network.api_key {
            return Some(expand_env_vars(key));
        }
        std::env::var(&self.network.api_key_env).ok()
    }

    /// Resolve Pinata credentials from config or environment.
    pub fn resolve_pinata_keys(&self) -> Result<(String, String), ConfigError> {
        let api_key = match &self.pinata.api_key {
            Some(key) => expand_env_vars(key),
            None => std::env::var(&self.pinata.api_key_env).map_err(|_| {
                ConfigError::MissingCredential {
                    service: "pinata".to_string(),
                    env_var: self.pinata.api_key_env.clone(),
                }
            })?,
        };
        let secret_key = match &self.pinata.secret_key {
            Some(key) => expand_env_vars(key),
            None => std::env::var(&self.pinata.secret_key_env).map_err(|_| {
                ConfigError::MissingCredential {
                    service: "pinata".to_string(),
                    env_var: self.pinata.secret_key_env.clone(),
                }
            })?,
        };
        Ok((api_key, secret_key))
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let re = match regex::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };

    re.replace_all(s, |cap: &regex::Captures| {
        std::env::var(&cap[1]).unwrap_or_else(|_| cap[0].to_string())
    })
    .into_owned()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Invalid token amount: '{0}'")]
    InvalidAmount(String),

    #[error("Amount '{amount}' has more than {decimals} decimal places")]
    TooPrecise { amount: String, decimals: u32 },

    #[error("Missing credential for '{service}': set {env_var} env var or the key in config")]
    MissingCredential { service: String, env_var: String },

    #[error("Unknown column '{column}' in template '{template}'")]
    UnknownTemplateColumn { template: String, column: String },

    #[error("Record offset {offset} is beyond the {rows} rows in the data table")]
    OffsetOutOfRange { offset: usize, rows: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
[network]
url = "http://localhost:8080"

[class]
id = "42"

[class.metadata]
name = "Winter gifts"
imageFile = "class.png"

[instance]
batchSize = 50
initialFund = "0.5"

[instance.data]
csvFile = "data/people.csv"
offset = 10
count = 20

[instance.metadata]
name = "Gift for {{name}}"
imageFolder = "images"
"#;

    #[test]
    fn test_parse_toml_with_defaults() {
        let config: WorkflowConfig = toml::from_str(EXAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.network.decimals, 12);
        assert_eq!(config.network.timeout_secs, 120);
        assert_eq!(config.instance.batch_size, 50);
        assert_eq!(config.instance.data.offset, 10);
        assert_eq!(config.instance.data.count, Some(20));
        let metadata = config.instance.metadata.as_ref().unwrap();
        assert_eq!(metadata.file_name_template, "{}.png");
        assert_eq!(config.pinata.api_key_env, "PINATA_API_KEY");
        assert_eq!(
            config.initial_fund_units().unwrap(),
            Some(500_000_000_000)
        );
    }

    #[test]
    fn test_parse_json_number_amount() {
        let json = r#"{
            "network": {"url": "http://gw", "decimals": 10},
            "class": {"id": "7"},
            "instance": {"data": {"csvFile": "in.csv"}, "initialFund": 0.25}
        }"#;
        let config: WorkflowConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.instance.batch_size, 100);
        assert_eq!(config.initial_fund_units().unwrap(), Some(2_500_000_000));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1", 3).unwrap(), 1_000);
        assert_eq!(parse_amount("1.5", 3).unwrap(), 1_500);
        assert_eq!(parse_amount(".001", 3).unwrap(), 1);
        assert_eq!(parse_amount("0", 3).unwrap(), 0);
        assert!(matches!(
            parse_amount("0.0001", 3),
            Err(ConfigError::TooPrecise { .. })
        ));
        assert!(parse_amount("abc", 3).is_err());
        assert!(parse_amount("-1", 3).is_err());
        assert!(parse_amount(".", 3).is_err());
    }

    #[test]
    fn test_zero_fund_is_none() {
        let mut config: WorkflowConfig = toml::from_str(EXAMPLE).unwrap();
        config.instance.initial_fund = Some(FundAmount::Text("0".to_string()));
        assert_eq!(config.initial_fund_units().unwrap(), None);
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config: WorkflowConfig = toml::from_str(EXAMPLE).unwrap();
        config.instance.batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_output_path_default() {
        let data = DataConfig {
            csv_file: PathBuf::from("data/people.csv"),
            offset: 0,
            count: None,
            output_csv_file: None,
        };
        assert_eq!(data.output_path(), PathBuf::from("data/people-output.csv"));
    }

    #[test]
    fn test_expand_env_vars_keeps_unknown() {
        assert_eq!(
            expand_env_vars("${GIFTDROP_SURELY_UNSET_VAR}"),
            "${GIFTDROP_SURELY_UNSET_VAR}"
        );
    }
}

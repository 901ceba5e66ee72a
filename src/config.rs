use std::{fs, path::PathBuf, time::Duration};

pub use navcore_messages::{ConfigFromController, ProcessModel};

use crate::errors::Result;

/// Default time to wait for a before-unload acknowledgment.
pub const DEFAULT_BEFORE_UNLOAD_TIMEOUT: Duration = Duration::from_millis(1000);
/// Default scheme of WebUI pages.
pub const DEFAULT_WEBUI_SCHEME: &str = "webui";
/// Default scheme of privileged (extension-like) content.
pub const DEFAULT_PRIVILEGED_SCHEME: &str = "extension";

/// Command line arguments.
#[derive(Clone, Debug, Default)]
pub struct CliArgs {
    /// URLs to navigate through, in order.
    pub urls: Vec<url::Url>,
    /// Path to a JSON file holding a [`ConfigFromController`].
    pub config_path: Option<PathBuf>,
    /// Process model override.
    pub process_model: Option<ProcessModel>,
    /// Isolate every site.
    pub site_per_process: bool,
    /// Keep cross-site subframes out of the main frame's context.
    pub top_document_isolation: bool,
    /// Origins that always get a dedicated context.
    pub isolated_origins: Vec<url::Url>,
    /// Before-unload timeout in milliseconds.
    pub before_unload_timeout_ms: Option<u64>,
}

/// Parse CLI arguments of the current process to a [`CliArgs`]
pub fn parse_cli_args() -> std::result::Result<CliArgs, getopts::Fail> {
    let args: Vec<String> = std::env::args().collect();
    parse_cli_args_from(&args[1..])
}

/// Parse the given arguments (without the program name) to a [`CliArgs`]
pub fn parse_cli_args_from(args: &[String]) -> std::result::Result<CliArgs, getopts::Fail> {
    let mut opts = getopts::Options::new();
    opts.optopt("", "config", "Path to a JSON configuration file", "navcore.json");
    opts.optflag("", "process-per-site", "Share one process between all instances of a site");
    opts.optflag("", "process-per-tab", "Use one process per page");
    opts.optflag("", "single-process", "Run everything in a single process");
    opts.optflag("", "site-per-process", "Isolate every site in its own context");
    opts.optflag(
        "",
        "top-document-isolation",
        "Keep cross-site subframes out of the main frame's context",
    );
    opts.optmulti(
        "",
        "isolate-origin",
        "Origin that always gets a dedicated context",
        "https://bank.test",
    );
    opts.optopt(
        "",
        "before-unload-timeout",
        "Milliseconds to wait for a before-unload acknowledgment",
        "1000",
    );

    let matches: getopts::Matches = opts.parse(args)?;

    let urls = matches
        .free
        .iter()
        .filter_map(|url| parse_url_arg(url))
        .collect();
    let isolated_origins = matches
        .opt_strs("isolate-origin")
        .iter()
        .filter_map(|url| parse_url_arg(url))
        .collect();

    let process_model = if matches.opt_present("single-process") {
        Some(ProcessModel::SingleProcess)
    } else if matches.opt_present("process-per-tab") {
        Some(ProcessModel::ProcessPerTab)
    } else if matches.opt_present("process-per-site") {
        Some(ProcessModel::ProcessPerSite)
    } else {
        None
    };

    let before_unload_timeout_ms = matches
        .opt_get::<u64>("before-unload-timeout")
        .unwrap_or_else(|e| {
            log::error!("Failed to parse before-unload-timeout command line argument: {e}");
            None
        });

    Ok(CliArgs {
        urls,
        config_path: matches.opt_str("config").map(PathBuf::from),
        process_model,
        site_per_process: matches.opt_present("site-per-process"),
        top_document_isolation: matches.opt_present("top-document-isolation"),
        isolated_origins,
        before_unload_timeout_ms,
    })
}

fn parse_url_arg(url: &str) -> Option<url::Url> {
    match url::Url::parse(url) {
        Ok(url_parsed) => Some(url_parsed),
        Err(e) => {
            if e == url::ParseError::RelativeUrlWithoutBase {
                if let Ok(url_parsed) = url::Url::parse(&format!("https://{url}")) {
                    return Some(url_parsed);
                }
            }
            log::error!("Invalid url argument: {url}");
            None
        }
    }
}

/// Configuration of the navigation core.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// How site instances map to processes.
    pub process_model: ProcessModel,
    /// Isolate every site in its own context, subframes included.
    pub site_per_process: bool,
    /// Keep cross-site subframes out of the main frame's context.
    pub top_document_isolation: bool,
    /// Origins that always get a dedicated context.
    pub isolated_origins: Vec<url::Url>,
    /// Schemes of WebUI pages.
    pub webui_schemes: Vec<String>,
    /// Schemes that need a privileged process.
    pub privileged_schemes: Vec<String>,
    /// How long an unresponsive renderer may hold a navigation in before-unload.
    pub before_unload_timeout: Duration,
    /// URLs the demo navigates through.
    pub initial_urls: Vec<url::Url>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            process_model: ProcessModel::default(),
            site_per_process: false,
            top_document_isolation: false,
            isolated_origins: Vec::new(),
            webui_schemes: vec![DEFAULT_WEBUI_SCHEME.to_string()],
            privileged_schemes: vec![DEFAULT_PRIVILEGED_SCHEME.to_string()],
            before_unload_timeout: DEFAULT_BEFORE_UNLOAD_TIMEOUT,
            initial_urls: Vec::new(),
        }
    }
}

impl Config {
    /// Create a config from CLI arguments. A config file named by the
    /// arguments is read first and the remaining flags override it.
    pub fn from_cli_args(cli_args: CliArgs) -> Result<Self> {
        let mut config = match &cli_args.config_path {
            Some(path) => Self::from_controller_config(read_config_file(path)?),
            None => Self::default(),
        };

        if let Some(process_model) = cli_args.process_model {
            config.process_model = process_model;
        }
        config.site_per_process |= cli_args.site_per_process;
        config.top_document_isolation |= cli_args.top_document_isolation;
        config.isolated_origins.extend(cli_args.isolated_origins);
        if let Some(timeout) = cli_args.before_unload_timeout_ms {
            config.before_unload_timeout = Duration::from_millis(timeout);
        }
        if !cli_args.urls.is_empty() {
            config.initial_urls = cli_args.urls;
        }
        Ok(config)
    }

    /// Create a config from the settings a controller sent.
    pub fn from_controller_config(controller_config: ConfigFromController) -> Self {
        let default = Self::default();
        Self {
            process_model: controller_config.process_model.unwrap_or_default(),
            site_per_process: controller_config.site_per_process,
            top_document_isolation: controller_config.top_document_isolation,
            isolated_origins: controller_config.isolated_origins,
            webui_schemes: controller_config
                .webui_schemes
                .unwrap_or(default.webui_schemes),
            privileged_schemes: controller_config
                .privileged_schemes
                .unwrap_or(default.privileged_schemes),
            before_unload_timeout: controller_config
                .before_unload_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.before_unload_timeout),
            initial_urls: controller_config.initial_urls,
        }
    }
}

fn read_config_file(path: &PathBuf) -> Result<ConfigFromController> {
    let contents = fs::read_to_string(path)?;
    let config = serde_json::from_str(&contents)?;
    log::debug!("Config: loaded {}", path.display());
    Ok(config)
}

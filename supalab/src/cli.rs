use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "supalab")]
#[command(about = "Interactive lab for Supabase auth, edge functions and realtime channels")]
#[command(version)]
pub struct Cli {
    /// Config files loaded after default.cfg, later files win
    #[arg(value_name = "CONFIG_FILES")]
    pub config_files: Vec<String>,

    /// Directory holding the config files
    #[arg(long, env = "SUPALAB_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Project url, overrides the `url` config key
    #[arg(long, env = "SUPALAB_URL")]
    pub url: Option<String>,

    /// Project api key, overrides the `api_key` config key
    #[arg(long, env = "SUPALAB_API_KEY")]
    pub api_key: Option<String>,

    /// Keep the line history in this file between runs
    #[arg(long, env = "SUPALAB_HISTORY")]
    pub history: Option<PathBuf>,

    /// Show full responses and error chains
    #[arg(long, short, default_value = "false")]
    pub verbose: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, default_value = "false")]
    pub debug: bool,
}

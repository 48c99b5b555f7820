use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use uplink_engine::RestartPolicy;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "Request fingerprinting, upload and cache tool",
    long_about = "Derives stable request fingerprints, uploads files with progress reporting\n\
                  and inspects the fingerprint-keyed cache that records completed uploads."
)]
pub struct CliArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Directory of the file cache
    #[arg(
        long,
        global = true,
        help = "Directory used for the disk cache (default: <temp dir>/uplink-cache)"
    )]
    pub cache_dir: Option<PathBuf>,

    /// Expiry applied to cache entries written by this run
    #[arg(
        long,
        global = true,
        help = "Expire cache entries written by this run after the given number of seconds (default: never)"
    )]
    pub cache_ttl: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Identity of a request: url plus parameters
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Request URL
    pub url: String,

    /// Request parameters
    #[arg(
        short = 'p',
        long = "param",
        help = "Request parameter taking part in the fingerprint (can be used multiple times). Format: 'key=value'",
        value_name = "PARAM"
    )]
    pub params: Vec<String>,

    /// Dynamic parameter names
    #[arg(
        short = 'd',
        long = "dynamic",
        help = "Name of a parameter excluded from the fingerprint (can be used multiple times)",
        value_name = "KEY"
    )]
    pub dynamic: Vec<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the fingerprint of a request
    Key(RequestArgs),

    /// Upload a file and record its completion in the cache
    Upload(UploadArgs),

    /// Report whether an upload completed
    Status(RequestArgs),

    /// Inspect or clear the cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Args)]
pub struct UploadArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// File to upload
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Upload as a multipart form with the file in this field
    #[arg(
        long,
        help = "Send a multipart form with the file in the given field; parameters become text fields",
        conflicts_with = "image"
    )]
    pub field: Option<String>,

    /// Upload as a JPEG image form
    #[arg(
        long,
        help = "Send a multipart image form (field 'fileupload', image/jpeg); parameters become text fields"
    )]
    pub image: bool,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "POST", help = "HTTP method of the upload")]
    pub method: String,

    /// Custom HTTP headers for the upload request
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to the request (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// What to do when the same request is already uploading
    #[arg(long, value_enum, default_value_t = RestartPolicy::Replace)]
    pub restart_policy: RestartPolicy,

    /// Overall request timeout in seconds
    #[arg(long, default_value = "60", help = "Overall upload timeout in seconds (0 disables it)")]
    pub timeout: u64,

    /// Hide the progress bar
    #[arg(long, help = "Do not show a progress bar")]
    pub no_progress: bool,

    /// Disable all proxy settings for uploads
    #[arg(long, help = "Disable all proxy settings (including system proxy)")]
    pub no_proxy: bool,
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Look up the cache entry of a request
    Get(RequestArgs),

    /// Remove every cache entry
    Clear,
}

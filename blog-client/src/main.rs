use std::convert::Infallible;
use std::time::{Duration, Instant};

use blog_client::log::{self, Level, LogFormat};
use blog_client::{ApiClient, ClientConfig, DEFAULT_BASE_URL, file_url, notice};
use clap::{Parser, Subcommand, crate_version};
use miette::{IntoDiagnostic, Result, bail};
use secrecy::SecretString;
use tracing::{info, warn};
use url::Url;

#[derive(Parser)]
#[command(
    version,
    about = format!("blog-client {}: talk to the blog API, with a heads-up while the server wakes", crate_version!())
)]
struct Cli {
    #[arg(long, env = "BLOG_API_URL", default_value = DEFAULT_BASE_URL, help = "Root URL of the blog API.")]
    base_url: Url,

    #[arg(
        long,
        env = "BLOG_API_TOKEN",
        hide_env_values = true,
        value_parser = parse_token,
        help = "Bearer token for authenticated calls."
    )]
    token: Option<SecretString>,

    #[arg(
        long,
        env = "BLOG_WAKE_THRESHOLD_MS",
        default_value_t = 2000,
        help = "Milliseconds of continuous activity before the server is reported as waking."
    )]
    wake_threshold_ms: u64,

    #[arg(long, help = "Give up on a request after this many seconds.")]
    timeout_secs: Option<u64>,

    #[arg(short, long, help = "Enable debug log level.")]
    verbose: bool,

    #[arg(short, long, conflicts_with = "verbose", help = "Disable all logs.")]
    quiet: bool,

    #[arg(long, value_enum, default_value_t)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "GET an API path and print the JSON response.")]
    Get { path: String },

    #[command(about = "Print the download URL for a stored file reference.")]
    FileUrl { path: String },

    #[command(about = "Send concurrent GETs to check whether the server is up.")]
    Ping {
        #[arg(long, default_value = "/posts?page=0&size=1")]
        path: String,

        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
}

fn parse_token(raw: &str) -> Result<SecretString, Infallible> {
    Ok(SecretString::from(raw.to_owned()))
}

impl Cli {
    fn level(&self) -> Level {
        if self.verbose {
            Level::Debug
        } else if self.quiet {
            Level::Silent
        } else {
            Level::default()
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.base_url.clone())
            .with_wake_threshold(Duration::from_millis(self.wake_threshold_ms));
        if let Some(token) = &self.token {
            config = config.with_token(token.clone());
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    log::init_tracing(cli.level(), cli.log_format);

    let client = ApiClient::new(cli.client_config())?;
    let waking_notice = notice::attach(client.activity(), std::io::stderr());
    let result = run(&client, cli.command).await;
    waking_notice.unsubscribe();
    result
}

async fn run(client: &ApiClient, command: Command) -> Result<()> {
    match command {
        Command::Get { path } => {
            let body: Option<serde_json::Value> = client.get(&path).await?;
            if let Some(body) = body {
                println!("{}", serde_json::to_string_pretty(&body).into_diagnostic()?);
            }
        }
        Command::Ping { path, count } => {
            let started = Instant::now();
            let requests = (0..count).map(|_| client.get::<serde_json::Value>(&path));
            let results = futures::future::join_all(requests).await;

            let mut failed = 0;
            for (i, result) in results.into_iter().enumerate() {
                match result {
                    Ok(_) => println!("{i}: ok"),
                    Err(err) => {
                        failed += 1;
                        warn!(request = i, "Ping failed: {err}");
                        println!("{i}: {err}");
                    }
                }
            }
            info!(elapsed = ?started.elapsed(), count, failed, "Ping finished");

            if failed > 0 {
                bail!("{failed} of {count} requests failed");
            }
        }
        Command::FileUrl { path } => {
            let Some(url) = file_url(client.base_url(), &path) else {
                bail!("No file name in {path:?}");
            };
            println!("{url}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use secrecy::ExposeSecret;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_build_client_config() {
        let cli = Cli::try_parse_from([
            "blog-client",
            "--base-url",
            "https://blog.example.com/api",
            "--token",
            "t0k",
            "--wake-threshold-ms",
            "500",
            "--timeout-secs",
            "30",
            "get",
            "/posts/1",
        ])
        .unwrap();

        assert_eq!(cli.token.as_ref().unwrap().expose_secret(), "t0k");

        let config = cli.client_config();
        assert_eq!(config.base_url.as_str(), "https://blog.example.com/api");
        assert_eq!(config.token.as_ref().unwrap().expose_secret(), "t0k");
        assert_eq!(config.wake_threshold, Duration::from_millis(500));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert!(matches!(cli.command, Command::Get { ref path } if path == "/posts/1"));
    }

    #[test]
    fn verbosity_selects_level() {
        let verbose = Cli::try_parse_from(["blog-client", "-v", "ping"]).unwrap();
        assert_eq!(verbose.level(), Level::Debug);

        let quiet = Cli::try_parse_from(["blog-client", "-q", "ping", "--count", "3"]).unwrap();
        assert_eq!(quiet.level(), Level::Silent);
        assert!(matches!(quiet.command, Command::Ping { count: 3, .. }));
    }
}

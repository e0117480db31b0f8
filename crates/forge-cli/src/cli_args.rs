use std::path::PathBuf;

use clap::Parser;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "forge",
    about = "Webhook-driven gateway for isolated, containerized automation executions",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "FORGE_BIND",
        default_value = "0.0.0.0:8080",
        help = "Socket address the gateway server binds"
    )]
    pub bind: String,

    #[arg(
        long = "data-dir",
        env = "FORGE_DATA_DIR",
        default_value = "./forge-data",
        help = "Root directory for sessions and trace scratch space"
    )]
    pub data_dir: PathBuf,

    #[arg(
        long = "secrets-dir",
        env = "FORGE_SECRETS_DIR",
        default_value = "/run/secrets",
        help = "Directory holding file-mounted secrets; files win over plain env vars"
    )]
    pub secrets_dir: PathBuf,

    #[arg(
        long = "retention-days",
        env = "FORGE_RETENTION_DAYS",
        default_value_t = 30,
        value_parser = parse_positive_u64,
        help = "Sessions older than this many days are removed by the hourly sweep"
    )]
    pub retention_days: u64,

    #[arg(
        long,
        env = "FORGE_IMAGE",
        default_value = "forge-exec:latest",
        help = "Container image executions run in"
    )]
    pub image: String,

    #[arg(
        long = "build-context",
        env = "FORGE_BUILD_CONTEXT",
        help = "Directory to build the execution image from when it is missing"
    )]
    pub build_context: Option<PathBuf>,

    #[arg(
        long = "docker-binary",
        env = "FORGE_DOCKER_BINARY",
        default_value = "docker",
        help = "Container engine binary to shell out to"
    )]
    pub docker_binary: String,

    #[arg(
        long,
        env = "FORGE_MEMORY",
        default_value = "4g",
        help = "Memory limit per execution container"
    )]
    pub memory: String,

    #[arg(
        long = "cpu-shares",
        env = "FORGE_CPU_SHARES",
        default_value_t = 1024,
        help = "Relative CPU weight per execution container"
    )]
    pub cpu_shares: u32,

    #[arg(
        long = "pids-limit",
        env = "FORGE_PIDS_LIMIT",
        default_value_t = 256,
        help = "Process count limit per execution container"
    )]
    pub pids_limit: u32,

    #[arg(
        long = "timeout-ms",
        env = "FORGE_TIMEOUT_MS",
        default_value_t = 2 * 60 * 60 * 1_000,
        value_parser = parse_positive_u64,
        help = "Wall-clock timeout per execution in milliseconds"
    )]
    pub timeout_ms: u64,

    #[arg(
        long = "output-buffer-bytes",
        env = "FORGE_OUTPUT_BUFFER_BYTES",
        default_value_t = 10 * 1024 * 1024,
        value_parser = parse_positive_usize,
        help = "Captured output limit per stream; exceeding it fails the execution"
    )]
    pub output_buffer_bytes: usize,

    #[arg(
        long,
        env = "FORGE_PRIVILEGED",
        help = "Run execution containers privileged instead of with the capability allow-list"
    )]
    pub privileged: bool,

    #[arg(
        long = "capability",
        env = "FORGE_CAPABILITIES",
        value_delimiter = ',',
        help = "Additional Linux capabilities granted on top of the built-in allow-list"
    )]
    pub capabilities: Vec<String>,

    #[arg(
        long = "max-concurrent-executions",
        env = "FORGE_MAX_CONCURRENT_EXECUTIONS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Executions allowed to run at once; further dispatches queue"
    )]
    pub max_concurrent_executions: usize,

    #[arg(
        long = "tool-config",
        env = "FORGE_TOOL_CONFIG_TEMPLATE",
        help = "Tool-integration config template; ${VAR} placeholders resolve from the environment"
    )]
    pub tool_config: Option<PathBuf>,

    #[arg(
        long = "bot-trigger",
        env = "FORGE_BOT_TRIGGER",
        default_value = "ForgeBot",
        help = "Mention handle that triggers executions and is neutralized in output"
    )]
    pub bot_trigger: String,

    #[arg(
        long = "bot-username",
        env = "FORGE_BOT_USERNAME",
        default_value = "forge-bot",
        help = "Git author/committer name used inside executions"
    )]
    pub bot_username: String,

    #[arg(
        long = "bot-email",
        env = "FORGE_BOT_EMAIL",
        default_value = "forge-bot@users.noreply.github.com",
        help = "Git author/committer email used inside executions"
    )]
    pub bot_email: String,

    #[arg(
        long = "test-mode",
        env = "FORGE_TEST_MODE",
        help = "Skip container execution and answer with an acknowledgment stub"
    )]
    pub test_mode: bool,
}

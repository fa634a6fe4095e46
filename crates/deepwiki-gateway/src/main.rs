use clap::{Args, Parser, Subcommand};
use deepwiki_gateway::{GatewayConfig, default_config_path, load_gateway_config};

#[derive(Parser, Debug)]
#[command(
    name = "deepwiki-gateway",
    version,
    about = "Streaming tool gateway for DeepWiki"
)]
struct Cli {
    #[arg(long, global = true)]
    conf_dir: Option<std::path::PathBuf>,
    #[command(subcommand)]
    command: GatewaySubcommand,
}

#[derive(Subcommand, Debug, Clone)]
enum GatewaySubcommand {
    /// Serve the /mcp and /sse routes.
    Serve(ServeArgs),
    /// Print tool metadata as JSON.
    Tools,
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Overrides `[server] bind` from deepwiki.toml.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    deepwiki_gateway::init_conf_dir(cli.conf_dir.clone());
    if let Err(error) = run(cli.command).await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

async fn run(command: GatewaySubcommand) -> Result<(), String> {
    let config = load_gateway_config(&default_config_path())?;
    deepwiki_gateway::init_tracing(&config.log);
    match command {
        GatewaySubcommand::Serve(args) => run_serve(config, args).await,
        GatewaySubcommand::Tools => print_tools(&config),
    }
}

async fn run_serve(mut config: GatewayConfig, args: ServeArgs) -> Result<(), String> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    deepwiki_gateway::serve_gateway(config).await
}

fn print_tools(config: &GatewayConfig) -> Result<(), String> {
    let registry = deepwiki_gateway::build_registry(config);
    let info = deepwiki_gateway::server_info(registry.descriptors());
    let rendered = serde_json::to_string_pretty(&info)
        .map_err(|error| format!("render tool metadata failed: {error}"))?;
    println!("{rendered}");
    Ok(())
}

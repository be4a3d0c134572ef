use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "huddle")]
#[command(about = "Huddle CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: HUDDLE_CONFIG_PATH or ~/.huddle/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway (webhook receiver + WebSocket surfaces).
    Gateway {
        /// Config file path (default: HUDDLE_CONFIG_PATH or ~/.huddle/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP and WebSocket port (default from config or 15151)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Attach to a conversation through the gateway and print what it delivers.
    Watch {
        /// Config file path (default: HUDDLE_CONFIG_PATH or ~/.huddle/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Conversation id to observe.
        #[arg(long, value_name = "ID")]
        conversation: String,

        /// End user id of this observer; messages authored by it are not echoed back.
        #[arg(long, value_name = "ID", default_value = "huddle-cli")]
        end_user: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("huddle {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Watch {
            config,
            conversation,
            end_user,
        }) => {
            if let Err(e) = run_watch(config, conversation, end_user).await {
                log::error!("watch failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(huddle_core::config::default_config_path);
    let dir = huddle_core::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, _path) = huddle_core::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    huddle_core::gateway::run_gateway(config).await
}

async fn run_watch(
    config_path: Option<std::path::PathBuf>,
    conversation: String,
    end_user: String,
) -> anyhow::Result<()> {
    let (config, _) = huddle_core::config::load_config(config_path)?;
    let ws_url = format!(
        "ws://{}:{}/ws?conversationId={}&endUserId={}",
        dial_host(&config.gateway.bind),
        config.gateway.port,
        urlencoding::encode(&conversation),
        urlencoding::encode(&end_user),
    );

    let (mut ws, _) = tokio_tungstenite::connect_async(&ws_url).await?;
    log::info!("connected to {}", ws_url);

    while let Some(msg) = ws.next().await {
        let Message::Text(text) = msg? else { continue };
        let frame: serde_json::Value = serde_json::from_str(&text)?;
        match render_frame(&frame) {
            Rendered::Line(line) => println!("{}", line),
            Rendered::Skip => {}
            Rendered::Stop => break,
            Rendered::Fail(e) => anyhow::bail!(e),
        }
    }
    Ok(())
}

/// Host to dial for a gateway bound to `bind`. Wildcard binds are reached over loopback.
fn dial_host(bind: &str) -> String {
    let bind = bind.trim();
    let unbracketed = bind.trim_start_matches('[').trim_end_matches(']');
    match unbracketed.parse::<std::net::IpAddr>() {
        Ok(ip) if ip.is_unspecified() => "127.0.0.1".to_string(),
        Ok(std::net::IpAddr::V6(ip)) => format!("[{}]", ip),
        Ok(std::net::IpAddr::V4(ip)) => ip.to_string(),
        Err(_) if bind.is_empty() => "127.0.0.1".to_string(),
        Err(_) => bind.to_string(),
    }
}

#[derive(Debug, PartialEq)]
enum Rendered {
    Line(String),
    Skip,
    Stop,
    Fail(String),
}

/// Turn one surface event frame into terminal output.
fn render_frame(frame: &serde_json::Value) -> Rendered {
    let payload = frame.get("payload");
    let field = |name: &str| {
        payload
            .and_then(|p| p.get(name))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };
    match frame.get("event").and_then(|v| v.as_str()) {
        Some("registered") => Rendered::Line(format!(
            "watching conversation {} as {}",
            field("conversationId"),
            field("endUserId")
        )),
        Some("message") => {
            let content = payload.and_then(|p| p.get("content"));
            let get = |k: &str| content.and_then(|c| c.get(k)).and_then(|v| v.as_str());
            let body = match get("type") {
                Some("link") => format!("{} <{}>", get("linkText").unwrap_or("link"), get("url").unwrap_or("")),
                _ => get("body").unwrap_or("").to_string(),
            };
            Rendered::Line(format!("[{}] {}", field("label"), body))
        }
        Some("notification") => Rendered::Line(format!("* {}", field("text"))),
        Some("inputDisabled") => Rendered::Line("-- conversation has ended --".to_string()),
        Some("shutdown") => Rendered::Stop,
        Some("error") => Rendered::Fail(field("message")),
        _ => Rendered::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_text_and_link_messages() {
        let text = json!({
            "type": "event", "event": "message",
            "payload": { "label": "AI Agent (ai_agent)", "content": { "type": "text", "body": "hi" } }
        });
        assert_eq!(render_frame(&text), Rendered::Line("[AI Agent (ai_agent)] hi".into()));

        let link = json!({
            "type": "event", "event": "message",
            "payload": { "label": "Bot (b1)", "content": { "type": "link", "url": "https://x.test", "linkText": null } }
        });
        assert_eq!(render_frame(&link), Rendered::Line("[Bot (b1)] link <https://x.test>".into()));

        let named = json!({
            "type": "event", "event": "message",
            "payload": { "label": "Bot (b1)", "content": { "type": "link", "url": "https://x.test", "linkText": "Help" } }
        });
        assert_eq!(render_frame(&named), Rendered::Line("[Bot (b1)] Help <https://x.test>".into()));
    }

    #[test]
    fn wildcard_binds_dial_loopback() {
        assert_eq!(dial_host("0.0.0.0"), "127.0.0.1");
        assert_eq!(dial_host("::"), "127.0.0.1");
        assert_eq!(dial_host("[::]"), "127.0.0.1");
        assert_eq!(dial_host(" 127.0.0.1 "), "127.0.0.1");
        assert_eq!(dial_host("::1"), "[::1]");
        assert_eq!(dial_host("10.0.0.5"), "10.0.0.5");
        assert_eq!(dial_host("localhost"), "localhost");
    }

    #[test]
    fn lifecycle_frames() {
        assert_eq!(
            render_frame(&json!({ "event": "inputDisabled" })),
            Rendered::Line("-- conversation has ended --".into())
        );
        assert_eq!(render_frame(&json!({ "event": "shutdown" })), Rendered::Stop);
        assert_eq!(
            render_frame(&json!({ "event": "error", "payload": { "message": "taken" } })),
            Rendered::Fail("taken".into())
        );
        assert_eq!(render_frame(&json!({ "event": "future" })), Rendered::Skip);
    }
}
